//! IKソルバーへ渡すターゲット

use anyhow::Result;
use enum_map::{Enum, EnumMap};
use nalgebra::{UnitQuaternion, Vector3};

use crate::skeleton::{HumanBone, Side};

/// エフェクタの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum EffectorKind {
    Body,
    LeftShoulder,
    RightShoulder,
    LeftThigh,
    RightThigh,
    LeftHand,
    RightHand,
    LeftFoot,
    RightFoot,
    Head,
}

impl EffectorKind {
    /// OSC で使う名前
    pub fn name(self) -> &'static str {
        match self {
            EffectorKind::Body => "Body",
            EffectorKind::LeftShoulder => "LeftShoulder",
            EffectorKind::RightShoulder => "RightShoulder",
            EffectorKind::LeftThigh => "LeftThigh",
            EffectorKind::RightThigh => "RightThigh",
            EffectorKind::LeftHand => "LeftHand",
            EffectorKind::RightHand => "RightHand",
            EffectorKind::LeftFoot => "LeftFoot",
            EffectorKind::RightFoot => "RightFoot",
            EffectorKind::Head => "Head",
        }
    }

    /// エフェクタが動かすボーン
    pub fn bone(self) -> HumanBone {
        match self {
            EffectorKind::Body => HumanBone::Hips,
            EffectorKind::LeftShoulder => HumanBone::LeftUpperArm,
            EffectorKind::RightShoulder => HumanBone::RightUpperArm,
            EffectorKind::LeftThigh => HumanBone::LeftUpperLeg,
            EffectorKind::RightThigh => HumanBone::RightUpperLeg,
            EffectorKind::LeftHand => HumanBone::LeftHand,
            EffectorKind::RightHand => HumanBone::RightHand,
            EffectorKind::LeftFoot => HumanBone::LeftFoot,
            EffectorKind::RightFoot => HumanBone::RightFoot,
            EffectorKind::Head => HumanBone::Head,
        }
    }

    pub fn shoulder(side: Side) -> Self {
        match side {
            Side::Left => EffectorKind::LeftShoulder,
            Side::Right => EffectorKind::RightShoulder,
        }
    }

    pub fn thigh(side: Side) -> Self {
        match side {
            Side::Left => EffectorKind::LeftThigh,
            Side::Right => EffectorKind::RightThigh,
        }
    }

    pub fn hand(side: Side) -> Self {
        match side {
            Side::Left => EffectorKind::LeftHand,
            Side::Right => EffectorKind::RightHand,
        }
    }

    pub fn foot(side: Side) -> Self {
        match side {
            Side::Left => EffectorKind::LeftFoot,
            Side::Right => EffectorKind::RightFoot,
        }
    }
}

/// 肘・膝の曲げ方向を決めるチェーン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum ChainKind {
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
}

impl ChainKind {
    pub fn name(self) -> &'static str {
        match self {
            ChainKind::LeftArm => "LeftArm",
            ChainKind::RightArm => "RightArm",
            ChainKind::LeftLeg => "LeftLeg",
            ChainKind::RightLeg => "RightLeg",
        }
    }

    /// 曲げゴールが対応するボーン（肘・膝）
    pub fn bend_bone(self) -> HumanBone {
        match self {
            ChainKind::LeftArm => HumanBone::LeftLowerArm,
            ChainKind::RightArm => HumanBone::RightLowerArm,
            ChainKind::LeftLeg => HumanBone::LeftLowerLeg,
            ChainKind::RightLeg => HumanBone::RightLowerLeg,
        }
    }

    pub fn arm(side: Side) -> Self {
        match side {
            Side::Left => ChainKind::LeftArm,
            Side::Right => ChainKind::RightArm,
        }
    }

    pub fn leg(side: Side) -> Self {
        match side {
            Side::Left => ChainKind::LeftLeg,
            Side::Right => ChainKind::RightLeg,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effector {
    pub position: Vector3<f32>,
    pub position_weight: f32,
    pub rotation: UnitQuaternion<f32>,
    pub rotation_weight: f32,
}

impl Default for Effector {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            position_weight: 0.0,
            rotation: UnitQuaternion::identity(),
            rotation_weight: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BendGoal {
    pub position: Vector3<f32>,
    pub weight: f32,
}

impl Default for BendGoal {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            weight: 0.0,
        }
    }
}

/// 頭エフェクタが上半身を曲げる設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadBend {
    pub weight: f32,
    /// 曲げに使うボーンと配分
    pub bones: [(HumanBone, f32); 2],
    /// 頭エフェクタが Hips を引っ張る強さ
    pub body_weight: f32,
    /// 頭エフェクタが太ももを引っ張る強さ
    pub thigh_weight: f32,
}

impl Default for HeadBend {
    fn default() -> Self {
        Self {
            weight: 0.0,
            bones: [(HumanBone::Spine, 0.5), (HumanBone::Chest, 0.5)],
            body_weight: 0.0,
            thigh_weight: 0.0,
        }
    }
}

/// 1フレーム分のIKターゲット
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IkTargets {
    pub effectors: EnumMap<EffectorKind, Effector>,
    pub bend_goals: EnumMap<ChainKind, BendGoal>,
    pub head_bend: HeadBend,
}

/// IKソルバー（エンジン側）
pub trait IkSolver {
    fn submit(&mut self, targets: &IkTargets) -> Result<()>;
}
