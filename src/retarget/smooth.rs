use enum_map::EnumMap;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use super::math::{is_quaternion_invalid, nlerp, slerp};
use crate::config::SmoothConfig;
use crate::skeleton::{HumanBone, Rig, Side};

/// 体のIKターゲットを現在のボーン姿勢とブレンドする
///
/// 位置: `goal * a + current * (1 - a)`
/// 回転: `slerp(current, goal, a)`
#[derive(Debug, Clone, Copy)]
pub struct BodyBlend {
    alpha_position: f32,
    alpha_rotation: f32,
}

impl BodyBlend {
    pub fn new(alpha_position: f32, alpha_rotation: f32) -> Self {
        Self {
            alpha_position: alpha_position.clamp(0.0, 1.0),
            alpha_rotation: alpha_rotation.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &SmoothConfig) -> Self {
        Self::new(config.position, config.rotation)
    }

    pub fn position(&self, goal: Vector3<f32>, current: Vector3<f32>) -> Vector3<f32> {
        goal * self.alpha_position + current * (1.0 - self.alpha_position)
    }

    pub fn rotation(&self, goal: UnitQuaternion<f32>, current: UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        slerp(&current, &goal, self.alpha_rotation)
    }
}

/// ボーンごとの実行時状態。未設定は全成分ゼロで表す
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneRuntime {
    pub last: Quaternion<f32>,
    pub goal: Quaternion<f32>,
}

impl Default for BoneRuntime {
    fn default() -> Self {
        Self {
            last: Quaternion::new(0.0, 0.0, 0.0, 0.0),
            goal: Quaternion::new(0.0, 0.0, 0.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BoneRuntimeState {
    bones: EnumMap<HumanBone, BoneRuntime>,
}

impl BoneRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bone: HumanBone) -> &BoneRuntime {
        &self.bones[bone]
    }

    pub fn set_goal(&mut self, bone: HumanBone, goal: UnitQuaternion<f32>) {
        self.bones[bone].goal = goal.into_inner();
    }
}

/// 指ボーンの回転を毎フレームゴールへ寄せる
#[derive(Debug, Clone, Copy)]
pub struct FingerSmoother {
    alpha: f32,
}

impl FingerSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0) }
    }

    pub fn from_config(config: &SmoothConfig) -> Self {
        Self::new(config.finger)
    }

    /// 1ボーン分のブレンド。last・goal・結果のどれかが不正なら None
    pub fn blend(&self, runtime: &BoneRuntime) -> Option<UnitQuaternion<f32>> {
        if is_quaternion_invalid(&runtime.goal) || is_quaternion_invalid(&runtime.last) {
            return None;
        }
        let r = nlerp(&runtime.last, &runtime.goal, self.alpha);
        if is_quaternion_invalid(&r) {
            return None;
        }
        Some(UnitQuaternion::new_unchecked(r))
    }

    /// IK解決後に呼ぶ。適用後のボーン回転を次フレームの last にする
    pub fn apply<R: Rig + ?Sized>(&self, state: &mut BoneRuntimeState, rig: &mut R) {
        for side in Side::BOTH {
            for &bone in HumanBone::fingers(side) {
                if let Some(r) = self.blend(&state.bones[bone]) {
                    rig.set_world_rotation(bone, r);
                }
                if let Some(current) = rig.rotation(bone) {
                    state.bones[bone].last = current.into_inner();
                }
            }
        }
    }
}
