use anyhow::{bail, Context, Result};
use enum_map::EnumMap;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::bone::{HumanBone, Side};
use crate::ik::{Effector, EffectorKind, IkTargets};
use crate::retarget::math::{normalize_quaternion, quaternion_from_xyzw, slerp};

/// ボーン1本のワールド姿勢
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneTransform {
    pub world_position: Vector3<f32>,
    pub world_rotation: UnitQuaternion<f32>,
    /// 親ボーンのローカル座標系でのオフセット
    pub local_offset: Vector3<f32>,
}

/// 名前付きボーンを持つスケルトン
pub trait Rig {
    fn bone(&self, bone: HumanBone) -> Option<BoneTransform>;

    /// 指ボーンの回転適用に使う
    fn set_world_rotation(&mut self, bone: HumanBone, rotation: UnitQuaternion<f32>);

    fn position(&self, bone: HumanBone) -> Option<Vector3<f32>> {
        self.bone(bone).map(|b| b.world_position)
    }

    fn rotation(&self, bone: HumanBone) -> Option<UnitQuaternion<f32>> {
        self.bone(bone).map(|b| b.world_rotation)
    }
}

/// エンジンを持たない場合のスケルトン実装
#[derive(Debug, Clone)]
pub struct SkeletonRig {
    bones: EnumMap<HumanBone, Option<BoneTransform>>,
}

/// バインドポーズJSONの1エントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigBoneEntry {
    pub bone: HumanBone,
    pub position: [f32; 3],
    /// (x, y, z, w)
    #[serde(default = "default_rotation")]
    pub rotation: [f32; 4],
    #[serde(default)]
    pub local_offset: Option<[f32; 3]>,
}

/// バインドポーズJSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigFile {
    pub bones: Vec<RigBoneEntry>,
}

fn default_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

// 標準Tポーズ: -Z を向き、左手が +X 側（Y軸まわりに180度回したVRM相当）
const STANDARD_POSITIONS: &[(HumanBone, [f32; 3])] = &[
    (HumanBone::Hips, [0.0, 0.95, 0.0]),
    (HumanBone::Spine, [0.0, 1.05, 0.0]),
    (HumanBone::Chest, [0.0, 1.20, 0.0]),
    (HumanBone::Neck, [0.0, 1.45, 0.0]),
    (HumanBone::Head, [0.0, 1.55, 0.0]),
    (HumanBone::LeftShoulder, [0.05, 1.40, 0.0]),
    (HumanBone::LeftUpperArm, [0.18, 1.40, 0.0]),
    (HumanBone::LeftLowerArm, [0.45, 1.40, 0.0]),
    (HumanBone::LeftHand, [0.70, 1.40, 0.0]),
    (HumanBone::LeftUpperLeg, [0.09, 0.90, 0.0]),
    (HumanBone::LeftLowerLeg, [0.09, 0.50, 0.0]),
    (HumanBone::LeftFoot, [0.09, 0.08, 0.0]),
    (HumanBone::LeftThumbProximal, [0.72, 1.40, -0.03]),
    (HumanBone::LeftThumbIntermediate, [0.75, 1.40, -0.045]),
    (HumanBone::LeftThumbDistal, [0.775, 1.40, -0.055]),
    (HumanBone::LeftIndexProximal, [0.79, 1.40, -0.025]),
    (HumanBone::LeftIndexIntermediate, [0.83, 1.40, -0.025]),
    (HumanBone::LeftIndexDistal, [0.855, 1.40, -0.025]),
    (HumanBone::LeftMiddleProximal, [0.795, 1.40, -0.005]),
    (HumanBone::LeftMiddleIntermediate, [0.84, 1.40, -0.005]),
    (HumanBone::LeftMiddleDistal, [0.865, 1.40, -0.005]),
    (HumanBone::LeftRingProximal, [0.79, 1.40, 0.015]),
    (HumanBone::LeftRingIntermediate, [0.83, 1.40, 0.015]),
    (HumanBone::LeftRingDistal, [0.855, 1.40, 0.015]),
    (HumanBone::LeftLittleProximal, [0.78, 1.40, 0.035]),
    (HumanBone::LeftLittleIntermediate, [0.81, 1.40, 0.035]),
    (HumanBone::LeftLittleDistal, [0.83, 1.40, 0.035]),
];

impl SkeletonRig {
    /// ボーンなし
    pub fn new() -> Self {
        Self { bones: EnumMap::default() }
    }

    /// 組み込みの標準Tポーズ
    pub fn standard() -> Self {
        let turned = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::PI);
        let mut positions: EnumMap<HumanBone, Option<Vector3<f32>>> = EnumMap::default();
        for &(bone, p) in STANDARD_POSITIONS {
            let p = Vector3::new(p[0], p[1], p[2]);
            positions[bone] = Some(p);
            // 左側の定義から右側を X 反転で作る
            if let Some(right) = mirrored_bone(bone) {
                positions[right] = Some(Vector3::new(-p.x, p.y, p.z));
            }
        }

        let world: Vec<(HumanBone, Vector3<f32>, UnitQuaternion<f32>)> = positions
            .iter()
            .filter_map(|(bone, p)| p.map(|p| (bone, p, turned)))
            .collect();
        Self::from_world_poses(&world)
    }

    /// ワールド姿勢だけからローカルオフセットを補って組み立てる
    fn from_world_poses(poses: &[(HumanBone, Vector3<f32>, UnitQuaternion<f32>)]) -> Self {
        let mut rig = Self::new();
        for &(bone, position, rotation) in poses {
            rig.bones[bone] = Some(BoneTransform {
                world_position: position,
                world_rotation: rotation,
                local_offset: Vector3::zeros(),
            });
        }
        for &(bone, _, _) in poses {
            let offset = rig.derive_local_offset(bone);
            if let Some(t) = rig.bones[bone].as_mut() {
                t.local_offset = offset;
            }
        }
        rig
    }

    /// 最も近い既存の祖先を親とみなす
    fn derive_local_offset(&self, bone: HumanBone) -> Vector3<f32> {
        let Some(transform) = self.bones[bone] else {
            return Vector3::zeros();
        };
        let mut ancestor = bone.parent();
        while let Some(parent) = ancestor {
            if let Some(p) = self.bones[parent] {
                return p
                    .world_rotation
                    .inverse_transform_vector(&(transform.world_position - p.world_position));
            }
            ancestor = parent.parent();
        }
        transform.world_position
    }

    pub fn from_rig_file(file: &RigFile) -> Result<Self> {
        let mut poses = Vec::with_capacity(file.bones.len());
        for entry in &file.bones {
            if poses.iter().any(|(b, _, _)| *b == entry.bone) {
                bail!("duplicate bone {:?} in rig file", entry.bone);
            }
            let q = quaternion_from_xyzw(entry.rotation);
            let Some(rotation) = normalize_quaternion(&q) else {
                bail!("bone {:?} has a zero rotation", entry.bone);
            };
            let [x, y, z] = entry.position;
            poses.push((entry.bone, Vector3::new(x, y, z), UnitQuaternion::new_unchecked(rotation)));
        }

        let mut rig = Self::from_world_poses(&poses);
        for entry in &file.bones {
            if let (Some([x, y, z]), Some(t)) = (entry.local_offset, rig.bones[entry.bone].as_mut()) {
                t.local_offset = Vector3::new(x, y, z);
            }
        }
        Ok(rig)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rig file {}", path.display()))?;
        let file: RigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse rig file {}", path.display()))?;
        Self::from_rig_file(&file).with_context(|| format!("Invalid rig file {}", path.display()))
    }

    pub fn insert(&mut self, bone: HumanBone, transform: BoneTransform) {
        self.bones[bone] = Some(transform);
    }

    pub fn remove(&mut self, bone: HumanBone) -> Option<BoneTransform> {
        self.bones[bone].take()
    }

    pub fn set_world_position(&mut self, bone: HumanBone, position: Vector3<f32>) {
        if let Some(t) = self.bones[bone].as_mut() {
            t.world_position = position;
        }
    }

    pub fn bone_count(&self) -> usize {
        self.bones.values().filter(|b| b.is_some()).count()
    }

    /// 外部ソルバーを持たない場合の簡易追従。
    /// エフェクタと曲げゴールのボーンをウェイト分だけターゲットへ寄せ、子孫ボーンも一緒に動かす。
    /// 関節の制約は解かないので骨の長さは保たれない
    pub fn follow(&mut self, targets: &IkTargets) {
        use EffectorKind::*;
        // 親側から動かす。末端を先に動かすと親の移動で上書きされる
        for kind in [Body, LeftShoulder, RightShoulder, LeftThigh, RightThigh] {
            self.follow_effector(kind, &targets.effectors[kind]);
        }
        for (chain, goal) in &targets.bend_goals {
            let bone = chain.bend_bone();
            if let Some(t) = self.bones[bone] {
                let w = goal.weight.clamp(0.0, 1.0);
                self.move_subtree(bone, (goal.position - t.world_position) * w, UnitQuaternion::identity());
            }
        }
        for kind in [LeftHand, RightHand, LeftFoot, RightFoot, Head] {
            self.follow_effector(kind, &targets.effectors[kind]);
        }
    }

    fn follow_effector(&mut self, kind: EffectorKind, effector: &Effector) {
        let bone = kind.bone();
        let Some(t) = self.bones[bone] else {
            return;
        };
        let pw = effector.position_weight.clamp(0.0, 1.0);
        let translation = (effector.position - t.world_position) * pw;
        let rw = effector.rotation_weight.clamp(0.0, 1.0);
        let rotation = if rw > 0.0 && matches!(kind, EffectorKind::Head | EffectorKind::LeftHand | EffectorKind::RightHand) {
            slerp(&t.world_rotation, &effector.rotation, rw) * t.world_rotation.inverse()
        } else {
            UnitQuaternion::identity()
        };
        self.move_subtree(bone, translation, rotation);
    }

    /// `root` 以下を `root` の位置を中心に回し、平行移動する
    fn move_subtree(&mut self, root: HumanBone, translation: Vector3<f32>, rotation: UnitQuaternion<f32>) {
        let Some(pivot) = self.bones[root].map(|t| t.world_position) else {
            return;
        };
        for (bone, slot) in self.bones.iter_mut() {
            let Some(t) = slot.as_mut() else {
                continue;
            };
            if is_within(bone, root) {
                t.world_position = pivot + rotation * (t.world_position - pivot) + translation;
                t.world_rotation = rotation * t.world_rotation;
            }
        }
    }

    pub fn to_rig_file(&self) -> RigFile {
        let bones = self
            .bones
            .iter()
            .filter_map(|(bone, t)| {
                t.map(|t| {
                    let q = t.world_rotation.into_inner();
                    RigBoneEntry {
                        bone,
                        position: [t.world_position.x, t.world_position.y, t.world_position.z],
                        rotation: [q.i, q.j, q.k, q.w],
                        local_offset: Some([t.local_offset.x, t.local_offset.y, t.local_offset.z]),
                    }
                })
            })
            .collect();
        RigFile { bones }
    }
}

impl Default for SkeletonRig {
    fn default() -> Self {
        Self::new()
    }
}

impl Rig for SkeletonRig {
    fn bone(&self, bone: HumanBone) -> Option<BoneTransform> {
        self.bones[bone]
    }

    fn set_world_rotation(&mut self, bone: HumanBone, rotation: UnitQuaternion<f32>) {
        if let Some(t) = self.bones[bone].as_mut() {
            t.world_rotation = rotation;
        }
    }
}

/// `bone` が `root` 自身かその子孫か
fn is_within(bone: HumanBone, root: HumanBone) -> bool {
    let mut current = Some(bone);
    while let Some(b) = current {
        if b == root {
            return true;
        }
        current = b.parent();
    }
    false
}

/// 左側ボーンに対応する右側ボーン
fn mirrored_bone(bone: HumanBone) -> Option<HumanBone> {
    if let Some(parts) = bone.finger_parts() {
        if parts.side == Side::Left {
            return HumanBone::finger(Side::Right, parts.finger, parts.joint);
        }
        return None;
    }
    let right = match bone {
        HumanBone::LeftShoulder => HumanBone::RightShoulder,
        HumanBone::LeftUpperArm => HumanBone::upper_arm(Side::Right),
        HumanBone::LeftLowerArm => HumanBone::lower_arm(Side::Right),
        HumanBone::LeftHand => HumanBone::hand(Side::Right),
        HumanBone::LeftUpperLeg => HumanBone::upper_leg(Side::Right),
        HumanBone::LeftLowerLeg => HumanBone::lower_leg(Side::Right),
        HumanBone::LeftFoot => HumanBone::foot(Side::Right),
        _ => return None,
    };
    Some(right)
}
