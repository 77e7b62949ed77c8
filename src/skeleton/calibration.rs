use anyhow::{anyhow, bail, Result};
use enum_map::EnumMap;
use nalgebra::{UnitQuaternion, Vector3};

use super::bone::{HumanBone, Side};
use super::rig::Rig;
use crate::retarget::math::{normalize, EPSILON};

/// バインドポーズで取得したボーンの既定値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneReference {
    pub local_offset: Vector3<f32>,
    pub world_position: Vector3<f32>,
    pub world_rotation: UnitQuaternion<f32>,
}

/// ボーンごとの既定値。キャリブレーション後は変更しない
#[derive(Debug, Clone)]
pub struct SkeletonReference {
    bones: EnumMap<HumanBone, Option<BoneReference>>,
}

impl SkeletonReference {
    pub fn capture<R: Rig + ?Sized>(rig: &R) -> Self {
        let mut bones = EnumMap::default();
        for bone in HumanBone::all() {
            bones[bone] = rig.bone(bone).map(|t| BoneReference {
                local_offset: t.local_offset,
                world_position: t.world_position,
                world_rotation: t.world_rotation,
            });
        }
        Self { bones }
    }

    pub fn get(&self, bone: HumanBone) -> Option<&BoneReference> {
        self.bones[bone].as_ref()
    }

    pub fn position(&self, bone: HumanBone) -> Option<Vector3<f32>> {
        self.get(bone).map(|b| b.world_position)
    }

    fn require(&self, bone: HumanBone) -> Result<Vector3<f32>> {
        self.position(bone)
            .ok_or_else(|| anyhow!("required bone {:?} is missing", bone))
    }
}

/// バインドポーズから導出する体の寸法
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyGeometry {
    pub upper_arm_length: f32,
    pub lower_arm_length: f32,
    pub upper_leg_length: f32,
    pub lower_leg_length: f32,
    /// 肩中心 → 上腕
    pub shoulder_center_to_upper_arm: f32,
    /// 腰中心 → 太もも
    pub hip_center_to_upper_leg: f32,
    /// 腰中心 → 肩中心
    pub torso: Vector3<f32>,
    /// 腰中心からルートまでの、胴体方向の割合（上向きが正）
    pub root_up_rate: f32,
    /// ルートの前後オフセット（符号付き）
    pub root_front_offset: f32,
    /// 左太もも → 右太もも
    pub bind_hip_axis: Vector3<f32>,
    bind_front: Vector3<f32>,
}

impl BodyGeometry {
    pub fn measure(reference: &SkeletonReference) -> Result<Self> {
        let hips = reference.require(HumanBone::Hips)?;
        reference.require(HumanBone::Head)?;

        let limb = |side: Side| -> Result<[Vector3<f32>; 6]> {
            Ok([
                reference.require(HumanBone::upper_arm(side))?,
                reference.require(HumanBone::lower_arm(side))?,
                reference.require(HumanBone::hand(side))?,
                reference.require(HumanBone::upper_leg(side))?,
                reference.require(HumanBone::lower_leg(side))?,
                reference.require(HumanBone::foot(side))?,
            ])
        };
        let [lu_arm, ll_arm, l_hand, lu_leg, ll_leg, l_foot] = limb(Side::Left)?;
        let [ru_arm, _, _, ru_leg, _, _] = limb(Side::Right)?;

        let shoulder_center = (lu_arm + ru_arm) * 0.5;
        let hip_center = (lu_leg + ru_leg) * 0.5;
        let torso = shoulder_center - hip_center;
        let bind_hip_axis = ru_leg - lu_leg;

        let lengths = [
            ("upper arm", (ll_arm - lu_arm).norm()),
            ("lower arm", (l_hand - ll_arm).norm()),
            ("upper leg", (ll_leg - lu_leg).norm()),
            ("lower leg", (l_foot - ll_leg).norm()),
            ("shoulder width", (lu_arm - shoulder_center).norm()),
            ("hip width", (lu_leg - hip_center).norm()),
            ("torso", torso.norm()),
        ];
        for (name, length) in lengths {
            if !(length > EPSILON) {
                bail!("{} length must be positive (got {})", name, length);
            }
        }

        let Some(bind_front) = normalize(torso.cross(&bind_hip_axis)) else {
            bail!("torso is parallel to the hip axis");
        };

        // 腰中心 → ルートを胴体方向の割合と前後オフセットに分解する
        let arms_to_legs = -torso;
        let hips_center_to_root = hips - hip_center;
        let root_up_rate = arms_to_legs.dot(&hips_center_to_root) / torso.norm_squared();
        let along = hip_center + arms_to_legs * root_up_rate;
        let root_front_offset = (hips - along).dot(&bind_front);

        Ok(Self {
            upper_arm_length: lengths[0].1,
            lower_arm_length: lengths[1].1,
            upper_leg_length: lengths[2].1,
            lower_leg_length: lengths[3].1,
            shoulder_center_to_upper_arm: lengths[4].1,
            hip_center_to_upper_leg: lengths[5].1,
            torso,
            root_up_rate,
            root_front_offset,
            bind_hip_axis,
            bind_front,
        })
    }

    pub fn torso_length(&self) -> f32 {
        self.torso.norm()
    }

    /// 追跡中の肩中心 → 腰中心ベクトルから見た前方向
    pub fn front_direction(&self, arms_to_legs: Vector3<f32>) -> Vector3<f32> {
        normalize((-arms_to_legs).cross(&self.bind_hip_axis)).unwrap_or(self.bind_front)
    }

    /// 肩中心と肩中心 → 腰中心ベクトルからルート（Hips）位置を復元する
    pub fn reconstruct_root(&self, shoulder_center: Vector3<f32>, arms_to_legs: Vector3<f32>) -> Vector3<f32> {
        shoulder_center
            + arms_to_legs * (1.0 + self.root_up_rate)
            + self.front_direction(arms_to_legs) * self.root_front_offset
    }
}

/// キャリブレーション結果
#[derive(Debug, Clone)]
pub struct Calibration {
    pub reference: SkeletonReference,
    pub geometry: BodyGeometry,
    /// 指ボーンが揃っている側だけ手のリターゲットを行う
    pub hands_enabled: EnumMap<Side, bool>,
}

impl Calibration {
    pub fn from_rig<R: Rig + ?Sized>(rig: &R) -> Result<Self> {
        let reference = SkeletonReference::capture(rig);
        let geometry = BodyGeometry::measure(&reference)?;

        let mut hands_enabled = EnumMap::default();
        for side in Side::BOTH {
            let complete = reference.get(HumanBone::hand(side)).is_some()
                && HumanBone::fingers(side).iter().all(|&b| reference.get(b).is_some());
            if !complete {
                log::info!("{:?} hand has missing finger bones; hand retargeting disabled", side);
            }
            hands_enabled[side] = complete;
        }

        Ok(Self {
            reference,
            geometry,
            hands_enabled,
        })
    }
}

/// アバターのキャリブレーション状態
///
/// `Uninitialized → Calibrating → Ready`。アセット読み込み通知で Calibrating に入り、
/// それを観測した最初のティックで一度だけ計測する。
#[derive(Debug, Default)]
pub enum RigState {
    #[default]
    Uninitialized,
    Calibrating,
    Ready(Box<Calibration>),
}

impl RigState {
    /// アセット読み込み完了の通知
    pub fn request(&mut self) {
        log::debug!("rig state -> Calibrating");
        *self = RigState::Calibrating;
    }

    pub fn reset(&mut self) {
        *self = RigState::Uninitialized;
    }

    /// Calibrating なら計測を行う。今回 Ready になった場合は true
    pub fn advance<R: Rig + ?Sized>(&mut self, rig: &R) -> bool {
        if !matches!(self, RigState::Calibrating) {
            return false;
        }
        match Calibration::from_rig(rig) {
            Ok(calibration) => {
                let g = &calibration.geometry;
                log::info!(
                    "Calibrated: arm {:.3}/{:.3}, leg {:.3}/{:.3}, torso {:.3}, root rate {:.3}, front {:.3}",
                    g.upper_arm_length,
                    g.lower_arm_length,
                    g.upper_leg_length,
                    g.lower_leg_length,
                    g.torso_length(),
                    g.root_up_rate,
                    g.root_front_offset
                );
                *self = RigState::Ready(Box::new(calibration));
                true
            }
            Err(e) => {
                log::warn!("Calibration failed: {:#}", e);
                *self = RigState::Uninitialized;
                false
            }
        }
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        match self {
            RigState::Ready(c) => Some(&**c),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, RigState::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::rig::SkeletonRig;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn approx_eq_vec(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).norm() < eps
    }

    #[test]
    fn test_standard_lengths() {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let g = calibration.geometry;
        assert!(approx_eq_f32(g.upper_arm_length, 0.27, 1e-5));
        assert!(approx_eq_f32(g.lower_arm_length, 0.25, 1e-5));
        assert!(approx_eq_f32(g.upper_leg_length, 0.40, 1e-5));
        assert!(approx_eq_f32(g.lower_leg_length, 0.42, 1e-5));
        assert!(approx_eq_f32(g.shoulder_center_to_upper_arm, 0.18, 1e-5));
        assert!(approx_eq_f32(g.hip_center_to_upper_leg, 0.09, 1e-5));
        assert!(approx_eq_f32(g.torso_length(), 0.50, 1e-5));
        assert!(calibration.hands_enabled[Side::Left]);
        assert!(calibration.hands_enabled[Side::Right]);
    }

    #[test]
    fn test_root_round_trip_from_bind_pose() {
        let mut rig = SkeletonRig::standard();
        // 前後オフセットも検証するため Hips を少しずらす
        rig.set_world_position(HumanBone::Hips, Vector3::new(0.0, 0.97, -0.03));
        let calibration = Calibration::from_rig(&rig).unwrap();
        let g = calibration.geometry;
        assert!(g.root_front_offset.abs() > 0.01);

        let r = &calibration.reference;
        let shoulder_center = (r.position(HumanBone::LeftUpperArm).unwrap()
            + r.position(HumanBone::RightUpperArm).unwrap())
            * 0.5;
        let hip_center = (r.position(HumanBone::LeftUpperLeg).unwrap()
            + r.position(HumanBone::RightUpperLeg).unwrap())
            * 0.5;
        let root = g.reconstruct_root(shoulder_center, hip_center - shoulder_center);
        assert!(approx_eq_vec(&root, &Vector3::new(0.0, 0.97, -0.03), 1e-5));
    }

    #[test]
    fn test_root_rate_is_fraction_of_torso() {
        let g = Calibration::from_rig(&SkeletonRig::standard()).unwrap().geometry;
        // Hips は腰中心より 0.05 上、胴体 0.5 → -0.1
        assert!(approx_eq_f32(g.root_up_rate, -0.1, 1e-5));
        assert!(approx_eq_f32(g.root_front_offset, 0.0, 1e-5));
    }

    #[test]
    fn test_missing_required_bone_is_error() {
        let mut rig = SkeletonRig::standard();
        rig.remove(HumanBone::RightFoot);
        assert!(Calibration::from_rig(&rig).is_err());
    }

    #[test]
    fn test_zero_length_is_error() {
        let mut rig = SkeletonRig::standard();
        let upper = rig.position(HumanBone::LeftUpperArm).unwrap();
        rig.set_world_position(HumanBone::LeftLowerArm, upper);
        assert!(Calibration::from_rig(&rig).is_err());
    }

    #[test]
    fn test_missing_finger_disables_hand() {
        let mut rig = SkeletonRig::standard();
        rig.remove(HumanBone::LeftRingDistal);
        let calibration = Calibration::from_rig(&rig).unwrap();
        assert!(!calibration.hands_enabled[Side::Left]);
        assert!(calibration.hands_enabled[Side::Right]);
    }

    #[test]
    fn test_state_lifecycle() {
        let rig = SkeletonRig::standard();
        let mut state = RigState::default();
        // 通知前は何もしない
        assert!(!state.advance(&rig));
        assert!(state.calibration().is_none());

        state.request();
        assert!(state.advance(&rig));
        assert!(state.is_ready());
        // 2回目以降は計測しない
        assert!(!state.advance(&rig));
        assert!(state.is_ready());
    }

    #[test]
    fn test_failed_calibration_returns_to_uninitialized() {
        let rig = SkeletonRig::new();
        let mut state = RigState::default();
        state.request();
        assert!(!state.advance(&rig));
        assert!(matches!(state, RigState::Uninitialized));
    }
}
