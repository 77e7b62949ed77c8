use enum_map::EnumMap;
use nalgebra::Vector3;

use super::math::scaled_direction;
use crate::config::RetargetConfig;
use crate::landmark::{PoseLandmark, TrackingPacket};
use crate::skeleton::{BodyGeometry, Calibration, HumanBone, SkeletonReference, Side};

/// 四肢1本分のターゲット位置（付け根・中間・末端）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LimbTargets {
    pub upper: Vector3<f32>,
    pub lower: Vector3<f32>,
    pub end: Vector3<f32>,
}

/// 体のワールド空間ターゲット
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BodyTargets {
    pub root: Vector3<f32>,
    pub arms: EnumMap<Side, LimbTargets>,
    pub legs: EnumMap<Side, LimbTargets>,
}

/// 最後に信頼できた時点のベクトル。閾値を越えたときだけ更新する
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FallbackVectors {
    /// 肩中心 → 腰中心
    pub arms_to_legs: Vector3<f32>,
    /// 腰中心 → 太もも
    pub hip_offset: EnumMap<Side, Vector3<f32>>,
    /// 上腕 → 肘
    pub upper_arm: EnumMap<Side, Vector3<f32>>,
    /// 肘 → 手首
    pub lower_arm: EnumMap<Side, Vector3<f32>>,
    /// 太もも → 膝
    pub upper_leg: EnumMap<Side, Vector3<f32>>,
    /// 膝 → 足首
    pub lower_leg: EnumMap<Side, Vector3<f32>>,
}

impl FallbackVectors {
    /// バインドポーズのベクトルで初期化
    fn from_reference(reference: &SkeletonReference) -> Self {
        let p = |bone| reference.position(bone).unwrap_or_else(Vector3::zeros);
        let shoulder_center = (p(HumanBone::LeftUpperArm) + p(HumanBone::RightUpperArm)) * 0.5;
        let hip_center = (p(HumanBone::LeftUpperLeg) + p(HumanBone::RightUpperLeg)) * 0.5;

        let mut v = Self {
            arms_to_legs: hip_center - shoulder_center,
            ..Self::default()
        };
        for side in Side::BOTH {
            v.hip_offset[side] = p(HumanBone::upper_leg(side)) - hip_center;
            v.upper_arm[side] = p(HumanBone::lower_arm(side)) - p(HumanBone::upper_arm(side));
            v.lower_arm[side] = p(HumanBone::hand(side)) - p(HumanBone::lower_arm(side));
            v.upper_leg[side] = p(HumanBone::lower_leg(side)) - p(HumanBone::upper_leg(side));
            v.lower_leg[side] = p(HumanBone::foot(side)) - p(HumanBone::lower_leg(side));
        }
        v
    }
}

fn pose_index(side: Side, left: PoseLandmark, right: PoseLandmark) -> usize {
    match side {
        Side::Left => left as usize,
        Side::Right => right as usize,
    }
}

fn shoulder(side: Side) -> usize {
    pose_index(side, PoseLandmark::LeftShoulder, PoseLandmark::RightShoulder)
}
fn elbow(side: Side) -> usize {
    pose_index(side, PoseLandmark::LeftElbow, PoseLandmark::RightElbow)
}
fn wrist(side: Side) -> usize {
    pose_index(side, PoseLandmark::LeftWrist, PoseLandmark::RightWrist)
}
fn hip(side: Side) -> usize {
    pose_index(side, PoseLandmark::LeftHip, PoseLandmark::RightHip)
}
fn knee(side: Side) -> usize {
    pose_index(side, PoseLandmark::LeftKnee, PoseLandmark::RightKnee)
}
fn ankle(side: Side) -> usize {
    pose_index(side, PoseLandmark::LeftAnkle, PoseLandmark::RightAnkle)
}

/// ポーズランドマークから体のターゲット位置を組み立てる
///
/// 向きだけをランドマークから取り、長さはキャリブレーション値を使う。
/// 信頼度が足りない部位は前回のベクトルを保持する。
pub struct BodyRetargeter {
    center_visibility: f32,
    limb_visibility: f32,
    geometry: BodyGeometry,
    fallback: FallbackVectors,
    targets: BodyTargets,
}

impl BodyRetargeter {
    pub fn new(calibration: &Calibration, config: &RetargetConfig) -> Self {
        let reference = &calibration.reference;
        let p = |bone| reference.position(bone).unwrap_or_else(Vector3::zeros);

        let mut targets = BodyTargets {
            root: p(HumanBone::Hips),
            ..BodyTargets::default()
        };
        for side in Side::BOTH {
            targets.arms[side] = LimbTargets {
                upper: p(HumanBone::upper_arm(side)),
                lower: p(HumanBone::lower_arm(side)),
                end: p(HumanBone::hand(side)),
            };
            targets.legs[side] = LimbTargets {
                upper: p(HumanBone::upper_leg(side)),
                lower: p(HumanBone::lower_leg(side)),
                end: p(HumanBone::foot(side)),
            };
        }

        Self {
            center_visibility: config.center_visibility,
            limb_visibility: config.limb_visibility,
            geometry: calibration.geometry,
            fallback: FallbackVectors::from_reference(reference),
            targets,
        }
    }

    pub fn targets(&self) -> &BodyTargets {
        &self.targets
    }

    pub fn fallback(&self) -> &FallbackVectors {
        &self.fallback
    }

    pub fn update(&mut self, packet: &TrackingPacket) {
        let g = self.geometry;

        // 肩
        let shoulders = Side::BOTH.map(|side| packet.position(shoulder(side)));
        let shoulder_center = (shoulders[0] + shoulders[1]) * 0.5;
        for (i, side) in Side::BOTH.into_iter().enumerate() {
            if packet.visibility(shoulder(side)) > self.center_visibility {
                if let Some(v) = scaled_direction(shoulders[i] - shoulder_center, g.shoulder_center_to_upper_arm) {
                    self.targets.arms[side].upper = shoulder_center + v;
                }
            }
        }

        // 腰
        let hips_tracked = Side::BOTH
            .iter()
            .all(|&side| packet.visibility(hip(side)) >= self.center_visibility);
        if hips_tracked {
            let hips = Side::BOTH.map(|side| packet.position(hip(side)));
            let hip_center = (hips[0] + hips[1]) * 0.5;
            for (i, side) in Side::BOTH.into_iter().enumerate() {
                if let Some(v) = scaled_direction(hips[i] - hip_center, g.hip_center_to_upper_leg) {
                    self.fallback.hip_offset[side] = v;
                }
            }
            if let Some(v) = scaled_direction(hip_center - shoulder_center, g.torso_length()) {
                self.fallback.arms_to_legs = v;
            }
        }
        for side in Side::BOTH {
            self.targets.legs[side].upper =
                shoulder_center + self.fallback.arms_to_legs + self.fallback.hip_offset[side];
        }

        self.targets.root = g.reconstruct_root(shoulder_center, self.fallback.arms_to_legs);

        for side in Side::BOTH {
            self.update_arm(packet, side);
            self.update_leg(packet, side, hips_tracked);
        }
    }

    fn tracked(&self, packet: &TrackingPacket, index: usize) -> bool {
        packet.visibility(index) > self.limb_visibility
    }

    fn update_arm(&mut self, packet: &TrackingPacket, side: Side) {
        let g = self.geometry;
        if self.tracked(packet, elbow(side)) && self.tracked(packet, wrist(side)) {
            let shoulder_pos = packet.position(shoulder(side));
            let elbow_pos = packet.position(elbow(side));
            let wrist_pos = packet.position(wrist(side));
            if let Some(v) = scaled_direction(elbow_pos - shoulder_pos, g.upper_arm_length) {
                self.fallback.upper_arm[side] = v;
            }
            if let Some(v) = scaled_direction(wrist_pos - elbow_pos, g.lower_arm_length) {
                self.fallback.lower_arm[side] = v;
            }
        }
        let arm = &mut self.targets.arms[side];
        arm.lower = arm.upper + self.fallback.upper_arm[side];
        arm.end = arm.lower + self.fallback.lower_arm[side];
    }

    fn update_leg(&mut self, packet: &TrackingPacket, side: Side, hips_tracked: bool) {
        let g = self.geometry;
        let hip_pos = packet.position(hip(side));
        let knee_pos = packet.position(knee(side));
        let ankle_pos = packet.position(ankle(side));

        let knee_tracked = hips_tracked && self.tracked(packet, knee(side));
        if knee_tracked {
            if let Some(v) = scaled_direction(knee_pos - hip_pos, g.upper_leg_length) {
                self.fallback.upper_leg[side] = v;
            }
        }
        if knee_tracked && self.tracked(packet, ankle(side)) {
            if let Some(v) = scaled_direction(ankle_pos - knee_pos, g.lower_leg_length) {
                self.fallback.lower_leg[side] = v;
            }
        }
        let leg = &mut self.targets.legs[side];
        leg.lower = leg.upper + self.fallback.upper_leg[side];
        leg.end = leg.lower + self.fallback.lower_leg[side];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{Landmark, StreamKind};
    use crate::skeleton::SkeletonRig;
    use proptest::prelude::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn approx_eq_vec(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).norm() < eps
    }

    fn setup() -> (Calibration, BodyRetargeter) {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let retargeter = BodyRetargeter::new(&calibration, &RetargetConfig::default());
        (calibration, retargeter)
    }

    /// バインドポーズの位置をそのままランドマークにしたパケット
    fn bind_packet(calibration: &Calibration, visibility: f32) -> Vec<Landmark> {
        let mut landmarks = vec![Landmark::default(); PoseLandmark::COUNT];
        let r = &calibration.reference;
        for side in Side::BOTH {
            let pairs = [
                (shoulder(side), HumanBone::upper_arm(side)),
                (elbow(side), HumanBone::lower_arm(side)),
                (wrist(side), HumanBone::hand(side)),
                (hip(side), HumanBone::upper_leg(side)),
                (knee(side), HumanBone::lower_leg(side)),
                (ankle(side), HumanBone::foot(side)),
            ];
            for (index, bone) in pairs {
                landmarks[index] = Landmark::from_position(r.position(bone).unwrap(), visibility);
            }
        }
        landmarks
    }

    fn packet(landmarks: Vec<Landmark>) -> TrackingPacket {
        TrackingPacket::new(StreamKind::Pose, landmarks).unwrap()
    }

    #[test]
    fn test_initial_targets_are_bind_pose() {
        let (calibration, body) = setup();
        let r = &calibration.reference;
        assert_eq!(body.targets().root, r.position(HumanBone::Hips).unwrap());
        assert_eq!(body.targets().arms[Side::Left].end, r.position(HumanBone::LeftHand).unwrap());
    }

    #[test]
    fn test_bind_pose_reproduces_bind_targets() {
        let (calibration, mut body) = setup();
        body.update(&packet(bind_packet(&calibration, 1.0)));
        let r = &calibration.reference;
        let t = body.targets();
        assert!(approx_eq_vec(&t.root, &r.position(HumanBone::Hips).unwrap(), 1e-5));
        for side in Side::BOTH {
            assert!(approx_eq_vec(&t.arms[side].upper, &r.position(HumanBone::upper_arm(side)).unwrap(), 1e-5));
            assert!(approx_eq_vec(&t.arms[side].end, &r.position(HumanBone::hand(side)).unwrap(), 1e-5));
            assert!(approx_eq_vec(&t.legs[side].upper, &r.position(HumanBone::upper_leg(side)).unwrap(), 1e-5));
            assert!(approx_eq_vec(&t.legs[side].end, &r.position(HumanBone::foot(side)).unwrap(), 1e-5));
        }
    }

    #[test]
    fn test_segment_lengths_match_calibration() {
        let (calibration, mut body) = setup();
        // 体の大きさが違う人物（2倍）でも、長さはアバターに合わせる
        let mut landmarks = bind_packet(&calibration, 1.0);
        for l in landmarks.iter_mut() {
            *l = Landmark::from_position(l.position() * 2.0 + Vector3::new(0.3, 0.0, 0.1), 1.0);
        }
        landmarks[elbow(Side::Left)].y -= 0.4;
        landmarks[knee(Side::Right)].z -= 0.5;
        body.update(&packet(landmarks));

        let g = calibration.geometry;
        let t = body.targets();
        for side in Side::BOTH {
            let arm = t.arms[side];
            let leg = t.legs[side];
            assert!(approx_eq_f32((arm.lower - arm.upper).norm(), g.upper_arm_length, 1e-5));
            assert!(approx_eq_f32((arm.end - arm.lower).norm(), g.lower_arm_length, 1e-5));
            assert!(approx_eq_f32((leg.lower - leg.upper).norm(), g.upper_leg_length, 1e-5));
            assert!(approx_eq_f32((leg.end - leg.lower).norm(), g.lower_leg_length, 1e-5));
        }
    }

    #[test]
    fn test_low_confidence_keeps_fallback_bit_identical() {
        let (calibration, mut body) = setup();
        let mut landmarks = bind_packet(&calibration, 1.0);
        landmarks[elbow(Side::Left)].y -= 0.2;
        body.update(&packet(landmarks));
        let held = body.fallback().clone();

        // 腰と四肢の信頼度ゼロのフレームが続いても、保持ベクトルは変わらない
        for i in 0..50 {
            let mut noisy = bind_packet(&calibration, 0.0);
            for l in noisy.iter_mut() {
                l.x += (i as f32) * 0.013;
                l.z -= (i as f32) * 0.007;
            }
            body.update(&packet(noisy));
            assert_eq!(body.fallback(), &held);
        }
    }

    #[test]
    fn test_low_shoulder_visibility_holds_target() {
        let (calibration, mut body) = setup();
        body.update(&packet(bind_packet(&calibration, 1.0)));
        let before = body.targets().arms[Side::Left].upper;

        let mut landmarks = bind_packet(&calibration, 1.0);
        landmarks[shoulder(Side::Left)].visibility = 0.5;
        landmarks[shoulder(Side::Left)].y += 0.3;
        body.update(&packet(landmarks));
        assert_eq!(body.targets().arms[Side::Left].upper, before);
    }

    #[test]
    fn test_degenerate_segment_keeps_previous_vector() {
        let (calibration, mut body) = setup();
        body.update(&packet(bind_packet(&calibration, 1.0)));
        let before = body.fallback().lower_arm[Side::Right];

        let mut landmarks = bind_packet(&calibration, 1.0);
        landmarks[wrist(Side::Right)] = landmarks[elbow(Side::Right)];
        body.update(&packet(landmarks));
        let after = body.fallback().lower_arm[Side::Right];
        assert_eq!(after, before);
        assert!(body.targets().arms[Side::Right].end.iter().all(|v| v.is_finite()));
    }

    fn all_finite(t: &BodyTargets) -> bool {
        let mut points = vec![t.root];
        for side in Side::BOTH {
            for limb in [t.arms[side], t.legs[side]] {
                points.extend([limb.upper, limb.lower, limb.end]);
            }
        }
        points.iter().all(|p| p.iter().all(|v| v.is_finite()))
    }

    #[test]
    fn test_nan_shoulder_never_reaches_targets() {
        let (calibration, mut body) = setup();
        let mut landmarks = bind_packet(&calibration, 1.0);
        landmarks[shoulder(Side::Left)] = Landmark::new(f32::NAN, 0.0, 0.0, 0.0);
        assert!(TrackingPacket::new(StreamKind::Pose, landmarks).is_none());

        // 信頼度ゼロの肩が両方とも原点に潰れていても NaN にならない
        let mut landmarks = bind_packet(&calibration, 1.0);
        landmarks[shoulder(Side::Left)] = Landmark::default();
        landmarks[shoulder(Side::Right)] = Landmark::default();
        body.update(&packet(landmarks));
        assert!(all_finite(body.targets()));
    }

    #[test]
    fn test_untracked_hips_freeze_legs() {
        let (calibration, mut body) = setup();
        body.update(&packet(bind_packet(&calibration, 1.0)));
        let before = body.fallback().upper_leg[Side::Left];

        let mut landmarks = bind_packet(&calibration, 1.0);
        landmarks[hip(Side::Right)].visibility = 0.3;
        landmarks[knee(Side::Left)].x += 0.3;
        body.update(&packet(landmarks));
        // 腰が未追跡なら膝が見えていても脚は更新しない
        assert_eq!(body.fallback().upper_leg[Side::Left], before);
    }

    proptest! {
        #[test]
        fn prop_symmetric_pose_gives_mirrored_targets(
            elbow_drop in -0.3f32..0.3, elbow_fwd in -0.3f32..0.3,
            knee_fwd in -0.3f32..0.3, lean in -0.2f32..0.2,
        ) {
            let (calibration, mut body) = setup();
            let mut landmarks = bind_packet(&calibration, 1.0);
            for side in Side::BOTH {
                landmarks[elbow(side)].y += elbow_drop;
                landmarks[elbow(side)].z += elbow_fwd;
                landmarks[knee(side)].z += knee_fwd;
                landmarks[shoulder(side)].z += lean;
            }
            body.update(&packet(landmarks));

            let t = body.targets();
            let reflect = |v: Vector3<f32>| Vector3::new(-v.x, v.y, v.z);
            prop_assert!(t.root.x.abs() < 1e-4);
            for (l, r) in [
                (t.arms[Side::Left].upper, t.arms[Side::Right].upper),
                (t.arms[Side::Left].lower, t.arms[Side::Right].lower),
                (t.arms[Side::Left].end, t.arms[Side::Right].end),
                (t.legs[Side::Left].upper, t.legs[Side::Right].upper),
                (t.legs[Side::Left].lower, t.legs[Side::Right].lower),
                (t.legs[Side::Left].end, t.legs[Side::Right].end),
            ] {
                prop_assert!(approx_eq_vec(&l, &reflect(r), 1e-4));
            }
        }
    }
}
