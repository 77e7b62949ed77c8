use enum_map::EnumMap;
use nalgebra::{UnitQuaternion, Vector3};

use super::math::{from_to_rotation, remove_twist, rotate_vectors};
use super::smooth::BoneRuntimeState;
use crate::landmark::{HandLandmark, TrackingPacket};
use crate::skeleton::{Calibration, FingerJoint, HumanBone, SkeletonReference, Side};

/// 指ボーン1本分の既定方向（ボーンのローカル空間）
#[derive(Debug, Clone, Copy)]
struct FingerRest {
    bone: HumanBone,
    bind: UnitQuaternion<f32>,
    direction: Vector3<f32>,
    /// 向きを合わせる先のランドマーク
    landmark: usize,
}

/// 片手分の既定値
#[derive(Debug, Clone)]
struct HandRest {
    index_offset: Vector3<f32>,
    little_offset: Vector3<f32>,
    fingers: Vec<FingerRest>,
}

impl HandRest {
    fn capture(reference: &SkeletonReference, side: Side) -> Option<Self> {
        let index = reference.get(HumanBone::finger(side, 1, FingerJoint::Proximal)?)?;
        let little = reference.get(HumanBone::finger(side, 4, FingerJoint::Proximal)?)?;

        let bones = HumanBone::fingers(side);
        let mut fingers = Vec::with_capacity(bones.len());
        for (i, &bone) in bones.iter().enumerate() {
            let parts = bone.finger_parts()?;
            let this = reference.get(bone)?;
            // 指先の先にはボーンがないので、一つ手前の節からの向きで代用する
            let world = match parts.joint {
                FingerJoint::Distal => this.world_position - reference.position(bones[i - 1])?,
                _ => reference.position(bones[i + 1])? - this.world_position,
            };
            let direction = this.world_rotation.inverse_transform_vector(&world);
            let joint = match parts.joint {
                FingerJoint::Proximal => 0,
                FingerJoint::Intermediate => 1,
                FingerJoint::Distal => 2,
            };
            fingers.push(FingerRest {
                bone,
                bind: this.world_rotation,
                direction,
                landmark: HandLandmark::finger_base(parts.finger) + joint + 1,
            });
        }

        Some(Self {
            index_offset: index.local_offset,
            little_offset: little.local_offset,
            fingers,
        })
    }
}

/// 手のランドマークから手首の向きと指のゴール回転を求める
pub struct HandRetargeter {
    rest: EnumMap<Side, Option<HandRest>>,
}

impl HandRetargeter {
    pub fn new(calibration: &Calibration) -> Self {
        let mut rest = EnumMap::default();
        for side in Side::BOTH {
            if calibration.hands_enabled[side] {
                rest[side] = HandRest::capture(&calibration.reference, side);
            }
        }
        Self { rest }
    }

    pub fn is_enabled(&self, side: Side) -> bool {
        self.rest[side].is_some()
    }

    /// 指のゴールを `state` に書き込み、手首のワールド回転を返す
    pub fn update(
        &self,
        packet: &TrackingPacket,
        side: Side,
        state: &mut BoneRuntimeState,
    ) -> Option<UnitQuaternion<f32>> {
        let rest = self.rest[side].as_ref()?;

        let wrist = packet.position(HandLandmark::Wrist as usize);
        let index = packet.position(HandLandmark::Index0 as usize);
        let pinky = packet.position(HandLandmark::Pinky0 as usize);
        // 手首・人差し指の付け根・小指の付け根の三角形を手のひらの向きとする
        let wrist_rotation = rotate_vectors(rest.index_offset, rest.little_offset, index - wrist, pinky - wrist);

        // バインド姿勢からのスイングだけを足す。ボーン軸まわりのひねりは持ち込まない
        let local = landmark_local_offsets(packet);
        for finger in &rest.fingers {
            let target = finger.bind.inverse_transform_vector(&local[finger.landmark]);
            let swing = remove_twist(from_to_rotation(finger.direction, target), finger.direction);
            state.set_goal(finger.bone, finger.bind * swing);
        }

        Some(wrist_rotation)
    }
}

/// 指の付け根は手首から、それ以外は一つ前の関節からの相対位置
fn landmark_local_offsets(packet: &TrackingPacket) -> [Vector3<f32>; HandLandmark::COUNT] {
    let wrist = packet.position(HandLandmark::Wrist as usize);
    let mut local = [Vector3::zeros(); HandLandmark::COUNT];
    for (i, slot) in local.iter_mut().enumerate().skip(1) {
        let base = if (i - 1) % HandLandmark::PER_FINGER == 0 {
            wrist
        } else {
            packet.position(i - 1)
        };
        *slot = packet.position(i) - base;
    }
    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{Landmark, StreamKind};
    use crate::skeleton::SkeletonRig;

    fn approx_eq_vec(a: &Vector3<f32>, b: &Vector3<f32>, eps: f32) -> bool {
        (a - b).norm() < eps
    }

    /// リグの指ボーン位置から作ったランドマーク（指先はボーン延長）
    fn bind_hand(calibration: &Calibration, side: Side) -> TrackingPacket {
        let r = &calibration.reference;
        let mut landmarks = vec![Landmark::default(); HandLandmark::COUNT];
        landmarks[0] = Landmark::from_position(r.position(HumanBone::hand(side)).unwrap(), 1.0);
        let bones = HumanBone::fingers(side);
        for finger in 0..5 {
            let base = HandLandmark::finger_base(finger);
            let p: Vec<Vector3<f32>> = (0..3).map(|j| r.position(bones[finger * 3 + j]).unwrap()).collect();
            landmarks[base] = Landmark::from_position(p[0], 1.0);
            landmarks[base + 1] = Landmark::from_position(p[1], 1.0);
            landmarks[base + 2] = Landmark::from_position(p[2], 1.0);
            landmarks[base + 3] = Landmark::from_position(p[2] + (p[2] - p[1]), 1.0);
        }
        // 親指の付け根はCMC。リグに対応ボーンがないので手首と付け根の中点に置く
        let thumb = HandLandmark::Thumb0 as usize;
        landmarks[thumb] = Landmark::from_position(
            (landmarks[0].position() + r.position(bones[0]).unwrap()) * 0.5,
            1.0,
        );
        let kind = match side {
            Side::Left => StreamKind::LeftHand,
            Side::Right => StreamKind::RightHand,
        };
        TrackingPacket::new(kind, landmarks).unwrap()
    }

    #[test]
    fn test_local_offsets() {
        let landmarks: Vec<Landmark> = (0..21).map(|i| Landmark::new(i as f32, 0.0, 0.0, 1.0)).collect();
        let packet = TrackingPacket::new(StreamKind::LeftHand, landmarks).unwrap();
        let local = landmark_local_offsets(&packet);
        assert_eq!(local[0], Vector3::zeros());
        // 付け根は手首から
        assert_eq!(local[5], Vector3::new(5.0, 0.0, 0.0));
        assert_eq!(local[17], Vector3::new(17.0, 0.0, 0.0));
        // それ以外は直前の関節から
        assert_eq!(local[6], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(local[20], Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_bind_hand_gives_bind_wrist_rotation() {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let hands = HandRetargeter::new(&calibration);
        let mut state = BoneRuntimeState::new();
        for side in Side::BOTH {
            let wrist = hands.update(&bind_hand(&calibration, side), side, &mut state).unwrap();
            let bind = calibration.reference.get(HumanBone::hand(side)).unwrap().world_rotation;
            assert!(wrist.angle_to(&bind) < 1e-4, "{:?}: {}", side, wrist.angle_to(&bind));
        }
    }

    #[test]
    fn test_turned_hand_gives_turned_wrist_rotation() {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let hands = HandRetargeter::new(&calibration);
        let mut state = BoneRuntimeState::new();
        let turn = UnitQuaternion::from_euler_angles(0.4, -0.3, 0.8);
        for side in Side::BOTH {
            let packet = bind_hand(&calibration, side);
            let wrist = packet.position(HandLandmark::Wrist as usize);
            let turned: Vec<Landmark> = packet
                .landmarks()
                .iter()
                .map(|l| Landmark::from_position(wrist + turn * (l.position() - wrist), 1.0))
                .collect();
            let packet = TrackingPacket::new(packet.kind(), turned).unwrap();
            let rotation = hands.update(&packet, side, &mut state).unwrap();
            let bind = calibration.reference.get(HumanBone::hand(side)).unwrap().world_rotation;
            assert!(rotation.angle_to(&(turn * bind)) < 1e-4, "{:?}", side);
        }
    }

    #[test]
    fn test_finger_goals_point_bones_at_landmarks() {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let hands = HandRetargeter::new(&calibration);
        let mut state = BoneRuntimeState::new();
        let packet = bind_hand(&calibration, Side::Left);
        hands.update(&packet, Side::Left, &mut state);

        let local = landmark_local_offsets(&packet);
        let rest = hands.rest[Side::Left].as_ref().unwrap();
        for finger in &rest.fingers {
            let goal = state.get(finger.bone).goal;
            let goal = UnitQuaternion::new_normalize(goal);
            let pointed = (goal * finger.direction).normalize();
            assert!(approx_eq_vec(&pointed, &local[finger.landmark].normalize(), 1e-4));
        }
    }

    #[test]
    fn test_bind_fingers_match_bind_rotation() {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let hands = HandRetargeter::new(&calibration);
        let mut state = BoneRuntimeState::new();
        hands.update(&bind_hand(&calibration, Side::Right), Side::Right, &mut state);
        // 人差し指〜小指は手と同じ高さに並ぶので、ゴールはバインド回転に一致する
        for &bone in &HumanBone::fingers(Side::Right)[3..] {
            let goal = UnitQuaternion::new_normalize(state.get(bone).goal);
            let bind = calibration.reference.get(bone).unwrap().world_rotation;
            assert!(goal.angle_to(&bind) < 1e-4, "{:?}", bone);
        }
    }

    #[test]
    fn test_bent_finger_keeps_bind_roll() {
        let calibration = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let hands = HandRetargeter::new(&calibration);
        let mut state = BoneRuntimeState::new();

        // 人差し指の第2関節だけを下へ曲げる
        let mut landmarks = bind_hand(&calibration, Side::Left).landmarks().to_vec();
        let base = HandLandmark::finger_base(1);
        let bend = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -0.6);
        let p1 = landmarks[base + 1].position();
        let p2 = landmarks[base + 2].position();
        landmarks[base + 2] = Landmark::from_position(p1 + bend * (p2 - p1), 1.0);
        let packet = TrackingPacket::new(StreamKind::LeftHand, landmarks).unwrap();
        hands.update(&packet, Side::Left, &mut state);

        let bone = HumanBone::LeftIndexIntermediate;
        let goal = UnitQuaternion::new_normalize(state.get(bone).goal);
        let bind = calibration.reference.get(bone).unwrap().world_rotation;
        assert!(goal.angle_to(&(bend * bind)) < 1e-4);
    }

    #[test]
    fn test_disabled_hand_is_noop() {
        let mut rig = SkeletonRig::standard();
        rig.remove(HumanBone::LeftThumbDistal);
        let calibration = Calibration::from_rig(&rig).unwrap();
        let hands = HandRetargeter::new(&calibration);
        assert!(!hands.is_enabled(Side::Left));
        assert!(hands.is_enabled(Side::Right));

        let full = Calibration::from_rig(&SkeletonRig::standard()).unwrap();
        let mut state = BoneRuntimeState::new();
        assert!(hands.update(&bind_hand(&full, Side::Left), Side::Left, &mut state).is_none());
        assert_eq!(state.get(HumanBone::LeftIndexProximal).goal.norm(), 0.0);
    }
}
