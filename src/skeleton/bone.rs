use enum_map::Enum;
use serde::{Deserialize, Serialize};

/// 左右
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];
}

/// 指の関節（付け根から順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerJoint {
    Proximal,
    Intermediate,
    Distal,
}

impl FingerJoint {
    pub const COUNT: usize = 3;

    fn from_offset(offset: usize) -> Self {
        match offset {
            0 => FingerJoint::Proximal,
            1 => FingerJoint::Intermediate,
            _ => FingerJoint::Distal,
        }
    }
}

/// 指ボーンの分解結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerBone {
    pub side: Side,
    /// 親指=0 … 小指=4
    pub finger: usize,
    pub joint: FingerJoint,
}

/// ヒューマノイドのボーン名（VRM準拠）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HumanBone {
    Hips,
    Spine,
    Chest,
    Neck,
    Head,
    LeftShoulder,
    RightShoulder,
    LeftUpperArm,
    RightUpperArm,
    LeftLowerArm,
    RightLowerArm,
    LeftHand,
    RightHand,
    LeftUpperLeg,
    RightUpperLeg,
    LeftLowerLeg,
    RightLowerLeg,
    LeftFoot,
    RightFoot,
    LeftThumbProximal,
    LeftThumbIntermediate,
    LeftThumbDistal,
    LeftIndexProximal,
    LeftIndexIntermediate,
    LeftIndexDistal,
    LeftMiddleProximal,
    LeftMiddleIntermediate,
    LeftMiddleDistal,
    LeftRingProximal,
    LeftRingIntermediate,
    LeftRingDistal,
    LeftLittleProximal,
    LeftLittleIntermediate,
    LeftLittleDistal,
    RightThumbProximal,
    RightThumbIntermediate,
    RightThumbDistal,
    RightIndexProximal,
    RightIndexIntermediate,
    RightIndexDistal,
    RightMiddleProximal,
    RightMiddleIntermediate,
    RightMiddleDistal,
    RightRingProximal,
    RightRingIntermediate,
    RightRingDistal,
    RightLittleProximal,
    RightLittleIntermediate,
    RightLittleDistal,
}

/// 片手あたりの指ボーン数
pub const FINGER_BONES_PER_HAND: usize = 15;

const LEFT_FINGERS: [HumanBone; FINGER_BONES_PER_HAND] = [
    HumanBone::LeftThumbProximal,
    HumanBone::LeftThumbIntermediate,
    HumanBone::LeftThumbDistal,
    HumanBone::LeftIndexProximal,
    HumanBone::LeftIndexIntermediate,
    HumanBone::LeftIndexDistal,
    HumanBone::LeftMiddleProximal,
    HumanBone::LeftMiddleIntermediate,
    HumanBone::LeftMiddleDistal,
    HumanBone::LeftRingProximal,
    HumanBone::LeftRingIntermediate,
    HumanBone::LeftRingDistal,
    HumanBone::LeftLittleProximal,
    HumanBone::LeftLittleIntermediate,
    HumanBone::LeftLittleDistal,
];

const RIGHT_FINGERS: [HumanBone; FINGER_BONES_PER_HAND] = [
    HumanBone::RightThumbProximal,
    HumanBone::RightThumbIntermediate,
    HumanBone::RightThumbDistal,
    HumanBone::RightIndexProximal,
    HumanBone::RightIndexIntermediate,
    HumanBone::RightIndexDistal,
    HumanBone::RightMiddleProximal,
    HumanBone::RightMiddleIntermediate,
    HumanBone::RightMiddleDistal,
    HumanBone::RightRingProximal,
    HumanBone::RightRingIntermediate,
    HumanBone::RightRingDistal,
    HumanBone::RightLittleProximal,
    HumanBone::RightLittleIntermediate,
    HumanBone::RightLittleDistal,
];

impl HumanBone {
    pub fn all() -> impl Iterator<Item = HumanBone> {
        (0..<HumanBone as Enum>::LENGTH).map(<HumanBone as Enum>::from_usize)
    }

    /// 指ボーン（親指の付け根 → 小指の先）
    pub fn fingers(side: Side) -> &'static [HumanBone; FINGER_BONES_PER_HAND] {
        match side {
            Side::Left => &LEFT_FINGERS,
            Side::Right => &RIGHT_FINGERS,
        }
    }

    pub fn finger(side: Side, finger: usize, joint: FingerJoint) -> Option<HumanBone> {
        if finger >= 5 {
            return None;
        }
        let offset = match joint {
            FingerJoint::Proximal => 0,
            FingerJoint::Intermediate => 1,
            FingerJoint::Distal => 2,
        };
        Some(Self::fingers(side)[finger * FingerJoint::COUNT + offset])
    }

    pub fn finger_parts(self) -> Option<FingerBone> {
        Side::BOTH.into_iter().find_map(|side| {
            Self::fingers(side).iter().position(|&b| b == self).map(|i| FingerBone {
                side,
                finger: i / FingerJoint::COUNT,
                joint: FingerJoint::from_offset(i % FingerJoint::COUNT),
            })
        })
    }

    pub fn is_finger(self) -> bool {
        self.finger_parts().is_some()
    }

    pub fn upper_arm(side: Side) -> HumanBone {
        match side {
            Side::Left => HumanBone::LeftUpperArm,
            Side::Right => HumanBone::RightUpperArm,
        }
    }

    pub fn lower_arm(side: Side) -> HumanBone {
        match side {
            Side::Left => HumanBone::LeftLowerArm,
            Side::Right => HumanBone::RightLowerArm,
        }
    }

    pub fn hand(side: Side) -> HumanBone {
        match side {
            Side::Left => HumanBone::LeftHand,
            Side::Right => HumanBone::RightHand,
        }
    }

    pub fn upper_leg(side: Side) -> HumanBone {
        match side {
            Side::Left => HumanBone::LeftUpperLeg,
            Side::Right => HumanBone::RightUpperLeg,
        }
    }

    pub fn lower_leg(side: Side) -> HumanBone {
        match side {
            Side::Left => HumanBone::LeftLowerLeg,
            Side::Right => HumanBone::RightLowerLeg,
        }
    }

    pub fn foot(side: Side) -> HumanBone {
        match side {
            Side::Left => HumanBone::LeftFoot,
            Side::Right => HumanBone::RightFoot,
        }
    }

    /// 階層上の親ボーン
    pub fn parent(self) -> Option<HumanBone> {
        use HumanBone::*;
        if let Some(parts) = self.finger_parts() {
            return Some(match parts.joint {
                FingerJoint::Proximal => Self::hand(parts.side),
                _ => {
                    let index = Self::fingers(parts.side).iter().position(|&b| b == self)?;
                    Self::fingers(parts.side)[index - 1]
                }
            });
        }
        let parent = match self {
            Hips => return None,
            Spine => Hips,
            Chest => Spine,
            Neck => Chest,
            Head => Neck,
            LeftShoulder | RightShoulder => Chest,
            LeftUpperArm => LeftShoulder,
            RightUpperArm => RightShoulder,
            LeftLowerArm => LeftUpperArm,
            RightLowerArm => RightUpperArm,
            LeftHand => LeftLowerArm,
            RightHand => RightLowerArm,
            LeftUpperLeg | RightUpperLeg => Hips,
            LeftLowerLeg => LeftUpperLeg,
            RightLowerLeg => RightUpperLeg,
            LeftFoot => LeftLowerLeg,
            RightFoot => RightLowerLeg,
            _ => return None,
        };
        Some(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bone_count() {
        assert_eq!(HumanBone::all().count(), 19 + 2 * FINGER_BONES_PER_HAND);
    }

    #[test]
    fn test_finger_lookup_round_trip() {
        for side in Side::BOTH {
            for (i, &bone) in HumanBone::fingers(side).iter().enumerate() {
                let parts = bone.finger_parts().unwrap();
                assert_eq!(parts.side, side);
                assert_eq!(parts.finger, i / 3);
                assert_eq!(HumanBone::finger(side, parts.finger, parts.joint), Some(bone));
            }
        }
        assert!(HumanBone::Hips.finger_parts().is_none());
        assert_eq!(HumanBone::finger(Side::Left, 5, FingerJoint::Proximal), None);
    }

    #[test]
    fn test_parent_chain_reaches_hips() {
        for bone in HumanBone::all() {
            let mut current = bone;
            let mut depth = 0;
            while let Some(parent) = current.parent() {
                current = parent;
                depth += 1;
                assert!(depth < 16);
            }
            assert_eq!(current, HumanBone::Hips);
        }
    }

    #[test]
    fn test_finger_parents() {
        assert_eq!(HumanBone::LeftIndexProximal.parent(), Some(HumanBone::LeftHand));
        assert_eq!(
            HumanBone::RightRingDistal.parent(),
            Some(HumanBone::RightRingIntermediate)
        );
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&HumanBone::LeftUpperArm).unwrap();
        assert_eq!(json, "\"leftUpperArm\"");
        let bone: HumanBone = serde_json::from_str("\"rightLittleDistal\"").unwrap();
        assert_eq!(bone, HumanBone::RightLittleDistal);
    }
}
