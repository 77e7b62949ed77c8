/// MediaPipe BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl PoseLandmark {
    pub const COUNT: usize = 33;
}

/// MediaPipe Hands の 21 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum HandLandmark {
    Wrist = 0,
    Thumb0 = 1,
    Thumb1 = 2,
    Thumb2 = 3,
    Thumb3 = 4,
    Index0 = 5,
    Index1 = 6,
    Index2 = 7,
    Index3 = 8,
    Middle0 = 9,
    Middle1 = 10,
    Middle2 = 11,
    Middle3 = 12,
    Ring0 = 13,
    Ring1 = 14,
    Ring2 = 15,
    Ring3 = 16,
    Pinky0 = 17,
    Pinky1 = 18,
    Pinky2 = 19,
    Pinky3 = 20,
}

impl HandLandmark {
    pub const COUNT: usize = 21;
    /// 1本の指あたりのランドマーク数（付け根〜指先）
    pub const PER_FINGER: usize = 4;

    /// 指 `finger`（親指=0 … 小指=4）の付け根ランドマーク
    pub fn finger_base(finger: usize) -> usize {
        Self::Thumb0 as usize + finger * Self::PER_FINGER
    }
}

/// FaceMesh 468 点のうち使用するもの
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum FaceLandmark {
    LipTop = 0,
    NoseTop = 1,
    NoseBottom = 2,
    Top = 10,
    MouthTop = 13,
    MouthBottom = 14,
    LipBottom = 17,
    LipRight = 61,
    RightEyeBottom = 145,
    Bottom = 152,
    RightEyeTop = 159,
    Right = 234,
    LipLeft = 291,
    LeftEyeBottom = 374,
    LeftEyeTop = 386,
    Left = 454,
}

impl FaceLandmark {
    /// 虹彩を除いたメッシュ点数
    pub const COUNT: usize = 468;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        assert_eq!(PoseLandmark::COUNT, PoseLandmark::RightFootIndex as usize + 1);
        assert_eq!(HandLandmark::COUNT, HandLandmark::Pinky3 as usize + 1);
        assert!((FaceLandmark::Left as usize) < FaceLandmark::COUNT);
    }

    #[test]
    fn test_finger_base() {
        assert_eq!(HandLandmark::finger_base(0), HandLandmark::Thumb0 as usize);
        assert_eq!(HandLandmark::finger_base(1), HandLandmark::Index0 as usize);
        assert_eq!(HandLandmark::finger_base(4), HandLandmark::Pinky0 as usize);
    }
}
