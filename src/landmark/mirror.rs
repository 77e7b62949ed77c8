//! 左右反転用のインデックス対応表
//!
//! 反転時は座標の符号だけでなく、解剖学的に左右対になる点の
//! インデックスも入れ替える。対応表は対合（map[map[i]] == i）。

use super::packet::Landmark;
use super::topology::{FaceLandmark, PoseLandmark};

// FaceMesh の輪郭（中央で折り返す）
// https://github.com/tensorflow/tfjs-models/blob/838611c02f51159afdd77469ce67f0e26b7bbb23/face-landmarks-detection/src/mediapipe-facemesh/keypoints.ts
const FACE_SILHOUETTE: &[usize] = &[
    338, 297, 332, 284, 251, 389, 356, 454, 323, 361, 288, 397, 365, 379, 378, 400, 377, 152, 148,
    176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109,
];
const LIPS_UPPER_OUTER: &[usize] = &[61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291];
const LIPS_LOWER_OUTER: &[usize] = &[61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291];
const LIPS_UPPER_INNER: &[usize] = &[78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308];
const LIPS_LOWER_INNER: &[usize] = &[78, 95, 88, 178, 87, 14, 317, 402, 318, 324, 308];

// 右側の目・眉・鼻・頬と、それに対応する左側
const FACE_RIGHT_SIDE: &[usize] = &[
    // rightEyeUpper0
    246, 161, 160, 159, 158, 157, 173,
    // rightEyeLower0
    33, 7, 163, 144, 145, 153, 154, 155, 133,
    // rightEyeUpper1
    247, 30, 29, 27, 28, 56, 190,
    // rightEyeLower1
    130, 25, 110, 24, 23, 22, 26, 112, 243,
    // rightEyeUpper2
    113, 225, 224, 223, 222, 221, 189,
    // rightEyeLower2
    226, 31, 228, 229, 230, 231, 232, 233, 244,
    // rightEyeLower3
    143, 111, 117, 118, 119, 120, 121, 128, 245,
    // rightEyebrowUpper
    156, 70, 63, 105, 66, 107, 55, 193,
    // rightEyebrowLower
    35, 124, 46, 53, 52, 65,
    // noseRightCorner, rightCheek
    98, 205,
];
const FACE_LEFT_SIDE: &[usize] = &[
    466, 388, 387, 386, 385, 384, 398,
    263, 249, 390, 373, 374, 380, 381, 382, 362,
    467, 260, 259, 257, 258, 286, 414,
    359, 255, 339, 254, 253, 252, 256, 341, 463,
    342, 445, 444, 443, 442, 441, 413,
    446, 261, 448, 449, 450, 451, 452, 453, 464,
    372, 340, 346, 347, 348, 349, 350, 357, 465,
    383, 300, 293, 334, 296, 336, 285, 417,
    265, 353, 276, 283, 282, 295,
    327, 425,
];

/// 左右反転のインデックス対応表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorMap {
    map: Box<[usize]>,
}

impl MirrorMap {
    /// BlazePose: 0(鼻)は固定、1-3 と 4-6（目）を交換、7以降は奇数/偶数の隣同士を交換
    pub fn pose() -> Self {
        let map = (0..PoseLandmark::COUNT)
            .map(|index| match index {
                0 => 0,
                1..=3 => index + 3,
                4..=6 => index - 3,
                _ if index % 2 == 0 => index - 1,
                _ => index + 1,
            })
            .collect();
        Self { map }
    }

    /// FaceMesh: 輪郭は中央で折り返し、目・眉・鼻・頬は左右の対で交換
    pub fn face() -> Self {
        let mut map: Vec<usize> = (0..FaceLandmark::COUNT).collect();

        for contour in [
            FACE_SILHOUETTE,
            LIPS_UPPER_OUTER,
            LIPS_LOWER_OUTER,
            LIPS_UPPER_INNER,
            LIPS_LOWER_INNER,
        ] {
            for (i, &index) in contour.iter().enumerate() {
                map[index] = contour[contour.len() - i - 1];
            }
        }

        for (&right, &left) in FACE_RIGHT_SIDE.iter().zip(FACE_LEFT_SIDE) {
            map[right] = left;
            map[left] = right;
        }

        Self { map: map.into_boxed_slice() }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// 範囲外のインデックスはそのまま返す
    pub fn get(&self, index: usize) -> usize {
        self.map.get(index).copied().unwrap_or(index)
    }

    pub fn is_involution(&self) -> bool {
        (0..self.map.len()).all(|i| self.get(self.get(i)) == i)
    }

    /// X符号を反転し、インデックスを対応表で入れ替える
    pub fn apply(&self, landmarks: &[Landmark]) -> Vec<Landmark> {
        (0..landmarks.len())
            .map(|i| {
                let source = landmarks.get(self.get(i)).copied().unwrap_or_default();
                Landmark { x: -source.x, ..source }
            })
            .collect()
    }
}

/// ストリームごとの反転表。起動時に一度だけ構築する
#[derive(Debug, Clone)]
pub struct MirrorTables {
    pub pose: MirrorMap,
    pub face: MirrorMap,
}

impl MirrorTables {
    pub fn new() -> Self {
        Self {
            pose: MirrorMap::pose(),
            face: MirrorMap::face(),
        }
    }
}

impl Default for MirrorTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_contour_tables_pair_up() {
        assert_eq!(FACE_RIGHT_SIDE.len(), FACE_LEFT_SIDE.len());
    }

    #[test]
    fn test_pose_map_is_involution() {
        let map = MirrorMap::pose();
        assert_eq!(map.len(), 33);
        assert!(map.is_involution());
        assert_eq!(map.get(PoseLandmark::Nose as usize), PoseLandmark::Nose as usize);
        assert_eq!(
            map.get(PoseLandmark::LeftShoulder as usize),
            PoseLandmark::RightShoulder as usize
        );
        assert_eq!(map.get(PoseLandmark::LeftEyeInner as usize), PoseLandmark::RightEyeInner as usize);
        assert_eq!(
            map.get(PoseLandmark::RightFootIndex as usize),
            PoseLandmark::LeftFootIndex as usize
        );
    }

    #[test]
    fn test_face_map_is_involution() {
        let map = MirrorMap::face();
        assert_eq!(map.len(), 468);
        assert!(map.is_involution());
        assert_eq!(map.get(FaceLandmark::Left as usize), FaceLandmark::Right as usize);
        assert_eq!(map.get(FaceLandmark::LipLeft as usize), FaceLandmark::LipRight as usize);
        // 正中線上の点は動かない
        assert_eq!(map.get(FaceLandmark::Top as usize), FaceLandmark::Top as usize);
        assert_eq!(map.get(FaceLandmark::Bottom as usize), FaceLandmark::Bottom as usize);
        assert_eq!(map.get(FaceLandmark::LipBottom as usize), FaceLandmark::LipBottom as usize);
        assert_eq!(map.get(FaceLandmark::NoseBottom as usize), FaceLandmark::NoseBottom as usize);
    }

    #[test]
    fn test_apply_negates_x_and_swaps() {
        let map = MirrorMap::pose();
        let mut landmarks = vec![Landmark::default(); 33];
        landmarks[PoseLandmark::LeftShoulder as usize] = Landmark::new(0.2, 1.0, 0.1, 0.9);
        let mirrored = map.apply(&landmarks);
        let right = mirrored[PoseLandmark::RightShoulder as usize];
        assert_eq!(right, Landmark::new(-0.2, 1.0, 0.1, 0.9));
        assert_eq!(mirrored[PoseLandmark::LeftShoulder as usize].visibility, 0.0);
    }

    fn landmark_strategy() -> impl Strategy<Value = Landmark> {
        (-2.0f32..2.0, -2.0f32..2.0, -2.0f32..2.0, 0.0f32..1.0)
            .prop_map(|(x, y, z, v)| Landmark::new(x, y, z, v))
    }

    proptest! {
        #[test]
        fn prop_pose_mirror_twice_is_identity(
            landmarks in proptest::collection::vec(landmark_strategy(), 33)
        ) {
            let map = MirrorMap::pose();
            let twice = map.apply(&map.apply(&landmarks));
            prop_assert_eq!(twice, landmarks);
        }

        #[test]
        fn prop_face_mirror_twice_is_identity(
            landmarks in proptest::collection::vec(landmark_strategy(), 468)
        ) {
            let map = MirrorMap::face();
            let twice = map.apply(&map.apply(&landmarks));
            prop_assert_eq!(twice, landmarks);
        }
    }
}
