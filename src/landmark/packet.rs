use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::topology::{FaceLandmark, HandLandmark, PoseLandmark};

/// ランドマークストリームの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Pose,
    LeftHand,
    RightHand,
    Face,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Pose,
        StreamKind::LeftHand,
        StreamKind::RightHand,
        StreamKind::Face,
    ];

    /// ストリームごとの固定ランドマーク数
    pub fn landmark_count(self) -> usize {
        match self {
            StreamKind::Pose => PoseLandmark::COUNT,
            StreamKind::LeftHand | StreamKind::RightHand => HandLandmark::COUNT,
            StreamKind::Face => FaceLandmark::COUNT,
        }
    }

    pub fn index(self) -> usize {
        match self {
            StreamKind::Pose => 0,
            StreamKind::LeftHand => 1,
            StreamKind::RightHand => 2,
            StreamKind::Face => 3,
        }
    }

    /// 手の左右を入れ替える（手以外はそのまま）
    pub fn swap_hand(self) -> Self {
        match self {
            StreamKind::LeftHand => StreamKind::RightHand,
            StreamKind::RightHand => StreamKind::LeftHand,
            other => other,
        }
    }
}

/// 検出器が出力する生のランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// 検出器によっては存在しない
    #[serde(default)]
    pub visibility: Option<f32>,
}

impl RawLandmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: Option<f32>) -> Self {
        Self { x, y, z, visibility }
    }
}

/// 正規化済みランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// 可視度 (0.0〜1.0)。検出器が出さない場合は 0
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    pub fn from_position(position: Vector3<f32>, visibility: f32) -> Self {
        Self::new(position.x, position.y, position.z, visibility)
    }

    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// 1ストリーム1フレーム分のランドマーク。生成後は変更しない
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingPacket {
    kind: StreamKind,
    landmarks: Vec<Landmark>,
}

impl TrackingPacket {
    /// 点数がストリームの固定数と一致しない場合、座標に NaN・無限大を含む場合は None
    pub fn new(kind: StreamKind, landmarks: Vec<Landmark>) -> Option<Self> {
        if landmarks.len() != kind.landmark_count() {
            return None;
        }
        if !landmarks.iter().all(Landmark::is_finite) {
            return None;
        }
        Some(Self { kind, landmarks })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// インデックスでランドマークを取得（範囲外は可視度0の原点）
    pub fn get(&self, index: usize) -> Landmark {
        self.landmarks.get(index).copied().unwrap_or_default()
    }

    pub fn position(&self, index: usize) -> Vector3<f32> {
        self.get(index).position()
    }

    pub fn visibility(&self, index: usize) -> f32 {
        self.get(index).visibility
    }
}
