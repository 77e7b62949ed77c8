use super::mirror::MirrorTables;
use super::packet::{Landmark, RawLandmark, StreamKind, TrackingPacket};
use crate::config::AdapterConfig;

/// 検出器の生出力を TrackingPacket に正規化する
pub struct LandmarkAdapter {
    mirror: bool,
    flip_y: bool,
    tables: MirrorTables,
}

impl LandmarkAdapter {
    pub fn new(mirror: bool, flip_y: bool) -> Self {
        Self {
            mirror,
            flip_y,
            tables: MirrorTables::new(),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.mirror, config.flip_y)
    }

    pub fn accept_pose(&self, landmarks: Option<&[RawLandmark]>) -> Option<TrackingPacket> {
        self.accept(StreamKind::Pose, landmarks)
    }

    pub fn accept_face(&self, landmarks: Option<&[RawLandmark]>) -> Option<TrackingPacket> {
        self.accept(StreamKind::Face, landmarks)
    }

    /// 反転時は座標ではなく左右の帰属を入れ替える
    pub fn accept_hand(&self, landmarks: Option<&[RawLandmark]>, is_left: bool) -> Option<TrackingPacket> {
        let kind = if is_left { StreamKind::LeftHand } else { StreamKind::RightHand };
        self.accept(kind, landmarks)
    }

    /// null・空リストは何もしない（エラーではない）
    pub fn accept(&self, kind: StreamKind, landmarks: Option<&[RawLandmark]>) -> Option<TrackingPacket> {
        let raw = landmarks.filter(|l| !l.is_empty())?;

        let count = kind.landmark_count();
        if raw.len() < count {
            log::debug!("{:?}: {} landmarks (expected {}), dropped", kind, raw.len(), count);
            return None;
        }
        // FaceMesh(refine)の虹彩10点など、余剰分は捨てる
        let normalized: Vec<Landmark> = raw[..count].iter().map(|l| self.normalize(l)).collect();

        let (kind, landmarks) = if !self.mirror {
            (kind, normalized)
        } else {
            match kind {
                StreamKind::Pose => (kind, self.tables.pose.apply(&normalized)),
                StreamKind::Face => (kind, self.tables.face.apply(&normalized)),
                StreamKind::LeftHand | StreamKind::RightHand => {
                    let flipped = normalized
                        .into_iter()
                        .map(|l| Landmark { x: -l.x, ..l })
                        .collect();
                    (kind.swap_hand(), flipped)
                }
            }
        };

        let packet = TrackingPacket::new(kind, landmarks);
        if packet.is_none() {
            log::debug!("{:?}: non-finite landmark coordinates, dropped", kind);
        }
        packet
    }

    fn normalize(&self, raw: &RawLandmark) -> Landmark {
        let y = if self.flip_y { -raw.y } else { raw.y };
        let visibility = raw.visibility.filter(|v| v.is_finite()).unwrap_or(0.0);
        Landmark::new(raw.x, y, raw.z, visibility)
    }
}
