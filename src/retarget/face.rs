use nalgebra::{UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::math::{normalize, rotate_vectors, EPSILON};
use crate::blendshape::BlendShapePreset;
use crate::config::FaceConfig;
use crate::landmark::{FaceLandmark, TrackingPacket};

/// 顔パケット1つ分の結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceFrame {
    pub head_rotation: UnitQuaternion<f32>,
    /// 口の開き（"A"）。鼻・唇が重なっている場合は None
    pub mouth_open: Option<f32>,
}

/// 顔ランドマークから頭の向きと口の開きを求める
pub struct FaceRetargeter {
    camera_position: Vector3<f32>,
    mouth_open_offset: f32,
    mouth_open_max: f32,
}

impl FaceRetargeter {
    pub fn new(camera_position: Vector3<f32>, mouth_open_offset: f32, mouth_open_max: f32) -> Self {
        Self {
            camera_position,
            mouth_open_offset,
            mouth_open_max,
        }
    }

    pub fn from_config(config: &FaceConfig) -> Self {
        let [x, y, z] = config.camera_position;
        Self::new(Vector3::new(x, y, z), config.mouth_open_offset, config.mouth_open_max)
    }

    pub fn update(&self, packet: &TrackingPacket, head_position: Vector3<f32>) -> FaceFrame {
        let p = |l: FaceLandmark| packet.position(l as usize);

        let to_camera = self.camera_position - head_position;
        let head_rotation = rotate_vectors(
            -Vector3::x(),
            Vector3::new(0.0, -to_camera.z, to_camera.y),
            p(FaceLandmark::Left) - p(FaceLandmark::Right),
            p(FaceLandmark::Top) - p(FaceLandmark::Bottom),
        );

        FaceFrame {
            head_rotation,
            mouth_open: self.mouth_open(
                p(FaceLandmark::NoseBottom),
                p(FaceLandmark::LipTop),
                p(FaceLandmark::LipBottom),
            ),
        }
    }

    /// 鼻下〜下唇 と 鼻下〜上唇 の比
    fn mouth_open(&self, nose_bottom: Vector3<f32>, lip_top: Vector3<f32>, lip_bottom: Vector3<f32>) -> Option<f32> {
        let upper = (nose_bottom - lip_top).norm();
        if upper < EPSILON {
            return None;
        }
        let ratio = (nose_bottom - lip_bottom).norm() / upper;
        Some((ratio - self.mouth_open_offset).clamp(0.0, self.mouth_open_max))
    }
}

/// 注視点を向く目線。VRM の LookAt ブレンドシェイプで表す
///
/// 頭のローカル空間（+Z が前、+X が右）で注視点の左右角・上下角を求め、
/// `range` で 1.0 になるよう線形に割り当てる。
pub struct GazeTracker {
    target: Vector3<f32>,
    range: f32,
}

impl GazeTracker {
    pub const PRESETS: [BlendShapePreset; 4] = [
        BlendShapePreset::LookLeft,
        BlendShapePreset::LookRight,
        BlendShapePreset::LookUp,
        BlendShapePreset::LookDown,
    ];

    pub fn new(target: Vector3<f32>, range_degrees: f32) -> Self {
        Self {
            target,
            range: range_degrees.to_radians().max(EPSILON),
        }
    }

    pub fn from_config(config: &FaceConfig) -> Self {
        let [x, y, z] = config.look_at_target.unwrap_or(config.camera_position);
        Self::new(Vector3::new(x, y, z), config.look_at_range_degrees)
    }

    /// (左右角, 上下角)。右・下が正。注視点が頭と重なる場合は None
    pub fn yaw_pitch(&self, head_position: Vector3<f32>, head_rotation: UnitQuaternion<f32>) -> Option<(f32, f32)> {
        let local = normalize(head_rotation.inverse_transform_vector(&(self.target - head_position)))?;
        let yaw = local.x.atan2(local.z);
        let pitch = -local.y.atan2((local.x * local.x + local.z * local.z).sqrt());
        Some((yaw, pitch))
    }

    /// `PRESETS` の順のウェイト
    pub fn weights(&self, head_position: Vector3<f32>, head_rotation: UnitQuaternion<f32>) -> Option<[f32; 4]> {
        let (yaw, pitch) = self.yaw_pitch(head_position, head_rotation)?;
        let map = |angle: f32| (angle / self.range).clamp(0.0, 1.0);
        Some([map(-yaw), map(yaw), map(-pitch), map(pitch)])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlinkPhase {
    /// 残りフレーム。負になったら次の更新でまばたき開始
    Waiting { remaining: f32 },
    Closing { frame: u32 },
    Opening { frame: u32 },
}

/// ランドマークに依存しない自動まばたき
///
/// 待機が切れた更新で 0 を出し、N フレームかけて 1 まで閉じ、
/// N フレームかけて 0 まで開いてから、ランダムな待機に戻る。
pub struct BlinkCycle {
    phase: BlinkPhase,
    closing_frames: u32,
    interval_frames: f32,
    rng: StdRng,
}

impl BlinkCycle {
    pub fn new(closing_frames: u32, interval_frames: f32, initial_wait: f32, rng: StdRng) -> Self {
        Self {
            phase: BlinkPhase::Waiting { remaining: initial_wait },
            closing_frames: closing_frames.max(1),
            interval_frames: interval_frames.max(0.0),
            rng,
        }
    }

    pub fn from_config(config: &FaceConfig, frame_delta: f32, rng: StdRng) -> Self {
        let frame_delta = frame_delta.max(EPSILON);
        let closing = (config.blink_closing_secs / frame_delta).round().max(1.0) as u32;
        let interval = config.blink_interval_secs / frame_delta;
        Self::new(closing, interval, config.blink_initial_wait_frames, rng)
    }

    pub fn with_seed(closing_frames: u32, interval_frames: f32, initial_wait: f32, seed: u64) -> Self {
        Self::new(closing_frames, interval_frames, initial_wait, StdRng::seed_from_u64(seed))
    }

    pub fn closing_frames(&self) -> u32 {
        self.closing_frames
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, BlinkPhase::Waiting { .. })
    }

    /// 1フレーム進める。まばたき中ならウェイトを返す
    pub fn update(&mut self) -> Option<f32> {
        let n = self.closing_frames;
        match self.phase {
            BlinkPhase::Waiting { remaining } => {
                if remaining < 0.0 {
                    self.phase = BlinkPhase::Closing { frame: 1 };
                    Some(0.0)
                } else {
                    self.phase = BlinkPhase::Waiting { remaining: remaining - 1.0 };
                    None
                }
            }
            BlinkPhase::Closing { frame } => {
                self.phase = if frame >= n {
                    BlinkPhase::Opening { frame: n - 1 }
                } else {
                    BlinkPhase::Closing { frame: frame + 1 }
                };
                Some(frame as f32 / n as f32)
            }
            BlinkPhase::Opening { frame } => {
                self.phase = if frame == 0 {
                    let jitter: f32 = self.rng.random();
                    BlinkPhase::Waiting {
                        remaining: self.interval_frames + jitter * self.interval_frames,
                    }
                } else {
                    BlinkPhase::Opening { frame: frame - 1 }
                };
                Some(frame as f32 / n as f32)
            }
        }
    }
}
