use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    #[serde(default)]
    pub smooth: SmoothConfig,
    #[serde(default)]
    pub face: FaceConfig,
    #[serde(default)]
    pub rig: RigConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// メインティックのフレームレート
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// ランドマーク受信用TCPアドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OscConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// IKターゲット・ブレンドシェイプの送信先
    #[serde(default = "default_osc_addr")]
    pub addr: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    /// 左右反転（X符号反転 + インデックス入れ替え）
    #[serde(default = "default_true")]
    pub mirror: bool,
    /// 画像座標（下向きY）を上向きYに変換
    #[serde(default = "default_true")]
    pub flip_y: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetargetConfig {
    /// 肩・腰の中心計算に使う visibility 閾値
    #[serde(default = "default_center_visibility")]
    pub center_visibility: f32,
    /// 四肢セグメント更新の visibility 閾値（これより大きい場合のみ更新）
    #[serde(default = "default_limb_visibility")]
    pub limb_visibility: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothConfig {
    /// 1フレームあたりのゴール位置への追従率
    #[serde(default = "default_smooth_position")]
    pub position: f32,
    /// 1フレームあたりのゴール回転への追従率
    #[serde(default = "default_smooth_rotation")]
    pub rotation: f32,
    /// 指ボーンのゴール回転への追従率
    #[serde(default = "default_smooth_finger")]
    pub finger: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FaceConfig {
    /// カメラ位置（アバター空間、メートル）。アバターは -Z を向いている
    #[serde(default = "default_camera_position")]
    pub camera_position: [f32; 3],
    #[serde(default = "default_mouth_open_offset")]
    pub mouth_open_offset: f32,
    #[serde(default = "default_mouth_open_max")]
    pub mouth_open_max: f32,
    /// まばたきで閉じきるまでの秒数
    #[serde(default = "default_blink_closing_secs")]
    pub blink_closing_secs: f32,
    /// まばたき間隔の基準秒数（実際は 1〜2倍のランダム）
    #[serde(default = "default_blink_interval_secs")]
    pub blink_interval_secs: f32,
    #[serde(default = "default_blink_initial_wait_frames")]
    pub blink_initial_wait_frames: f32,
    /// 目線の注視点。未指定ならカメラ位置
    #[serde(default)]
    pub look_at_target: Option<[f32; 3]>,
    /// 目線ブレンドシェイプが 1.0 になる角度（度）
    #[serde(default = "default_look_at_range_degrees")]
    pub look_at_range_degrees: f32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RigConfig {
    /// バインドポーズJSON。未指定なら標準Tポーズを使う
    #[serde(default)]
    pub path: Option<String>,
}

fn default_true() -> bool { true }
fn default_target_fps() -> u32 { 60 }
fn default_listen_addr() -> String { "0.0.0.0:39600".to_string() }
fn default_osc_addr() -> String { "127.0.0.1:39539".to_string() }
fn default_center_visibility() -> f32 { 0.6 }
fn default_limb_visibility() -> f32 { 0.0 }
fn default_smooth_position() -> f32 { 0.2 }
fn default_smooth_rotation() -> f32 { 0.2 }
fn default_smooth_finger() -> f32 { 0.75 }
fn default_camera_position() -> [f32; 3] { [0.0, 1.4, -1.5] }
fn default_mouth_open_offset() -> f32 { 2.3 }
fn default_mouth_open_max() -> f32 { 1.5 }
fn default_blink_closing_secs() -> f32 { 0.33 }
fn default_blink_interval_secs() -> f32 { 5.0 }
fn default_blink_initial_wait_frames() -> f32 { 100.0 }
fn default_look_at_range_degrees() -> f32 { 90.0 }

impl Default for AppConfig {
    fn default() -> Self {
        Self { target_fps: default_target_fps() }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr() }
    }
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            addr: default_osc_addr(),
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mirror: default_true(),
            flip_y: default_true(),
        }
    }
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            center_visibility: default_center_visibility(),
            limb_visibility: default_limb_visibility(),
        }
    }
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            position: default_smooth_position(),
            rotation: default_smooth_rotation(),
            finger: default_smooth_finger(),
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            camera_position: default_camera_position(),
            mouth_open_offset: default_mouth_open_offset(),
            mouth_open_max: default_mouth_open_max(),
            blink_closing_secs: default_blink_closing_secs(),
            blink_interval_secs: default_blink_interval_secs(),
            blink_initial_wait_frames: default_blink_initial_wait_frames(),
            look_at_target: None,
            look_at_range_degrees: default_look_at_range_degrees(),
        }
    }
}

impl AppConfig {
    /// 1フレームの秒数
    pub fn frame_delta(&self) -> f32 {
        1.0 / self.target_fps.max(1) as f32
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// 読み込みに失敗した場合はデフォルト設定で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }
}
