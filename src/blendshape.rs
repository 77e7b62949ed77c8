//! 表情ブレンドシェイプ（VRM プリセット）

use anyhow::Result;
use enum_map::{Enum, EnumMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum BlendShapePreset {
    Neutral,
    A,
    I,
    U,
    E,
    O,
    Blink,
    Joy,
    Angry,
    Sorrow,
    Fun,
    LookUp,
    LookDown,
    LookLeft,
    LookRight,
    BlinkL,
    BlinkR,
}

impl BlendShapePreset {
    pub fn all() -> impl Iterator<Item = BlendShapePreset> {
        (0..<Self as Enum>::LENGTH).map(<Self as Enum>::from_usize)
    }

    pub fn name(self) -> &'static str {
        match self {
            BlendShapePreset::Neutral => "Neutral",
            BlendShapePreset::A => "A",
            BlendShapePreset::I => "I",
            BlendShapePreset::U => "U",
            BlendShapePreset::E => "E",
            BlendShapePreset::O => "O",
            BlendShapePreset::Blink => "Blink",
            BlendShapePreset::Joy => "Joy",
            BlendShapePreset::Angry => "Angry",
            BlendShapePreset::Sorrow => "Sorrow",
            BlendShapePreset::Fun => "Fun",
            BlendShapePreset::LookUp => "LookUp",
            BlendShapePreset::LookDown => "LookDown",
            BlendShapePreset::LookLeft => "LookLeft",
            BlendShapePreset::LookRight => "LookRight",
            BlendShapePreset::BlinkL => "Blink_L",
            BlendShapePreset::BlinkR => "Blink_R",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|p| p.name() == name)
    }
}

/// プリセットごとのウェイト。常に 0.0〜1.0
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShapeWeights {
    values: EnumMap<BlendShapePreset, f32>,
}

impl BlendShapeWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// NaN は無視する
    pub fn set(&mut self, preset: BlendShapePreset, value: f32) {
        if value.is_nan() {
            return;
        }
        self.values[preset] = value.clamp(0.0, 1.0);
    }

    pub fn get(&self, preset: BlendShapePreset) -> f32 {
        self.values[preset]
    }

    /// 名前指定でまとめて書き込む。未知の名前は無視し、書き込んだ値を返す
    pub fn apply_named<'a, I>(&mut self, values: I) -> Vec<(BlendShapePreset, f32)>
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let mut applied = Vec::new();
        for (name, value) in values {
            match BlendShapePreset::from_name(name) {
                Some(preset) if !value.is_nan() => {
                    self.set(preset, value);
                    applied.push((preset, self.get(preset)));
                }
                Some(_) => {}
                None => log::debug!("unknown blend shape {:?} ignored", name),
            }
        }
        applied
    }

    /// 0 でないウェイトを名前付きで返す
    pub fn read_nonzero(&self) -> Vec<(&'static str, f32)> {
        self.values
            .iter()
            .filter(|(_, v)| **v != 0.0)
            .map(|(preset, v)| (preset.name(), *v))
            .collect()
    }
}

/// ブレンドシェイプの反映先（エンジン側）
pub trait BlendShapeSink {
    fn write(&mut self, weights: &[(BlendShapePreset, f32)]) -> Result<()>;
}
