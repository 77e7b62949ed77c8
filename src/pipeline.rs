//! 1ティック分のリターゲット処理
//!
//! メールボックスから最新パケットを取り出し、各リターゲッタの結果を
//! 現在のボーン姿勢とブレンドして IK ターゲットとブレンドシェイプにまとめる。

use enum_map::EnumMap;
use nalgebra::{UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::blendshape::{BlendShapePreset, BlendShapeWeights};
use crate::config::{Config, RetargetConfig};
use crate::ik::{BendGoal, ChainKind, Effector, EffectorKind, HeadBend, IkTargets};
use crate::landmark::{LatestPackets, PacketMailbox, TrackingPacket};
use crate::retarget::{
    BlinkCycle, BodyBlend, BodyRetargeter, BoneRuntimeState, FaceRetargeter, FingerSmoother, GazeTracker,
    HandRetargeter,
};
use crate::skeleton::{Calibration, HumanBone, Rig, RigState, Side};

const BODY_POSITION_WEIGHT: f32 = 0.5;
const LIMB_WEIGHT: f32 = 1.0;
const BEND_WEIGHT: f32 = 1.0;
/// 顔を一度でも受け取る前の頭エフェクタ (位置, 回転)
const HEAD_WEIGHTS_IDLE: (f32, f32) = (0.0, 1.0);
const HEAD_WEIGHTS_TRACKED: (f32, f32) = (0.8, 0.8);

/// 1ティックの出力
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub targets: IkTargets,
    /// このティックで書き換えたブレンドシェイプ
    pub blend_shapes: Vec<(BlendShapePreset, f32)>,
}

/// キャリブレーション後にだけ存在する状態
struct Session {
    body: BodyRetargeter,
    hands: HandRetargeter,
    runtime: BoneRuntimeState,
    /// 下腕から見た手首の回転
    next_hand_local: EnumMap<Side, UnitQuaternion<f32>>,
    head_goal: UnitQuaternion<f32>,
    head_bind_position: Vector3<f32>,
    face_tracked: bool,
}

impl Session {
    fn new(calibration: &Calibration, config: &RetargetConfig) -> Self {
        let reference = &calibration.reference;
        let rotation = |bone| {
            reference
                .get(bone)
                .map(|b| b.world_rotation)
                .unwrap_or_else(UnitQuaternion::identity)
        };

        let next_hand_local = EnumMap::from_fn(|side| {
            rotation(HumanBone::lower_arm(side)).inverse() * rotation(HumanBone::hand(side))
        });

        Self {
            body: BodyRetargeter::new(calibration, config),
            hands: HandRetargeter::new(calibration),
            runtime: BoneRuntimeState::new(),
            next_hand_local,
            head_goal: rotation(HumanBone::Head),
            head_bind_position: reference.position(HumanBone::Head).unwrap_or_else(Vector3::zeros),
            face_tracked: false,
        }
    }
}

/// アバター1体分のリターゲット処理
pub struct AvatarRetargeter {
    state: RigState,
    session: Option<Session>,
    retarget_config: RetargetConfig,
    blend: BodyBlend,
    fingers: FingerSmoother,
    face: FaceRetargeter,
    gaze: GazeTracker,
    blink: BlinkCycle,
    blend_shapes: BlendShapeWeights,
    /// 外部から名前指定で書き込まれ、まだ出力していない値
    pending: Vec<(BlendShapePreset, f32)>,
}

impl AvatarRetargeter {
    pub fn new(config: &Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// まばたき間隔の乱数を固定する
    pub fn with_seed(config: &Config, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &Config, rng: StdRng) -> Self {
        Self {
            state: RigState::default(),
            session: None,
            retarget_config: config.retarget.clone(),
            blend: BodyBlend::from_config(&config.smooth),
            fingers: FingerSmoother::from_config(&config.smooth),
            face: FaceRetargeter::from_config(&config.face),
            gaze: GazeTracker::from_config(&config.face),
            blink: BlinkCycle::from_config(&config.face, config.app.frame_delta(), rng),
            blend_shapes: BlendShapeWeights::new(),
            pending: Vec::new(),
        }
    }

    /// アバター読み込み完了の通知。次のティックでキャリブレーションする
    pub fn on_asset_loaded(&mut self) {
        self.session = None;
        self.state.request();
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn blend_shapes(&self) -> &BlendShapeWeights {
        &self.blend_shapes
    }

    /// 名前指定で表情を書き込む。次のティックの出力に含める
    pub fn write_named<'a, I>(&mut self, values: I)
    where
        I: IntoIterator<Item = (&'a str, f32)>,
    {
        let applied = self.blend_shapes.apply_named(values);
        self.pending.extend(applied);
    }

    /// 0 でない表情を名前付きで返す
    pub fn read_named(&self) -> Vec<(&'static str, f32)> {
        self.blend_shapes.read_nonzero()
    }

    /// 1フレーム進める。キャリブレーション前は何もせず None
    ///
    /// キャリブレーション前に届いたパケットも読み捨てる。
    pub fn tick<R: Rig + ?Sized>(&mut self, rig: &R, mailbox: &PacketMailbox) -> Option<FrameOutput> {
        if self.state.advance(rig) {
            if let Some(calibration) = self.state.calibration() {
                self.session = Some(Session::new(calibration, &self.retarget_config));
            }
        }
        let packets = mailbox.take_all();
        let session = self.session.as_mut()?;

        let mut changed = std::mem::take(&mut self.pending);
        Self::consume(session, &self.face, &mut self.blend_shapes, &mut changed, rig, packets);

        if session.face_tracked {
            let head_position = rig.position(HumanBone::Head).unwrap_or(session.head_bind_position);
            let head_rotation = rig.rotation(HumanBone::Head).unwrap_or(session.head_goal);
            if let Some(weights) = self.gaze.weights(head_position, head_rotation) {
                for (preset, weight) in GazeTracker::PRESETS.into_iter().zip(weights) {
                    if self.blend_shapes.get(preset) != weight {
                        self.blend_shapes.set(preset, weight);
                        changed.push((preset, self.blend_shapes.get(preset)));
                    }
                }
            }
        }

        if let Some(weight) = self.blink.update() {
            self.blend_shapes.set(BlendShapePreset::Blink, weight);
            changed.push((BlendShapePreset::Blink, self.blend_shapes.get(BlendShapePreset::Blink)));
        }

        Some(FrameOutput {
            targets: build_targets(session, &self.blend, rig),
            blend_shapes: changed,
        })
    }

    fn consume<R: Rig + ?Sized>(
        session: &mut Session,
        face: &FaceRetargeter,
        blend_shapes: &mut BlendShapeWeights,
        changed: &mut Vec<(BlendShapePreset, f32)>,
        rig: &R,
        packets: LatestPackets,
    ) {
        if let Some(pose) = &packets.pose {
            session.body.update(pose);
        }

        let hands: [(Side, &Option<TrackingPacket>); 2] =
            [(Side::Left, &packets.left_hand), (Side::Right, &packets.right_hand)];
        for (side, packet) in hands {
            let Some(packet) = packet else { continue };
            let Some(wrist) = session.hands.update(packet, side, &mut session.runtime) else {
                continue;
            };
            if let Some(lower_arm) = rig.rotation(HumanBone::lower_arm(side)) {
                session.next_hand_local[side] = lower_arm.inverse() * wrist;
            }
        }

        if let Some(packet) = &packets.face {
            let head = rig.position(HumanBone::Head).unwrap_or(session.head_bind_position);
            let frame = face.update(packet, head);
            session.head_goal = frame.head_rotation;
            session.face_tracked = true;
            if let Some(open) = frame.mouth_open {
                blend_shapes.set(BlendShapePreset::A, open);
                changed.push((BlendShapePreset::A, blend_shapes.get(BlendShapePreset::A)));
            }
        }
    }

    /// IK 解決後に呼ぶ。指ボーンの回転をゴールへ寄せる
    pub fn late_update<R: Rig + ?Sized>(&mut self, rig: &mut R) {
        if let Some(session) = self.session.as_mut() {
            self.fingers.apply(&mut session.runtime, rig);
        }
    }

    /// アバター破棄時。以降のパケットは受け付けない
    pub fn teardown(&mut self, mailbox: &PacketMailbox) {
        mailbox.close();
        self.session = None;
        self.state.reset();
        log::debug!("retargeter torn down");
    }
}

fn build_targets<R: Rig + ?Sized>(session: &Session, blend: &BodyBlend, rig: &R) -> IkTargets {
    let body = session.body.targets();
    let blended = |goal: Vector3<f32>, bone: HumanBone| blend.position(goal, rig.position(bone).unwrap_or(goal));
    let position_only = |position: Vector3<f32>, weight: f32| Effector {
        position,
        position_weight: weight,
        ..Effector::default()
    };

    let mut targets = IkTargets::default();
    targets.effectors[EffectorKind::Body] =
        position_only(blended(body.root, HumanBone::Hips), BODY_POSITION_WEIGHT);

    for side in Side::BOTH {
        let arm = &body.arms[side];
        let leg = &body.legs[side];

        targets.effectors[EffectorKind::shoulder(side)] =
            position_only(blended(arm.upper, HumanBone::upper_arm(side)), LIMB_WEIGHT);
        targets.effectors[EffectorKind::thigh(side)] =
            position_only(blended(leg.upper, HumanBone::upper_leg(side)), LIMB_WEIGHT);
        targets.effectors[EffectorKind::foot(side)] =
            position_only(blended(leg.end, HumanBone::foot(side)), LIMB_WEIGHT);

        let lower_arm = rig
            .rotation(HumanBone::lower_arm(side))
            .unwrap_or_else(UnitQuaternion::identity);
        targets.effectors[EffectorKind::hand(side)] = Effector {
            position: blended(arm.end, HumanBone::hand(side)),
            position_weight: LIMB_WEIGHT,
            rotation: lower_arm * session.next_hand_local[side],
            rotation_weight: LIMB_WEIGHT,
        };

        targets.bend_goals[ChainKind::arm(side)] = BendGoal {
            position: blended(arm.lower, HumanBone::lower_arm(side)),
            weight: BEND_WEIGHT,
        };
        targets.bend_goals[ChainKind::leg(side)] = BendGoal {
            position: blended(leg.lower, HumanBone::lower_leg(side)),
            weight: BEND_WEIGHT,
        };
    }

    let head_current = rig.rotation(HumanBone::Head).unwrap_or(session.head_goal);
    let (position_weight, rotation_weight) = if session.face_tracked {
        HEAD_WEIGHTS_TRACKED
    } else {
        HEAD_WEIGHTS_IDLE
    };
    targets.effectors[EffectorKind::Head] = Effector {
        position: session.head_bind_position,
        position_weight,
        rotation: blend.rotation(session.head_goal, head_current),
        rotation_weight,
    };
    targets.head_bend = HeadBend {
        weight: BEND_WEIGHT,
        ..HeadBend::default()
    };

    targets
}
