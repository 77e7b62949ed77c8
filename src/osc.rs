use anyhow::{Context, Result};
use nalgebra::{UnitQuaternion, Vector3};
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use std::net::UdpSocket;

use crate::blendshape::{BlendShapePreset, BlendShapeSink};
use crate::ik::{BendGoal, ChainKind, Effector, EffectorKind, HeadBend, IkSolver, IkTargets};

pub const EFFECTOR_ADDR: &str = "/IK/Effector";
pub const BEND_GOAL_ADDR: &str = "/IK/BendGoal";
pub const HEAD_BEND_ADDR: &str = "/IK/HeadBend";
pub const BLEND_VALUE_ADDR: &str = "/VMC/Ext/Blend/Val";
pub const BLEND_APPLY_ADDR: &str = "/VMC/Ext/Blend/Apply";

fn vector_args(v: &Vector3<f32>) -> [OscType; 3] {
    [OscType::Float(v.x), OscType::Float(v.y), OscType::Float(v.z)]
}

fn quaternion_args(q: &UnitQuaternion<f32>) -> [OscType; 4] {
    // (x, y, z, w)
    [
        OscType::Float(q.i),
        OscType::Float(q.j),
        OscType::Float(q.k),
        OscType::Float(q.w),
    ]
}

/// エフェクタ1つ分
/// 引数: name, px, py, pz, 位置ウェイト, qx, qy, qz, qw, 回転ウェイト
pub fn build_effector_message(kind: EffectorKind, effector: &Effector) -> OscMessage {
    let mut args = vec![OscType::String(kind.name().to_string())];
    args.extend(vector_args(&effector.position));
    args.push(OscType::Float(effector.position_weight));
    args.extend(quaternion_args(&effector.rotation));
    args.push(OscType::Float(effector.rotation_weight));
    OscMessage {
        addr: EFFECTOR_ADDR.to_string(),
        args,
    }
}

/// 引数: name, px, py, pz, ウェイト
pub fn build_bend_goal_message(chain: ChainKind, goal: &BendGoal) -> OscMessage {
    let mut args = vec![OscType::String(chain.name().to_string())];
    args.extend(vector_args(&goal.position));
    args.push(OscType::Float(goal.weight));
    OscMessage {
        addr: BEND_GOAL_ADDR.to_string(),
        args,
    }
}

/// 頭エフェクタの曲げ設定
/// 引数: 曲げウェイト, 腰ウェイト, 太ももウェイト, (ボーン名, 配分) の繰り返し
pub fn build_head_bend_message(bend: &HeadBend) -> OscMessage {
    let mut args = vec![
        OscType::Float(bend.weight),
        OscType::Float(bend.body_weight),
        OscType::Float(bend.thigh_weight),
    ];
    for (bone, weight) in bend.bones {
        args.push(OscType::String(format!("{:?}", bone)));
        args.push(OscType::Float(weight));
    }
    OscMessage {
        addr: HEAD_BEND_ADDR.to_string(),
        args,
    }
}

pub fn build_blend_value_message(preset: BlendShapePreset, value: f32) -> OscMessage {
    OscMessage {
        addr: BLEND_VALUE_ADDR.to_string(),
        args: vec![OscType::String(preset.name().to_string()), OscType::Float(value)],
    }
}

pub fn build_blend_apply_message() -> OscMessage {
    OscMessage {
        addr: BLEND_APPLY_ADDR.to_string(),
        args: vec![],
    }
}

/// 1フレーム分のIKターゲット。エフェクタ → 曲げゴールの順
pub fn build_target_messages(targets: &IkTargets) -> Vec<OscMessage> {
    let mut messages: Vec<OscMessage> = targets
        .effectors
        .iter()
        .map(|(kind, effector)| build_effector_message(kind, effector))
        .collect();
    messages.extend(
        targets
            .bend_goals
            .iter()
            .map(|(chain, goal)| build_bend_goal_message(chain, goal)),
    );
    messages.push(build_head_bend_message(&targets.head_bend));
    messages
}

/// 複数メッセージを即時実行のバンドル1つにエンコード
pub fn encode_bundle(messages: Vec<OscMessage>) -> Result<Vec<u8>> {
    let packet = OscPacket::Bundle(OscBundle {
        timetag: OscTime { seconds: 0, fractional: 1 },
        content: messages.into_iter().map(OscPacket::Message).collect(),
    });
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// IKターゲットとブレンドシェイプを UDP で送る
pub struct OscSink {
    socket: UdpSocket,
    target_addr: String,
}

impl OscSink {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind OSC socket")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    pub fn target_addr(&self) -> &str {
        &self.target_addr
    }

    fn send_bundle(&self, messages: Vec<OscMessage>) -> Result<()> {
        let data = encode_bundle(messages)?;
        self.socket
            .send_to(&data, &self.target_addr)
            .with_context(|| format!("Failed to send OSC to {}", self.target_addr))?;
        Ok(())
    }
}

impl IkSolver for OscSink {
    fn submit(&mut self, targets: &IkTargets) -> Result<()> {
        self.send_bundle(build_target_messages(targets))
    }
}

impl BlendShapeSink for OscSink {
    fn write(&mut self, weights: &[(BlendShapePreset, f32)]) -> Result<()> {
        if weights.is_empty() {
            return Ok(());
        }
        let mut messages: Vec<OscMessage> = weights
            .iter()
            .map(|&(preset, value)| build_blend_value_message(preset, value))
            .collect();
        messages.push(build_blend_apply_message());
        self.send_bundle(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::decoder;

    #[test]
    fn test_effector_message_args() {
        let effector = Effector {
            position: Vector3::new(1.0, 2.0, 3.0),
            position_weight: 0.5,
            rotation: UnitQuaternion::identity(),
            rotation_weight: 0.8,
        };
        let msg = build_effector_message(EffectorKind::LeftHand, &effector);
        assert_eq!(msg.addr, "/IK/Effector");

        // 引数: name, px, py, pz, pw, qx, qy, qz, qw, rw
        assert_eq!(msg.args.len(), 10);
        assert_eq!(msg.args[0], OscType::String("LeftHand".to_string()));
        // position
        assert_eq!(msg.args[1], OscType::Float(1.0));
        assert_eq!(msg.args[2], OscType::Float(2.0));
        assert_eq!(msg.args[3], OscType::Float(3.0));
        assert_eq!(msg.args[4], OscType::Float(0.5));
        // rotation (quaternion)
        assert_eq!(msg.args[5], OscType::Float(0.0));
        assert_eq!(msg.args[6], OscType::Float(0.0));
        assert_eq!(msg.args[7], OscType::Float(0.0));
        assert_eq!(msg.args[8], OscType::Float(1.0));
        assert_eq!(msg.args[9], OscType::Float(0.8));
    }

    #[test]
    fn test_bend_goal_message_args() {
        let goal = BendGoal {
            position: Vector3::new(0.4, 1.4, -0.1),
            weight: 1.0,
        };
        let msg = build_bend_goal_message(ChainKind::RightLeg, &goal);
        assert_eq!(msg.addr, "/IK/BendGoal");
        assert_eq!(msg.args.len(), 5);
        assert_eq!(msg.args[0], OscType::String("RightLeg".to_string()));
        assert_eq!(msg.args[3], OscType::Float(-0.1));
        assert_eq!(msg.args[4], OscType::Float(1.0));
    }

    #[test]
    fn test_blend_messages() {
        let msg = build_blend_value_message(BlendShapePreset::BlinkL, 0.25);
        assert_eq!(msg.addr, "/VMC/Ext/Blend/Val");
        assert_eq!(msg.args[0], OscType::String("Blink_L".to_string()));
        assert_eq!(msg.args[1], OscType::Float(0.25));
        assert!(build_blend_apply_message().args.is_empty());
    }

    #[test]
    fn test_target_messages_cover_all_effectors_and_chains() {
        let messages = build_target_messages(&IkTargets::default());
        let effectors = messages.iter().filter(|m| m.addr == EFFECTOR_ADDR).count();
        let bends = messages.iter().filter(|m| m.addr == BEND_GOAL_ADDR).count();
        assert_eq!(effectors, 10);
        assert_eq!(bends, 4);
        assert_eq!(messages.last().map(|m| m.addr.as_str()), Some(HEAD_BEND_ADDR));
    }

    #[test]
    fn test_head_bend_message_args() {
        let bend = HeadBend {
            weight: 1.0,
            ..HeadBend::default()
        };
        let msg = build_head_bend_message(&bend);
        assert_eq!(
            msg.args,
            vec![
                OscType::Float(1.0),
                OscType::Float(0.0),
                OscType::Float(0.0),
                OscType::String("Spine".to_string()),
                OscType::Float(0.5),
                OscType::String("Chest".to_string()),
                OscType::Float(0.5),
            ]
        );
    }

    #[test]
    fn test_encode_bundle_decodes() {
        let messages = vec![
            build_blend_value_message(BlendShapePreset::A, 1.0),
            build_blend_apply_message(),
        ];
        let encoded = encode_bundle(messages).unwrap();
        let (_, packet) = decoder::decode_udp(&encoded).unwrap();
        let OscPacket::Bundle(bundle) = packet else {
            panic!("expected bundle");
        };
        assert_eq!(bundle.content.len(), 2);
        let OscPacket::Message(last) = &bundle.content[1] else {
            panic!("expected message");
        };
        assert_eq!(last.addr, BLEND_APPLY_ADDR);
    }

    #[test]
    fn test_sink_sends_to_local_socket() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = receiver.local_addr().unwrap().to_string();
        let mut sink = OscSink::new(&addr).unwrap();
        sink.write(&[(BlendShapePreset::Blink, 0.5)]).unwrap();

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = decoder::decode_udp(&buf[..len]).unwrap();
        assert!(matches!(packet, OscPacket::Bundle(_)));
    }
}
