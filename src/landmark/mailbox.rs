use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::packet::{StreamKind, TrackingPacket};

/// ストリームごとに1スロットだけ持つ受け渡し箱
///
/// 受信スレッドが `publish` で上書きし、メインティックが `take` で1回だけ読む。
/// キューはなく、ティック間に届いた古いパケットは捨てられる（最新値優先）。
pub struct PacketMailbox {
    slots: [Mutex<Option<TrackingPacket>>; 4],
    published: AtomicU64,
    overwritten: AtomicU64,
    closed: AtomicBool,
}

/// 1ティック分の最新パケット
#[derive(Debug, Default)]
pub struct LatestPackets {
    pub pose: Option<TrackingPacket>,
    pub left_hand: Option<TrackingPacket>,
    pub right_hand: Option<TrackingPacket>,
    pub face: Option<TrackingPacket>,
}

impl LatestPackets {
    pub fn is_empty(&self) -> bool {
        self.pose.is_none() && self.left_hand.is_none() && self.right_hand.is_none() && self.face.is_none()
    }
}

impl PacketMailbox {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(None)),
            published: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    // 受信側がパニックしても最新値の受け渡しは続ける
    fn slot(&self, kind: StreamKind) -> MutexGuard<'_, Option<TrackingPacket>> {
        self.slots[kind.index()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// パケットを書き込む。close 済みなら false
    pub fn publish(&self, packet: TrackingPacket) -> bool {
        if self.is_closed() {
            return false;
        }
        let previous = self.slot(packet.kind()).replace(packet);
        self.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    pub fn take(&self, kind: StreamKind) -> Option<TrackingPacket> {
        self.slot(kind).take()
    }

    pub fn take_all(&self) -> LatestPackets {
        LatestPackets {
            pose: self.take(StreamKind::Pose),
            left_hand: self.take(StreamKind::LeftHand),
            right_hand: self.take(StreamKind::RightHand),
            face: self.take(StreamKind::Face),
        }
    }

    /// 購読解除。以降の publish は破棄され、残っているパケットも消す
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for kind in StreamKind::ALL {
            self.slot(kind).take();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 受け付けたパケット数
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// 読まれる前に上書きされたパケット数
    pub fn overwritten_count(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl Default for PacketMailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;
    use std::sync::Arc;

    fn hand_packet(kind: StreamKind, x: f32) -> TrackingPacket {
        TrackingPacket::new(kind, vec![Landmark::new(x, 0.0, 0.0, 1.0); 21]).unwrap()
    }

    #[test]
    fn test_latest_value_wins() {
        let mailbox = PacketMailbox::new();
        mailbox.publish(hand_packet(StreamKind::LeftHand, 1.0));
        mailbox.publish(hand_packet(StreamKind::LeftHand, 2.0));
        mailbox.publish(hand_packet(StreamKind::LeftHand, 3.0));

        let packet = mailbox.take(StreamKind::LeftHand).unwrap();
        assert_eq!(packet.get(0).x, 3.0);
        assert_eq!(mailbox.overwritten_count(), 2);
        assert_eq!(mailbox.published_count(), 3);
        // 一度読んだら空
        assert!(mailbox.take(StreamKind::LeftHand).is_none());
    }

    #[test]
    fn test_streams_are_independent() {
        let mailbox = PacketMailbox::new();
        mailbox.publish(hand_packet(StreamKind::LeftHand, 1.0));
        mailbox.publish(hand_packet(StreamKind::RightHand, 2.0));

        let latest = mailbox.take_all();
        assert_eq!(latest.left_hand.unwrap().get(0).x, 1.0);
        assert_eq!(latest.right_hand.unwrap().get(0).x, 2.0);
        assert!(latest.pose.is_none());
        assert!(latest.face.is_none());
        assert_eq!(mailbox.overwritten_count(), 0);
    }

    #[test]
    fn test_closed_mailbox_rejects_publish() {
        let mailbox = PacketMailbox::new();
        mailbox.publish(hand_packet(StreamKind::LeftHand, 1.0));
        mailbox.close();
        assert!(mailbox.is_closed());
        assert!(mailbox.take_all().is_empty());
        assert!(!mailbox.publish(hand_packet(StreamKind::LeftHand, 2.0)));
        assert!(mailbox.take(StreamKind::LeftHand).is_none());
    }

    #[test]
    fn test_publish_from_other_thread() {
        let mailbox = Arc::new(PacketMailbox::new());
        let producer = mailbox.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                producer.publish(hand_packet(StreamKind::RightHand, i as f32));
            }
        });
        handle.join().unwrap();
        let packet = mailbox.take(StreamKind::RightHand).unwrap();
        assert_eq!(packet.get(0).x, 99.0);
    }
}
