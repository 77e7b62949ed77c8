pub mod adapter;
pub mod mailbox;
pub mod mirror;
pub mod packet;
pub mod topology;

pub use adapter::LandmarkAdapter;
pub use mailbox::{LatestPackets, PacketMailbox};
pub use mirror::{MirrorMap, MirrorTables};
pub use packet::{Landmark, RawLandmark, StreamKind, TrackingPacket};
pub use topology::{FaceLandmark, HandLandmark, PoseLandmark};
