//! TCP protocol for landmark producer → retarget server communication.
//!
//! Self-contained apart from the landmark wire types.

use anyhow::Context;
use bytes::Bytes;
use futures::{Sink, SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::landmark::{RawLandmark, StreamKind};

pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024; // 16MB

// --- Message types ---

/// Producer → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `landmarks: None` means the detector lost the target this frame.
    Landmarks {
        stream: StreamKind,
        timestamp_us: u64,
        landmarks: Option<Vec<RawLandmark>>,
    },
    /// The avatar rig has been (re)loaded; calibrate on the next tick.
    AssetLoaded,
    /// Expression weights by preset name. Unknown names are ignored.
    BlendShapes { values: Vec<(String, f32)> },
    /// Ask for the current non-zero expression weights.
    QueryBlendShapes,
}

/// Server → producer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Calibration finished; landmarks will be retargeted.
    Ready,
    /// The rig could not be calibrated.
    CalibrationFailed,
    BlendShapes { values: Vec<(String, f32)> },
}

// --- Recordings ---

/// One line of a JSON-lines landmark recording.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LandmarkRecord {
    pub stream: StreamKind,
    pub timestamp_us: u64,
    #[serde(default)]
    pub landmarks: Option<Vec<RawLandmark>>,
}

impl From<LandmarkRecord> for ClientMessage {
    fn from(record: LandmarkRecord) -> Self {
        ClientMessage::Landmarks {
            stream: record.stream,
            timestamp_us: record.timestamp_us,
            landmarks: record.landmarks,
        }
    }
}

/// Parse a JSON-lines recording. Blank lines are skipped.
pub fn parse_recording(text: &str) -> anyhow::Result<Vec<LandmarkRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid record on line {}", i + 1))
        })
        .collect()
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    Framed::new(stream, codec())
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    send_to_sink(stream, msg).await
}

/// Send into any bytes sink, e.g. the write half of a split stream.
pub async fn send_to_sink<S, T>(sink: &mut S, msg: &T) -> anyhow::Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}
