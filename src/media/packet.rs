use std::fmt;

/// MPEG-TS PES timestamps tick at 90 kHz.
pub const TS_CLOCK_HZ: i64 = 90_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Video,
    Audio,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// One demultiplexed elementary-stream packet.
///
/// `cells` keeps the raw 188-byte transport cells the packet arrived in so
/// downstream consumers (decoders, output units) can re-feed them without a
/// re-mux step.
#[derive(Debug, Clone)]
pub struct Packet {
    pub kind: StreamKind,
    /// Presentation timestamp in 90 kHz ticks.
    pub pts: i64,
    /// Decode timestamp in 90 kHz ticks; equals `pts` when the stream does
    /// not signal a separate DTS.
    pub dts: i64,
    pub keyframe: bool,
    pub payload: Vec<u8>,
    pub cells: Vec<u8>,
}

impl Packet {
    pub fn time_secs(&self) -> f64 {
        self.pts as f64 / TS_CLOCK_HZ as f64
    }
}

/// A decoded analysis frame: packed BGR, one byte per channel.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub time_secs: f64,
    pub width: i32,
    pub height: i32,
    pub data: Vec<u8>,
}

/// A decoded run of mono audio samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub time_secs: f64,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}
