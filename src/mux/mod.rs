mod sink;
mod unit;
mod writer;

pub use sink::{PacketSink, TsFileSink};
pub use unit::OutputUnit;
pub use writer::SegmentMuxer;

use thiserror::Error;

use crate::media::StreamKind;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("decode timestamp regressed for {kind} stream: {previous} -> {current}")]
    TimestampRegression {
        kind: StreamKind,
        previous: i64,
        current: i64,
    },
    #[error("sink write failed: {0}")]
    Sink(#[from] std::io::Error),
}
