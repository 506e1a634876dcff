mod decoder;
mod demux;
mod ingest;
mod packet;

pub use decoder::{FrameDecoder, SampleDecoder, ANALYSIS_HEIGHT, ANALYSIS_WIDTH};
pub use demux::TsDemuxer;
pub use ingest::{FfmpegIngest, IngestError};
pub use packet::{AudioFrame, Packet, StreamKind, VideoFrame};
