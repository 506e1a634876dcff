mod black;
mod dead_air;
mod fingerprint;
mod scene;
mod silence;
mod similarity;

pub use black::is_frame_black;
pub use dead_air::{BoundaryEvent, DeadAirConfig, DeadAirTracker};
pub use fingerprint::{AudioComparator, AudioMetric, MfccComparator};
pub use scene::{segment_ranges, AudioChunk, SceneConfig, SceneCutTracker};
pub use silence::{SilenceConfig, SilenceDetector};
pub use similarity::{frame_similarity, SimilarityWeights};
