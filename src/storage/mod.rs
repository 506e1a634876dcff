mod journal;
mod store;

pub use journal::{SegmentJournal, SegmentRecord};
pub use store::{BoundaryStore, CutStore};
