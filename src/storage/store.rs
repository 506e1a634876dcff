use std::sync::{Arc, RwLock};

use crate::analysis::BoundaryEvent;

/// In-memory record of validated dead-air boundaries, shared between the
/// session and whatever consumer persists or cuts them.
pub struct BoundaryStore {
    entries: Arc<RwLock<Vec<BoundaryEvent>>>,
}

impl BoundaryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn insert(&self, event: BoundaryEvent) {
        self.entries.write().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<BoundaryEvent> {
        self.entries.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for BoundaryStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl Default for BoundaryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory record of confirmed scene cut timestamps.
pub struct CutStore {
    entries: Arc<RwLock<Vec<f64>>>,
}

impl CutStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn insert(&self, time_secs: f64) {
        self.entries.write().unwrap().push(time_secs);
    }

    pub fn snapshot(&self) -> Vec<f64> {
        self.entries.read().unwrap().clone()
    }

    pub fn last(&self) -> Option<f64> {
        self.entries.read().unwrap().last().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clone for CutStore {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl Default for CutStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_store_is_shared_between_clones() {
        let store = BoundaryStore::new();
        let clone = store.clone();
        clone.insert(BoundaryEvent {
            start_secs: 0.0,
            end_secs: 10.0,
        });
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].end_secs, 10.0);
    }

    #[test]
    fn cut_store_tracks_last_cut() {
        let store = CutStore::new();
        assert!(store.last().is_none());
        store.insert(5.0);
        store.insert(8.0);
        assert_eq!(store.last(), Some(8.0));
        assert_eq!(store.snapshot(), vec![5.0, 8.0]);
    }
}
