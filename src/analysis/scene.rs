use std::collections::VecDeque;

use super::fingerprint::AudioComparator;

/// The audio ring retains a little more than the analysis window so a cut at
/// the edge still has a full "before" context.
const AUDIO_RING_SLACK: f64 = 1.2;

/// Decoded audio retained for cut confirmation.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub time_secs: f64,
    pub samples: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct SceneConfig {
    /// Below this similarity the cut is confirmed immediately.
    pub definite_threshold: f64,
    /// Below this similarity (but above the definite one) the cut is held
    /// pending audio confirmation.
    pub change_threshold: f64,
    /// Debounce between cuts.
    pub min_scene_duration_secs: f64,
    /// Trailing audio span required to resolve a pending cut.
    pub audio_window_secs: f64,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            definite_threshold: 0.1,
            change_threshold: 0.8,
            min_scene_duration_secs: 1.0,
            audio_window_secs: 2.0,
        }
    }
}

struct PendingCut {
    time_secs: f64,
    audio_before: Vec<AudioChunk>,
}

/// Two-tier scene cut tracker.
///
/// Cuts with near-zero visual similarity confirm immediately; ambiguous ones
/// wait as pending cuts until enough trailing audio has arrived to ask the
/// comparator whether the soundscape actually changed. The confirmed list is
/// seeded with 0.0 and stays monotonically increasing.
pub struct SceneCutTracker<C> {
    config: SceneConfig,
    comparator: C,
    confirmed: Vec<f64>,
    pending: Vec<PendingCut>,
    audio_ring: VecDeque<AudioChunk>,
}

impl<C: AudioComparator> SceneCutTracker<C> {
    pub fn new(config: &SceneConfig, comparator: C) -> Self {
        Self {
            config: *config,
            comparator,
            confirmed: vec![0.0],
            pending: Vec::new(),
            audio_ring: VecDeque::new(),
        }
    }

    fn last_cut_or_pending(&self) -> f64 {
        self.pending
            .last()
            .map(|p| p.time_secs)
            .or_else(|| self.confirmed.last().copied())
            .unwrap_or(0.0)
    }

    /// Feed the similarity of a video frame against its predecessor.
    /// Returns the cut timestamp when the frame confirms a cut immediately.
    pub fn observe_similarity(&mut self, time_secs: f64, similarity: f64) -> Option<f64> {
        if time_secs - self.last_cut_or_pending() < self.config.min_scene_duration_secs {
            return None;
        }

        if similarity < self.config.definite_threshold {
            tracing::info!(
                time_secs = format!("{:.2}", time_secs),
                similarity = format!("{:.3}", similarity),
                "immediate scene cut"
            );
            self.drop_superseded_pending();
            self.confirmed.push(time_secs);
            Some(time_secs)
        } else if similarity < self.config.change_threshold {
            tracing::debug!(
                time_secs = format!("{:.2}", time_secs),
                similarity = format!("{:.3}", similarity),
                "potential scene cut, awaiting audio"
            );
            self.pending.push(PendingCut {
                time_secs,
                audio_before: self.audio_ring.iter().cloned().collect(),
            });
            None
        } else {
            None
        }
    }

    /// Every pending cut predates an immediate confirmation, so confirming
    /// one out from under them would break the monotonic confirmed list.
    fn drop_superseded_pending(&mut self) {
        for cut in self.pending.drain(..) {
            tracing::debug!(
                time_secs = format!("{:.2}", cut.time_secs),
                reason = "superseded by immediate cut",
                "pending cut dropped"
            );
        }
    }

    /// Feed a decoded audio chunk; returns cuts confirmed by it.
    pub fn observe_audio(&mut self, chunk: AudioChunk) -> Vec<f64> {
        let newest = chunk.time_secs;
        self.audio_ring.push_back(chunk);
        while let Some(front) = self.audio_ring.front() {
            if newest - front.time_secs > self.config.audio_window_secs * AUDIO_RING_SLACK {
                self.audio_ring.pop_front();
            } else {
                break;
            }
        }

        self.resolve_pending(false)
    }

    fn resolve_pending(&mut self, at_end: bool) -> Vec<f64> {
        let mut confirmed_now = Vec::new();

        for cut in std::mem::take(&mut self.pending) {
            let after: Vec<&AudioChunk> = self
                .audio_ring
                .iter()
                .filter(|c| c.time_secs > cut.time_secs)
                .collect();

            let span = after
                .last()
                .map(|c| c.time_secs - cut.time_secs)
                .unwrap_or(0.0);
            if span < self.config.audio_window_secs && !at_end {
                self.pending.push(cut);
                continue;
            }
            if after.is_empty() {
                tracing::debug!(
                    time_secs = format!("{:.2}", cut.time_secs),
                    reason = "no trailing audio",
                    "pending cut dropped"
                );
                continue;
            }

            let before: Vec<f32> = cut
                .audio_before
                .iter()
                .flat_map(|c| c.samples.iter().copied())
                .collect();
            let after_samples: Vec<f32> = after
                .iter()
                .flat_map(|c| c.samples.iter().copied())
                .collect();

            if self.comparator.are_similar(&before, &after_samples) {
                tracing::info!(
                    time_secs = format!("{:.2}", cut.time_secs),
                    reason = "audio similar",
                    "scene cut rejected"
                );
            } else {
                tracing::info!(
                    time_secs = format!("{:.2}", cut.time_secs),
                    "scene cut confirmed, audio differs"
                );
                self.confirmed.push(cut.time_secs);
                confirmed_now.push(cut.time_secs);
            }
        }

        confirmed_now
    }

    /// Abort: pending cuts are dropped outright, never force-confirmed from
    /// incomplete evidence.
    pub fn discard_pending(&mut self) {
        for cut in self.pending.drain(..) {
            tracing::debug!(
                time_secs = format!("{:.2}", cut.time_secs),
                reason = "session aborted",
                "pending cut dropped"
            );
        }
    }

    /// End of stream or duration limit: force-resolve pending cuts against
    /// whatever trailing audio exists and close the final segment.
    pub fn finish(&mut self, end_time_secs: f64) -> Vec<f64> {
        let mut cuts = self.resolve_pending(true);

        let last = self.confirmed.last().copied().unwrap_or(0.0);
        if end_time_secs - last >= self.config.min_scene_duration_secs {
            tracing::info!(
                time_secs = format!("{:.2}", end_time_secs),
                "final segment closed"
            );
            self.confirmed.push(end_time_secs);
            cuts.push(end_time_secs);
        }
        cuts
    }

    pub fn confirmed_cuts(&self) -> &[f64] {
        &self.confirmed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Pair consecutive confirmed cuts into closed time ranges.
pub fn segment_ranges(cuts: &[f64]) -> Vec<(f64, f64)> {
    cuts.windows(2).map(|w| (w[0], w[1])).collect()
}
