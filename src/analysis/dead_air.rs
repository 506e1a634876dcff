/// A validated boundary between two program segments: the span of content
/// from the end of one dead-air run to the start of the next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryEvent {
    pub start_secs: f64,
    pub end_secs: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct DeadAirConfig {
    /// Segments shorter than this are detection jitter.
    pub min_gap_secs: f64,
    /// Segments longer than this are likely a misclassified run.
    pub max_gap_secs: f64,
}

impl Default for DeadAirConfig {
    fn default() -> Self {
        Self {
            min_gap_secs: 1.0,
            max_gap_secs: 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    Watching,
    InDeadAir,
}

/// Turns simultaneous black+silence runs into validated segment boundaries.
///
/// `previous_end` starts at 0.0 (the start-of-stream marker) so the opening
/// program segment can be bounded by the first dead-air run. It advances on
/// every closed candidate whether or not an event fired, so consecutive runs
/// telescope correctly.
pub struct DeadAirTracker {
    state: TrackerState,
    candidate_start: f64,
    previous_end: f64,
    min_gap_secs: f64,
    max_gap_secs: f64,
}

impl DeadAirTracker {
    pub fn new(config: &DeadAirConfig) -> Self {
        Self {
            state: TrackerState::Watching,
            candidate_start: 0.0,
            previous_end: 0.0,
            min_gap_secs: config.min_gap_secs,
            max_gap_secs: config.max_gap_secs,
        }
    }

    /// Observe the combined flags at one frame's timestamp. Flags must arrive
    /// in timestamp order; on equal timestamps the video frame goes first.
    pub fn observe(&mut self, time_secs: f64, black: bool, silent: bool) -> Option<BoundaryEvent> {
        match self.state {
            TrackerState::Watching => {
                if black && silent {
                    self.state = TrackerState::InDeadAir;
                    self.candidate_start = time_secs;
                    tracing::debug!(
                        time_secs = format!("{:.2}", time_secs),
                        "dead air started"
                    );
                }
                None
            }
            TrackerState::InDeadAir => {
                if black && silent {
                    return None;
                }
                self.state = TrackerState::Watching;
                let candidate_end = time_secs;
                let gap = self.candidate_start - self.previous_end;

                let event = if gap >= self.min_gap_secs && gap <= self.max_gap_secs {
                    tracing::info!(
                        start_secs = format!("{:.2}", self.previous_end),
                        end_secs = format!("{:.2}", self.candidate_start),
                        "segment boundary"
                    );
                    Some(BoundaryEvent {
                        start_secs: self.previous_end,
                        end_secs: self.candidate_start,
                    })
                } else {
                    let reason = if gap < self.min_gap_secs {
                        "gap below minimum"
                    } else {
                        "gap above maximum"
                    };
                    tracing::debug!(
                        time_secs = format!("{:.2}", self.candidate_start),
                        gap_secs = format!("{:.2}", gap),
                        reason,
                        "dead-air candidate discarded"
                    );
                    None
                };

                self.previous_end = candidate_end;
                event
            }
        }
    }

    /// End of stream: a still-open candidate has no known end and is dropped.
    pub fn finish(&mut self) {
        if self.state == TrackerState::InDeadAir {
            tracing::debug!(
                time_secs = format!("{:.2}", self.candidate_start),
                reason = "end of stream",
                "open dead-air candidate discarded"
            );
        }
        self.state = TrackerState::Watching;
    }
}
