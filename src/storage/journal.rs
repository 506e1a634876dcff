use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::analysis::BoundaryEvent;

/// One detection event, serialized as a single JSON line. The append-only
/// journal is the seam a document-store consumer tails.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentRecord {
    DeadAirBoundary {
        start_secs: f64,
        end_secs: f64,
        duration_secs: f64,
    },
    SceneCut {
        time_secs: f64,
    },
}

impl SegmentRecord {
    pub fn boundary(event: &BoundaryEvent) -> Self {
        SegmentRecord::DeadAirBoundary {
            start_secs: event.start_secs,
            end_secs: event.end_secs,
            duration_secs: event.end_secs - event.start_secs,
        }
    }

    pub fn cut(time_secs: f64) -> Self {
        SegmentRecord::SceneCut { time_secs }
    }
}

pub struct SegmentJournal {
    writer: BufWriter<File>,
}

impl SegmentJournal {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    /// Events are flushed immediately so a crashed session leaves a complete
    /// journal of everything it detected.
    pub fn append(&mut self, record: &SegmentRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.jsonl");

        let mut journal = SegmentJournal::create(&path).unwrap();
        journal
            .append(&SegmentRecord::boundary(&BoundaryEvent {
                start_secs: 0.0,
                end_secs: 10.0,
            }))
            .unwrap();
        journal.append(&SegmentRecord::cut(8.0)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let boundary: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(boundary["kind"], "dead_air_boundary");
        assert_eq!(boundary["duration_secs"], 10.0);

        let cut: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(cut["kind"], "scene_cut");
        assert_eq!(cut["time_secs"], 8.0);
    }
}
