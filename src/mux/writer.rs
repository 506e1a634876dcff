use crate::media::Packet;

use super::{OutputUnit, PacketSink};

/// Routes the packet stream into per-segment output units, rotating on each
/// confirmed cut.
///
/// Units open lazily on the first packet after a rotation. A unit that fails
/// (timestamp regression or sink error) is abandoned: its remaining packets
/// are discarded, and the next rotation starts clean.
pub struct SegmentMuxer<S, F> {
    make_sink: F,
    unit: Option<OutputUnit<S>>,
    unit_index: u32,
    abandoned: bool,
}

impl<S: PacketSink, F: FnMut(u32) -> std::io::Result<S>> SegmentMuxer<S, F> {
    pub fn new(make_sink: F) -> Self {
        Self {
            make_sink,
            unit: None,
            unit_index: 0,
            abandoned: false,
        }
    }

    pub fn write(&mut self, packet: &Packet) {
        if self.abandoned {
            tracing::trace!(unit = self.unit_index, "packet discarded, unit abandoned");
            return;
        }
        if self.unit.is_none() {
            match (self.make_sink)(self.unit_index) {
                Ok(sink) => self.unit = Some(OutputUnit::new(sink)),
                Err(e) => {
                    tracing::error!(unit = self.unit_index, error = %e, "failed to open output unit");
                    self.abandoned = true;
                    return;
                }
            }
        }

        if let Some(unit) = self.unit.as_mut() {
            if let Err(e) = unit.write(packet) {
                tracing::error!(unit = self.unit_index, error = %e, "output unit abandoned");
                self.unit = None;
                self.abandoned = true;
            }
        }
    }

    /// A confirmed cut: close the current unit and start the next one on the
    /// following packet.
    pub fn rotate(&mut self, time_secs: f64) {
        if let Some(unit) = self.unit.take() {
            if let Err(e) = unit.finish() {
                tracing::error!(unit = self.unit_index, error = %e, "failed to close output unit");
            }
        }
        self.unit_index += 1;
        self.abandoned = false;
        tracing::debug!(
            time_secs = format!("{:.2}", time_secs),
            unit = self.unit_index,
            "rotating output unit"
        );
    }

    pub fn finish(mut self) {
        if let Some(unit) = self.unit.take() {
            if let Err(e) = unit.finish() {
                tracing::error!(unit = self.unit_index, error = %e, "failed to close output unit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::media::StreamKind;

    #[derive(Default)]
    struct Log {
        writes: Vec<(u32, i64)>,
        opened: u32,
    }

    struct LogSink {
        index: u32,
        log: Arc<Mutex<Log>>,
    }

    impl PacketSink for LogSink {
        fn write(&mut self, packet: &Packet) -> std::io::Result<()> {
            self.log.lock().unwrap().writes.push((self.index, packet.dts));
            Ok(())
        }
    }

    fn muxer(
        log: Arc<Mutex<Log>>,
    ) -> SegmentMuxer<LogSink, impl FnMut(u32) -> std::io::Result<LogSink>> {
        SegmentMuxer::new(move |index| {
            let log = Arc::clone(&log);
            log.lock().unwrap().opened += 1;
            Ok(LogSink { index, log })
        })
    }

    fn packet(dts: i64) -> Packet {
        Packet {
            kind: StreamKind::Video,
            pts: dts,
            dts,
            keyframe: false,
            payload: vec![0],
            cells: vec![0x47],
        }
    }

    #[test]
    fn rotation_moves_packets_to_the_next_unit() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut muxer = muxer(Arc::clone(&log));

        muxer.write(&packet(0));
        muxer.write(&packet(3_600));
        muxer.rotate(5.0);
        muxer.write(&packet(450_000));
        muxer.finish();

        let log = log.lock().unwrap();
        // Rebase restarts per unit
        assert_eq!(log.writes, vec![(0, 0), (0, 3_600), (1, 0)]);
        assert_eq!(log.opened, 2);
    }

    #[test]
    fn units_open_lazily() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut muxer = muxer(Arc::clone(&log));

        muxer.rotate(1.0);
        muxer.rotate(2.0);
        muxer.finish();

        assert_eq!(log.lock().unwrap().opened, 0);
    }

    #[test]
    fn failed_unit_is_abandoned_until_next_rotation() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut muxer = muxer(Arc::clone(&log));

        muxer.write(&packet(10_000));
        muxer.write(&packet(13_600));
        // Regression: fatal for this unit only
        muxer.write(&packet(12_000));
        muxer.write(&packet(14_000));

        muxer.rotate(9.0);
        muxer.write(&packet(20_000));
        muxer.finish();

        let log = log.lock().unwrap();
        assert_eq!(log.writes, vec![(0, 0), (0, 3_600), (1, 0)]);
    }
}
