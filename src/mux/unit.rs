use std::collections::HashMap;

use crate::media::{Packet, StreamKind};

use super::{MuxError, PacketSink};

struct StreamOffsets {
    origin_pts: i64,
    origin_dts: i64,
    last_dts: Option<i64>,
}

/// One physical output container.
///
/// The first packet seen for each stream kind pins that kind's origin
/// timestamps for the unit's lifetime. Every packet is rebased by
/// subtraction, so the unit's timeline starts at zero and keeps the source's
/// relative spacing. Decode timestamps must be non-decreasing per kind;
/// a regression would produce a corrupt container and fails the unit.
pub struct OutputUnit<S> {
    sink: S,
    offsets: HashMap<StreamKind, StreamOffsets>,
}

impl<S: PacketSink> OutputUnit<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            offsets: HashMap::new(),
        }
    }

    pub fn write(&mut self, packet: &Packet) -> Result<(), MuxError> {
        let offsets = self.offsets.entry(packet.kind).or_insert(StreamOffsets {
            origin_pts: packet.pts,
            origin_dts: packet.dts,
            last_dts: None,
        });

        let pts = packet.pts - offsets.origin_pts;
        let dts = packet.dts - offsets.origin_dts;

        if let Some(previous) = offsets.last_dts {
            if dts < previous {
                return Err(MuxError::TimestampRegression {
                    kind: packet.kind,
                    previous,
                    current: dts,
                });
            }
        }
        offsets.last_dts = Some(dts);

        let rebased = Packet {
            pts,
            dts,
            ..packet.clone()
        };
        self.sink.write(&rebased)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), MuxError> {
        self.sink.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedSink {
        packets: Arc<Mutex<Vec<Packet>>>,
    }

    impl PacketSink for SharedSink {
        fn write(&mut self, packet: &Packet) -> std::io::Result<()> {
            self.packets.lock().unwrap().push(packet.clone());
            Ok(())
        }
    }

    fn packet(kind: StreamKind, pts: i64, dts: i64) -> Packet {
        Packet {
            kind,
            pts,
            dts,
            keyframe: false,
            payload: vec![0],
            cells: vec![0x47],
        }
    }

    #[test]
    fn first_packet_of_each_kind_rebases_to_zero() {
        let sink = SharedSink::default();
        let mut unit = OutputUnit::new(sink.clone());

        unit.write(&packet(StreamKind::Video, 900_000, 897_000)).unwrap();
        unit.write(&packet(StreamKind::Audio, 901_000, 901_000)).unwrap();

        let written = sink.packets.lock().unwrap();
        assert_eq!((written[0].pts, written[0].dts), (0, 0));
        assert_eq!((written[1].pts, written[1].dts), (0, 0));
    }

    #[test]
    fn relative_spacing_is_preserved() {
        let sink = SharedSink::default();
        let mut unit = OutputUnit::new(sink.clone());

        unit.write(&packet(StreamKind::Video, 900_000, 897_000)).unwrap();
        unit.write(&packet(StreamKind::Video, 903_600, 900_600)).unwrap();
        unit.write(&packet(StreamKind::Video, 907_200, 904_200)).unwrap();

        let written = sink.packets.lock().unwrap();
        assert_eq!(written[1].pts, 3_600);
        assert_eq!(written[2].pts, 7_200);
        assert_eq!(written[2].dts, 7_200);
    }

    #[test]
    fn origins_are_independent_per_kind() {
        let sink = SharedSink::default();
        let mut unit = OutputUnit::new(sink.clone());

        unit.write(&packet(StreamKind::Video, 100_000, 100_000)).unwrap();
        unit.write(&packet(StreamKind::Audio, 250_000, 250_000)).unwrap();
        unit.write(&packet(StreamKind::Audio, 251_000, 251_000)).unwrap();

        let written = sink.packets.lock().unwrap();
        assert_eq!(written[2].pts, 1_000);
    }

    #[test]
    fn equal_decode_timestamps_are_accepted() {
        let sink = SharedSink::default();
        let mut unit = OutputUnit::new(sink);
        unit.write(&packet(StreamKind::Video, 0, 0)).unwrap();
        assert!(unit.write(&packet(StreamKind::Video, 100, 0)).is_ok());
    }

    #[test]
    fn decode_timestamp_regression_is_fatal() {
        let sink = SharedSink::default();
        let mut unit = OutputUnit::new(sink.clone());

        unit.write(&packet(StreamKind::Video, 10_000, 10_000)).unwrap();
        unit.write(&packet(StreamKind::Video, 13_600, 13_600)).unwrap();
        let err = unit
            .write(&packet(StreamKind::Video, 12_000, 12_000))
            .unwrap_err();

        match err {
            MuxError::TimestampRegression {
                kind,
                previous,
                current,
            } => {
                assert_eq!(kind, StreamKind::Video);
                assert_eq!(previous, 3_600);
                assert_eq!(current, 2_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The offending packet never reached the sink
        assert_eq!(sink.packets.lock().unwrap().len(), 2);
    }
}
