use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::media::Packet;

/// Destination for rebased packets. A rejected write is fatal for the
/// current output unit only.
pub trait PacketSink {
    fn write(&mut self, packet: &Packet) -> std::io::Result<()>;

    fn finish(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes each packet's transport cells to a file. Cells are self-contained,
/// so the concatenation is itself a playable MPEG-TS file; the rebased
/// timestamps ride along in the packet metadata for ordering validation.
pub struct TsFileSink {
    writer: BufWriter<File>,
}

impl TsFileSink {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl PacketSink for TsFileSink {
    fn write(&mut self, packet: &Packet) -> std::io::Result<()> {
        self.writer.write_all(&packet.cells)
    }

    fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
