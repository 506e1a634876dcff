use std::collections::HashMap;

use super::packet::{Packet, StreamKind};

const TS_CELL: usize = 188;
const SYNC_BYTE: u8 = 0x47;

const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;
const STREAM_TYPE_H264: u8 = 0x1B;
const STREAM_TYPE_HEVC: u8 = 0x24;
const STREAM_TYPE_AC3: u8 = 0x81;

struct PesAssembly {
    kind: StreamKind,
    pts: Option<i64>,
    dts: Option<i64>,
    keyframe: bool,
    payload: Vec<u8>,
    cells: Vec<u8>,
}

/// MPEG-TS demultiplexer.
///
/// Scans 188-byte transport cells, discovers the video and audio elementary
/// PIDs from PAT/PMT, and assembles PES packets per PID with their PTS/DTS
/// and keyframe flag. Cells belonging to a packet are retained verbatim so
/// the packet can be fed to a decoder or written out unchanged.
pub struct TsDemuxer {
    carry: Vec<u8>,
    pmt_pid: Option<u16>,
    pids: HashMap<u16, StreamKind>,
    assemblies: HashMap<u16, PesAssembly>,
}

impl TsDemuxer {
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            pmt_pid: None,
            pids: HashMap::new(),
            assemblies: HashMap::new(),
        }
    }

    /// Feed a chunk of transport-stream bytes, returning every packet that
    /// completed inside it. Partial trailing cells are carried to the next
    /// call.
    pub fn push(&mut self, data: &[u8]) -> Vec<Packet> {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(data);

        let mut packets = Vec::new();
        let mut offset = 0;

        while offset + TS_CELL <= buf.len() {
            if buf[offset] != SYNC_BYTE {
                // Lost sync, scan forward to the next sync byte
                offset += 1;
                continue;
            }
            self.parse_cell(&buf[offset..offset + TS_CELL], &mut packets);
            offset += TS_CELL;
        }

        self.carry = buf.split_off(offset);
        packets
    }

    /// Emit any partially assembled packets at end of stream, ordered by
    /// decode timestamp.
    pub fn flush(&mut self) -> Vec<Packet> {
        let mut packets: Vec<Packet> = self
            .assemblies
            .drain()
            .filter_map(|(_, asm)| finish_assembly(asm))
            .collect();
        packets.sort_by(|a, b| a.dts.cmp(&b.dts));
        packets
    }

    /// PIDs discovered so far, if the PMT has been seen.
    pub fn has_streams(&self) -> bool {
        !self.pids.is_empty()
    }

    fn parse_cell(&mut self, cell: &[u8], out: &mut Vec<Packet>) {
        let pid = ((cell[1] as u16 & 0x1F) << 8) | cell[2] as u16;
        let payload_start = (cell[1] & 0x40) != 0;
        let has_adaptation = (cell[3] & 0x20) != 0;
        let has_payload = (cell[3] & 0x10) != 0;

        if pid == 0 {
            self.parse_pat(cell);
            return;
        }
        if Some(pid) == self.pmt_pid {
            self.parse_pmt(cell);
            return;
        }
        let Some(&kind) = self.pids.get(&pid) else {
            return;
        };

        let mut payload_offset = 4;
        let mut random_access = false;

        if has_adaptation {
            let adaptation_len = (cell[4] as usize).min(183);
            if adaptation_len > 0 {
                let flags = cell[5];
                random_access = (flags & 0x40) != 0;
            }
            payload_offset = 5 + adaptation_len;
        }

        if !has_payload || payload_offset >= TS_CELL {
            return;
        }
        let payload = &cell[payload_offset..TS_CELL];

        if payload_start {
            if let Some(asm) = self.assemblies.remove(&pid) {
                if let Some(packet) = finish_assembly(asm) {
                    out.push(packet);
                }
            }
            if let Some(asm) = start_assembly(kind, payload, random_access, cell) {
                self.assemblies.insert(pid, asm);
            }
        } else if let Some(asm) = self.assemblies.get_mut(&pid) {
            asm.keyframe |= random_access;
            asm.payload.extend_from_slice(payload);
            asm.cells.extend_from_slice(cell);
        }
    }

    fn parse_pat(&mut self, cell: &[u8]) {
        let Some(start) = table_start(cell) else {
            return;
        };
        if start + 12 > TS_CELL {
            return;
        }
        let pmt_pid = ((cell[start + 10] as u16 & 0x1F) << 8) | cell[start + 11] as u16;
        if pmt_pid != 0 && pmt_pid != 0x1FFF && self.pmt_pid != Some(pmt_pid) {
            tracing::debug!(pmt_pid, "found PMT PID in PAT");
            self.pmt_pid = Some(pmt_pid);
        }
    }

    fn parse_pmt(&mut self, cell: &[u8]) {
        let Some(start) = table_start(cell) else {
            return;
        };
        if start + 12 > TS_CELL {
            return;
        }
        let program_info_len = ((cell[start + 10] as usize & 0x0F) << 8) | cell[start + 11] as usize;

        let mut pos = start + 12 + program_info_len;
        while pos + 5 <= TS_CELL {
            let stream_type = cell[pos];
            let elem_pid = ((cell[pos + 1] as u16 & 0x1F) << 8) | cell[pos + 2] as u16;
            let es_info_len = ((cell[pos + 3] as usize & 0x0F) << 8) | cell[pos + 4] as usize;

            let kind = match stream_type {
                STREAM_TYPE_H264 | STREAM_TYPE_HEVC | STREAM_TYPE_MPEG2_VIDEO => {
                    Some(StreamKind::Video)
                }
                STREAM_TYPE_AAC_ADTS
                | STREAM_TYPE_MPEG1_AUDIO
                | STREAM_TYPE_MPEG2_AUDIO
                | STREAM_TYPE_AC3 => Some(StreamKind::Audio),
                _ => None,
            };

            if let Some(kind) = kind {
                let already_mapped = self.pids.values().any(|&k| k == kind);
                if !already_mapped && elem_pid != 0 {
                    tracing::debug!(pid = elem_pid, stream_type, %kind, "detected elementary stream");
                    self.pids.insert(elem_pid, kind);
                }
            }

            pos += 5 + es_info_len;
        }
    }
}

impl Default for TsDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset of the PSI table body, past adaptation and pointer fields.
fn table_start(cell: &[u8]) -> Option<usize> {
    let has_adaptation = (cell[3] & 0x20) != 0;
    let payload_offset = if has_adaptation {
        5 + (cell[4] as usize).min(183)
    } else {
        4
    };
    if payload_offset >= TS_CELL {
        return None;
    }
    let start = if (cell[1] & 0x40) != 0 {
        payload_offset + 1 + cell[payload_offset] as usize
    } else {
        payload_offset
    };
    (start < TS_CELL).then_some(start)
}

fn start_assembly(
    kind: StreamKind,
    payload: &[u8],
    keyframe: bool,
    cell: &[u8],
) -> Option<PesAssembly> {
    if payload.len() < 9 || payload[0] != 0x00 || payload[1] != 0x00 || payload[2] != 0x01 {
        return None;
    }
    let stream_id = payload[3];
    let id_matches = match kind {
        StreamKind::Video => (0xE0..=0xEF).contains(&stream_id),
        // 0xBD is the private stream id used for AC-3
        StreamKind::Audio => (0xC0..=0xDF).contains(&stream_id) || stream_id == 0xBD,
    };
    if !id_matches {
        return None;
    }

    let pts_dts_flags = (payload[7] >> 6) & 0x03;
    let header_len = payload[8] as usize;

    let mut pts = None;
    let mut dts = None;
    if pts_dts_flags >= 2 && payload.len() >= 14 {
        pts = Some(parse_timestamp(&payload[9..14]));
    }
    if pts_dts_flags == 3 && payload.len() >= 19 {
        dts = Some(parse_timestamp(&payload[14..19]));
    }

    let es_start = (9 + header_len).min(payload.len());
    Some(PesAssembly {
        kind,
        pts,
        dts,
        keyframe,
        payload: payload[es_start..].to_vec(),
        cells: cell.to_vec(),
    })
}

fn finish_assembly(asm: PesAssembly) -> Option<Packet> {
    let Some(pts) = asm.pts else {
        tracing::trace!(kind = %asm.kind, "dropping PES packet without PTS");
        return None;
    };
    if asm.payload.is_empty() {
        return None;
    }
    Some(Packet {
        kind: asm.kind,
        pts,
        dts: asm.dts.unwrap_or(pts),
        keyframe: asm.keyframe,
        payload: asm.payload,
        cells: asm.cells,
    })
}

/// Decode a 33-bit PES timestamp from its 5-byte marker encoding.
fn parse_timestamp(data: &[u8]) -> i64 {
    ((data[0] as i64 >> 1) & 0x07) << 30
        | (data[1] as i64) << 22
        | ((data[2] as i64 >> 1) & 0x7F) << 15
        | (data[3] as i64) << 7
        | ((data[4] as i64 >> 1) & 0x7F)
}
