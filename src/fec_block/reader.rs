//! FEC block reader (C7): aligns incoming source+repair packets into
//! blocks and requests repair on loss.

use tracing::{debug, warn};

use crate::codec::{self, BlockDecoder};
use crate::error::{Error, Result};
use crate::packet::rtp::RtpParser;
use crate::packet::{FecFields, FecIdPosition, FecScheme, Packet, PacketFlags};

/// `(b - a)` as a signed 16-bit wraparound delta, same convention as
/// `RtpFields::seqnum_diff`, applied to FEC block numbers.
fn block_diff(a: u16, b: u16) -> i32 {
    (b.wrapping_sub(a) as i16) as i32
}

pub struct FecBlockReader {
    rtp_parser: RtpParser,
    decoder: Box<dyn BlockDecoder>,
    scheme: FecScheme,
    current_block: Option<u16>,
    /// Number of the most recently finalized block, so a late-arriving
    /// symbol for it (e.g. a trailing repair packet received after the
    /// block already emitted everything) is dropped as stale instead of
    /// spuriously reopening it.
    last_completed_block: Option<u16>,
    block_started: bool,
    k: usize,
    m: usize,
    /// Source slots `[0, k)`; `None` until received or recovered.
    source_slots: Vec<Option<Packet>>,
    emitted_upto: usize,

    pub lost_total: u64,
    pub repaired_total: u64,
    pub duplicate_total: u64,
}

impl FecBlockReader {
    pub fn new(scheme: FecScheme) -> Self {
        Self {
            rtp_parser: RtpParser,
            decoder: codec::new_decoder(scheme),
            scheme,
            current_block: None,
            last_completed_block: None,
            block_started: false,
            k: 0,
            m: 0,
            source_slots: Vec::new(),
            emitted_upto: 0,
            lost_total: 0,
            repaired_total: 0,
            duplicate_total: 0,
        }
    }

    /// Feeds one parsed source or repair packet. Returns source packets
    /// that can now be emitted, in non-decreasing
    /// `(block_number, encoding_symbol_id)` order.
    pub fn push(&mut self, packet: Packet) -> Result<Vec<Packet>> {
        let fec = match packet.fec {
            Some(f) => f,
            None => {
                debug!("fec block reader: packet has no fec fields, dropping");
                return Ok(Vec::new());
            }
        };

        match self.current_block {
            None => {
                if let Some(last) = self.last_completed_block {
                    if block_diff(last, fec.source_block_number) <= 0 {
                        debug!(
                            block = fec.source_block_number,
                            "fec block reader: dropping late packet for an already-finalized block"
                        );
                        return Ok(Vec::new());
                    }
                }
                self.start_block(fec);
                self.place_and_emit(packet, fec)
            }
            Some(current) => {
                let diff = block_diff(current, fec.source_block_number);
                if diff > 0 {
                    // A packet from a newer block arrived before this one
                    // finished: finalize now (bounded lookahead of zero
                    // packets — see DESIGN.md's open-question decision).
                    let mut out = self.finalize_block();
                    self.start_block(fec);
                    out.extend(self.place_and_emit(packet, fec)?);
                    Ok(out)
                } else if diff < 0 {
                    debug!(block = fec.source_block_number, "fec block reader: dropping packet for stale block");
                    Ok(Vec::new())
                } else {
                    self.place_and_emit(packet, fec)
                }
            }
        }
    }

    /// Call when no more packets are expected for the current block
    /// (e.g. session teardown); flushes whatever can still be emitted.
    pub fn flush(&mut self) -> Vec<Packet> {
        if self.current_block.is_none() {
            return Vec::new();
        }
        self.finalize_block()
    }

    fn start_block(&mut self, fec: FecFields) {
        self.current_block = Some(fec.source_block_number);
        self.block_started = false;
        self.k = fec.source_block_length as usize;
        self.m = (fec.block_length - fec.source_block_length) as usize;
        self.source_slots = vec![None; self.k];
        self.emitted_upto = 0;
    }

    fn place_and_emit(&mut self, packet: Packet, fec: FecFields) -> Result<Vec<Packet>> {
        let esi = fec.encoding_symbol_id as usize;
        let n = self.k + self.m;
        if esi >= n {
            debug!(esi, n, "fec block reader: encoding_symbol_id out of range, dropping");
            return Ok(Vec::new());
        }
        if esi < self.k && self.source_slots[esi].is_some() {
            self.duplicate_total += 1;
            debug!(esi, "fec block reader: duplicate source symbol in block, dropping");
            return Ok(Vec::new());
        }

        // The decoder must see exactly the bytes the writer's encoder
        // protected — the inner RTP wire for source packets, the raw
        // repair symbol for repair packets — never the full composed
        // wire, which also carries this packet's own FEC payload id and
        // would break the parity relation between symbols (each
        // packet's id differs by `encoding_symbol_id`). `fec_symbol` is
        // set to exactly that protected symbol by both `FecComposer`
        // and `FecParser`, so this doesn't depend on which of the two
        // produced `packet` (see `packet/mod.rs`'s `fec_symbol` field).
        let symbol = packet.fec_symbol.clone().ok_or(Error::BadPacket("fec packet missing protected symbol"))?;
        if !self.block_started {
            self.decoder.begin_block(self.k, self.m, symbol.len())?;
            self.block_started = true;
        }
        let received_before = self.decoder.num_received();
        self.decoder.set_buffer(esi, &symbol)?;
        if self.decoder.num_received() == received_before {
            // The decoder already had this slot (e.g. a duplicate repair
            // symbol); its set_buffer is a documented no-op in that case.
            self.duplicate_total += 1;
            return Ok(Vec::new());
        }

        if esi < self.k {
            self.source_slots[esi] = Some(packet);
        }

        self.try_emit()
    }

    fn try_emit(&mut self) -> Result<Vec<Packet>> {
        let mut out = Vec::new();
        while self.emitted_upto < self.k {
            if let Some(p) = self.source_slots[self.emitted_upto].take() {
                out.push(p);
                self.emitted_upto += 1;
                continue;
            }

            match self.decoder.repair(self.emitted_upto)? {
                Some(recovered) => {
                    out.push(self.recovered_packet(self.emitted_upto, recovered));
                    self.emitted_upto += 1;
                }
                None => break,
            }
        }

        if self.emitted_upto == self.k {
            self.decoder.end_block();
            self.last_completed_block = self.current_block;
            self.current_block = None;
        }

        Ok(out)
    }

    fn recovered_packet(&mut self, index: usize, recovered_wire: Vec<u8>) -> Packet {
        match self.rtp_parser.parse(bytes::Bytes::from(recovered_wire)) {
            Ok(mut packet) => {
                self.repaired_total += 1;
                packet.fec = Some(FecFields {
                    scheme: self.scheme,
                    position: FecIdPosition::Header,
                    encoding_symbol_id: index as u16,
                    source_block_number: self.current_block.unwrap_or(0),
                    source_block_length: self.k as u16,
                    block_length: (self.k + self.m) as u16,
                });
                packet.flags |= PacketFlags::REPAIR;
                packet
            }
            Err(err) => {
                // The codec claimed recovery but the recovered bytes don't
                // parse as RTP; treat as an unrecoverable loss instead of
                // propagating a malformed packet downstream.
                warn!(%err, index, "fec block reader: recovered symbol failed to parse as rtp");
                self.lost_total += 1;
                let mut packet = Packet::new(PacketFlags::FEC | PacketFlags::REPAIR);
                packet.fec = Some(FecFields {
                    scheme: self.scheme,
                    position: FecIdPosition::Header,
                    encoding_symbol_id: index as u16,
                    source_block_number: self.current_block.unwrap_or(0),
                    source_block_length: self.k as u16,
                    block_length: (self.k + self.m) as u16,
                });
                packet
            }
        }
    }

    fn finalize_block(&mut self) -> Vec<Packet> {
        let mut out = Vec::new();
        while self.emitted_upto < self.k {
            if let Some(p) = self.source_slots[self.emitted_upto].take() {
                out.push(p);
                self.emitted_upto += 1;
                continue;
            }
            if let Ok(Some(recovered)) = self.decoder.repair(self.emitted_upto) {
                out.push(self.recovered_packet(self.emitted_upto, recovered));
                self.emitted_upto += 1;
                continue;
            }
            self.lost_total += 1;
            warn!(esi = self.emitted_upto, block = ?self.current_block, "fec block reader: source slot unrecoverable, treating as loss");
            self.emitted_upto += 1;
        }
        self.decoder.end_block();
        self.last_completed_block = self.current_block;
        self.current_block = None;
        out
    }
}
