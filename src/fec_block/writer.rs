//! FEC block writer (C6): accumulates K source packets, produces M
//! repair packets per block.

use crate::codec::{self, BlockEncoder};
use crate::error::Result;
use crate::packet::fec::FecComposer;
use crate::packet::rtp::RtpComposer;
use crate::packet::{FecFields, Packet, RtpFields};

pub struct FecBlockWriter {
    composer: FecComposer,
    rtp_composer: RtpComposer,
    encoder: Box<dyn BlockEncoder>,
    k: usize,
    m: usize,
    block_number: u16,
    symbol_len: Option<usize>,
    collected: usize,
}

impl FecBlockWriter {
    pub fn new(composer: FecComposer, k: usize, m: usize) -> Self {
        let encoder = codec::new_encoder(composer.scheme);
        Self {
            composer,
            rtp_composer: RtpComposer,
            encoder,
            k,
            m,
            block_number: 0,
            symbol_len: None,
            collected: 0,
        }
    }

    /// Writes one RTP-composed source packet's fields and payload.
    /// Returns the composed source packet, plus — once `k` packets have
    /// been collected — the `m` repair packets that complete the block.
    pub fn write(&mut self, rtp: RtpFields, payload: &[u8]) -> Result<Vec<Packet>> {
        // The protected symbol is the full inner RTP wire (header +
        // payload): recovering it via the codec recovers the entire
        // source packet, not just its audio payload.
        let rtp_wire = self.rtp_composer.compose(&rtp, payload);

        if self.collected == 0 {
            self.symbol_len = Some(rtp_wire.len());
            self.encoder.begin_block(self.k, self.m, rtp_wire.len())?;
        }
        let symbol_len = self.symbol_len.expect("begin_block ran above on first packet of block");
        if rtp_wire.len() != symbol_len {
            return Err(crate::error::Error::BadConfig(
                "fec block writer requires equal-length source packets within a block",
            ));
        }

        let index = self.collected;
        self.encoder.set_buffer(index, &rtp_wire)?;

        let fec = FecFields {
            scheme: self.composer.scheme,
            position: self.composer.position,
            encoding_symbol_id: index as u16,
            source_block_number: self.block_number,
            source_block_length: self.k as u16,
            block_length: (self.k + self.m) as u16,
        };
        let source_packet = self.composer.compose_source(fec, rtp, payload)?;
        self.collected += 1;

        let mut out = vec![source_packet];

        if self.collected == self.k {
            self.encoder.fill_buffers()?;
            for i in 0..self.m {
                let repair_symbol = self.encoder.repair_buffer(i)?.to_vec();
                let fec = FecFields {
                    scheme: self.composer.scheme,
                    position: self.composer.position,
                    encoding_symbol_id: (self.k + i) as u16,
                    source_block_number: self.block_number,
                    source_block_length: self.k as u16,
                    block_length: (self.k + self.m) as u16,
                };
                out.push(self.composer.compose_repair(fec, &repair_symbol)?);
            }
            self.encoder.end_block();
            self.block_number = self.block_number.wrapping_add(1);
            self.collected = 0;
            self.symbol_len = None;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FecIdPosition, FecScheme, PacketFlags};
    use std::time::Duration;

    fn rtp_fields(seqnum: u16) -> RtpFields {
        RtpFields {
            source_id: 7,
            seqnum,
            stream_timestamp: seqnum as u32 * 320,
            duration: Duration::from_millis(10),
            payload_type: 10,
            marker: false,
            capture_timestamp: 0,
        }
    }

    #[test]
    fn emits_k_source_then_m_repair_packets_sharing_block_number() {
        let composer = FecComposer::new(FecScheme::ReedSolomon8, FecIdPosition::Header, Some(RtpComposer));
        let mut writer = FecBlockWriter::new(composer, 4, 2);

        let mut emitted = Vec::new();
        for i in 0..4u16 {
            let payload = [i as u8; 16];
            emitted.extend(writer.write(rtp_fields(i), &payload).unwrap());
        }

        assert_eq!(emitted.len(), 6);
        for (i, p) in emitted.iter().enumerate() {
            let fec = p.fec.unwrap();
            assert_eq!(fec.source_block_number, 0);
            assert_eq!(fec.encoding_symbol_id, i as u16);
            assert_eq!(fec.source_block_length, 4);
            assert_eq!(fec.block_length, 6);
        }
        assert!(emitted[5].flags.contains(PacketFlags::REPAIR));
    }

    #[test]
    fn second_block_starts_at_zero_and_increments_block_number() {
        let composer = FecComposer::new(FecScheme::ReedSolomon8, FecIdPosition::Header, Some(RtpComposer));
        let mut writer = FecBlockWriter::new(composer, 2, 1);

        for i in 0..2u16 {
            writer.write(rtp_fields(i), &[1u8; 8]).unwrap();
        }
        let second = writer.write(rtp_fields(2), &[1u8; 8]).unwrap();
        assert_eq!(second[0].fec.unwrap().source_block_number, 1);
        assert_eq!(second[0].fec.unwrap().encoding_symbol_id, 0);
    }
}
