//! FEC payload-ID composer/parser, wrapping an inner composer the way
//! `roc_fec::Composer<PayloadID, Type, Pos>` wraps the RTP composer.
//! Modeled here as a value (scheme + position), not a type parameter.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

use super::rtp::{RtpComposer, RtpParser};
use super::{FecFields, FecIdPosition, FecScheme, Packet, PacketFlags, RtpFields};

/// Size in bytes of the bit-exact FEC payload ID, identical for both
/// schemes: `(esi: u16, sbn: u16, k: u16, n: u16)`.
pub const PAYLOAD_ID_LEN: usize = 8;

fn encode_payload_id(fec: &FecFields) -> [u8; PAYLOAD_ID_LEN] {
    let mut buf = [0u8; PAYLOAD_ID_LEN];
    buf[0..2].copy_from_slice(&fec.encoding_symbol_id.to_be_bytes());
    buf[2..4].copy_from_slice(&fec.source_block_number.to_be_bytes());
    buf[4..6].copy_from_slice(&fec.source_block_length.to_be_bytes());
    buf[6..8].copy_from_slice(&fec.block_length.to_be_bytes());
    buf
}

fn decode_payload_id(bytes: &[u8], scheme: FecScheme, position: FecIdPosition) -> Result<FecFields> {
    if bytes.len() != PAYLOAD_ID_LEN {
        return Err(Error::BadPacket("fec payload id has wrong length"));
    }
    Ok(FecFields {
        scheme,
        position,
        encoding_symbol_id: u16::from_be_bytes([bytes[0], bytes[1]]),
        source_block_number: u16::from_be_bytes([bytes[2], bytes[3]]),
        source_block_length: u16::from_be_bytes([bytes[4], bytes[5]]),
        block_length: u16::from_be_bytes([bytes[6], bytes[7]]),
    })
}

/// Composes a source or repair packet, optionally delegating the inner
/// payload to the RTP composer.
pub struct FecComposer {
    pub scheme: FecScheme,
    pub position: FecIdPosition,
    /// `Some` for source packets (FEC wraps an RTP packet); `None` for
    /// repair packets, whose payload is the raw repair symbol with no
    /// inner RTP header.
    pub inner: Option<RtpComposer>,
}

impl FecComposer {
    pub fn new(scheme: FecScheme, position: FecIdPosition, inner: Option<RtpComposer>) -> Self {
        Self { scheme, position, inner }
    }

    /// Composes a source packet: FEC payload-id wraps an RTP-composed
    /// inner packet.
    pub fn compose_source(&self, fec: FecFields, rtp: RtpFields, payload: &[u8]) -> Result<Packet> {
        let inner = self.inner.as_ref().ok_or(Error::BadConfig("fec source composer missing inner rtp composer"))?;
        let rtp_wire = inner.compose(&rtp, payload);
        let mut packet = self.wrap(fec, &rtp_wire)?;
        packet.rtp = Some(rtp);
        packet.flags |= PacketFlags::AUDIO | PacketFlags::RTP;
        Ok(packet)
    }

    /// Composes a repair packet: FEC payload-id wraps the raw repair
    /// symbol bytes directly, with no inner RTP header.
    pub fn compose_repair(&self, fec: FecFields, repair_payload: &[u8]) -> Result<Packet> {
        let mut packet = self.wrap(fec, repair_payload)?;
        packet.flags |= PacketFlags::REPAIR;
        Ok(packet)
    }

    fn wrap(&self, fec: FecFields, inner_bytes: &[u8]) -> Result<Packet> {
        let id = encode_payload_id(&fec);
        let mut buf = BytesMut::with_capacity(PAYLOAD_ID_LEN + inner_bytes.len());

        let payload_start;
        match self.position {
            FecIdPosition::Header => {
                buf.put_slice(&id);
                payload_start = PAYLOAD_ID_LEN;
                buf.put_slice(inner_bytes);
            }
            FecIdPosition::Footer => {
                payload_start = 0;
                buf.put_slice(inner_bytes);
                buf.put_slice(&id);
            }
        }

        let wire = buf.freeze();
        let mut packet = Packet::new(PacketFlags::FEC | PacketFlags::PREPARED);
        packet.fec = Some(fec);
        packet.payload = wire.slice(payload_start..payload_start + inner_bytes.len());
        packet.fec_symbol = Some(packet.payload.clone());
        packet.mark_composed(wire);
        Ok(packet)
    }
}

/// Parses a source or repair packet's FEC payload id, delegating the
/// remaining bytes to the RTP parser for source packets.
pub struct FecParser {
    pub scheme: FecScheme,
    pub position: FecIdPosition,
    pub inner: Option<RtpParser>,
}

impl FecParser {
    pub fn new(scheme: FecScheme, position: FecIdPosition, inner: Option<RtpParser>) -> Self {
        Self { scheme, position, inner }
    }

    pub fn parse(&self, raw: Bytes) -> Result<Packet> {
        if raw.len() < PAYLOAD_ID_LEN {
            return Err(Error::BadPacket("packet shorter than fec payload id"));
        }

        let (id_bytes, inner_bytes, payload_offset_in_inner) = match self.position {
            FecIdPosition::Header => (raw.slice(0..PAYLOAD_ID_LEN), raw.slice(PAYLOAD_ID_LEN..), 0),
            FecIdPosition::Footer => {
                let split = raw.len() - PAYLOAD_ID_LEN;
                (raw.slice(split..), raw.slice(0..split), 0)
            }
        };
        let _ = payload_offset_in_inner;

        let fec = decode_payload_id(&id_bytes, self.scheme, self.position)?;

        let mut packet = if let Some(rtp_parser) = &self.inner {
            // `parse` strips the RTP header out of `payload` (it keeps
            // just the audio payload there); `inner_bytes` itself is
            // still the exact bytes the encoder protected, so stash it
            // separately before handing ownership to the RTP parser.
            let symbol = inner_bytes.clone();
            let mut inner_packet = rtp_parser.parse(inner_bytes)?;
            inner_packet.flags |= PacketFlags::FEC;
            inner_packet.fec_symbol = Some(symbol);
            inner_packet
        } else {
            let mut p = Packet::new(PacketFlags::FEC | PacketFlags::REPAIR | PacketFlags::PREPARED);
            p.payload = inner_bytes.clone();
            p.fec_symbol = Some(inner_bytes.clone());
            p.mark_composed(inner_bytes);
            p
        };
        packet.fec = Some(fec);
        Ok(packet)
    }
}
