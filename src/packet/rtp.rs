//! RTP header composer/parser, bit-exact per RFC 3550, and the
//! payload-type → sample-spec registry.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::sample_spec::{ChannelLayout, SampleFormat, SampleSpec};

use super::{Packet, PacketFlags, RtpFields};

pub const RTP_VERSION: u8 = 2;
pub const HEADER_LEN: usize = 12;

/// Encodes/decodes an RTP header and carries the payload through
/// untouched. Terminal (innermost) composer in the composer chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtpComposer;

impl RtpComposer {
    /// Bit-exact header encoding per RFC 3550. `payload` is written as-is
    /// immediately after the 12-byte header; no CSRC, extension, or
    /// padding is ever emitted by the composer (those are parser-only
    /// concerns for interoperating with foreign senders).
    pub fn compose(&self, fields: &RtpFields, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());

        let byte0 = (RTP_VERSION << 6) | 0; // P=0, X=0, CC=0
        buf.put_u8(byte0);
        buf.put_u8(((fields.marker as u8) << 7) | (fields.payload_type & 0x7F));
        buf.put_u16(fields.seqnum);
        buf.put_u32(fields.stream_timestamp);
        buf.put_u32(fields.source_id);
        buf.put_slice(payload);

        buf.freeze()
    }

    /// Composes a full `Packet` from fields and a raw payload.
    pub fn compose_packet(&self, fields: RtpFields, payload: &[u8]) -> Packet {
        let wire = self.compose(&fields, payload);
        let payload_bytes = wire.slice(HEADER_LEN..);
        let mut packet = Packet::new(PacketFlags::RTP | PacketFlags::AUDIO | PacketFlags::PREPARED);
        packet.rtp = Some(fields);
        packet.payload = payload_bytes;
        packet.mark_composed(wire);
        packet
    }
}

/// Parses RTP headers, validating version/padding/extension fields per
/// RFC 3550; fails with `BadFormat` on any violation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtpParser;

impl RtpParser {
    pub fn parse(&self, raw: Bytes) -> Result<Packet> {
        if raw.len() < HEADER_LEN {
            return Err(Error::BadFormat("rtp packet shorter than fixed header"));
        }

        let byte0 = raw[0];
        let version = byte0 >> 6;
        if version != RTP_VERSION {
            return Err(Error::BadFormat("unsupported rtp version"));
        }
        let padding = byte0 & 0x20 != 0;
        let extension = byte0 & 0x10 != 0;
        let csrc_count = (byte0 & 0x0F) as usize;

        let byte1 = raw[1];
        let marker = byte1 & 0x80 != 0;
        let payload_type = byte1 & 0x7F;

        let seqnum = u16::from_be_bytes([raw[2], raw[3]]);
        let stream_timestamp = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let source_id = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);

        let mut offset = HEADER_LEN;

        let csrc_bytes = csrc_count * 4;
        if raw.len() < offset + csrc_bytes {
            return Err(Error::BadFormat("truncated csrc list"));
        }
        offset += csrc_bytes;

        if extension {
            if raw.len() < offset + 4 {
                return Err(Error::BadFormat("truncated extension header"));
            }
            let ext_len_words = u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]) as usize;
            offset += 4;
            let ext_bytes = ext_len_words * 4;
            if raw.len() < offset + ext_bytes {
                return Err(Error::BadFormat("truncated extension data"));
            }
            offset += ext_bytes;
        }

        let mut payload_end = raw.len();
        if padding {
            if payload_end <= offset {
                return Err(Error::BadFormat("padding flag set on empty payload"));
            }
            let pad_len = raw[payload_end - 1] as usize;
            if pad_len == 0 || payload_end < offset + pad_len {
                return Err(Error::BadFormat("invalid padding length"));
            }
            payload_end -= pad_len;
        }
        if offset > payload_end {
            return Err(Error::BadFormat("header overruns payload"));
        }

        let fields = RtpFields {
            source_id,
            seqnum,
            stream_timestamp,
            duration: Duration::ZERO, // filled in by the depacketizer from the sample spec
            payload_type,
            marker,
            capture_timestamp: 0, // not carried on the wire; set by caller when known out-of-band
        };

        let mut packet = Packet::new(PacketFlags::RTP | PacketFlags::AUDIO | PacketFlags::PREPARED);
        packet.rtp = Some(fields);
        packet.payload = raw.slice(offset..payload_end);
        packet.mark_composed(raw);
        Ok(packet)
    }
}

/// `payload_type → (sample_spec, flags)`. Populated at session
/// construction; read-only and lock-free thereafter.
#[derive(Debug, Clone)]
pub struct PayloadTypeEntry {
    pub spec: SampleSpec,
    /// True for entries the embedder registered beyond the built-ins.
    pub custom: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PayloadTypeRegistry {
    map: HashMap<u8, PayloadTypeEntry>,
}

/// PT 10: L16 stereo 44.1 kHz.
pub const PT_L16_STEREO: u8 = 10;
/// PT 11: L16 mono 44.1 kHz.
pub const PT_L16_MONO: u8 = 11;

impl PayloadTypeRegistry {
    /// Registry seeded with the two built-in PCM entries, grounded in
    /// `roc_rtp/encoding_map.cpp`'s built-in seeding.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.map.insert(
            PT_L16_STEREO,
            PayloadTypeEntry {
                spec: SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be),
                custom: false,
            },
        );
        registry.map.insert(
            PT_L16_MONO,
            PayloadTypeEntry {
                spec: SampleSpec::new(44_100, ChannelLayout::Mono, SampleFormat::S16Be),
                custom: false,
            },
        );
        registry
    }

    pub fn register(&mut self, payload_type: u8, spec: SampleSpec) -> Result<()> {
        if payload_type > 0x7F {
            return Err(Error::BadConfig("payload type must fit in 7 bits"));
        }
        self.map.insert(payload_type, PayloadTypeEntry { spec, custom: true });
        Ok(())
    }

    pub fn lookup(&self, payload_type: u8) -> Option<&PayloadTypeEntry> {
        self.map.get(&payload_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> RtpFields {
        RtpFields {
            source_id: 0xCAFEBABE,
            seqnum: 12345,
            stream_timestamp: 0xDEADBEEF,
            duration: Duration::from_millis(20),
            payload_type: 10,
            marker: true,
            capture_timestamp: 0,
        }
    }

    #[test]
    fn compose_parse_roundtrip() {
        let fields = sample_fields();
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let wire = RtpComposer.compose(&fields, &payload);

        let packet = RtpParser.parse(wire).unwrap();
        let parsed = packet.rtp.unwrap();

        assert_eq!(parsed.source_id, fields.source_id);
        assert_eq!(parsed.seqnum, fields.seqnum);
        assert_eq!(parsed.stream_timestamp, fields.stream_timestamp);
        assert_eq!(parsed.payload_type, fields.payload_type);
        assert_eq!(parsed.marker, fields.marker);
        assert_eq!(&packet.payload[..], &payload[..]);
    }

    #[test]
    fn rejects_bad_version() {
        let mut wire = RtpComposer.compose(&sample_fields(), &[0u8; 4]).to_vec();
        wire[0] = (1 << 6) | (wire[0] & 0x3F); // version 1
        let err = RtpParser.parse(Bytes::from(wire)).unwrap_err();
        assert_eq!(err, Error::BadFormat("unsupported rtp version"));
    }

    #[test]
    fn builtin_payload_types_resolve() {
        let registry = PayloadTypeRegistry::with_builtins();
        let pt10 = registry.lookup(PT_L16_STEREO).unwrap();
        assert_eq!(pt10.spec.sample_rate, 44_100);
        assert_eq!(pt10.spec.num_channels(), 2);
        let pt11 = registry.lookup(PT_L16_MONO).unwrap();
        assert_eq!(pt11.spec.num_channels(), 1);
        assert!(registry.lookup(200).is_none());
    }
}
