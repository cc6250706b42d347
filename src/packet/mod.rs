//! Packet model: a tagged union over a byte slice owned by a pool (C2).

pub mod fec;
pub mod rtp;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

/// Combinable packet tags. A single packet can be e.g. `RTP | Audio` or
/// `RTP | FEC | Repair`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    pub const AUDIO: Self = Self(1 << 0);
    pub const REPAIR: Self = Self(1 << 1);
    pub const FEC: Self = Self(1 << 2);
    pub const CONTROL: Self = Self(1 << 3);
    pub const UDP: Self = Self(1 << 4);
    pub const PREPARED: Self = Self(1 << 5);
    pub const RTP: Self = Self(1 << 6);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// RTP sub-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpFields {
    pub source_id: u32,
    pub seqnum: u16,
    pub stream_timestamp: u32,
    pub duration: Duration,
    pub payload_type: u8,
    pub marker: bool,
    pub capture_timestamp: i64,
}

impl RtpFields {
    /// `(b - a)` interpreted as a signed 16-bit wraparound delta; the
    /// smaller-magnitude side of the wrap wins.
    pub fn seqnum_diff(a: u16, b: u16) -> i32 {
        (b.wrapping_sub(a) as i16) as i32
    }

    /// Same wraparound convention for the 32-bit stream timestamp.
    pub fn stream_timestamp_diff(a: u32, b: u32) -> i64 {
        (b.wrapping_sub(a) as i32) as i64
    }
}

/// Bit-exact FEC payload-ID placement: prefix (header) or suffix
/// (footer) of the inner payload, per scheme configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecIdPosition {
    Header,
    Footer,
}

/// Which erasure-coding scheme produced/consumes a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FecScheme {
    ReedSolomon8,
    LdpcStaircase,
}

/// FEC sub-record: shared bit-exact layout for both schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecFields {
    pub scheme: FecScheme,
    pub position: FecIdPosition,
    pub encoding_symbol_id: u16,
    pub source_block_number: u16,
    pub source_block_length: u16,
    pub block_length: u16,
}

/// UDP sub-record.
#[derive(Debug, Clone, Copy)]
pub struct UdpFields {
    pub src_addr: SocketAddr,
    pub dst_addr: SocketAddr,
    /// Monotonic nanoseconds at which the datagram was queued/received.
    pub queue_timestamp_ns: u64,
}

/// A composed (or being-composed) packet: tagged union over a shared
/// byte slice. `prepare()` must run before any field mutation; once
/// `compose()` has produced bytes, the packet is immutable.
#[derive(Debug, Clone)]
pub struct Packet {
    pub flags: PacketFlags,
    pub rtp: Option<RtpFields>,
    pub fec: Option<FecFields>,
    pub udp: Option<UdpFields>,
    /// The payload this packet carries; for an RTP packet this is the
    /// encoded audio payload; for an RTCP/control packet this is the
    /// whole report body.
    pub payload: Bytes,
    /// For an FEC source or repair packet, the exact bytes the block
    /// codec protects/protected: the inner RTP wire (header + payload)
    /// for a source packet, the raw repair symbol for a repair packet.
    /// Set by both `FecComposer::wrap` (fresh composition) and
    /// `FecParser::parse` (post-wire parse), so a `BlockDecoder` always
    /// gets the same bytes the encoder consumed regardless of which
    /// side produced the packet — `payload`/`wire_bytes()` alone differ
    /// between those two paths (parsing strips the RTP header into
    /// `rtp`, stripping it out of `payload` too; a freshly composed
    /// packet hasn't gone through that split yet).
    pub fec_symbol: Option<Bytes>,
    /// Set once `compose()` finalizes wire bytes; `None` while the
    /// packet is still mutable in the composer.
    composed: Option<Bytes>,
}

impl Packet {
    pub fn new(flags: PacketFlags) -> Self {
        Self {
            flags,
            rtp: None,
            fec: None,
            udp: None,
            payload: Bytes::new(),
            fec_symbol: None,
            composed: None,
        }
    }

    pub fn is_composed(&self) -> bool {
        self.composed.is_some()
    }

    pub fn mark_composed(&mut self, wire_bytes: Bytes) {
        self.composed = Some(wire_bytes);
    }

    /// The full on-wire byte representation, once composed.
    pub fn wire_bytes(&self) -> Option<&Bytes> {
        self.composed.as_ref()
    }
}
