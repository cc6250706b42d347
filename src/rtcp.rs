//! RTCP (ambient control-plane companion to the data plane): the sender/receiver report
//! fields the core data plane actually consumes — the SR's NTP/RTP
//! timestamp pair (feeds the timestamp mapper) and the RR's cumulative
//! lost count, extended highest sequence number, and interarrival
//! jitter (feeds the frequency estimator). Encodes/decodes the real
//! RFC 3550 §6.4 SR/RR packet layout; does not model BYE/SDES/APP.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};

const RTP_VERSION: u8 = 2;
const PT_SENDER_REPORT: u8 = 200;
const PT_RECEIVER_REPORT: u8 = 201;

/// Minimal sender report: the fields needed to map wall-clock time to
/// stream timestamps on the receiving end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    /// NTP timestamp, 32.32 fixed point, seconds since 1900-01-01.
    pub ntp_timestamp: u64,
    /// RTP stream timestamp corresponding to `ntp_timestamp`.
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    /// 28-byte SR body (7 header-free words) with an empty report
    /// block list; the core never generates per-peer reception blocks
    /// on the sender side.
    pub fn encode(&self) -> [u8; 28] {
        let mut buf = [0u8; 28];
        buf[0] = (RTP_VERSION << 6) | 0; // reception report count = 0
        buf[1] = PT_SENDER_REPORT;
        BigEndian::write_u16(&mut buf[2..4], 6); // length in 32-bit words minus one
        BigEndian::write_u32(&mut buf[4..8], self.ssrc);
        BigEndian::write_u64(&mut buf[8..16], self.ntp_timestamp);
        BigEndian::write_u32(&mut buf[16..20], self.rtp_timestamp);
        BigEndian::write_u32(&mut buf[20..24], self.packet_count);
        BigEndian::write_u32(&mut buf[24..28], self.octet_count);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 28 {
            return Err(Error::BadFormat("sender report shorter than 28 bytes"));
        }
        if data[0] >> 6 != RTP_VERSION {
            return Err(Error::BadFormat("unsupported RTCP version"));
        }
        if data[1] != PT_SENDER_REPORT {
            return Err(Error::BadFormat("not a sender report packet type"));
        }
        Ok(Self {
            ssrc: BigEndian::read_u32(&data[4..8]),
            ntp_timestamp: BigEndian::read_u64(&data[8..16]),
            rtp_timestamp: BigEndian::read_u32(&data[16..20]),
            packet_count: BigEndian::read_u32(&data[20..24]),
            octet_count: BigEndian::read_u32(&data[24..28]),
        })
    }
}

/// Minimal receiver report: the single reception-report-block fields
/// the frequency estimator and loss accounting need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverReport {
    pub ssrc: u32,
    /// SSRC of the source being reported on.
    pub source_ssrc: u32,
    pub fraction_lost: u8,
    /// Signed 24-bit cumulative count, sign-extended into an i32.
    pub cumulative_lost: i32,
    pub extended_highest_seqnum: u32,
    pub interarrival_jitter: u32,
}

impl ReceiverReport {
    /// 32-byte RR body: 8-byte common header plus one 24-byte
    /// reception report block.
    pub fn encode(&self) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[0] = (RTP_VERSION << 6) | 1; // one reception report block
        buf[1] = PT_RECEIVER_REPORT;
        BigEndian::write_u16(&mut buf[2..4], 7); // length in 32-bit words minus one
        BigEndian::write_u32(&mut buf[4..8], self.ssrc);

        BigEndian::write_u32(&mut buf[8..12], self.source_ssrc);
        buf[12] = self.fraction_lost;
        let cumulative_bytes = self.cumulative_lost.to_be_bytes();
        buf[13..16].copy_from_slice(&cumulative_bytes[1..4]);
        BigEndian::write_u32(&mut buf[16..20], self.extended_highest_seqnum);
        BigEndian::write_u32(&mut buf[20..24], self.interarrival_jitter);
        // Bytes 24..32 (last SR timestamp + delay since last SR) are
        // left zero: the core never schedules RTT estimation off them.
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 32 {
            return Err(Error::BadFormat("receiver report shorter than 32 bytes"));
        }
        if data[0] >> 6 != RTP_VERSION {
            return Err(Error::BadFormat("unsupported RTCP version"));
        }
        if data[1] != PT_RECEIVER_REPORT {
            return Err(Error::BadFormat("not a receiver report packet type"));
        }
        if data[0] & 0x1F == 0 {
            return Err(Error::BadFormat("receiver report carries no reception block"));
        }

        let mut cumulative_bytes = [0u8; 4];
        cumulative_bytes[1..4].copy_from_slice(&data[13..16]);
        if cumulative_bytes[1] & 0x80 != 0 {
            cumulative_bytes[0] = 0xFF;
        }

        Ok(Self {
            ssrc: BigEndian::read_u32(&data[4..8]),
            source_ssrc: BigEndian::read_u32(&data[8..12]),
            fraction_lost: data[12],
            cumulative_lost: i32::from_be_bytes(cumulative_bytes),
            extended_highest_seqnum: BigEndian::read_u32(&data[16..20]),
            interarrival_jitter: BigEndian::read_u32(&data[20..24]),
        })
    }
}
