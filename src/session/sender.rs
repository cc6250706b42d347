//! Sender pipeline chain (C18): frames → packetizer(+RTP compose+
//! sequencer) → FEC block writer → interleaver → router → transport,
//! with a parallel RTCP path built from the packetizer's metrics and
//! the timestamp mapper (spec §2's sender data flow).

use crate::config::FecConfig;
use crate::error::{Error, Result};
use crate::interleaver::Interleaver;
use crate::packet::fec::FecComposer;
use crate::packet::rtp::RtpComposer;
use crate::packet::{FecIdPosition, Packet, RtpFields};
use crate::packetizer::Packetizer;
use crate::router::{FrameWriter, OutboundRouter};
use crate::rtcp::SenderReport;
use crate::sample_spec::{Frame, SampleSpec};
use crate::sequencer::Sequencer;
use crate::timestamp_mapper::TimestampMapper;

use super::SessionStatus;

struct FecPipeline {
    writer: crate::fec_block::FecBlockWriter,
    interleaver: Interleaver,
}

/// Builds and drives the sender-side DAG described in spec §2/§4.16.
/// Implements `FrameWriter` so a `FrameFanout` (C17) can replicate
/// frames to many of these at once.
pub struct SenderSession {
    spec: SampleSpec,
    packetizer: Packetizer,
    fec: Option<FecPipeline>,
    router: OutboundRouter,
    timestamp_mapper: TimestampMapper,
    status: SessionStatus,
}

impl SenderSession {
    /// `interleaver_seed` is a construction-time value, not drawn from
    /// the RNG, so that sender/receiver integration tests can assert
    /// on a specific release order.
    pub fn new(
        spec: SampleSpec,
        payload_type: u8,
        samples_per_packet: usize,
        fec_config: Option<FecConfig>,
        interleaver_seed: u64,
        router: OutboundRouter,
    ) -> Result<Self> {
        let sequencer = Sequencer::new(payload_type)?;
        let packetizer = Packetizer::new(spec, samples_per_packet, sequencer);

        let fec = match fec_config {
            Some(cfg) => {
                let composer = FecComposer::new(cfg.scheme, FecIdPosition::Header, Some(RtpComposer));
                let writer = crate::fec_block::FecBlockWriter::new(composer, cfg.k, cfg.m);
                let window = cfg.interleaver_window.max(1);
                let interleaver = Interleaver::new(window, interleaver_seed);
                Some(FecPipeline { writer, interleaver })
            }
            None => None,
        };

        Ok(Self {
            spec,
            packetizer,
            fec,
            router,
            timestamp_mapper: TimestampMapper::new(spec),
            status: SessionStatus::Active,
        })
    }

    pub fn ssrc(&self) -> u32 {
        self.packetizer.ssrc()
    }

    pub fn cname(&self) -> &str {
        self.packetizer.cname()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Flushes any partial packet (padded with silence) and drains the
    /// interleaver, for symmetric teardown (spec §4.16).
    pub fn flush(&mut self) -> Result<()> {
        match self.packetizer.flush_raw() {
            Ok((rtp, payload)) => self.emit(rtp, payload)?,
            Err(Error::NoData) => {}
            Err(err) => return Err(err),
        }
        if let Some(fec) = &mut self.fec {
            for packet in fec.interleaver.flush() {
                self.router.route(packet)?;
            }
        }
        Ok(())
    }

    /// A consistent snapshot of this stream's metrics, for RTCP sender
    /// report generation (spec §5's "single `query_send_stream(now)`
    /// call" ordering guarantee).
    pub fn query_send_stream(&self, now_ns: i64) -> SenderReport {
        SenderReport {
            ssrc: self.ssrc(),
            ntp_timestamp: ns_to_ntp(now_ns),
            rtp_timestamp: self.timestamp_mapper.map(now_ns).unwrap_or(0) as u32,
            packet_count: self.packetizer.metrics.encoded_packets as u32,
            octet_count: self.packetizer.metrics.payload_bytes as u32,
        }
    }

    fn write_frame_inner(&mut self, frame: &Frame) -> Result<()> {
        for (rtp, payload) in self.packetizer.write_raw(frame) {
            self.emit(rtp, payload)?;
        }
        Ok(())
    }

    fn emit(&mut self, rtp: RtpFields, payload: Vec<u8>) -> Result<()> {
        self.timestamp_mapper.write(rtp.capture_timestamp, rtp.stream_timestamp as u64);

        let composed: Vec<Packet> = match &mut self.fec {
            Some(fec) => fec.writer.write(rtp, &payload)?,
            None => vec![RtpComposer.compose_packet(rtp, &payload)],
        };

        for packet in composed {
            let to_route: Vec<Packet> = match &mut self.fec {
                Some(fec) => fec.interleaver.write(packet),
                None => vec![packet],
            };
            for packet in to_route {
                self.router.route(packet)?;
            }
        }
        Ok(())
    }
}

impl FrameWriter for SenderSession {
    /// Per spec §4.16 tier 2: any stage failure converts to a terminal
    /// session status; the session remembers it and returns
    /// `Error::Finish` so the caller's fanout unlinks it.
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if let SessionStatus::Terminated(err) = &self.status {
            return Err(err.clone());
        }
        match self.write_frame_inner(frame) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.status = SessionStatus::Terminated(err.clone());
                Err(Error::Finish)
            }
        }
    }
}

/// Unix nanoseconds to NTP 32.32 fixed-point seconds since 1900-01-01,
/// per RFC 3550 §4's epoch (70 years, 17 of them leap, ahead of Unix).
const NTP_UNIX_EPOCH_DELTA_SECS: u64 = 2_208_988_800;

fn ns_to_ntp(unix_ns: i64) -> u64 {
    let unix_ns = unix_ns.max(0) as u64;
    let secs = unix_ns / 1_000_000_000 + NTP_UNIX_EPOCH_DELTA_SECS;
    let frac_ns = unix_ns % 1_000_000_000;
    let frac = (frac_ns << 32) / 1_000_000_000;
    (secs << 32) | frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::packet::{FecScheme, PacketFlags};
    use crate::router::PacketSink;
    use crate::sample_spec::{ChannelLayout, SampleFormat};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn spec() -> SampleSpec {
        SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be)
    }

    struct RecordingSink {
        received: Rc<RefCell<Vec<Packet>>>,
    }

    impl PacketSink for RecordingSink {
        fn write(&self, packet: Packet) -> Result<()> {
            self.received.borrow_mut().push(packet);
            Ok(())
        }
    }

    fn frame(samples_per_chan: usize, value: f32) -> Frame {
        let channels = spec().num_channels();
        Frame {
            samples: vec![value; samples_per_chan * channels],
            spec: spec(),
            stream_timestamp: 0,
            capture_timestamp: 1,
            flags: crate::sample_spec::CompletenessFlags::SIGNAL_PRESENT,
        }
    }

    #[test]
    fn without_fec_every_packet_goes_to_the_single_route() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut router = OutboundRouter::new();
        router.add_route(PacketFlags::RTP, Box::new(RecordingSink { received: log.clone() }));

        let mut session = SenderSession::new(spec(), 10, 4, None, 1, router).unwrap();
        session.write_frame(&frame(4, 0.1)).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn with_fec_source_and_repair_land_on_different_routes() {
        let source_log = Rc::new(RefCell::new(Vec::new()));
        let repair_log = Rc::new(RefCell::new(Vec::new()));
        let mut router = OutboundRouter::new();
        router.add_route(PacketFlags::REPAIR, Box::new(RecordingSink { received: repair_log.clone() }));
        router.add_route(PacketFlags::AUDIO, Box::new(RecordingSink { received: source_log.clone() }));

        let fec = FecConfig { scheme: FecScheme::ReedSolomon8, k: 2, m: 1, interleaver_window: 1 };
        let mut session = SenderSession::new(spec(), 10, 4, Some(fec), 7, router).unwrap();
        for _ in 0..2 {
            session.write_frame(&frame(4, 0.2)).unwrap();
        }

        assert_eq!(source_log.borrow().len(), 2);
        assert_eq!(repair_log.borrow().len(), 1);
    }

    #[test]
    fn query_send_stream_reflects_packetizer_metrics() {
        let mut router = OutboundRouter::new();
        router.add_route(PacketFlags::RTP, Box::new(RecordingSink { received: Rc::new(RefCell::new(Vec::new())) }));
        let mut session = SenderSession::new(spec(), 10, 4, None, 1, router).unwrap();
        session.write_frame(&frame(4, 0.3)).unwrap();

        let report = session.query_send_stream(2_000_000_000);
        assert_eq!(report.ssrc, session.ssrc());
        assert_eq!(report.packet_count, 1);
        assert!(report.octet_count > 0);
    }

    #[test]
    fn terminal_failure_is_remembered_and_never_retried() {
        struct FailingSink;
        impl PacketSink for FailingSink {
            fn write(&self, _packet: Packet) -> Result<()> {
                Err(Error::Finish)
            }
        }
        let mut router = OutboundRouter::new();
        router.add_route(PacketFlags::RTP, Box::new(FailingSink));
        let mut session = SenderSession::new(spec(), 10, 4, None, 1, router).unwrap();

        let err1 = session.write_frame(&frame(4, 0.0)).unwrap_err();
        assert_eq!(err1, Error::Finish);
        let err2 = session.write_frame(&frame(4, 0.0)).unwrap_err();
        assert_eq!(err2, Error::Finish);
        assert!(matches!(session.status(), SessionStatus::Terminated(_)));
    }
}
