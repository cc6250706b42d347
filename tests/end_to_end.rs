//! End-to-end scenarios exercising the sender pipeline, transport, and
//! receiver pipeline together (spec.md §8): lossless round-trip, FEC
//! recovery of a dropped packet, reordering within a block, an SSRC
//! change mid-stream, watchdog expiry, and the frequency estimator's
//! response to queue-depth drift.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use auristream::config::{FecConfig, SessionConfig};
use auristream::error::{Error, Result};
use auristream::packet::rtp::{RtpComposer, PT_L16_STEREO};
use auristream::packet::{FecScheme, Packet, PacketFlags, RtpFields};
use auristream::router::{FrameWriter, OutboundRouter, PacketSink};
use auristream::sample_spec::{ChannelLayout, CompletenessFlags, Frame, SampleFormat, SampleSpec};
use auristream::session::{ReceiverSession, SenderSession, SessionStatus};

fn stereo_spec() -> SampleSpec {
    SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be)
}

fn frame(spec: SampleSpec, samples_per_chan: usize, value: f32, stream_timestamp: u64) -> Frame {
    let channels = spec.num_channels();
    Frame {
        samples: vec![value; samples_per_chan * channels],
        spec,
        stream_timestamp,
        capture_timestamp: stream_timestamp as i64,
        flags: CompletenessFlags::SIGNAL_PRESENT,
    }
}

/// Collects every packet routed to it, in order, for later replay into
/// a `ReceiverSession`. `Rc<RefCell<..>>` is legal here because
/// `PacketSink` is not `Send + Sync` (sessions are single-threaded).
#[derive(Clone, Default)]
struct RecordingSink {
    received: Rc<RefCell<Vec<Packet>>>,
}

impl PacketSink for RecordingSink {
    fn write(&self, packet: Packet) -> Result<()> {
        self.received.borrow_mut().push(packet);
        Ok(())
    }
}

/// A one-route router that only ever sees plain RTP packets (no FEC).
fn rtp_only_router() -> (OutboundRouter, RecordingSink) {
    let sink = RecordingSink::default();
    let mut router = OutboundRouter::new();
    router.add_route(PacketFlags::RTP, Box::new(sink.clone()));
    (router, sink)
}

/// A two-route router splitting FEC source traffic from repair traffic,
/// matching the demo binaries' port-per-flow convention.
fn fec_router() -> (OutboundRouter, RecordingSink, RecordingSink) {
    let source_sink = RecordingSink::default();
    let repair_sink = RecordingSink::default();
    let mut router = OutboundRouter::new();
    router.add_route(PacketFlags::REPAIR, Box::new(repair_sink.clone()));
    router.add_route(PacketFlags::AUDIO, Box::new(source_sink.clone()));
    (router, source_sink, repair_sink)
}

fn wire_of(packet: &Packet) -> bytes::Bytes {
    packet.wire_bytes().cloned().expect("sender always composes its packets before routing")
}

/// Scenario 1: a lossless stream round-trips through RTP composition,
/// parsing, and playback with no FEC in play. Configures the receiver's
/// delayer/estimator with zero latency and a zero queue target so each
/// packet is pushed and immediately read back (no compounding backlog
/// that would pull the resampler off a unity ratio), isolating the
/// round-trip from jitter-buffer/frequency-estimator effects.
#[test]
fn lossless_round_trip_preserves_every_packet() {
    let spec = stereo_spec();
    let samples_per_packet = 640;
    let (router, sink) = rtp_only_router();

    let mut sender = SenderSession::new(spec, PT_L16_STEREO, samples_per_packet, None, 1, router).unwrap();

    let receiver_config =
        SessionConfig { fec: None, latency: 0, aim_queue_size: 0, ..SessionConfig::default() };
    let start = Instant::now();
    let mut receiver = ReceiverSession::new(&receiver_config, spec, start);

    let mut expected_values = Vec::new();
    for i in 0..100u64 {
        let value = ((i % 7) as f32 - 3.0) / 10.0; // varied, bounded in [-1, 1]
        sender.write_frame(&frame(spec, samples_per_packet, value, i * samples_per_packet as u64)).unwrap();
        expected_values.push(value);
    }

    let packets: Vec<Packet> = sink.received.borrow_mut().drain(..).collect();
    assert_eq!(packets.len(), 100);

    let mut observed = Vec::new();
    for packet in &packets {
        receiver.push_source(wire_of(packet), start).unwrap();
        let played = receiver.read_frame(samples_per_packet, start);
        observed.push(played);
    }

    assert_eq!(receiver.metrics.dropped_packets, 0);
    assert_eq!(receiver.metrics.error_count, 0);

    // Skip the startup transient: the polyphase resampler needs a few
    // packets of lookahead before its output tracks the input exactly.
    for (frame_out, expected) in observed.iter().zip(expected_values.iter()).skip(2) {
        let avg: f32 = frame_out.samples.iter().sum::<f32>() / frame_out.samples.len() as f32;
        assert!((avg - expected).abs() < 0.01, "avg {avg} expected {expected}");
    }
}

/// Scenario 2: a single dropped source packet inside one Reed-Solomon
/// block (K=20, M=10) is recovered bit-exact from the remaining 19
/// source + 10 repair symbols.
#[test]
fn dropped_source_packet_is_recovered_by_reed_solomon() {
    let spec = stereo_spec();
    let samples_per_packet = 320;
    let (router, source_sink, repair_sink) = fec_router();

    let fec = FecConfig { scheme: FecScheme::ReedSolomon8, k: 20, m: 10, interleaver_window: 1 };
    let mut sender = SenderSession::new(spec, PT_L16_STEREO, samples_per_packet, Some(fec), 42, router).unwrap();

    for i in 0..20u64 {
        let value = ((i % 5) as f32 - 2.0) / 10.0;
        sender.write_frame(&frame(spec, samples_per_packet, value, i * samples_per_packet as u64)).unwrap();
    }

    let mut source_packets: Vec<Packet> = source_sink.received.borrow_mut().drain(..).collect();
    let repair_packets: Vec<Packet> = repair_sink.received.borrow_mut().drain(..).collect();
    assert_eq!(source_packets.len(), 20);
    assert_eq!(repair_packets.len(), 10);

    // Drop encoding_symbol_id 5 (the 6th source packet in the block).
    let dropped = source_packets.remove(5);
    assert_eq!(dropped.fec.unwrap().encoding_symbol_id, 5);

    let receiver_config = SessionConfig {
        fec: Some(fec),
        latency: 0,
        aim_queue_size: 0,
        ..SessionConfig::default()
    };
    let start = Instant::now();
    let mut receiver = ReceiverSession::new(&receiver_config, spec, start);

    for packet in &source_packets {
        receiver.push_source(wire_of(packet), start).unwrap();
    }
    for packet in &repair_packets {
        receiver.push_repair(wire_of(packet), start).unwrap();
    }

    assert_eq!(receiver.metrics.repaired_packets, 1);
    assert_eq!(receiver.metrics.lost_after_fec, 0);
    assert_eq!(receiver.metrics.dropped_packets, 0);
}

/// Scenario 3: packets 10..19 of a block arrive before packets 0..9,
/// with nothing dropped; the FEC block reader re-sequences them by
/// `encoding_symbol_id` and the streamer sees no gaps.
#[test]
fn reordered_packets_within_a_block_play_back_without_gaps() {
    let spec = stereo_spec();
    let samples_per_packet = 320;
    let (router, source_sink, repair_sink) = fec_router();

    let fec = FecConfig { scheme: FecScheme::ReedSolomon8, k: 20, m: 10, interleaver_window: 1 };
    let mut sender = SenderSession::new(spec, PT_L16_STEREO, samples_per_packet, Some(fec), 7, router).unwrap();

    for i in 0..20u64 {
        let value = ((i % 5) as f32 - 2.0) / 10.0;
        sender.write_frame(&frame(spec, samples_per_packet, value, i * samples_per_packet as u64)).unwrap();
    }

    let source_packets: Vec<Packet> = source_sink.received.borrow_mut().drain(..).collect();
    let repair_packets: Vec<Packet> = repair_sink.received.borrow_mut().drain(..).collect();
    assert_eq!(source_packets.len(), 20);
    assert!(repair_packets.is_empty(), "no repair symbols needed since nothing is lost");

    let receiver_config = SessionConfig {
        fec: Some(fec),
        latency: 0,
        aim_queue_size: 0,
        ..SessionConfig::default()
    };
    let start = Instant::now();
    let mut receiver = ReceiverSession::new(&receiver_config, spec, start);

    // Deliver the second half of the block before the first half.
    for packet in source_packets[10..20].iter().chain(source_packets[0..10].iter()) {
        receiver.push_source(wire_of(packet), start).unwrap();
    }

    assert_eq!(receiver.metrics.dropped_packets, 0);
    assert_eq!(receiver.metrics.lost_after_fec, 0);
    assert_eq!(receiver.metrics.repaired_packets, 0);

    let mut saw_gap = false;
    for i in 0..20 {
        let played = receiver.read_frame(samples_per_packet, start + Duration::from_millis(i));
        if played.flags.contains(CompletenessFlags::HAS_GAPS) {
            saw_gap = true;
        }
    }
    assert!(!saw_gap, "reordered-but-complete block should produce a gap-free stream");
}

/// Scenario 4: a run of packets from one SSRC, followed by a run from a
/// different SSRC mid-stream. The validator rejects every packet
/// carrying the new SSRC as a protocol violation (spec.md §4.10: an
/// SSRC change without a session teardown is invalid, not a silent
/// switchover).
#[test]
fn ssrc_change_mid_stream_is_rejected() {
    let spec = stereo_spec();
    let config = SessionConfig { fec: None, latency: 0, aim_queue_size: 0, ..SessionConfig::default() };
    let start = Instant::now();
    let mut receiver = ReceiverSession::new(&config, spec, start);

    fn wire(spec: SampleSpec, source_id: u32, seqnum: u16, stream_ts: u32, value: f32) -> bytes::Bytes {
        let rtp = RtpFields {
            source_id,
            seqnum,
            stream_timestamp: stream_ts,
            duration: Duration::ZERO,
            payload_type: PT_L16_STEREO,
            marker: false,
            capture_timestamp: stream_ts as i64,
        };
        let samples = vec![value; 320 * spec.num_channels()];
        let payload = spec.sample_format.encode(&samples);
        RtpComposer.compose(&rtp, &payload)
    }

    for i in 0..50u16 {
        receiver.push_source(wire(spec, 1, i, i as u32 * 320, 0.2), start).unwrap();
    }
    assert_eq!(receiver.metrics.dropped_packets, 0);

    for i in 50..60u16 {
        receiver.push_source(wire(spec, 2, i, i as u32 * 320, 0.2), start).unwrap();
    }

    assert_eq!(receiver.metrics.dropped_packets, 10, "every packet from the new ssrc is rejected");
}

/// Scenario 5: after a run of valid packets, the source falls silent
/// past `no_packets_timeout_ms`; the session terminates and further
/// operations observe `Error::Finish`.
#[test]
fn watchdog_terminates_session_after_sustained_silence() {
    let spec = stereo_spec();
    let config = SessionConfig {
        fec: None,
        latency: 0,
        aim_queue_size: 0,
        no_packets_timeout_ms: 20,
        choppy_playback_timeout_ms: 10_000,
        ..SessionConfig::default()
    };
    let start = Instant::now();
    let mut receiver = ReceiverSession::new(&config, spec, start);

    fn wire(spec: SampleSpec, seqnum: u16, stream_ts: u32) -> bytes::Bytes {
        let rtp = RtpFields {
            source_id: 1,
            seqnum,
            stream_timestamp: stream_ts,
            duration: Duration::ZERO,
            payload_type: PT_L16_STEREO,
            marker: false,
            capture_timestamp: stream_ts as i64,
        };
        let samples = vec![0.3; 320 * spec.num_channels()];
        let payload = spec.sample_format.encode(&samples);
        RtpComposer.compose(&rtp, &payload)
    }

    for i in 0..50u16 {
        receiver.push_source(wire(spec, i, i as u32 * 320), start).unwrap();
    }
    assert!(matches!(receiver.status(), SessionStatus::Active));

    let past_timeout = start + Duration::from_millis(21);
    let _ = receiver.read_frame(320, past_timeout);

    assert!(matches!(receiver.status(), SessionStatus::Terminated(_)));
    assert_eq!(receiver.refresh().unwrap_err(), Error::Finish);
    assert_eq!(receiver.push_source(wire(spec, 50, 50 * 320), past_timeout).unwrap_err(), Error::Finish);
}

/// Scenario 6 (qualitative, per DESIGN.md's Open Question decision):
/// the frequency estimator pushes `freq_coeff` below unity when the
/// playback queue is chronically starved, above unity when it is
/// chronically overfull, and never outside the configured bound
/// either way.
#[test]
fn frequency_estimator_responds_to_chronic_queue_depth_and_stays_bounded() {
    let spec = stereo_spec();
    let samples_per_packet = 320;

    fn wire(spec: SampleSpec, seqnum: u16, stream_ts: u32, value: f32) -> bytes::Bytes {
        let rtp = RtpFields {
            source_id: 1,
            seqnum,
            stream_timestamp: stream_ts,
            duration: Duration::ZERO,
            payload_type: PT_L16_STEREO,
            marker: false,
            capture_timestamp: stream_ts as i64,
        };
        let samples = vec![value; 320 * spec.num_channels()];
        let payload = spec.sample_format.encode(&samples);
        RtpComposer.compose(&rtp, &payload)
    }

    // Starved case: push a handful of packets once, then read far more
    // frames than were supplied, driving the playback queue toward zero
    // and holding it there.
    {
        let config = SessionConfig { fec: None, latency: 0, ..SessionConfig::default() };
        let start = Instant::now();
        let mut receiver = ReceiverSession::new(&config, spec, start);
        for i in 0..4u16 {
            receiver.push_source(wire(spec, i, i as u32 * samples_per_packet as u32, 0.1), start).unwrap();
        }
        let mut last = 1.0;
        for _ in 0..50 {
            let _ = receiver.read_frame(samples_per_packet, start);
            last = receiver.freq_coeff();
        }
        assert!(last <= 1.0, "starved queue should slow consumption down (coeff <= 1.0), got {last}");
        assert!(last >= 1.0 - 0.001 - 1e-9, "coeff must stay within the configured deviation bound");
    }

    // Overfull case: push far more packets than are ever read back,
    // building up a large unconsumed backlog in the streamer.
    {
        let config = SessionConfig { fec: None, latency: 0, ..SessionConfig::default() };
        let start = Instant::now();
        let mut receiver = ReceiverSession::new(&config, spec, start);
        for i in 0..400u16 {
            receiver.push_source(wire(spec, i, i as u32 * samples_per_packet as u32, 0.1), start).unwrap();
        }
        let mut last = 1.0;
        for _ in 0..5 {
            let _ = receiver.read_frame(samples_per_packet, start);
            last = receiver.freq_coeff();
        }
        assert!(last >= 1.0, "overfull queue should speed consumption up (coeff >= 1.0), got {last}");
        assert!(last <= 1.0 + 0.001 + 1e-9, "coeff must stay within the configured deviation bound");
    }
}
