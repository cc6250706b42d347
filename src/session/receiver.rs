//! Receiver pipeline chain (C18): UDP bytes → per-port parser → FEC
//! block reader → validator → delayer → streamer → resampler →
//! frames (spec §2's receiver data flow).

use std::time::Instant;

use bytes::Bytes;
use tracing::debug;

use crate::config::SessionConfig;
use crate::delayer::Delayer;
use crate::error::{Error, Result};
use crate::fec_block::FecBlockReader;
use crate::freq_estimator::{FreqEstimator, FreqEstimatorConfig};
use crate::packet::fec::FecParser;
use crate::packet::rtp::RtpParser;
use crate::packet::{FecIdPosition, Packet};
use crate::resampler::Resampler;
use crate::sample_spec::{CompletenessFlags, Frame, SampleSpec};
use crate::streamer::Streamer;
use crate::validator::{Validator, ValidatorConfig};

use super::{SessionStatus, Watchdog};

enum Ingest {
    Rtp { parser: RtpParser },
    Fec { source_parser: FecParser, repair_parser: FecParser, reader: FecBlockReader },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReceiverMetrics {
    pub dropped_packets: u64,
    pub error_count: u64,
    /// Packets lost before FEC recovery was attempted (distinct from
    /// `lost_after_fec`, which the FEC block reader's `lost_total`
    /// accounts for once recovery has been tried and failed).
    pub lost_before_fec: u64,
    pub lost_after_fec: u64,
    pub repaired_packets: u64,
}

/// Builds and drives the receiver-side DAG described in spec §2/§4.16.
pub struct ReceiverSession {
    spec: SampleSpec,
    ingest: Ingest,
    validator: Validator,
    delayer: Delayer,
    streamer: Streamer,
    resampler: Resampler,
    freq_estimator: FreqEstimator,
    watchdog: Watchdog,
    session_start: Instant,
    status: SessionStatus,
    pub metrics: ReceiverMetrics,
}

impl ReceiverSession {
    pub fn new(config: &SessionConfig, spec: SampleSpec, now: Instant) -> Self {
        let ingest = match config.fec {
            Some(fec_cfg) => Ingest::Fec {
                source_parser: FecParser::new(fec_cfg.scheme, FecIdPosition::Header, Some(RtpParser)),
                repair_parser: FecParser::new(fec_cfg.scheme, FecIdPosition::Header, None),
                reader: FecBlockReader::new(fec_cfg.scheme),
            },
            None => Ingest::Rtp { parser: RtpParser },
        };

        let validator_config = ValidatorConfig { max_sn_jump: config.max_sn_jump, max_ts_jump_ns: config.max_ts_jump };
        let freq_config =
            FreqEstimatorConfig { aim_queue_size: config.aim_queue_size, ..FreqEstimatorConfig::default() };

        Self {
            spec,
            ingest,
            validator: Validator::new(validator_config, spec),
            delayer: Delayer::new(config.latency),
            streamer: Streamer::new(spec),
            resampler: Resampler::new(spec.num_channels()),
            freq_estimator: FreqEstimator::new(freq_config),
            watchdog: Watchdog::new(
                std::time::Duration::from_millis(config.no_packets_timeout_ms),
                std::time::Duration::from_millis(config.choppy_playback_timeout_ms),
            ),
            session_start: now,
            status: SessionStatus::Active,
            metrics: ReceiverMetrics::default(),
        }
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Surfaces the remembered terminal status, if any (spec §4.16
    /// tier 2: a control loop observes this after the watchdog fires).
    pub fn refresh(&self) -> Result<()> {
        match &self.status {
            SessionStatus::Active => Ok(()),
            SessionStatus::Terminated(err) => Err(err.clone()),
        }
    }

    /// Feeds one datagram received on the source port.
    pub fn push_source(&mut self, wire: Bytes, now: Instant) -> Result<()> {
        self.refresh()?;
        let parsed = match &self.ingest {
            Ingest::Rtp { parser } => parser.parse(wire),
            Ingest::Fec { source_parser, .. } => source_parser.parse(wire),
        };
        self.ingest_parsed(parsed, now)
    }

    /// Feeds one datagram received on the repair port; a no-op (and a
    /// local drop, per spec §4.16 tier 1) when FEC is disabled for
    /// this session.
    pub fn push_repair(&mut self, wire: Bytes, now: Instant) -> Result<()> {
        self.refresh()?;
        let parsed = match &self.ingest {
            Ingest::Rtp { .. } => {
                debug!("receiver session: repair packet arrived but fec is disabled, dropping");
                self.metrics.dropped_packets += 1;
                return Ok(());
            }
            Ingest::Fec { repair_parser, .. } => repair_parser.parse(wire),
        };
        self.ingest_parsed(parsed, now)
    }

    fn ingest_parsed(&mut self, parsed: Result<Packet>, now: Instant) -> Result<()> {
        let packet = match parsed {
            Ok(p) => p,
            Err(err) => {
                debug!(%err, "receiver session: packet failed to parse, dropping");
                self.metrics.error_count += 1;
                return Ok(());
            }
        };

        let emitted = match &mut self.ingest {
            Ingest::Rtp { .. } => vec![packet],
            Ingest::Fec { reader, .. } => match reader.push(packet) {
                Ok(out) => out,
                Err(err) => {
                    debug!(%err, "receiver session: fec block reader rejected packet");
                    self.metrics.error_count += 1;
                    Vec::new()
                }
            },
        };

        if let Ingest::Fec { reader, .. } = &self.ingest {
            self.metrics.lost_after_fec = reader.lost_total;
            self.metrics.repaired_packets = reader.repaired_total;
        }

        for source_packet in emitted {
            self.accept_source_packet(source_packet, now);
        }
        Ok(())
    }

    fn accept_source_packet(&mut self, packet: Packet, now: Instant) {
        let rtp = match &packet.rtp {
            Some(r) => r.clone(),
            None => {
                self.metrics.lost_before_fec += 1;
                return;
            }
        };

        match self.validator.validate(&rtp) {
            Ok(()) => {
                self.watchdog.note_valid_packet(now);
                let bytes_per_sample = self.spec.sample_format.bytes_per_sample();
                let channels = self.spec.num_channels().max(1);
                let samples_per_chan = packet.payload.len() / (bytes_per_sample * channels).max(1);
                self.delayer.write(packet, samples_per_chan as u64);
            }
            Err(err) => {
                debug!(%err, "receiver session: validator rejected packet");
                self.metrics.dropped_packets += 1;
            }
        }

        while let Some(p) = self.delayer.read() {
            self.streamer.push(&p);
        }
    }

    /// Produces the next frame of `samples_per_chan` samples per
    /// channel, running the watchdog and the resampler's closed-loop
    /// frequency correction on every call (spec §4.13: "runs on every
    /// frame boundary").
    pub fn read_frame(&mut self, samples_per_chan: usize, now: Instant) -> Frame {
        if self.status.is_active() && self.watchdog.expired(now, self.session_start) {
            self.streamer.terminate();
            self.status = SessionStatus::Terminated(Error::Finish);
        }

        let raw = self.streamer.read(samples_per_chan);
        self.watchdog.note_frame(now, raw.flags.contains(CompletenessFlags::SIGNAL_PRESENT));

        let coeff = self.freq_estimator.update(self.streamer.queued_samples());
        // `set_scaling` only fails outside its supported ratio range;
        // `freq_coeff` is bounded well inside that range by construction.
        let _ = self.resampler.set_scaling(self.spec.sample_rate, self.spec.sample_rate, coeff);
        self.resampler.push_input(&raw.samples);

        let channels = self.spec.num_channels();
        let mut out = vec![0.0f32; samples_per_chan * channels];
        let produced = self.resampler.pop_output(&mut out);
        if produced < samples_per_chan {
            // Not enough resampler history yet (startup transient);
            // top off with silence rather than return a short frame.
            out.truncate(produced * channels);
            out.resize(samples_per_chan * channels, 0.0);
        }

        Frame {
            samples: out,
            spec: self.spec,
            stream_timestamp: raw.stream_timestamp,
            capture_timestamp: raw.capture_timestamp,
            flags: raw.flags,
        }
    }

    pub fn freq_coeff(&self) -> f64 {
        self.freq_estimator.freq_coeff()
    }

    /// Playback backlog in samples per channel — the same depth the
    /// frequency estimator corrects against.
    pub fn queued_samples(&self) -> u64 {
        self.streamer.queued_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::rtp::RtpComposer;
    use crate::packet::RtpFields;
    use crate::sample_spec::{ChannelLayout, SampleFormat};
    use std::time::Duration;

    fn spec() -> SampleSpec {
        SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be)
    }

    fn wire(seqnum: u16, stream_ts: u32, samples_per_chan: usize, value: f32) -> Bytes {
        let rtp = RtpFields {
            source_id: 1,
            seqnum,
            stream_timestamp: stream_ts,
            duration: Duration::ZERO,
            payload_type: 10,
            marker: false,
            capture_timestamp: 1,
        };
        let samples = vec![value; samples_per_chan * spec().num_channels()];
        let payload = spec().sample_format.encode(&samples);
        RtpComposer.compose(&rtp, &payload)
    }

    #[test]
    fn lossless_stream_without_fec_plays_back() {
        let config = SessionConfig { fec: None, latency: 20, ..SessionConfig::default() };
        let start = Instant::now();
        let mut session = ReceiverSession::new(&config, spec(), start);

        for i in 0..10u16 {
            session.push_source(wire(i, i as u32 * 10, 10, 0.4), start).unwrap();
        }
        let mut any_signal = false;
        for _ in 0..20 {
            let frame = session.read_frame(5, start);
            if frame.samples.iter().any(|&s| s != 0.0) {
                any_signal = true;
            }
        }
        assert!(any_signal);
        assert_eq!(session.metrics.dropped_packets, 0);
    }

    #[test]
    fn ssrc_change_is_rejected_by_the_validator() {
        let config = SessionConfig { fec: None, latency: 0, ..SessionConfig::default() };
        let start = Instant::now();
        let mut session = ReceiverSession::new(&config, spec(), start);

        for i in 0..5u16 {
            session.push_source(wire(i, i as u32 * 10, 10, 0.1), start).unwrap();
        }

        let rtp = RtpFields {
            source_id: 2,
            seqnum: 5,
            stream_timestamp: 50,
            duration: Duration::ZERO,
            payload_type: 10,
            marker: false,
            capture_timestamp: 1,
        };
        let payload = spec().sample_format.encode(&vec![0.9; 10 * spec().num_channels()]);
        let bad_wire = RtpComposer.compose(&rtp, &payload);
        session.push_source(bad_wire, start).unwrap();

        assert_eq!(session.metrics.dropped_packets, 1);
    }

    #[test]
    fn watchdog_terminates_after_silence() {
        let config = SessionConfig {
            fec: None,
            latency: 0,
            no_packets_timeout_ms: 10,
            choppy_playback_timeout_ms: 10_000,
            ..SessionConfig::default()
        };
        let start = Instant::now();
        let mut session = ReceiverSession::new(&config, spec(), start);
        session.push_source(wire(0, 0, 10, 0.5), start).unwrap();

        let later = start + Duration::from_millis(50);
        let _ = session.read_frame(10, later);
        assert!(matches!(session.status(), SessionStatus::Terminated(_)));
        assert_eq!(session.refresh().unwrap_err(), Error::Finish);
    }
}
