//! Packetizer: consumes frames, emits fixed-duration RTP payloads.

use std::time::Duration;

use crate::error::Result;
use crate::packet::rtp::RtpComposer;
use crate::packet::{Packet, RtpFields};
use crate::sample_spec::{Frame, SampleSpec};
use crate::sequencer::Sequencer;

pub struct PacketizerMetrics {
    pub encoded_packets: u64,
    pub payload_bytes: u64,
}

/// Buffers frames until a full `samples_per_packet`-sample packet is
/// available, then emits it through the sequencer and RTP composer.
pub struct Packetizer {
    spec: SampleSpec,
    samples_per_packet: usize,
    packet_duration: Duration,
    composer: RtpComposer,
    sequencer: Sequencer,
    pending: Vec<f32>,
    pub metrics: PacketizerMetrics,
}

impl Packetizer {
    pub fn ssrc(&self) -> u32 {
        self.sequencer.ssrc()
    }

    pub fn cname(&self) -> &str {
        self.sequencer.cname()
    }

    pub fn new(spec: SampleSpec, samples_per_packet: usize, sequencer: Sequencer) -> Self {
        let packet_duration = spec.samples_per_chan_2_ns(samples_per_packet as u64);
        Self {
            spec,
            samples_per_packet,
            packet_duration,
            composer: RtpComposer,
            sequencer,
            pending: Vec::new(),
            metrics: PacketizerMetrics { encoded_packets: 0, payload_bytes: 0 },
        }
    }

    /// Feeds one frame's interleaved samples; returns every full packet
    /// this frame completed (usually zero or one, occasionally more if
    /// the frame spans several packet boundaries).
    pub fn write(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        let pairs = self.write_raw(frame);
        Ok(pairs.into_iter().map(|(rtp, payload)| self.finish(rtp, payload)).collect())
    }

    /// Same buffering as `write`, but returns the RTP fields and encoded
    /// payload without composing them into a plain RTP packet — used by
    /// sessions that wrap each source packet in a FEC payload ID
    /// instead, composer-chain style.
    pub fn write_raw(&mut self, frame: &Frame) -> Vec<(RtpFields, Vec<u8>)> {
        self.pending.extend_from_slice(&frame.samples);
        let mut out = Vec::new();
        let channels = self.spec.num_channels();
        let frame_len = self.samples_per_packet * channels;

        while self.pending.len() >= frame_len {
            let chunk: Vec<f32> = self.pending.drain(0..frame_len).collect();
            out.push(self.next_fields_and_payload(&chunk, frame.capture_timestamp));
        }
        out
    }

    /// Pads any partial packet with silence and forwards it: fixed-size
    /// packets keep FEC blocks symbol-aligned.
    pub fn flush(&mut self) -> Result<Option<Packet>> {
        match self.flush_raw() {
            Ok((rtp, payload)) => Ok(Some(self.finish(rtp, payload))),
            Err(crate::error::Error::NoData) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn flush_raw(&mut self) -> Result<(RtpFields, Vec<u8>)> {
        if self.pending.is_empty() {
            return Err(crate::error::Error::NoData);
        }
        let channels = self.spec.num_channels();
        let frame_len = self.samples_per_packet * channels;
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(frame_len, 0.0);
        Ok(self.next_fields_and_payload(&chunk, 0))
    }

    fn next_fields_and_payload(&mut self, samples: &[f32], capture_timestamp: i64) -> (RtpFields, Vec<u8>) {
        let rtp = self.sequencer.next(capture_timestamp, self.packet_duration, self.samples_per_packet as u32);
        let payload = self.spec.sample_format.encode(samples);
        self.metrics.encoded_packets += 1;
        self.metrics.payload_bytes += payload.len() as u64;
        (rtp, payload)
    }

    fn finish(&self, rtp: RtpFields, payload: Vec<u8>) -> Packet {
        self.composer.compose_packet(rtp, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_spec::{ChannelLayout, CompletenessFlags, SampleFormat};

    fn spec() -> SampleSpec {
        SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be)
    }

    fn frame(n_samples_per_chan: usize, start: f32) -> Frame {
        let channels = spec().num_channels();
        let samples: Vec<f32> = (0..n_samples_per_chan * channels).map(|i| start + i as f32).collect();
        Frame {
            samples,
            spec: spec(),
            stream_timestamp: 0,
            capture_timestamp: 0,
            flags: CompletenessFlags::SIGNAL_PRESENT,
        }
    }

    #[test]
    fn emits_exactly_one_packet_for_a_matching_frame() {
        let seq = Sequencer::new(10).unwrap();
        let mut p = Packetizer::new(spec(), 4, seq);
        let packets = p.write(&frame(4, 0.0)).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(p.metrics.encoded_packets, 1);
        assert_eq!(packets[0].payload.len(), 4 * 2 * 2);
    }

    #[test]
    fn buffers_partial_frame_until_full() {
        let seq = Sequencer::new(10).unwrap();
        let mut p = Packetizer::new(spec(), 4, seq);
        assert!(p.write(&frame(2, 0.0)).unwrap().is_empty());
        let packets = p.write(&frame(2, 100.0)).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn flush_pads_partial_packet_with_silence() {
        let seq = Sequencer::new(10).unwrap();
        let mut p = Packetizer::new(spec(), 4, seq);
        p.write(&frame(1, 5.0)).unwrap();
        let flushed = p.flush().unwrap().expect("partial packet pending");
        assert_eq!(flushed.payload.len(), 4 * 2 * 2);
        assert!(p.flush().unwrap().is_none());
    }
}
