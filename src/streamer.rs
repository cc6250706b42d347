//! Depacketizer / streamer (C10): consumes packets, emits continuous
//! frames with gap concealment. An explicit state machine rather than
//! a pile of boolean flags.

use std::collections::VecDeque;

use crate::packet::rtp::RtpParser;
use crate::packet::{Packet, RtpFields};
use crate::sample_spec::{CompletenessFlags, Frame, SampleSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Waiting,
    Playing,
    Terminated,
}

pub struct StreamerMetrics {
    pub gaps: u64,
    pub late_packets: u64,
    pub overlapped_packets: u64,
}

struct QueuedPacket {
    rtp: RtpFields,
    samples: Vec<f32>,
    /// Index of the next not-yet-consumed sample per channel.
    cursor: usize,
}

impl QueuedPacket {
    fn samples_per_chan(&self, channels: usize) -> usize {
        self.samples.len() / channels.max(1)
    }

    fn start_stream_ts(&self) -> u64 {
        self.rtp.stream_timestamp as u64
    }

    fn end_stream_ts(&self, channels: usize) -> u64 {
        self.start_stream_ts() + self.samples_per_chan(channels) as u64
    }
}

/// Waiting/Playing/Terminated state machine turning an arriving packet
/// stream into a continuous frame stream.
pub struct Streamer {
    spec: SampleSpec,
    state: State,
    output_cursor: u64,
    queue: VecDeque<QueuedPacket>,
    rtp_parser: RtpParser,
    pub metrics: StreamerMetrics,
}

impl Streamer {
    pub fn new(spec: SampleSpec) -> Self {
        Self {
            spec,
            state: State::Waiting,
            output_cursor: 0,
            queue: VecDeque::new(),
            rtp_parser: RtpParser,
            metrics: StreamerMetrics { gaps: 0, late_packets: 0, overlapped_packets: 0 },
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Samples per channel buffered ahead of the output cursor — the
    /// playback backlog the frequency estimator (C15) corrects against.
    /// Unlike the delayer's pre-roll queue, this reflects steady-state
    /// depth: it only shrinks as `read()` actually consumes samples.
    pub fn queued_samples(&self) -> u64 {
        let channels = self.spec.num_channels().max(1);
        self.queue
            .iter()
            .map(|q| (q.samples_per_chan(channels).saturating_sub(q.cursor)) as u64)
            .sum()
    }

    /// Enqueues a validated, already-decoded source packet.
    pub fn push(&mut self, packet: &Packet) {
        let rtp = match &packet.rtp {
            Some(r) => r.clone(),
            None => return,
        };
        let channels = self.spec.num_channels();
        let samples = self.spec.sample_format.decode(&packet.payload);

        if self.state == State::Waiting {
            self.state = State::Playing;
            self.output_cursor = rtp.stream_timestamp as u64;
        }

        let end_ts = rtp.stream_timestamp as u64 + (samples.len() / channels.max(1)) as u64;
        if end_ts <= self.output_cursor {
            self.metrics.late_packets += 1;
            return;
        }

        if let Some(tail) = self.queue.back() {
            if rtp.stream_timestamp as u64 <= tail.end_stream_ts(channels) {
                self.metrics.overlapped_packets += 1;
            }
        }

        self.queue.push_back(QueuedPacket { rtp, samples, cursor: 0 });
    }

    pub fn terminate(&mut self) {
        self.state = State::Terminated;
    }

    /// Produces the next frame of `samples_per_chan` samples per
    /// channel.
    pub fn read(&mut self, samples_per_chan: usize) -> Frame {
        let channels = self.spec.num_channels();

        if self.state != State::Playing {
            let stream_ts = self.output_cursor;
            return Frame::silence(self.spec, samples_per_chan, stream_ts);
        }

        let mut out = vec![0.0f32; samples_per_chan * channels];
        let mut flags = CompletenessFlags::SIGNAL_PRESENT;
        let start_ts = self.output_cursor;

        for i in 0..samples_per_chan {
            while let Some(head) = self.queue.front() {
                if head.end_stream_ts(channels) <= self.output_cursor {
                    self.queue.pop_front();
                    continue;
                }
                break;
            }

            match self.queue.front_mut() {
                Some(head) if head.start_stream_ts() <= self.output_cursor => {
                    let chan_cursor = head.cursor;
                    for c in 0..channels {
                        out[i * channels + c] = head.samples[chan_cursor * channels + c];
                    }
                    head.cursor += 1;
                }
                _ => {
                    // Gap: no packet covers this sample yet.
                    flags |= CompletenessFlags::HAS_GAPS;
                    self.metrics.gaps += 1;
                }
            }

            self.output_cursor += 1;
        }

        Frame { samples: out, spec: self.spec, stream_timestamp: start_ts, capture_timestamp: 0, flags }
    }

    /// Convenience for feeding raw RTP-composed bytes directly (used by
    /// integration tests exercising the wire path end to end).
    pub fn push_wire(&mut self, wire: bytes::Bytes) -> crate::error::Result<()> {
        let packet = self.rtp_parser.parse(wire)?;
        self.push(&packet);
        Ok(())
    }
}
