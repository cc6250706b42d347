//! Delayer / jitter buffer: holds a minimum head-of-line depth before
//! releasing packets, modeled on `roc_audio::Delayer`'s packet-queue
//! design (queue-depth pre-roll, not a frame-level counter).

use std::collections::VecDeque;

use crate::packet::Packet;

struct QueuedPacket {
    packet: Packet,
    samples_per_chan: u64,
}

/// Buffers packets until the queued span reaches `latency` samples,
/// then passes packets through unchanged.
pub struct Delayer {
    latency: u64,
    queue: VecDeque<QueuedPacket>,
    started: bool,
}

impl Delayer {
    pub fn new(latency_samples: u64) -> Self {
        Self { latency: latency_samples, queue: VecDeque::new(), started: false }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Queues one packet; `samples_per_chan` is the packet's payload
    /// length in samples per channel, needed to compute its span.
    pub fn write(&mut self, packet: Packet, samples_per_chan: u64) {
        self.queue.push_back(QueuedPacket { packet, samples_per_chan });
        if !self.started && self.queue_span() >= self.latency {
            self.started = true;
        }
    }

    /// Returns the next packet once the buffer has started; `None`
    /// while still pre-rolling.
    pub fn read(&mut self) -> Option<Packet> {
        if !self.started {
            return None;
        }
        self.queue.pop_front().map(|q| q.packet)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Current queue depth in samples per channel; fed to the
    /// frequency estimator (C15) as `queue_depth_samples`.
    pub fn queued_samples(&self) -> u64 {
        self.queue.iter().map(|q| q.samples_per_chan).sum()
    }

    /// `tail.stream_ts + tail.duration - head.stream_ts`, expressed in
    /// samples rather than duration.
    fn queue_span(&self) -> u64 {
        let head = match self.queue.front() {
            Some(h) => h,
            None => return 0,
        };
        let tail = self.queue.back().expect("front is Some, so back is too");

        let head_ts = head.packet.rtp.as_ref().map(|r| r.stream_timestamp as u64).unwrap_or(0);
        let tail_ts = tail.packet.rtp.as_ref().map(|r| r.stream_timestamp as u64).unwrap_or(0);
        (tail_ts + tail.samples_per_chan).saturating_sub(head_ts)
    }
}
