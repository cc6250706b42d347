//! Sample specification and frame data model.

use std::time::Duration;

/// Closed vocabulary of channel layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    /// `main` full-range channels plus `lfe` low-frequency-effects channels,
    /// e.g. `Surround { main: 5, lfe: 1 }` for 5.1.
    Surround { main: u8, lfe: u8 },
    /// Arbitrary multitrack layout addressed by a channel bitmask.
    Multitrack(u64),
}

impl ChannelLayout {
    pub fn num_channels(&self) -> usize {
        match *self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Surround { main, lfe } => main as usize + lfe as usize,
            ChannelLayout::Multitrack(mask) => mask.count_ones() as usize,
        }
    }
}

/// Sample storage format: raw float, or PCM integer of a given width and
/// byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    F32Le,
    S16Be,
    S16Le,
    S24Be,
    S24Le,
    S32Be,
    S32Le,
}

impl SampleFormat {
    /// Encoded size in bytes of one sample in this format.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::F32Le => 4,
            SampleFormat::S16Be | SampleFormat::S16Le => 2,
            SampleFormat::S24Be | SampleFormat::S24Le => 3,
            SampleFormat::S32Be | SampleFormat::S32Le => 4,
        }
    }

    /// Encodes native `f32` samples in `[-1.0, 1.0]` into this format's
    /// on-wire byte representation (the built-in payload types are both
    /// PCM; grounded in `roc_rtp/pcm_encoder.cpp`'s per-format write
    /// path, generalized from one hardcoded width to all seven).
    pub fn encode(&self, samples: &[f32]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * self.bytes_per_sample());
        for &s in samples {
            match self {
                SampleFormat::F32Le => out.extend_from_slice(&s.to_le_bytes()),
                SampleFormat::S16Be => out.extend_from_slice(&quantize_i16(s).to_be_bytes()),
                SampleFormat::S16Le => out.extend_from_slice(&quantize_i16(s).to_le_bytes()),
                SampleFormat::S24Be => out.extend_from_slice(&quantize_i24(s).to_be_bytes()[1..]),
                SampleFormat::S24Le => out.extend_from_slice(&quantize_i24(s).to_le_bytes()[..3]),
                SampleFormat::S32Be => out.extend_from_slice(&quantize_i32(s).to_be_bytes()),
                SampleFormat::S32Le => out.extend_from_slice(&quantize_i32(s).to_le_bytes()),
            }
        }
        out
    }

    /// Inverse of `encode`; `bytes.len()` must be a multiple of
    /// `bytes_per_sample()`.
    pub fn decode(&self, bytes: &[u8]) -> Vec<f32> {
        let width = self.bytes_per_sample();
        bytes
            .chunks_exact(width)
            .map(|chunk| match self {
                SampleFormat::F32Le => f32::from_le_bytes(chunk.try_into().unwrap()),
                SampleFormat::S16Be => dequantize_i16(i16::from_be_bytes(chunk.try_into().unwrap())),
                SampleFormat::S16Le => dequantize_i16(i16::from_le_bytes(chunk.try_into().unwrap())),
                SampleFormat::S24Be => dequantize_i24(i24_from_be_bytes(chunk)),
                SampleFormat::S24Le => dequantize_i24(i24_from_le_bytes(chunk)),
                SampleFormat::S32Be => dequantize_i32(i32::from_be_bytes(chunk.try_into().unwrap())),
                SampleFormat::S32Le => dequantize_i32(i32::from_le_bytes(chunk.try_into().unwrap())),
            })
            .collect()
    }
}

fn quantize_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
fn dequantize_i16(v: i16) -> f32 {
    v as f32 / i16::MAX as f32
}

fn quantize_i24(s: f32) -> i32 {
    (s.clamp(-1.0, 1.0) * 8_388_607.0) as i32
}
fn dequantize_i24(v: i32) -> f32 {
    v as f32 / 8_388_607.0
}
fn i24_from_be_bytes(chunk: &[u8]) -> i32 {
    let sign_extend = if chunk[0] & 0x80 != 0 { 0xFFu8 } else { 0x00 };
    i32::from_be_bytes([sign_extend, chunk[0], chunk[1], chunk[2]])
}
fn i24_from_le_bytes(chunk: &[u8]) -> i32 {
    let sign_extend = if chunk[2] & 0x80 != 0 { 0xFFu8 } else { 0x00 };
    i32::from_le_bytes([chunk[0], chunk[1], chunk[2], sign_extend])
}

fn quantize_i32(s: f32) -> i32 {
    (s.clamp(-1.0, 1.0) * i32::MAX as f32) as i32
}
fn dequantize_i32(v: i32) -> f32 {
    v as f32 / i32::MAX as f32
}

/// Immutable (after session construction) description of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleSpec {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub sample_format: SampleFormat,
}

impl SampleSpec {
    pub fn new(sample_rate: u32, channel_layout: ChannelLayout, sample_format: SampleFormat) -> Self {
        Self { sample_rate, channel_layout, sample_format }
    }

    pub fn num_channels(&self) -> usize {
        self.channel_layout.num_channels()
    }

    /// Number of interleaved samples per channel-group frame for a given
    /// duration.
    pub fn ns_2_samples_per_chan(&self, duration: Duration) -> u64 {
        (duration.as_nanos() as u128 * self.sample_rate as u128 / 1_000_000_000) as u64
    }

    pub fn samples_per_chan_2_ns(&self, samples: u64) -> Duration {
        Duration::from_nanos(samples * 1_000_000_000 / self.sample_rate as u64)
    }

    /// Converts a signed stream-timestamp delta (in samples per channel)
    /// to nanoseconds, used by the validator's jump checks.
    pub fn stream_timestamp_delta_2_ns(&self, delta: i64) -> i64 {
        (delta as i128 * 1_000_000_000 / self.sample_rate as i128) as i64
    }

    /// Bytes needed to encode `samples_per_chan` samples per channel in
    /// this spec's sample format.
    pub fn encoded_byte_count(&self, samples_per_chan: usize) -> usize {
        samples_per_chan * self.num_channels() * self.sample_format.bytes_per_sample()
    }
}

/// Subset of completeness flags a frame may carry, combinable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletenessFlags(u8);

impl CompletenessFlags {
    pub const RAW: Self = Self(0b0001);
    pub const SIGNAL_PRESENT: Self = Self(0b0010);
    pub const HAS_GAPS: Self = Self(0b0100);
    pub const HAS_DROPS: Self = Self(0b1000);

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

impl std::ops::BitOr for CompletenessFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for CompletenessFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

/// A contiguous, interleaved run of PCM samples tagged with timing
/// metadata. Flows by value on the sender, and wrapped in an `Arc` (via
/// the buffer pool) on the receiver.
#[derive(Debug, Clone)]
pub struct Frame {
    pub samples: Vec<f32>,
    pub spec: SampleSpec,
    /// Stream-timestamp (sample-indexed, RTP-domain) of the first sample.
    pub stream_timestamp: u64,
    /// Wall-clock capture time of the leading sample, nanoseconds since
    /// an arbitrary epoch; 0 means unknown.
    pub capture_timestamp: i64,
    pub flags: CompletenessFlags,
}

impl Frame {
    pub fn silence(spec: SampleSpec, samples_per_chan: usize, stream_timestamp: u64) -> Self {
        Self {
            samples: vec![0.0; samples_per_chan * spec.num_channels()],
            spec,
            stream_timestamp,
            capture_timestamp: 0,
            flags: CompletenessFlags::HAS_GAPS,
        }
    }

    pub fn samples_per_chan(&self) -> usize {
        self.samples.len() / self.spec.num_channels().max(1)
    }

    /// `duration == samples / (rate * channels)`.
    pub fn duration(&self) -> Duration {
        self.spec.samples_per_chan_2_ns(self.samples_per_chan() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_within_quantization_error() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0, 0.25];
        for fmt in [
            SampleFormat::F32Le,
            SampleFormat::S16Be,
            SampleFormat::S16Le,
            SampleFormat::S24Be,
            SampleFormat::S24Le,
            SampleFormat::S32Be,
            SampleFormat::S32Le,
        ] {
            let encoded = fmt.encode(&samples);
            assert_eq!(encoded.len(), samples.len() * fmt.bytes_per_sample());
            let decoded = fmt.decode(&encoded);
            for (a, b) in samples.iter().zip(decoded.iter()) {
                assert!((a - b).abs() < 1e-3, "{:?}: {} vs {}", fmt, a, b);
            }
        }
    }

    #[test]
    fn frame_duration_matches_samples_over_rate() {
        let spec = SampleSpec::new(44_100, ChannelLayout::Stereo, SampleFormat::S16Be);
        let frame = Frame::silence(spec, 441, 0);
        assert_eq!(frame.duration(), Duration::from_millis(10));
    }
}
