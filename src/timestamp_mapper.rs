//! Timestamp extractor/mapper (C16): learns the (capture-ts ↔
//! stream-ts) mapping for RTCP, grounded in
//! `roc_rtp/timestamp_extractor.cpp`'s exact update gating.

use crate::sample_spec::SampleSpec;

/// Remembers the most recent `(capture_timestamp, stream_timestamp)`
/// pair and extrapolates affinely from it.
pub struct TimestampMapper {
    spec: SampleSpec,
    last: Option<(i64, u64)>,
}

impl TimestampMapper {
    pub fn new(spec: SampleSpec) -> Self {
        Self { spec, last: None }
    }

    /// Updates the stored mapping pair. Per `TimestampExtractor::write`,
    /// this only happens when `capture_timestamp != 0` — a zero capture
    /// timestamp means "not captured with wall-clock info", and must
    /// not overwrite a previously learned mapping.
    pub fn write(&mut self, capture_timestamp: i64, stream_timestamp: u64) {
        if capture_timestamp != 0 {
            self.last = Some((capture_timestamp, stream_timestamp));
        }
    }

    /// `ns ↦ last_stream_ts + (ns - last_capture_ns) * sample_rate / 1e9`.
    /// Returns `None` (the "no mapping" sentinel) until the first
    /// non-zero `capture_timestamp` has been seen.
    pub fn map(&self, ns: i64) -> Option<u64> {
        let (last_capture_ns, last_stream_ts) = self.last?;
        let delta_ns = ns - last_capture_ns;
        let delta_samples = delta_ns as i128 * self.spec.sample_rate as i128 / 1_000_000_000;
        Some((last_stream_ts as i128 + delta_samples) as u64)
    }
}
