//! Validator: rejects packets outside jump/wrap tolerances, rejection
//! order taken verbatim from `roc_rtp/validator.cpp`.

use crate::error::{Error, Result};
use crate::packet::RtpFields;
use crate::sample_spec::SampleSpec;

#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub max_sn_jump: u16,
    pub max_ts_jump_ns: i64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { max_sn_jump: 32768, max_ts_jump_ns: 1_000_000_000 }
    }
}

/// Tracks the last-accepted packet for a single-source session and
/// validates the next one against it.
pub struct Validator {
    config: ValidatorConfig,
    spec: SampleSpec,
    last: Option<RtpFields>,
}

impl Validator {
    pub fn new(config: ValidatorConfig, spec: SampleSpec) -> Self {
        Self { config, spec, last: None }
    }

    /// Validates `packet` against the last-accepted packet, in the
    /// exact rejection order of `roc_rtp/validator.cpp`'s `validate_()`:
    /// source id change, payload type change, seqnum jump, timestamp
    /// jump, then capture-timestamp sign/reset checks. Accepts (and
    /// remembers) the packet on success.
    pub fn validate(&mut self, packet: &RtpFields) -> Result<()> {
        if let Some(last) = &self.last {
            if packet.source_id != last.source_id {
                return Err(Error::BadPacket("source id changed mid-session"));
            }
            if packet.payload_type != last.payload_type {
                return Err(Error::BadPacket("payload type changed mid-session"));
            }

            let sn_diff = RtpFields::seqnum_diff(last.seqnum, packet.seqnum);
            if sn_diff.unsigned_abs() as u32 > self.config.max_sn_jump as u32 {
                return Err(Error::BadPacket("seqnum jump exceeds max_sn_jump"));
            }

            let ts_diff = RtpFields::stream_timestamp_diff(last.stream_timestamp, packet.stream_timestamp);
            let ts_diff_ns = self.spec.stream_timestamp_delta_2_ns(ts_diff);
            if ts_diff_ns.unsigned_abs() > self.config.max_ts_jump_ns as u64 {
                return Err(Error::BadPacket("stream timestamp jump exceeds max_ts_jump"));
            }

            if packet.capture_timestamp < 0 {
                return Err(Error::BadPacket("negative capture timestamp"));
            }
            if packet.capture_timestamp == 0 && last.capture_timestamp != 0 {
                return Err(Error::BadPacket("capture timestamp reset to zero"));
            }
        } else if packet.capture_timestamp < 0 {
            return Err(Error::BadPacket("negative capture timestamp"));
        }

        self.last = Some(packet.clone());
        Ok(())
    }
}
