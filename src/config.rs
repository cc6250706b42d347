//! Session configuration: loaded from TOML via the same "check a few
//! well-known paths, fall back to `Default`" pattern `ServerConfig::load`
//! uses, covering every knob the pipeline assembler needs at
//! construction time.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::packet::FecScheme;

/// FEC block shape and scheme, `None` to disable erasure coding
/// entirely — scheme is a value, not a type, so absence is just
/// another value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FecConfig {
    #[serde(default = "default_fec_scheme")]
    pub scheme: FecScheme,
    #[serde(default = "default_fec_k")]
    pub k: usize,
    #[serde(default = "default_fec_m")]
    pub m: usize,
    /// Interleaver window size, in packets; `1` disables interleaving.
    #[serde(default = "default_interleaver_window")]
    pub interleaver_window: usize,
}

impl Default for FecConfig {
    fn default() -> Self {
        Self {
            scheme: default_fec_scheme(),
            k: default_fec_k(),
            m: default_fec_m(),
            interleaver_window: default_interleaver_window(),
        }
    }
}

/// Per-session pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Validator: max accepted `|Δseqnum|` between consecutive packets.
    #[serde(default = "default_max_sn_jump")]
    pub max_sn_jump: u16,

    /// Validator: max accepted stream-timestamp jump, in nanoseconds.
    #[serde(default = "default_max_ts_jump_ns")]
    pub max_ts_jump: i64,

    /// Delayer: target queue span before releasing packets, in samples
    /// per channel.
    #[serde(default = "default_latency")]
    pub latency: u64,

    /// Frequency estimator: target queue depth, in samples per channel.
    #[serde(default = "default_aim_queue_size")]
    pub aim_queue_size: u64,

    /// `None` disables FEC for this session.
    #[serde(default)]
    pub fec: Option<FecConfig>,

    /// Packetizer packet duration, in nanoseconds.
    #[serde(default = "default_packet_length_ns")]
    pub packet_length_ns: u64,

    /// Session router: total session cap across this process.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Watchdog: session terminates after this many milliseconds
    /// without a single valid packet.
    #[serde(default = "default_no_packets_timeout_ms")]
    pub no_packets_timeout_ms: u64,

    /// Watchdog: session terminates after this many milliseconds
    /// without a non-silent frame.
    #[serde(default = "default_choppy_playback_timeout_ms")]
    pub choppy_playback_timeout_ms: u64,
}

fn default_fec_scheme() -> FecScheme {
    FecScheme::ReedSolomon8
}
fn default_fec_k() -> usize {
    20
}
fn default_fec_m() -> usize {
    10
}
fn default_interleaver_window() -> usize {
    1
}
fn default_max_sn_jump() -> u16 {
    32768
}
fn default_max_ts_jump_ns() -> i64 {
    1_000_000_000
}
fn default_latency() -> u64 {
    4410
}
fn default_aim_queue_size() -> u64 {
    4410
}
fn default_packet_length_ns() -> u64 {
    10_000_000
}
fn default_max_sessions() -> usize {
    64
}
fn default_no_packets_timeout_ms() -> u64 {
    2000
}
fn default_choppy_playback_timeout_ms() -> u64 {
    2000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sn_jump: default_max_sn_jump(),
            max_ts_jump: default_max_ts_jump_ns(),
            latency: default_latency(),
            aim_queue_size: default_aim_queue_size(),
            fec: Some(FecConfig::default()),
            packet_length_ns: default_packet_length_ns(),
            max_sessions: default_max_sessions(),
            no_packets_timeout_ms: default_no_packets_timeout_ms(),
            choppy_playback_timeout_ms: default_choppy_playback_timeout_ms(),
        }
    }
}

impl SessionConfig {
    /// Checks a few well-known paths in order, falling back to
    /// `Default` with a logged warning if none exist.
    pub fn load() -> Result<Self> {
        let config_paths = ["auristream.toml", "/etc/auristream/config.toml", "~/.config/auristream/config.toml"];

        for path in config_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                return Self::load_from_file(expanded_path.as_ref());
            }
        }

        tracing::warn!("no auristream.toml found, using default session configuration");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| format!("could not read {}", path))?;
        let config: SessionConfig = toml::from_str(&content).with_context(|| format!("could not parse {}", path))?;
        tracing::info!(path, "loaded session configuration");
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("could not serialize session configuration")?;
        std::fs::write(path, content).with_context(|| format!("could not write {}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = SessionConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: SessionConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.max_sn_jump, config.max_sn_jump);
        assert_eq!(parsed.latency, config.latency);
        assert!(parsed.fec.is_some());
    }

    #[test]
    fn omitting_fec_key_disables_it() {
        let config: SessionConfig = toml::from_str("max_sn_jump = 100\n").unwrap();
        assert!(config.fec.is_none());
        assert_eq!(config.max_sn_jump, 100);
    }
}
