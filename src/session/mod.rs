//! Session & pipeline assembler (C18): builds the sender/receiver
//! chains from `SessionConfig`, enforces symmetric teardown, and
//! tracks the three-tier failure semantics of spec §4.16/§7.

pub mod receiver;
pub mod sender;

use std::time::{Duration, Instant};

use crate::error::Error;

pub use receiver::ReceiverSession;
pub use sender::SenderSession;

/// A session's lifecycle status. Once `Terminated`, every pipeline
/// operation short-circuits to return the remembered error instead of
/// touching any stage again (spec §4.16 tier 2 failure semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Terminated(Error),
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

/// Tracks "time since last valid packet" and "time since last
/// non-silent frame"; exceeding either terminates the session (spec
/// §5's cancellation/timeout model).
pub struct Watchdog {
    no_packets_timeout: Duration,
    choppy_playback_timeout: Duration,
    last_valid_packet: Option<Instant>,
    last_non_silent_frame: Option<Instant>,
}

impl Watchdog {
    pub fn new(no_packets_timeout: Duration, choppy_playback_timeout: Duration) -> Self {
        Self {
            no_packets_timeout,
            choppy_playback_timeout,
            last_valid_packet: None,
            last_non_silent_frame: None,
        }
    }

    pub fn note_valid_packet(&mut self, now: Instant) {
        self.last_valid_packet = Some(now);
    }

    pub fn note_frame(&mut self, now: Instant, non_silent: bool) {
        if non_silent {
            self.last_non_silent_frame = Some(now);
        }
    }

    /// True once either timeout has elapsed since session start without
    /// the corresponding event ever being noted, or since it was last
    /// noted.
    pub fn expired(&self, now: Instant, session_start: Instant) -> bool {
        let since_packet = self.last_valid_packet.unwrap_or(session_start);
        let since_frame = self.last_non_silent_frame.unwrap_or(session_start);
        now.duration_since(since_packet) >= self.no_packets_timeout
            || now.duration_since(since_frame) >= self.choppy_playback_timeout
    }
}
