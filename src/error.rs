//! Status/error taxonomy shared by every pipeline stage.
//!
//! Consolidates the two conflicting status enums mentioned in the design
//! notes (a six-code legacy enum vs. a much richer one used by later
//! pipeline code) into one `thiserror` enum covering every observable
//! status named in the wire-format spec. `Ok` has no variant here: a
//! successful operation is `Result::Ok(())` / `Result::Ok(value)`, which
//! is the idiomatic Rust rendering of a status code that is otherwise
//! always zero-cost to check.

use thiserror::Error;

/// Every non-success status a pipeline stage can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// No data available yet (e.g. a bounded queue read that would block).
    #[error("no data available")]
    NoData,

    /// A stage has been fully drained and will never produce more data.
    #[error("drained")]
    Drain,

    /// A fixed-capacity buffer or pool has no room left.
    #[error("no space available")]
    NoSpace,

    /// Operation forbidden because a configured limit was exceeded.
    #[error("limit exceeded")]
    Limit,

    /// Malformed packet: failed header validation, truncated payload, or
    /// length not a multiple of the codec's symbol alignment.
    #[error("bad format: {0}")]
    BadFormat(&'static str),

    /// Alias of `BadFormat` used at FEC block boundaries, kept as a
    /// separate observable code from `BadFormat`.
    #[error("bad packet: {0}")]
    BadPacket(&'static str),

    /// Invalid configuration supplied at construction time.
    #[error("bad configuration: {0}")]
    BadConfig(&'static str),

    /// A fixed-size pool or allocator could not satisfy a request.
    #[error("out of memory")]
    OutOfMemory,

    /// The platform RNG failed (SSRC/seqnum generation).
    #[error("random number generation failed")]
    ErrRand,

    /// Terminal status: the stage (or session) is done and must be torn
    /// down. Never legal as the return value of a frame write.
    #[error("finished")]
    Finish,

    /// No route matched an outbound packet, or no session matched an
    /// inbound one and none could be created.
    #[error("no route")]
    NoRoute,

    /// Partial progress was made; caller should retry. Never legal as
    /// the return value of a frame write.
    #[error("partial")]
    Part,

    /// A block or operation was aborted and its state reset.
    #[error("aborted: {0}")]
    Abort(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for the two codes that are never legal as a frame-write outcome.
    pub fn is_illegal_frame_write_result(&self) -> bool {
        matches!(self, Error::Part | Error::Drain)
    }
}
