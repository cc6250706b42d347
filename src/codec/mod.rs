//! Polymorphic block erasure codec: Reed-Solomon GF(2^8) and
//! LDPC-Staircase schemes behind one trait pair, matching
//! `roc_fec::IBlockEncoder` / `IBlockDecoder`'s write/commit/read/reset
//! lifecycle.

pub mod gf256;
pub mod ldpc;
pub mod reed_solomon;

use crate::error::{Error, Result};
use crate::packet::FecScheme;

/// Produces `m` repair symbols from `k` source symbols of equal length.
pub trait BlockEncoder: Send {
    /// Starts a new block with `k` source symbols, `m` repair symbols,
    /// each of length `symbol_len` bytes.
    fn begin_block(&mut self, k: usize, m: usize, symbol_len: usize) -> Result<()>;

    /// Stores a source symbol at `index` (`< k`).
    fn set_buffer(&mut self, index: usize, data: &[u8]) -> Result<()>;

    /// Computes the `m` repair symbols from the stored source symbols.
    fn fill_buffers(&mut self) -> Result<()>;

    /// Reads back a repair symbol; `index` is relative to the repair
    /// range, i.e. in `[0, m)`, corresponding to source-packet indices
    /// `[k, k+m)`.
    fn repair_buffer(&self, index: usize) -> Result<&[u8]>;

    /// Releases any scheme-specific state.
    fn end_block(&mut self);
}

/// Accepts any subset of a block's `n = k + m` symbols and attempts to
/// recover missing source symbols.
pub trait BlockDecoder: Send {
    fn begin_block(&mut self, k: usize, m: usize, symbol_len: usize) -> Result<()>;

    /// Stores a received symbol (source or repair) at its `encoding_symbol_id`
    /// (`< n`). Returns `BadPacket` if `data` is shorter than `symbol_len`.
    fn set_buffer(&mut self, index: usize, data: &[u8]) -> Result<()>;

    /// Number of symbols received so far this block.
    fn num_received(&self) -> usize;

    /// Attempts to recover the source symbol at `source_index` (`< k`).
    /// Returns `Ok(None)` (the "sentinel", not an error) if the
    /// scheme's recovery condition does not hold yet.
    fn repair(&mut self, source_index: usize) -> Result<Option<Vec<u8>>>;

    fn end_block(&mut self);
}

/// Builds encoder/decoder pairs for a scheme. Schemes are values, not
/// types, so adding one never requires a new generic parameter.
pub fn new_encoder(scheme: FecScheme) -> Box<dyn BlockEncoder> {
    match scheme {
        FecScheme::ReedSolomon8 => Box::new(reed_solomon::RsBlockEncoder::new()),
        FecScheme::LdpcStaircase => Box::new(ldpc::LdpcBlockEncoder::new()),
    }
}

pub fn new_decoder(scheme: FecScheme) -> Box<dyn BlockDecoder> {
    match scheme {
        FecScheme::ReedSolomon8 => Box::new(reed_solomon::RsBlockDecoder::new()),
        FecScheme::LdpcStaircase => Box::new(ldpc::LdpcBlockDecoder::new()),
    }
}

/// Symbol alignment both schemes require; payload length must be a
/// multiple of this. The composer's `align` step upstream is
/// responsible for padding to it.
pub const SYMBOL_ALIGNMENT: usize = 1;

pub(crate) fn check_symbol_len(data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(Error::BadPacket("symbol shorter than block's declared length"));
    }
    Ok(())
}
