//! LDPC-Staircase erasure code, replacing the OpenFEC-backed
//! `roc_fec::target_openfec::LDPC_StaircaseBlockEncoder` /
//! `..BlockDecoder` pair. Recovery is probabilistic and
//! scheme-dependent: unlike Reed-Solomon, receiving `k` of
//! `n` symbols does not guarantee recovery — it depends on whether the
//! parity-check graph happens to be solvable for the missing positions.
//!
//! Repair symbols form a staircase: row `i` XORs a pseudo-random window
//! of source symbols together with the *previous* repair symbol
//! (`repair[i-1]`), mirroring OpenFEC's staircase structure. Decoding
//! is exact Gaussian elimination over GF(2) on the resulting sparse
//! parity-check system rather than iterative belief propagation —
//! slower, but it recovers everything the bipartite graph makes
//! recoverable, which is what the decoder's sentinel-on-failure
//! contract requires.

use super::{check_symbol_len, BlockDecoder, BlockEncoder};
use crate::error::{Error, Result};

const SOURCE_DEGREE: usize = 3;

/// Deterministic pseudo-random neighbor set for repair row `i` over `k`
/// source symbols, xorshift-seeded by `(i, k)` so encoder and decoder
/// always agree without exchanging the graph on the wire.
fn neighbors(i: usize, k: usize) -> Vec<usize> {
    let degree = SOURCE_DEGREE.min(k);
    let mut seed = (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (k as u64).wrapping_add(1);
    let mut picked = Vec::with_capacity(degree);
    while picked.len() < degree {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let candidate = (seed % k as u64) as usize;
        if !picked.contains(&candidate) {
            picked.push(candidate);
        }
    }
    picked.sort_unstable();
    picked
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}

pub struct LdpcBlockEncoder {
    k: usize,
    m: usize,
    symbol_len: usize,
    source: Vec<Vec<u8>>,
    repair: Vec<Vec<u8>>,
}

impl LdpcBlockEncoder {
    pub fn new() -> Self {
        Self { k: 0, m: 0, symbol_len: 0, source: Vec::new(), repair: Vec::new() }
    }
}

impl Default for LdpcBlockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockEncoder for LdpcBlockEncoder {
    fn begin_block(&mut self, k: usize, m: usize, symbol_len: usize) -> Result<()> {
        if k == 0 || symbol_len == 0 {
            return Err(Error::BadConfig("ldpc block needs k > 0 and symbol_len > 0"));
        }
        self.k = k;
        self.m = m;
        self.symbol_len = symbol_len;
        self.source = vec![vec![0u8; symbol_len]; k];
        self.repair = vec![vec![0u8; symbol_len]; m];
        Ok(())
    }

    fn set_buffer(&mut self, index: usize, data: &[u8]) -> Result<()> {
        if index >= self.k {
            return Err(Error::BadConfig("source index out of range"));
        }
        check_symbol_len(data, self.symbol_len)?;
        self.source[index].copy_from_slice(&data[..self.symbol_len]);
        Ok(())
    }

    fn fill_buffers(&mut self) -> Result<()> {
        for i in 0..self.m {
            let mut acc = vec![0u8; self.symbol_len];
            for &j in &neighbors(i, self.k) {
                xor_into(&mut acc, &self.source[j]);
            }
            if i > 0 {
                let prev = self.repair[i - 1].clone();
                xor_into(&mut acc, &prev);
            }
            self.repair[i] = acc;
        }
        Ok(())
    }

    fn repair_buffer(&self, index: usize) -> Result<&[u8]> {
        self.repair.get(index).map(|v| v.as_slice()).ok_or(Error::BadConfig("repair index out of range"))
    }

    fn end_block(&mut self) {
        self.source.clear();
        self.repair.clear();
    }
}

/// One staircase parity-check row, as a GF(2) coefficient vector over
/// all `n = k + m` positions (`true` = participates in the XOR), plus
/// a running XOR of the fixed (non-symbol) contribution — always zero
/// here, since every term is a position in `0..n`, but kept symmetric
/// with the encoder's equation form for clarity.
struct Equation {
    coeffs: Vec<bool>,
}

pub struct LdpcBlockDecoder {
    k: usize,
    m: usize,
    symbol_len: usize,
    received: Vec<Option<Vec<u8>>>,
}

impl LdpcBlockDecoder {
    pub fn new() -> Self {
        Self { k: 0, m: 0, symbol_len: 0, received: Vec::new() }
    }

    fn n(&self) -> usize {
        self.k + self.m
    }

    /// Builds the `m` staircase parity-check equations over all `n`
    /// positions: row `i` has coefficient 1 at each source neighbor,
    /// at repair position `k + i`, and at `k + i - 1` when `i > 0`.
    fn equations(&self) -> Vec<Equation> {
        let n = self.n();
        (0..self.m)
            .map(|i| {
                let mut coeffs = vec![false; n];
                for &j in &neighbors(i, self.k) {
                    coeffs[j] = true;
                }
                coeffs[self.k + i] ^= true;
                if i > 0 {
                    coeffs[self.k + i - 1] ^= true;
                }
                Equation { coeffs }
            })
            .collect()
    }

    /// Attempts exact recovery of `source_index` via Gaussian
    /// elimination of the staircase system restricted to the unknown
    /// (unreceived) positions. Returns `None` when the system does not
    /// pin `source_index` down to a unique value from what's known.
    fn solve(&self, source_index: usize) -> Option<Vec<u8>> {
        let n = self.n();
        let unknown_cols: Vec<usize> = (0..n).filter(|&p| self.received[p].is_none()).collect();
        let source_col = unknown_cols.iter().position(|&p| p == source_index)?;

        let mut rows: Vec<Vec<bool>> = Vec::new();
        let mut rhs: Vec<Vec<u8>> = Vec::new();

        for eq in self.equations() {
            let mut row = vec![false; unknown_cols.len()];
            let mut r = vec![0u8; self.symbol_len];
            for (pos, &set) in eq.coeffs.iter().enumerate() {
                if !set {
                    continue;
                }
                match unknown_cols.iter().position(|&p| p == pos) {
                    Some(col) => row[col] = true,
                    None => xor_into(&mut r, self.received[pos].as_ref().expect("known position")),
                }
            }
            rows.push(row);
            rhs.push(r);
        }

        // Gaussian elimination over GF(2), tracking rhs symbol vectors alongside.
        let num_unknowns = unknown_cols.len();
        let mut pivot_row_of_col = vec![None; num_unknowns];
        let mut next_row = 0;
        for col in 0..num_unknowns {
            let Some(pivot) = (next_row..rows.len()).find(|&r| rows[r][col]) else {
                continue;
            };
            rows.swap(next_row, pivot);
            rhs.swap(next_row, pivot);
            let pivot_row = rows[next_row].clone();
            let pivot_rhs = rhs[next_row].clone();
            for r in 0..rows.len() {
                if r != next_row && rows[r][col] {
                    for c in 0..num_unknowns {
                        rows[r][c] ^= pivot_row[c];
                    }
                    xor_into(&mut rhs[r], &pivot_rhs);
                }
            }
            pivot_row_of_col[col] = Some(next_row);
            next_row += 1;
        }

        let row = pivot_row_of_col[source_col]?;
        // A genuine pivot row has exactly one set bit (this column) after
        // full reduction; if more remain, the system under-determines it.
        let degree = rows[row].iter().filter(|&&b| b).count();
        if degree != 1 {
            return None;
        }
        Some(rhs[row].clone())
    }
}

impl Default for LdpcBlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDecoder for LdpcBlockDecoder {
    fn begin_block(&mut self, k: usize, m: usize, symbol_len: usize) -> Result<()> {
        if k == 0 || symbol_len == 0 {
            return Err(Error::BadConfig("ldpc block needs k > 0 and symbol_len > 0"));
        }
        self.k = k;
        self.m = m;
        self.symbol_len = symbol_len;
        self.received = vec![None; k + m];
        Ok(())
    }

    fn set_buffer(&mut self, index: usize, data: &[u8]) -> Result<()> {
        if index >= self.k + self.m {
            return Err(Error::BadConfig("symbol index out of range"));
        }
        check_symbol_len(data, self.symbol_len)?;
        if self.received[index].is_some() {
            return Ok(());
        }
        self.received[index] = Some(data[..self.symbol_len].to_vec());
        Ok(())
    }

    fn num_received(&self) -> usize {
        self.received.iter().filter(|v| v.is_some()).count()
    }

    fn repair(&mut self, source_index: usize) -> Result<Option<Vec<u8>>> {
        if source_index >= self.k {
            return Err(Error::BadConfig("source index out of range"));
        }
        if let Some(data) = &self.received[source_index] {
            return Ok(Some(data.clone()));
        }
        if self.num_received() < self.k {
            return Ok(None);
        }
        Ok(self.solve(source_index))
    }

    fn end_block(&mut self) {
        self.received.clear();
    }
}
