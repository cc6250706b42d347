//! Systematic Reed-Solomon erasure code over GF(2^8), replacing the
//! OpenFEC-backed `roc_fec::target_openfec::OF_BlockEncoder` /
//! `OF_BlockDecoder` pair. Uses a Cauchy generator matrix,
//! which guarantees every square submatrix is invertible — any `k` of
//! the `n = k + m` symbols suffice to recover the rest.

use super::{check_symbol_len, gf256::Tables, BlockDecoder, BlockEncoder};
use crate::error::{Error, Result};

/// `matrix[row][col]`, row-major, `rows x cols` GF(256) matrix.
#[derive(Clone)]
struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl Matrix {
    fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0; rows * cols] }
    }

    fn get(&self, r: usize, c: usize) -> u8 {
        self.data[r * self.cols + c]
    }

    fn set(&mut self, r: usize, c: usize, v: u8) {
        self.data[r * self.cols + c] = v;
    }

    /// Cauchy generator matrix: `k` source rows (identity) followed by
    /// `m` repair rows where `matrix[k+i][j] = 1 / (x_i XOR y_j)`,
    /// `x_i = k + i`, `y_j = j`. Since `x_i >= k > y_j` for all valid
    /// `i, j`, no `x_i XOR y_j` is ever zero.
    fn generator(t: &Tables, k: usize, m: usize) -> Self {
        let mut mat = Matrix::zeros(k + m, k);
        for j in 0..k {
            mat.set(j, j, 1);
        }
        for i in 0..m {
            let x = (k + i) as u8;
            for j in 0..k {
                let y = j as u8;
                mat.set(k + i, j, t.inv(x ^ y));
            }
        }
        mat
    }

    /// Inverts a square `k x k` submatrix built from `row_indices`
    /// (rows of the generator matrix corresponding to the symbols we
    /// actually received) via Gauss-Jordan elimination over GF(256).
    fn invert_submatrix(t: &Tables, generator: &Matrix, row_indices: &[usize]) -> Result<Matrix> {
        let k = generator.cols;
        debug_assert_eq!(row_indices.len(), k);

        // augmented [sub | identity]
        let mut aug = Matrix::zeros(k, 2 * k);
        for (r, &gi) in row_indices.iter().enumerate() {
            for c in 0..k {
                aug.set(r, c, generator.get(gi, c));
            }
            aug.set(r, k + r, 1);
        }

        for col in 0..k {
            let mut pivot = None;
            for r in col..k {
                if aug.get(r, col) != 0 {
                    pivot = Some(r);
                    break;
                }
            }
            let pivot = pivot.ok_or(Error::Abort("reed-solomon: singular recovery matrix"))?;
            if pivot != col {
                for c in 0..2 * k {
                    let tmp = aug.get(pivot, c);
                    aug.set(pivot, c, aug.get(col, c));
                    aug.set(col, c, tmp);
                }
            }
            let inv = t.inv(aug.get(col, col));
            for c in 0..2 * k {
                let v = t.mul(aug.get(col, c), inv);
                aug.set(col, c, v);
            }
            for r in 0..k {
                if r == col {
                    continue;
                }
                let factor = aug.get(r, col);
                if factor == 0 {
                    continue;
                }
                for c in 0..2 * k {
                    let v = aug.get(r, c) ^ t.mul(factor, aug.get(col, c));
                    aug.set(r, c, v);
                }
            }
        }

        let mut inv = Matrix::zeros(k, k);
        for r in 0..k {
            for c in 0..k {
                inv.set(r, c, aug.get(r, k + c));
            }
        }
        Ok(inv)
    }
}

pub struct RsBlockEncoder {
    t: Tables,
    k: usize,
    m: usize,
    symbol_len: usize,
    source: Vec<Vec<u8>>,
    repair: Vec<Vec<u8>>,
    generator: Option<Matrix>,
}

impl RsBlockEncoder {
    pub fn new() -> Self {
        Self {
            t: Tables::new(),
            k: 0,
            m: 0,
            symbol_len: 0,
            source: Vec::new(),
            repair: Vec::new(),
            generator: None,
        }
    }
}

impl Default for RsBlockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockEncoder for RsBlockEncoder {
    fn begin_block(&mut self, k: usize, m: usize, symbol_len: usize) -> Result<()> {
        if k == 0 || symbol_len == 0 {
            return Err(Error::BadConfig("reed-solomon block needs k > 0 and symbol_len > 0"));
        }
        self.k = k;
        self.m = m;
        self.symbol_len = symbol_len;
        self.source = vec![vec![0u8; symbol_len]; k];
        self.repair = vec![vec![0u8; symbol_len]; m];
        self.generator = Some(Matrix::generator(&self.t, k, m));
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
        let generator = self.generator.as_ref().ok_or(Error::BadConfig("begin_block not called"))?;
        for i in 0..self.m {
            let row = self.k + i;
            for byte in 0..self.symbol_len {
                let mut acc = 0u8;
                for j in 0..self.k {
                    acc ^= self.t.mul(generator.get(row, j), self.source[j][byte]);
                }
                self.repair[i][byte] = acc;
            }
        }
        Ok(())
    }

    fn repair_buffer(&self, index: usize) -> Result<&[u8]> {
        self.repair.get(index).map(|v| v.as_slice()).ok_or(Error::BadConfig("repair index out of range"))
    }

    fn end_block(&mut self) {
        self.source.clear();
        self.repair.clear();
        self.generator = None;
    }
}

pub struct RsBlockDecoder {
    t: Tables,
    k: usize,
    m: usize,
    symbol_len: usize,
    generator: Option<Matrix>,
    /// Received symbol at each of the `n` slots, if any.
    received: Vec<Option<Vec<u8>>>,
    /// Cached inverse once we first have >= k symbols.
    cached_inverse: Option<(Vec<usize>, Matrix)>,
}

impl RsBlockDecoder {
    pub fn new() -> Self {
        Self {
            t: Tables::new(),
            k: 0,
            m: 0,
            symbol_len: 0,
            generator: None,
            received: Vec::new(),
            cached_inverse: None,
        }
    }

    fn received_row_indices(&self) -> Vec<usize> {
        self.received
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|_| i))
            .collect()
    }
}

impl Default for RsBlockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDecoder for RsBlockDecoder {
    fn begin_block(&mut self, k: usize, m: usize, symbol_len: usize) -> Result<()> {
        if k == 0 || symbol_len == 0 {
            return Err(Error::BadConfig("reed-solomon block needs k > 0 and symbol_len > 0"));
        }
        self.k = k;
        self.m = m;
        self.symbol_len = symbol_len;
        self.generator = Some(Matrix::generator(&self.t, k, m));
        self.received = vec![None; k + m];
        self.cached_inverse = None;
        Ok(())
    }

    fn set_buffer(&mut self, index: usize, data: &[u8]) -> Result<()> {
        if index >= self.k + self.m {
            return Err(Error::BadConfig("symbol index out of range"));
        }
        check_symbol_len(data, self.symbol_len)?;
        if self.received[index].is_some() {
            // Duplicate write: later write ignored.
            return Ok(());
        }
        self.received[index] = Some(data[..self.symbol_len].to_vec());
        self.cached_inverse = None;
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

        let generator = self.generator.as_ref().ok_or(Error::BadConfig("begin_block not called"))?;

        if self.cached_inverse.as_ref().map(|(rows, _)| rows.len()) != Some(self.k) {
            let rows: Vec<usize> = self.received_row_indices().into_iter().take(self.k).collect();
            let inv = Matrix::invert_submatrix(&self.t, generator, &rows)?;
            self.cached_inverse = Some((rows, inv));
        }
        let (rows, inv) = self.cached_inverse.as_ref().expect("just populated");

        let mut out = vec![0u8; self.symbol_len];
        for byte in 0..self.symbol_len {
            let mut acc = 0u8;
            for (col, &row) in rows.iter().enumerate() {
                let value = self.received[row].as_ref().expect("row is received")[byte];
                acc ^= self.t.mul(inv.get(source_index, col), value);
            }
            out[byte] = acc;
        }
        Ok(Some(out))
    }

    fn end_block(&mut self) {
        self.received.clear();
        self.generator = None;
        self.cached_inverse = None;
    }
}
