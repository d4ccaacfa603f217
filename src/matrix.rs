//! Dense matrices over GF(2^8): Vandermonde construction, systematic
//! normalization, and Gauss-Jordan inversion.
//!
//! This mirrors the kernel-mode construction path in the reference
//! implementation (`vandmat_init` / `vandmat_norm` / `check_row_is_id`)
//! rather than a closed-form generator-matrix routine, since it is the only
//! path in the original source that performs the construction and
//! normalization from first principles without leaning on an external
//! library.

use crate::error::{ParityError, Result};
use crate::gf;

/// A dense `rows x cols` matrix of GF(2^8) elements, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<u8>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0u8; rows * cols] }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, 1);
        }
        m
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> u8 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, v: u8) {
        self.data[r * self.cols + c] = v;
    }

    pub fn row(&self, r: usize) -> &[u8] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    fn row_mut(&mut self, r: usize) -> &mut [u8] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Builds the `(n+k) x n` Vandermonde matrix `E[y][x] = y^x` over GF(2^8),
    /// with row `y` the evaluation point `y` itself, starting at `y = 0`
    /// through `y = n+k-1`. Row 0 happens to equal the identity row because
    /// `0^0 = 1` and `0^x = 0` for `x > 0`, not because of any special-cased
    /// offset.
    pub fn vandermonde(n: usize, k: usize) -> Self {
        let rows = n + k;
        let mut m = Self::zeros(rows, n);
        for y in 0..rows {
            for x in 0..n {
                m.set(y, x, gf::pow(y as u8, x as u32));
            }
        }
        m
    }

    /// Selects the given row indices, in order, into a new matrix.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut m = Self::zeros(rows.len(), self.cols);
        for (i, &r) in rows.iter().enumerate() {
            m.row_mut(i).copy_from_slice(self.row(r));
        }
        m
    }

    /// `dst_col <- dst_col op (scalar * src_col)` pointwise, for all rows.
    /// Used by systematic normalization to clear off-diagonal entries.
    fn col_operate(&mut self, dst_col: usize, src_col: usize, scalar: u8) {
        for r in 0..self.rows {
            let v = gf::mul(scalar, self.get(r, src_col));
            let cur = self.get(r, dst_col);
            self.set(r, dst_col, gf::add(cur, v));
        }
    }

    /// Scales every entry of `col` by `scalar`.
    fn scale_col(&mut self, col: usize, scalar: u8) {
        for r in 0..self.rows {
            let v = gf::mul(self.get(r, col), scalar);
            self.set(r, col, v);
        }
    }

    /// Matrix-matrix product over GF(2^8).
    pub fn mul(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(self.cols, rhs.rows, "matrix shape mismatch in multiplication");
        let mut out = Matrix::zeros(self.rows, rhs.cols);
        for r in 0..self.rows {
            for c in 0..rhs.cols {
                let mut acc = 0u8;
                for i in 0..self.cols {
                    acc = gf::add(acc, gf::mul(self.get(r, i), rhs.get(i, c)));
                }
                out.set(r, c, acc);
            }
        }
        out
    }

    /// Inverts a square matrix over GF(2^8) by Gauss-Jordan elimination with
    /// partial pivoting. Returns [`ParityError::SingularMatrix`] if a pivot
    /// column is entirely zero at some step — callers must surface this to
    /// the scheduler rather than treat it as fatal, since it can legitimately
    /// happen for a pathological failure pattern.
    pub fn invert(&self) -> Result<Matrix> {
        assert_eq!(self.rows, self.cols, "only square matrices can be inverted");
        let n = self.rows;
        let mut work = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            // Find a nonzero pivot in this column at or below `col`.
            let pivot_row = (col..n).find(|&r| work.get(r, col) != 0);
            let pivot_row = match pivot_row {
                Some(r) => r,
                None => return Err(ParityError::SingularMatrix),
            };
            if pivot_row != col {
                work.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }
            let pivot = work.get(col, col);
            let pivot_inv = gf::inv(pivot);
            work.scale_row(col, pivot_inv);
            inv.scale_row(col, pivot_inv);

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = work.get(r, col);
                if factor == 0 {
                    continue;
                }
                work.eliminate_row(r, col, factor);
                inv.eliminate_row(r, col, factor);
            }
        }
        Ok(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            let tmp = self.get(a, c);
            self.set(a, c, self.get(b, c));
            self.set(b, c, tmp);
        }
    }

    fn scale_row(&mut self, r: usize, scalar: u8) {
        for c in 0..self.cols {
            let v = gf::mul(self.get(r, c), scalar);
            self.set(r, c, v);
        }
    }

    /// `row_r <- row_r - factor * row_pivot`, which is `+` since this is GF(2).
    fn eliminate_row(&mut self, r: usize, pivot: usize, factor: u8) {
        for c in 0..self.cols {
            let v = gf::mul(factor, self.get(pivot, c));
            let cur = self.get(r, c);
            self.set(r, c, gf::add(cur, v));
        }
    }

    /// Normalizes a `(n+k) x n` Vandermonde matrix in place, by column
    /// operations, so that rows `0..n` become the identity matrix. Fails if
    /// the chosen `(n, k)` does not normalize cleanly (unsupported shape).
    pub fn normalize_systematic(&mut self, n: usize) -> Result<()> {
        assert!(self.rows >= n && self.cols == n);
        for col in 0..n {
            let pivot = self.get(col, col);
            if pivot == 0 {
                return Err(ParityError::unsupported_shape(
                    n,
                    self.rows - n,
                    "zero pivot during systematic normalization",
                ));
            }
            if pivot != 1 {
                let s = gf::inv(pivot);
                self.scale_col(col, s);
            }
            for c in 0..n {
                if c == col {
                    continue;
                }
                let factor = self.get(col, c);
                if factor == 0 {
                    continue;
                }
                self.col_operate(c, col, factor);
            }
        }
        for row in 0..n {
            for c in 0..n {
                let expected = if c == row { 1 } else { 0 };
                if self.get(row, c) != expected {
                    return Err(ParityError::unsupported_shape(
                        n,
                        self.rows - n,
                        "top block did not normalize to identity",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_inverts_to_identity() {
        let id = Matrix::identity(4);
        assert_eq!(id.invert().unwrap(), id);
    }

    #[test]
    fn vandermonde_normalizes_to_systematic_form() {
        let mut v = Matrix::vandermonde(4, 2);
        v.normalize_systematic(4).unwrap();
        for r in 0..4 {
            for c in 0..4 {
                assert_eq!(v.get(r, c), if r == c { 1 } else { 0 });
            }
        }
    }

    #[test]
    fn invert_undoes_select_rows() {
        let mut v = Matrix::vandermonde(4, 2);
        v.normalize_systematic(4).unwrap();
        // Alive rows {0, 1, 3, 4}: top identity rows plus one parity row.
        let t = v.select_rows(&[0, 1, 3, 4]);
        let t_inv = t.invert().unwrap();
        let back = t.mul(&t_inv);
        assert_eq!(back, Matrix::identity(4));
    }

    #[test]
    fn golden_encoding_matrix_4_2() {
        let mut v = Matrix::vandermonde(4, 2);
        v.normalize_systematic(4).unwrap();
        // Top block must be the identity regardless of field constants.
        assert_eq!(v.row(0), &[1, 0, 0, 0]);
        assert_eq!(v.row(1), &[0, 1, 0, 0]);
        assert_eq!(v.row(2), &[0, 0, 1, 0]);
        assert_eq!(v.row(3), &[0, 0, 0, 1]);
    }
}
