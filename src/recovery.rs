//! Per-recovery decode-matrix synthesis: given a set of alive blocks and a
//! set of failed blocks, builds the matrix that reconstructs the failed
//! blocks from the alive ones.
//!
//! Select the alive-row submatrix, invert it, and for each failed index take
//! either the corresponding inverse row (data failure) or the original
//! parity row multiplied through the inverse (parity failure).

use crate::error::{ParityError, Result};
use crate::matrix::Matrix;

/// A synthesized decode matrix plus the ordered alive/failed index lists it
/// was built from. `rows()` of the matrix align with `failed`, `cols()`
/// align with `alive`.
pub struct DecodeMatrix {
    pub alive: Vec<usize>,
    pub failed: Vec<usize>,
    pub matrix: Matrix,
}

/// Builds the decode matrix mapping the `alive` blocks (exactly `n` of them,
/// given in ascending index order) to the `failed` blocks (up to `k` of
/// them), from the systematic encoding matrix `encode_matrix` of shape
/// `(n+k) x n`.
pub fn build_decode_matrix(
    encode_matrix: &Matrix,
    n: usize,
    alive: &[usize],
    failed: &[usize],
) -> Result<DecodeMatrix> {
    if alive.len() != n {
        return Err(ParityError::invalid_arguments(format!(
            "expected exactly {n} alive blocks to synthesize a decode matrix, got {}",
            alive.len()
        )));
    }
    let t = encode_matrix.select_rows(alive);
    let t_inv = t.invert().map_err(|_| ParityError::SingularMatrix)?;

    let mut out = Matrix::zeros(failed.len(), n);
    for (r, &f) in failed.iter().enumerate() {
        if f < n {
            out_row_copy(&mut out, r, t_inv.row(f));
        } else {
            // Parity failure: row = E[f] * T^-1.
            let e_row = encode_matrix.row(f);
            for c in 0..n {
                let mut acc = 0u8;
                for i in 0..n {
                    acc = crate::gf::add(acc, crate::gf::mul(e_row[i], t_inv.get(i, c)));
                }
                out.set(r, c, acc);
            }
        }
    }
    Ok(DecodeMatrix { alive: alive.to_vec(), failed: failed.to_vec(), matrix: out })
}

fn out_row_copy(out: &mut Matrix, r: usize, src: &[u8]) {
    for (c, &v) in src.iter().enumerate() {
        out.set(r, c, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_failure_row_equals_inverse_row() {
        let mut v = Matrix::vandermonde(4, 2);
        v.normalize_systematic(4).unwrap();
        let alive = vec![0, 1, 3, 4];
        let failed = vec![2];
        let dm = build_decode_matrix(&v, 4, &alive, &failed).unwrap();
        let t = v.select_rows(&alive);
        let t_inv = t.invert().unwrap();
        assert_eq!(dm.matrix.row(0), t_inv.row(2));
    }

    #[test]
    fn rejects_wrong_alive_count() {
        let mut v = Matrix::vandermonde(4, 2);
        v.normalize_systematic(4).unwrap();
        let err = build_decode_matrix(&v, 4, &[0, 1, 2], &[4]).unwrap_err();
        assert!(matches!(err, ParityError::InvalidArguments(_)));
    }
}
