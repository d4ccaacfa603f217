//! The public façade: `calculate`, `diff`, `refine`, and `recover`,
//! dispatched by algorithm tag (XOR when `K=1`, Reed-Solomon otherwise).
//!
//! Constructor preconditions, the `diff` delta law, and the decode-matrix
//! survivor-selection rule (first `N` non-erased indices, ascending) follow
//! the same shape as other erasure-coding engines in this family; the actual
//! encode/decode arithmetic is pure Rust, backed by [`crate::kernel`] and
//! [`crate::recovery`] rather than an external SIMD library.

use crate::error::{ParityError, Result};
use crate::kernel;
use crate::matrix::Matrix;
use crate::recovery::{self, DecodeMatrix};

/// Maximum supported number of data blocks, bounded by the 8-bit field
/// (`N <= 2^(W-1)` with `W = 8`, matching the reference implementation's
/// `SNS_PARITY_MATH_MAX_K` style limit).
pub const MAX_N: usize = 128;

/// Recovery strategy: synthesize-and-solve per call, or reuse a
/// precomputed plan from [`MathContext::recov_mat_gen`].
#[derive(Debug, Clone, Copy)]
pub enum RecoverAlgo<'p> {
    /// Build the decode matrix fresh for this call's failure pattern.
    Gaussian,
    /// Reuse a [`RecoveryPlan`] built ahead of time by [`MathContext::recov_mat_gen`].
    /// The plan's failure pattern must match `fails` exactly, or `recover`
    /// returns [`ParityError::InvalidArguments`].
    Inverse(&'p RecoveryPlan),
}

/// A precomputed decode matrix for a fixed failure pattern, for callers that
/// will decode the same pattern repeatedly (e.g. a scrub pass with one
/// failed device).
pub struct RecoveryPlan {
    decode: DecodeMatrix,
}

/// Immutable per-stripe-shape context. Either the XOR fast path (`K=1`) or a
/// full Reed-Solomon context carrying the systematic encoding matrix.
pub enum MathContext {
    Xor { n: usize },
    ReedSolomon { n: usize, k: usize, encode_matrix: Matrix },
}

impl MathContext {
    /// Builds a context for `n` data blocks and `k` parity blocks.
    /// Preconditions: `1 <= k <= n <= 128`.
    pub fn new(n: usize, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(ParityError::invalid_arguments("k must be at least 1"));
        }
        if k > n {
            return Err(ParityError::invalid_arguments(format!(
                "k ({k}) must not exceed n ({n})"
            )));
        }
        if n > MAX_N {
            return Err(ParityError::invalid_arguments(format!(
                "n ({n}) exceeds the maximum supported value {MAX_N}"
            )));
        }
        if k == 1 {
            return Ok(MathContext::Xor { n });
        }
        let mut encode_matrix = Matrix::vandermonde(n, k);
        encode_matrix.normalize_systematic(n)?;
        Ok(MathContext::ReedSolomon { n, k, encode_matrix })
    }

    pub fn n(&self) -> usize {
        match self {
            MathContext::Xor { n } => *n,
            MathContext::ReedSolomon { n, .. } => *n,
        }
    }

    pub fn k(&self) -> usize {
        match self {
            MathContext::Xor { .. } => 1,
            MathContext::ReedSolomon { k, .. } => *k,
        }
    }

    /// Reference to the systematic encoding matrix. `None` for the XOR path,
    /// which has no matrix (its single parity row is the implicit all-ones
    /// vector).
    pub fn encode_matrix(&self) -> Option<&Matrix> {
        match self {
            MathContext::Xor { .. } => None,
            MathContext::ReedSolomon { encode_matrix, .. } => Some(encode_matrix),
        }
    }

    fn check_data_parity_shapes(&self, data: &[&[u8]], parity: &[&[u8]]) -> Result<()> {
        if data.len() != self.n() {
            return Err(ParityError::invalid_arguments(format!(
                "expected {} data blocks, got {}",
                self.n(),
                data.len()
            )));
        }
        if parity.len() != self.k() {
            return Err(ParityError::invalid_arguments(format!(
                "expected {} parity blocks, got {}",
                self.k(),
                parity.len()
            )));
        }
        let len = data.first().map_or(0, |b| b.len());
        if data.iter().any(|b| b.len() != len) || parity.iter().any(|b| b.len() != len) {
            return Err(ParityError::invalid_arguments(
                "all data and parity blocks must share one length",
            ));
        }
        Ok(())
    }

    /// Produces parity from data.
    pub fn calculate(&self, data: &[&[u8]], parity: &mut [&mut [u8]]) -> Result<()> {
        let ro: Vec<&[u8]> = parity.iter().map(|b| &**b).collect();
        self.check_data_parity_shapes(data, &ro)?;
        match self {
            MathContext::Xor { .. } => {
                parity[0].fill(0);
                kernel::xor_accumulate(parity[0], data);
            }
            MathContext::ReedSolomon { n, k, encode_matrix } => {
                let p = encode_matrix.select_rows(&(*n..*n + *k).collect::<Vec<_>>());
                kernel::encode(&p, data, parity);
            }
        }
        Ok(())
    }

    /// Updates `parity` in place for a single data-block change at `idx`.
    /// `old` and `new` must have equal length to each other and to `parity`'s
    /// blocks.
    pub fn diff(
        &self,
        old: &[u8],
        new: &[u8],
        parity: &mut [&mut [u8]],
        idx: usize,
    ) -> Result<()> {
        if idx >= self.n() {
            return Err(ParityError::invalid_arguments(format!(
                "index {idx} is out of range, n = {}",
                self.n()
            )));
        }
        if old.len() != new.len() {
            return Err(ParityError::invalid_arguments(
                "old and new data blocks must share one length",
            ));
        }
        if parity.len() != self.k() || parity.iter().any(|b| b.len() != old.len()) {
            return Err(ParityError::invalid_arguments(
                "parity blocks must match k and the data block length",
            ));
        }
        match self {
            MathContext::Xor { .. } => {
                for (p, (&o, &n)) in parity[0].iter_mut().zip(old.iter().zip(new)) {
                    *p ^= o ^ n;
                }
            }
            MathContext::ReedSolomon { n, encode_matrix, .. } => {
                let delta: Vec<u8> = old.iter().zip(new).map(|(&o, &nn)| o ^ nn).collect();
                for (r, p) in parity.iter_mut().enumerate() {
                    let coef = encode_matrix.get(*n + r, idx);
                    if coef == 0 {
                        continue;
                    }
                    kernel::gfaxpy(p, &delta, coef);
                }
            }
        }
        Ok(())
    }

    /// Refreshes `parity` for a change at `changed_idx`, by full recompute
    /// from `data`. Semantically equivalent to `calculate`; unlike `diff`, it
    /// does not exploit the single-index delta, so it is only worth using
    /// over `diff` when the caller already needs `data` read back in full
    /// for some other reason.
    pub fn refine(
        &self,
        data: &[&[u8]],
        parity: &mut [&mut [u8]],
        changed_idx: usize,
    ) -> Result<()> {
        if changed_idx >= self.n() {
            return Err(ParityError::invalid_arguments(format!(
                "index {changed_idx} is out of range, n = {}",
                self.n()
            )));
        }
        self.calculate(data, parity)
    }

    /// Reconstructs every block marked failed in `fails` (length `n+k`,
    /// nonzero at failed positions). `data` and `parity` blocks at failed
    /// positions are overwritten; survivor blocks are untouched.
    pub fn recover(
        &self,
        data: &mut [&mut [u8]],
        parity: &mut [&mut [u8]],
        fails: &[u8],
        algo: RecoverAlgo<'_>,
    ) -> Result<()> {
        let n = self.n();
        let k = self.k();
        if fails.len() != n + k {
            return Err(ParityError::invalid_arguments(format!(
                "fails vector must have length n+k = {}",
                n + k
            )));
        }
        let failed: Vec<usize> = fails.iter().enumerate().filter(|(_, &f)| f != 0).map(|(i, _)| i).collect();
        if failed.is_empty() {
            return Ok(());
        }
        if failed.len() > k {
            return Err(ParityError::too_many_failures(failed.len(), k));
        }

        match self {
            MathContext::Xor { .. } => {
                if failed.len() != 1 {
                    return Err(ParityError::too_many_failures(failed.len(), 1));
                }
                let f = failed[0];
                if f == n {
                    let ro: Vec<&[u8]> = data.iter().map(|b| &**b).collect();
                    parity[0].fill(0);
                    kernel::xor_accumulate(parity[0], &ro);
                } else {
                    let len = parity[0].len();
                    let mut acc = vec![0u8; len];
                    let others: Vec<&[u8]> = data
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != f)
                        .map(|(_, b)| &**b)
                        .collect();
                    kernel::xor_accumulate(&mut acc, &others);
                    kernel::xor_accumulate(&mut acc, &[&*parity[0]]);
                    data[f].copy_from_slice(&acc);
                }
                Ok(())
            }
            MathContext::ReedSolomon { n, encode_matrix, .. } => match algo {
                RecoverAlgo::Gaussian => {
                    let alive: Vec<usize> =
                        (0..*n + k).filter(|i| !failed.contains(i)).take(*n).collect();
                    let plan = recovery::build_decode_matrix(encode_matrix, *n, &alive, &failed)?;
                    self.apply_decode_matrix(&plan, data, parity, &failed)
                }
                RecoverAlgo::Inverse(plan) => {
                    if plan.decode.failed != failed {
                        return Err(ParityError::invalid_arguments(
                            "cached recovery plan does not match this call's failure pattern",
                        ));
                    }
                    self.apply_decode_matrix(&plan.decode, data, parity, &failed)
                }
            },
        }
    }

    /// Precomputes a decode matrix for a fixed failure pattern, for reuse
    /// across many `recover` calls against the same pattern (e.g. a long
    /// scrub pass). See [`RecoverAlgo::Inverse`].
    pub fn recov_mat_gen(&self, fails: &[u8]) -> Result<RecoveryPlan> {
        let (n, k, encode_matrix) = match self {
            MathContext::Xor { .. } => {
                return Err(ParityError::invalid_arguments(
                    "recov_mat_gen is not meaningful for the XOR (k=1) path",
                ))
            }
            MathContext::ReedSolomon { n, k, encode_matrix } => (*n, *k, encode_matrix),
        };
        if fails.len() != n + k {
            return Err(ParityError::invalid_arguments("fails vector has wrong length"));
        }
        let failed: Vec<usize> = fails.iter().enumerate().filter(|(_, &f)| f != 0).map(|(i, _)| i).collect();
        if failed.is_empty() || failed.len() > k {
            return Err(ParityError::too_many_failures(failed.len(), k));
        }
        let alive: Vec<usize> = (0..n + k).filter(|i| !failed.contains(i)).take(n).collect();
        let decode = recovery::build_decode_matrix(encode_matrix, n, &alive, &failed)?;
        Ok(RecoveryPlan { decode })
    }

    fn apply_decode_matrix(
        &self,
        plan: &DecodeMatrix,
        data: &mut [&mut [u8]],
        parity: &mut [&mut [u8]],
        failed: &[usize],
    ) -> Result<()> {
        let n = self.n();
        // Gather survivor pointers in the plan's alive order.
        let survivors: Vec<&[u8]> = plan
            .alive
            .iter()
            .map(|&i| if i < n { &*data[i] } else { &*parity[i - n] })
            .collect();

        // Compute into scratch buffers first, then scatter into the
        // (possibly interleaved) data/parity output slices.
        let len = survivors.first().map_or(0, |b| b.len());
        let mut scratch: Vec<Vec<u8>> = vec![vec![0u8; len]; failed.len()];
        {
            let mut outs: Vec<&mut [u8]> = scratch.iter_mut().map(|v| v.as_mut_slice()).collect();
            kernel::encode(&plan.matrix, &survivors, &mut outs);
        }
        for (out, &f) in scratch.into_iter().zip(failed) {
            if f < n {
                data[f].copy_from_slice(&out);
            } else {
                parity[f - n].copy_from_slice(&out);
            }
        }
        Ok(())
    }

    /// `dst ^= src`, over one block. Idempotent under repeated application
    /// with the same `src`.
    pub fn buffer_xor(dst: &mut [u8], src: &[u8]) {
        debug_assert_eq!(dst.len(), src.len());
        for (d, &s) in dst.iter_mut().zip(src) {
            *d ^= s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(n: usize, len: usize, seed: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![seed.wrapping_add(i as u8); len]).collect()
    }

    #[test]
    fn xor_round_trip_single_failure() {
        let ctx = MathContext::new(2, 1).unwrap();
        let data = vec![vec![0x01u8, 0x02], vec![0x03u8, 0x04]];
        let mut parity = vec![vec![0u8; 2]];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }
        assert_eq!(parity[0], vec![0x01 ^ 0x03, 0x02 ^ 0x04]);

        let mut erased_data = data.clone();
        erased_data[0].fill(0);
        let fails = [1u8, 0, 0];
        {
            let mut d: Vec<&mut [u8]> = erased_data.iter_mut().map(|b| b.as_mut_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.recover(&mut d, &mut p, &fails, RecoverAlgo::Gaussian).unwrap();
        }
        assert_eq!(erased_data, data);
    }

    #[test]
    fn rs_round_trip_data_and_parity_failure() {
        let ctx = MathContext::new(4, 2).unwrap();
        let data = blocks(4, 16, 1);
        let mut parity = vec![vec![0u8; 16]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }

        let mut erased_data = data.clone();
        erased_data[1].fill(0);
        let mut erased_parity = parity.clone();
        erased_parity[0].fill(0);
        let mut fails = [0u8; 6];
        fails[1] = 1;
        fails[4] = 1;
        {
            let mut d: Vec<&mut [u8]> = erased_data.iter_mut().map(|b| b.as_mut_slice()).collect();
            let mut p: Vec<&mut [u8]> = erased_parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.recover(&mut d, &mut p, &fails, RecoverAlgo::Gaussian).unwrap();
        }
        assert_eq!(erased_data, data);
        assert_eq!(erased_parity, parity);
    }

    #[test]
    fn diff_matches_recalculate() {
        let ctx = MathContext::new(4, 2).unwrap();
        let mut data = blocks(4, 8, 5);
        let mut parity = vec![vec![0u8; 8]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }
        let old = data[2].clone();
        let new: Vec<u8> = old.iter().map(|b| b ^ 0xAA).collect();
        {
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.diff(&old, &new, &mut p, 2).unwrap();
        }
        data[2] = new;
        let mut recalculated = vec![vec![0u8; 8]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = recalculated.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }
        assert_eq!(parity, recalculated);
    }

    #[test]
    fn gaussian_and_inverse_agree() {
        let ctx = MathContext::new(4, 2).unwrap();
        let data = blocks(4, 16, 9);
        let mut parity = vec![vec![0u8; 16]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }
        let mut fails = [0u8; 6];
        fails[0] = 1;

        let mut via_gaussian = data.clone();
        via_gaussian[0].fill(0);
        let mut parity_g = parity.clone();
        {
            let mut d: Vec<&mut [u8]> = via_gaussian.iter_mut().map(|b| b.as_mut_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity_g.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.recover(&mut d, &mut p, &fails, RecoverAlgo::Gaussian).unwrap();
        }

        let plan = ctx.recov_mat_gen(&fails).unwrap();
        let mut via_inverse = data.clone();
        via_inverse[0].fill(0);
        let mut parity_i = parity.clone();
        {
            let mut d: Vec<&mut [u8]> = via_inverse.iter_mut().map(|b| b.as_mut_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity_i.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.recover(&mut d, &mut p, &fails, RecoverAlgo::Inverse(&plan)).unwrap();
        }
        assert_eq!(via_gaussian, via_inverse);
    }

    #[test]
    fn inverse_rejects_mismatched_plan() {
        let ctx = MathContext::new(4, 2).unwrap();
        let data = blocks(4, 16, 2);
        let mut parity = vec![vec![0u8; 16]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }
        let mut fails_for_plan = [0u8; 6];
        fails_for_plan[0] = 1;
        let plan = ctx.recov_mat_gen(&fails_for_plan).unwrap();

        let mut fails_for_call = [0u8; 6];
        fails_for_call[1] = 1;
        let mut rec_data = data.clone();
        rec_data[1].fill(0);
        let mut rec_parity = parity.clone();
        let mut d: Vec<&mut [u8]> = rec_data.iter_mut().map(|b| b.as_mut_slice()).collect();
        let mut p: Vec<&mut [u8]> = rec_parity.iter_mut().map(|b| b.as_mut_slice()).collect();
        let err = ctx
            .recover(&mut d, &mut p, &fails_for_call, RecoverAlgo::Inverse(&plan))
            .unwrap_err();
        assert!(matches!(err, ParityError::InvalidArguments(_)));
    }

    #[test]
    fn refine_matches_calculate() {
        let ctx = MathContext::new(4, 2).unwrap();
        let data = blocks(4, 8, 11);
        let mut parity = vec![vec![0u8; 8]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = parity.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.calculate(&d, &mut p).unwrap();
        }
        let mut refined = vec![vec![0u8; 8]; 2];
        {
            let d: Vec<&[u8]> = data.iter().map(|b| b.as_slice()).collect();
            let mut p: Vec<&mut [u8]> = refined.iter_mut().map(|b| b.as_mut_slice()).collect();
            ctx.refine(&d, &mut p, 2).unwrap();
        }
        assert_eq!(parity, refined);
    }

    #[test]
    fn buffer_xor_is_idempotent() {
        let mut dst = vec![0x01u8, 0x02, 0x03];
        let src = vec![0xFFu8, 0x00, 0x11];
        MathContext::buffer_xor(&mut dst, &src);
        let once = dst.clone();
        MathContext::buffer_xor(&mut dst, &src);
        MathContext::buffer_xor(&mut dst, &src);
        assert_eq!(dst, once);
    }
}
