//! `BufVec`: a logical block represented as an ordered sequence of
//! equal-sized segments, so callers can stream large blocks through
//! incremental recovery without a contiguous allocation.
//!
//! Two `BufVec`s cooperating in an operation (e.g. [`crate::kernel::gfaxpy`]
//! folded over segments) must share identical segmentation — this is
//! asserted, not silently tolerated, matching the reference implementation's
//! treatment of the segmented-buffer invariant as a programmer error.

/// A read-only view over a block's segments.
pub struct BufVec<'a> {
    segments: Vec<&'a [u8]>,
}

impl<'a> BufVec<'a> {
    /// Builds a view from a list of equal-sized segments. Empty segment
    /// lists are allowed only when `total_len` would be zero, matching the
    /// degenerate case of a zero-length block.
    pub fn new(segments: Vec<&'a [u8]>) -> Self {
        if let Some(first) = segments.first() {
            debug_assert!(
                segments.iter().all(|s| s.len() == first.len()),
                "BufVec segments must share one length"
            );
        }
        Self { segments }
    }

    pub fn from_contiguous(buf: &'a [u8]) -> Self {
        Self { segments: vec![buf] }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_len(&self) -> usize {
        self.segments.first().map_or(0, |s| s.len())
    }

    pub fn total_len(&self) -> usize {
        self.segment_count() * self.segment_len()
    }

    pub fn segments(&self) -> &[&'a [u8]] {
        &self.segments
    }

    fn assert_same_segmentation(&self, other: &BufVec<'_>) {
        assert_eq!(
            self.segment_count(),
            other.segment_count(),
            "BufVec segment counts differ"
        );
        assert_eq!(self.segment_len(), other.segment_len(), "BufVec segment lengths differ");
    }
}

/// A mutable view over a block's segments, the destination of `gfaxpy`-style
/// accumulation during incremental recovery.
pub struct BufVecMut<'a> {
    segments: Vec<&'a mut [u8]>,
}

impl<'a> BufVecMut<'a> {
    pub fn new(segments: Vec<&'a mut [u8]>) -> Self {
        if let Some(first) = segments.first() {
            let len = first.len();
            debug_assert!(segments.iter().all(|s| s.len() == len), "BufVec segments must share one length");
        }
        Self { segments }
    }

    pub fn from_contiguous(buf: &'a mut [u8]) -> Self {
        Self { segments: vec![buf] }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_len(&self) -> usize {
        self.segments.first().map_or(0, |s| s.len())
    }

    fn as_bufvec(&self) -> BufVec<'_> {
        BufVec { segments: self.segments.iter().map(|s| &**s).collect() }
    }

    /// Copies out the current contents of every segment. Used when a
    /// reconstructed block must itself serve as the source of a further
    /// accumulation (incremental recovery's forward-rectification and
    /// failed-data-to-parity transform), since Rust cannot hold both a
    /// mutable and a shared view of the same buffer at once.
    pub fn segments_owned(&self) -> Vec<Vec<u8>> {
        self.segments.iter().map(|s| s.to_vec()).collect()
    }

    /// `self <- self + alpha * x`, segment-by-segment, via paired cursors.
    /// Asserts that `self` and `x` share identical segmentation.
    pub fn gfaxpy(&mut self, x: &BufVec<'_>, alpha: u8) {
        self.as_bufvec().assert_same_segmentation(x);
        for (y_seg, x_seg) in self.segments.iter_mut().zip(x.segments.iter()) {
            crate::kernel::gfaxpy(y_seg, x_seg, alpha);
        }
    }

    /// `self ^= x`, segment-by-segment. Equivalent to `gfaxpy(x, 1)`.
    pub fn xor_assign(&mut self, x: &BufVec<'_>) {
        self.gfaxpy(x, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gfaxpy_accumulates_across_segments() {
        let mut seg0 = [0x10u8, 0x20];
        let mut seg1 = [0x30u8, 0x40];
        let x0 = [0x01u8, 0x02];
        let x1 = [0x03u8, 0x04];
        {
            let mut y = BufVecMut::new(vec![&mut seg0, &mut seg1]);
            let x = BufVec::new(vec![&x0, &x1]);
            y.gfaxpy(&x, 1);
        }
        assert_eq!(seg0, [0x10 ^ 0x01, 0x20 ^ 0x02]);
        assert_eq!(seg1, [0x30 ^ 0x03, 0x40 ^ 0x04]);
    }

    #[test]
    #[should_panic(expected = "segment counts differ")]
    fn mismatched_segmentation_panics() {
        let mut seg0 = [0u8; 2];
        let x0 = [0u8; 2];
        let x1 = [0u8; 2];
        let mut y = BufVecMut::new(vec![&mut seg0]);
        let x = BufVec::new(vec![&x0, &x1]);
        y.gfaxpy(&x, 1);
    }
}
