//! Exclusion masks.
//!
//! A mask is one bit per indexed row; bit `i` lives in byte `i >> 3` under
//! `1 << (i & 7)`. A set bit means the row is excluded from results.

use crate::{IndexError, Result};

/// Borrowed, read-only exclusion mask.
///
/// The view never owns or frees the caller's bytes; it is valid for as long
/// as the borrow it was created from.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitsetView<'a> {
    data: &'a [u8],
    num_bits: usize,
}

impl<'a> BitsetView<'a> {
    /// Wrap `num_bits` bits of `data`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `data` is too short to hold `num_bits`.
    pub fn new(data: &'a [u8], num_bits: usize) -> Result<Self> {
        let needed = num_bits.div_ceil(8);
        if data.len() < needed {
            return Err(IndexError::InvalidParameter(format!(
                "bitset of {} bits needs {} bytes, got {}",
                num_bits,
                needed,
                data.len()
            )));
        }
        Ok(Self { data, num_bits })
    }

    /// The absent mask: nothing is excluded.
    pub const fn empty() -> Self {
        Self {
            data: &[],
            num_bits: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Number of rows the mask covers.
    pub fn len(&self) -> usize {
        self.num_bits
    }

    /// Whether row `index` is excluded. Rows past the end are never excluded.
    #[inline]
    pub fn test(&self, index: usize) -> bool {
        index < self.num_bits && self.data[index >> 3] & (1 << (index & 7)) != 0
    }

    /// Number of excluded rows.
    pub fn count_ones(&self) -> usize {
        let full = self.num_bits >> 3;
        let mut count: usize = self.data[..full].iter().map(|b| b.count_ones() as usize).sum();
        for index in (full << 3)..self.num_bits {
            if self.test(index) {
                count += 1;
            }
        }
        count
    }

    /// Fraction of rows excluded, in `[0, 1]`.
    pub fn filter_ratio(&self) -> f32 {
        if self.num_bits == 0 {
            return 0.0;
        }
        self.count_ones() as f32 / self.num_bits as f32
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        &self.data[..self.num_bits.div_ceil(8)]
    }
}

/// Owned mask for callers that need to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitset {
    data: Vec<u8>,
    num_bits: usize,
}

impl Bitset {
    /// All-zero mask over `num_bits` rows.
    pub fn new(num_bits: usize) -> Self {
        Self {
            data: vec![0u8; num_bits.div_ceil(8)],
            num_bits,
        }
    }

    pub fn from_bytes(data: Vec<u8>, num_bits: usize) -> Result<Self> {
        BitsetView::new(&data, num_bits)?;
        Ok(Self { data, num_bits })
    }

    pub fn set(&mut self, index: usize) {
        assert!(index < self.num_bits, "bit {} out of range", index);
        self.data[index >> 3] |= 1 << (index & 7);
    }

    pub fn clear(&mut self, index: usize) {
        assert!(index < self.num_bits, "bit {} out of range", index);
        self.data[index >> 3] &= !(1 << (index & 7));
    }

    pub fn len(&self) -> usize {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    /// Lend a view for one call.
    pub fn view(&self) -> BitsetView<'_> {
        BitsetView {
            data: &self.data,
            num_bits: self.num_bits,
        }
    }
}
