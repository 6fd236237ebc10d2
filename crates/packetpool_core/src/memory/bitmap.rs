//! # Block Bitmap
//!
//! Fixed-capacity bitmap, one bit per block. Capacity is `WORDS * 64` and is
//! part of the type, so the bitmap never allocates.

use crate::bitops::{self, Word, WORD_BITS};

/// Fixed-capacity bitmap of `WORDS` 64-bit words.
///
/// # Layout
///
/// Bit `i` lives in word `i / 64` at position `i % 64`:
///
/// ```text
/// len = 70
/// words[0] = 0xFFFF_FFFF_FFFF_FFFF (bits 0..64)
/// words[1] = 0x0000_0000_0000_003F (bits 64..70, rest masked)
/// words[2..] = 0
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockBitmap<const WORDS: usize> {
    words: [Word; WORDS],
}

impl<const WORDS: usize> BlockBitmap<WORDS> {
    /// Number of bits the bitmap can hold.
    pub const CAPACITY: usize = WORDS * WORD_BITS;

    /// Creates a bitmap with every bit clear.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Creates a bitmap with bits `0..len` set and every bit at or beyond
    /// `len` clear.
    ///
    /// # Panics
    ///
    /// Panics if `len > CAPACITY`.
    #[must_use]
    pub fn with_low_bits(len: usize) -> Self {
        assert!(len <= Self::CAPACITY, "bitmap length exceeds capacity");

        let mut words = [0; WORDS];
        let mut remaining = len;
        for word in &mut words {
            *word = bitops::low_mask(remaining);
            remaining = remaining.saturating_sub(WORD_BITS);
        }
        Self { words }
    }

    /// Returns whether bit `index` is set.
    #[inline]
    #[must_use]
    pub fn test(&self, index: usize) -> bool {
        let (word, pos) = bitops::locate(index);
        self.words[word] & bitops::bit(pos) != 0
    }

    /// Sets bit `index`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        let (word, pos) = bitops::locate(index);
        self.words[word] |= bitops::bit(pos);
    }

    /// Clears bit `index`.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        let (word, pos) = bitops::locate(index);
        self.words[word] &= !bitops::bit(pos);
    }

    /// Total number of set bits. Cost is one popcount per word.
    #[inline]
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|&w| bitops::popcount(w) as usize).sum()
    }

    /// Returns the lowest set bit below `limit`, scanning words in order.
    ///
    /// Zero words are skipped without looking at individual bits. A candidate
    /// at or beyond `limit` ends the scan of its word and moves to the next.
    #[must_use]
    pub fn first_set_below(&self, limit: usize) -> Option<usize> {
        for (i, &word) in self.words.iter().enumerate() {
            let Some(pos) = bitops::lowest_set_bit(word) else {
                continue;
            };
            let index = (i << bitops::WORD_SHIFT) + pos as usize;
            if index >= limit {
                continue;
            }
            return Some(index);
        }
        None
    }

    /// Raw words, lowest index first.
    #[inline]
    #[must_use]
    pub const fn words(&self) -> &[Word; WORDS] {
        &self.words
    }
}

impl<const WORDS: usize> Default for BlockBitmap<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_low_bits_masks_tail() {
        let map = BlockBitmap::<4>::with_low_bits(70);
        assert_eq!(map.words()[0], u64::MAX);
        assert_eq!(map.words()[1], 0b11_1111);
        assert_eq!(map.words()[2], 0);
        assert_eq!(map.words()[3], 0);
        assert_eq!(map.count_ones(), 70);
    }

    #[test]
    fn test_with_low_bits_exact_multiple() {
        let map = BlockBitmap::<2>::with_low_bits(128);
        assert!(map.words().iter().all(|&w| w == u64::MAX));
        assert_eq!(map.count_ones(), BlockBitmap::<2>::CAPACITY);
    }

    #[test]
    fn test_with_low_bits_single() {
        let map = BlockBitmap::<1>::with_low_bits(1);
        assert_eq!(map.words()[0], 1);
    }

    #[test]
    #[should_panic(expected = "exceeds capacity")]
    fn test_with_low_bits_overflow_panics() {
        let _ = BlockBitmap::<1>::with_low_bits(65);
    }

    #[test]
    fn test_set_clear_test() {
        let mut map = BlockBitmap::<4>::new();
        assert!(!map.test(130));
        map.set(130);
        assert!(map.test(130));
        assert_eq!(map.count_ones(), 1);
        map.clear(130);
        assert!(!map.test(130));
        assert_eq!(map.count_ones(), 0);
    }

    #[test]
    fn test_first_set_below_scans_in_order() {
        let mut map = BlockBitmap::<4>::new();
        assert_eq!(map.first_set_below(256), None);

        map.set(200);
        map.set(65);
        assert_eq!(map.first_set_below(256), Some(65));
        map.clear(65);
        assert_eq!(map.first_set_below(256), Some(200));
    }

    #[test]
    fn test_first_set_below_skips_stale_bits() {
        // Stale bit beyond the live range must never be reported.
        let mut map = BlockBitmap::<2>::new();
        map.set(100);
        assert_eq!(map.first_set_below(70), None);
        map.set(3);
        assert_eq!(map.first_set_below(70), Some(3));
    }
}
