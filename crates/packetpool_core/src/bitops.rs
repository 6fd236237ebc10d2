//! # Bit-Scan Utilities
//!
//! Pure helpers over a single bitmap word. Every bitmap in the crate is built
//! from `u64` words; these compile down to `tzcnt`/`popcnt` where available.

/// Bitmap word type.
pub type Word = u64;

/// Number of bits in one bitmap word.
pub const WORD_BITS: usize = Word::BITS as usize;

/// `log2(WORD_BITS)`, used to replace division by the word width.
pub const WORD_SHIFT: u32 = WORD_BITS.trailing_zeros();

/// Mask for the bit position inside a word (`index % WORD_BITS`).
const BIT_MASK: usize = WORD_BITS - 1;

/// Returns the position of the lowest set bit, or `None` for a zero word.
#[inline]
#[must_use]
pub const fn lowest_set_bit(word: Word) -> Option<u32> {
    if word == 0 {
        None
    } else {
        Some(word.trailing_zeros())
    }
}

/// Number of set bits in `word`.
#[inline]
#[must_use]
pub const fn popcount(word: Word) -> u32 {
    word.count_ones()
}

/// Splits a global bit index into `(word index, bit position)`.
#[inline]
#[must_use]
pub const fn locate(index: usize) -> (usize, u32) {
    (index >> WORD_SHIFT, (index & BIT_MASK) as u32)
}

/// Single-bit mask for a bit position.
#[inline]
#[must_use]
pub const fn bit(position: u32) -> Word {
    1 << position
}

/// Mask with the low `bits` bits set. `bits >= WORD_BITS` gives a full word.
#[inline]
#[must_use]
pub const fn low_mask(bits: usize) -> Word {
    if bits >= WORD_BITS {
        Word::MAX
    } else {
        (1 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_set_bit() {
        assert_eq!(lowest_set_bit(0), None);
        assert_eq!(lowest_set_bit(1), Some(0));
        assert_eq!(lowest_set_bit(0b1010_0000), Some(5));
        assert_eq!(lowest_set_bit(1 << 63), Some(63));
        assert_eq!(lowest_set_bit(Word::MAX), Some(0));
    }

    #[test]
    fn test_popcount() {
        assert_eq!(popcount(0), 0);
        assert_eq!(popcount(Word::MAX), 64);
        assert_eq!(popcount(0b1011), 3);
    }

    #[test]
    fn test_locate() {
        assert_eq!(WORD_SHIFT, 6);
        assert_eq!(locate(0), (0, 0));
        assert_eq!(locate(63), (0, 63));
        assert_eq!(locate(64), (1, 0));
        assert_eq!(locate(130), (2, 2));
    }

    #[test]
    fn test_low_mask() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(2), 0b11);
        assert_eq!(low_mask(63), Word::MAX >> 1);
        assert_eq!(low_mask(64), Word::MAX);
        assert_eq!(bit(3), 0b1000);
    }
}
