//! Bit-packed array of fixed-width unsigned integers backed by `Vec<u64>`.
//!
//! Elements are laid out back to back, least significant bits first, with no
//! per-element padding. Any width from 0 to 32 bits is supported, so an
//! element may straddle two words; reads and writes split it across both.

use crate::error::StorageError;

/// Widest supported element.
pub const MAX_BITS: u8 = 32;

/// A compact array where each element is stored using a fixed number of bits.
///
/// A width of 0 stores nothing: every element reads as 0 and only 0 can be
/// written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitStorage {
    /// Raw storage words.
    words: Vec<u64>,
    /// Bits per element.
    bits: u8,
    /// Total number of logical elements.
    len: usize,
}

impl BitStorage {
    /// Creates a zero-filled array of `len` elements, `bits` wide.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidWidth`] if `bits` exceeds [`MAX_BITS`].
    pub fn new(bits: u8, len: usize) -> Result<Self, StorageError> {
        if bits > MAX_BITS {
            return Err(StorageError::InvalidWidth { from: 0, to: bits });
        }
        Ok(Self {
            words: vec![0u64; word_count(bits, len)],
            bits,
            len,
        })
    }

    /// Returns the value at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if `position >= len`.
    pub fn get(&self, position: usize) -> Result<u32, StorageError> {
        self.check_position(position)?;
        Ok(self.get_unchecked(position))
    }

    /// Stores `value` at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] for a bad position and
    /// [`StorageError::ValueTooWide`] if `value` needs more than `bits` bits.
    /// Nothing is written in either case.
    pub fn set(&mut self, position: usize, value: u32) -> Result<(), StorageError> {
        self.check_position(position)?;
        if !self.fits(value) {
            return Err(StorageError::ValueTooWide {
                value,
                bits: self.bits,
            });
        }
        self.set_unchecked(position, value);
        Ok(())
    }

    /// Builds a copy of this array at a wider element width.
    ///
    /// `self` is left untouched so the caller can publish the result in one
    /// swap.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidWidth`] if `new_bits` is narrower than
    /// the current width or wider than [`MAX_BITS`].
    pub fn with_width(&self, new_bits: u8) -> Result<Self, StorageError> {
        if new_bits < self.bits || new_bits > MAX_BITS {
            return Err(StorageError::InvalidWidth {
                from: self.bits,
                to: new_bits,
            });
        }
        let mut wider = Self::new(new_bits, self.len)?;
        if self.bits > 0 {
            for (position, value) in self.iter().enumerate() {
                wider.set_unchecked(position, value);
            }
        }
        Ok(wider)
    }

    /// Builds a new array at `new_bits` whose element `i` is `f(self[i])`.
    ///
    /// Used when the meaning of the stored values changes, e.g. palette
    /// indices becoming global IDs.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`, and fails with
    /// [`StorageError::ValueTooWide`] if a mapped value does not fit.
    pub fn remap<F>(&self, new_bits: u8, mut f: F) -> Result<Self, StorageError>
    where
        F: FnMut(u32) -> Result<u32, StorageError>,
    {
        let mut mapped = Self::new(new_bits, self.len)?;
        for (position, value) in self.iter().enumerate() {
            mapped.set(position, f(value)?)?;
        }
        Ok(mapped)
    }

    /// Iterates over all elements in position order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(move |position| self.get_unchecked(position))
    }

    /// Returns the number of bits per element.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Returns the number of logical elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `value` fits the current element width.
    pub fn fits(&self, value: u32) -> bool {
        self.bits >= MAX_BITS || u64::from(value) < (1u64 << self.bits)
    }

    /// Returns the size of the backing storage in bytes (not counting struct overhead).
    pub fn storage_bytes(&self) -> usize {
        self.words.len() * 8
    }

    /// Returns a reference to the raw `u64` storage words.
    pub fn raw_words(&self) -> &[u64] {
        &self.words
    }

    fn check_position(&self, position: usize) -> Result<(), StorageError> {
        if position >= self.len {
            return Err(StorageError::OutOfBounds {
                position,
                len: self.len,
            });
        }
        Ok(())
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    fn get_unchecked(&self, position: usize) -> u32 {
        if self.bits == 0 {
            return 0;
        }
        let bit_index = position * self.bits as usize;
        let word = bit_index / 64;
        let offset = (bit_index % 64) as u32;
        let mask = self.mask();

        let value = if offset + u32::from(self.bits) <= 64 {
            self.words[word] >> offset
        } else {
            // Element spans two words.
            (self.words[word] >> offset) | (self.words[word + 1] << (64 - offset))
        };
        (value & mask) as u32
    }

    fn set_unchecked(&mut self, position: usize, value: u32) {
        if self.bits == 0 {
            return;
        }
        let bit_index = position * self.bits as usize;
        let word = bit_index / 64;
        let offset = (bit_index % 64) as u32;
        let mask = self.mask();
        let value = u64::from(value) & mask;

        self.words[word] = (self.words[word] & !(mask << offset)) | (value << offset);

        let end = offset + u32::from(self.bits);
        if end > 64 {
            let spill_mask = (1u64 << (end - 64)) - 1;
            self.words[word + 1] =
                (self.words[word + 1] & !spill_mask) | (value >> (64 - offset));
        }
    }
}

/// Minimum number of words holding `len` elements of `bits` bits.
pub fn word_count(bits: u8, len: usize) -> usize {
    (len * bits as usize).div_ceil(64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bit_array() {
        let mut arr = BitStorage::new(0, 4096).unwrap();
        assert_eq!(arr.get(0), Ok(0));
        assert_eq!(arr.get(4095), Ok(0));
        assert_eq!(arr.storage_bytes(), 0);
        assert!(arr.set(7, 0).is_ok());
        assert_eq!(
            arr.set(7, 1),
            Err(StorageError::ValueTooWide { value: 1, bits: 0 })
        );
    }

    #[test]
    fn test_every_width_roundtrips() {
        for bits in 1..=MAX_BITS {
            let len = 4096;
            let mut arr = BitStorage::new(bits, len).unwrap();
            let max = if bits == 32 {
                u32::MAX
            } else {
                (1u32 << bits) - 1
            };
            let value_at = |i: usize| (i as u32).wrapping_mul(2_654_435_761) & max;
            for i in 0..len {
                arr.set(i, value_at(i)).unwrap();
            }
            for i in 0..len {
                assert_eq!(arr.get(i), Ok(value_at(i)), "bits={bits} position={i}");
            }
        }
    }

    #[test]
    fn test_straddling_element_does_not_clobber_neighbours() {
        // With 5 bits, element 12 covers bits 60..65 and spans words 0 and 1.
        let mut arr = BitStorage::new(5, 64).unwrap();
        arr.set(11, 0b10101).unwrap();
        arr.set(13, 0b01010).unwrap();
        arr.set(12, 0b11111).unwrap();
        assert_eq!(arr.get(11), Ok(0b10101));
        assert_eq!(arr.get(12), Ok(0b11111));
        assert_eq!(arr.get(13), Ok(0b01010));

        arr.set(12, 0b00000).unwrap();
        assert_eq!(arr.get(11), Ok(0b10101));
        assert_eq!(arr.get(12), Ok(0));
        assert_eq!(arr.get(13), Ok(0b01010));
    }

    #[test]
    fn test_word_count_is_minimal() {
        assert_eq!(BitStorage::new(1, 4096).unwrap().raw_words().len(), 64);
        assert_eq!(BitStorage::new(4, 4096).unwrap().raw_words().len(), 256);
        // 4096 * 5 = 20480 bits = 320 words exactly.
        assert_eq!(BitStorage::new(5, 4096).unwrap().raw_words().len(), 320);
        // 10 * 7 = 70 bits -> 2 words.
        assert_eq!(BitStorage::new(7, 10).unwrap().raw_words().len(), 2);
        assert_eq!(word_count(12, 4096), 768);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut arr = BitStorage::new(4, 16).unwrap();
        assert_eq!(
            arr.get(16),
            Err(StorageError::OutOfBounds {
                position: 16,
                len: 16
            })
        );
        assert!(matches!(
            arr.set(100, 1),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_value_too_wide_leaves_storage_untouched() {
        let mut arr = BitStorage::new(3, 8).unwrap();
        arr.set(2, 5).unwrap();
        assert_eq!(
            arr.set(2, 8),
            Err(StorageError::ValueTooWide { value: 8, bits: 3 })
        );
        assert_eq!(arr.get(2), Ok(5));
    }

    #[test]
    fn test_with_width_preserves_values() {
        let mut arr = BitStorage::new(3, 4096).unwrap();
        for i in 0..4096 {
            arr.set(i, (i % 8) as u32).unwrap();
        }
        let wider = arr.with_width(11).unwrap();
        assert_eq!(wider.bits(), 11);
        assert_eq!(arr.bits(), 3, "source must be untouched");
        for i in 0..4096 {
            assert_eq!(wider.get(i), Ok((i % 8) as u32));
        }
    }

    #[test]
    fn test_with_width_from_zero_is_zeroed() {
        let arr = BitStorage::new(0, 4096).unwrap();
        let wider = arr.with_width(4).unwrap();
        assert!(wider.iter().all(|v| v == 0));
        assert_eq!(wider.storage_bytes(), 2048);
    }

    #[test]
    fn test_with_width_rejects_shrinking() {
        let arr = BitStorage::new(8, 16).unwrap();
        assert_eq!(
            arr.with_width(4),
            Err(StorageError::InvalidWidth { from: 8, to: 4 })
        );
        assert!(arr.with_width(33).is_err());
    }

    #[test]
    fn test_remap_translates_values() {
        let mut arr = BitStorage::new(2, 8).unwrap();
        for i in 0..8 {
            arr.set(i, (i % 4) as u32).unwrap();
        }
        let table = [0u32, 300, 17, 4000];
        let mapped = arr.remap(12, |v| Ok(table[v as usize])).unwrap();
        for i in 0..8 {
            assert_eq!(mapped.get(i), Ok(table[i % 4]));
        }
    }

    #[test]
    fn test_new_rejects_oversized_width() {
        assert!(matches!(
            BitStorage::new(33, 1),
            Err(StorageError::InvalidWidth { .. })
        ));
    }
}
