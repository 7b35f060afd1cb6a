//! Fixed-length bit set used by `PostingsEnum::into_bit_set`

use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct FixedBitSet {
    words: Vec<u64>,
    num_bits: usize,
}

impl FixedBitSet {
    pub fn new(num_bits: usize) -> Self {
        Self {
            words: vec![0; num_bits.div_ceil(64)],
            num_bits,
        }
    }

    pub fn len(&self) -> usize {
        self.num_bits
    }

    pub fn is_empty(&self) -> bool {
        self.num_bits == 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.num_bits, "bit {} out of {}", index, self.num_bits);
        self.words[index >> 6] |= 1u64 << (index & 63);
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.num_bits, "bit {} out of {}", index, self.num_bits);
        self.words[index >> 6] & (1u64 << (index & 63)) != 0
    }

    pub fn clear(&mut self, index: usize) {
        self.words[index >> 6] &= !(1u64 << (index & 63));
    }

    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Indices of set bits in increasing order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_bits).filter(move |&i| self.get(i))
    }
}

impl fmt::Debug for FixedBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedBitSet")
            .field("len", &self.num_bits)
            .field("ones", &self.ones().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_clear() {
        let mut bits = FixedBitSet::new(130);
        bits.set(0);
        bits.set(64);
        bits.set(129);
        assert!(bits.get(64));
        assert!(!bits.get(63));
        assert_eq!(bits.cardinality(), 3);
        bits.clear(64);
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![0, 129]);
        bits.clear_all();
        assert_eq!(bits.cardinality(), 0);
    }

    #[test]
    fn test_equality_includes_length() {
        assert_ne!(FixedBitSet::new(10), FixedBitSet::new(11));
        let mut a = FixedBitSet::new(10);
        let mut b = FixedBitSet::new(10);
        a.set(3);
        assert_ne!(a, b);
        b.set(3);
        assert_eq!(a, b);
    }
}
