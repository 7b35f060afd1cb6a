//! Optional verification features a codec test can switch on or off

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TestFeature {
    /// Exercise `advance` and the impacts cross-check
    Skipping,
    /// Re-seek terms through saved `TermState`s
    TermState,
    /// Abandon some enumerators before exhaustion
    PartialDocConsume,
    /// Read only some positions of a doc
    PartialPosConsume,
    /// Verify payload bytes
    Payloads,
    /// Run term verification on several workers
    Threads,
    /// Cross-check `into_bit_set` against a manual walk
    IntoBitSet,
    /// Cross-check `Terms::intersect` against the corpus
    Intersect,
}

impl TestFeature {
    pub const ALL: [TestFeature; 8] = [
        TestFeature::Skipping,
        TestFeature::TermState,
        TestFeature::PartialDocConsume,
        TestFeature::PartialPosConsume,
        TestFeature::Payloads,
        TestFeature::Threads,
        TestFeature::IntoBitSet,
        TestFeature::Intersect,
    ];

    fn bit(self) -> u16 {
        1 << self as u8
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet(u16);

impl FeatureSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        TestFeature::ALL.into_iter().collect()
    }

    pub fn contains(self, feature: TestFeature) -> bool {
        self.0 & feature.bit() != 0
    }

    pub fn with(self, feature: TestFeature) -> Self {
        Self(self.0 | feature.bit())
    }

    pub fn without(self, feature: TestFeature) -> Self {
        Self(self.0 & !feature.bit())
    }

    pub fn iter(self) -> impl Iterator<Item = TestFeature> {
        TestFeature::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl FromIterator<TestFeature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = TestFeature>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), FeatureSet::with)
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
