//! Index options and postings feature flags

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// How much information a field records per posting.
///
/// Variants are ordered: every level includes everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    None,
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    pub const ALL: [IndexOptions; 5] = [
        IndexOptions::None,
        IndexOptions::Docs,
        IndexOptions::DocsAndFreqs,
        IndexOptions::DocsAndFreqsAndPositions,
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_indexed(self) -> bool {
        self != IndexOptions::None
    }

    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    pub fn has_offsets(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }

    /// Strongest flags a field indexed with these options can serve.
    pub fn max_flags(self, has_payloads: bool) -> PostingsFlags {
        let mut flags = PostingsFlags::NONE;
        if self.has_freqs() {
            flags |= PostingsFlags::FREQS;
        }
        if self.has_positions() {
            flags |= PostingsFlags::POSITIONS;
            if has_payloads {
                flags |= PostingsFlags::PAYLOADS;
            }
        }
        if self.has_offsets() {
            flags |= PostingsFlags::OFFSETS;
        }
        flags
    }
}

impl fmt::Display for IndexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexOptions::None => "NONE",
            IndexOptions::Docs => "DOCS",
            IndexOptions::DocsAndFreqs => "DOCS_AND_FREQS",
            IndexOptions::DocsAndFreqsAndPositions => "DOCS_AND_FREQS_AND_POSITIONS",
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets => {
                "DOCS_AND_FREQS_AND_POSITIONS_AND_OFFSETS"
            }
        };
        f.write_str(name)
    }
}

/// Features requested from `TermsEnum::postings`.
///
/// Positional features imply `POSITIONS`, and `POSITIONS` implies `FREQS`,
/// matching what a postings enumerator must decode to serve them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PostingsFlags(u8);

impl PostingsFlags {
    pub const NONE: PostingsFlags = PostingsFlags(0);
    pub const FREQS: PostingsFlags = PostingsFlags(1 << 0);
    pub const POSITIONS: PostingsFlags = PostingsFlags(1 << 1 | 1 << 0);
    pub const OFFSETS: PostingsFlags = PostingsFlags(1 << 2 | 1 << 1 | 1 << 0);
    pub const PAYLOADS: PostingsFlags = PostingsFlags(1 << 3 | 1 << 1 | 1 << 0);
    pub const ALL: PostingsFlags = PostingsFlags(0x0F);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `feature` is set.
    pub fn contains(self, feature: PostingsFlags) -> bool {
        self.0 & feature.0 == feature.0
    }

    pub fn feature_requested(self, feature: PostingsFlags) -> bool {
        self.contains(feature)
    }

    /// Clamp a request down to what a field can serve.
    pub fn intersect(self, other: PostingsFlags) -> PostingsFlags {
        PostingsFlags(self.0 & other.0)
    }
}

impl BitOr for PostingsFlags {
    type Output = PostingsFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        PostingsFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for PostingsFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PostingsFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(PostingsFlags::FREQS) {
            names.push("FREQS");
        }
        if self.contains(PostingsFlags::POSITIONS) {
            names.push("POSITIONS");
        }
        if self.contains(PostingsFlags::OFFSETS) {
            names.push("OFFSETS");
        }
        if self.contains(PostingsFlags::PAYLOADS) {
            names.push("PAYLOADS");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_ordering() {
        assert!(IndexOptions::Docs < IndexOptions::DocsAndFreqs);
        assert!(IndexOptions::DocsAndFreqsAndPositions.has_freqs());
        assert!(!IndexOptions::DocsAndFreqsAndPositions.has_offsets());
        assert_eq!(IndexOptions::from_index(3), Some(IndexOptions::DocsAndFreqsAndPositions));
        assert_eq!(IndexOptions::from_index(5), None);
    }

    #[test]
    fn test_flags_imply_lower_features() {
        assert!(PostingsFlags::OFFSETS.contains(PostingsFlags::POSITIONS));
        assert!(PostingsFlags::PAYLOADS.contains(PostingsFlags::FREQS));
        assert!(!PostingsFlags::POSITIONS.contains(PostingsFlags::OFFSETS));
        let flags = PostingsFlags::POSITIONS | PostingsFlags::PAYLOADS;
        assert!(flags.feature_requested(PostingsFlags::PAYLOADS));
        assert!(!flags.feature_requested(PostingsFlags::OFFSETS));
        assert_eq!(format!("{:?}", PostingsFlags::NONE), "NONE");
    }

    #[test]
    fn test_max_flags() {
        let flags = IndexOptions::DocsAndFreqsAndPositions.max_flags(false);
        assert!(flags.contains(PostingsFlags::POSITIONS));
        assert!(!flags.contains(PostingsFlags::PAYLOADS));
        assert_eq!(IndexOptions::Docs.max_flags(true), PostingsFlags::NONE);
    }
}
