//! Error types for lucene-testkit

use std::fmt;
use std::io;
use std::time::Duration;

use crate::DocId;

/// Marker carried by every fault the mock directory injects.
pub const FAKE_FAULT_MARKER: &str = "fake I/O fault";

/// What part of the observable postings stream diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    DocFreq,
    DocId,
    Freq,
    Position,
    Payload,
    StartOffset,
    EndOffset,
    Term,
    Ord,
    Impacts,
    BitSet,
    Intersect,
    Fields,
    EnumState,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Check::DocFreq => "docFreq",
            Check::DocId => "docID",
            Check::Freq => "freq",
            Check::Position => "position",
            Check::Payload => "payload",
            Check::StartOffset => "startOffset",
            Check::EndOffset => "endOffset",
            Check::Term => "term",
            Check::Ord => "ord",
            Check::Impacts => "impacts",
            Check::BitSet => "bitset",
            Check::Intersect => "intersect",
            Check::Fields => "fields",
            Check::EnumState => "enum state",
        };
        f.write_str(name)
    }
}

/// Full context of one oracle/codec divergence.
///
/// Carries everything needed to regenerate the oracle stream: the field, the
/// term bytes and the seed the term was built from.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub what: Check,
    pub field: String,
    pub term: Vec<u8>,
    pub seed: Option<u64>,
    pub doc: Option<DocId>,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is wrong: expected {} but got {} (field={:?} term={}",
            self.what,
            self.expected,
            self.actual,
            self.field,
            display_term(&self.term)
        )?;
        if let Some(doc) = self.doc {
            write!(f, " doc={}", doc)?;
        }
        if let Some(seed) = self.seed {
            write!(f, " seed=0x{:016x}", seed)?;
        }
        f.write_str(")")
    }
}

/// Render term bytes as text when they are valid UTF-8.
pub fn display_term(term: &[u8]) -> String {
    match std::str::from_utf8(term) {
        Ok(s) => format!("{:?}", s),
        Err(_) => format!("{:?}", term),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Mismatch(Box<Mismatch>),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid impacts: {0}")]
    InvalidImpacts(String),

    #[error("Merge policy violation: {0}")]
    MergePolicy(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec corruption: {0}")]
    Corruption(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("fake I/O fault: {0}")]
    FakeIoFault(String),

    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Verification round timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cancelled after a sibling worker failed")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// True for faults injected on purpose by the mock directory.
    ///
    /// Callers exercising fault injection swallow these and propagate
    /// everything else.
    pub fn is_fake_fault(&self) -> bool {
        match self {
            Error::FakeIoFault(_) => true,
            Error::Io(e) => e.to_string().contains(FAKE_FAULT_MARKER),
            _ => false,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }

    /// Returns the mismatch details when this error is a divergence.
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Error::Mismatch(m) => Some(m),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_display_carries_context() {
        let err = Error::Mismatch(Box::new(Mismatch {
            what: Check::Freq,
            field: "body".into(),
            term: b"low_abc".to_vec(),
            seed: Some(42),
            doc: Some(17),
            expected: "3".into(),
            actual: "4".into(),
        }));
        let msg = err.to_string();
        assert!(msg.contains("freq is wrong"));
        assert!(msg.contains("\"low_abc\""));
        assert!(msg.contains("doc=17"));
        assert!(msg.contains("seed=0x000000000000002a"));
    }

    #[test]
    fn test_fake_fault_detection() {
        assert!(Error::FakeIoFault("write".into()).is_fake_fault());
        let io = io::Error::other(format!("{}: disk full", FAKE_FAULT_MARKER));
        assert!(Error::Io(io).is_fake_fault());
        assert!(!Error::Io(io::Error::other("real")).is_fake_fault());
        assert!(!Error::Codec("broken".into()).is_fake_fault());
    }
}
