//! Assertion decorators for codec enumerators
//!
//! Each decorator holds one inner instance and checks the call protocol on
//! the way through: single-thread ownership, monotonic doc ids, position
//! budgets and the terminal latch. A violation is reported as an
//! `Error::Mismatch` of kind `EnumState` and then latched, so every later
//! call on the same enumerator fails the same way.

mod format;
mod postings;
mod terms;

use std::thread::{self, ThreadId};

pub use format::{AssertingFieldsProducer, AssertingPostingsFormat};
pub use postings::AssertingPostingsEnum;
pub use terms::{AssertingTerms, AssertingTermsEnum};

use crate::error::{Check, Error, Mismatch};

/// Identity of the thread an enumerator was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerToken(ThreadId);

impl OwnerToken {
    pub fn current() -> Self {
        Self(thread::current().id())
    }

    pub fn is_current(&self) -> bool {
        self.0 == thread::current().id()
    }

    /// Describe an access from a foreign thread, if this is one.
    pub fn check(&self) -> Option<String> {
        let current = thread::current().id();
        if self.0 == current {
            None
        } else {
            Some(format!("owned by {:?}, used from {:?}", self.0, current))
        }
    }
}

/// Protocol violation on a `field`/`term` enumerator.
fn violation(field: &str, term: &[u8], doc: Option<crate::DocId>, what: String) -> Box<Mismatch> {
    Box::new(Mismatch {
        what: Check::EnumState,
        field: field.to_string(),
        term: term.to_vec(),
        seed: None,
        doc,
        expected: "a valid call sequence".into(),
        actual: what,
    })
}

fn latched(mismatch: &Mismatch) -> Error {
    Error::Mismatch(Box::new(mismatch.clone()))
}
