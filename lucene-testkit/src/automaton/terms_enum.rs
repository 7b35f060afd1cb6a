//! Terms enum filtered through a run automaton

use std::sync::Arc;

use super::dfa::RunAutomaton;
use crate::codec::{ImpactsEnum, PostingsEnum, SeekStatus, TermState, TermsEnum};
use crate::error::{Error, Result};
use crate::index::PostingsFlags;

/// Yields the terms of `inner` accepted by the automaton and strictly
/// greater than the optional start term. Seeking is not supported.
pub struct AutomatonTermsEnum {
    inner: Box<dyn TermsEnum>,
    run: Arc<RunAutomaton>,
    start_term: Option<Vec<u8>>,
    started: bool,
    done: bool,
}

impl AutomatonTermsEnum {
    pub fn new(inner: Box<dyn TermsEnum>, run: Arc<RunAutomaton>, start_term: Option<&[u8]>) -> Self {
        Self {
            inner,
            run,
            start_term: start_term.map(<[u8]>::to_vec),
            started: false,
            done: false,
        }
    }

    /// Position `inner` on the first term > start, or on the first term.
    /// Returns false when nothing is left.
    fn position_after_start(&mut self) -> Result<bool> {
        let Some(start) = self.start_term.take() else {
            return Ok(self.inner.next()?.is_some());
        };
        match self.inner.seek_ceil(&start)? {
            SeekStatus::End => Ok(false),
            SeekStatus::NotFound => Ok(true),
            SeekStatus::Found => Ok(self.inner.next()?.is_some()),
        }
    }
}

impl TermsEnum for AutomatonTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.done {
            return Ok(None);
        }
        let mut positioned = if self.started {
            self.inner.next()?.is_some()
        } else {
            self.started = true;
            self.position_after_start()?
        };
        while positioned && !self.run.run(self.inner.term()) {
            positioned = self.inner.next()?.is_some();
        }
        if !positioned {
            self.done = true;
            return Ok(None);
        }
        Ok(Some(self.inner.term()))
    }

    fn term(&self) -> &[u8] {
        self.inner.term()
    }

    fn seek_ceil(&mut self, _term: &[u8]) -> Result<SeekStatus> {
        Err(Error::Unsupported("seek on an intersected terms enum".into()))
    }

    fn seek_exact(&mut self, _term: &[u8]) -> Result<bool> {
        Err(Error::Unsupported("seek on an intersected terms enum".into()))
    }

    fn ord(&self) -> Result<u64> {
        self.inner.ord()
    }

    fn term_state(&self) -> Result<TermState> {
        self.inner.term_state()
    }

    fn seek_exact_state(&mut self, _term: &[u8], _state: &TermState) -> Result<()> {
        Err(Error::Unsupported("seek on an intersected terms enum".into()))
    }

    fn doc_freq(&self) -> Result<i32> {
        self.inner.doc_freq()
    }

    fn total_term_freq(&self) -> Result<i64> {
        self.inner.total_term_freq()
    }

    fn postings(&mut self, flags: PostingsFlags) -> Result<Option<Box<dyn PostingsEnum>>> {
        self.inner.postings(flags)
    }

    fn impacts(&mut self, flags: PostingsFlags) -> Result<Box<dyn ImpactsEnum>> {
        self.inner.impacts(flags)
    }
}
