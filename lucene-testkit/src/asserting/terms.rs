use std::sync::Arc;

use super::{AssertingPostingsEnum, OwnerToken, latched, violation};
use crate::automaton::CompiledAutomaton;
use crate::codec::{ImpactsEnum, PostingsEnum, SeekStatus, TermState, Terms, TermsEnum};
use crate::error::{Error, Mismatch, Result};
use crate::index::PostingsFlags;

/// Decorates every terms enum it hands out.
pub struct AssertingTerms {
    inner: Arc<dyn Terms>,
    field: String,
}

impl AssertingTerms {
    pub fn new(inner: Arc<dyn Terms>, field: impl Into<String>) -> Self {
        Self {
            inner,
            field: field.into(),
        }
    }
}

impl Terms for AssertingTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(AssertingTermsEnum::new(
            self.inner.iterator()?,
            self.field.clone(),
        )))
    }

    fn intersect(
        &self,
        compiled: &CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum>> {
        let inner = self.inner.intersect(compiled, start_term)?;
        let mut terms_enum = AssertingTermsEnum::new(inner, self.field.clone());
        terms_enum.seekable = false;
        Ok(Box::new(terms_enum))
    }

    fn size(&self) -> i64 {
        self.inner.size()
    }

    fn doc_count(&self) -> i32 {
        self.inner.doc_count()
    }

    fn sum_doc_freq(&self) -> i64 {
        self.inner.sum_doc_freq()
    }

    fn sum_total_term_freq(&self) -> i64 {
        self.inner.sum_total_term_freq()
    }

    fn has_freqs(&self) -> bool {
        self.inner.has_freqs()
    }

    fn has_positions(&self) -> bool {
        self.inner.has_positions()
    }

    fn has_offsets(&self) -> bool {
        self.inner.has_offsets()
    }

    fn has_payloads(&self) -> bool {
        self.inner.has_payloads()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TermsState {
    Initial,
    Positioned,
    Unpositioned,
}

/// Checks positioning rules and `next` ordering of a terms enum, and wraps
/// the postings it returns.
pub struct AssertingTermsEnum {
    inner: Box<dyn TermsEnum>,
    owner: OwnerToken,
    field: String,
    state: TermsState,
    /// Last term returned by `next`, cleared by seeks
    last_next: Option<Vec<u8>>,
    /// Intersected enums must not be sought
    seekable: bool,
    violation: Option<Box<Mismatch>>,
}

impl AssertingTermsEnum {
    pub fn new(inner: Box<dyn TermsEnum>, field: impl Into<String>) -> Self {
        Self {
            inner,
            owner: OwnerToken::current(),
            field: field.into(),
            state: TermsState::Initial,
            last_next: None,
            seekable: true,
            violation: None,
        }
    }

    fn current_term(&self) -> &[u8] {
        if self.state == TermsState::Positioned {
            self.inner.term()
        } else {
            &[]
        }
    }

    fn error(&self, what: String) -> Error {
        Error::Mismatch(violation(&self.field, self.current_term(), None, what))
    }

    fn fail(&mut self, what: String) -> Error {
        let mismatch = violation(&self.field, self.current_term(), None, what);
        let err = latched(&mismatch);
        self.violation = Some(mismatch);
        err
    }

    fn check_access(&self) -> Result<()> {
        if let Some(mismatch) = &self.violation {
            return Err(latched(mismatch));
        }
        if let Some(what) = self.owner.check() {
            return Err(self.error(what));
        }
        Ok(())
    }

    fn check_positioned(&self, call: &str) -> Result<()> {
        self.check_access()?;
        if self.state != TermsState::Positioned {
            return Err(self.error(format!("{} called on an unpositioned terms enum", call)));
        }
        Ok(())
    }

    fn check_seek(&mut self, call: &str) -> Result<()> {
        self.check_access()?;
        if !self.seekable {
            return Err(self.fail(format!("{} called on an intersected terms enum", call)));
        }
        self.last_next = None;
        Ok(())
    }
}

impl TermsEnum for AssertingTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        self.check_access()?;
        if self.state == TermsState::Unpositioned {
            return Err(self.fail("next called after the enum was exhausted".into()));
        }
        let next = self.inner.next()?.map(<[u8]>::to_vec);
        match next {
            None => {
                self.state = TermsState::Unpositioned;
                Ok(None)
            }
            Some(term) => {
                if let Some(previous) = &self.last_next
                    && *previous >= term
                {
                    let what = format!("next went from {:?} to {:?}", previous, term);
                    return Err(self.fail(what));
                }
                self.last_next = Some(term);
                self.state = TermsState::Positioned;
                Ok(Some(self.inner.term()))
            }
        }
    }

    fn term(&self) -> &[u8] {
        self.inner.term()
    }

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        self.check_seek("seek_exact")?;
        let found = self.inner.seek_exact(term)?;
        self.state = if found {
            TermsState::Positioned
        } else {
            TermsState::Unpositioned
        };
        if found && self.inner.term() != term {
            return Err(self.fail(format!(
                "seek_exact({:?}) landed on {:?}",
                term,
                self.inner.term()
            )));
        }
        Ok(found)
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        self.check_seek("seek_ceil")?;
        let status = self.inner.seek_ceil(term)?;
        self.state = if status == SeekStatus::End {
            TermsState::Unpositioned
        } else {
            TermsState::Positioned
        };
        let landed = self.inner.term();
        let consistent = match status {
            SeekStatus::Found => landed == term,
            SeekStatus::NotFound => landed > term,
            SeekStatus::End => true,
        };
        if !consistent {
            let what = format!("seek_ceil({:?}) returned {:?} on {:?}", term, status, landed);
            return Err(self.fail(what));
        }
        Ok(status)
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        self.check_seek("seek_exact_ord")?;
        self.inner.seek_exact_ord(ord)?;
        self.state = TermsState::Positioned;
        Ok(())
    }

    fn ord(&self) -> Result<u64> {
        self.check_positioned("ord")?;
        self.inner.ord()
    }

    fn term_state(&self) -> Result<TermState> {
        self.check_positioned("term_state")?;
        self.inner.term_state()
    }

    fn seek_exact_state(&mut self, term: &[u8], state: &TermState) -> Result<()> {
        self.check_seek("seek_exact_state")?;
        self.inner.seek_exact_state(term, state)?;
        self.state = TermsState::Positioned;
        Ok(())
    }

    fn doc_freq(&self) -> Result<i32> {
        self.check_positioned("doc_freq")?;
        let doc_freq = self.inner.doc_freq()?;
        if doc_freq < 1 {
            return Err(self.error(format!("doc_freq {}", doc_freq)));
        }
        Ok(doc_freq)
    }

    fn total_term_freq(&self) -> Result<i64> {
        self.check_positioned("total_term_freq")?;
        let total = self.inner.total_term_freq()?;
        let doc_freq = self.inner.doc_freq()? as i64;
        if total != -1 && total < doc_freq {
            return Err(self.error(format!(
                "total_term_freq {} below doc_freq {}",
                total, doc_freq
            )));
        }
        Ok(total)
    }

    fn postings(&mut self, flags: PostingsFlags) -> Result<Option<Box<dyn PostingsEnum>>> {
        self.check_positioned("postings")?;
        let term = self.inner.term().to_vec();
        let postings = self.inner.postings(flags)?;
        Ok(postings.map(|inner| {
            Box::new(AssertingPostingsEnum::new(inner, self.field.clone(), &term))
                as Box<dyn PostingsEnum>
        }))
    }

    fn impacts(&mut self, flags: PostingsFlags) -> Result<Box<dyn ImpactsEnum>> {
        self.check_positioned("impacts")?;
        let term = self.inner.term().to_vec();
        let inner = self.inner.impacts(flags)?;
        Ok(Box::new(AssertingPostingsEnum::new(
            inner,
            self.field.clone(),
            &term,
        )))
    }
}
