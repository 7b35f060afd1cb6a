use super::{OwnerToken, latched, violation};
use crate::codec::{ImpactsEnum, PostingsEnum};
use crate::error::{Error, Mismatch, Result};
use crate::index::{FixedBitSet, Impacts};
use crate::{DocId, NO_MORE_DOCS, UNPOSITIONED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocState {
    Start,
    Iterating,
    Finished,
}

/// Protocol-checking decorator over any postings or impacts enumerator.
pub struct AssertingPostingsEnum<E> {
    inner: E,
    owner: OwnerToken,
    field: String,
    term: Vec<u8>,
    state: DocState,
    doc: DocId,
    freq: Option<i32>,
    positions_read: i32,
    last_position: i32,
    last_shallow_target: DocId,
    violation: Option<Box<Mismatch>>,
}

impl<E: PostingsEnum> AssertingPostingsEnum<E> {
    pub fn new(inner: E, field: impl Into<String>, term: &[u8]) -> Self {
        let doc = inner.doc_id();
        Self {
            inner,
            owner: OwnerToken::current(),
            field: field.into(),
            term: term.to_vec(),
            state: DocState::Start,
            doc,
            freq: None,
            positions_read: 0,
            last_position: 0,
            last_shallow_target: -1,
            violation: None,
        }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    fn error(&self, what: String) -> Error {
        Error::Mismatch(violation(&self.field, &self.term, Some(self.doc), what))
    }

    fn fail(&mut self, what: String) -> Error {
        let mismatch = violation(&self.field, &self.term, Some(self.doc), what);
        let err = latched(&mismatch);
        self.violation = Some(mismatch);
        err
    }

    /// Owner and latch checks shared by every call.
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
        match self.state {
            DocState::Iterating => Ok(()),
            DocState::Start => Err(self.error(format!("{} called before next_doc/advance", call))),
            DocState::Finished => Err(self.error(format!("{} called after NO_MORE_DOCS", call))),
        }
    }

    fn check_on_position(&self, call: &str) -> Result<()> {
        self.check_positioned(call)?;
        if self.positions_read == 0 {
            return Err(self.error(format!("{} called before next_position", call)));
        }
        Ok(())
    }

    fn moved_to(&mut self, previous: DocId, doc: DocId, target: Option<DocId>) -> Result<DocId> {
        if doc <= previous {
            return Err(self.fail(format!("doc id went from {} to {}", previous, doc)));
        }
        if let Some(target) = target
            && doc < target
        {
            return Err(self.fail(format!("advance({}) returned {}", target, doc)));
        }
        let reported = self.inner.doc_id();
        if reported != doc {
            return Err(self.fail(format!("returned {} but doc_id() is {}", doc, reported)));
        }
        self.doc = doc;
        self.freq = None;
        self.positions_read = 0;
        self.last_position = 0;
        self.state = if doc == NO_MORE_DOCS {
            DocState::Finished
        } else {
            DocState::Iterating
        };
        Ok(doc)
    }

    fn check_move(&mut self, call: &str) -> Result<DocId> {
        self.check_access()?;
        if self.state == DocState::Finished {
            return Err(self.fail(format!("{} called after NO_MORE_DOCS", call)));
        }
        Ok(self.doc)
    }
}

impl<E: PostingsEnum> PostingsEnum for AssertingPostingsEnum<E> {
    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        let previous = self.check_move("next_doc")?;
        let doc = self.inner.next_doc()?;
        self.moved_to(previous, doc, None)
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let previous = self.check_move("advance")?;
        if target <= previous {
            return Err(self.fail(format!("advance({}) while on doc {}", target, previous)));
        }
        let doc = self.inner.advance(target)?;
        self.moved_to(previous, doc, Some(target))
    }

    fn freq(&self) -> Result<i32> {
        self.check_positioned("freq")?;
        let freq = self.inner.freq()?;
        if freq <= 0 {
            return Err(self.error(format!("freq {} is not positive", freq)));
        }
        Ok(freq)
    }

    fn next_position(&mut self) -> Result<i32> {
        self.check_positioned("next_position")?;
        let freq = match self.freq {
            Some(freq) => freq,
            None => {
                let freq = self.inner.freq()?;
                self.freq = Some(freq);
                freq
            }
        };
        if self.positions_read >= freq {
            return Err(self.fail(format!(
                "next_position called {} times with freq {}",
                self.positions_read + 1,
                freq
            )));
        }
        let position = self.inner.next_position()?;
        if position != UNPOSITIONED && position < self.last_position {
            return Err(self.fail(format!(
                "position {} after {}",
                position, self.last_position
            )));
        }
        self.positions_read += 1;
        self.last_position = position.max(0);
        Ok(position)
    }

    fn start_offset(&self) -> Result<i32> {
        self.check_on_position("start_offset")?;
        let start = self.inner.start_offset()?;
        if start < -1 {
            return Err(self.error(format!("start offset {}", start)));
        }
        Ok(start)
    }

    fn end_offset(&self) -> Result<i32> {
        self.check_on_position("end_offset")?;
        let end = self.inner.end_offset()?;
        let start = self.inner.start_offset()?;
        if (start == -1) != (end == -1) || end < start {
            return Err(self.error(format!("offsets [{}, {})", start, end)));
        }
        Ok(end)
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        self.check_on_position("payload")?;
        match self.inner.payload()? {
            Some([]) => Err(self.error("empty payload instead of None".into())),
            payload => Ok(payload),
        }
    }

    fn cost(&self) -> i64 {
        self.inner.cost()
    }

    fn into_bit_set(&mut self, up_to: DocId, bit_set: &mut FixedBitSet, offset: DocId) -> Result<()> {
        self.check_positioned("into_bit_set")?;
        let previous = self.doc;
        if offset > previous {
            return Err(self.fail(format!("bit set offset {} past doc {}", offset, previous)));
        }
        self.inner.into_bit_set(up_to, bit_set, offset)?;
        let doc = self.inner.doc_id();
        if doc < up_to {
            return Err(self.fail(format!("into_bit_set({}) stopped on {}", up_to, doc)));
        }
        if doc != previous {
            self.moved_to(previous, doc, None)?;
        }
        Ok(())
    }
}

impl<E: ImpactsEnum> ImpactsEnum for AssertingPostingsEnum<E> {
    fn advance_shallow(&mut self, target: DocId) -> Result<()> {
        self.check_access()?;
        if target < self.doc {
            return Err(self.fail(format!(
                "advance_shallow({}) behind doc {}",
                target, self.doc
            )));
        }
        self.inner.advance_shallow(target)?;
        self.last_shallow_target = target;
        Ok(())
    }

    fn impacts(&mut self) -> Result<Impacts> {
        self.check_access()?;
        let impacts = self.inner.impacts()?;
        let floor = self.last_shallow_target.max(self.doc);
        if impacts.num_levels() == 0 {
            return Err(self.fail("impacts without levels".into()));
        }
        if impacts.doc_id_up_to(0) < floor {
            return Err(self.fail(format!(
                "level 0 ends at {} before {}",
                impacts.doc_id_up_to(0),
                floor
            )));
        }
        Ok(impacts)
    }
}
