//! Codec wrappers that misbehave in controlled ways

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::automaton::CompiledAutomaton;
use crate::codec::{
    BlockPostingsFormat, Fields, FieldsConsumer, FieldsProducer, ImpactsEnum, PostingsEnum,
    PostingsFormat, SeekStatus, SegmentReadState, SegmentWriteState, TermState, Terms, TermsEnum,
};
use crate::config::{TestConfig, TestContext};
use crate::error::{Error, Result};
use crate::index::{FixedBitSet, Impact, ImpactLevel, Impacts, PostingsFlags};
use crate::{DocId, NO_MORE_DOCS, UNPOSITIONED};

/// Small corpus knobs so a full run stays quick.
pub fn small_config() -> TestConfig {
    TestConfig {
        max_fields: 2,
        max_terms: 6,
        ..TestConfig::default()
    }
}

pub fn block_context(seed: u64) -> TestContext {
    TestContext::new(seed, small_config(), Arc::new(BlockPostingsFormat::new()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distortion {
    /// Every freq is one too high
    FreqPlusOne,
    /// Every position is one too high
    ShiftedPositions,
    /// `ord` and `seek_exact_ord` are unsupported
    NoOrds,
    /// `term_state` is unsupported
    NoTermState,
    /// `next_doc` panics
    Panic,
    /// `next_doc` sleeps first
    Slow,
    /// `doc_id` keeps reporting the last doc once exhausted
    NoLatch,
    /// `advance` moves one doc past the right answer
    AdvancePastTarget,
    /// `into_bit_set` leaves the current doc unset
    BitSetSkipsCurrent,
    /// Every start offset is one too high
    ShiftedStartOffsets,
    /// Payloads lose their first byte
    TruncatedPayloads,
    /// Impacts claim every doc has freq 1
    LowImpacts,
    /// `intersect` returns every term, accepted or not
    IgnoresAutomaton,
}

/// Block format whose read side is distorted.
pub struct DistortedFormat {
    inner: BlockPostingsFormat,
    distortion: Distortion,
    name: String,
}

impl DistortedFormat {
    pub fn new(distortion: Distortion) -> Self {
        Self {
            inner: BlockPostingsFormat::new(),
            distortion,
            name: format!("Distorted({:?})", distortion),
        }
    }
}

impl PostingsFormat for DistortedFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        self.inner.fields_consumer(state)
    }

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Arc<dyn FieldsProducer>> {
        Ok(Arc::new(DistortedFields {
            inner: self.inner.fields_producer(state)?,
            distortion: self.distortion,
        }))
    }
}

struct DistortedFields {
    inner: Arc<dyn FieldsProducer>,
    distortion: Distortion,
}

impl Fields for DistortedFields {
    fn field_names(&self) -> Vec<String> {
        self.inner.field_names()
    }

    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        let distortion = self.distortion;
        Ok(self.inner.terms(field)?.map(|inner| {
            Arc::new(DistortedTerms { inner, distortion }) as Arc<dyn Terms>
        }))
    }
}

impl FieldsProducer for DistortedFields {
    fn check_integrity(&self) -> Result<()> {
        self.inner.check_integrity()
    }
}

struct DistortedTerms {
    inner: Arc<dyn Terms>,
    distortion: Distortion,
}

impl Terms for DistortedTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(DistortedTermsEnum {
            inner: self.inner.iterator()?,
            distortion: self.distortion,
        }))
    }

    fn intersect(
        &self,
        compiled: &CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum>> {
        if self.distortion == Distortion::IgnoresAutomaton {
            return self.iterator();
        }
        let inner = self.inner.intersect(compiled, start_term)?;
        Ok(Box::new(DistortedTermsEnum {
            inner,
            distortion: self.distortion,
        }))
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

struct DistortedTermsEnum {
    inner: Box<dyn TermsEnum>,
    distortion: Distortion,
}

impl TermsEnum for DistortedTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        self.inner.next()
    }

    fn term(&self) -> &[u8] {
        self.inner.term()
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        self.inner.seek_ceil(term)
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        if self.distortion == Distortion::NoOrds {
            return Err(Error::Unsupported("seek by ord".into()));
        }
        self.inner.seek_exact_ord(ord)
    }

    fn ord(&self) -> Result<u64> {
        if self.distortion == Distortion::NoOrds {
            return Err(Error::Unsupported("term ord".into()));
        }
        self.inner.ord()
    }

    fn term_state(&self) -> Result<TermState> {
        if self.distortion == Distortion::NoTermState {
            return Err(Error::Unsupported("term state".into()));
        }
        self.inner.term_state()
    }

    fn seek_exact_state(&mut self, term: &[u8], state: &TermState) -> Result<()> {
        self.inner.seek_exact_state(term, state)
    }

    fn doc_freq(&self) -> Result<i32> {
        self.inner.doc_freq()
    }

    fn total_term_freq(&self) -> Result<i64> {
        self.inner.total_term_freq()
    }

    fn postings(&mut self, flags: PostingsFlags) -> Result<Option<Box<dyn PostingsEnum>>> {
        let distortion = self.distortion;
        Ok(self.inner.postings(flags)?.map(|inner| {
            Box::new(DistortedPostings {
                inner,
                distortion,
                last_doc: UNPOSITIONED,
            }) as Box<dyn PostingsEnum>
        }))
    }

    fn impacts(&mut self, flags: PostingsFlags) -> Result<Box<dyn ImpactsEnum>> {
        let inner = self.inner.impacts(flags)?;
        if self.distortion == Distortion::LowImpacts {
            return Ok(Box::new(LowImpactsEnum { inner }));
        }
        Ok(inner)
    }
}

struct DistortedPostings {
    inner: Box<dyn PostingsEnum>,
    distortion: Distortion,
    /// Last doc before `NO_MORE_DOCS`
    last_doc: DocId,
}

impl DistortedPostings {
    fn before_move(&self) {
        match self.distortion {
            Distortion::Panic => panic!("distorted postings refuse to move"),
            Distortion::Slow => thread::sleep(Duration::from_millis(20)),
            _ => {}
        }
    }

    fn moved_to(&mut self, doc: DocId) -> DocId {
        if doc != NO_MORE_DOCS {
            self.last_doc = doc;
        }
        doc
    }
}

impl PostingsEnum for DistortedPostings {
    fn doc_id(&self) -> DocId {
        let doc = self.inner.doc_id();
        if self.distortion == Distortion::NoLatch && doc == NO_MORE_DOCS {
            return self.last_doc;
        }
        doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.before_move();
        let doc = self.inner.next_doc()?;
        Ok(self.moved_to(doc))
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.before_move();
        let mut doc = self.inner.advance(target)?;
        if self.distortion == Distortion::AdvancePastTarget && doc != NO_MORE_DOCS {
            doc = self.inner.next_doc()?;
        }
        Ok(self.moved_to(doc))
    }

    fn freq(&self) -> Result<i32> {
        let freq = self.inner.freq()?;
        if self.distortion == Distortion::FreqPlusOne {
            return Ok(freq + 1);
        }
        Ok(freq)
    }

    fn next_position(&mut self) -> Result<i32> {
        let position = self.inner.next_position()?;
        if self.distortion == Distortion::ShiftedPositions {
            return Ok(position + 1);
        }
        Ok(position)
    }

    fn start_offset(&self) -> Result<i32> {
        let offset = self.inner.start_offset()?;
        if self.distortion == Distortion::ShiftedStartOffsets && offset >= 0 {
            return Ok(offset + 1);
        }
        Ok(offset)
    }

    fn end_offset(&self) -> Result<i32> {
        self.inner.end_offset()
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        let payload = self.inner.payload()?;
        if self.distortion == Distortion::TruncatedPayloads {
            return Ok(payload.and_then(|bytes| bytes.get(1..)));
        }
        Ok(payload)
    }

    fn cost(&self) -> i64 {
        self.inner.cost()
    }

    fn into_bit_set(&mut self, up_to: DocId, bit_set: &mut FixedBitSet, offset: DocId) -> Result<()> {
        let mut doc = self.doc_id();
        if self.distortion == Distortion::BitSetSkipsCurrent {
            doc = self.next_doc()?;
        }
        while doc < up_to {
            bit_set.set((doc - offset) as usize);
            doc = self.next_doc()?;
        }
        Ok(())
    }
}

/// Impacts enum whose impacts understate every doc's freq.
struct LowImpactsEnum {
    inner: Box<dyn ImpactsEnum>,
}

impl PostingsEnum for LowImpactsEnum {
    fn doc_id(&self) -> DocId {
        self.inner.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.inner.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.inner.advance(target)
    }

    fn freq(&self) -> Result<i32> {
        self.inner.freq()
    }

    fn next_position(&mut self) -> Result<i32> {
        self.inner.next_position()
    }

    fn start_offset(&self) -> Result<i32> {
        self.inner.start_offset()
    }

    fn end_offset(&self) -> Result<i32> {
        self.inner.end_offset()
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        self.inner.payload()
    }

    fn cost(&self) -> i64 {
        self.inner.cost()
    }
}

impl ImpactsEnum for LowImpactsEnum {
    fn advance_shallow(&mut self, target: DocId) -> Result<()> {
        self.inner.advance_shallow(target)
    }

    fn impacts(&mut self) -> Result<Impacts> {
        let real = self.inner.impacts()?;
        let levels = (0..real.num_levels())
            .map(|level| ImpactLevel {
                doc_id_up_to: real.doc_id_up_to(level),
                impacts: vec![Impact::new(1, 1)],
            })
            .collect();
        Ok(Impacts::new(levels))
    }
}
