//! `Fields` view over the corpus, fed to a codec's `FieldsConsumer`
//!
//! Every postings list is regenerated from its term seed on demand; nothing
//! but the sorted term lists is held in memory.

use std::sync::Arc;

use super::corpus::{Corpus, FieldTerms, seed_postings};
use crate::DocId;
use crate::codec::{Fields, NormsProducer, PostingsEnum, SeekStatus, TermState, Terms, TermsEnum};
use crate::error::{Error, Result};
use crate::index::{FieldInfo, FieldInfos, IndexOptions, PostingsFlags};

/// Norm the corpus assigns to `doc`.
pub fn fake_norm(doc: DocId) -> i64 {
    1 + (doc & 0x0F) as i64
}

/// Norm the verifier expects for `doc` in a field.
pub fn doc_to_norm(info: &FieldInfo, doc: DocId) -> i64 {
    if info.has_norms { fake_norm(doc) } else { 1 }
}

/// Norms producer matching `fake_norm`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeNorms;

impl NormsProducer for FakeNorms {
    fn norm(&self, field: &FieldInfo, doc: DocId) -> Result<i64> {
        if !field.has_norms {
            return Err(Error::Codec(format!("field {:?} has no norms", field.name)));
        }
        Ok(fake_norm(doc))
    }
}

pub struct SeedFields {
    corpus: Arc<Corpus>,
    field_infos: Arc<FieldInfos>,
    /// Strongest options any enum may be built with
    max_allowed: IndexOptions,
    allow_payloads: bool,
}

impl SeedFields {
    pub fn new(
        corpus: Arc<Corpus>,
        field_infos: Arc<FieldInfos>,
        max_allowed: IndexOptions,
        allow_payloads: bool,
    ) -> Self {
        Self {
            corpus,
            field_infos,
            max_allowed,
            allow_payloads,
        }
    }
}

impl Fields for SeedFields {
    fn field_names(&self) -> Vec<String> {
        self.corpus.field_names().map(str::to_string).collect()
    }

    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        let Some(terms) = self.corpus.field(field) else {
            return Ok(None);
        };
        if self.field_infos.by_name(field).is_none() {
            return Err(Error::Codec(format!("no field info for {:?}", field)));
        }
        // Streams are generated at the global level, whatever the field keeps,
        // so their random draws line up with the verifier's oracle.
        Ok(Some(Arc::new(SeedTerms {
            terms: Arc::clone(terms),
            multiplier: self.corpus.multiplier(),
            max_allowed: self.max_allowed,
            allow_payloads: self.allow_payloads,
        })))
    }

    fn size(&self) -> usize {
        self.corpus.fields().len()
    }
}

pub struct SeedTerms {
    terms: Arc<FieldTerms>,
    multiplier: i32,
    max_allowed: IndexOptions,
    allow_payloads: bool,
}

impl Terms for SeedTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(SeedTermsEnum {
            terms: Arc::clone(&self.terms),
            multiplier: self.multiplier,
            max_allowed: self.max_allowed,
            allow_payloads: self.allow_payloads,
            current: None,
        }))
    }

    fn size(&self) -> i64 {
        self.terms.len() as i64
    }

    fn doc_count(&self) -> i32 {
        -1
    }

    fn sum_doc_freq(&self) -> i64 {
        -1
    }

    fn sum_total_term_freq(&self) -> i64 {
        -1
    }

    fn has_freqs(&self) -> bool {
        self.max_allowed.has_freqs()
    }

    fn has_positions(&self) -> bool {
        self.max_allowed.has_positions()
    }

    fn has_offsets(&self) -> bool {
        self.max_allowed.has_offsets()
    }

    fn has_payloads(&self) -> bool {
        self.allow_payloads
    }
}

pub struct SeedTermsEnum {
    terms: Arc<FieldTerms>,
    multiplier: i32,
    max_allowed: IndexOptions,
    allow_payloads: bool,
    /// Ord of the current term
    current: Option<usize>,
}

impl SeedTermsEnum {
    fn position(&mut self, ord: usize) -> Option<&[u8]> {
        self.current = Some(ord);
        self.terms.entry(ord).map(|(term, _)| term)
    }
}

impl TermsEnum for SeedTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        let next = self.current.map_or(0, |ord| ord + 1);
        if next >= self.terms.len() {
            self.current = Some(self.terms.len());
            return Ok(None);
        }
        Ok(self.position(next))
    }

    fn term(&self) -> &[u8] {
        self.current
            .and_then(|ord| self.terms.entry(ord))
            .map_or(&[], |(term, _)| term)
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        match self.terms.find(term) {
            Ok(ord) => {
                self.current = Some(ord);
                Ok(SeekStatus::Found)
            }
            Err(ord) if ord < self.terms.len() => {
                self.current = Some(ord);
                Ok(SeekStatus::NotFound)
            }
            Err(ord) => {
                self.current = Some(ord);
                Ok(SeekStatus::End)
            }
        }
    }

    fn term_state(&self) -> Result<TermState> {
        Err(Error::Unsupported("term state of seed terms".into()))
    }

    fn seek_exact_state(&mut self, _term: &[u8], _state: &TermState) -> Result<()> {
        Err(Error::Unsupported("term state of seed terms".into()))
    }

    fn doc_freq(&self) -> Result<i32> {
        Err(Error::Unsupported("doc freq of seed terms".into()))
    }

    fn total_term_freq(&self) -> Result<i64> {
        Err(Error::Unsupported("total term freq of seed terms".into()))
    }

    fn postings(&mut self, flags: PostingsFlags) -> Result<Option<Box<dyn PostingsEnum>>> {
        let max = self.max_allowed;
        if flags.contains(PostingsFlags::POSITIONS) && !max.has_positions() {
            return Ok(None);
        }
        if flags.contains(PostingsFlags::OFFSETS) && !max.has_offsets() {
            return Ok(None);
        }
        if flags.contains(PostingsFlags::PAYLOADS) && !self.allow_payloads {
            return Ok(None);
        }
        if flags.contains(PostingsFlags::FREQS) && !max.has_freqs() {
            return Ok(None);
        }
        let (term, seed_and_ord) = self
            .current
            .and_then(|ord| self.terms.entry(ord))
            .ok_or_else(|| Error::Codec("postings requested while unpositioned".into()))?;
        Ok(Some(Box::new(seed_postings(
            term,
            seed_and_ord.seed,
            self.multiplier,
            max,
            self.allow_payloads,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_MORE_DOCS;

    fn corpus() -> Arc<Corpus> {
        Arc::new(
            Corpus::from_terms(
                vec![
                    (
                        "body".to_string(),
                        vec![(b"low_a".to_vec(), 1), (b"verylow_b".to_vec(), 2)],
                    ),
                    ("title".to_string(), vec![(b"verylow_c".to_vec(), 3)]),
                ],
                1,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_postings_respect_max_allowed() {
        let corpus = corpus();
        let fields = SeedFields::new(
            Arc::clone(&corpus),
            Arc::clone(corpus.field_infos()),
            IndexOptions::DocsAndFreqs,
            true,
        );
        assert_eq!(fields.field_names(), vec!["body", "title"]);
        assert!(fields.terms("missing").unwrap().is_none());

        let terms = fields.terms("body").unwrap().unwrap();
        assert!(!terms.has_positions());
        assert_eq!(terms.size(), 2);
        let mut te = terms.iterator().unwrap();
        assert_eq!(te.next().unwrap(), Some(&b"low_a"[..]));
        assert!(te.postings(PostingsFlags::POSITIONS).unwrap().is_none());
        assert!(te.postings(PostingsFlags::PAYLOADS).unwrap().is_none());
        let mut postings = te.postings(PostingsFlags::FREQS).unwrap().unwrap();
        assert_ne!(postings.next_doc().unwrap(), NO_MORE_DOCS);
        assert!(te.doc_freq().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_seek_ceil() {
        let corpus = corpus();
        let fields = SeedFields::new(
            Arc::clone(&corpus),
            Arc::clone(corpus.field_infos()),
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
            true,
        );
        let mut te = fields.terms("body").unwrap().unwrap().iterator().unwrap();
        assert_eq!(te.seek_ceil(b"m").unwrap(), SeekStatus::NotFound);
        assert_eq!(te.term(), b"verylow_b");
        assert_eq!(te.seek_ceil(b"z").unwrap(), SeekStatus::End);
        assert!(te.next().unwrap().is_none());
        assert!(te.seek_exact(b"low_a").unwrap());
    }

    #[test]
    fn test_fake_norms() {
        assert_eq!(fake_norm(0), 1);
        assert_eq!(fake_norm(31), 16);
        let info = FieldInfo::new("f", 0, IndexOptions::Docs).with_norms(false);
        assert_eq!(doc_to_norm(&info, 31), 1);
        assert!(FakeNorms.norm(&info, 3).is_err());
    }
}
