//! Synthetic field/term corpus
//!
//! Maps field name to a byte-sorted list of terms, each carrying the seed of
//! its oracle stream and its ordinal within the field. Built once, then
//! shared read-only by every verification worker.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;

use super::seed::SeedPostings;
use crate::codec::PostingsEnum;
use crate::config::TestConfig;
use crate::error::{Error, Result};
use crate::index::{FieldInfo, FieldInfos, IndexOptions};
use crate::{DocId, NO_MORE_DOCS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedAndOrd {
    pub seed: u64,
    pub ord: u64,
}

/// Flattened corpus entry used to pick seek targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAndTerm {
    pub field: String,
    pub term: Vec<u8>,
    pub ord: u64,
}

/// Doc frequency class of a term, encoded in its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermClass {
    Big,
    Medium,
    Low,
    VeryLow,
}

impl TermClass {
    pub fn prefix(self) -> &'static str {
        match self {
            TermClass::Big => "big_",
            TermClass::Medium => "medium_",
            TermClass::Low => "low_",
            TermClass::VeryLow => "verylow_",
        }
    }

    pub fn of(term: &[u8]) -> Self {
        [TermClass::Big, TermClass::Medium, TermClass::Low]
            .into_iter()
            .find(|class| term.starts_with(class.prefix().as_bytes()))
            .unwrap_or(TermClass::VeryLow)
    }

    /// Inclusive doc freq bounds; `verylow_` ignores the multiplier.
    pub fn doc_freq_range(self, multiplier: i32) -> (i32, i32) {
        match self {
            TermClass::Big => (50_000 * multiplier, 70_000 * multiplier),
            TermClass::Medium => (3_000 * multiplier, 6_000 * multiplier),
            TermClass::Low => (multiplier, 40 * multiplier),
            TermClass::VeryLow => (1, 3),
        }
    }
}

/// One field's terms in byte order; `terms[i].1.ord == i`.
#[derive(Debug, Clone)]
pub struct FieldTerms {
    terms: Vec<(Vec<u8>, SeedAndOrd)>,
}

impl FieldTerms {
    fn from_sorted(map: BTreeMap<Vec<u8>, u64>) -> Self {
        let terms = map
            .into_iter()
            .enumerate()
            .map(|(ord, (term, seed))| {
                (
                    term,
                    SeedAndOrd {
                        seed,
                        ord: ord as u64,
                    },
                )
            })
            .collect();
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn get(&self, term: &[u8]) -> Option<SeedAndOrd> {
        self.find(term).ok().map(|ord| self.terms[ord].1)
    }

    /// `Ok(ord)` when present, else `Err(insertion point)`.
    pub fn find(&self, term: &[u8]) -> std::result::Result<usize, usize> {
        self.terms.binary_search_by(|(t, _)| t.as_slice().cmp(term))
    }

    pub fn entry(&self, ord: usize) -> Option<(&[u8], SeedAndOrd)> {
        self.terms.get(ord).map(|(t, s)| (t.as_slice(), *s))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[u8], SeedAndOrd)> {
        self.terms.iter().map(|(t, s)| (t.as_slice(), *s))
    }
}

#[derive(Debug)]
pub struct Corpus {
    fields: BTreeMap<String, Arc<FieldTerms>>,
    /// Every field at the strongest options, with payloads
    field_infos: Arc<FieldInfos>,
    all_terms: Vec<FieldAndTerm>,
    /// One past the largest doc id of any term
    max_doc: DocId,
    multiplier: i32,
}

impl Corpus {
    /// Random corpus: 1..=`max_fields` fields, each with 2..=`max_terms`
    /// terms (or `at_least(50)` one time in ten).
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, config: &TestConfig) -> Result<Self> {
        let num_fields = rng.random_range(1..=config.max_fields);
        let mut fields: Vec<(String, BTreeMap<Vec<u8>, u64>)> = Vec::with_capacity(num_fields);

        for field_upto in 1..=num_fields {
            let name = loop {
                let candidate = random_simple_string(rng, 1, 10);
                if fields.iter().all(|(f, _)| *f != candidate) {
                    break candidate;
                }
            };

            let num_terms = if rng.random_range(0..10) == 7 {
                config.at_least(rng, 50)
            } else {
                rng.random_range(2..=config.max_terms)
            };

            let mut terms: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
            while terms.len() < num_terms {
                let term_upto = terms.len();
                let base = random_simple_string(rng, 0, 10);
                let class = if config.nightly && term_upto == 0 && field_upto == 1 {
                    TermClass::Big
                } else if term_upto == 1 && field_upto == 1 {
                    TermClass::Medium
                } else if rng.random_bool(0.5) {
                    TermClass::Low
                } else {
                    TermClass::VeryLow
                };
                let term = format!("{}{}", class.prefix(), base).into_bytes();
                if terms.contains_key(&term) {
                    continue;
                }
                terms.insert(term, rng.random::<u64>());
            }
            fields.push((name, terms));
        }

        Self::from_terms(fields, config.multiplier as i32)
    }

    /// Corpus over explicit `(field, [(term, seed)])` lists. Field numbers
    /// follow the given order.
    pub fn from_terms<F, T>(fields: F, multiplier: i32) -> Result<Self>
    where
        F: IntoIterator<Item = (String, T)>,
        T: IntoIterator<Item = (Vec<u8>, u64)>,
    {
        let mut by_name = BTreeMap::new();
        let mut infos = Vec::new();
        let mut max_doc = 0;

        for (number, (name, terms)) in fields.into_iter().enumerate() {
            let terms: BTreeMap<Vec<u8>, u64> = terms.into_iter().collect();
            if terms.is_empty() {
                return Err(Error::Config(format!("field {:?} has no terms", name)));
            }
            for (term, &seed) in &terms {
                max_doc = max_doc.max(last_doc(term, seed, multiplier)?);
            }
            infos.push(
                FieldInfo::new(
                    name.clone(),
                    number as u32,
                    IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
                )
                .with_payloads(true),
            );
            if by_name
                .insert(name.clone(), Arc::new(FieldTerms::from_sorted(terms)))
                .is_some()
            {
                return Err(Error::Config(format!("duplicate field {:?}", name)));
            }
        }

        let all_terms = by_name
            .iter()
            .flat_map(|(field, terms)| {
                terms.iter().map(move |(term, seed_and_ord)| FieldAndTerm {
                    field: field.clone(),
                    term: term.to_vec(),
                    ord: seed_and_ord.ord,
                })
            })
            .collect();

        Ok(Self {
            fields: by_name,
            field_infos: Arc::new(FieldInfos::new(infos)?),
            all_terms,
            max_doc: max_doc + 1,
            multiplier,
        })
    }

    pub fn max_doc(&self) -> DocId {
        self.max_doc
    }

    pub fn multiplier(&self) -> i32 {
        self.multiplier
    }

    pub fn field_infos(&self) -> &Arc<FieldInfos> {
        &self.field_infos
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldTerms>> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Arc<FieldTerms>> {
        &self.fields
    }

    pub fn all_terms(&self) -> &[FieldAndTerm] {
        &self.all_terms
    }

    pub fn num_terms(&self) -> usize {
        self.all_terms.len()
    }

    /// Regenerate the oracle stream of `term` at `options`.
    pub fn seed_postings(
        &self,
        term: &[u8],
        seed: u64,
        options: IndexOptions,
        allow_payloads: bool,
    ) -> SeedPostings {
        seed_postings(term, seed, self.multiplier, options, allow_payloads)
    }
}

pub(crate) fn seed_postings(
    term: &[u8],
    seed: u64,
    multiplier: i32,
    options: IndexOptions,
    allow_payloads: bool,
) -> SeedPostings {
    let (min, max) = TermClass::of(term).doc_freq_range(multiplier);
    SeedPostings::new(seed, min, max, options, allow_payloads)
}

/// Last doc id of a term's docs-only stream (0 for an empty stream).
fn last_doc(term: &[u8], seed: u64, multiplier: i32) -> Result<DocId> {
    let mut postings = seed_postings(term, seed, multiplier, IndexOptions::Docs, true);
    let mut last = 0;
    loop {
        let doc = postings.next_doc()?;
        if doc == NO_MORE_DOCS {
            return Ok(last);
        }
        last = doc;
    }
}

fn random_simple_string<R: Rng + ?Sized>(rng: &mut R, min: usize, max: usize) -> String {
    let len = rng.random_range(min..=max);
    (0..len)
        .map(|_| rng.random_range(b'a'..=b'z') as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_term_class_by_prefix() {
        assert_eq!(TermClass::of(b"big_x"), TermClass::Big);
        assert_eq!(TermClass::of(b"medium_"), TermClass::Medium);
        assert_eq!(TermClass::of(b"low_abc"), TermClass::Low);
        assert_eq!(TermClass::of(b"verylow_abc"), TermClass::VeryLow);
        assert_eq!(TermClass::of(b"other"), TermClass::VeryLow);
        assert_eq!(TermClass::Low.doc_freq_range(2), (2, 80));
        assert_eq!(TermClass::VeryLow.doc_freq_range(5), (1, 3));
    }

    #[test]
    fn test_generated_corpus_shape() {
        let config = TestConfig::default();
        let mut rng = StdRng::seed_from_u64(1234);
        let corpus = Corpus::generate(&mut rng, &config).unwrap();

        assert!((1..=config.max_fields).contains(&corpus.fields().len()));
        assert_eq!(corpus.field_infos().len(), corpus.fields().len());
        let total: usize = corpus.fields().values().map(|t| t.len()).sum();
        assert_eq!(total, corpus.num_terms());

        for (name, terms) in corpus.fields() {
            assert!(terms.len() >= 2, "field {}", name);
            let mut previous: Option<&[u8]> = None;
            for (ord, (term, seed_and_ord)) in terms.iter().enumerate() {
                assert_eq!(seed_and_ord.ord, ord as u64);
                if let Some(previous) = previous {
                    assert!(previous < term);
                }
                previous = Some(term);
            }
        }

        // The first field carries a medium term
        let first = corpus.field_infos().by_number(0).unwrap();
        let first_terms = corpus.field(&first.name).unwrap();
        assert!(
            first_terms
                .iter()
                .any(|(t, _)| TermClass::of(t) == TermClass::Medium)
        );
    }

    #[test]
    fn test_max_doc_covers_every_stream() {
        let mut rng = StdRng::seed_from_u64(99);
        let corpus = Corpus::generate(&mut rng, &TestConfig::default()).unwrap();
        for entry in corpus.all_terms() {
            let seed = corpus.field(&entry.field).unwrap().get(&entry.term).unwrap().seed;
            let mut postings =
                corpus.seed_postings(&entry.term, seed, IndexOptions::Docs, true);
            let mut doc = postings.next_doc().unwrap();
            while doc != NO_MORE_DOCS {
                assert!(doc < corpus.max_doc());
                doc = postings.next_doc().unwrap();
            }
        }
    }

    #[test]
    fn test_from_terms_assigns_ords() {
        let corpus = Corpus::from_terms(
            vec![(
                "body".to_string(),
                vec![(b"verylow_b".to_vec(), 2), (b"verylow_a".to_vec(), 1)],
            )],
            1,
        )
        .unwrap();
        let terms = corpus.field("body").unwrap();
        assert_eq!(terms.entry(0).unwrap().0, b"verylow_a");
        assert_eq!(terms.get(b"verylow_b").unwrap(), SeedAndOrd { seed: 2, ord: 1 });
        assert_eq!(corpus.all_terms().len(), 2);
    }
}
