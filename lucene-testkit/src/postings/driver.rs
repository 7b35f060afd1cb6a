//! Randomized postings tester: builds a codec index from the corpus and
//! verifies every term, optionally on several workers at once
//!
//! Workers share the corpus and the `FieldsProducer` read-only; each pulls
//! its own enumerators and runs its own random source. The first failure
//! cancels the round, and a round that outlives its deadline fails with
//! `Error::Timeout`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, bounded};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;

use super::corpus::{Corpus, FieldAndTerm};
use super::features::{FeatureSet, TestFeature};
use super::seed_fields::{FakeNorms, SeedFields};
use super::verify::{TermUnderTest, Verifier, VerifyScope};
use crate::DocId;
use crate::automaton::{CompiledAutomaton, random_automaton};
use crate::codec::{
    Capabilities, Fields, FieldsProducer, PostingsFormat, SegmentWriteState, TermState, Terms,
    TermsEnum,
};
use crate::config::{TestConfig, TestContext};
use crate::directories::{Directory, MockDirectoryWrapper, RamDirectory};
use crate::error::{Check, Error, Mismatch, Result, display_term};
use crate::index::{FieldInfo, FieldInfos, IndexOptions};

/// Random automata drawn per field before giving up on intersect
const MAX_INTERSECT_ATTEMPTS: usize = 100;
/// Tries at drawing a non-empty accepted start term
const START_TERM_TRIES: usize = 100;
const MAX_START_TERM_LEN: usize = 16;

/// A segment written by the codec under test, opened for reading.
#[derive(Clone)]
pub struct BuiltIndex {
    pub producer: Arc<dyn FieldsProducer>,
    /// Options each field was actually indexed with
    pub field_infos: Arc<FieldInfos>,
    /// Ceiling the index was built at; oracles are regenerated at this level
    pub max_index_options: IndexOptions,
    pub capabilities: Capabilities,
    pub max_doc: DocId,
    pub segment_name: String,
}

pub struct RandomPostingsTester {
    seed: u64,
    config: TestConfig,
    corpus: Arc<Corpus>,
    rng: StdRng,
    segments_built: usize,
}

impl RandomPostingsTester {
    /// Build a random corpus from `seed`.
    pub fn new(seed: u64, config: TestConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(seed);
        let corpus = Corpus::generate(&mut rng, &config)?;
        Ok(Self::with_rng(seed, config, corpus, rng))
    }

    pub fn from_context(ctx: &TestContext) -> Result<Self> {
        Self::new(ctx.seed, ctx.config.clone())
    }

    /// Use a caller-built corpus instead of a random one.
    pub fn with_corpus(seed: u64, config: TestConfig, corpus: Corpus) -> Self {
        Self::with_rng(seed, config, corpus, StdRng::seed_from_u64(seed))
    }

    fn with_rng(seed: u64, config: TestConfig, corpus: Corpus, rng: StdRng) -> Self {
        log::info!(
            "[postings_tester] seed=0x{:016x} fields={} terms={} maxDoc={}",
            seed,
            corpus.fields().len(),
            corpus.num_terms(),
            corpus.max_doc()
        );
        Self {
            seed,
            config,
            corpus: Arc::new(corpus),
            rng,
            segments_built: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Flush the corpus through `format` and reopen it.
    ///
    /// Each field is indexed at a random level up to `max_allowed` (exactly
    /// `max_allowed` when `always_test_max`), with payloads when positional
    /// and `allow_payloads`. Codec failures propagate untouched.
    pub fn build_index(
        &mut self,
        format: &dyn PostingsFormat,
        directory: Arc<dyn Directory>,
        max_allowed: IndexOptions,
        allow_payloads: bool,
        always_test_max: bool,
    ) -> Result<BuiltIndex> {
        if !max_allowed.is_indexed() {
            return Err(Error::Config(format!(
                "cannot build an index at {}",
                max_allowed
            )));
        }

        let mut infos = Vec::with_capacity(self.corpus.field_infos().len());
        for wide in self.corpus.field_infos().iter() {
            let options = if always_test_max {
                max_allowed
            } else {
                let idx = self.rng.random_range(1..=max_allowed.index());
                IndexOptions::from_index(idx)
                    .ok_or_else(|| Error::Config(format!("no index options at {}", idx)))?
            };
            let do_payloads = options.has_positions() && allow_payloads;
            infos.push(
                FieldInfo::new(wide.name.clone(), wide.number, options)
                    .with_payloads(do_payloads)
                    .with_norms(wide.has_norms),
            );
        }
        let field_infos = Arc::new(FieldInfos::new(infos)?);
        self.corpus.field_infos().check_narrowing(&field_infos)?;

        let segment_name = format!("_{}", self.segments_built);
        self.segments_built += 1;
        let write_state = SegmentWriteState {
            directory,
            segment_name: segment_name.clone(),
            max_doc: self.corpus.max_doc(),
            field_infos: Arc::clone(&field_infos),
        };

        let seed_fields = SeedFields::new(
            Arc::clone(&self.corpus),
            Arc::clone(&field_infos),
            max_allowed,
            allow_payloads,
        );
        let mut consumer = format.fields_consumer(&write_state)?;
        consumer.write(&seed_fields, &FakeNorms)?;
        consumer.close()?;

        let producer = format.fields_producer(&write_state.to_read_state())?;
        log::debug!(
            "[postings_tester] built {} with {} at {} (payloads={}, alwaysTestMax={})",
            segment_name,
            format.name(),
            max_allowed,
            allow_payloads,
            always_test_max
        );

        Ok(BuiltIndex {
            producer,
            field_infos,
            max_index_options: max_allowed,
            capabilities: format.capabilities(),
            max_doc: self.corpus.max_doc(),
            segment_name,
        })
    }

    /// Field iteration must be exactly the corpus fields in sorted order,
    /// and each field's terms exactly the corpus terms.
    pub fn test_fields<F: Fields + ?Sized>(
        &self,
        fields: &F,
        field_infos: &FieldInfos,
    ) -> Result<()> {
        let expected: Vec<String> = self.corpus.field_names().map(str::to_string).collect();
        let actual = fields.field_names();
        if actual != expected {
            return Err(fields_mismatch(
                "",
                format!("{:?}", expected),
                format!("{:?}", actual),
            ));
        }
        if fields.size() != expected.len() {
            return Err(fields_mismatch(
                "",
                format!("{} fields", expected.len()),
                format!("{} fields", fields.size()),
            ));
        }
        // Corpus field names are lowercase letters only
        if fields.terms("_unknown_")?.is_some() {
            return Err(fields_mismatch("_unknown_", "no terms", "terms"));
        }

        for (name, corpus_terms) in self.corpus.fields() {
            let info = field_infos
                .by_name(name)
                .ok_or_else(|| Error::Codec(format!("no field info for {:?}", name)))?;
            let terms = fields
                .terms(name)?
                .ok_or_else(|| fields_mismatch(name, "terms", "none"))?;

            let size = terms.size();
            if size != -1 && size != corpus_terms.len() as i64 {
                return Err(fields_mismatch(
                    name,
                    format!("{} terms", corpus_terms.len()),
                    format!("{} terms", size),
                ));
            }
            let has = [
                ("freqs", terms.has_freqs(), info.index_options.has_freqs()),
                ("positions", terms.has_positions(), info.index_options.has_positions()),
                ("offsets", terms.has_offsets(), info.index_options.has_offsets()),
                ("payloads", terms.has_payloads(), info.has_payloads),
            ];
            for (what, got, want) in has {
                if got != want {
                    return Err(fields_mismatch(
                        name,
                        format!("has_{}={}", what, want),
                        format!("has_{}={}", what, got),
                    ));
                }
            }

            let mut terms_enum = terms.iterator()?;
            let mut expected_terms = corpus_terms.iter();
            loop {
                let want = expected_terms.next().map(|(t, _)| t);
                let got = terms_enum.next()?;
                if want != got {
                    return Err(fields_mismatch(
                        name,
                        want.map_or("end".into(), display_term),
                        got.map_or("end".into(), display_term),
                    ));
                }
                if want.is_none() {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Verify every corpus term against `index`.
    pub fn test_terms(
        &mut self,
        index: &BuiltIndex,
        features: FeatureSet,
        max_test_options: IndexOptions,
        always_test_max: bool,
    ) -> Result<()> {
        let round = Arc::new(Round {
            corpus: Arc::clone(&self.corpus),
            producer: Arc::clone(&index.producer),
            field_infos: Arc::clone(&index.field_infos),
            max_index_options: index.max_index_options,
            max_doc: index.max_doc,
            scope: VerifyScope {
                features,
                max_test_options,
                always_test_max,
            },
            ord_seeking: index.capabilities.ord_seeking,
        });

        if features.contains(TestFeature::Threads) {
            let num_threads = self.config.num_threads(&mut self.rng);
            let seeds: Vec<u64> = (0..num_threads).map(|_| self.rng.random()).collect();
            run_threaded(round, seeds, self.config.round_timeout())
        } else {
            let mut rng = StdRng::seed_from_u64(self.rng.random());
            round.test_terms_one_thread(&mut rng, &AtomicBool::new(false))
        }
    }

    /// Build at `options` with every check forced on, then verify at each
    /// tested level up to `options`, with and without payload checks.
    pub fn test_full(
        &mut self,
        ctx: &TestContext,
        options: IndexOptions,
        with_payloads: bool,
    ) -> Result<()> {
        let directory: Arc<dyn Directory> = Arc::new(MockDirectoryWrapper::new(
            Arc::new(RamDirectory::new()),
            self.rng.random(),
            ctx.config.fault_rate,
        ));
        let index = self.build_index(
            ctx.postings_format.as_ref(),
            directory,
            options,
            with_payloads,
            true,
        )?;
        index.producer.check_integrity()?;
        self.test_fields(index.producer.as_ref(), &index.field_infos)?;

        for i in 0..=options.index() {
            let max_test = IndexOptions::from_index(i)
                .ok_or_else(|| Error::Config(format!("no index options at {}", i)))?;
            self.test_terms(&index, FeatureSet::all(), max_test, true)?;
            if with_payloads {
                let without = FeatureSet::all().without(TestFeature::Payloads);
                self.test_terms(&index, without, max_test, true)?;
            }
        }
        Ok(())
    }
}

fn fields_mismatch(field: &str, expected: impl Into<String>, actual: impl Into<String>) -> Error {
    Error::Mismatch(Box::new(Mismatch {
        what: Check::Fields,
        field: field.to_string(),
        term: Vec::new(),
        seed: None,
        doc: None,
        expected: expected.into(),
        actual: actual.into(),
    }))
}

/// Read-only state shared by the workers of one round.
struct Round {
    corpus: Arc<Corpus>,
    producer: Arc<dyn FieldsProducer>,
    field_infos: Arc<FieldInfos>,
    max_index_options: IndexOptions,
    max_doc: DocId,
    scope: VerifyScope,
    ord_seeking: bool,
}

impl Round {
    fn verifier(&self) -> Verifier<'_> {
        Verifier {
            corpus: &self.corpus,
            max_index_options: self.max_index_options,
            max_doc: self.max_doc,
        }
    }

    fn field_info(&self, field: &str) -> Result<&FieldInfo> {
        self.field_infos
            .by_name(field)
            .ok_or_else(|| Error::Codec(format!("no field info for {:?}", field)))
    }

    fn terms(&self, field: &str) -> Result<Arc<dyn Terms>> {
        self.producer
            .terms(field)?
            .ok_or_else(|| fields_mismatch(field, "terms", "none"))
    }

    fn seed_of(&self, field: &str, term: &[u8]) -> Result<u64> {
        self.corpus
            .field(field)
            .and_then(|terms| terms.get(term))
            .map(|seed_and_ord| seed_and_ord.seed)
            .ok_or_else(|| {
                Error::Codec(format!(
                    "{} is not a corpus term of {:?}",
                    display_term(term),
                    field
                ))
            })
    }

    fn test_terms_one_thread(&self, rng: &mut StdRng, cancel: &AtomicBool) -> Result<()> {
        let verifier = self.verifier();
        let features = self.scope.features;
        let mut shuffled: Vec<FieldAndTerm> = self.corpus.all_terms().to_vec();
        shuffled.shuffle(rng);

        let mut supports_ords = self.ord_seeking;
        let mut supports_term_state = features.contains(TestFeature::TermState);
        let mut saved: Vec<(FieldAndTerm, TermState)> = Vec::new();

        for next in &shuffled {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let use_term_state = !saved.is_empty() && rng.random_range(0..5) == 1;
            let use_term_ord = supports_ords && !use_term_state && rng.random_range(0..5) == 1;

            let (entry, mut terms_enum) = if use_term_state {
                let (entry, state) = &saved[rng.random_range(0..saved.len())];
                let mut terms_enum = self.terms(&entry.field)?.iterator()?;
                terms_enum.seek_exact_state(&entry.term, state)?;
                (entry.clone(), terms_enum)
            } else {
                let mut terms_enum = self.terms(&next.field)?.iterator()?;
                let found = if use_term_ord {
                    match terms_enum.seek_exact_ord(next.ord) {
                        Ok(()) => true,
                        Err(e) if e.is_unsupported() => {
                            log::debug!("[postings_tester] ord seeking unsupported: {}", e);
                            supports_ords = false;
                            terms_enum.seek_exact(&next.term)?
                        }
                        Err(e) => return Err(e),
                    }
                } else {
                    terms_enum.seek_exact(&next.term)?
                };
                if !found {
                    return Err(Error::Mismatch(Box::new(Mismatch {
                        what: Check::Term,
                        field: next.field.clone(),
                        term: next.term.clone(),
                        seed: None,
                        doc: None,
                        expected: "seek_exact to find the term".into(),
                        actual: "not found".into(),
                    })));
                }
                (next.clone(), terms_enum)
            };

            let target = TermUnderTest {
                info: self.field_info(&entry.field)?,
                term: &entry.term,
                seed: self.seed_of(&entry.field, &entry.term)?,
            };
            target.expect_eq(
                Check::Term,
                None,
                display_term(&entry.term),
                display_term(terms_enum.term()),
            )?;

            if supports_ords {
                match terms_enum.ord() {
                    Ok(ord) => target.expect_eq(Check::Ord, None, entry.ord, ord)?,
                    Err(e) if e.is_unsupported() => {
                        log::debug!("[postings_tester] term ords unsupported: {}", e);
                        supports_ords = false;
                    }
                    Err(e) => return Err(e),
                }
            }

            let mut saved_state = false;
            if supports_term_state
                && !use_term_state
                && rng.random_range(0..5) == 1
                && let Some(state) = term_state(&*terms_enum, &mut supports_term_state)?
            {
                saved.push((entry.clone(), state));
                saved_state = true;
            }

            verifier.verify_enum(rng, &self.scope, &target, &mut *terms_enum)?;

            // The state must survive postings having been pulled
            if supports_term_state
                && !use_term_state
                && !saved_state
                && rng.random_range(0..5) == 1
                && let Some(state) = term_state(&*terms_enum, &mut supports_term_state)?
            {
                saved.push((entry.clone(), state));
            }

            // A second enum over the same term
            if self.scope.always_test_max || rng.random_range(0..10) == 7 {
                verifier.verify_enum(rng, &self.scope, &target, &mut *terms_enum)?;
            }
        }

        if features.contains(TestFeature::Intersect) {
            self.test_intersect(rng, cancel, &verifier)?;
        }
        Ok(())
    }

    /// `Terms::intersect` must yield exactly the corpus terms the automaton
    /// accepts beyond the start term, each with correct postings.
    fn test_intersect(
        &self,
        rng: &mut StdRng,
        cancel: &AtomicBool,
        verifier: &Verifier<'_>,
    ) -> Result<()> {
        for (field, field_terms) in self.corpus.fields() {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
            let samples: Vec<Vec<u8>> = field_terms.iter().map(|(t, _)| t.to_vec()).collect();
            let info = self.field_info(field)?;
            let terms = self.terms(field)?;

            let mut attempts = 0;
            loop {
                attempts += 1;
                if attempts > MAX_INTERSECT_ATTEMPTS {
                    log::warn!(
                        "[postings_tester] no usable automaton for {:?} after {} attempts",
                        field,
                        MAX_INTERSECT_ATTEMPTS
                    );
                    break;
                }

                let nfa = random_automaton(rng, &samples);
                let compiled = match CompiledAutomaton::compile(&nfa) {
                    Ok(compiled) => compiled,
                    // Too many states to determinize
                    Err(e) if e.is_unsupported() => continue,
                    Err(e) => return Err(e),
                };
                let Some(run) = compiled.run_automaton().cloned() else {
                    continue;
                };

                let start_term = if rng.random_bool(0.5) {
                    let accepted = (0..START_TERM_TRIES).find_map(|_| {
                        run.random_accepted(rng, MAX_START_TERM_LEN)
                            .filter(|t| !t.is_empty())
                    });
                    match accepted {
                        Some(term) => Some(term),
                        None => continue,
                    }
                } else {
                    None
                };

                let mut intersected = terms.intersect(&compiled, start_term.as_deref())?;
                let mut seen: FxHashSet<Vec<u8>> = FxHashSet::default();
                while let Some(term) = intersected.next()? {
                    let term = term.to_vec();
                    let seed = self.seed_of(field, &term)?;
                    let target = TermUnderTest {
                        info,
                        term: &term,
                        seed,
                    };
                    if let Some(start) = &start_term
                        && term <= *start
                    {
                        return Err(target.mismatch(
                            Check::Intersect,
                            None,
                            format_args!("a term > {}", display_term(start)),
                            display_term(&term),
                        ));
                    }
                    verifier.verify_enum(rng, &self.scope, &target, &mut *intersected)?;
                    seen.insert(term);
                }

                for (term, seed_and_ord) in field_terms.iter() {
                    let expected =
                        start_term.as_deref().is_none_or(|start| term > start) && run.run(term);
                    let actual = seen.contains(term);
                    if expected != actual {
                        let target = TermUnderTest {
                            info,
                            term,
                            seed: seed_and_ord.seed,
                        };
                        return Err(target.mismatch(
                            Check::Intersect,
                            None,
                            format_args!("accepted={}", expected),
                            format_args!("returned={}", actual),
                        ));
                    }
                }
                log::trace!(
                    "[postings_tester] intersect {:?}: {} terms after {} attempts",
                    field,
                    seen.len(),
                    attempts
                );
                break;
            }
        }
        Ok(())
    }
}

/// Capture the current term's state; `Unsupported` switches term-state
/// reuse off for the rest of the worker's run.
fn term_state(terms_enum: &dyn TermsEnum, supported: &mut bool) -> Result<Option<TermState>> {
    match terms_enum.term_state() {
        Ok(state) => Ok(Some(state)),
        Err(e) if e.is_unsupported() => {
            log::debug!("[postings_tester] term states unsupported: {}", e);
            *supported = false;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Run one worker per seed and join them, failing fast on the first error.
///
/// Workers that overrun `timeout` are left detached; they observe the
/// cancel flag at their next term.
fn run_threaded(round: Arc<Round>, seeds: Vec<u64>, timeout: Duration) -> Result<()> {
    let num_workers = seeds.len();
    let cancel = Arc::new(AtomicBool::new(false));
    let (result_tx, result_rx) = bounded::<(usize, Result<()>)>(num_workers);
    log::debug!(
        "[postings_tester] starting {} workers (timeout {:?})",
        num_workers,
        timeout
    );

    let mut handles = Vec::with_capacity(num_workers);
    for (worker, seed) in seeds.into_iter().enumerate() {
        let round = Arc::clone(&round);
        let cancel = Arc::clone(&cancel);
        let result_tx = result_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("postings-worker-{}", worker))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut rng = StdRng::seed_from_u64(seed);
                    round.test_terms_one_thread(&mut rng, &cancel)
                }))
                .unwrap_or_else(|payload| Err(Error::WorkerPanicked(panic_message(payload))));
                // The receiver is gone only after a timeout
                let _ = result_tx.send((worker, result));
            })?;
        handles.push(handle);
    }
    drop(result_tx);

    let deadline = Instant::now() + timeout;
    let mut first_error: Option<Error> = None;
    for _ in 0..num_workers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match result_rx.recv_timeout(remaining) {
            Ok((worker, Ok(()))) => {
                log::debug!("[postings_tester] worker {} finished", worker);
            }
            Ok((_, Err(Error::Cancelled))) => {}
            Ok((worker, Err(e))) => {
                if first_error.is_none() {
                    log::debug!("[postings_tester] worker {} failed, cancelling: {}", worker, e);
                    cancel.store(true, Ordering::Relaxed);
                    first_error = Some(e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::Relaxed);
                log::warn!("[postings_tester] round timed out after {:?}", timeout);
                return Err(Error::Timeout(timeout));
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for handle in handles {
        // Results were already collected; a join error means a panic outside
        // catch_unwind, which cannot happen after the send.
        let _ = handle.join();
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
