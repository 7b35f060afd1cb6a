//! Differential verification of one term's postings
//!
//! The codec's enumerators are replayed under a randomized read pattern and
//! compared, step by step, with an oracle regenerated from the term seed.
//! Three phases run per term: the main walk (stepping, skipping, partial
//! consumption), the impacts cross-check (when skipping is enabled) and the
//! bit-set cross-check.

use std::fmt;

use rand::Rng;

use super::corpus::Corpus;
use super::features::{FeatureSet, TestFeature};
use super::seed_fields::doc_to_norm;
use crate::codec::{ImpactsEnum, PostingsEnum, TermsEnum};
use crate::error::{Check, Error, Mismatch, Result};
use crate::index::{
    FieldInfo, FixedBitSet, Impact, Impacts, IndexOptions, PostingsFlags, check_impacts,
    lower_bound_by_freq,
};
use crate::{DocId, NO_MORE_DOCS, UNPOSITIONED};

/// What a verification round is allowed to exercise.
#[derive(Debug, Clone, Copy)]
pub struct VerifyScope {
    pub features: FeatureSet,
    pub max_test_options: IndexOptions,
    /// Check everything on every doc instead of sampling
    pub always_test_max: bool,
}

/// The term the codec's `TermsEnum` is positioned on.
#[derive(Debug, Clone, Copy)]
pub struct TermUnderTest<'a> {
    pub info: &'a FieldInfo,
    pub term: &'a [u8],
    pub seed: u64,
}

impl TermUnderTest<'_> {
    pub fn mismatch(
        &self,
        what: Check,
        doc: Option<DocId>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Error {
        Error::Mismatch(Box::new(Mismatch {
            what,
            field: self.info.name.clone(),
            term: self.term.to_vec(),
            seed: Some(self.seed),
            doc,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }))
    }

    pub fn expect_eq<T: PartialEq + fmt::Debug>(
        &self,
        what: Check,
        doc: Option<DocId>,
        expected: T,
        actual: T,
    ) -> Result<()> {
        if expected == actual {
            return Ok(());
        }
        Err(self.mismatch(
            what,
            doc,
            format_args!("{:?}", expected),
            format_args!("{:?}", actual),
        ))
    }
}

/// Which observables are compared for this term.
#[derive(Debug, Clone, Copy)]
struct Checks {
    freqs: bool,
    positions: bool,
    offsets: bool,
    payloads: bool,
}

pub struct Verifier<'a> {
    pub corpus: &'a Corpus,
    /// Options the index was built with; the oracle is generated at this level
    pub max_index_options: IndexOptions,
    pub max_doc: DocId,
}

impl Verifier<'_> {
    /// Verify the postings of the term `terms_enum` is positioned on.
    pub fn verify_enum<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        scope: &VerifyScope,
        target: &TermUnderTest<'_>,
        terms_enum: &mut dyn TermsEnum,
    ) -> Result<()> {
        let always = scope.always_test_max;
        let field_options = target.info.index_options;
        let max_test = scope.max_test_options;

        let allow_freqs = field_options.has_freqs() && max_test.has_freqs();
        let allow_positions = field_options.has_positions() && max_test.has_positions();
        let allow_offsets = field_options.has_offsets() && max_test.has_offsets();

        let checks = Checks {
            freqs: allow_freqs && (always || rng.random_range(0..3) <= 2),
            positions: allow_positions && (always || rng.random_range(0..3) <= 2),
            offsets: allow_offsets && (always || rng.random_range(0..3) <= 2),
            payloads: scope.features.contains(TestFeature::Payloads)
                && allow_positions
                && target.info.has_payloads
                && (always || rng.random_range(0..3) <= 2),
        };

        let flags = if !checks.positions {
            if allow_positions && rng.random_range(0..10) == 7 {
                // Ask for positional features and then ignore them
                let mut flags = PostingsFlags::POSITIONS;
                if always || rng.random_bool(0.5) {
                    flags |= PostingsFlags::OFFSETS;
                }
                if always || rng.random_bool(0.5) {
                    flags |= PostingsFlags::PAYLOADS;
                }
                flags
            } else if always || checks.freqs || rng.random_range(0..3) == 1 {
                PostingsFlags::FREQS
            } else {
                PostingsFlags::NONE
            }
        } else {
            let mut flags = PostingsFlags::POSITIONS;
            if always || checks.offsets || rng.random_range(0..3) == 1 {
                flags |= PostingsFlags::OFFSETS;
            }
            if always || checks.payloads || rng.random_range(0..3) == 1 {
                flags |= PostingsFlags::PAYLOADS;
            }
            flags
        };

        log::trace!(
            "[postings_tester] verify field={:?} term={} flags={:?} checks={:?}",
            target.info.name,
            crate::error::display_term(target.term),
            flags,
            checks
        );

        let mut postings = terms_enum.postings(flags)?.ok_or_else(|| {
            target.mismatch(Check::EnumState, None, "a postings enum", "none")
        })?;
        target.expect_eq(Check::EnumState, None, UNPOSITIONED, postings.doc_id())?;

        let mut expected = self.corpus.seed_postings(
            target.term,
            target.seed,
            self.max_index_options,
            true,
        );
        let doc_freq = expected.doc_freq();
        target.expect_eq(Check::DocFreq, None, doc_freq, terms_enum.doc_freq()?)?;

        let skipping = scope.features.contains(TestFeature::Skipping);
        let skip_chance = if always { 20 } else { rng.random_range(1..=40) };
        let num_skips = if doc_freq < 3 {
            1
        } else {
            rng.random_range(1..=(doc_freq / 3).min(20))
        };
        let skip_inc = (doc_freq / num_skips).max(1);
        let skip_doc_inc = (self.max_doc / num_skips).max(1);
        let do_all_skipping = skipping && rng.random_range(0..7) == 1;

        let freq_ask_chance = if always { 1.0 } else { rng.random::<f64>() };
        let payload_check_chance = if always { 1.0 } else { rng.random::<f64>() };
        let offset_check_chance = if always { 1.0 } else { rng.random::<f64>() };

        let stop_at = if scope.features.contains(TestFeature::PartialDocConsume)
            && doc_freq > 1
            && rng.random_range(0..10) == 7
        {
            rng.random_range(0..doc_freq - 1)
        } else {
            doc_freq
        };

        while expected.upto() <= stop_at {
            if expected.upto() == stop_at {
                if stop_at == doc_freq {
                    let doc = postings.next_doc()?;
                    target.expect_eq(Check::DocId, None, NO_MORE_DOCS, doc)?;
                    // Enums that forget to latch their doc id
                    target.expect_eq(Check::EnumState, None, NO_MORE_DOCS, postings.doc_id())?;
                }
                break;
            }

            let doc = if skipping && (do_all_skipping || rng.random_range(0..skip_chance) == 0) {
                let mut seek_to = None;
                if expected.upto() < stop_at && rng.random_bool(0.5) {
                    // A target known to exist
                    let skip_count = rng.random_range(1..=skip_inc);
                    for _ in 0..skip_count {
                        if expected.next_doc()? == NO_MORE_DOCS {
                            break;
                        }
                    }
                } else {
                    // A target that may fall between docs
                    let skip_doc_ids = rng.random_range(1..=skip_doc_inc);
                    let doc = expected.doc_id() + skip_doc_ids;
                    expected.advance(doc)?;
                    seek_to = Some(doc);
                }

                if expected.upto() >= stop_at {
                    let end = if rng.random_bool(0.5) {
                        self.max_doc
                    } else {
                        NO_MORE_DOCS
                    };
                    let doc = postings.advance(end)?;
                    target.expect_eq(Check::DocId, Some(end), NO_MORE_DOCS, doc)?;
                    target.expect_eq(Check::EnumState, None, NO_MORE_DOCS, postings.doc_id())?;
                    break;
                }

                let doc = postings.advance(seek_to.unwrap_or(expected.doc_id()))?;
                target.expect_eq(Check::DocId, seek_to, expected.doc_id(), doc)?;
                doc
            } else {
                let want = expected.next_doc()?;
                let doc = postings.next_doc()?;
                target.expect_eq(Check::DocId, None, want, doc)?;
                if doc == NO_MORE_DOCS {
                    target.expect_eq(Check::EnumState, None, NO_MORE_DOCS, postings.doc_id())?;
                    break;
                }
                doc
            };

            if checks.freqs && rng.random::<f64>() <= freq_ask_chance {
                target.expect_eq(Check::Freq, Some(doc), expected.freq()?, postings.freq()?)?;
            }

            if !checks.positions {
                continue;
            }
            let freq = postings.freq()?;
            target.expect_eq(Check::Freq, Some(doc), expected.freq()?, freq)?;
            let num_to_consume = if !always
                && scope.features.contains(TestFeature::PartialPosConsume)
                && rng.random_range(0..5) == 1
            {
                rng.random_range(0..freq)
            } else {
                freq
            };

            for _ in 0..num_to_consume {
                let pos = expected.next_position()?;
                target.expect_eq(Check::Position, Some(doc), pos, postings.next_position()?)?;

                if checks.payloads {
                    if rng.random::<f64>() <= payload_check_chance {
                        let want = expected.payload()?.map(<[u8]>::to_vec);
                        let got = postings.payload()?.map(<[u8]>::to_vec);
                        target.expect_eq(Check::Payload, Some(doc), &want, &got)?;
                        // A second read must not move anything
                        let again = postings.payload()?.map(<[u8]>::to_vec);
                        target.expect_eq(Check::Payload, Some(doc), &got, &again)?;
                    }
                } else if !target.info.has_payloads || !flags.contains(PostingsFlags::PAYLOADS) {
                    let got = postings.payload()?.map(<[u8]>::to_vec);
                    target.expect_eq(Check::Payload, Some(doc), None, got)?;
                }

                if checks.offsets {
                    if rng.random::<f64>() <= offset_check_chance {
                        target.expect_eq(
                            Check::StartOffset,
                            Some(doc),
                            expected.start_offset()?,
                            postings.start_offset()?,
                        )?;
                        target.expect_eq(
                            Check::EndOffset,
                            Some(doc),
                            expected.end_offset()?,
                            postings.end_offset()?,
                        )?;
                    }
                } else if !field_options.has_offsets() || !flags.contains(PostingsFlags::OFFSETS) {
                    target.expect_eq(Check::StartOffset, Some(doc), -1, postings.start_offset()?)?;
                    target.expect_eq(Check::EndOffset, Some(doc), -1, postings.end_offset()?)?;
                }
            }
        }

        if skipping {
            self.verify_impacts(rng, target, terms_enum, checks)?;
        }
        if scope.features.contains(TestFeature::IntoBitSet) {
            self.verify_into_bit_set(rng, target, terms_enum)?;
        }
        Ok(())
    }

    /// Impacts must bound every observed `(freq, norm)`, under both stepping
    /// and advancing.
    fn verify_impacts<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        target: &TermUnderTest<'_>,
        terms_enum: &mut dyn TermsEnum,
        checks: Checks,
    ) -> Result<()> {
        let mut flags = PostingsFlags::FREQS;
        if checks.positions {
            flags |= PostingsFlags::POSITIONS;
            if checks.offsets {
                flags |= PostingsFlags::OFFSETS;
            }
            if checks.payloads {
                flags |= PostingsFlags::PAYLOADS;
            }
        }

        // Stepping in lockstep with a plain postings enum
        let mut impacts_enum = terms_enum.impacts(flags)?;
        let mut postings = self.require_postings(target, terms_enum, flags)?;
        let mut max: DocId = -1;
        let mut window: Vec<Impact> = Vec::new();
        loop {
            let doc = impacts_enum.next_doc()?;
            target.expect_eq(Check::DocId, None, postings.next_doc()?, doc)?;
            if doc == NO_MORE_DOCS {
                break;
            }
            compare_doc(target, doc, checks, &mut *postings, &mut *impacts_enum)?;

            if doc > max {
                max = step_bounded(doc, 1 + rng.random_range(0..512));
                impacts_enum.advance_shallow(doc)?;
                window = impacts_window(target, &impacts_enum.impacts()?, doc, max)?;
            }
            self.check_impact_bound(target, doc, &window, impacts_enum.freq()?)?;
        }

        // Advancing, with shallow advances ahead of the enum
        let mut impacts_enum = terms_enum.impacts(flags)?;
        let mut postings = self.require_postings(target, terms_enum, flags)?;
        let mut max: DocId = -1;
        loop {
            let current = impacts_enum.doc_id();
            let advance = rng.random_bool(0.5);
            let seek_to = if advance {
                step_bounded(current, 1 + rng.random_range(0..512))
            } else {
                current + 1
            };

            if seek_to > max && rng.random_bool(0.5) {
                max = step_bounded(seek_to, rng.random_range(0..512));
                impacts_enum.advance_shallow(seek_to)?;
                window = impacts_window(target, &impacts_enum.impacts()?, seek_to, max)?;
            }

            let doc = if advance {
                impacts_enum.advance(seek_to)?
            } else {
                impacts_enum.next_doc()?
            };
            target.expect_eq(Check::DocId, Some(seek_to), postings.advance(seek_to)?, doc)?;
            if doc == NO_MORE_DOCS {
                break;
            }
            compare_doc(target, doc, checks, &mut *postings, &mut *impacts_enum)?;

            if doc > max {
                max = step_bounded(doc, 1 + rng.random_range(0..512));
                window = impacts_window(target, &impacts_enum.impacts()?, doc, max)?;
            }
            self.check_impact_bound(target, doc, &window, impacts_enum.freq()?)?;
        }
        Ok(())
    }

    /// `into_bit_set` must match a manual walk, bit for bit, and leave the
    /// enum on the same doc.
    fn verify_into_bit_set<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        target: &TermUnderTest<'_>,
        terms_enum: &mut dyn TermsEnum,
    ) -> Result<()> {
        let mut bulk = self.require_postings(target, terms_enum, PostingsFlags::NONE)?;
        let mut manual = self.require_postings(target, terms_enum, PostingsFlags::NONE)?;

        let mut doc = bulk.next_doc()?;
        // Last doc the manual walk returned; `doc_id()` is not trusted here
        let mut manual_doc = manual.next_doc()?;
        target.expect_eq(Check::DocId, None, manual_doc, doc)?;
        while doc != NO_MORE_DOCS {
            let offset = rng.random_range((doc - 64).max(0)..=doc);
            let up_to = doc.saturating_add(rng.random_range(1..=self.max_doc / 2 + 1));
            let len = (up_to - offset) as usize;

            let mut bulk_bits = FixedBitSet::new(len);
            bulk.into_bit_set(up_to, &mut bulk_bits, offset)?;

            let mut manual_bits = FixedBitSet::new(len);
            while manual_doc < up_to {
                manual_bits.set((manual_doc - offset) as usize);
                let next = manual.next_doc()?;
                if next <= manual_doc {
                    return Err(target.mismatch(
                        Check::DocId,
                        Some(manual_doc),
                        format_args!("a doc after {}", manual_doc),
                        next,
                    ));
                }
                manual_doc = next;
            }

            if bulk_bits != manual_bits {
                return Err(target.mismatch(
                    Check::BitSet,
                    Some(doc),
                    format_args!("{:?}", manual_bits),
                    format_args!("{:?}", bulk_bits),
                ));
            }
            let next = bulk.doc_id();
            target.expect_eq(Check::DocId, Some(up_to), manual_doc, next)?;
            // manual_doc >= up_to > doc, so equality implies progress
            doc = next;
        }
        Ok(())
    }

    fn require_postings(
        &self,
        target: &TermUnderTest<'_>,
        terms_enum: &mut dyn TermsEnum,
        flags: PostingsFlags,
    ) -> Result<Box<dyn PostingsEnum>> {
        terms_enum.postings(flags)?.ok_or_else(|| {
            target.mismatch(
                Check::EnumState,
                None,
                format_args!("a postings enum for {:?}", flags),
                "none",
            )
        })
    }

    fn check_impact_bound(
        &self,
        target: &TermUnderTest<'_>,
        doc: DocId,
        window: &[Impact],
        freq: i32,
    ) -> Result<()> {
        let norm = doc_to_norm(target.info, doc);
        let idx = lower_bound_by_freq(window, freq);
        match window.get(idx) {
            Some(impact) if (impact.norm as u64) <= (norm as u64) => Ok(()),
            Some(impact) => Err(target.mismatch(
                Check::Impacts,
                Some(doc),
                format_args!("an impact with freq >= {} and norm <= {}", freq, norm),
                format_args!("{:?} in {:?}", impact, window),
            )),
            None => Err(target.mismatch(
                Check::Impacts,
                Some(doc),
                format_args!("an impact with freq >= {}", freq),
                format_args!("{:?}", window),
            )),
        }
    }
}

/// `doc + delta`, clamped to `NO_MORE_DOCS`.
fn step_bounded(doc: DocId, delta: i32) -> DocId {
    (doc as i64 + delta as i64).min(NO_MORE_DOCS as i64) as DocId
}

/// Validate `impacts` and pick the first level that covers `max`.
fn impacts_window(
    target: &TermUnderTest<'_>,
    impacts: &Impacts,
    last_target: DocId,
    max: DocId,
) -> Result<Vec<Impact>> {
    check_impacts(impacts, last_target)
        .map_err(|e| target.mismatch(Check::Impacts, Some(last_target), "valid impacts", e))?;
    Ok((0..impacts.num_levels())
        .find(|&level| impacts.doc_id_up_to(level) >= max)
        .map(|level| impacts.impacts(level).to_vec())
        .unwrap_or_else(|| vec![Impact::new(i32::MAX, 1)]))
}

/// Compare freq and the positional stream of the current doc.
fn compare_doc(
    target: &TermUnderTest<'_>,
    doc: DocId,
    checks: Checks,
    postings: &mut dyn PostingsEnum,
    impacts_enum: &mut dyn ImpactsEnum,
) -> Result<()> {
    let freq = postings.freq()?;
    target.expect_eq(Check::Freq, Some(doc), freq, impacts_enum.freq()?)?;
    if !checks.positions {
        return Ok(());
    }
    for _ in 0..freq {
        let pos = postings.next_position()?;
        target.expect_eq(Check::Position, Some(doc), pos, impacts_enum.next_position()?)?;
        if checks.offsets {
            target.expect_eq(
                Check::StartOffset,
                Some(doc),
                postings.start_offset()?,
                impacts_enum.start_offset()?,
            )?;
            target.expect_eq(
                Check::EndOffset,
                Some(doc),
                postings.end_offset()?,
                impacts_enum.end_offset()?,
            )?;
        }
        if checks.payloads {
            target.expect_eq(
                Check::Payload,
                Some(doc),
                postings.payload()?,
                impacts_enum.payload()?,
            )?;
        }
    }
    Ok(())
}
