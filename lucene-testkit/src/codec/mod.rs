//! Codec collaborator API
//!
//! These traits are the surface a postings format exposes to the testers:
//! a `FieldsConsumer` that persists a `Fields` view at flush time, and a
//! `FieldsProducer` whose `Terms`/`TermsEnum`/`PostingsEnum` are replayed
//! against the oracle.
//!
//! Enumerators are owned, `'static` and `Send`: every worker pulls its own
//! instances from a shared `FieldsProducer`, and nothing is reused across
//! calls.

mod block;
mod state;

use std::sync::Arc;

pub use block::BlockPostingsFormat;
pub use state::{Capabilities, SeekStatus, SegmentReadState, SegmentWriteState, TermState};

use crate::automaton::{AutomatonTermsEnum, CompiledAutomaton};
use crate::error::{Error, Result};
use crate::index::{FieldInfo, FixedBitSet, Impacts, PostingsFlags};
use crate::DocId;

// ── Postings ─────────────────────────────────────────────────────────────

/// Forward-only cursor over one term's postings.
///
/// `doc_id` is `-1` before the first move and `NO_MORE_DOCS` once exhausted.
/// Positions, offsets and payloads are only meaningful for the current doc
/// after `next_position`; offsets are `-1` unless `OFFSETS` was requested
/// and indexed.
pub trait PostingsEnum: Send {
    fn doc_id(&self) -> DocId;

    fn next_doc(&mut self) -> Result<DocId>;

    /// Move to the first doc >= `target`. `target` must be > `doc_id()`.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    fn freq(&self) -> Result<i32>;

    /// Next position of the current doc, at most `freq()` times per doc.
    fn next_position(&mut self) -> Result<i32>;

    fn start_offset(&self) -> Result<i32>;

    fn end_offset(&self) -> Result<i32>;

    /// Payload at the current position, `None` when absent or empty.
    fn payload(&self) -> Result<Option<&[u8]>>;

    /// Upper bound on the number of docs this enum will visit.
    fn cost(&self) -> i64;

    /// Set bit `doc - offset` for every doc in `[doc_id(), up_to)` and leave
    /// the enum on the first doc >= `up_to`.
    fn into_bit_set(&mut self, up_to: DocId, bit_set: &mut FixedBitSet, offset: DocId) -> Result<()> {
        let mut doc = self.doc_id();
        debug_assert!(offset <= doc);
        while doc < up_to {
            bit_set.set((doc - offset) as usize);
            doc = self.next_doc()?;
        }
        Ok(())
    }
}

/// Postings enumerator that also exposes score-bounding impacts.
pub trait ImpactsEnum: PostingsEnum {
    /// Prepare impacts for docs >= `target` without moving the enum.
    fn advance_shallow(&mut self, target: DocId) -> Result<()>;

    fn impacts(&mut self) -> Result<Impacts>;
}

macro_rules! forward_postings_enum {
    ($ty:ty) => {
        impl PostingsEnum for $ty {
            #[inline]
            fn doc_id(&self) -> DocId {
                (**self).doc_id()
            }
            #[inline]
            fn next_doc(&mut self) -> Result<DocId> {
                (**self).next_doc()
            }
            #[inline]
            fn advance(&mut self, target: DocId) -> Result<DocId> {
                (**self).advance(target)
            }
            #[inline]
            fn freq(&self) -> Result<i32> {
                (**self).freq()
            }
            #[inline]
            fn next_position(&mut self) -> Result<i32> {
                (**self).next_position()
            }
            fn start_offset(&self) -> Result<i32> {
                (**self).start_offset()
            }
            fn end_offset(&self) -> Result<i32> {
                (**self).end_offset()
            }
            fn payload(&self) -> Result<Option<&[u8]>> {
                (**self).payload()
            }
            fn cost(&self) -> i64 {
                (**self).cost()
            }
            fn into_bit_set(
                &mut self,
                up_to: DocId,
                bit_set: &mut FixedBitSet,
                offset: DocId,
            ) -> Result<()> {
                (**self).into_bit_set(up_to, bit_set, offset)
            }
        }
    };
}

forward_postings_enum!(Box<dyn PostingsEnum>);
forward_postings_enum!(Box<dyn ImpactsEnum>);

impl ImpactsEnum for Box<dyn ImpactsEnum> {
    fn advance_shallow(&mut self, target: DocId) -> Result<()> {
        (**self).advance_shallow(target)
    }

    fn impacts(&mut self) -> Result<Impacts> {
        (**self).impacts()
    }
}

// ── Terms ────────────────────────────────────────────────────────────────

/// Cursor over a field's terms in byte-lexicographic order.
pub trait TermsEnum: Send {
    /// Advance to the next term. Returns `None` at the end.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Current term bytes. Only valid while positioned.
    fn term(&self) -> &[u8];

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(term)? == SeekStatus::Found)
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus>;

    fn seek_exact_ord(&mut self, _ord: u64) -> Result<()> {
        Err(Error::Unsupported("seek by ord".into()))
    }

    fn ord(&self) -> Result<u64> {
        Err(Error::Unsupported("term ord".into()))
    }

    /// Opaque state that lets `seek_exact_state` reposition without a lookup.
    fn term_state(&self) -> Result<TermState>;

    fn seek_exact_state(&mut self, term: &[u8], state: &TermState) -> Result<()>;

    fn doc_freq(&self) -> Result<i32>;

    fn total_term_freq(&self) -> Result<i64>;

    /// Postings for the current term. Returns `None` when the field cannot
    /// serve the requested features.
    fn postings(&mut self, flags: PostingsFlags) -> Result<Option<Box<dyn PostingsEnum>>>;

    fn impacts(&mut self, _flags: PostingsFlags) -> Result<Box<dyn ImpactsEnum>> {
        Err(Error::Unsupported("impacts".into()))
    }
}

/// The terms of one field.
pub trait Terms: Send + Sync {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>>;

    /// Terms accepted by `compiled` and strictly greater than `start_term`.
    ///
    /// The default walks the full term iterator and filters it.
    fn intersect(
        &self,
        compiled: &CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum>> {
        let run = compiled.run_automaton().ok_or_else(|| {
            Error::Codec(format!(
                "intersect requires a normal automaton, got {:?}",
                compiled.kind_name()
            ))
        })?;
        Ok(Box::new(AutomatonTermsEnum::new(
            self.iterator()?,
            Arc::clone(run),
            start_term,
        )))
    }

    /// Number of terms, or -1 when unknown
    fn size(&self) -> i64;

    fn doc_count(&self) -> i32;

    fn sum_doc_freq(&self) -> i64;

    fn sum_total_term_freq(&self) -> i64;

    fn has_freqs(&self) -> bool;

    fn has_positions(&self) -> bool;

    fn has_offsets(&self) -> bool;

    fn has_payloads(&self) -> bool;
}

/// Field name to terms mapping.
pub trait Fields: Send + Sync {
    /// Field names in sorted order
    fn field_names(&self) -> Vec<String>;

    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>>;

    fn size(&self) -> usize {
        self.field_names().len()
    }
}

/// Read side of a postings format, shared by all verification workers.
pub trait FieldsProducer: Fields {
    /// Verify file checksums.
    fn check_integrity(&self) -> Result<()>;
}

/// Per-document normalization values consumed at flush time.
pub trait NormsProducer: Send + Sync {
    fn norm(&self, field: &FieldInfo, doc: DocId) -> Result<i64>;
}

/// Write side of a postings format.
pub trait FieldsConsumer {
    fn write(&mut self, fields: &dyn Fields, norms: &dyn NormsProducer) -> Result<()>;

    fn close(self: Box<Self>) -> Result<()>;
}

/// A pluggable postings codec.
pub trait PostingsFormat: Send + Sync {
    fn name(&self) -> &str;

    /// Optional features this format declares up front.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>>;

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Arc<dyn FieldsProducer>>;
}
