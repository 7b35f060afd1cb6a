//! lucene-testkit - randomized conformance testing for Lucene-style codecs
//!
//! This crate provides:
//! - A seed-reproducible oracle postings generator and synthetic corpus
//! - A differential verifier that replays randomized read patterns against
//!   any `PostingsFormat` (skipping, impacts, positions, offsets, payloads,
//!   bit-set extraction, term-state and ord seeking, automaton intersection)
//! - A multi-threaded driver with fail-fast cancellation and round timeouts
//! - Assertion decorators for postings enumerators
//! - A metadata-only merge-policy simulator bounding write amplification
//! - Reference collaborators: a block postings format, a tiered merge policy,
//!   an in-memory directory and a fault-injecting wrapper

pub mod asserting;
pub mod automaton;
pub mod codec;
pub mod config;
pub mod directories;
pub mod error;
pub mod index;
pub mod merge;
pub mod postings;

/// Document identifier within a segment.
pub type DocId = i32;

/// Sentinel returned once an enumerator is exhausted.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

/// Doc id reported by an enumerator before the first `next_doc`/`advance`.
pub const UNPOSITIONED: DocId = -1;

pub use asserting::{AssertingPostingsEnum, AssertingPostingsFormat, OwnerToken};
pub use codec::{
    BlockPostingsFormat, Capabilities, Fields, FieldsConsumer, FieldsProducer, ImpactsEnum,
    NormsProducer, PostingsEnum, PostingsFormat, SeekStatus, SegmentReadState, SegmentWriteState,
    TermState, Terms, TermsEnum,
};
pub use config::{TestConfig, TestContext};
pub use directories::{Directory, IndexOutput, MockDirectoryWrapper, OwnedBytes, RamDirectory};
pub use error::{Error, Result};
pub use index::{FieldInfo, FieldInfos, FixedBitSet, Impact, Impacts, IndexOptions, PostingsFlags};
pub use merge::{
    IoStats, MergeContext, MergePolicy, MergePolicyTestCase, MergeSpecification, MergeTrigger,
    MockMergeContext, NoMergePolicy, OneMerge, SegmentCommitInfo, SegmentInfos,
    TieredMergePolicy,
};
pub use postings::{FeatureSet, RandomPostingsTester, SeedPostings, TestFeature};
