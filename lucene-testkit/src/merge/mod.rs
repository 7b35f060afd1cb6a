//! Merge policies and a metadata-only merge simulator
//!
//! A merge policy looks at a snapshot of the segment list and proposes groups
//! of segments to merge. Nothing here touches real index files: segments are
//! described by doc counts, delete counts and byte sizes, which is all a
//! policy needs to make decisions.

mod context;
mod segment_infos;
mod simulator;
mod tiered;

#[cfg(test)]
mod tests;

use std::fmt::{self, Debug};
use std::sync::Arc;

use rustc_hash::FxHashSet;

pub use context::{MergeGuard, MockMergeContext};
pub use segment_infos::{SegmentCommitInfo, SegmentInfos, SegmentSource};
pub use simulator::{IoStats, MergePolicyTestCase};
pub use tiered::TieredMergePolicy;

/// What caused a merge policy to be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeTrigger {
    SegmentFlush,
    FullFlush,
    ExplicitMerge,
    MergeFinished,
    Closing,
    Commit,
    GetReader,
}

impl MergeTrigger {
    pub const ALL: [MergeTrigger; 7] = [
        MergeTrigger::SegmentFlush,
        MergeTrigger::FullFlush,
        MergeTrigger::ExplicitMerge,
        MergeTrigger::MergeFinished,
        MergeTrigger::Closing,
        MergeTrigger::Commit,
        MergeTrigger::GetReader,
    ];
}

/// One group of segments to be merged into a single new segment.
#[derive(Debug, Clone)]
pub struct OneMerge {
    pub segments: Vec<Arc<SegmentCommitInfo>>,
}

impl OneMerge {
    pub fn new(segments: Vec<Arc<SegmentCommitInfo>>) -> Self {
        Self { segments }
    }

    pub fn names(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }

    pub fn total_max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.max_doc as u64).sum()
    }

    /// Compact description such as `_0(10) _3(7/2)`.
    pub fn seg_string(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for OneMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge[{}]", self.seg_string())
    }
}

/// All merges a policy proposes in one call.
#[derive(Debug, Clone, Default)]
pub struct MergeSpecification {
    pub merges: Vec<OneMerge>,
}

impl MergeSpecification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, merge: OneMerge) {
        self.merges.push(merge);
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.merges.len()
    }

    /// `None` when nothing was added.
    pub fn into_option(self) -> Option<Self> {
        if self.merges.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Writer-side state a policy may consult.
pub trait MergeContext {
    /// Deletes that would be reclaimed by merging `info`.
    fn num_deletes_to_merge(&self, info: &SegmentCommitInfo) -> u32;

    /// Names of segments already part of a running merge.
    fn merging_segments(&self) -> FxHashSet<String>;

    fn is_merging(&self, name: &str) -> bool {
        self.merging_segments().contains(name)
    }
}

/// Decides when segments should be merged and which ones.
///
/// Every method returns `None` when there is nothing to do.
pub trait MergePolicy: Send + Sync + Debug {
    /// Natural merges after a flush, a finished merge or another trigger.
    fn find_merges(
        &self,
        trigger: MergeTrigger,
        infos: &SegmentInfos,
        ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification>;

    /// Merges needed to bring the index down to at most `max_segment_count`
    /// segments, considering only `segments_to_merge`.
    fn find_forced_merges(
        &self,
        infos: &SegmentInfos,
        max_segment_count: usize,
        segments_to_merge: &FxHashSet<String>,
        ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification>;

    /// Merges that reclaim deleted documents.
    fn find_forced_deletes_merges(
        &self,
        infos: &SegmentInfos,
        ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification>;

    /// Merges to run as part of a full flush (commit or reader refresh).
    fn find_full_flush_merges(
        &self,
        _trigger: MergeTrigger,
        _infos: &SegmentInfos,
        _ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        None
    }
}

/// No-op merge policy - never merges
#[derive(Debug, Clone, Default)]
pub struct NoMergePolicy;

impl MergePolicy for NoMergePolicy {
    fn find_merges(
        &self,
        _trigger: MergeTrigger,
        _infos: &SegmentInfos,
        _ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        None
    }

    fn find_forced_merges(
        &self,
        _infos: &SegmentInfos,
        _max_segment_count: usize,
        _segments_to_merge: &FxHashSet<String>,
        _ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        None
    }

    fn find_forced_deletes_merges(
        &self,
        _infos: &SegmentInfos,
        _ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        None
    }
}
