//! Segment metadata and immutable segment list snapshots

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::OneMerge;
use super::simulator::IoStats;
use crate::error::{Error, Result};

/// Where a segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSource {
    Flush,
    Merge,
}

/// Metadata of one committed segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCommitInfo {
    pub name: String,
    pub max_doc: u32,
    pub del_count: u32,
    /// Bumped every time deletes are written for this segment
    pub del_gen: u64,
    pub size_in_bytes: u64,
    pub source: SegmentSource,
}

impl SegmentCommitInfo {
    pub fn new(
        name: impl Into<String>,
        max_doc: u32,
        del_count: u32,
        size_in_bytes: u64,
        source: SegmentSource,
    ) -> Self {
        Self {
            name: name.into(),
            max_doc,
            del_count,
            del_gen: 0,
            size_in_bytes,
            source,
        }
    }

    pub fn live_docs(&self) -> u32 {
        self.max_doc.saturating_sub(self.del_count)
    }

    /// Size in bytes scaled by the live fraction of the segment.
    pub fn live_size(&self, deletes: u32) -> f64 {
        if self.max_doc == 0 {
            return 0.0;
        }
        let live = self.max_doc.saturating_sub(deletes) as f64;
        self.size_in_bytes as f64 * live / self.max_doc as f64
    }

    pub fn del_ratio(&self) -> f64 {
        if self.max_doc == 0 {
            0.0
        } else {
            self.del_count as f64 / self.max_doc as f64
        }
    }
}

impl fmt::Display for SegmentCommitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.del_count > 0 {
            write!(f, "{}({}/{})", self.name, self.max_doc, self.del_count)
        } else {
            write!(f, "{}({})", self.name, self.max_doc)
        }
    }
}

/// Immutable snapshot of the segment list.
///
/// Entries are shared between snapshots, so deriving a new snapshot only
/// allocates the segments that actually changed.
#[derive(Debug, Clone, Default)]
pub struct SegmentInfos {
    segments: Vec<Arc<SegmentCommitInfo>>,
}

impl SegmentInfos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<SegmentCommitInfo>) -> Self {
        Self {
            segments: segments.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<SegmentCommitInfo>> {
        self.segments.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&Arc<SegmentCommitInfo>> {
        self.segments.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SegmentCommitInfo>> {
        self.segments.iter()
    }

    pub fn segments(&self) -> &[Arc<SegmentCommitInfo>] {
        &self.segments
    }

    pub fn names(&self) -> FxHashSet<String> {
        self.segments.iter().map(|s| s.name.clone()).collect()
    }

    pub fn total_max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.max_doc as u64).sum()
    }

    pub fn total_live_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.live_docs() as u64).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.size_in_bytes).sum()
    }

    /// New snapshot with `info` appended.
    pub fn with_segment(&self, info: SegmentCommitInfo) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Arc::new(info));
        Self { segments }
    }

    /// Replace the segments of `merge` with one merged segment named
    /// `merged_name`, placed where the first input used to be.
    ///
    /// The merged segment keeps only live documents and its size is the sum
    /// of every input's size weighted by its live fraction. A merge whose
    /// inputs hold no live documents leaves no segment behind.
    pub fn apply_merge(
        &self,
        merge: &OneMerge,
        merged_name: &str,
        stats: &mut IoStats,
    ) -> Result<SegmentInfos> {
        if merge.segments.is_empty() {
            return Err(Error::MergePolicy("empty merge".into()));
        }
        let mut merged_away = FxHashSet::default();
        let mut new_max_doc = 0u64;
        let mut new_size = 0.0f64;
        for input in &merge.segments {
            if self.find(&input.name).is_none() {
                return Err(Error::MergePolicy(format!(
                    "{} merges {} which is not in the index",
                    merge, input.name
                )));
            }
            if !merged_away.insert(input.name.as_str()) {
                return Err(Error::MergePolicy(format!(
                    "{} lists {} twice",
                    merge, input.name
                )));
            }
            new_max_doc += input.live_docs() as u64;
            new_size += input.live_size(input.del_count);
        }
        let new_max_doc = u32::try_from(new_max_doc)
            .map_err(|_| Error::MergePolicy(format!("{} exceeds the doc limit", merge)))?;
        let new_size = new_size.round() as u64;

        let merged = (new_max_doc > 0).then(|| {
            Arc::new(SegmentCommitInfo::new(
                merged_name,
                new_max_doc,
                0,
                new_size,
                SegmentSource::Merge,
            ))
        });
        let mut segments = Vec::with_capacity(self.segments.len() + 1 - merge.segments.len());
        let mut placed = false;
        for info in &self.segments {
            if merged_away.contains(info.name.as_str()) {
                if !placed {
                    segments.extend(merged.clone());
                    placed = true;
                }
            } else {
                segments.push(Arc::clone(info));
            }
        }

        stats.merge_bytes += new_size;
        stats.merges += 1;
        Ok(Self { segments })
    }

    /// Delete exactly `num_deletes` live documents, spread over the segments
    /// in proportion to their live doc counts. Segments left without live
    /// documents are dropped.
    pub fn apply_deletes(&self, num_deletes: u64) -> Result<SegmentInfos> {
        let total_live = self.total_live_docs();
        if num_deletes > total_live {
            return Err(Error::MergePolicy(format!(
                "cannot delete {} documents out of {} live",
                num_deletes, total_live
            )));
        }
        if num_deletes == 0 {
            return Ok(self.clone());
        }

        let weight = num_deletes as f64 / total_live as f64;
        let mut remaining = num_deletes;
        let mut segments = Vec::with_capacity(self.segments.len());
        let last = self.segments.len() - 1;
        for (i, info) in self.segments.iter().enumerate() {
            let live = info.live_docs() as u64;
            let seg_deletes = if i == last {
                remaining
            } else {
                remaining.min((weight * live as f64).ceil() as u64)
            };
            if seg_deletes > live {
                return Err(Error::MergePolicy(format!(
                    "{} deletes do not fit into {}",
                    seg_deletes, info
                )));
            }
            remaining -= seg_deletes;

            if seg_deletes == live {
                continue;
            }
            if seg_deletes == 0 {
                segments.push(Arc::clone(info));
                continue;
            }
            let mut updated = SegmentCommitInfo::clone(info);
            // seg_deletes < live <= max_doc, so this fits in u32
            updated.del_count += seg_deletes as u32;
            updated.del_gen += 1;
            segments.push(Arc::new(updated));
        }
        debug_assert_eq!(remaining, 0);
        Ok(Self { segments })
    }
}
