//! Tiered merge policy: merges segments of similar size within size tiers

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::{
    MergeContext, MergePolicy, MergeSpecification, MergeTrigger, OneMerge, SegmentCommitInfo,
    SegmentInfos,
};

/// A natural merge must produce a segment at least this much larger than
/// its largest input.
pub const MIN_MERGE_GROWTH: f64 = 1.5;

/// Tiered merge policy
///
/// Groups segments into tiers by live size. Segments in the same tier are
/// merged when there are enough of them. This creates a logarithmic structure
/// where larger segments are merged less frequently.
///
/// Tiers are defined by powers of `tier_factor`:
/// - Tier 0: up to `floor_segment_bytes`
/// - Tier 1: `floor_segment_bytes` to `floor_segment_bytes * tier_factor`
/// - Tier 2: up to `floor_segment_bytes * tier_factor^2`
/// - etc.
///
/// Natural merges never rewrite a segment into one that is barely larger:
/// a candidate whose output is smaller than `MIN_MERGE_GROWTH` times its
/// largest input is skipped. Without that rule, small segments below the
/// floor keep getting folded into the same growing segment.
#[derive(Debug, Clone)]
pub struct TieredMergePolicy {
    /// Minimum number of segments in a tier before merging (default: 10)
    pub segments_per_tier: usize,
    /// Maximum number of segments in one natural merge (default: 10)
    pub max_merge_at_once: usize,
    /// Maximum number of segments in one forced merge (default: 30)
    pub max_merge_at_once_explicit: usize,
    /// Factor between tier sizes (default: 10.0)
    pub tier_factor: f64,
    /// Segments below this size all share tier 0 (default: 2MB)
    pub floor_segment_bytes: u64,
    /// Largest segment a natural merge may produce (default: 5GB)
    pub max_merged_segment_bytes: u64,
    /// Delete percentage above which forced-deletes merges pick a segment (default: 10.0)
    pub forced_merge_deletes_pct_allowed: f64,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        Self {
            segments_per_tier: 10,
            max_merge_at_once: 10,
            max_merge_at_once_explicit: 30,
            tier_factor: 10.0,
            floor_segment_bytes: 2 * 1024 * 1024,
            max_merged_segment_bytes: 5 * 1024 * 1024 * 1024,
            forced_merge_deletes_pct_allowed: 10.0,
        }
    }
}

impl TieredMergePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segments_per_tier(mut self, n: usize) -> Self {
        self.segments_per_tier = n.max(2);
        self
    }

    pub fn with_max_merge_at_once(mut self, n: usize) -> Self {
        self.max_merge_at_once = n.max(2);
        self
    }

    pub fn with_max_merge_at_once_explicit(mut self, n: usize) -> Self {
        self.max_merge_at_once_explicit = n.max(2);
        self
    }

    pub fn with_tier_factor(mut self, factor: f64) -> Self {
        self.tier_factor = factor.max(2.0);
        self
    }

    pub fn with_floor_segment_bytes(mut self, bytes: u64) -> Self {
        self.floor_segment_bytes = bytes.max(1);
        self
    }

    pub fn with_max_merged_segment_bytes(mut self, bytes: u64) -> Self {
        self.max_merged_segment_bytes = bytes.max(1);
        self
    }

    pub fn with_forced_merge_deletes_pct_allowed(mut self, pct: f64) -> Self {
        self.forced_merge_deletes_pct_allowed = pct.clamp(0.0, 100.0);
        self
    }

    /// Compute the tier for a segment of `live_bytes`
    pub fn compute_tier(&self, live_bytes: f64) -> usize {
        let floor = self.floor_segment_bytes as f64;
        if live_bytes <= floor {
            return 0;
        }
        let ratio = live_bytes / floor;
        (ratio.log(self.tier_factor).floor() as usize) + 1
    }

    /// Exclusive upper bound on the live size of segments in `tier`.
    pub fn tier_upper_bytes(&self, tier: usize) -> f64 {
        self.floor_segment_bytes as f64 * self.tier_factor.powi(tier as i32)
    }

    /// Whether a segment is too large to take part in natural merges.
    pub fn is_too_large(&self, live_bytes: f64) -> bool {
        live_bytes > self.max_merged_segment_bytes as f64 / 2.0
    }

    fn candidates<'a>(
        &self,
        infos: &'a SegmentInfos,
        ctx: &dyn MergeContext,
    ) -> Vec<(&'a Arc<SegmentCommitInfo>, f64)> {
        let merging = ctx.merging_segments();
        infos
            .iter()
            .filter(|info| !merging.contains(&info.name))
            .map(|info| (info, info.live_size(ctx.num_deletes_to_merge(info))))
            .collect()
    }

    /// Group mergeable segments by tier, each tier sorted by ascending size.
    pub fn tiers<'a>(
        &self,
        infos: &'a SegmentInfos,
        ctx: &dyn MergeContext,
    ) -> BTreeMap<usize, Vec<(&'a Arc<SegmentCommitInfo>, f64)>> {
        let mut tiers: BTreeMap<usize, Vec<_>> = BTreeMap::new();
        for (info, size) in self.candidates(infos, ctx) {
            if self.is_too_large(size) {
                continue;
            }
            tiers.entry(self.compute_tier(size)).or_default().push((info, size));
        }
        for segments in tiers.values_mut() {
            segments.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.name.cmp(&b.0.name)));
        }
        tiers
    }

    /// First window of consecutive segments (smallest first) that fits the
    /// size cap and grows enough to be worth rewriting.
    fn pick_window(&self, sorted: &[(&Arc<SegmentCommitInfo>, f64)]) -> Option<OneMerge> {
        let max_bytes = self.max_merged_segment_bytes as f64;
        for start in 0..sorted.len().saturating_sub(1) {
            let mut total = 0.0;
            let mut end = start;
            while end < sorted.len()
                && end - start < self.max_merge_at_once
                && total + sorted[end].1 <= max_bytes
            {
                total += sorted[end].1;
                end += 1;
            }
            if end - start < 2 {
                continue;
            }
            // Sorted ascending, so the last one is the largest
            let largest = sorted[end - 1].1;
            if total < largest * MIN_MERGE_GROWTH {
                continue;
            }
            let segments = sorted[start..end]
                .iter()
                .map(|(info, _)| Arc::clone(info))
                .collect();
            return Some(OneMerge::new(segments));
        }
        None
    }
}

impl MergePolicy for TieredMergePolicy {
    fn find_merges(
        &self,
        trigger: MergeTrigger,
        infos: &SegmentInfos,
        ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        if infos.len() < 2 {
            return None;
        }

        let mut spec = MergeSpecification::new();
        for (tier, segments) in self.tiers(infos, ctx) {
            if segments.len() < self.segments_per_tier {
                continue;
            }
            if let Some(merge) = self.pick_window(&segments) {
                log::debug!(
                    "[merge_sim] {:?}: tier {} has {} segments, merging {}",
                    trigger,
                    tier,
                    segments.len(),
                    merge.seg_string()
                );
                spec.add(merge);
            }
        }
        spec.into_option()
    }

    fn find_forced_merges(
        &self,
        infos: &SegmentInfos,
        max_segment_count: usize,
        segments_to_merge: &FxHashSet<String>,
        ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        let max_segment_count = max_segment_count.max(1);
        let mut eligible: Vec<_> = self
            .candidates(infos, ctx)
            .into_iter()
            .filter(|(info, _)| segments_to_merge.contains(&info.name))
            .collect();

        if eligible.len() <= max_segment_count {
            // A lone segment is only rewritten to expunge its deletes
            if let [(info, _)] = eligible.as_slice()
                && max_segment_count == 1
                && ctx.num_deletes_to_merge(info) > 0
            {
                let mut spec = MergeSpecification::new();
                spec.add(OneMerge::new(vec![Arc::clone(info)]));
                return Some(spec);
            }
            return None;
        }

        // Fold the smallest segments together until the count fits
        eligible.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.name.cmp(&b.0.name)));
        let mut excess = eligible.len() - max_segment_count;
        let mut spec = MergeSpecification::new();
        let mut rest = eligible.as_slice();
        while excess > 0 {
            let take = (excess + 1).min(self.max_merge_at_once_explicit);
            let (group, tail) = rest.split_at(take);
            spec.add(OneMerge::new(
                group.iter().map(|(info, _)| Arc::clone(info)).collect(),
            ));
            excess -= take - 1;
            rest = tail;
        }
        log::debug!(
            "[merge_sim] forced merge to {} segments: {} merges",
            max_segment_count,
            spec.len()
        );
        spec.into_option()
    }

    fn find_forced_deletes_merges(
        &self,
        infos: &SegmentInfos,
        ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        let threshold = self.forced_merge_deletes_pct_allowed / 100.0;
        let merging = ctx.merging_segments();
        let eligible: Vec<_> = infos
            .iter()
            .filter(|info| !merging.contains(&info.name) && info.max_doc > 0)
            .filter(|info| {
                let deletes = ctx.num_deletes_to_merge(info);
                deletes > 0 && deletes as f64 / info.max_doc as f64 > threshold
            })
            .cloned()
            .collect();

        let mut spec = MergeSpecification::new();
        for group in eligible.chunks(self.max_merge_at_once_explicit) {
            spec.add(OneMerge::new(group.to_vec()));
        }
        spec.into_option()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{MockMergeContext, SegmentSource};

    const MB: u64 = 1024 * 1024;

    fn segments(sizes: &[u64]) -> SegmentInfos {
        SegmentInfos::from_segments(
            sizes
                .iter()
                .enumerate()
                .map(|(i, &size)| {
                    SegmentCommitInfo::new(format!("_{}", i), 100, 0, size, SegmentSource::Flush)
                })
                .collect(),
        )
    }

    #[test]
    fn test_compute_tier() {
        let policy = TieredMergePolicy::default();
        let floor = policy.floor_segment_bytes as f64;

        assert_eq!(policy.compute_tier(0.0), 0);
        assert_eq!(policy.compute_tier(floor / 2.0), 0);
        assert_eq!(policy.compute_tier(floor), 0);

        assert_eq!(policy.compute_tier(floor + 1.0), 1);
        assert_eq!(policy.compute_tier(floor * 5.0), 1);
        assert_eq!(policy.compute_tier(floor * 9.99), 1);

        assert_eq!(policy.compute_tier(floor * 10.5), 2);
        assert_eq!(policy.compute_tier(floor * 99.0), 2);
        assert_eq!(policy.compute_tier(floor * 150.0), 3);
    }

    #[test]
    fn test_no_merge_few_segments() {
        let policy = TieredMergePolicy::default();
        let ctx = MockMergeContext::new();
        let infos = segments(&[MB; 5]);
        assert!(policy.find_merges(MergeTrigger::SegmentFlush, &infos, &ctx).is_none());
    }

    #[test]
    fn test_merge_same_tier() {
        let policy = TieredMergePolicy::default().with_segments_per_tier(3);
        let ctx = MockMergeContext::new();
        let infos = segments(&[MB, MB, MB, 50 * MB]);
        let spec = policy
            .find_merges(MergeTrigger::SegmentFlush, &infos, &ctx)
            .unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(spec.merges[0].names(), vec!["_0", "_1", "_2"]);
    }

    #[test]
    fn test_lopsided_window_skipped() {
        let policy = TieredMergePolicy::default()
            .with_segments_per_tier(3)
            .with_max_merge_at_once(3);
        let ctx = MockMergeContext::new();
        // All below the floor; folding 1+1 bytes into 1MB is not worth it
        let infos = segments(&[1, 1, MB]);
        assert!(policy.find_merges(MergeTrigger::SegmentFlush, &infos, &ctx).is_none());

        // A fourth small segment makes the small ones mergeable on their own
        let infos = segments(&[1, 1, MB, 1]);
        let spec = policy
            .find_merges(MergeTrigger::SegmentFlush, &infos, &ctx)
            .unwrap();
        assert_eq!(spec.merges[0].names(), vec!["_0", "_1", "_3"]);
    }

    #[test]
    fn test_merging_segments_excluded() {
        let policy = TieredMergePolicy::default().with_segments_per_tier(3);
        let ctx = MockMergeContext::new();
        let infos = segments(&[MB, MB, MB]);
        let _guard = ctx.register(vec!["_1".into()]).unwrap();
        assert!(policy.find_merges(MergeTrigger::SegmentFlush, &infos, &ctx).is_none());
    }

    #[test]
    fn test_too_large_segments_left_alone() {
        let policy = TieredMergePolicy::default()
            .with_segments_per_tier(2)
            .with_max_merged_segment_bytes(10 * MB);
        let ctx = MockMergeContext::new();
        let infos = segments(&[6 * MB, 6 * MB, 6 * MB]);
        assert!(policy.find_merges(MergeTrigger::SegmentFlush, &infos, &ctx).is_none());
    }

    #[test]
    fn test_forced_merge_reaches_target_count() {
        let policy = TieredMergePolicy::default().with_max_merge_at_once_explicit(4);
        let ctx = MockMergeContext::new();
        let infos = segments(&[5, 1, 9, 3, 7, 2, 8, 4, 6, 10]);
        let all = infos.names();

        assert!(policy.find_forced_merges(&infos, 10, &all, &ctx).is_none());

        let spec = policy.find_forced_merges(&infos, 3, &all, &ctx).unwrap();
        let merged: usize = spec.merges.iter().map(|m| m.segments.len()).sum();
        // Each merge removes len - 1 segments
        assert_eq!(10 - merged + spec.len(), 3);
        assert!(spec.merges.iter().all(|m| m.segments.len() <= 4));
        // The smallest segments go first
        assert_eq!(spec.merges[0].names(), vec!["_1", "_5", "_3", "_7"]);
    }

    #[test]
    fn test_forced_deletes_merges() {
        let policy = TieredMergePolicy::default();
        let ctx = MockMergeContext::new();
        let infos = SegmentInfos::from_segments(vec![
            SegmentCommitInfo::new("_0", 100, 5, MB, SegmentSource::Flush),
            SegmentCommitInfo::new("_1", 100, 50, MB, SegmentSource::Flush),
            SegmentCommitInfo::new("_2", 100, 0, MB, SegmentSource::Flush),
        ]);
        let spec = policy.find_forced_deletes_merges(&infos, &ctx).unwrap();
        assert_eq!(spec.len(), 1);
        assert_eq!(spec.merges[0].names(), vec!["_1"]);

        let clean = segments(&[MB, MB]);
        assert!(policy.find_forced_deletes_merges(&clean, &ctx).is_none());
    }
}
