use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rustc_hash::FxHashSet;

use crate::error::{Error, Result};
use crate::merge::{
    MergeContext, MergePolicy, MergePolicyTestCase, MergeSpecification, MergeTrigger, OneMerge,
    SegmentInfos,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flaw {
    /// Rewrites the whole index after every flush
    MergeEverything,
    /// Rewrites the whole index, but only when asked for full-flush merges
    MergeEverythingOnFullFlush,
    /// Puts the newest segment into two merges
    Overlapping,
    /// Returns a specification without merges
    EmptySpec,
}

#[derive(Debug)]
struct FlawedPolicy(Flaw);

impl MergePolicy for FlawedPolicy {
    fn find_merges(
        &self,
        _trigger: MergeTrigger,
        infos: &SegmentInfos,
        _ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        if infos.len() < 2 || self.0 == Flaw::MergeEverythingOnFullFlush {
            return None;
        }
        let segments = infos.segments();
        let mut spec = MergeSpecification::new();
        match self.0 {
            Flaw::MergeEverything => spec.add(OneMerge::new(segments.to_vec())),
            Flaw::Overlapping => {
                let newest = &segments[segments.len() - 1];
                spec.add(OneMerge::new(vec![Arc::clone(&segments[0]), Arc::clone(newest)]));
                spec.add(OneMerge::new(vec![Arc::clone(newest)]));
            }
            Flaw::EmptySpec => return Some(spec),
            Flaw::MergeEverythingOnFullFlush => unreachable!(),
        }
        Some(spec)
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

    fn find_full_flush_merges(
        &self,
        _trigger: MergeTrigger,
        infos: &SegmentInfos,
        _ctx: &dyn MergeContext,
    ) -> Option<MergeSpecification> {
        if self.0 != Flaw::MergeEverythingOnFullFlush || infos.len() < 2 {
            return None;
        }
        let mut spec = MergeSpecification::new();
        spec.add(OneMerge::new(infos.segments().to_vec()));
        Some(spec)
    }
}

struct FlawedPolicyTest(Flaw);

impl MergePolicyTestCase for FlawedPolicyTest {
    type Policy = FlawedPolicy;

    fn merge_policy(&self, _rng: &mut StdRng) -> FlawedPolicy {
        FlawedPolicy(self.0)
    }

    fn assert_segment_infos(&self, _policy: &FlawedPolicy, _infos: &SegmentInfos) -> Result<()> {
        Ok(())
    }
}

fn merge_policy_error(result: Result<impl std::fmt::Debug>) -> String {
    match result {
        Err(Error::MergePolicy(msg)) => msg,
        other => panic!("expected a merge policy violation, got {:?}", other),
    }
}

#[test]
fn test_quadratic_merging_detected() {
    let case = FlawedPolicyTest(Flaw::MergeEverything);
    let msg = merge_policy_error(
        case.check_no_pathological_merges(&mut StdRng::seed_from_u64(4), 10_000),
    );
    assert!(msg.contains("write amplification"), "{}", msg);

    // The same policy is still structurally sound
    case.simulate_append_only(&mut StdRng::seed_from_u64(4), 10_000, 100)
        .unwrap();
}

#[test]
fn test_full_flush_merges_count_towards_amplification() {
    let case = FlawedPolicyTest(Flaw::MergeEverythingOnFullFlush);
    let msg = merge_policy_error(
        case.check_no_pathological_merges(&mut StdRng::seed_from_u64(4), 10_000),
    );
    assert!(msg.contains("write amplification"), "{}", msg);

    let stats = case
        .simulate_updates(&mut StdRng::seed_from_u64(7), 5_000, 100)
        .unwrap();
    assert!(stats.merges > 0);
}

#[test]
fn test_overlapping_merges_rejected() {
    let msg = merge_policy_error(
        FlawedPolicyTest(Flaw::Overlapping).simulate_append_only(
            &mut StdRng::seed_from_u64(5),
            1_000,
            10,
        ),
    );
    assert!(msg.contains("more than one merge"), "{}", msg);
}

#[test]
fn test_empty_specification_rejected() {
    let msg = merge_policy_error(
        FlawedPolicyTest(Flaw::EmptySpec).simulate_updates(
            &mut StdRng::seed_from_u64(6),
            1_000,
            10,
        ),
    );
    assert!(msg.contains("empty merge specification"), "{}", msg);
}
