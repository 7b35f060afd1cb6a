use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::TestConfig;
use crate::error::{Error, Result};
use crate::merge::{MergePolicyTestCase, NoMergePolicy, SegmentInfos, SegmentSource};

struct NoMergePolicyTest;

impl MergePolicyTestCase for NoMergePolicyTest {
    type Policy = NoMergePolicy;

    fn merge_policy(&self, _rng: &mut StdRng) -> NoMergePolicy {
        NoMergePolicy
    }

    fn assert_segment_infos(&self, _policy: &NoMergePolicy, infos: &SegmentInfos) -> Result<()> {
        match infos.iter().find(|info| info.source != SegmentSource::Flush) {
            Some(info) => Err(Error::MergePolicy(format!("{} was merged", info))),
            None => Ok(()),
        }
    }
}

#[test]
fn test_never_merges() {
    let mut rng = StdRng::seed_from_u64(9);
    let stats = NoMergePolicyTest
        .simulate_append_only(&mut rng, 50_000, 1_000)
        .unwrap();
    assert_eq!(stats.merges, 0);
    assert_eq!(stats.merge_bytes, 0);
    assert_eq!(stats.write_amplification(), 1.0);
}

#[test]
fn test_updates_only_flush() {
    let mut rng = StdRng::seed_from_u64(10);
    let stats = NoMergePolicyTest
        .simulate_updates(&mut rng, 20_000, 500)
        .unwrap();
    assert_eq!(stats.merges, 0);
    assert!(stats.flushes > 20_000 / 500);
}

#[test]
fn test_updates_with_flushes_larger_than_the_index() {
    for seed in 0..200 {
        let mut rng = StdRng::seed_from_u64(seed);
        let stats = NoMergePolicyTest
            .simulate_updates(&mut rng, 1_000, 2_500)
            .unwrap_or_else(|e| panic!("seed {}: {}", seed, e));
        assert_eq!(stats.merges, 0);
    }
}

#[test]
fn test_all_scenarios() {
    let config = TestConfig {
        append_only_total_docs: 100_000,
        updates_total_docs: 50_000,
        ..Default::default()
    };
    NoMergePolicyTest.check_all(&config, 0x5eed).unwrap();
}
