use std::sync::Arc;

use super::support::small_config;
use crate::codec::BlockPostingsFormat;
use crate::config::{TestConfig, TestContext};
use crate::index::IndexOptions;
use crate::postings::RandomPostingsTester;

fn context(seed: u64, fault_rate: f64) -> TestContext {
    let config = TestConfig {
        fault_rate,
        ..small_config()
    };
    TestContext::new(seed, config, Arc::new(BlockPostingsFormat::new()))
}

#[test]
fn test_every_operation_failing_is_a_fake_fault() {
    let ctx = context(5, 1.0);
    let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
    let err = tester
        .test_full(&ctx, IndexOptions::DocsAndFreqs, false)
        .unwrap_err();
    assert!(err.is_fake_fault(), "{}", err);
}

#[test]
fn test_sporadic_faults_never_look_like_bugs() {
    for seed in 0..6u64 {
        let ctx = context(seed, 0.3);
        let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
        match tester.test_full(&ctx, IndexOptions::Docs, false) {
            Ok(()) => {}
            Err(e) => assert!(e.is_fake_fault(), "seed {}: {}", seed, e),
        }
    }
}
