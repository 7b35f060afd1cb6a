use std::sync::Arc;

use super::support::{block_context, small_config};
use crate::codec::{BlockPostingsFormat, PostingsFormat};
use crate::config::TestContext;
use crate::directories::{Directory, RamDirectory};
use crate::index::IndexOptions;
use crate::postings::{FeatureSet, RandomPostingsTester, TestFeature};
use crate::AssertingPostingsFormat;

const LEVELS: [IndexOptions; 4] = [
    IndexOptions::Docs,
    IndexOptions::DocsAndFreqs,
    IndexOptions::DocsAndFreqsAndPositions,
    IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
];

#[test]
fn test_full_at_every_level() {
    for options in LEVELS {
        let ctx = block_context(0x5EED_0000 + options.index() as u64);
        let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
        tester
            .test_full(&ctx, options, options.has_positions())
            .unwrap_or_else(|e| panic!("{} seed=0x{:x}: {}", options, ctx.seed, e));
    }
}

#[test]
fn test_random_levels_single_and_threaded() {
    let ctx = block_context(7);
    let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let index = tester
        .build_index(
            ctx.postings_format.as_ref(),
            directory,
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
            true,
            false,
        )
        .unwrap();
    index.producer.check_integrity().unwrap();
    tester
        .test_fields(index.producer.as_ref(), &index.field_infos)
        .unwrap();

    let single = FeatureSet::all().without(TestFeature::Threads);
    tester
        .test_terms(&index, single, IndexOptions::DocsAndFreqsAndPositionsAndOffsets, false)
        .unwrap();
    tester
        .test_terms(&index, FeatureSet::all(), IndexOptions::DocsAndFreqsAndPositions, false)
        .unwrap();
    tester
        .test_terms(&index, FeatureSet::empty(), IndexOptions::Docs, false)
        .unwrap();
}

#[test]
fn test_full_through_asserting_format() {
    let format = Arc::new(AssertingPostingsFormat::new(Arc::new(
        BlockPostingsFormat::new(),
    )));
    assert_eq!(format.name(), "Asserting(Block)");
    let ctx = TestContext::new(11, small_config(), format);
    let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
    tester
        .test_full(&ctx, IndexOptions::DocsAndFreqsAndPositionsAndOffsets, true)
        .unwrap();
}

#[test]
fn test_segments_get_fresh_names() {
    let ctx = block_context(3);
    let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let format = BlockPostingsFormat::new();
    let first = tester
        .build_index(&format, Arc::clone(&directory), IndexOptions::Docs, false, true)
        .unwrap();
    let second = tester
        .build_index(&format, Arc::clone(&directory), IndexOptions::DocsAndFreqs, false, true)
        .unwrap();
    assert_eq!(first.segment_name, "_0");
    assert_eq!(second.segment_name, "_1");
    assert_eq!(directory.list_all().unwrap().len(), 4);
    // Both segments stay readable side by side
    tester
        .test_terms(&first, FeatureSet::empty(), IndexOptions::Docs, true)
        .unwrap();
    tester
        .test_terms(&second, FeatureSet::empty(), IndexOptions::DocsAndFreqs, true)
        .unwrap();
}

#[test]
fn test_build_index_rejects_unindexed_level() {
    let ctx = block_context(4);
    let mut tester = RandomPostingsTester::from_context(&ctx).unwrap();
    let result = tester.build_index(
        ctx.postings_format.as_ref(),
        Arc::new(RamDirectory::new()),
        IndexOptions::None,
        false,
        true,
    );
    assert!(matches!(result, Err(crate::Error::Config(_))));
}
