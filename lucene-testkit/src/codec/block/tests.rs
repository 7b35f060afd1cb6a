use std::io::Write;
use std::sync::Arc;

use super::{BLOCK_SIZE, BlockPostingsFormat, POSTINGS_EXTENSION};
use crate::codec::{FieldsProducer, PostingsEnum, PostingsFormat, SegmentWriteState, TermsEnum};
use crate::directories::{Directory, IndexOutput, RamDirectory};
use crate::index::{FieldInfo, FieldInfos, FixedBitSet, IndexOptions, check_impacts};
use crate::postings::{Corpus, FakeNorms, SeedFields};
use crate::{DocId, NO_MORE_DOCS};

fn corpus() -> Arc<Corpus> {
    Arc::new(
        Corpus::from_terms(
            vec![
                (
                    "body".to_string(),
                    vec![
                        (b"medium_a".to_vec(), 11),
                        (b"low_b".to_vec(), 12),
                        (b"verylow_c".to_vec(), 13),
                    ],
                ),
                ("title".to_string(), vec![(b"low_d".to_vec(), 14)]),
            ],
            1,
        )
        .unwrap(),
    )
}

fn flush(
    corpus: &Arc<Corpus>,
    options: IndexOptions,
    payloads: bool,
) -> (Arc<dyn Directory>, SegmentWriteState, Arc<dyn FieldsProducer>) {
    let infos = corpus
        .field_infos()
        .iter()
        .map(|wide| {
            FieldInfo::new(wide.name.clone(), wide.number, options)
                .with_payloads(payloads && options.has_positions())
        })
        .collect();
    let field_infos = Arc::new(FieldInfos::new(infos).unwrap());
    let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
    let state = SegmentWriteState {
        directory: Arc::clone(&directory),
        segment_name: "_0".into(),
        max_doc: corpus.max_doc(),
        field_infos: Arc::clone(&field_infos),
    };
    let seed_fields = SeedFields::new(Arc::clone(corpus), field_infos, options, payloads);
    let format = BlockPostingsFormat::new();
    let mut consumer = format.fields_consumer(&state).unwrap();
    consumer.write(&seed_fields, &FakeNorms).unwrap();
    consumer.close().unwrap();
    let producer = format.fields_producer(&state.to_read_state()).unwrap();
    (directory, state, producer)
}

fn seek(producer: &Arc<dyn FieldsProducer>, field: &str, term: &[u8]) -> Box<dyn TermsEnum> {
    let mut te = producer.terms(field).unwrap().unwrap().iterator().unwrap();
    assert!(te.seek_exact(term).unwrap());
    te
}

#[test]
fn test_round_trip_at_every_level() {
    let corpus = corpus();
    for options in [
        IndexOptions::Docs,
        IndexOptions::DocsAndFreqs,
        IndexOptions::DocsAndFreqsAndPositions,
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
    ] {
        let payloads = options.has_positions();
        let (_dir, _state, producer) = flush(&corpus, options, payloads);
        producer.check_integrity().unwrap();
        assert_eq!(producer.field_names(), vec!["body", "title"]);

        for (field, terms) in corpus.fields() {
            let codec_terms = producer.terms(field).unwrap().unwrap();
            assert_eq!(codec_terms.size(), terms.len() as i64);
            assert_eq!(codec_terms.has_freqs(), options.has_freqs());
            assert_eq!(codec_terms.has_positions(), options.has_positions());
            assert_eq!(codec_terms.has_offsets(), options.has_offsets());

            let mut te = codec_terms.iterator().unwrap();
            for (term, seed_and_ord) in terms.iter() {
                assert_eq!(te.next().unwrap(), Some(term));
                assert_eq!(te.ord().unwrap(), seed_and_ord.ord);

                let mut expected = corpus.seed_postings(term, seed_and_ord.seed, options, payloads);
                assert_eq!(te.doc_freq().unwrap(), expected.doc_freq());
                let flags = options.max_flags(payloads);
                let mut actual = te.postings(flags).unwrap().unwrap();
                loop {
                    let doc = expected.next_doc().unwrap();
                    assert_eq!(actual.next_doc().unwrap(), doc, "{} at {}", field, options);
                    if doc == NO_MORE_DOCS {
                        break;
                    }
                    if !options.has_freqs() {
                        continue;
                    }
                    let freq = expected.freq().unwrap();
                    assert_eq!(actual.freq().unwrap(), freq);
                    if !options.has_positions() {
                        continue;
                    }
                    for _ in 0..freq {
                        assert_eq!(
                            actual.next_position().unwrap(),
                            expected.next_position().unwrap()
                        );
                        assert_eq!(actual.payload().unwrap(), expected.payload().unwrap());
                        if options.has_offsets() {
                            assert_eq!(
                                actual.start_offset().unwrap(),
                                expected.start_offset().unwrap()
                            );
                            assert_eq!(
                                actual.end_offset().unwrap(),
                                expected.end_offset().unwrap()
                            );
                        }
                    }
                }
            }
            assert!(te.next().unwrap().is_none());
        }
    }
}

#[test]
fn test_advance_across_blocks() {
    let corpus = corpus();
    let options = IndexOptions::DocsAndFreqs;
    let (_dir, _state, producer) = flush(&corpus, options, false);
    let seed = corpus.field("body").unwrap().get(b"medium_a").unwrap().seed;

    let mut docs = Vec::new();
    let mut oracle = corpus.seed_postings(b"medium_a", seed, options, false);
    while oracle.next_doc().unwrap() != NO_MORE_DOCS {
        docs.push(oracle.doc_id());
    }
    assert!(docs.len() > 3 * BLOCK_SIZE);

    let mut te = seek(&producer, "body", b"medium_a");
    let mut postings = te.postings(options.max_flags(false)).unwrap().unwrap();
    // Land exactly on, and just past, docs in later blocks
    for i in [BLOCK_SIZE / 2, BLOCK_SIZE + 1, 2 * BLOCK_SIZE + 7] {
        let target = docs[i];
        assert_eq!(postings.advance(target).unwrap(), target);
        let next = docs[i + 1];
        assert_eq!(postings.advance(target + 1).unwrap(), next);
    }
    let last = *docs.last().unwrap();
    assert_eq!(postings.advance(last + 1).unwrap(), NO_MORE_DOCS);
}

#[test]
fn test_impacts_bound_every_block() {
    let corpus = corpus();
    let options = IndexOptions::DocsAndFreqs;
    let (_dir, _state, producer) = flush(&corpus, options, false);
    let mut te = seek(&producer, "body", b"medium_a");
    let mut impacts_enum = te.impacts(options.max_flags(false)).unwrap();

    let mut last_target: DocId = -1;
    while impacts_enum.next_doc().unwrap() != NO_MORE_DOCS {
        let doc = impacts_enum.doc_id();
        impacts_enum.advance_shallow(doc).unwrap();
        let impacts = impacts_enum.impacts().unwrap();
        check_impacts(&impacts, doc.max(last_target)).unwrap();
        assert!(impacts.doc_id_up_to(0) >= doc);
        let freq = impacts_enum.freq().unwrap();
        let norm = crate::postings::fake_norm(doc);
        // Some impact on the first level must dominate this doc
        assert!(
            impacts
                .impacts(0)
                .iter()
                .any(|impact| impact.freq >= freq && impact.norm <= norm),
            "doc {} freq {} norm {} not covered by {:?}",
            doc,
            freq,
            norm,
            impacts.impacts(0)
        );
        last_target = doc;
    }
}

#[test]
fn test_into_bit_set_matches_stepping() {
    let corpus = corpus();
    let options = IndexOptions::Docs;
    let (_dir, _state, producer) = flush(&corpus, options, false);
    let max_doc = corpus.max_doc();

    let mut stepped = FixedBitSet::new(max_doc as usize);
    let mut te = seek(&producer, "body", b"medium_a");
    let mut postings = te.postings(options.max_flags(false)).unwrap().unwrap();
    while postings.next_doc().unwrap() != NO_MORE_DOCS {
        stepped.set(postings.doc_id() as usize);
    }

    let mut bulk = FixedBitSet::new(max_doc as usize);
    let mut postings = te.postings(options.max_flags(false)).unwrap().unwrap();
    let first = postings.next_doc().unwrap();
    let middle = max_doc / 2;
    postings.into_bit_set(middle, &mut bulk, 0).unwrap();
    assert!(postings.doc_id() >= middle);
    postings.into_bit_set(NO_MORE_DOCS, &mut bulk, 0).unwrap();
    assert_eq!(postings.doc_id(), NO_MORE_DOCS);
    assert!(bulk.get(first as usize));
    assert_eq!(bulk, stepped);
}

#[test]
fn test_term_state_and_ord_seeking() {
    let corpus = corpus();
    let (_dir, _state, producer) = flush(&corpus, IndexOptions::DocsAndFreqs, false);
    let terms = producer.terms("body").unwrap().unwrap();

    let mut te = terms.iterator().unwrap();
    assert!(te.seek_exact(b"low_b").unwrap());
    let state = te.term_state().unwrap();
    let doc_freq = te.doc_freq().unwrap();

    let mut other = terms.iterator().unwrap();
    other.seek_exact_state(b"low_b", &state).unwrap();
    assert_eq!(other.term(), b"low_b");
    assert_eq!(other.doc_freq().unwrap(), doc_freq);
    // A state only reseeks its own term
    assert!(other.seek_exact_state(b"medium_a", &state).is_err());

    other.seek_exact_ord(2).unwrap();
    assert_eq!(other.term(), b"verylow_c");
    assert!(other.seek_exact_ord(3).is_err());
    assert!(!other.seek_exact(b"nope").unwrap());
}

#[test]
fn test_flipped_byte_is_detected() {
    let corpus = corpus();
    let (directory, state, producer) = flush(&corpus, IndexOptions::Docs, false);
    producer.check_integrity().unwrap();

    let name = state.file_name(POSTINGS_EXTENSION);
    let mut bytes = directory.open_input(&name).unwrap().as_slice().to_vec();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x40;
    let mut output = directory.create_output(&name).unwrap();
    output.write_all(&bytes).unwrap();
    output.finish().unwrap();

    let err = match BlockPostingsFormat::new().fields_producer(&state.to_read_state()) {
        Ok(_) => panic!("corrupted segment opened cleanly"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("corruption"), "{}", err);
}

#[test]
fn test_unknown_field_and_empty_requests() {
    let corpus = corpus();
    let (_dir, _state, producer) = flush(&corpus, IndexOptions::Docs, false);
    assert!(producer.terms("_unknown_").unwrap().is_none());

    let mut te = producer.terms("title").unwrap().unwrap().iterator().unwrap();
    // Not positioned yet
    assert!(te.postings(IndexOptions::Docs.max_flags(false)).is_err());
    assert_eq!(te.next().unwrap(), Some(&b"low_d"[..]));
    let postings = te.postings(IndexOptions::Docs.max_flags(false)).unwrap().unwrap();
    assert_eq!(postings.doc_id(), -1);
    assert!(postings.cost() > 0);
}
