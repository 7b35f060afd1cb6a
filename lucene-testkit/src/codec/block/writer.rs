//! Block postings writer
//!
//! Pulls each field's terms and postings at the strongest flags the field
//! is indexed with, encodes them into `BLOCK_SIZE`-doc blocks and buffers
//! both files until `close`, where they are framed and written out.

use std::io::Write;

use super::encoding::{write_footer, write_header, write_impacts, write_vint};
use super::{
    BLOCK_SIZE, POSTINGS_EXTENSION, POSTINGS_MAGIC, TERMS_EXTENSION, TERMS_MAGIC, VERSION,
};
use crate::codec::{Fields, FieldsConsumer, NormsProducer, PostingsEnum, SegmentWriteState};
use crate::directories::IndexOutput;
use crate::error::{Error, Result, display_term};
use crate::index::{FieldInfo, FixedBitSet, Impact, pareto_frontier};
use crate::{DocId, NO_MORE_DOCS};

/// Stats of one encoded term, kept for the terms dictionary.
struct TermMeta {
    term: Vec<u8>,
    doc_freq: i32,
    total_term_freq: i64,
    offset: u64,
    len: u64,
}

struct FieldMeta {
    number: u32,
    terms: Vec<TermMeta>,
    sum_doc_freq: i64,
    sum_total_term_freq: i64,
    doc_count: i32,
}

/// Skip entry of one encoded block.
struct BlockMeta {
    count: usize,
    last_doc: DocId,
    byte_len: usize,
    impacts: Vec<Impact>,
}

pub struct BlockFieldsConsumer {
    state: SegmentWriteState,
    postings_out: Box<dyn IndexOutput>,
    terms_out: Box<dyn IndexOutput>,
    /// Term blobs, framed at close
    postings: Vec<u8>,
    fields: Vec<FieldMeta>,
}

impl BlockFieldsConsumer {
    pub fn new(state: &SegmentWriteState) -> Result<Self> {
        let postings_out = state
            .directory
            .create_output(&state.file_name(POSTINGS_EXTENSION))?;
        let terms_out = state
            .directory
            .create_output(&state.file_name(TERMS_EXTENSION))?;
        let mut postings = Vec::new();
        write_header(&mut postings, POSTINGS_MAGIC, VERSION)?;
        Ok(Self {
            state: state.clone(),
            postings_out,
            terms_out,
            postings,
            fields: Vec::new(),
        })
    }

    fn write_field(
        &mut self,
        info: &FieldInfo,
        fields: &dyn Fields,
        norms: &dyn NormsProducer,
    ) -> Result<()> {
        let Some(terms) = fields.terms(&info.name)? else {
            return Ok(());
        };
        let flags = info.index_options.max_flags(info.has_payloads);
        let mut docs_seen = FixedBitSet::new(self.state.max_doc.max(0) as usize);
        let mut meta = FieldMeta {
            number: info.number,
            terms: Vec::new(),
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            doc_count: 0,
        };

        let mut terms_enum = terms.iterator()?;
        while let Some(term) = terms_enum.next()? {
            let term = term.to_vec();
            if let Some(previous) = meta.terms.last()
                && previous.term >= term
            {
                return Err(Error::Codec(format!(
                    "field {:?}: term {} is out of order after {}",
                    info.name,
                    display_term(&term),
                    display_term(&previous.term)
                )));
            }
            let mut postings = terms_enum.postings(flags)?.ok_or_else(|| {
                Error::Codec(format!(
                    "field {:?} cannot serve its own index options {:?}",
                    info.name, flags
                ))
            })?;

            let offset = self.postings.len() as u64;
            let encoder = TermEncoder {
                info,
                max_doc: self.state.max_doc,
                norms,
            };
            let (doc_freq, total_term_freq) =
                encoder.encode(&term, postings.as_mut(), &mut docs_seen, &mut self.postings)?;

            meta.sum_doc_freq += doc_freq as i64;
            meta.sum_total_term_freq += total_term_freq;
            meta.terms.push(TermMeta {
                term,
                doc_freq,
                total_term_freq,
                offset,
                len: self.postings.len() as u64 - offset,
            });
        }

        meta.doc_count = docs_seen.cardinality() as i32;
        log::debug!(
            "[block_codec] {} field {:?}: {} terms, {} docs",
            self.state.segment_name,
            info.name,
            meta.terms.len(),
            meta.doc_count
        );
        self.fields.push(meta);
        Ok(())
    }

    fn encode_terms_dict(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        write_header(&mut buf, TERMS_MAGIC, VERSION)?;
        write_vint(&mut buf, self.fields.len() as u64)?;
        for field in &self.fields {
            write_vint(&mut buf, field.number as u64)?;
            write_vint(&mut buf, field.terms.len() as u64)?;
            write_vint(&mut buf, field.sum_doc_freq as u64)?;
            write_vint(&mut buf, field.sum_total_term_freq as u64)?;
            write_vint(&mut buf, field.doc_count as u64)?;

            let mut previous: &[u8] = &[];
            for meta in &field.terms {
                let shared = previous
                    .iter()
                    .zip(&meta.term)
                    .take_while(|(a, b)| a == b)
                    .count();
                let suffix = &meta.term[shared..];
                write_vint(&mut buf, shared as u64)?;
                write_vint(&mut buf, suffix.len() as u64)?;
                buf.write_all(suffix)?;
                write_vint(&mut buf, meta.doc_freq as u64)?;
                write_vint(&mut buf, (meta.total_term_freq - meta.doc_freq as i64) as u64)?;
                write_vint(&mut buf, meta.offset)?;
                write_vint(&mut buf, meta.len)?;
                previous = &meta.term;
            }
        }
        write_footer(&mut buf)?;
        Ok(buf)
    }
}

impl FieldsConsumer for BlockFieldsConsumer {
    fn write(&mut self, fields: &dyn Fields, norms: &dyn NormsProducer) -> Result<()> {
        let field_infos = std::sync::Arc::clone(&self.state.field_infos);
        for name in fields.field_names() {
            let info = field_infos.by_name(&name).ok_or_else(|| {
                Error::Codec(format!("field {:?} has no FieldInfo in this segment", name))
            })?;
            if !info.index_options.is_indexed() {
                continue;
            }
            self.write_field(info, fields, norms)?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        let terms = this.encode_terms_dict()?;
        let mut postings = this.postings;
        write_footer(&mut postings)?;

        let mut postings_out = this.postings_out;
        postings_out.write_all(&postings)?;
        postings_out.finish()?;

        let mut terms_out = this.terms_out;
        terms_out.write_all(&terms)?;
        terms_out.finish()?;
        log::debug!(
            "[block_codec] flushed {}: {} postings bytes, {} terms bytes",
            this.state.segment_name,
            postings.len(),
            terms.len()
        );
        Ok(())
    }
}

/// Encodes one term's postings into a self-describing blob.
struct TermEncoder<'a> {
    info: &'a FieldInfo,
    max_doc: DocId,
    norms: &'a dyn NormsProducer,
}

impl TermEncoder<'_> {
    fn corrupt(&self, term: &[u8], msg: String) -> Error {
        Error::Codec(format!(
            "field {:?} term {}: {}",
            self.info.name,
            display_term(term),
            msg
        ))
    }

    /// Append the blob to `out`, returning `(doc_freq, total_term_freq)`.
    fn encode(
        &self,
        term: &[u8],
        postings: &mut dyn PostingsEnum,
        docs_seen: &mut FixedBitSet,
        out: &mut Vec<u8>,
    ) -> Result<(i32, i64)> {
        let options = self.info.index_options;
        let has_freqs = options.has_freqs();
        let has_positions = options.has_positions();
        let has_offsets = options.has_offsets();
        let has_payloads = has_positions && self.info.has_payloads;

        let mut data = Vec::new();
        let mut blocks: Vec<BlockMeta> = Vec::new();
        let mut block_start = 0usize;
        let mut block_pairs: Vec<(i32, i64)> = Vec::with_capacity(BLOCK_SIZE);
        let mut prev_doc: DocId = -1;
        let mut doc_freq = 0i32;
        let mut total_term_freq = 0i64;

        loop {
            let doc = postings.next_doc()?;
            if doc == NO_MORE_DOCS {
                break;
            }
            if doc <= prev_doc || doc >= self.max_doc {
                return Err(self.corrupt(
                    term,
                    format!("doc {} after {} (maxDoc={})", doc, prev_doc, self.max_doc),
                ));
            }
            docs_seen.set(doc as usize);

            let freq = if has_freqs { postings.freq()? } else { 1 };
            if freq < 1 {
                return Err(self.corrupt(term, format!("freq {} for doc {}", freq, doc)));
            }
            let norm = if self.info.has_norms {
                self.norms.norm(self.info, doc)?
            } else {
                1
            };

            write_vint(&mut data, (doc - prev_doc) as u64)?;
            if has_freqs {
                write_vint(&mut data, freq as u64)?;
            }
            if has_positions {
                let mut prev_pos = 0;
                let mut prev_start = 0;
                for _ in 0..freq {
                    let pos = postings.next_position()?;
                    if pos < prev_pos {
                        return Err(self.corrupt(
                            term,
                            format!("position {} after {} in doc {}", pos, prev_pos, doc),
                        ));
                    }
                    write_vint(&mut data, (pos - prev_pos) as u64)?;
                    prev_pos = pos;

                    if has_payloads {
                        let payload = postings.payload()?.unwrap_or_default();
                        write_vint(&mut data, payload.len() as u64)?;
                        data.write_all(payload)?;
                    }
                    if has_offsets {
                        let start = postings.start_offset()?;
                        let end = postings.end_offset()?;
                        if start < prev_start || end < start {
                            return Err(self.corrupt(
                                term,
                                format!(
                                    "offsets [{}, {}) after start {} in doc {}",
                                    start, end, prev_start, doc
                                ),
                            ));
                        }
                        write_vint(&mut data, (start - prev_start) as u64)?;
                        write_vint(&mut data, (end - start) as u64)?;
                        prev_start = start;
                    }
                }
            }

            block_pairs.push((freq, norm));
            prev_doc = doc;
            doc_freq += 1;
            total_term_freq += freq as i64;

            if block_pairs.len() == BLOCK_SIZE {
                blocks.push(BlockMeta {
                    count: block_pairs.len(),
                    last_doc: prev_doc,
                    byte_len: data.len() - block_start,
                    impacts: pareto_frontier(block_pairs.drain(..)),
                });
                block_start = data.len();
            }
        }

        if !block_pairs.is_empty() {
            blocks.push(BlockMeta {
                count: block_pairs.len(),
                last_doc: prev_doc,
                byte_len: data.len() - block_start,
                impacts: pareto_frontier(block_pairs.drain(..)),
            });
        }
        if doc_freq == 0 {
            return Err(self.corrupt(term, "term has no postings".into()));
        }

        // Dominance is transitive, so the frontier of block frontiers covers every doc
        let list_impacts = pareto_frontier(
            blocks
                .iter()
                .flat_map(|b| b.impacts.iter().map(|i| (i.freq, i.norm))),
        );

        write_vint(out, blocks.len() as u64)?;
        write_impacts(out, &list_impacts)?;
        let mut prev_last = -1;
        for block in &blocks {
            write_vint(out, block.count as u64)?;
            write_vint(out, (block.last_doc - prev_last) as u64)?;
            write_vint(out, block.byte_len as u64)?;
            write_impacts(out, &block.impacts)?;
            prev_last = block.last_doc;
        }
        out.write_all(&data)?;
        Ok((doc_freq, total_term_freq))
    }
}
