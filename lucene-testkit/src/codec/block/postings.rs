//! Block postings enumerator
//!
//! Decodes one block at a time. `advance` walks the skip entries to the first
//! block whose last doc reaches the target, so only that block is decoded.

use super::encoding::ByteReader;
use crate::codec::{ImpactsEnum, PostingsEnum};
use crate::directories::OwnedBytes;
use crate::error::{Error, Result};
use crate::index::{FixedBitSet, Impact, ImpactLevel, Impacts, PostingsFlags};
use crate::{DocId, NO_MORE_DOCS, UNPOSITIONED};

/// What a field stores on disk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldLayout {
    pub has_freqs: bool,
    pub has_positions: bool,
    pub has_offsets: bool,
    pub has_payloads: bool,
}

#[derive(Debug, Clone)]
struct SkipEntry {
    count: usize,
    last_doc: DocId,
    data_start: usize,
    data_end: usize,
    impacts: Vec<Impact>,
}

/// Fully decoded block; positional arrays are flattened across docs.
#[derive(Debug, Default)]
struct DecodedBlock {
    docs: Vec<DocId>,
    freqs: Vec<i32>,
    /// Index into the positional arrays where each doc starts
    pos_starts: Vec<usize>,
    positions: Vec<i32>,
    start_offsets: Vec<i32>,
    end_offsets: Vec<i32>,
    payload_ranges: Vec<(usize, usize)>,
    payloads: Vec<u8>,
}

impl DecodedBlock {
    fn clear(&mut self) {
        self.docs.clear();
        self.freqs.clear();
        self.pos_starts.clear();
        self.positions.clear();
        self.start_offsets.clear();
        self.end_offsets.clear();
        self.payload_ranges.clear();
        self.payloads.clear();
    }
}

pub(crate) struct BlockPostingsEnum {
    blob: OwnedBytes,
    layout: FieldLayout,
    want_positions: bool,
    want_offsets: bool,
    want_payloads: bool,
    doc_freq: i32,
    skips: Vec<SkipEntry>,
    list_impacts: Vec<Impact>,
    block: DecodedBlock,
    block_idx: Option<usize>,
    /// Index of the current doc within `block`
    idx: usize,
    doc: DocId,
    /// Positions consumed for the current doc
    pos_upto: usize,
    shallow_target: DocId,
}

impl BlockPostingsEnum {
    pub(crate) fn open(
        blob: OwnedBytes,
        layout: FieldLayout,
        flags: PostingsFlags,
        doc_freq: i32,
    ) -> Result<Self> {
        let mut reader = ByteReader::new(blob.as_slice());
        let num_blocks = reader.read_vint_usize()?;
        let list_impacts = reader.read_impacts()?;

        let mut headers = Vec::with_capacity(num_blocks.min(1 << 16));
        let mut last_doc = -1;
        for _ in 0..num_blocks {
            let count = reader.read_vint_usize()?;
            last_doc += reader.read_vint_i32()?;
            let byte_len = reader.read_vint_usize()?;
            let impacts = reader.read_impacts()?;
            headers.push((count, last_doc, byte_len, impacts));
        }

        let mut data_start = reader.position();
        let mut skips = Vec::with_capacity(headers.len());
        let mut total = 0usize;
        for (count, last_doc, byte_len, impacts) in headers {
            total += count;
            skips.push(SkipEntry {
                count,
                last_doc,
                data_start,
                data_end: data_start + byte_len,
                impacts,
            });
            data_start += byte_len;
        }
        if data_start != blob.len() || total != doc_freq as usize {
            return Err(Error::Corruption(format!(
                "postings blob covers {} docs in {} bytes, expected {} docs in {} bytes",
                total,
                data_start,
                doc_freq,
                blob.len()
            )));
        }

        Ok(Self {
            blob,
            layout,
            want_positions: flags.contains(PostingsFlags::POSITIONS) && layout.has_positions,
            want_offsets: flags.contains(PostingsFlags::OFFSETS) && layout.has_offsets,
            want_payloads: flags.contains(PostingsFlags::PAYLOADS) && layout.has_payloads,
            doc_freq,
            skips,
            list_impacts,
            block: DecodedBlock::default(),
            block_idx: None,
            idx: 0,
            doc: -1,
            pos_upto: 0,
            shallow_target: -1,
        })
    }

    /// Decode block `index`, returning false past the last block.
    fn load_block(&mut self, index: usize) -> Result<bool> {
        let Some(skip) = self.skips.get(index) else {
            self.block_idx = Some(self.skips.len());
            self.block.clear();
            return Ok(false);
        };
        let layout = self.layout;
        let block = &mut self.block;
        block.clear();

        let mut reader = ByteReader::new(&self.blob.as_slice()[skip.data_start..skip.data_end]);
        let mut doc = if index == 0 {
            -1
        } else {
            self.skips[index - 1].last_doc
        };
        for _ in 0..skip.count {
            doc += reader.read_vint_i32()?;
            block.docs.push(doc);
            let freq = if layout.has_freqs {
                reader.read_vint_i32()?
            } else {
                1
            };
            block.freqs.push(freq);
            block.pos_starts.push(block.positions.len());
            if !layout.has_positions {
                continue;
            }
            let mut pos = 0;
            let mut start = 0;
            for _ in 0..freq {
                pos += reader.read_vint_i32()?;
                block.positions.push(pos);
                if layout.has_payloads {
                    let len = reader.read_vint_usize()?;
                    let bytes = reader.read_bytes(len)?;
                    let from = block.payloads.len();
                    block.payloads.extend_from_slice(bytes);
                    block.payload_ranges.push((from, block.payloads.len()));
                }
                if layout.has_offsets {
                    start += reader.read_vint_i32()?;
                    let length = reader.read_vint_i32()?;
                    block.start_offsets.push(start);
                    block.end_offsets.push(start + length);
                }
            }
        }
        if reader.remaining() != 0 || doc != skip.last_doc {
            return Err(Error::Corruption(format!(
                "block {} decoded to last doc {} with {} bytes left, expected last doc {}",
                index,
                doc,
                reader.remaining(),
                skip.last_doc
            )));
        }
        self.block_idx = Some(index);
        self.idx = 0;
        Ok(true)
    }

    fn set_current(&mut self, idx: usize) -> DocId {
        self.idx = idx;
        self.doc = self.block.docs[idx];
        self.pos_upto = 0;
        self.doc
    }

    fn exhaust(&mut self) -> DocId {
        self.doc = NO_MORE_DOCS;
        self.pos_upto = 0;
        NO_MORE_DOCS
    }

    fn require_doc(&self, what: &str) -> Result<()> {
        if self.doc < 0 || self.doc == NO_MORE_DOCS {
            return Err(Error::Codec(format!(
                "{} called while unpositioned (doc={})",
                what, self.doc
            )));
        }
        Ok(())
    }

    /// Index into the positional arrays of the last returned position.
    fn current_position_index(&self, what: &str) -> Result<usize> {
        self.require_doc(what)?;
        if self.pos_upto == 0 {
            return Err(Error::Codec(format!("{} called before next_position", what)));
        }
        Ok(self.block.pos_starts[self.idx] + self.pos_upto - 1)
    }

    /// First block whose last doc is >= `target`, starting from `from`.
    fn find_block(&self, from: usize, target: DocId) -> usize {
        from + self.skips[from..].partition_point(|s| s.last_doc < target)
    }
}

impl PostingsEnum for BlockPostingsEnum {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS {
            return Ok(NO_MORE_DOCS);
        }
        let next = match self.block_idx {
            None => 0,
            Some(_) if self.idx + 1 < self.block.docs.len() => {
                return Ok(self.set_current(self.idx + 1));
            }
            Some(b) => b + 1,
        };
        if self.load_block(next)? {
            Ok(self.set_current(0))
        } else {
            Ok(self.exhaust())
        }
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        if self.doc == NO_MORE_DOCS || target == NO_MORE_DOCS {
            return Ok(self.exhaust());
        }
        let from = self.block_idx.unwrap_or(0);
        let block = self.find_block(from, target);
        if block >= self.skips.len() {
            self.block_idx = Some(self.skips.len());
            self.block.clear();
            return Ok(self.exhaust());
        }
        let start_idx = if self.block_idx == Some(block) {
            self.idx
        } else {
            self.load_block(block)?;
            0
        };
        // The skip entry guarantees a doc >= target within this block
        let offset = self.block.docs[start_idx..].partition_point(|&d| d < target);
        Ok(self.set_current(start_idx + offset))
    }

    fn freq(&self) -> Result<i32> {
        self.require_doc("freq")?;
        Ok(self.block.freqs[self.idx])
    }

    fn next_position(&mut self) -> Result<i32> {
        if !self.want_positions {
            return Ok(UNPOSITIONED);
        }
        self.require_doc("next_position")?;
        let freq = self.block.freqs[self.idx] as usize;
        if self.pos_upto >= freq {
            return Err(Error::Codec(format!(
                "next_position called more than freq={} times on doc {}",
                freq, self.doc
            )));
        }
        self.pos_upto += 1;
        Ok(self.block.positions[self.block.pos_starts[self.idx] + self.pos_upto - 1])
    }

    fn start_offset(&self) -> Result<i32> {
        if !self.want_offsets {
            return Ok(-1);
        }
        let i = self.current_position_index("start_offset")?;
        Ok(self.block.start_offsets[i])
    }

    fn end_offset(&self) -> Result<i32> {
        if !self.want_offsets {
            return Ok(-1);
        }
        let i = self.current_position_index("end_offset")?;
        Ok(self.block.end_offsets[i])
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        if !self.want_payloads {
            return Ok(None);
        }
        let i = self.current_position_index("payload")?;
        let (from, to) = self.block.payload_ranges[i];
        if from == to {
            return Ok(None);
        }
        Ok(Some(&self.block.payloads[from..to]))
    }

    fn cost(&self) -> i64 {
        self.doc_freq as i64
    }

    fn into_bit_set(&mut self, up_to: DocId, bit_set: &mut FixedBitSet, offset: DocId) -> Result<()> {
        if self.doc == NO_MORE_DOCS {
            return Ok(());
        }
        self.require_doc("into_bit_set")?;
        loop {
            let Some(block) = self.block_idx else {
                return Ok(());
            };
            let docs = &self.block.docs;
            let end = self.idx + docs[self.idx..].partition_point(|&d| d < up_to);
            for &doc in &docs[self.idx..end] {
                bit_set.set((doc - offset) as usize);
            }
            if end < docs.len() {
                self.set_current(end);
                return Ok(());
            }
            if !self.load_block(block + 1)? {
                self.exhaust();
                return Ok(());
            }
            self.set_current(0);
        }
    }
}

impl ImpactsEnum for BlockPostingsEnum {
    fn advance_shallow(&mut self, target: DocId) -> Result<()> {
        if target > self.shallow_target {
            self.shallow_target = target;
        }
        Ok(())
    }

    fn impacts(&mut self) -> Result<Impacts> {
        let target = self.shallow_target.max(self.doc).max(0);
        let from = match self.block_idx {
            Some(b) if b < self.skips.len() => b,
            _ => 0,
        };
        let block = self.find_block(from, target);
        let Some(skip) = self.skips.get(block) else {
            return Ok(Impacts::new(vec![ImpactLevel {
                doc_id_up_to: NO_MORE_DOCS,
                impacts: self.list_impacts.clone(),
            }]));
        };
        Ok(Impacts::new(vec![
            ImpactLevel {
                doc_id_up_to: skip.last_doc,
                impacts: skip.impacts.clone(),
            },
            ImpactLevel {
                doc_id_up_to: NO_MORE_DOCS,
                impacts: self.list_impacts.clone(),
            },
        ]))
    }
}
