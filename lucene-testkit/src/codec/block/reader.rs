//! Block postings reader: terms dictionary, terms enum and producer

use std::collections::BTreeMap;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::encoding::{ByteReader, check_footer, check_header};
use super::postings::{BlockPostingsEnum, FieldLayout};
use super::{POSTINGS_EXTENSION, POSTINGS_MAGIC, TERMS_EXTENSION, TERMS_MAGIC, VERSION};
use crate::codec::{
    Fields, FieldsProducer, ImpactsEnum, PostingsEnum, SeekStatus, SegmentReadState, TermState,
    Terms, TermsEnum,
};
use crate::directories::OwnedBytes;
use crate::error::{Error, Result, display_term};
use crate::index::{FieldInfo, PostingsFlags};

#[derive(Debug, Clone)]
struct TermEntry {
    term: Vec<u8>,
    doc_freq: i32,
    total_term_freq: i64,
    offset: usize,
    len: usize,
}

/// Decoded dictionary of one field plus a view over the postings file.
#[derive(Debug)]
struct FieldTermsData {
    info: FieldInfo,
    layout: FieldLayout,
    entries: Vec<TermEntry>,
    sum_doc_freq: i64,
    sum_total_term_freq: i64,
    doc_count: i32,
    postings: OwnedBytes,
}

impl FieldTermsData {
    fn open_postings(&self, ord: usize, flags: PostingsFlags) -> Result<BlockPostingsEnum> {
        let entry = &self.entries[ord];
        let blob = self.postings.slice(entry.offset..entry.offset + entry.len)?;
        BlockPostingsEnum::open(blob, self.layout, flags, entry.doc_freq)
    }
}

pub struct BlockFieldsProducer {
    segment_name: String,
    fields: BTreeMap<String, Arc<FieldTermsData>>,
    postings_file: OwnedBytes,
    terms_file: OwnedBytes,
}

impl BlockFieldsProducer {
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let postings_name = state.file_name(POSTINGS_EXTENSION);
        let terms_name = state.file_name(TERMS_EXTENSION);
        let postings_file = state.directory.open_input(&postings_name)?;
        let terms_file = state.directory.open_input(&terms_name)?;

        let postings_body = check_footer(&postings_name, postings_file.as_slice())?;
        check_header(
            &postings_name,
            &mut ByteReader::new(postings_body),
            POSTINGS_MAGIC,
            VERSION,
        )?;
        let postings = postings_file.slice(0..postings_body.len())?;

        let terms_body = check_footer(&terms_name, terms_file.as_slice())?;
        let mut reader = ByteReader::new(terms_body);
        check_header(&terms_name, &mut reader, TERMS_MAGIC, VERSION)?;

        let mut fields = BTreeMap::new();
        let num_fields = reader.read_vint_usize()?;
        for _ in 0..num_fields {
            let number = reader.read_vint()? as u32;
            let info = state.field_infos.by_number(number).cloned().ok_or_else(|| {
                Error::Corruption(format!("{} references unknown field {}", terms_name, number))
            })?;
            let data = read_field(&mut reader, info, &postings)?;
            fields.insert(data.info.name.clone(), Arc::new(data));
        }
        if reader.remaining() != 0 {
            return Err(Error::Corruption(format!(
                "{} has {} trailing bytes",
                terms_name,
                reader.remaining()
            )));
        }

        log::debug!(
            "[block_codec] opened {}: {} fields",
            state.segment_name,
            fields.len()
        );
        Ok(Self {
            segment_name: state.segment_name.clone(),
            fields,
            postings_file,
            terms_file,
        })
    }
}

fn read_field(
    reader: &mut ByteReader<'_>,
    info: FieldInfo,
    postings: &OwnedBytes,
) -> Result<FieldTermsData> {
    let num_terms = reader.read_vint_usize()?;
    let sum_doc_freq = reader.read_vint()? as i64;
    let sum_total_term_freq = reader.read_vint()? as i64;
    let doc_count = reader.read_vint_i32()?;

    let mut entries: Vec<TermEntry> = Vec::with_capacity(num_terms.min(1 << 16));
    for _ in 0..num_terms {
        let shared = reader.read_vint_usize()?;
        let suffix_len = reader.read_vint_usize()?;
        let suffix = reader.read_bytes(suffix_len)?;
        let previous = entries.last().map(|e| e.term.as_slice()).unwrap_or_default();
        if shared > previous.len() {
            return Err(Error::Corruption(format!(
                "field {:?}: shared prefix {} longer than previous term",
                info.name, shared
            )));
        }
        let mut term = previous[..shared].to_vec();
        term.extend_from_slice(suffix);

        let doc_freq = reader.read_vint_i32()?;
        let total_term_freq = doc_freq as i64 + reader.read_vint()? as i64;
        let offset = reader.read_vint_usize()?;
        let len = reader.read_vint_usize()?;
        if offset + len > postings.len() {
            return Err(Error::Corruption(format!(
                "field {:?} term {}: postings {}..{} beyond file end {}",
                info.name,
                display_term(&term),
                offset,
                offset + len,
                postings.len()
            )));
        }
        entries.push(TermEntry {
            term,
            doc_freq,
            total_term_freq,
            offset,
            len,
        });
    }

    let options = info.index_options;
    let layout = FieldLayout {
        has_freqs: options.has_freqs(),
        has_positions: options.has_positions(),
        has_offsets: options.has_offsets(),
        has_payloads: options.has_positions() && info.has_payloads,
    };
    Ok(FieldTermsData {
        info,
        layout,
        entries,
        sum_doc_freq,
        sum_total_term_freq,
        doc_count,
        postings: postings.clone(),
    })
}

impl Fields for BlockFieldsProducer {
    fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        Ok(self
            .fields
            .get(field)
            .map(|data| Arc::new(BlockTerms(Arc::clone(data))) as Arc<dyn Terms>))
    }

    fn size(&self) -> usize {
        self.fields.len()
    }
}

impl FieldsProducer for BlockFieldsProducer {
    fn check_integrity(&self) -> Result<()> {
        check_footer(
            &format!("{}.{}", self.segment_name, POSTINGS_EXTENSION),
            self.postings_file.as_slice(),
        )?;
        check_footer(
            &format!("{}.{}", self.segment_name, TERMS_EXTENSION),
            self.terms_file.as_slice(),
        )?;
        Ok(())
    }
}

struct BlockTerms(Arc<FieldTermsData>);

impl Terms for BlockTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(BlockTermsEnum {
            data: Arc::clone(&self.0),
            ord: None,
        }))
    }

    fn size(&self) -> i64 {
        self.0.entries.len() as i64
    }

    fn doc_count(&self) -> i32 {
        self.0.doc_count
    }

    fn sum_doc_freq(&self) -> i64 {
        self.0.sum_doc_freq
    }

    fn sum_total_term_freq(&self) -> i64 {
        self.0.sum_total_term_freq
    }

    fn has_freqs(&self) -> bool {
        self.0.layout.has_freqs
    }

    fn has_positions(&self) -> bool {
        self.0.layout.has_positions
    }

    fn has_offsets(&self) -> bool {
        self.0.layout.has_offsets
    }

    fn has_payloads(&self) -> bool {
        self.0.layout.has_payloads
    }
}

/// Cursor over the sorted term entries. `ord == len` means exhausted.
struct BlockTermsEnum {
    data: Arc<FieldTermsData>,
    ord: Option<usize>,
}

impl BlockTermsEnum {
    fn current_ord(&self) -> Result<usize> {
        match self.ord {
            Some(ord) if ord < self.data.entries.len() => Ok(ord),
            _ => Err(Error::Codec("terms enum is not positioned on a term".into())),
        }
    }

    fn current(&self) -> Result<&TermEntry> {
        Ok(&self.data.entries[self.current_ord()?])
    }
}

impl TermsEnum for BlockTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        let next = self.ord.map_or(0, |ord| ord + 1).min(self.data.entries.len());
        self.ord = Some(next);
        Ok(self.data.entries.get(next).map(|e| e.term.as_slice()))
    }

    fn term(&self) -> &[u8] {
        self.ord
            .and_then(|ord| self.data.entries.get(ord))
            .map(|e| e.term.as_slice())
            .unwrap_or_default()
    }

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        match self
            .data
            .entries
            .binary_search_by(|e| e.term.as_slice().cmp(term))
        {
            Ok(ord) => {
                self.ord = Some(ord);
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        let entries = &self.data.entries;
        let ord = entries.partition_point(|e| e.term.as_slice() < term);
        self.ord = Some(ord);
        Ok(match entries.get(ord) {
            Some(e) if e.term == term => SeekStatus::Found,
            Some(_) => SeekStatus::NotFound,
            None => SeekStatus::End,
        })
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        if ord >= self.data.entries.len() as u64 {
            return Err(Error::Codec(format!(
                "ord {} out of range for {} terms",
                ord,
                self.data.entries.len()
            )));
        }
        self.ord = Some(ord as usize);
        Ok(())
    }

    fn ord(&self) -> Result<u64> {
        Ok(self.current_ord()? as u64)
    }

    fn term_state(&self) -> Result<TermState> {
        let ord = self.current_ord()?;
        let entry = &self.data.entries[ord];
        let mut data = vec![0u8; 16];
        LittleEndian::write_u64(&mut data[..8], entry.offset as u64);
        LittleEndian::write_u64(&mut data[8..], entry.len as u64);
        Ok(TermState {
            ord: ord as u64,
            data,
        })
    }

    fn seek_exact_state(&mut self, term: &[u8], state: &TermState) -> Result<()> {
        if state.data.len() != 16 {
            return Err(Error::Codec(format!(
                "term state carries {} bytes, expected 16",
                state.data.len()
            )));
        }
        let offset = LittleEndian::read_u64(&state.data[..8]) as usize;
        let len = LittleEndian::read_u64(&state.data[8..]) as usize;
        let ord = state.ord as usize;
        match self.data.entries.get(ord) {
            Some(entry) if entry.term == term && entry.offset == offset && entry.len == len => {
                self.ord = Some(ord);
                Ok(())
            }
            _ => Err(Error::Codec(format!(
                "term state {:?} does not belong to term {} in field {:?}",
                state,
                display_term(term),
                self.data.info.name
            ))),
        }
    }

    fn doc_freq(&self) -> Result<i32> {
        Ok(self.current()?.doc_freq)
    }

    fn total_term_freq(&self) -> Result<i64> {
        Ok(self.current()?.total_term_freq)
    }

    fn postings(&mut self, flags: PostingsFlags) -> Result<Option<Box<dyn PostingsEnum>>> {
        let ord = self.current_ord()?;
        Ok(Some(Box::new(self.data.open_postings(ord, flags)?)))
    }

    fn impacts(&mut self, flags: PostingsFlags) -> Result<Box<dyn ImpactsEnum>> {
        let ord = self.current_ord()?;
        Ok(Box::new(self.data.open_postings(ord, flags)?))
    }
}
