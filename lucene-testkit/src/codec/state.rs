//! Values exchanged between the testers and a postings format

use std::fmt;
use std::sync::Arc;

use crate::DocId;
use crate::directories::Directory;
use crate::index::FieldInfos;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// Positioned on the exact term
    Found,
    /// Positioned on the smallest term greater than the target
    NotFound,
    /// No term is >= the target
    End,
}

/// Opaque, codec-owned snapshot of a term's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermState {
    pub ord: u64,
    pub data: Vec<u8>,
}

/// Optional features a postings format declares at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `seek_exact_ord` and `ord` are implemented
    pub ord_seeking: bool,
    /// `into_bit_set` is overridden with a faster path than stepping
    pub into_bit_set_fast_path: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            ord_seeking: true,
            into_bit_set_fast_path: false,
        }
    }
}

/// Everything a `FieldsConsumer` needs to flush one segment.
#[derive(Clone)]
pub struct SegmentWriteState {
    pub directory: Arc<dyn Directory>,
    pub segment_name: String,
    pub max_doc: DocId,
    pub field_infos: Arc<FieldInfos>,
}

/// Everything a `FieldsProducer` needs to open one segment.
#[derive(Clone)]
pub struct SegmentReadState {
    pub directory: Arc<dyn Directory>,
    pub segment_name: String,
    pub max_doc: DocId,
    pub field_infos: Arc<FieldInfos>,
}

impl SegmentWriteState {
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.segment_name, extension)
    }

    /// Read state for the segment this state flushed.
    pub fn to_read_state(&self) -> SegmentReadState {
        SegmentReadState {
            directory: Arc::clone(&self.directory),
            segment_name: self.segment_name.clone(),
            max_doc: self.max_doc,
            field_infos: Arc::clone(&self.field_infos),
        }
    }
}

impl SegmentReadState {
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.segment_name, extension)
    }
}

impl fmt::Debug for SegmentWriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentWriteState")
            .field("segment_name", &self.segment_name)
            .field("max_doc", &self.max_doc)
            .field("fields", &self.field_infos.len())
            .finish()
    }
}

impl fmt::Debug for SegmentReadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentReadState")
            .field("segment_name", &self.segment_name)
            .field("max_doc", &self.max_doc)
            .field("fields", &self.field_infos.len())
            .finish()
    }
}
