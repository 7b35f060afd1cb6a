//! Reference block postings format
//!
//! Two files per segment:
//!
//! ```text
//! {seg}.pst   magic | version | term blobs...                   | checksum
//! {seg}.tim   magic | version | fields (prefix-coded term dict) | checksum
//!
//! term blob:
//!   num_blocks
//!   list impacts:  n, (freq, norm)*n          # pareto frontier of all docs
//!   skip entries:  (count, last_doc delta, byte_len, n, (freq, norm)*n)*num_blocks
//!   block data:    per doc: doc delta [freq] [positions...]
//!                  per position: pos delta [payload len, bytes] [start delta, length]
//! ```
//!
//! Every integer is a vint except the magic/version/checksum words, which are
//! little-endian fixed width. Blocks hold up to `BLOCK_SIZE` docs.

mod encoding;
mod postings;
mod reader;
mod writer;

use std::sync::Arc;

use crate::codec::{
    Capabilities, FieldsConsumer, FieldsProducer, PostingsFormat, SegmentReadState,
    SegmentWriteState,
};
use crate::error::Result;

pub use reader::BlockFieldsProducer;
pub use writer::BlockFieldsConsumer;

pub const BLOCK_SIZE: usize = 128;

pub(crate) const POSTINGS_EXTENSION: &str = "pst";
pub(crate) const TERMS_EXTENSION: &str = "tim";
pub(crate) const POSTINGS_MAGIC: u32 = 0x4C54_5053;
pub(crate) const TERMS_MAGIC: u32 = 0x4C54_544D;
pub(crate) const VERSION: u32 = 1;

/// Block-encoded postings with skip data and per-block impacts.
#[derive(Debug, Clone, Default)]
pub struct BlockPostingsFormat;

impl BlockPostingsFormat {
    pub fn new() -> Self {
        Self
    }
}

impl PostingsFormat for BlockPostingsFormat {
    fn name(&self) -> &str {
        "Block"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ord_seeking: true,
            into_bit_set_fast_path: true,
        }
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(BlockFieldsConsumer::new(state)?))
    }

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Arc<dyn FieldsProducer>> {
        Ok(Arc::new(BlockFieldsProducer::open(state)?))
    }
}

#[cfg(test)]
mod tests;
