use std::sync::Arc;

use log::debug;

use super::AssertingTerms;
use crate::codec::{
    Capabilities, Fields, FieldsConsumer, FieldsProducer, PostingsFormat, SegmentReadState,
    SegmentWriteState, Terms,
};
use crate::error::Result;

/// Wraps another format so every enumerator it opens is protocol-checked.
pub struct AssertingPostingsFormat {
    inner: Arc<dyn PostingsFormat>,
    name: String,
}

impl AssertingPostingsFormat {
    pub fn new(inner: Arc<dyn PostingsFormat>) -> Self {
        let name = format!("Asserting({})", inner.name());
        Self { inner, name }
    }

    pub fn inner(&self) -> &Arc<dyn PostingsFormat> {
        &self.inner
    }
}

impl PostingsFormat for AssertingPostingsFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        self.inner.fields_consumer(state)
    }

    fn fields_producer(&self, state: &SegmentReadState) -> Result<Arc<dyn FieldsProducer>> {
        debug!(
            "[asserting] opening {} through {}",
            state.segment_name, self.name
        );
        let inner = self.inner.fields_producer(state)?;
        Ok(Arc::new(AssertingFieldsProducer::new(inner)))
    }
}

pub struct AssertingFieldsProducer {
    inner: Arc<dyn FieldsProducer>,
}

impl AssertingFieldsProducer {
    pub fn new(inner: Arc<dyn FieldsProducer>) -> Self {
        Self { inner }
    }
}

impl Fields for AssertingFieldsProducer {
    fn field_names(&self) -> Vec<String> {
        self.inner.field_names()
    }

    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        Ok(self
            .inner
            .terms(field)?
            .map(|terms| Arc::new(AssertingTerms::new(terms, field)) as Arc<dyn Terms>))
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

impl FieldsProducer for AssertingFieldsProducer {
    fn check_integrity(&self) -> Result<()> {
        self.inner.check_integrity()
    }
}
