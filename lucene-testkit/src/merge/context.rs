//! Mock merge context with an inventory of in-flight merges

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use super::{MergeContext, SegmentCommitInfo};

type DeletesFn = dyn Fn(&SegmentCommitInfo) -> u32 + Send + Sync;

/// Segment names involved in running merges.
///
/// A new merge is rejected only if one of its segments already belongs to
/// an active merge. Registration hands out a `MergeGuard`; dropping the
/// guard unregisters its segments.
#[derive(Default)]
struct MergeInventory {
    inner: parking_lot::Mutex<FxHashSet<String>>,
}

impl MergeInventory {
    fn try_register(self: &Arc<Self>, names: Vec<String>) -> Option<MergeGuard> {
        let mut inner = self.inner.lock();
        if let Some(name) = names.iter().find(|name| inner.contains(*name)) {
            log::debug!(
                "[merge_sim] rejected: {} is already merging ({} active)",
                name,
                inner.len()
            );
            return None;
        }
        for name in &names {
            inner.insert(name.clone());
        }
        Some(MergeGuard {
            inventory: Arc::clone(self),
            names,
        })
    }

    fn snapshot(&self) -> FxHashSet<String> {
        self.inner.lock().clone()
    }

    fn contains(&self, name: &str) -> bool {
        self.inner.lock().contains(name)
    }
}

/// Keeps a merge's segments registered for as long as it lives.
pub struct MergeGuard {
    inventory: Arc<MergeInventory>,
    names: Vec<String>,
}

impl MergeGuard {
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl Drop for MergeGuard {
    fn drop(&mut self) {
        let mut inner = self.inventory.inner.lock();
        for name in &self.names {
            inner.remove(name);
        }
    }
}

impl fmt::Debug for MergeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeGuard")
            .field("names", &self.names)
            .finish()
    }
}

/// Merge context for driving a policy without a writer.
pub struct MockMergeContext {
    deletes: Box<DeletesFn>,
    inventory: Arc<MergeInventory>,
}

impl MockMergeContext {
    /// Reports each segment's own delete count.
    pub fn new() -> Self {
        Self::with_deletes(|info| info.del_count)
    }

    pub fn with_deletes<F>(deletes: F) -> Self
    where
        F: Fn(&SegmentCommitInfo) -> u32 + Send + Sync + 'static,
    {
        Self {
            deletes: Box::new(deletes),
            inventory: Arc::new(MergeInventory::default()),
        }
    }

    /// Mark `names` as merging. `None` if any of them already is.
    pub fn register(&self, names: Vec<String>) -> Option<MergeGuard> {
        self.inventory.try_register(names)
    }
}

impl Default for MockMergeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeContext for MockMergeContext {
    fn num_deletes_to_merge(&self, info: &SegmentCommitInfo) -> u32 {
        (self.deletes)(info).min(info.max_doc)
    }

    fn merging_segments(&self) -> FxHashSet<String> {
        self.inventory.snapshot()
    }

    fn is_merging(&self, name: &str) -> bool {
        self.inventory.contains(name)
    }
}

impl fmt::Debug for MockMergeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockMergeContext")
            .field("merging", &self.inventory.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::SegmentSource;

    #[test]
    fn test_guard_drop_unregisters() {
        let ctx = MockMergeContext::new();
        {
            let _guard = ctx.register(vec!["_0".into(), "_1".into()]).unwrap();
            let merging = ctx.merging_segments();
            assert!(merging.contains("_0"));
            assert!(ctx.is_merging("_1"));
        }
        assert!(ctx.merging_segments().is_empty());
    }

    #[test]
    fn test_overlapping_registration_rejected() {
        let ctx = MockMergeContext::new();
        let first = ctx.register(vec!["_0".into(), "_1".into()]).unwrap();
        let _second = ctx.register(vec!["_2".into(), "_3".into()]).unwrap();
        assert_eq!(ctx.merging_segments().len(), 4);
        assert!(ctx.register(vec!["_1".into(), "_4".into()]).is_none());
        // A rejected registration leaves nothing behind
        assert!(!ctx.is_merging("_4"));

        drop(first);
        assert_eq!(ctx.merging_segments().len(), 2);
        assert!(ctx.register(vec!["_1".into(), "_4".into()]).is_some());
    }

    #[test]
    fn test_deletes_closure_is_clamped() {
        let info = SegmentCommitInfo::new("_0", 10, 2, 100, SegmentSource::Flush);
        assert_eq!(MockMergeContext::new().num_deletes_to_merge(&info), 2);
        let ctx = MockMergeContext::with_deletes(|info| info.del_count * 100);
        assert_eq!(ctx.num_deletes_to_merge(&info), 10);
    }
}
