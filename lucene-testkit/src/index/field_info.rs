//! Per-field indexing metadata

use rustc_hash::FxHashMap;

use super::IndexOptions;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub has_payloads: bool,
    pub has_norms: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32, index_options: IndexOptions) -> Self {
        Self {
            name: name.into(),
            number,
            index_options,
            has_payloads: false,
            has_norms: true,
        }
    }

    pub fn with_payloads(mut self, has_payloads: bool) -> Self {
        self.has_payloads = has_payloads;
        self
    }

    pub fn with_norms(mut self, has_norms: bool) -> Self {
        self.has_norms = has_norms;
        self
    }
}

/// Field infos of one segment, addressable by number and by name.
///
/// Numbers are dense: field `i` lives at index `i`.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
    by_name: FxHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new(infos: Vec<FieldInfo>) -> Result<Self> {
        let mut by_name = FxHashMap::default();
        for (i, info) in infos.iter().enumerate() {
            if info.number as usize != i {
                return Err(Error::Codec(format!(
                    "field {:?} has number {} at slot {}",
                    info.name, info.number, i
                )));
            }
            if by_name.insert(info.name.clone(), info.number).is_some() {
                return Err(Error::Codec(format!("duplicate field {:?}", info.name)));
            }
        }
        Ok(Self {
            by_number: infos,
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    pub fn by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name
            .get(name)
            .and_then(|&number| self.by_number(number))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    /// Check that `narrowed` describes the same fields with options no
    /// stronger than ours.
    pub fn check_narrowing(&self, narrowed: &FieldInfos) -> Result<()> {
        if self.len() != narrowed.len() {
            return Err(Error::Codec(format!(
                "field count changed from {} to {}",
                self.len(),
                narrowed.len()
            )));
        }
        for (wide, narrow) in self.iter().zip(narrowed.iter()) {
            if wide.name != narrow.name || wide.number != narrow.number {
                return Err(Error::Codec(format!(
                    "field {:?}#{} renumbered as {:?}#{}",
                    wide.name, wide.number, narrow.name, narrow.number
                )));
            }
            if narrow.index_options > wide.index_options {
                return Err(Error::Codec(format!(
                    "field {:?} widened from {} to {}",
                    wide.name, wide.index_options, narrow.index_options
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infos(options: &[IndexOptions]) -> FieldInfos {
        FieldInfos::new(
            options
                .iter()
                .enumerate()
                .map(|(i, &o)| FieldInfo::new(format!("f{}", i), i as u32, o))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_by_name_and_number() {
        let fi = infos(&[IndexOptions::Docs, IndexOptions::DocsAndFreqs]);
        assert_eq!(fi.by_name("f1").unwrap().number, 1);
        assert_eq!(fi.by_number(0).unwrap().name, "f0");
        assert!(fi.by_name("missing").is_none());
    }

    #[test]
    fn test_rejects_sparse_numbers() {
        let res = FieldInfos::new(vec![FieldInfo::new("a", 1, IndexOptions::Docs)]);
        assert!(res.is_err());
    }

    #[test]
    fn test_narrowing_is_monotonic() {
        let wide = infos(&[IndexOptions::DocsAndFreqsAndPositionsAndOffsets; 2]);
        let narrow = infos(&[IndexOptions::Docs, IndexOptions::DocsAndFreqsAndPositions]);
        assert!(wide.check_narrowing(&narrow).is_ok());
        assert!(narrow.check_narrowing(&wide).is_err());
    }
}
