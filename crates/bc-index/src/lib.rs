#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    labels: Vec<IndexLabel>,
}

impl Index {
    #[must_use]
    pub fn new(labels: Vec<IndexLabel>) -> Self {
        Self { labels }
    }

    #[must_use]
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    #[must_use]
    pub fn from_utf8(values: Vec<String>) -> Self {
        Self::new(values.into_iter().map(IndexLabel::from).collect())
    }

    /// Default positional labels `0..len`, for callers that do not care about
    /// label identity.
    #[must_use]
    pub fn positional(len: usize) -> Self {
        Self::new((0..len).map(|i| IndexLabel::Int64(i as i64)).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn labels(&self) -> &[IndexLabel] {
        &self.labels
    }

    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        let mut seen = HashMap::<&IndexLabel, ()>::new();
        for label in &self.labels {
            if seen.insert(label, ()).is_some() {
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn position_map_first(&self) -> HashMap<IndexLabel, usize> {
        let mut positions = HashMap::with_capacity(self.labels.len());
        for (idx, label) in self.labels.iter().enumerate() {
            positions.entry(label.clone()).or_insert(idx);
        }
        positions
    }

    /// For each label of `target`, the first position of that label in `self`,
    /// or `None` when the label is absent (to be backed by a proxy).
    #[must_use]
    pub fn indexer_for(&self, target: &Index) -> Vec<Option<usize>> {
        let positions = self.position_map_first();
        target
            .labels
            .iter()
            .map(|label| positions.get(label).copied())
            .collect()
    }
}

/// First-seen outer union across any number of indexes, preserving the order
/// labels are encountered in.
#[must_use]
pub fn union_indexes(indexes: &[&Index]) -> Index {
    let mut seen = HashMap::<IndexLabel, ()>::new();
    let mut labels = Vec::new();
    for index in indexes {
        for label in index.labels() {
            if seen.insert(label.clone(), ()).is_none() {
                labels.push(label.clone());
            }
        }
    }
    Index::new(labels)
}

/// Stack label sequences end to end, duplicates retained.
#[must_use]
pub fn append_indexes(indexes: &[&Index]) -> Index {
    let mut labels = Vec::with_capacity(indexes.iter().map(|ix| ix.len()).sum());
    for index in indexes {
        labels.extend(index.labels().iter().cloned());
    }
    Index::new(labels)
}
