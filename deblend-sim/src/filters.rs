//! Ordered filter (band) list shared by every table of an analysis run.

use serde::{Deserialize, Serialize};

/// Filter names in exposure order.
///
/// Exposure `k` of an exposure set is observed through filter `k`, and every
/// flux matrix in this crate has one column per filter in this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(Vec<String>);

impl Filters {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.0[idx]
    }

    /// Position of `name` in the list
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|f| f == name)
    }

    /// Catalog column holding the flux measured through `filter`
    pub fn flux_column(filter: &str) -> String {
        format!("flux_{filter}")
    }
}
