use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn is_ascending(&self) -> bool {
        matches!(self, Self::Ascending)
    }

    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub attribute: String,
    pub direction: SortDirection,
}

/// Ordered chain of sort keys.
///
/// An empty spec is still a spec: compiling it yields primary-key ascending.
/// Callers that want no ordering at all pass no spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, attribute: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            attribute: attribute.into(),
            direction: SortDirection::Ascending,
        });
        self
    }

    pub fn descending(mut self, attribute: impl Into<String>) -> Self {
        self.keys.push(SortKey {
            attribute: attribute.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    pub fn then(mut self, attribute: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push(SortKey {
            attribute: attribute.into(),
            direction,
        });
        self
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
