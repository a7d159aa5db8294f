use crate::core::{MapperError, Result};
use serde::{Deserialize, Serialize};

/// Page window for `select`, `find` and `search`.
///
/// `number` starts at 1. A `size` of 0 returns every remaining match, which
/// leaves memory growth to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Page {
    pub number: u64,
    pub size: u64,
}

impl Page {
    pub fn new(number: u64, size: u64) -> Self {
        Self { number, size }
    }

    pub fn first(size: u64) -> Self {
        Self::new(1, size)
    }

    pub fn unbounded() -> Self {
        Self::new(1, 0)
    }

    pub fn is_unbounded(&self) -> bool {
        self.size == 0
    }

    pub fn validate(&self) -> Result<()> {
        if self.number == 0 {
            return Err(MapperError::precondition("Page numbers start at 1"));
        }
        Ok(())
    }

    /// Documents to skip before this page.
    pub fn skip(&self) -> u64 {
        if self.is_unbounded() {
            0
        } else {
            self.number.saturating_sub(1).saturating_mul(self.size)
        }
    }

    pub fn limit(&self) -> Option<u64> {
        (!self.is_unbounded()).then_some(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::unbounded()
    }
}
