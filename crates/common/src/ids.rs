//! Typed identifiers shared across planner and storage components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Word dictionary identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WordId(
    /// Raw numeric id value.
    pub i64,
);

impl WordId {
    /// Id that no dictionary row carries; used to force an empty match.
    pub const MISSING: WordId = WordId(-1);
}

impl fmt::Display for WordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash identifying one materialized derived table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey(
    /// Lower-case hex digest.
    pub String,
);

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
