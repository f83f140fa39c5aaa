//! Read strategies for cached lookups.
//!
//! Every read (`list`, `get_by_id`) runs under one [`ReadStrategy`]. The plain
//! methods use the default, [`ReadStrategy::Refresh`]; the `*_with` variants
//! take an explicit strategy.
//!
//! ```
//! use resource_kit::strategy::ReadStrategy;
//!
//! // Cache-first with transport fallback (default)
//! let _s = ReadStrategy::Refresh;
//!
//! // Drop the cached entry, then fetch and store
//! let _s = ReadStrategy::Invalidate;
//!
//! // Skip the lookup, still store the fresh response
//! let _s = ReadStrategy::Bypass;
//! ```
//!
//! # When to Use Each Strategy
//!
//! | Strategy | Cache Hit | Cache Miss | Use Case |
//! |----------|-----------|-----------|----------|
//! | **Refresh** | Return | Dispatch, store | Default; views opening or paging |
//! | **Invalidate** | Delete, dispatch | Dispatch, store | Pull-to-refresh on one view |
//! | **Bypass** | Ignore | Dispatch, store | Read-your-write after an out-of-band change |
//!
//! With caching disabled in [`ClientConfig`](crate::config::ClientConfig),
//! every strategy dispatches and nothing is stored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a read consults the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStrategy {
    /// **Refresh**: Try the cache first, dispatch on miss.
    ///
    /// Flow:
    /// 1. Check cache
    /// 2. If hit: return cached value
    /// 3. If miss: dispatch
    /// 4. Store in cache
    /// 5. Return value
    #[default]
    Refresh,

    /// **Invalidate**: Remove the entry for this signature, then dispatch.
    ///
    /// Flow:
    /// 1. Delete from cache
    /// 2. Dispatch
    /// 3. Store in cache
    /// 4. Return value
    Invalidate,

    /// **Bypass**: Ignore the cached entry, always dispatch.
    ///
    /// The fresh response still replaces the entry for later readers.
    Bypass,
}

impl ReadStrategy {
    /// Whether a valid cached entry may satisfy the read.
    pub fn reads_cache(&self) -> bool {
        matches!(self, ReadStrategy::Refresh)
    }
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadStrategy::Refresh => write!(f, "Refresh"),
            ReadStrategy::Invalidate => write!(f, "Invalidate"),
            ReadStrategy::Bypass => write!(f, "Bypass"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_display() {
        assert_eq!(ReadStrategy::Refresh.to_string(), "Refresh");
        assert_eq!(ReadStrategy::Invalidate.to_string(), "Invalidate");
        assert_eq!(ReadStrategy::Bypass.to_string(), "Bypass");
    }

    #[test]
    fn test_strategy_default() {
        assert_eq!(ReadStrategy::default(), ReadStrategy::Refresh);
    }

    #[test]
    fn test_only_refresh_reads_cache() {
        assert!(ReadStrategy::Refresh.reads_cache());
        assert!(!ReadStrategy::Invalidate.reads_cache());
        assert!(!ReadStrategy::Bypass.reads_cache());
    }
}
