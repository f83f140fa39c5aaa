//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time-to-live of a cached read.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Default cache capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Settings shared by every operation of one client.
///
/// Loadable from JSON; missing fields take their defaults.
///
/// ```
/// use resource_kit::config::ClientConfig;
/// use std::time::Duration;
///
/// let config: ClientConfig =
///     serde_json::from_str(r#"{ "default_ttl": { "secs": 60, "nanos": 0 } }"#).unwrap();
/// assert_eq!(config.default_ttl, Duration::from_secs(60));
/// assert_eq!(config.max_entries, 1000);
/// assert!(config.cache_enabled);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TTL used when no [`TtlPolicy`](crate::observability::TtlPolicy) is set.
    pub default_ttl: Duration,

    /// Cache capacity; least recently used entries are evicted beyond it.
    /// Zero disables the bound.
    pub max_entries: usize,

    /// When `false`, reads always dispatch and nothing is cached.
    pub cache_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            default_ttl: DEFAULT_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            cache_enabled: true,
        }
    }
}

impl ClientConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }
}
