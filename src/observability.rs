//! Metrics hooks and TTL policies for the entity client.
//!
//! # Module Overview
//!
//! Observability is split into two concerns:
//!
//! - **Metrics (`ClientMetrics`)**: cache hits and misses, dispatch timing,
//!   invalidations, normalized errors
//! - **TTL Policies (`TtlPolicy`)**: how long a read stays cached
//!
//! # Metrics
//!
//! Implement [`ClientMetrics`] to forward client activity to your monitoring
//! system. Every method has a default that logs through the `log` crate, so an
//! empty impl block is a valid logging sink:
//!
//! ```
//! use resource_kit::observability::ClientMetrics;
//! use std::time::Duration;
//!
//! struct DashboardMetrics;
//!
//! impl ClientMetrics for DashboardMetrics {
//!     fn record_dispatch(&self, operation: &str, duration: Duration, ok: bool) {
//!         // histogram!("dispatch_latency", "op" => operation).record(duration);
//!         let _ = (operation, duration, ok);
//!     }
//! }
//! ```
//!
//! [`NoOpMetrics`] is silent.
//!
//! # TTL Policies
//!
//! ```
//! use resource_kit::observability::TtlPolicy;
//! use std::time::Duration;
//!
//! // Fixed TTL for all reads (the default, 5 minutes)
//! let _policy = TtlPolicy::Fixed(Duration::from_secs(300));
//!
//! // Different TTL per read operation
//! let _policy = TtlPolicy::PerOperation(|operation| match operation {
//!     "getById" => Duration::from_secs(600),
//!     _ => Duration::from_secs(120),
//! });
//! ```
//!
//! | Policy | Use Case |
//! |--------|----------|
//! | `Fixed` | Uniform cache duration |
//! | `Infinite` | Reference data that only changes through this client |
//! | `PerOperation` | Records cached longer than list pages |

use crate::error::Error;
use std::time::Duration;

/// Hooks for client metrics collection.
pub trait ClientMetrics: Send + Sync {
    /// A read was served from the cache.
    fn record_hit(&self, signature: &str) {
        debug!("Client cache HIT: {}", signature);
    }

    /// A read had to dispatch.
    fn record_miss(&self, signature: &str) {
        debug!("Client cache MISS: {}", signature);
    }

    /// A transport call settled.
    fn record_dispatch(&self, operation: &str, duration: Duration, ok: bool) {
        debug!(
            "Client dispatch {} took {:?} ({})",
            operation,
            duration,
            if ok { "ok" } else { "failed" }
        );
    }

    /// The cache was invalidated after a mutation.
    fn record_invalidation(&self, reason: &str, removed: usize) {
        debug!("Client cache invalidated by {}: {} entries", reason, removed);
    }

    /// An operation failed with a normalized error.
    fn record_error(&self, operation: &str, error: &Error) {
        warn!("Client ERROR for {}: {}", operation, error);
    }
}

/// Metrics implementation that records nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpMetrics;

impl ClientMetrics for NoOpMetrics {
    fn record_hit(&self, _signature: &str) {}
    fn record_miss(&self, _signature: &str) {}
    fn record_dispatch(&self, _operation: &str, _duration: Duration, _ok: bool) {}
    fn record_invalidation(&self, _reason: &str, _removed: usize) {}
    fn record_error(&self, _operation: &str, _error: &Error) {}
}

/// Time-to-live policy for cached reads.
#[derive(Clone, Debug)]
pub enum TtlPolicy {
    /// Fixed duration for all reads
    Fixed(Duration),

    /// Entries never expire
    Infinite,

    /// Duration chosen by read operation (`"list"` or `"getById"`)
    PerOperation(fn(&str) -> Duration),
}

impl Default for TtlPolicy {
    fn default() -> Self {
        TtlPolicy::Fixed(crate::config::DEFAULT_TTL)
    }
}

impl TtlPolicy {
    /// TTL for a read operation. `None` never expires.
    pub fn ttl_for(&self, operation: &str) -> Option<Duration> {
        match self {
            TtlPolicy::Fixed(d) => Some(*d),
            TtlPolicy::Infinite => None,
            TtlPolicy::PerOperation(f) => Some(f(operation)),
        }
    }
}
