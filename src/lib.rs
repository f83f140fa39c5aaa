//! # resource-kit
//!
//! A typed, cached CRUD client and a faceted query engine for
//! collection-oriented dashboards.
//!
//! ## Features
//!
//! - **Fully Generic:** Manage any type `T` that implements [`Entity`]
//! - **Transport Agnostic:** In-memory transport built in, REST over `reqwest` behind the `http` feature
//! - **Cached Reads:** Time-bounded cache keyed by canonical request signatures
//! - **Consistent Writes:** Every mutation invalidates the cache, even when the caller stops waiting
//! - **Observable:** Per-operation loading flags, change events and handling directives as streams
//! - **Normalized Errors:** One [`Error`] shape with a code and a user-facing message for every failure
//! - **Faceted Queries:** Search, facet filter, range, flags, stable sort and pagination over in-memory snapshots
//!
//! ## Quick Start
//!
//! ```ignore
//! use resource_kit::{EntityClient, Entity, ListParams, QueryEngine, QuerySpec, SortDirection};
//! use resource_kit::transport::HttpTransport;
//!
//! // 1. Implement Entity for your record (see the `entity` module)
//!
//! // 2. Create one client per resource collection
//! let products: EntityClient<Product, _> =
//!     EntityClient::new(HttpTransport::new("https://api.example.com/v1"));
//!
//! // 3. Fetch (cached for 5 minutes)
//! let page = products.list(&ListParams::new().limit(100)).await?;
//!
//! // 4. Filter locally
//! let engine = QueryEngine::new()
//!     .search_in(["name", "description", "tags"])
//!     .count_facets(["category"]);
//! let view = engine.evaluate(
//!     &page.items,
//!     &QuerySpec::new().term("milk").select("category", "dairy").sort_by("price", SortDirection::Asc),
//! );
//!
//! // 5. Mutate; cached reads are invalidated and observers notified
//! products.update(view.items[0].id, ProductPatch::price(2.49)).await?;
//! ```

#[macro_use]
extern crate log;

pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod key;
pub mod loading;
pub mod normalizer;
pub mod observability;
pub mod query;
pub mod signal;
pub mod store;
pub mod strategy;
pub mod transport;

// Re-exports for convenience
pub use client::{ClientBuilder, EntityClient, EntityEvent};
pub use config::ClientConfig;
pub use entity::{Entity, Page};
pub use error::{Error, ErrorKind, FieldError, Result};
pub use key::{ListParams, OperationKey, ParamValue, RequestSignature};
pub use normalizer::{HandlingDirective, RawFailure};
pub use query::{
    FieldValue, NumericRange, QueryEngine, QueryResult, QuerySpec, Queryable, SortDirection,
    SortSpec,
};
pub use strategy::ReadStrategy;
pub use transport::{InMemoryTransport, Transport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
