//! Core entity trait that all managed records must implement.

use crate::transport::ListEnvelope;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// A uniquely identified record with creation/update timestamps.
///
/// The client is generic over the entity's shape and only reads the id.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use resource_kit::Entity;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, Serialize, Deserialize)]
/// pub struct Supplier {
///     pub id: u64,
///     pub name: String,
///     pub created_at: DateTime<Utc>,
///     pub updated_at: DateTime<Utc>,
/// }
///
/// #[derive(Clone, Debug, Default, Serialize)]
/// pub struct SupplierPatch {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     pub name: Option<String>,
/// }
///
/// impl Entity for Supplier {
///     type Id = u64;
///     type Patch = SupplierPatch;
///
///     fn id(&self) -> Self::Id {
///         self.id
///     }
///
///     fn resource() -> &'static str {
///         "suppliers"
///     }
///
///     fn created_at(&self) -> DateTime<Utc> {
///         self.created_at
///     }
///
///     fn updated_at(&self) -> DateTime<Utc> {
///         self.updated_at
///     }
/// }
/// ```
pub trait Entity:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Identifier type (typically `u64`, `String` or a UUID string).
    type Id: Display
        + Debug
        + Clone
        + Eq
        + Hash
        + Send
        + Sync
        + Serialize
        + DeserializeOwned
        + 'static;

    /// Partial entity sent on create and update.
    type Patch: Clone + Debug + Send + Sync + Serialize + 'static;

    fn id(&self) -> Self::Id;

    /// Collection name, used as the URL segment by HTTP transports.
    fn resource() -> &'static str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;
}

/// One page of a list response, unwrapped from its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> From<ListEnvelope<T>> for Page<T> {
    fn from(envelope: ListEnvelope<T>) -> Self {
        Page {
            items: envelope.data,
            total: envelope.total,
            page: envelope.page,
            limit: envelope.limit,
            total_pages: envelope.total_pages,
        }
    }
}
