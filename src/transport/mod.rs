//! Transport boundary between the client and the backend.
//!
//! A [`Transport`] performs one request per call and reports either the
//! backend's envelope or a [`RawFailure`]. It never caches, retries or times
//! out; the client owns caching and error normalization.

use crate::entity::Entity;
use crate::key::ListParams;
use crate::normalizer::RawFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

#[cfg(feature = "http")]
pub use http::HttpTransport;
pub use memory::InMemoryTransport;

/// Result of a single transport call.
pub type TransportResult<T> = std::result::Result<T, RawFailure>;

fn default_success() -> bool {
    true
}

/// Envelope wrapping single-record and mutation responses.
///
/// ```text
/// { "data": <entity | entity[] | count>, "message": "...", "success": true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<D> {
    pub data: D,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "default_success")]
    pub success: bool,
}

impl<D> Envelope<D> {
    pub fn ok(data: D) -> Self {
        Envelope {
            data,
            message: None,
            success: true,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Unwrap `data`, turning `success: false` into a rejection.
    pub fn into_data(self) -> TransportResult<D> {
        if self.success {
            Ok(self.data)
        } else {
            Err(RawFailure::Rejected {
                message: self.message,
            })
        }
    }
}

/// Envelope wrapping list responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Export file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file handed to `import`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl ImportFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        ImportFile {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Outcome of an import: rows imported and per-row errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported_count: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Request boundary for one resource collection.
///
/// Bulk operations default to looping over their singular counterparts;
/// export and import default to [`RawFailure::Unsupported`].
pub trait Transport<T: Entity>: Send + Sync + 'static {
    fn list(
        &self,
        params: &ListParams,
    ) -> impl Future<Output = TransportResult<ListEnvelope<T>>> + Send;

    fn get(&self, id: &T::Id) -> impl Future<Output = TransportResult<Envelope<T>>> + Send;

    fn create(&self, patch: &T::Patch)
        -> impl Future<Output = TransportResult<Envelope<T>>> + Send;

    fn update(
        &self,
        id: &T::Id,
        patch: &T::Patch,
    ) -> impl Future<Output = TransportResult<Envelope<T>>> + Send;

    fn delete(&self, id: &T::Id) -> impl Future<Output = TransportResult<Envelope<()>>> + Send;

    fn create_many(
        &self,
        patches: &[T::Patch],
    ) -> impl Future<Output = TransportResult<Envelope<Vec<T>>>> + Send {
        async move {
            let mut created = Vec::with_capacity(patches.len());
            for patch in patches {
                created.push(self.create(patch).await?.into_data()?);
            }
            Ok(Envelope::ok(created))
        }
    }

    fn update_many(
        &self,
        updates: &[(T::Id, T::Patch)],
    ) -> impl Future<Output = TransportResult<Envelope<Vec<T>>>> + Send {
        async move {
            let mut updated = Vec::with_capacity(updates.len());
            for (id, patch) in updates {
                updated.push(self.update(id, patch).await?.into_data()?);
            }
            Ok(Envelope::ok(updated))
        }
    }

    /// Returns how many records were deleted.
    fn delete_many(
        &self,
        ids: &[T::Id],
    ) -> impl Future<Output = TransportResult<Envelope<u64>>> + Send {
        async move {
            let mut deleted = 0u64;
            for id in ids {
                self.delete(id).await?.into_data()?;
                deleted += 1;
            }
            Ok(Envelope::ok(deleted))
        }
    }

    fn export(
        &self,
        format: ExportFormat,
        params: &ListParams,
    ) -> impl Future<Output = TransportResult<Vec<u8>>> + Send {
        let _ = params;
        async move { Err(RawFailure::Unsupported(format!("export ({})", format))) }
    }

    fn import(
        &self,
        file: &ImportFile,
    ) -> impl Future<Output = TransportResult<Envelope<ImportReport>>> + Send {
        let name = file.name.clone();
        async move { Err(RawFailure::Unsupported(format!("import ({})", name))) }
    }
}
