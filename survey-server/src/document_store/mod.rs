//! Document Store access
//!
//! The document store is the durable, append-only copy of every submission.
//! Callers depend on the [`DocumentStore`] trait so the GitHub backend can be
//! swapped for [`MemoryDocumentStore`] in tests.

use async_trait::async_trait;
use thiserror::Error;

mod github;
mod memory;

pub use github::GitHubDocumentStore;
pub use memory::{MemoryDocumentStore, ScriptedFailure};

/// Directory holding one object per submission
pub const DOCUMENTS_DIR: &str = "responses";

/// Document store errors
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// Service answered with a non-success status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DocumentStoreError {
    /// Write conflicts worth retrying (409 Conflict, 422 Unprocessable)
    pub fn is_conflict(&self) -> bool {
        matches!(self, DocumentStoreError::Api { status: 409 | 422, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DocumentStoreError::Api { status, .. } => Some(*status),
            DocumentStoreError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

/// Object listed under a path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Full path, e.g. `responses/2024-05-29T10-11-12Z-<uuid>.json`
    pub path: String,
    pub name: String,
}

impl DocumentEntry {
    pub fn is_json(&self) -> bool {
        self.name.ends_with(".json")
    }
}

/// Version-controlled object store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a new object; fails if the path already exists
    async fn create_file(
        &self,
        path: &str,
        message: &str,
        content: &[u8],
    ) -> Result<(), DocumentStoreError>;

    /// Objects directly under `prefix`; a missing directory is empty
    async fn list_files(&self, prefix: &str) -> Result<Vec<DocumentEntry>, DocumentStoreError>;

    /// Raw content of one object
    async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, DocumentStoreError>;
}
