//! Document store to relational store reconciliation
//!
//! Re-imports every stored document into the `responses` table. Rows are
//! keyed on the document path, so running the import again only adds what
//! is missing.

use serde::Serialize;
use sqlx::SqlitePool;
use survey_common::db::upsert_response;
use survey_common::ResponseRecord;
use thiserror::Error;
use tracing::{info, warn};

use crate::document_store::{DocumentStore, DocumentStoreError, DOCUMENTS_DIR};

/// Document that was not imported, and why
#[derive(Debug, Clone, Serialize)]
pub struct SkippedDocument {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportReport {
    /// Documents found under the responses directory
    pub listed: usize,
    /// Rows added by this run
    pub imported: usize,
    /// Documents that already had a row
    pub already_present: usize,
    pub skipped: Vec<SkippedDocument>,
}

impl ImportReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    fn skip(&mut self, path: &str, reason: String) {
        warn!(path = %path, reason = %reason, "Skipping document");
        self.skipped.push(SkippedDocument {
            path: path.to_string(),
            reason,
        });
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Cannot list documents: {0}")]
    Listing(#[from] DocumentStoreError),

    #[error("Relational store error: {0}")]
    Database(#[from] sqlx::Error),

    /// Nothing from this run was kept
    #[error("Commit failed: {0}")]
    Commit(#[source] sqlx::Error),
}

/// Import all documents in one transaction
pub async fn import_documents(
    store: &dyn DocumentStore,
    pool: &SqlitePool,
) -> Result<ImportReport, ImportError> {
    let entries = store.list_files(DOCUMENTS_DIR).await?;
    let mut report = ImportReport {
        listed: entries.len(),
        ..Default::default()
    };
    info!("Found {} documents under {}/", entries.len(), DOCUMENTS_DIR);

    let mut tx = pool.begin().await?;

    for entry in &entries {
        if !entry.is_json() {
            report.skip(&entry.path, "not a JSON document".to_string());
            continue;
        }

        let raw = match store.fetch_file(&entry.path).await {
            Ok(raw) => raw,
            Err(e) => {
                report.skip(&entry.path, e.to_string());
                continue;
            }
        };

        let record = match ResponseRecord::from_document(&entry.path, &raw) {
            Ok(record) => record,
            Err(e) => {
                report.skip(&entry.path, e.to_string());
                continue;
            }
        };

        match upsert_response(&mut *tx, &record, &entry.path).await {
            Ok(true) => report.imported += 1,
            Ok(false) => report.already_present += 1,
            Err(e) => report.skip(&entry.path, e.to_string()),
        }
    }

    tx.commit().await.map_err(ImportError::Commit)?;

    info!(
        imported = report.imported,
        already_present = report.already_present,
        skipped = report.skipped_count(),
        "Import complete"
    );
    Ok(report)
}
