//! Dual-write coordinator
//!
//! A submission is written to the document store first, then mirrored into
//! the relational store. Document writes retry on conflicts with a linear
//! backoff. A relational failure after a successful document write is
//! reported but not compensated: the document stays and the import job
//! backfills the row later.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use survey_common::config::SurveyConfig;
use survey_common::db::insert_response;
use survey_common::{time, ResponseRecord, SchemaVersion, ValidationError};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::document_store::{DocumentStore, DocumentStoreError, DOCUMENTS_DIR};

/// Bounded retry schedule for document writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &SurveyConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Delay after the failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Outcome of a successful dual write
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub document_path: String,
    pub row_id: i64,
    /// Document write attempts used
    pub attempts: u32,
    pub timestamp: DateTime<Utc>,
}

/// Reasons a submission did not complete
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid submission: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cannot encode document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Nothing was stored
    #[error("Document store write failed after {attempts} attempt(s): {source}")]
    DocumentStore {
        attempts: u32,
        #[source]
        source: DocumentStoreError,
    },

    /// The document exists but has no relational row yet
    #[error("Relational insert failed for {document_path}: {source}")]
    RelationalStore {
        document_path: String,
        #[source]
        source: survey_common::Error,
    },
}

impl SubmissionError {
    /// Message shown to the respondent.
    ///
    /// Document store failures stay generic. A relational failure carries its
    /// cause, since the answer itself is already stored.
    pub fn user_message(&self) -> String {
        match self {
            SubmissionError::Validation(e) => format!("Risposta non valida: {}", e),
            SubmissionError::Serialization(_) | SubmissionError::DocumentStore { .. } => {
                "Invio non riuscito. Riprova più tardi.".to_string()
            }
            SubmissionError::RelationalStore { source, .. } => {
                format!("Risposta registrata, ma errore nel salvataggio nel DB: {}", source)
            }
        }
    }
}

/// Key of a new document: sortable timestamp plus a random suffix
pub fn document_key(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{}/{}-{}.json",
        DOCUMENTS_DIR,
        time::key_timestamp(timestamp),
        Uuid::new_v4()
    )
}

/// Create one object, retrying conflicts per `policy`.
///
/// Returns the number of attempts used. Non-conflict errors fail at once.
pub async fn create_with_retry(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    path: &str,
    message: &str,
    content: &[u8],
) -> Result<u32, SubmissionError> {
    let mut attempt = 1;
    loop {
        match store.create_file(path, message, content).await {
            Ok(()) => return Ok(attempt),
            Err(e) if e.is_conflict() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    path = %path,
                    attempt,
                    status = ?e.status(),
                    "Document write conflict, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => {
                error!(path = %path, attempt, error = %source, "Document write failed");
                return Err(SubmissionError::DocumentStore {
                    attempts: attempt,
                    source,
                });
            }
        }
    }
}

/// Sequences the two writes of a submission
pub struct SubmissionCoordinator {
    store: Arc<dyn DocumentStore>,
    db: SqlitePool,
    policy: RetryPolicy,
    commit_message: String,
}

impl SubmissionCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        db: SqlitePool,
        policy: RetryPolicy,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            store,
            db,
            policy,
            commit_message: commit_message.into(),
        }
    }

    /// Validate raw form input and persist it
    pub async fn submit_raw(
        &self,
        version: SchemaVersion,
        input: &Value,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let record = ResponseRecord::new(version, input)?;
        self.submit(&record).await
    }

    /// Persist a validated record: document first, then the relational row
    pub async fn submit(&self, record: &ResponseRecord) -> Result<SubmissionReceipt, SubmissionError> {
        let document_path = document_key(&record.timestamp);
        let content = record.to_document_json()?;

        let attempts = create_with_retry(
            self.store.as_ref(),
            &self.policy,
            &document_path,
            &self.commit_message,
            content.as_bytes(),
        )
        .await?;

        let row_id = insert_response(&self.db, record, Some(&document_path))
            .await
            .map_err(|source| {
                error!(
                    document_path = %document_path,
                    error = %source,
                    "Relational insert failed; document kept for reconciliation"
                );
                SubmissionError::RelationalStore {
                    document_path: document_path.clone(),
                    source,
                }
            })?;

        info!(
            document_path = %document_path,
            row_id,
            attempts,
            version = %record.schema_version,
            "Response stored"
        );

        Ok(SubmissionReceipt {
            document_path,
            row_id,
            attempts,
            timestamp: record.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{MemoryDocumentStore, ScriptedFailure};
    use std::collections::HashSet;

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_document_keys_unique_within_one_second() {
        let ts = time::now();
        let keys: HashSet<String> = (0..1000).map(|_| document_key(&ts)).collect();
        assert_eq!(keys.len(), 1000);

        let key = keys.iter().next().unwrap();
        assert!(key.starts_with("responses/"));
        assert!(key.ends_with(".json"));
        assert_eq!(time::parse_key_timestamp(key).map(|t| t.timestamp()), Some(ts.timestamp()));
    }

    #[tokio::test]
    async fn test_non_conflict_error_not_retried() {
        let store = MemoryDocumentStore::new();
        store.script_failures([ScriptedFailure::Status(401)]);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let err = create_with_retry(&store, &policy, "responses/a.json", "m", b"{}")
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::DocumentStore { attempts: 1, .. }));
        assert_eq!(store.create_attempts(), 1);
    }

    #[tokio::test]
    async fn test_same_key_used_across_retries() {
        let store = MemoryDocumentStore::new();
        store.script_failures([ScriptedFailure::Status(422)]);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let attempts = create_with_retry(&store, &policy, "responses/k.json", "m", b"{}")
            .await
            .unwrap();

        assert_eq!(attempts, 2);
        assert_eq!(store.create_paths(), vec!["responses/k.json", "responses/k.json"]);
    }

    #[test]
    fn test_user_messages_by_failure_kind() {
        let err = SubmissionError::DocumentStore {
            attempts: 3,
            source: DocumentStoreError::Api {
                status: 401,
                message: "Bad credentials".into(),
            },
        };
        assert!(!err.user_message().contains("credentials"));

        let err = SubmissionError::RelationalStore {
            document_path: "responses/a.json".into(),
            source: survey_common::Error::Internal("database is locked".into()),
        };
        let message = err.user_message();
        assert!(message.starts_with("Risposta registrata"));
        assert!(message.contains("database is locked"));
    }
}
