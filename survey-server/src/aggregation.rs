//! Aggregation reader
//!
//! Builds per-question frequency tables over all stored responses of one
//! survey edition. Reading failures never fail the caller: they degrade to an
//! empty summary flagged `degraded`.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use survey_common::db::list_responses;
use survey_common::{AnswerValue, FieldKind, FieldSpec, ResponseRecord, SchemaVersion};
use thiserror::Error;
use tracing::{error, warn};

use crate::document_store::{DocumentStore, DocumentStoreError, DOCUMENTS_DIR};

/// Where aggregation reads records from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    #[default]
    Relational,
    Documents,
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Relational store read failed: {0}")]
    Relational(#[from] survey_common::Error),

    #[error("Document store read failed: {0}")]
    Documents(#[from] DocumentStoreError),
}

/// One answer value and how many responses chose it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyEntry {
    pub value: String,
    pub count: usize,
}

/// Counts per answer value, unanswered responses excluded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FrequencyTable(Vec<FrequencyEntry>);

impl FrequencyTable {
    /// Count the answers given to one field.
    ///
    /// Multi-choice selections count once each. Yes/no answers list the
    /// affirmative first; every other value is sorted lexicographically.
    pub fn tally<'a>(
        field: &FieldSpec,
        answers: impl IntoIterator<Item = Option<&'a AnswerValue>>,
    ) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for answer in answers {
            match answer {
                Some(AnswerValue::Text(text)) if !text.trim().is_empty() => {
                    *counts.entry(text.trim().to_string()).or_default() += 1;
                }
                Some(AnswerValue::List(items)) => {
                    for item in items {
                        *counts.entry(item.clone()).or_default() += 1;
                    }
                }
                _ => {}
            }
        }

        let mut entries = Vec::with_capacity(counts.len());
        if field.kind == FieldKind::YesNo {
            for option in field.kind.options() {
                if let Some(count) = counts.remove(*option) {
                    entries.push(FrequencyEntry {
                        value: option.to_string(),
                        count,
                    });
                }
            }
        }
        // BTreeMap drains in sorted order
        entries.extend(
            counts
                .into_iter()
                .map(|(value, count)| FrequencyEntry { value, count }),
        );

        Self(entries)
    }

    pub fn entries(&self) -> &[FrequencyEntry] {
        &self.0
    }

    pub fn get(&self, value: &str) -> Option<usize> {
        self.0.iter().find(|e| e.value == value).map(|e| e.count)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, usize> {
        self.0.iter().map(|e| (e.value.clone(), e.count)).collect()
    }
}

/// Frequency table of one question plus its display metadata
#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub key: &'static str,
    pub label: &'static str,
    pub section: &'static str,
    pub kind: FieldKind,
    pub frequencies: FrequencyTable,
    /// Responses that answered the question
    pub answered: usize,
    /// Responses that left it blank (informational, not a bucket)
    pub unanswered: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveySummary {
    pub schema_version: SchemaVersion,
    pub source: SummarySource,
    pub total_responses: usize,
    /// Stored records that could not be decoded
    pub skipped_records: usize,
    pub fields: Vec<FieldSummary>,
    /// Loading failed; the tables are empty rather than missing
    pub degraded: bool,
}

impl SurveySummary {
    pub fn field(&self, key: &str) -> Option<&FieldSummary> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Empty table for every field of the edition, flagged degraded
    pub fn degraded(version: SchemaVersion, source: SummarySource) -> Self {
        let mut summary = summarize(version, source, version.schema().fields, &[]);
        summary.degraded = true;
        summary
    }
}

/// Summarize `records` over `fields`
pub fn summarize(
    version: SchemaVersion,
    source: SummarySource,
    fields: &'static [FieldSpec],
    records: &[ResponseRecord],
) -> SurveySummary {
    let fields = fields
        .iter()
        .map(|field| {
            let answered = records
                .iter()
                .filter(|r| r.get(field.key).is_some_and(|a| !a.is_empty()))
                .count();
            FieldSummary {
                key: field.key,
                label: field.label,
                section: field.section,
                kind: field.kind,
                frequencies: FrequencyTable::tally(field, records.iter().map(|r| r.get(field.key))),
                answered,
                unanswered: records.len() - answered,
            }
        })
        .collect();

    SurveySummary {
        schema_version: version,
        source,
        total_responses: records.len(),
        skipped_records: 0,
        fields,
        degraded: false,
    }
}

/// Loads records from either store and summarizes them
pub struct AggregationReader {
    db: SqlitePool,
    store: Arc<dyn DocumentStore>,
}

impl AggregationReader {
    pub fn new(db: SqlitePool, store: Arc<dyn DocumentStore>) -> Self {
        Self { db, store }
    }

    /// Summary of one edition; read errors yield an empty degraded summary
    pub async fn summary(&self, version: SchemaVersion, source: SummarySource) -> SurveySummary {
        match self.try_summary(version, source).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(version = %version, source = ?source, error = %e, "Aggregation failed, showing no data");
                SurveySummary::degraded(version, source)
            }
        }
    }

    pub async fn try_summary(
        &self,
        version: SchemaVersion,
        source: SummarySource,
    ) -> Result<SurveySummary, AggregationError> {
        let (records, skipped) = match source {
            SummarySource::Relational => {
                let stored = list_responses(&self.db, Some(version)).await?;
                (stored.records, stored.skipped)
            }
            SummarySource::Documents => self.load_documents(version).await?,
        };

        let mut summary = summarize(version, source, version.schema().fields, &records);
        summary.skipped_records = skipped;
        Ok(summary)
    }

    /// Records of `version` from the document store, plus the skip count
    async fn load_documents(
        &self,
        version: SchemaVersion,
    ) -> Result<(Vec<ResponseRecord>, usize), AggregationError> {
        let entries = self.store.list_files(DOCUMENTS_DIR).await?;

        let mut records = Vec::new();
        let mut skipped = 0;
        for entry in entries.iter().filter(|e| e.is_json()) {
            let decoded = match self.store.fetch_file(&entry.path).await {
                Ok(raw) => ResponseRecord::from_document(&entry.path, &raw).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match decoded {
                Ok(record) if record.schema_version == version => records.push(record),
                Ok(_) => {}
                Err(reason) => {
                    warn!(path = %entry.path, reason = %reason, "Skipping unreadable document");
                    skipped += 1;
                }
            }
        }

        records.sort_by_key(|r| r.timestamp);
        Ok((records, skipped))
    }
}
