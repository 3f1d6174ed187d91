//! Aggregated results and schema listing

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use survey_common::{SchemaVersion, SurveySchema};

use super::resolve_version;
use crate::aggregation::{SummarySource, SurveySummary};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub version: Option<String>,
    #[serde(default)]
    pub source: SummarySource,
}

/// GET /api/summary?version=<id>&source=relational|documents
///
/// Read failures come back as an empty summary with `degraded: true`.
pub async fn get_summary(
    State(state): State<AppState>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> ApiResult<Json<SurveySummary>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let version = resolve_version(query.version.as_deref())?;
    Ok(Json(state.reader.summary(version, query.source).await))
}

#[derive(Debug, Serialize)]
pub struct SchemaListing {
    pub latest: SchemaVersion,
    pub versions: Vec<&'static SurveySchema>,
}

/// GET /api/schemas
pub async fn list_schemas() -> Json<SchemaListing> {
    Json(SchemaListing {
        latest: SchemaVersion::LATEST,
        versions: SchemaVersion::all().iter().map(|v| v.schema()).collect(),
    })
}
