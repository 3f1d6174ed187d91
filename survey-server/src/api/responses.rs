//! Response submission endpoint

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::Value;

use super::{resolve_version, VersionQuery};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const THANK_YOU: &str = "Grazie! La tua risposta è stata registrata.";

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub document_path: String,
    pub id: i64,
}

/// POST /api/responses?version=<id>
///
/// Body is a JSON object of answers keyed by question.
pub async fn submit_response(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let version = resolve_version(query.version.as_deref())?;
    let Json(input) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let receipt = state.coordinator.submit_raw(version, &input).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            status: "ok",
            message: THANK_YOU,
            document_path: receipt.document_path,
            id: receipt.row_id,
        }),
    ))
}
