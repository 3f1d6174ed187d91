//! survey-server library
//!
//! Web front end of the survey: the respondent form, the landing page with
//! the survey link and the results dashboard, plus the dual-write submission
//! path and the document store reconciliation job.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod aggregation;
pub mod api;
pub mod document_store;
pub mod error;
pub mod reconcile;
pub mod submission;

use aggregation::AggregationReader;
use document_store::DocumentStore;
use submission::{RetryPolicy, SubmissionCoordinator};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SubmissionCoordinator>,
    pub reader: Arc<AggregationReader>,
    /// Public base URL, without trailing slash
    pub app_url: String,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        store: Arc<dyn DocumentStore>,
        policy: RetryPolicy,
        commit_message: impl Into<String>,
        app_url: impl Into<String>,
    ) -> Self {
        let coordinator = SubmissionCoordinator::new(store.clone(), db.clone(), policy, commit_message);
        let reader = AggregationReader::new(db, store);
        Self {
            coordinator: Arc::new(coordinator),
            reader: Arc::new(reader),
            app_url: app_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Link respondents open
    pub fn survey_url(&self) -> String {
        format!("{}?survey=1", self.app_url)
    }

    pub fn admin_url(&self) -> String {
        format!("{}?admin=1", self.app_url)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/", get(api::serve_page))
        .route("/static/survey.css", get(api::serve_css))
        .route("/static/survey.js", get(api::serve_js))
        .route("/api/responses", post(api::submit_response))
        .route("/api/summary", get(api::get_summary))
        .route("/api/schemas", get(api::list_schemas))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
