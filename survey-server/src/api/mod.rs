//! HTTP API handlers

pub mod assets;
pub mod health;
pub mod pages;
pub mod responses;
pub mod summary;

use serde::Deserialize;
use survey_common::SchemaVersion;

use crate::error::{ApiError, ApiResult};

pub use assets::{serve_css, serve_js};
pub use health::health_routes;
pub use pages::serve_page;
pub use responses::submit_response;
pub use summary::{get_summary, list_schemas};

/// `?version=<id>` selector shared by several routes
#[derive(Debug, Default, Deserialize)]
pub struct VersionQuery {
    pub version: Option<String>,
}

/// Requested survey edition, latest when absent
pub fn resolve_version(requested: Option<&str>) -> ApiResult<SchemaVersion> {
    match requested.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(SchemaVersion::LATEST),
        Some(id) => SchemaVersion::parse(id)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown survey version '{}'", id))),
    }
}
