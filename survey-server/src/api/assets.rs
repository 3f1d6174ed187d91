//! Static assets compiled into the binary

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

const SURVEY_CSS: &str = include_str!("../../ui/survey.css");
const SURVEY_JS: &str = include_str!("../../ui/survey.js");

/// GET /static/survey.css
pub async fn serve_css() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        SURVEY_CSS,
    )
        .into_response()
}

/// GET /static/survey.js
pub async fn serve_js() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        SURVEY_JS,
    )
        .into_response()
}
