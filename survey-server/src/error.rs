//! HTTP error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::submission::SubmissionError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Submission could not be stored
    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("Common error: {0}")]
    Common(#[from] survey_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
            ApiError::Submission(err) => {
                let (status, code) = match err {
                    SubmissionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
                    SubmissionError::DocumentStore { .. } => {
                        (StatusCode::BAD_GATEWAY, "DOCUMENT_STORE_ERROR")
                    }
                    SubmissionError::Serialization(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                    SubmissionError::RelationalStore { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "RELATIONAL_STORE_ERROR")
                    }
                };
                (status, code, err.user_message())
            }
            // Detail goes to the log, not the client
            ApiError::Common(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Errore interno".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::DocumentStoreError;
    use survey_common::ValidationError;

    #[test]
    fn test_submission_status_mapping() {
        let validation = ApiError::from(SubmissionError::Validation(ValidationError::MissingRequired {
            field: "bm_yes_no".into(),
        }));
        let (status, code, message) = validation.parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(code, "VALIDATION_ERROR");
        assert!(message.contains("bm_yes_no"));

        let document = ApiError::from(SubmissionError::DocumentStore {
            attempts: 3,
            source: DocumentStoreError::Api {
                status: 409,
                message: "conflict".into(),
            },
        });
        assert_eq!(document.parts().0, StatusCode::BAD_GATEWAY);

        let relational = ApiError::from(SubmissionError::RelationalStore {
            document_path: "responses/a.json".into(),
            source: survey_common::Error::Internal("locked".into()),
        });
        assert_eq!(relational.parts().0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_common_error_detail_hidden() {
        let err = ApiError::from(survey_common::Error::Internal("secret path /var/db".into()));
        let (_, _, message) = err.parts();
        assert!(!message.contains("/var/db"));
    }
}
