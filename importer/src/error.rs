//! Error types for the background service and its clients.

use promtitude_api::ApiError;
use promtitude_browser::BrowserError;
use promtitude_db::DatabaseError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// The background context is gone; clients must refresh.
    #[error("background service is no longer running; refresh required")]
    ContextInvalidated,

    #[error("not signed in: set an API session first")]
    NotSignedIn,

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Serializable error returned to JSON clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    /// Error code for client handling (e.g., "CONTEXT_INVALIDATED")
    pub code: String,
    pub error: String,
    /// Set when the client has to reload to reach a new background context
    pub refresh_required: bool,
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        let code = match err {
            ServiceError::ContextInvalidated => "CONTEXT_INVALIDATED",
            ServiceError::NotSignedIn => "NOT_SIGNED_IN",
            ServiceError::Database(_) => "DATABASE_ERROR",
            ServiceError::Browser(_) => "BROWSER_ERROR",
            ServiceError::Api(_) => "API_ERROR",
            ServiceError::InvalidRequest(_) => "INVALID_REQUEST",
        };
        Self {
            success: false,
            code: code.to_string(),
            error: err.to_string(),
            refresh_required: matches!(err, ServiceError::ContextInvalidated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_invalidated_requires_refresh() {
        let response = ErrorResponse::from(&ServiceError::ContextInvalidated);
        assert_eq!(response.code, "CONTEXT_INVALIDATED");
        assert!(response.refresh_required);
        assert!(!response.success);
        assert!(response.error.contains("refresh required"));
    }

    #[test]
    fn test_error_serialization() {
        let response = ErrorResponse::from(&ServiceError::InvalidRequest("bad".to_string()));
        let json = serde_json::to_value(&response).expect("serialize error");
        assert_eq!(json["code"], "INVALID_REQUEST");
        assert_eq!(json["refreshRequired"], false);
        assert_eq!(json["error"], "invalid request: bad");
    }
}
