//! Error types for profile submission.

use thiserror::Error;

/// Errors that can occur while talking to the recruiting API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No bearer token is available for the request
    #[error("not signed in: no API session token")]
    MissingSession,

    /// The configured base URL cannot be used to build the endpoint
    #[error("invalid API base URL {url}: {message}")]
    InvalidBaseUrl {
        /// Rejected base URL
        url: String,
        /// Parser message
        message: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ApiError> for promtitude_core::PromtitudeError {
    fn from(err: ApiError) -> Self {
        promtitude_core::PromtitudeError::Api(err.to_string())
    }
}

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
