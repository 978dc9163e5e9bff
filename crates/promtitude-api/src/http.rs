//! reqwest-backed submitter for the recruiting API.

use crate::error::{ApiError, Result};
use crate::record::{CandidateRecord, SessionContext};
use crate::submitter::{classify_response, ProfileSubmitter, SubmitResponse};
use async_trait::async_trait;
use promtitude_core::ApiConfig;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Path of the profile import endpoint, relative to the API base URL.
pub const IMPORT_PATH: &str = "api/v1/linkedin-import/import-profile";

/// Build an HTTP client with the given request timeout.
///
/// # Errors
/// Returns error if the HTTP client cannot be created.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ApiError::Internal(format!("failed to create HTTP client: {e}")))
}

/// Full import endpoint under `base_url`, with or without a trailing slash.
pub fn import_endpoint(base_url: &str) -> Result<Url> {
    let invalid = |message: String| ApiError::InvalidBaseUrl {
        url: base_url.to_string(),
        message,
    };

    let mut base = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(invalid("cannot be a base".to_string()));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(IMPORT_PATH).map_err(|e| invalid(e.to_string()))
}

/// Submits records over HTTP with a bearer token.
pub struct HttpSubmitter {
    client: Client,
    default_base_url: String,
}

impl HttpSubmitter {
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.timeout_secs)?,
            default_base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl ProfileSubmitter for HttpSubmitter {
    async fn submit_profile(
        &self,
        session: &SessionContext,
        record: &CandidateRecord,
    ) -> Result<SubmitResponse> {
        if session.token.trim().is_empty() {
            return Err(ApiError::MissingSession);
        }
        let endpoint = import_endpoint(session.base_url(&self.default_base_url))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&session.token)
            .json(record)
            .send()
            .await?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let result = classify_response(status.as_u16(), &body);
        tracing::debug!(
            "Import of {} answered {} ({:?})",
            record.linkedin_url,
            status.as_u16(),
            result.outcome
        );
        Ok(result)
    }
}
