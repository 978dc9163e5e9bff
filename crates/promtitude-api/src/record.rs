//! Payload sent for each imported profile and the session it is sent with.

use promtitude_scanner::ExtractedProfile;
use serde::{Deserialize, Serialize};

/// Marks records produced by this importer on the server side.
pub const SOURCE_TAG: &str = "linkedin_import";

/// One candidate as submitted to the recruiting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub full_name: String,
    pub headline: String,
    pub location: String,
    pub email: String,
    pub phone: String,
    pub linkedin_url: String,
    pub website: String,
    pub address: String,
    pub source: String,
}

impl CandidateRecord {
    /// Build a record from extracted fields.
    ///
    /// The queue entry's name and URL fill in for a top card or page address
    /// that could not be read.
    pub fn from_extracted(profile: &ExtractedProfile, queued_name: &str, queued_url: &str) -> Self {
        let or_queued = |extracted: &str, queued: &str| {
            if extracted.trim().is_empty() {
                queued.trim().to_string()
            } else {
                extracted.to_string()
            }
        };

        Self {
            full_name: or_queued(&profile.full_name, queued_name),
            headline: profile.headline.clone(),
            location: profile.location.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            linkedin_url: or_queued(&profile.linkedin_url, queued_url),
            website: profile.website.clone(),
            address: profile.address.clone(),
            source: SOURCE_TAG.to_string(),
        }
    }
}

/// Credentials used for submissions.
///
/// Owned by the background service and persisted in the settings table.
/// `api_base_url` overrides the configured base URL when set.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    pub token: String,
}

impl SessionContext {
    /// Settings key under which the session is stored.
    pub const SETTINGS_KEY: &'static str = "session";

    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base_url: None,
            token: token.into(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = Some(base_url.into());
        self
    }

    /// Base URL to use, given the configured default.
    pub fn base_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.api_base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(default)
    }
}

// Keep the token out of logs.
impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("api_base_url", &self.api_base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}
