//! Submission contract consumed by the background processor.

use crate::error::Result;
use crate::record::{CandidateRecord, SessionContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Longest server detail kept in a queue item's error.
const MAX_DETAIL_LEN: usize = 200;

/// Sends candidate records to the recruiting API.
///
/// `Err` is reserved for transport problems (network, bad configuration);
/// anything the server answered is reported through [`SubmitResponse`].
#[async_trait]
pub trait ProfileSubmitter: Send + Sync {
    async fn submit_profile(
        &self,
        session: &SessionContext,
        record: &CandidateRecord,
    ) -> Result<SubmitResponse>;
}

/// How the server handled a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitOutcome {
    Success,
    /// The candidate already exists; not an error.
    Duplicate,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub outcome: SubmitOutcome,
    pub detail: String,
}

impl SubmitResponse {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            outcome: SubmitOutcome::Success,
            detail: detail.into(),
        }
    }

    pub fn duplicate(detail: impl Into<String>) -> Self {
        Self {
            outcome: SubmitOutcome::Duplicate,
            detail: detail.into(),
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            outcome: SubmitOutcome::Error,
            detail: detail.into(),
        }
    }
}

/// Body fields the import endpoint may answer with.
#[derive(Debug, Default, Deserialize)]
struct ImportReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    duplicate: Option<bool>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ImportReply {
    fn is_duplicate(&self) -> bool {
        self.duplicate == Some(true)
            || self
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("duplicate"))
    }

    fn detail_text(&self) -> Option<String> {
        let detail = match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        detail.or_else(|| self.message.clone())
    }
}

fn truncate(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(MAX_DETAIL_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Map an HTTP status and body to a [`SubmitResponse`].
///
/// 2xx is a success unless the JSON body flags a duplicate; 409 is a
/// duplicate; anything else is an error carrying the server's detail.
pub fn classify_response(status: u16, body: &str) -> SubmitResponse {
    let reply: ImportReply = serde_json::from_str(body).unwrap_or_default();
    let detail = reply
        .detail_text()
        .map_or_else(|| truncate(body), |d| truncate(&d));

    match status {
        200..=299 if reply.is_duplicate() => SubmitResponse::duplicate(detail),
        200..=299 => SubmitResponse::success(detail),
        409 => SubmitResponse::duplicate(detail),
        _ if detail.is_empty() => SubmitResponse::error(format!("HTTP {status}")),
        _ => SubmitResponse::error(format!("HTTP {status}: {detail}")),
    }
}
