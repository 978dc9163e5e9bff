//! Promtitude API - submission of imported profiles to the recruiting API.
//!
//! The background processor depends only on the [`ProfileSubmitter`]
//! contract: submit a [`CandidateRecord`], get back a structured
//! [`SubmitOutcome`] of success, duplicate or error. [`HttpSubmitter`] is
//! the production implementation.
//!
//! # Example
//!
//! ```rust
//! use promtitude_api::{classify_response, SubmitOutcome};
//!
//! let response = classify_response(409, r#"{"detail": "already imported"}"#);
//! assert_eq!(response.outcome, SubmitOutcome::Duplicate);
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod http;
pub mod record;
pub mod submitter;

pub use error::{ApiError, Result};
pub use http::{import_endpoint, HttpSubmitter};
pub use record::{CandidateRecord, SessionContext};
pub use submitter::{classify_response, ProfileSubmitter, SubmitOutcome, SubmitResponse};
