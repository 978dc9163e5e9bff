//! Shared error types.
//!
//! `PromtitudeError` is what crosses crate boundaries; each library crate
//! keeps its own richer error enum and converts into it.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromtitudeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Queue, rate counter or settings storage failure
    #[error("database error: {0}")]
    Database(String),

    /// Submission to the recruiting API failed
    #[error("api error: {0}")]
    Api(String),

    /// Input rejected before it reached storage, e.g. a malformed profile URL
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading, overriding or saving [`crate::AppConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine config directory (XDG base directories not available)")]
    NoConfigDir,

    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value from the file or the environment is out of range
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, PromtitudeError>;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
