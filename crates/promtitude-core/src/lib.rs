//! Promtitude Core - Foundation crate for the profile importer.
//!
//! This crate provides shared types, error handling and configuration
//! management that all other importer crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes and enums (`QueueItemId`, `ProfileKey`, `ItemStatus`, `Timestamp`)
//!
//! # Example
//!
//! ```rust
//! use promtitude_core::{AppConfig, ProfileKey};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert!(config.rate_limits.hourly <= config.rate_limits.daily);
//!
//! let key = ProfileKey::from_url("https://www.linkedin.com/in/jane-doe/?trk=search")?;
//! assert_eq!(key.as_str(), "https://www.linkedin.com/in/jane-doe");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    ApiConfig, AppConfig, BrowserConfig, DiscoveryConfig, ExtractionConfig, ProcessorConfig,
    RateLimitConfig, StorageConfig,
};
pub use error::{ConfigError, ConfigResult, PromtitudeError, Result};
pub use types::{FailureKind, ItemStatus, ProfileKey, QueueItemId, Timestamp};
