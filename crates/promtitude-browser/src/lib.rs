//! Browser automation for profile and listing pages.
//!
//! Provides the `BrowserActions` page handle used by discovery and
//! extraction, a headless Chromium implementation with per-domain
//! navigation pacing, and an in-memory implementation over fixed HTML.

pub mod actions;
pub mod engine;
pub mod error;
pub mod static_page;
pub mod user_agent;

pub use actions::BrowserActions;
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use static_page::{StaticBrowser, StaticPage};
