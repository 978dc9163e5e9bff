//! Profile discovery and extraction.
//!
//! [`discovery`] finds member profiles on listing pages; [`extract`] turns a
//! loaded profile page into an [`ExtractedProfile`]. Both work against the
//! [`promtitude_browser::BrowserActions`] page handle.

pub mod discovery;
pub mod error;
pub mod extract;
pub mod filter;

pub use discovery::{scan, scan_html, DiscoveredProfile, DiscoveryWatcher};
pub use error::{Result, ScanError};
pub use extract::{
    extract_from_html, run_strategies, ExtractedProfile, ExtractionStrategy, Field, PageSnapshot,
    ProfileExtractor,
};
