use crate::error::{BrowserError, Result};
use std::time::Duration;

/// Interval used by the default `wait_for_selector` polling loop.
const WAIT_POLL_INTERVAL_MS: u64 = 100;

/// Page handle used by discovery, extraction and the processor.
///
/// One handle drives one tab; calls are expected to be sequential.
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Navigate to a URL and wait for the load to settle
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Address of the currently loaded page
    async fn current_url(&self) -> Result<String>;

    /// Rendered HTML of the current page
    async fn content(&self) -> Result<String>;

    /// Click an element by selector
    async fn click(&self, selector: &str) -> Result<()>;

    /// Whether at least one element matches the selector
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Extract text from the first element matching the selector
    async fn extract_text(&self, selector: &str) -> Result<String>;

    /// Wait for a selector to appear
    async fn wait_for_selector(&self, selector: &str, timeout_ms: u64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.exists(selector).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "selector {selector} did not appear within {timeout_ms}ms"
                )));
            }
            tokio::time::sleep(Duration::from_millis(WAIT_POLL_INTERVAL_MS)).await;
        }
    }
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(|s| s.to_string())
}
