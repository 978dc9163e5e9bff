use crate::actions::{extract_domain, BrowserActions};
use crate::error::{BrowserError, Result};
use crate::user_agent::choose_user_agent;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use promtitude_core::BrowserConfig;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Minimum spacing between two navigations to the same domain.
const DEFAULT_MIN_NAVIGATION_DELAY_MS: u64 = 1000;

/// Spaces out navigations per domain
#[derive(Debug)]
struct NavigationPacer {
    last_access: HashMap<String, Instant>,
    min_delay: Duration,
}

impl NavigationPacer {
    fn new(min_delay_ms: u64) -> Self {
        Self {
            last_access: HashMap::new(),
            min_delay: Duration::from_millis(min_delay_ms),
        }
    }

    /// Reserve the next navigation slot for `domain` and return how long the
    /// caller must wait before using it.
    fn reserve(&mut self, domain: &str, now: Instant) -> Duration {
        let wait = match self.last_access.get(domain) {
            Some(last) => {
                let ready_at = *last + self.min_delay;
                ready_at.saturating_duration_since(now)
            }
            None => Duration::ZERO,
        };
        self.last_access.insert(domain.to_string(), now + wait);
        wait
    }
}

/// Browser automation engine backed by a single Chromium tab
pub struct BrowserEngine {
    browser: Browser,
    page: Mutex<Option<Page>>,
    user_agent: String,
    pacer: Mutex<NavigationPacer>,
    navigation_timeout: Duration,
    handler: JoinHandle<()>,
}

impl BrowserEngine {
    /// Launch a browser engine with default configuration
    pub async fn new() -> Result<Self> {
        Self::launch(&BrowserConfig::default()).await
    }

    /// Launch a browser engine using the importer's browser settings
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = ChromiumConfig::builder()
            .no_sandbox()
            .window_size(config.window_width, config.window_height);
        if !config.headless {
            builder = builder.with_head();
        }
        let chromium_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("browser handler event error: {}", e);
                }
            }
        });

        tracing::info!(
            headless = config.headless,
            "Browser engine launched ({}x{})",
            config.window_width,
            config.window_height
        );

        Ok(Self {
            browser,
            page: Mutex::new(None),
            user_agent: choose_user_agent(config.user_agent.as_deref()),
            pacer: Mutex::new(NavigationPacer::new(DEFAULT_MIN_NAVIGATION_DELAY_MS)),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            handler,
        })
    }

    /// Get the working tab, opening it on first use.
    async fn page(&self) -> Result<Page> {
        let mut guard = self.page.lock().await;
        if let Some(page) = guard.as_ref() {
            return Ok(page.clone());
        }

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        page.set_user_agent(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        *guard = Some(page.clone());
        Ok(page)
    }

    /// Page that must already have been navigated.
    async fn loaded_page(&self) -> Result<Page> {
        self.page.lock().await.clone().ok_or(BrowserError::NoPage)
    }
}

impl Drop for BrowserEngine {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserEngine {
    async fn navigate(&self, url: &str) -> Result<()> {
        let domain = extract_domain(url)?;
        let wait = self.pacer.lock().await.reserve(&domain, Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Pacing navigation to {} by {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }

        let page = self.page().await?;
        let load = async {
            page.goto(url)
                .await
                .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| BrowserError::NavigationError(e.to_string()))?;
            Ok::<(), BrowserError>(())
        };

        tokio::time::timeout(self.navigation_timeout, load)
            .await
            .map_err(|_| {
                BrowserError::Timeout(format!(
                    "navigation to {url} exceeded {:?}",
                    self.navigation_timeout
                ))
            })??;

        tracing::debug!("Navigated to {}", url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.loaded_page().await?;
        page.url()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?
            .ok_or(BrowserError::NoPage)
    }

    async fn content(&self) -> Result<String> {
        let page = self.loaded_page().await?;
        page.content()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let page = self.loaded_page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let page = self.loaded_page().await?;
        let elements = page
            .find_elements(selector)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(!elements.is_empty())
    }

    async fn extract_text(&self, selector: &str) -> Result<String> {
        let page = self.loaded_page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::SelectorNotFound(selector.to_string()))?;
        let text = element
            .inner_text()
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;
        Ok(text.unwrap_or_default().trim().to_string())
    }
}
