//! In-memory page handle over fixed HTML documents.
//!
//! `StaticBrowser` serves pre-rendered pages keyed by URL. Overlays model
//! click-to-open panels: clicking an overlay's trigger selector injects its
//! fragment into the document, clicking its dismiss selector removes it.
//! Saved profile pages can be replayed through the extraction engine without
//! launching Chromium.

use crate::actions::BrowserActions;
use crate::error::{BrowserError, Result};
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::Mutex;

/// A click-to-open fragment attached to a static page.
#[derive(Debug, Clone)]
pub struct Overlay {
    trigger: String,
    dismiss: String,
    fragment: String,
}

/// A pre-rendered document with optional overlays.
#[derive(Debug, Clone)]
pub struct StaticPage {
    html: String,
    overlays: Vec<Overlay>,
}

impl StaticPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            overlays: Vec::new(),
        }
    }

    /// Attach an overlay opened by clicking `trigger` and closed by clicking `dismiss`.
    #[must_use]
    pub fn with_overlay(
        mut self,
        trigger: impl Into<String>,
        dismiss: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        self.overlays.push(Overlay {
            trigger: trigger.into(),
            dismiss: dismiss.into(),
            fragment: fragment.into(),
        });
        self
    }
}

#[derive(Debug, Default)]
struct StaticState {
    pages: HashMap<String, StaticPage>,
    current: Option<String>,
    open_overlays: Vec<usize>,
    navigations: Vec<String>,
    clicks: Vec<String>,
}

impl StaticState {
    fn current_page(&self) -> Result<(&str, &StaticPage)> {
        let url = self.current.as_deref().ok_or(BrowserError::NoPage)?;
        let page = self
            .pages
            .get(url)
            .ok_or_else(|| BrowserError::NavigationError(format!("page {url} was removed")))?;
        Ok((url, page))
    }

    fn render(&self) -> Result<String> {
        let (_, page) = self.current_page()?;
        if self.open_overlays.is_empty() {
            return Ok(page.html.clone());
        }

        let injected: String = self
            .open_overlays
            .iter()
            .filter_map(|idx| page.overlays.get(*idx))
            .map(|overlay| overlay.fragment.as_str())
            .collect();

        let html = match page.html.rfind("</body>") {
            Some(pos) => {
                let mut html = page.html.clone();
                html.insert_str(pos, &injected);
                html
            }
            None => format!("{}{injected}", page.html),
        };
        Ok(html)
    }
}

/// Page handle serving fixed documents from memory.
#[derive(Debug, Default)]
pub struct StaticBrowser {
    state: Mutex<StaticState>,
}

impl StaticBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page served at `url`.
    #[must_use]
    pub fn with_page(self, url: impl Into<String>, page: StaticPage) -> Self {
        self.insert_page(url, page);
        self
    }

    /// Register or replace a page served at `url`.
    pub fn insert_page(&self, url: impl Into<String>, page: StaticPage) {
        self.lock().pages.insert(url.into(), page);
    }

    /// Replace the document of an existing page, keeping its overlays.
    ///
    /// Models a listing that grew after lazy loading.
    pub fn set_html(&self, url: &str, html: impl Into<String>) {
        let mut state = self.lock();
        if let Some(page) = state.pages.get_mut(url) {
            page.html = html.into();
        }
    }

    /// Number of overlays currently open on the loaded page.
    pub fn open_overlay_count(&self) -> usize {
        self.lock().open_overlays.len()
    }

    /// URLs navigated to so far, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    /// Selectors clicked so far, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StaticState> {
        // A poisoned lock only means a test panicked mid-call; the state is still usable.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| BrowserError::InvalidSelector(format!("{selector}: {e}")))
}

fn document_matches(html: &str, selector: &Selector) -> bool {
    Html::parse_document(html).select(selector).next().is_some()
}

fn first_text(html: &str, selector: &Selector) -> Option<String> {
    Html::parse_document(html)
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

#[async_trait::async_trait]
impl BrowserActions for StaticBrowser {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.lock();
        let key = if state.pages.contains_key(url) {
            url.to_string()
        } else {
            let trimmed = url.trim_end_matches('/');
            state
                .pages
                .keys()
                .find(|k| k.trim_end_matches('/') == trimmed)
                .cloned()
                .ok_or_else(|| BrowserError::NavigationError(format!("no page at {url}")))?
        };

        state.navigations.push(url.to_string());
        state.current = Some(key);
        state.open_overlays.clear();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let state = self.lock();
        state.current_page().map(|(url, _)| url.to_string())
    }

    async fn content(&self) -> Result<String> {
        self.lock().render()
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.lock();
        let (_, page) = state.current_page()?;

        let trigger = page.overlays.iter().position(|o| o.trigger == selector);
        let dismiss = page.overlays.iter().position(|o| o.dismiss == selector);

        if let Some(idx) = dismiss.filter(|idx| state.open_overlays.contains(idx)) {
            state.open_overlays.retain(|open| *open != idx);
        } else if let Some(idx) = trigger {
            if !state.open_overlays.contains(&idx) {
                state.open_overlays.push(idx);
            }
        } else {
            let parsed = parse_selector(selector)?;
            if !document_matches(&state.render()?, &parsed) {
                return Err(BrowserError::SelectorNotFound(selector.to_string()));
            }
        }

        state.clicks.push(selector.to_string());
        Ok(())
    }

    async fn exists(&self, selector: &str) -> Result<bool> {
        let parsed = parse_selector(selector)?;
        let html = self.lock().render()?;
        Ok(document_matches(&html, &parsed))
    }

    async fn extract_text(&self, selector: &str) -> Result<String> {
        let parsed = parse_selector(selector)?;
        let html = self.lock().render()?;
        first_text(&html, &parsed).ok_or_else(|| BrowserError::SelectorNotFound(selector.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_URL: &str = "https://www.linkedin.com/in/jane-doe";

    fn browser() -> StaticBrowser {
        StaticBrowser::new().with_page(
            PROFILE_URL,
            StaticPage::new(
                r#"<html><body><h1>Jane Doe</h1><a id="contact-info">Contact info</a></body></html>"#,
            )
            .with_overlay(
                "a#contact-info",
                "button.dismiss",
                r#"<div class="panel"><a href="mailto:jane@example.com">mail</a><button class="dismiss">x</button></div>"#,
            ),
        )
    }

    #[tokio::test]
    async fn test_navigate_and_read() {
        let browser = browser();
        browser.navigate(PROFILE_URL).await.expect("navigate");

        assert_eq!(browser.current_url().await.expect("url"), PROFILE_URL);
        assert_eq!(browser.extract_text("h1").await.expect("text"), "Jane Doe");
        assert!(browser.content().await.expect("content").contains("Jane Doe"));
    }

    #[tokio::test]
    async fn test_navigate_tolerates_trailing_slash() {
        let browser = browser();
        browser
            .navigate("https://www.linkedin.com/in/jane-doe/")
            .await
            .expect("navigate");
        assert_eq!(browser.current_url().await.expect("url"), PROFILE_URL);
    }

    #[tokio::test]
    async fn test_navigate_unknown_page() {
        let browser = browser();
        let err = browser
            .navigate("https://www.linkedin.com/in/nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::NavigationError(_)));
    }

    #[tokio::test]
    async fn test_no_page_loaded() {
        let browser = browser();
        assert!(matches!(
            browser.content().await.unwrap_err(),
            BrowserError::NoPage
        ));
    }

    #[tokio::test]
    async fn test_overlay_open_and_close() {
        let browser = browser();
        browser.navigate(PROFILE_URL).await.expect("navigate");

        assert!(!browser.exists("div.panel").await.expect("exists"));
        browser.click("a#contact-info").await.expect("open overlay");
        assert!(browser.exists("div.panel").await.expect("exists"));
        assert_eq!(browser.open_overlay_count(), 1);

        // Opening twice does not stack overlays
        browser.click("a#contact-info").await.expect("open overlay");
        assert_eq!(browser.open_overlay_count(), 1);

        browser.click("button.dismiss").await.expect("close overlay");
        assert!(!browser.exists("div.panel").await.expect("exists"));
        assert_eq!(browser.open_overlay_count(), 0);
        assert_eq!(browser.clicks().len(), 3);
    }

    #[tokio::test]
    async fn test_click_missing_selector() {
        let browser = browser();
        browser.navigate(PROFILE_URL).await.expect("navigate");
        let err = browser.click("button.missing").await.unwrap_err();
        assert!(matches!(err, BrowserError::SelectorNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_selector() {
        let browser = browser();
        browser.navigate(PROFILE_URL).await.expect("navigate");
        let err = browser.exists("a[[").await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidSelector(_)));
    }

    #[tokio::test]
    async fn test_wait_for_selector_times_out() {
        let browser = browser();
        browser.navigate(PROFILE_URL).await.expect("navigate");
        let err = browser
            .wait_for_selector("div.panel", 150)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_set_html_updates_document() {
        let browser = browser();
        browser.navigate(PROFILE_URL).await.expect("navigate");
        browser.set_html(PROFILE_URL, "<html><body><h1>Updated</h1></body></html>");
        assert_eq!(browser.extract_text("h1").await.expect("text"), "Updated");
    }
}
