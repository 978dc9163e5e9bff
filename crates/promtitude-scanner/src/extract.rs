//! Profile extraction engine.
//!
//! Contact fields are recovered by an ordered list of strategies, tried per
//! field until one yields a value:
//!
//! 1. [`ExtractionStrategy::DirectLink`]: `mailto:`/`tel:` anchors and
//!    off-platform links inside the contact panel.
//! 2. [`ExtractionStrategy::LabeledSection`]: panel sections identified by a
//!    class hint (`ci-email`, ...) or by their header text.
//! 3. [`ExtractionStrategy::FreeText`]: regex patterns over the panel's
//!    visible text, then over the whole page.
//!
//! Strategies are pure functions of a parsed [`PageSnapshot`]; only
//! [`ProfileExtractor`] touches the live page (opening and closing the
//! contact panel) and it never fails, degrading to an empty profile.

use crate::error::Result;
use crate::filter::{
    accept_email, accept_phone, canonical_profile_url, external_link, first_email, first_phone,
    resolve_link,
};
use once_cell::sync::Lazy;
use promtitude_browser::BrowserActions;
use promtitude_core::{ExtractionConfig, ProfileKey};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Selector group matching an open contact panel.
pub const CONTACT_PANEL: &str = ".pv-contact-info, .artdeco-modal";

/// Elements that open the contact panel, most specific first.
pub const PANEL_TRIGGERS: &[&str] = &[
    "a#top-card-text-details-contact-info",
    "a[href*=\"overlay/contact-info\"]",
];

/// Elements that close the contact panel.
pub const PANEL_DISMISS: &[&str] = &[
    "button[aria-label=\"Dismiss\"]",
    "button.artdeco-modal__dismiss",
];

const NAME_SELECTORS: &[&str] = &["h1.text-heading-xlarge", ".pv-top-card h1", "main h1", "h1"];
const HEADLINE_SELECTORS: &[&str] = &[
    ".pv-top-card .text-body-medium",
    "div.text-body-medium.break-words",
    ".text-body-medium",
];
const LOCATION_SELECTORS: &[&str] = &[
    ".pv-text-details__left-panel .text-body-small.inline",
    "span.text-body-small.inline.t-black--light.break-words",
    ".pv-top-card--list-bullet li",
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static PANEL: Lazy<Selector> = Lazy::new(|| selector(CONTACT_PANEL));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));
static MAILTO: Lazy<Selector> = Lazy::new(|| selector("a[href^=\"mailto:\"]"));
static TEL: Lazy<Selector> = Lazy::new(|| selector("a[href^=\"tel:\"]"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static SECTION: Lazy<Selector> = Lazy::new(|| selector("section"));
static SECTION_HEADER: Lazy<Selector> = Lazy::new(|| selector("h3, h2, header, dt"));

static PROFILE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:[a-z]+\.)?linkedin\.com/in/[A-Za-z0-9\-_%]+").expect("valid profile regex")
});

/// Contact and top-card fields of one profile. Missing values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedProfile {
    pub email: String,
    pub phone: String,
    pub linkedin_url: String,
    pub website: String,
    pub address: String,
    pub full_name: String,
    pub headline: String,
    pub location: String,
}

impl ExtractedProfile {
    /// An empty profile that still records where it came from.
    pub fn fallback(page_url: &str) -> Self {
        Self {
            linkedin_url: profile_url_of_page(page_url),
            ..Self::default()
        }
    }

    /// Whether any way of contacting the member was found.
    pub fn has_contact(&self) -> bool {
        !(self.email.is_empty() && self.phone.is_empty() && self.website.is_empty())
    }
}

/// Contact fields recovered by the strategy runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Email,
    Phone,
    Website,
    Address,
    LinkedinUrl,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Email,
        Field::Phone,
        Field::Website,
        Field::Address,
        Field::LinkedinUrl,
    ];

    fn class_hint(self) -> &'static str {
        match self {
            Self::Email => "ci-email",
            Self::Phone => "ci-phone",
            Self::Website => "ci-websites",
            Self::Address => "ci-address",
            Self::LinkedinUrl => "ci-vanity-url",
        }
    }

    fn header_matches(self, header: &str) -> bool {
        let header = header.trim().to_lowercase();
        match self {
            Self::Email => header.starts_with("email"),
            Self::Phone => header.starts_with("phone"),
            Self::Website => header.starts_with("website"),
            Self::Address => header.starts_with("address"),
            Self::LinkedinUrl => header.ends_with("profile") || header.starts_with("linkedin"),
        }
    }
}

/// A fallback tier for recovering one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    DirectLink,
    LabeledSection,
    FreeText,
}

impl ExtractionStrategy {
    /// Strategies in the order they are tried.
    pub const ORDER: [ExtractionStrategy; 3] = [
        ExtractionStrategy::DirectLink,
        ExtractionStrategy::LabeledSection,
        ExtractionStrategy::FreeText,
    ];

    /// Try to recover `field` from `page`.
    pub fn apply(self, page: &PageSnapshot, field: Field) -> Option<String> {
        match self {
            Self::DirectLink => direct_link(page, field),
            Self::LabeledSection => labeled_section(page, field),
            Self::FreeText => free_text(page, field),
        }
    }
}

/// First non-empty value produced by the strategies, in order.
pub fn run_strategies(page: &PageSnapshot, field: Field) -> Option<String> {
    ExtractionStrategy::ORDER.iter().find_map(|strategy| {
        strategy
            .apply(page, field)
            .filter(|value| !value.trim().is_empty())
    })
}

/// A parsed page document.
///
/// Holds a `scraper::Html`, which is not `Send`; build it, use it and drop it
/// without crossing an `.await`.
pub struct PageSnapshot {
    document: Html,
    base: Option<Url>,
}

impl PageSnapshot {
    pub fn parse(html: &str, page_url: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            base: Url::parse(page_url).ok(),
        }
    }

    fn panel(&self) -> Option<ElementRef<'_>> {
        self.document.select(&PANEL).next()
    }

    fn page_text(&self) -> String {
        self.document
            .select(&BODY)
            .next()
            .map_or_else(|| visible_text(self.document.root_element()), visible_text)
    }

    fn first_text(&self, selectors: &[&str]) -> String {
        selectors
            .iter()
            .filter_map(|css| Selector::parse(css).ok())
            .find_map(|sel| {
                self.document
                    .select(&sel)
                    .map(visible_text)
                    .find(|text| !text.is_empty())
            })
            .unwrap_or_default()
    }
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text a reader would see: script and style contents are skipped.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(|a| a.value().as_element())
            .any(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"));
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    normalize_ws(&out)
}

fn href<'a>(el: &ElementRef<'a>) -> Option<&'a str> {
    el.value().attr("href").map(str::trim)
}

fn profile_link(href: &str, base: Option<&Url>) -> Option<String> {
    resolve_link(href, base).and_then(|url| canonical_profile_url(&url))
}

fn profile_url_in_text(text: &str) -> Option<String> {
    PROFILE_TEXT.find_iter(text).find_map(|m| {
        let url = Url::parse(&format!("https://{}", m.as_str())).ok()?;
        canonical_profile_url(&url)
    })
}

fn profile_url_of_page(page_url: &str) -> String {
    if let Some(url) = Url::parse(page_url)
        .ok()
        .and_then(|u| canonical_profile_url(&u))
    {
        return url;
    }
    ProfileKey::from_url(page_url).map_or_else(
        |_| page_url.trim().to_string(),
        |key| key.as_str().to_string(),
    )
}

fn direct_link(page: &PageSnapshot, field: Field) -> Option<String> {
    let panel = page.panel()?;
    let base = page.base.as_ref();

    match field {
        Field::Email => panel.select(&MAILTO).find_map(|a| {
            let target = href(&a)?.get("mailto:".len()..)?;
            accept_email(target.split('?').next().unwrap_or(target))
        }),
        Field::Phone => panel
            .select(&TEL)
            .find_map(|a| accept_phone(href(&a)?.get("tel:".len()..)?)),
        Field::Website => panel
            .select(&ANCHOR)
            .find_map(|a| external_link(href(&a)?, base)),
        Field::LinkedinUrl => panel
            .select(&ANCHOR)
            .find_map(|a| profile_link(href(&a)?, base)),
        Field::Address => None,
    }
}

fn section_for(panel: ElementRef<'_>, field: Field) -> Option<(ElementRef<'_>, String)> {
    panel.select(&SECTION).find_map(|section| {
        let header = section
            .select(&SECTION_HEADER)
            .next()
            .map(visible_text)
            .unwrap_or_default();

        let hinted = section
            .value()
            .classes()
            .any(|class| class == field.class_hint());
        if !hinted && !field.header_matches(&header) {
            return None;
        }

        let text = visible_text(section);
        let value = match text.strip_prefix(header.as_str()) {
            Some(rest) if !header.is_empty() => rest.trim().to_string(),
            _ => text.clone(),
        };
        Some((section, value))
    })
}

fn labeled_section(page: &PageSnapshot, field: Field) -> Option<String> {
    let panel = page.panel()?;
    let base = page.base.as_ref();
    let (section, value) = section_for(panel, field)?;

    match field {
        Field::Email => section
            .select(&MAILTO)
            .find_map(|a| accept_email(href(&a)?.get("mailto:".len()..)?))
            .or_else(|| first_email(&value)),
        Field::Phone => first_phone(&value),
        Field::Website => section
            .select(&ANCHOR)
            .find_map(|a| external_link(href(&a)?, base))
            .or_else(|| {
                value
                    .split_whitespace()
                    .find_map(|token| external_link(token, None))
            }),
        Field::Address => (!value.is_empty()).then_some(value),
        Field::LinkedinUrl => section
            .select(&ANCHOR)
            .find_map(|a| profile_link(href(&a)?, base))
            .or_else(|| profile_url_in_text(&value)),
    }
}

fn free_text(page: &PageSnapshot, field: Field) -> Option<String> {
    let pattern: fn(&str) -> Option<String> = match field {
        Field::Email => first_email,
        Field::Phone => first_phone,
        Field::LinkedinUrl => profile_url_in_text,
        Field::Website | Field::Address => return None,
    };

    page.panel()
        .and_then(|panel| pattern(&visible_text(panel)))
        .or_else(|| pattern(&page.page_text()))
}

/// Extract every field from an already loaded page document.
pub fn extract_from_html(html: &str, page_url: &str) -> ExtractedProfile {
    let page = PageSnapshot::parse(html, page_url);
    let field = |f| run_strategies(&page, f).unwrap_or_default();

    let mut profile = ExtractedProfile {
        email: field(Field::Email),
        phone: field(Field::Phone),
        website: field(Field::Website),
        address: field(Field::Address),
        linkedin_url: field(Field::LinkedinUrl),
        full_name: page.first_text(NAME_SELECTORS),
        headline: page.first_text(HEADLINE_SELECTORS),
        location: page.first_text(LOCATION_SELECTORS),
    };
    if profile.linkedin_url.is_empty() {
        profile.linkedin_url = profile_url_of_page(page_url);
    }
    profile
}

/// How the contact panel was found before extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PanelState {
    AlreadyOpen,
    Opened,
    Unavailable,
}

/// Drives a live page through contact-panel handling and extraction.
#[derive(Debug, Clone)]
pub struct ProfileExtractor {
    poll_attempts: u32,
    poll_interval: Duration,
}

impl Default for ProfileExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl ProfileExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            poll_attempts: config.panel_poll_attempts,
            poll_interval: Duration::from_millis(config.panel_poll_interval_ms),
        }
    }

    /// Extract the profile on the currently loaded page.
    ///
    /// Never fails: on any browser error the result is an empty profile
    /// whose `linkedin_url` is derived from the page address.
    pub async fn extract(&self, page: &dyn BrowserActions) -> ExtractedProfile {
        let page_url = page.current_url().await.unwrap_or_default();
        match self.try_extract(page, &page_url).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Extraction failed on {}: {}", page_url, e);
                ExtractedProfile::fallback(&page_url)
            }
        }
    }

    async fn try_extract(
        &self,
        page: &dyn BrowserActions,
        page_url: &str,
    ) -> Result<ExtractedProfile> {
        let panel = self.open_panel(page).await?;
        let html = page.content().await;

        if panel != PanelState::AlreadyOpen {
            self.close_panel(page).await;
        }

        let profile = extract_from_html(&html?, page_url);
        tracing::debug!(
            panel = ?panel,
            has_email = !profile.email.is_empty(),
            has_phone = !profile.phone.is_empty(),
            "Extracted profile from {}",
            page_url
        );
        Ok(profile)
    }

    async fn open_panel(&self, page: &dyn BrowserActions) -> Result<PanelState> {
        if page.exists(CONTACT_PANEL).await? {
            return Ok(PanelState::AlreadyOpen);
        }

        let mut trigger = None;
        for candidate in PANEL_TRIGGERS {
            if page.exists(candidate).await? {
                trigger = Some(*candidate);
                break;
            }
        }
        let Some(trigger) = trigger else {
            tracing::debug!("No contact panel trigger on page");
            return Ok(PanelState::Unavailable);
        };

        page.click(trigger).await?;
        for _ in 0..self.poll_attempts {
            if page.exists(CONTACT_PANEL).await? {
                return Ok(PanelState::Opened);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        tracing::debug!(
            "Contact panel did not appear after {} attempts",
            self.poll_attempts
        );
        Ok(PanelState::Unavailable)
    }

    /// Close the panel if it is open. Failures only leave the panel open.
    async fn close_panel(&self, page: &dyn BrowserActions) {
        if !page.exists(CONTACT_PANEL).await.unwrap_or(false) {
            return;
        }
        for dismiss in PANEL_DISMISS {
            if page.exists(dismiss).await.unwrap_or(false) {
                if let Err(e) = page.click(dismiss).await {
                    tracing::debug!("Failed to close contact panel: {}", e);
                }
                return;
            }
        }
        tracing::debug!("Contact panel has no dismiss control");
    }
}
