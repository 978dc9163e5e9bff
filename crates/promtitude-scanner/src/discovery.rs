//! Profile discovery on listing pages.
//!
//! A listing (search results, a company's people tab, the connections list)
//! is scanned by container strategies from the most specific markup to the
//! generic "any profile link inside a list item or card". The first strategy
//! that finds at least one profile link wins.

use crate::error::Result;
use crate::filter::{canonical_profile_url, resolve_link};
use once_cell::sync::Lazy;
use promtitude_browser::BrowserActions;
use promtitude_scheduler::RescanSchedule;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use url::Url;

/// Container markup tried in order before the generic fallback.
const CONTAINER_STRATEGIES: &[&str] = &[
    "li.reusable-search__result-container",
    "div.entity-result",
    "li.org-people-profile-card__profile-info",
    "li.mn-connection-card",
    "li.discover-fluid-entity-list--item",
    "div.discover-entity-type-card",
];

const NAME_SELECTORS: &[&str] = &[
    ".entity-result__title-text a span[aria-hidden=\"true\"]",
    ".mn-connection-card__name",
    ".org-people-profile-card__profile-title",
    ".discover-person-card__name",
    "span[aria-hidden=\"true\"]",
];

const ANONYMOUS_NAME: &str = "LinkedIn Member";

static PROFILE_ANCHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href*=\"/in/\"]").expect("static selector is valid"));
static IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img[alt]").expect("static selector is valid"));

/// A member profile found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredProfile {
    /// Canonical profile URL
    pub url: String,
    pub name: String,
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

fn profile_href(container: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    container.select(&PROFILE_ANCHOR).find_map(|a| {
        let href = a.value().attr("href")?;
        resolve_link(href, base).and_then(|url| canonical_profile_url(&url))
    })
}

fn display_name(container: ElementRef<'_>) -> String {
    let named = NAME_SELECTORS
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| {
            container
                .select(&sel)
                .map(element_text)
                .find(|text| !text.is_empty())
        });

    named
        .or_else(|| {
            container
                .select(&PROFILE_ANCHOR)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
        .or_else(|| {
            container
                .select(&IMAGE)
                .filter_map(|img| img.value().attr("alt"))
                .map(normalize_ws)
                .find(|alt| !alt.is_empty())
        })
        .unwrap_or_default()
}

fn is_card(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    value.name() == "li" || value.classes().any(|c| c.contains("card"))
}

/// Nearest list item or card around a profile anchor, or the anchor itself.
fn card_of(anchor: ElementRef<'_>) -> ElementRef<'_> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(is_card)
        .unwrap_or(anchor)
}

fn containers<'a>(document: &'a Html, base: Option<&Url>) -> Vec<ElementRef<'a>> {
    for css in CONTAINER_STRATEGIES {
        let Ok(sel) = Selector::parse(css) else {
            continue;
        };
        let found: Vec<_> = document.select(&sel).collect();
        if found.iter().any(|c| profile_href(*c, base).is_some()) {
            tracing::debug!("Listing matched container strategy {}", css);
            return found;
        }
    }

    let mut cards: Vec<ElementRef<'a>> = Vec::new();
    for anchor in document.select(&PROFILE_ANCHOR) {
        let card = card_of(anchor);
        if !cards.iter().any(|c| c.id() == card.id()) {
            cards.push(card);
        }
    }
    cards
}

/// Profiles listed in `html`, deduplicated by URL in document order.
///
/// Relative links resolve against `page_url`. Anonymous members and
/// non-profile links are skipped.
pub fn scan_html(html: &str, page_url: &str) -> Vec<DiscoveredProfile> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut seen = HashSet::new();
    let mut profiles = Vec::new();
    for container in containers(&document, base.as_ref()) {
        let Some(url) = profile_href(container, base.as_ref()) else {
            continue;
        };
        let name = display_name(container);
        if name.eq_ignore_ascii_case(ANONYMOUS_NAME) {
            continue;
        }
        if seen.insert(url.clone()) {
            profiles.push(DiscoveredProfile { url, name });
        }
    }
    profiles
}

/// Scan the listing currently loaded in `page`.
pub async fn scan(page: &dyn BrowserActions) -> Result<Vec<DiscoveredProfile>> {
    let page_url = page.current_url().await?;
    let html = page.content().await?;
    let profiles = scan_html(&html, &page_url);
    tracing::debug!("Discovered {} profiles on {}", profiles.len(), page_url);
    Ok(profiles)
}

fn next_timer(waits: &mut impl Iterator<Item = Duration>) -> Option<Pin<Box<Sleep>>> {
    waits.next().map(|wait| Box::pin(tokio::time::sleep(wait)))
}

/// Re-scans a listing as it lazily grows, reporting each profile once.
#[derive(Debug)]
pub struct DiscoveryWatcher {
    schedule: RescanSchedule,
    reported: HashSet<String>,
}

impl DiscoveryWatcher {
    pub fn new(schedule: RescanSchedule) -> Self {
        Self {
            schedule,
            reported: HashSet::new(),
        }
    }

    /// Scan once and return only profiles not reported before.
    pub async fn poll(&mut self, page: &dyn BrowserActions) -> Result<Vec<DiscoveredProfile>> {
        let found = scan(page).await?;
        Ok(found
            .into_iter()
            .filter(|p| self.reported.insert(p.url.clone()))
            .collect())
    }

    /// Scan now, after each scheduled delay, and whenever `content_changed`
    /// fires; send every non-empty batch of new profiles to `found`.
    ///
    /// Returns once the schedule is exhausted and `content_changed` is
    /// closed, or as soon as `found` is dropped.
    pub async fn run(
        mut self,
        page: &dyn BrowserActions,
        mut content_changed: mpsc::Receiver<()>,
        found: mpsc::Sender<Vec<DiscoveredProfile>>,
    ) -> Result<()> {
        let mut waits = self.schedule.waits().into_iter();
        let mut rescan = next_timer(&mut waits);
        let mut changes_open = true;

        if !self.forward(page, &found).await? {
            return Ok(());
        }

        loop {
            match (rescan.as_mut(), changes_open) {
                (None, false) => return Ok(()),
                (Some(timer), true) => {
                    tokio::select! {
                        () = timer => {
                            rescan = next_timer(&mut waits);
                        }
                        event = content_changed.recv() => {
                            if event.is_none() {
                                changes_open = false;
                                continue;
                            }
                        }
                    }
                }
                (Some(timer), false) => {
                    timer.await;
                    rescan = next_timer(&mut waits);
                }
                (None, true) => {
                    if content_changed.recv().await.is_none() {
                        return Ok(());
                    }
                }
            }

            if !self.forward(page, &found).await? {
                return Ok(());
            }
        }
    }

    /// Poll and send; `false` once nobody is listening.
    async fn forward(
        &mut self,
        page: &dyn BrowserActions,
        found: &mpsc::Sender<Vec<DiscoveredProfile>>,
    ) -> Result<bool> {
        let batch = self.poll(page).await?;
        if batch.is_empty() {
            return Ok(!found.is_closed());
        }
        tracing::info!("Discovered {} new profiles", batch.len());
        Ok(found.send(batch).await.is_ok())
    }
}
