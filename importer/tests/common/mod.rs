//! Shared fakes for importer integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use promtitude_api::{CandidateRecord, ProfileSubmitter, SessionContext, SubmitOutcome, SubmitResponse};
use promtitude_browser::{BrowserActions, StaticBrowser, StaticPage};
use promtitude_db::{queue, Database, EnqueueCandidate};
use promtitude_importer::{ProcessorSettings, ServiceHandle};
use promtitude_scheduler::RateLimits;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "https://www.linkedin.com/in/";

pub fn profile_url(slug: &str) -> String {
    format!("{BASE}{slug}")
}

pub fn profile_page(name: &str) -> StaticPage {
    StaticPage::new(format!(
        "<html><body><main><h1>{name}</h1><div class=\"text-body-medium\">Engineer</div></main></body></html>"
    ))
}

/// Browser serving one simple profile page per slug.
pub fn browser_with(slugs: &[&str]) -> StaticBrowser {
    slugs.iter().fold(StaticBrowser::new(), |browser, slug| {
        browser.with_page(profile_url(slug), profile_page(slug))
    })
}

pub fn candidates(slugs: &[&str]) -> Vec<EnqueueCandidate> {
    slugs
        .iter()
        .map(|slug| EnqueueCandidate::new(profile_url(slug), *slug))
        .collect()
}

pub async fn migrated_db() -> Database {
    let db = Database::in_memory().await.expect("open database");
    db.run_migrations().await.expect("run migrations");
    db
}

pub async fn seeded_db(slugs: &[&str]) -> Database {
    let db = migrated_db().await;
    queue::enqueue_many(db.pool(), &candidates(slugs))
        .await
        .expect("enqueue");
    db
}

pub fn fast_settings() -> ProcessorSettings {
    ProcessorSettings {
        item_timeout: Duration::from_secs(5),
        item_delay: Duration::ZERO,
        jitter_pct: 0,
        limits: RateLimits {
            hourly: 40,
            daily: 200,
        },
    }
}

pub fn session() -> SessionContext {
    SessionContext::new("test-token")
}

/// Submitter answering per profile slug, success by default.
#[derive(Default)]
pub struct FakeSubmitter {
    outcomes: Mutex<Vec<(String, SubmitOutcome)>>,
    submitted: Mutex<Vec<CandidateRecord>>,
}

impl FakeSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, slug: &str, outcome: SubmitOutcome) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .push((slug.to_string(), outcome));
        self
    }

    pub fn submitted(&self) -> Vec<CandidateRecord> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_urls(&self) -> Vec<String> {
        self.submitted()
            .into_iter()
            .map(|r| r.linkedin_url)
            .collect()
    }
}

#[async_trait]
impl ProfileSubmitter for FakeSubmitter {
    async fn submit_profile(
        &self,
        _session: &SessionContext,
        record: &CandidateRecord,
    ) -> promtitude_api::Result<SubmitResponse> {
        self.submitted.lock().unwrap().push(record.clone());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .iter()
            .find(|(slug, _)| record.linkedin_url.ends_with(slug.as_str()))
            .map_or(SubmitOutcome::Success, |(_, outcome)| *outcome);

        Ok(match outcome {
            SubmitOutcome::Success => SubmitResponse::success("imported"),
            SubmitOutcome::Duplicate => SubmitResponse::duplicate("candidate already exists"),
            SubmitOutcome::Error => SubmitResponse::error("HTTP 500: boom"),
        })
    }
}

/// Browser whose navigation to one slug takes `delay`.
pub struct SlowBrowser {
    inner: StaticBrowser,
    slow: Vec<String>,
    delay: Duration,
}

impl SlowBrowser {
    pub fn new(inner: StaticBrowser, slow: &[&str], delay: Duration) -> Self {
        Self {
            inner,
            slow: slow.iter().map(|s| (*s).to_string()).collect(),
            delay,
        }
    }

    pub fn navigations(&self) -> Vec<String> {
        self.inner.navigations()
    }
}

#[async_trait]
impl BrowserActions for SlowBrowser {
    async fn navigate(&self, url: &str) -> promtitude_browser::Result<()> {
        if self.slow.iter().any(|slug| url.ends_with(slug.as_str())) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.navigate(url).await
    }

    async fn current_url(&self) -> promtitude_browser::Result<String> {
        self.inner.current_url().await
    }

    async fn content(&self) -> promtitude_browser::Result<String> {
        self.inner.content().await
    }

    async fn click(&self, selector: &str) -> promtitude_browser::Result<()> {
        self.inner.click(selector).await
    }

    async fn exists(&self, selector: &str) -> promtitude_browser::Result<bool> {
        self.inner.exists(selector).await
    }

    async fn extract_text(&self, selector: &str) -> promtitude_browser::Result<String> {
        self.inner.extract_text(selector).await
    }
}

/// Poll until no run is active and no item is mid-import.
pub async fn wait_until_settled(handle: &ServiceHandle) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let status = handle.status().await.expect("status");
        if !status.is_processing && status.counts.processing == 0 {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "processor did not settle: {status:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
