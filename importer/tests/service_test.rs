//! End-to-end tests of the background service through its handle.

mod common;

use common::*;
use promtitude_api::{SessionContext, SubmitOutcome};
use promtitude_browser::{BrowserActions, StaticBrowser, StaticPage};
use promtitude_core::ItemStatus;
use promtitude_db::{queue, rate_counters, Database, EnqueueCandidate};
use promtitude_importer::discover::{discover_listing, watch_listing};
use promtitude_importer::{
    ImportService, Phase, ProcessorSettings, ServiceError, ServiceHandle, StopReason,
};
use promtitude_scheduler::{RateLimits, RescanSchedule};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

async fn spawn_service(
    db: Database,
    browser: Arc<dyn BrowserActions>,
    submitter: Arc<FakeSubmitter>,
) -> ServiceHandle {
    ImportService::new(db, browser, submitter)
        .with_settings(fast_settings())
        .with_session(session())
        .spawn()
        .await
        .expect("spawn service")
}

async fn wait_for_processing(handle: &ServiceHandle) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while handle.status().await.expect("status").counts.processing == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no item started processing"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_enqueue_skips_known_profiles() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    let first = handle.enqueue(candidates(&["alice", "bob"])).await.unwrap();
    assert!(first.success);
    assert_eq!(
        (first.added_count, first.skipped_count, first.pending_count),
        (2, 0, 2)
    );

    let second = handle
        .enqueue(vec![
            EnqueueCandidate::new("https://www.linkedin.com/in/bob/?miniProfileUrn=x", "Bob"),
            EnqueueCandidate::new(profile_url("carol"), "carol"),
        ])
        .await
        .unwrap();
    assert_eq!(
        (second.added_count, second.skipped_count, second.pending_count),
        (1, 1, 3)
    );

    let listed = handle.list_queue().await.unwrap().items;
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[1].profile_name, "bob");
}

#[tokio::test]
async fn test_start_refused_without_pending_items() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    let started = handle.start().await.unwrap();
    assert!(!started.success);
    assert_eq!(started.error.as_deref(), Some("no pending profiles in queue"));

    let status = handle.status().await.unwrap();
    assert!(!status.is_processing);
    assert_eq!(status.phase, Phase::Idle);
}

#[tokio::test]
async fn test_start_refused_without_session() {
    let handle = ImportService::new(
        seeded_db(&["alice"]).await,
        Arc::new(browser_with(&["alice"])),
        shared(FakeSubmitter::new()),
    )
    .with_settings(fast_settings())
    .spawn()
    .await
    .unwrap();

    let status = handle.status().await.unwrap();
    assert!(!status.signed_in);

    let started = handle.start().await.unwrap();
    assert!(!started.success);
    assert!(started.error.unwrap().contains("not signed in"));
    assert_eq!(handle.status().await.unwrap().counts.pending, 1);
}

#[tokio::test]
async fn test_run_drains_queue() {
    let submitter = shared(FakeSubmitter::new().answer("bob", SubmitOutcome::Duplicate));
    let handle = spawn_service(
        seeded_db(&["alice", "bob", "carol"]).await,
        Arc::new(browser_with(&["alice", "bob", "carol"])),
        submitter.clone(),
    )
    .await;

    let started = handle.start().await.unwrap();
    assert!(started.success);
    wait_until_settled(&handle).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.phase, Phase::Idle);
    assert_eq!(status.stop_reason, Some(StopReason::QueueEmpty));
    assert_eq!(status.counts.completed, 2);
    assert_eq!(status.counts.failed, 1);
    assert_eq!(status.rate_budget.hourly, 38);
    assert_eq!(
        submitter.submitted_urls(),
        vec![profile_url("alice"), profile_url("bob"), profile_url("carol")]
    );

    let latest = handle.progress();
    assert_eq!(latest.stop_reason, Some(StopReason::QueueEmpty));
    assert_eq!((latest.processed, latest.total), (3, 3));
}

#[tokio::test]
async fn test_second_start_is_a_no_op() {
    let submitter = shared(FakeSubmitter::new());
    let browser = SlowBrowser::new(
        browser_with(&["alice", "bob"]),
        &["alice"],
        Duration::from_millis(200),
    );
    let handle = spawn_service(
        seeded_db(&["alice", "bob"]).await,
        Arc::new(browser),
        submitter.clone(),
    )
    .await;

    assert!(handle.start().await.unwrap().success);
    assert!(handle.start().await.unwrap().success);
    assert!(handle.status().await.unwrap().is_processing);
    wait_until_settled(&handle).await;

    assert_eq!(submitter.submitted().len(), 2);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let submitter = shared(FakeSubmitter::new());
    let browser = SlowBrowser::new(
        browser_with(&["alice", "bob", "carol"]),
        &["alice"],
        Duration::from_millis(300),
    );
    let handle = spawn_service(
        seeded_db(&["alice", "bob", "carol"]).await,
        Arc::new(browser),
        submitter.clone(),
    )
    .await;

    handle.start().await.unwrap();
    wait_for_processing(&handle).await;

    assert!(handle.pause().await.unwrap().success);
    let status = handle.status().await.unwrap();
    assert!(!status.is_processing);
    assert_eq!(status.phase, Phase::Paused);
    assert_eq!(status.stop_reason, Some(StopReason::Paused));

    wait_until_settled(&handle).await;
    let counts = handle.status().await.unwrap().counts;
    assert_eq!((counts.completed, counts.pending), (1, 2));

    assert!(handle.start().await.unwrap().success);
    wait_until_settled(&handle).await;

    let status = handle.status().await.unwrap();
    assert_eq!(status.counts.completed, 3);
    assert_eq!(status.stop_reason, Some(StopReason::QueueEmpty));
    assert_eq!(submitter.submitted().len(), 3);
}

#[tokio::test]
async fn test_immediate_resume_processes_each_item_once() {
    let submitter = shared(FakeSubmitter::new());
    let browser = SlowBrowser::new(
        browser_with(&["alice", "bob", "carol"]),
        &["alice"],
        Duration::from_millis(300),
    );
    let handle = spawn_service(
        seeded_db(&["alice", "bob", "carol"]).await,
        Arc::new(browser),
        submitter.clone(),
    )
    .await;

    handle.start().await.unwrap();
    wait_for_processing(&handle).await;
    handle.pause().await.unwrap();
    assert!(handle.start().await.unwrap().success);
    wait_until_settled(&handle).await;

    let mut urls = submitter.submitted_urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![profile_url("alice"), profile_url("bob"), profile_url("carol")]
    );
    assert_eq!(handle.status().await.unwrap().counts.completed, 3);
}

#[tokio::test]
async fn test_clear_respects_in_flight_item() {
    let browser = SlowBrowser::new(
        browser_with(&["alice", "bob", "carol"]),
        &["alice"],
        Duration::from_millis(500),
    );
    let handle = spawn_service(
        seeded_db(&["alice", "bob", "carol"]).await,
        Arc::new(browser),
        shared(FakeSubmitter::new()),
    )
    .await;

    handle.start().await.unwrap();
    wait_for_processing(&handle).await;

    let refused = handle.clear(None).await.unwrap();
    assert!(!refused.success);
    assert!(refused.error.unwrap().contains("pause the processor first"));

    let refused = handle.clear(Some(ItemStatus::Processing)).await.unwrap();
    assert!(!refused.success);

    let cleared = handle.clear(Some(ItemStatus::Pending)).await.unwrap();
    assert!(cleared.success);
    assert_eq!(cleared.removed_count, 2);

    wait_until_settled(&handle).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.counts.completed, 1);
    assert_eq!(status.counts.total(), 1);

    let cleared = handle.clear(None).await.unwrap();
    assert!(cleared.success);
    assert_eq!(cleared.removed_count, 1);
}

#[tokio::test]
async fn test_clear_asks_for_confirmation() {
    let handle = spawn_service(
        seeded_db(&["alice", "bob"]).await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    let asked = Arc::new(Mutex::new(None));
    let seen = asked.clone();
    let declined = handle
        .clear_with(None, move |plan| {
            *seen.lock().unwrap() = Some(plan.matching);
            false
        })
        .await
        .unwrap();

    assert!(!declined.success);
    assert_eq!(declined.error.as_deref(), Some("clear was not confirmed"));
    assert_eq!(*asked.lock().unwrap(), Some(2));
    assert_eq!(handle.status().await.unwrap().counts.pending, 2);
}

#[tokio::test]
async fn test_retry_failed_items() {
    let handle = spawn_service(
        seeded_db(&["alice", "bob", "carol"]).await,
        Arc::new(browser_with(&["alice", "bob", "carol"])),
        shared(
            FakeSubmitter::new()
                .answer("alice", SubmitOutcome::Error)
                .answer("bob", SubmitOutcome::Error),
        ),
    )
    .await;

    handle.start().await.unwrap();
    wait_until_settled(&handle).await;
    assert_eq!(handle.status().await.unwrap().counts.failed, 2);

    let items = handle.list_queue().await.unwrap().items;
    let alice = items
        .iter()
        .find(|item| item.profile_name == "alice")
        .unwrap();
    assert_eq!(alice.error.as_deref(), Some("HTTP 500: boom"));

    let retried = handle.retry(Some(vec![alice.id.clone()])).await.unwrap();
    assert_eq!(retried.retried_count, 1);

    let retried = handle.retry(None).await.unwrap();
    assert_eq!(retried.retried_count, 1);

    let counts = handle.status().await.unwrap().counts;
    assert_eq!((counts.pending, counts.failed, counts.completed), (2, 0, 1));

    let items = handle.list_queue().await.unwrap().items;
    assert!(items
        .iter()
        .filter(|item| item.status == ItemStatus::Pending)
        .all(|item| item.error.is_none() && item.error_kind.is_none()));
}

#[tokio::test]
async fn test_rate_limited_start_reports_resume_time() {
    let db = seeded_db(&["alice"]).await;
    rate_counters::record_success(db.pool(), chrono::Utc::now())
        .await
        .unwrap();

    let handle = ImportService::new(
        db,
        Arc::new(browser_with(&["alice"])),
        shared(FakeSubmitter::new()),
    )
    .with_settings(ProcessorSettings {
        limits: RateLimits {
            hourly: 1,
            daily: 200,
        },
        ..fast_settings()
    })
    .with_session(session())
    .spawn()
    .await
    .unwrap();

    let started = handle.start().await.unwrap();
    assert!(!started.success);
    assert!(started
        .error
        .unwrap()
        .starts_with("rate limit reached; try again after"));

    let status = handle.status().await.unwrap();
    assert!(!status.is_processing);
    assert_eq!(status.stop_reason, Some(StopReason::RateLimited));
    assert_eq!(status.rate_budget.hourly, 0);
    assert!(status.resumes_at.is_some());
    assert_eq!(status.counts.pending, 1);
}

#[tokio::test]
async fn test_interrupted_items_recovered_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    {
        let db = Database::open(&path).await.unwrap();
        db.run_migrations().await.unwrap();
        queue::enqueue_many(db.pool(), &candidates(&["alice", "bob"]))
            .await
            .unwrap();
        let first = queue::next_pending(db.pool()).await.unwrap().unwrap();
        queue::set_status(db.pool(), &first.id, ItemStatus::Processing, None)
            .await
            .unwrap();
        db.pool().close().await;
    }

    let submitter = shared(FakeSubmitter::new());
    let handle = spawn_service(
        Database::open(&path).await.unwrap(),
        Arc::new(browser_with(&["alice", "bob"])),
        submitter.clone(),
    )
    .await;

    let counts = handle.status().await.unwrap().counts;
    assert_eq!((counts.pending, counts.processing), (2, 0));

    handle.start().await.unwrap();
    wait_until_settled(&handle).await;
    assert_eq!(submitter.submitted().len(), 2);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_session_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");

    let handle = ImportService::new(
        Database::open(&path).await.unwrap(),
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .spawn()
    .await
    .unwrap();
    assert!(!handle.status().await.unwrap().signed_in);

    let session = SessionContext::new("persisted").with_base_url("http://localhost:8000");
    assert!(handle.set_session(session).await.unwrap().success);
    assert!(handle.status().await.unwrap().signed_in);
    handle.shutdown().await;

    let restarted = ImportService::new(
        Database::open(&path).await.unwrap(),
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .spawn()
    .await
    .unwrap();
    assert!(restarted.status().await.unwrap().signed_in);
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_badge_count_reported_in_status() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    handle.update_badge(7).await.unwrap();
    assert_eq!(handle.status().await.unwrap().badge, 7);
}

#[tokio::test]
async fn test_json_messages() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    let answer = handle
        .handle_json(json!({
            "action": "enqueue",
            "profiles": [
                {"profileUrl": profile_url("alice"), "profileName": "Alice"},
                {"profileUrl": profile_url("alice"), "profileName": "Alice"}
            ]
        }))
        .await;
    assert_eq!(
        answer,
        json!({"success": true, "addedCount": 1, "skippedCount": 1, "pendingCount": 1})
    );

    let answer = handle
        .handle_json(json!({"action": "updateBadge", "count": 1}))
        .await;
    assert_eq!(answer, json!({}));

    let answer = handle.handle_json(json!({"action": "getStatus"})).await;
    assert_eq!(answer["isProcessing"], false);
    assert_eq!(answer["phase"], "idle");
    assert_eq!(answer["badge"], 1);

    let answer = handle
        .handle_json(json!({"action": "clear", "statusFilter": "pending"}))
        .await;
    assert_eq!(answer["success"], true);
    assert_eq!(answer["removedCount"], 1);

    let answer = handle.handle_json(json!({"action": "start"})).await;
    assert_eq!(answer["success"], false);
    assert_eq!(answer["error"], "no pending profiles in queue");

    let answer = handle.handle_json(json!({"action": "teleport"})).await;
    assert_eq!(answer["success"], false);
    assert_eq!(answer["code"], "INVALID_REQUEST");
    assert_eq!(answer["refreshRequired"], false);
}

#[tokio::test]
async fn test_requests_after_shutdown_are_invalidated() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    handle.shutdown().await;

    assert!(matches!(
        handle.status().await,
        Err(ServiceError::ContextInvalidated)
    ));
    let answer = handle.handle_json(json!({"action": "pause"})).await;
    assert_eq!(answer["code"], "CONTEXT_INVALIDATED");
    assert_eq!(answer["refreshRequired"], true);
}

#[tokio::test]
async fn test_progress_callback_sees_each_item() {
    let handle = spawn_service(
        seeded_db(&["alice", "bob"]).await,
        Arc::new(browser_with(&["alice", "bob"])),
        shared(FakeSubmitter::new()),
    )
    .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let subscription = handle.on_progress(move |snapshot| {
        if let Some(item) = &snapshot.last_item {
            sink.lock().unwrap().push(item.profile_name.clone());
        }
    });

    handle.start().await.unwrap();
    wait_until_settled(&handle).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    subscription.unsubscribe();

    assert_eq!(*seen.lock().unwrap(), vec!["alice", "bob"]);
}

const LISTING_URL: &str = "https://www.linkedin.com/search/results/people/";

fn listing_html(slugs: &[&str]) -> String {
    let cards: String = slugs
        .iter()
        .map(|slug| {
            format!(
                r#"<li class="reusable-search__result-container"><a href="/in/{slug}/"><span aria-hidden="true">{slug}</span></a></li>"#
            )
        })
        .collect();
    format!("<html><body><ul>{cards}</ul></body></html>")
}

#[tokio::test]
async fn test_discovered_profiles_are_queued() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;
    handle.enqueue(candidates(&["alice"])).await.unwrap();

    let page = StaticBrowser::new()
        .with_page(LISTING_URL, StaticPage::new(listing_html(&["alice", "bob"])));

    let report = discover_listing(&handle, &page, LISTING_URL, RescanSchedule::from_millis(&[]))
        .await
        .unwrap();
    assert_eq!((report.discovered, report.added, report.skipped), (2, 1, 1));
    assert_eq!(handle.status().await.unwrap().counts.pending, 2);
}

#[tokio::test]
async fn test_listing_growth_is_picked_up() {
    let handle = spawn_service(
        migrated_db().await,
        Arc::new(StaticBrowser::new()),
        shared(FakeSubmitter::new()),
    )
    .await;

    let page = StaticBrowser::new()
        .with_page(LISTING_URL, StaticPage::new(listing_html(&["alice"])));
    page.navigate(LISTING_URL).await.unwrap();

    let (changed_tx, changed_rx) = mpsc::channel(1);
    let listing = &page;
    let grow = async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        listing.set_html(LISTING_URL, listing_html(&["alice", "bob", "carol"]));
        changed_tx.send(()).await.unwrap();
    };

    let (report, ()) = tokio::join!(
        watch_listing(&handle, &page, RescanSchedule::from_millis(&[]), changed_rx),
        grow
    );
    let report = report.unwrap();
    assert_eq!((report.discovered, report.added), (3, 3));

    let names: Vec<String> = handle
        .list_queue()
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|item| item.profile_name)
        .collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
}
