//! Persisted import queue.
//!
//! One row per normalized profile URL. Items move through
//! `pending → processing → completed | failed`, and failed items return to
//! `pending` only through an explicit retry. Every function commits before
//! returning.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use promtitude_core::{FailureKind, ItemStatus, ProfileKey, QueueItemId};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;

const ITEM_COLUMNS: &str = "id, profile_key, profile_url, profile_name, status, error, error_kind, created_at, updated_at";

/// A profile waiting for, undergoing, or done with import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: QueueItemId,
    pub profile_key: ProfileKey,
    pub profile_url: String,
    pub profile_name: String,
    pub status: ItemStatus,
    pub error: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A discovered profile offered to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueCandidate {
    pub profile_url: String,
    #[serde(default)]
    pub profile_name: String,
}

impl EnqueueCandidate {
    pub fn new(profile_url: impl Into<String>, profile_name: impl Into<String>) -> Self {
        Self {
            profile_url: profile_url.into(),
            profile_name: profile_name.into(),
        }
    }
}

/// Outcome of [`enqueue_many`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReport {
    pub added: u32,
    pub skipped: u32,
}

/// Per-status item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

impl StatusCounts {
    pub fn total(&self) -> u32 {
        self.pending + self.processing + self.completed + self.failed
    }

    pub fn get(&self, status: ItemStatus) -> u32 {
        match status {
            ItemStatus::Pending => self.pending,
            ItemStatus::Processing => self.processing,
            ItemStatus::Completed => self.completed,
            ItemStatus::Failed => self.failed,
        }
    }

    fn slot(&mut self, status: ItemStatus) -> &mut u32 {
        match status {
            ItemStatus::Pending => &mut self.pending,
            ItemStatus::Processing => &mut self.processing,
            ItemStatus::Completed => &mut self.completed,
            ItemStatus::Failed => &mut self.failed,
        }
    }
}

/// Reason attached to a `failed` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What a clear request is about to remove, shown to the confirming party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearPlan {
    pub filter: Option<ItemStatus>,
    pub matching: u32,
}

/// Result of a clear request that was not refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Removed(u32),
    Declined,
}

type ItemRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
);

/// Current time at the precision timestamps are stored with.
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Decode(format!("invalid {column} '{value}': {e}")))
}

fn decode_row(row: ItemRow) -> Result<QueueItem> {
    let (id, key, url, name, status, error, kind, created_at, updated_at) = row;

    let id = QueueItemId::new(id).map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let status = status
        .parse::<ItemStatus>()
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;
    let error_kind = kind
        .map(|k| k.parse::<FailureKind>())
        .transpose()
        .map_err(|e| DatabaseError::Decode(e.to_string()))?;

    Ok(QueueItem {
        id,
        profile_key: ProfileKey::from_stored(key),
        profile_url: url,
        profile_name: name,
        status,
        error,
        error_kind,
        created_at: parse_ts("created_at", &created_at)?,
        updated_at: parse_ts("updated_at", &updated_at)?,
    })
}

async fn fetch_item(conn: &mut SqliteConnection, id: &QueueItemId) -> Result<Option<QueueItem>> {
    let row: Option<ItemRow> =
        sqlx::query_as(&format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    row.map(decode_row).transpose()
}

/// Add candidates not already queued, in input order.
///
/// Candidates are matched by [`ProfileKey`] against every stored item
/// regardless of status and against earlier candidates in the same batch.
/// Duplicates and unparseable URLs are counted as skipped. The batch is
/// committed as one transaction.
pub async fn enqueue_many(
    pool: &SqlitePool,
    candidates: &[EnqueueCandidate],
) -> Result<EnqueueReport> {
    let mut report = EnqueueReport::default();
    let mut seen = HashSet::new();
    let now = format_ts(stored_now());

    let mut tx = pool.begin().await?;
    for candidate in candidates {
        let key = match ProfileKey::from_url(&candidate.profile_url) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("Skipping candidate: {}", e);
                report.skipped += 1;
                continue;
            }
        };

        if !seen.insert(key.clone()) {
            report.skipped += 1;
            continue;
        }

        let result = sqlx::query(
            "INSERT INTO queue_items (id, profile_key, profile_url, profile_name, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?)
             ON CONFLICT(profile_key) DO NOTHING",
        )
        .bind(QueueItemId::generate().as_str())
        .bind(key.as_str())
        .bind(candidate.profile_url.trim())
        .bind(candidate.profile_name.trim())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            report.added += 1;
        } else {
            report.skipped += 1;
        }
    }
    tx.commit().await?;

    tracing::info!(
        "Enqueued {} profiles ({} skipped)",
        report.added,
        report.skipped
    );
    Ok(report)
}

/// All items in FIFO order.
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<QueueItem>> {
    let rows: Vec<ItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM queue_items ORDER BY created_at, rowid"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(decode_row).collect()
}

pub async fn counts_by_status(pool: &SqlitePool) -> Result<StatusCounts> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM queue_items GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        let status = status
            .parse::<ItemStatus>()
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        *counts.slot(status) = u32::try_from(count).unwrap_or(u32::MAX);
    }
    Ok(counts)
}

pub async fn get(pool: &SqlitePool, id: &QueueItemId) -> Result<Option<QueueItem>> {
    let mut conn = pool.acquire().await?;
    fetch_item(&mut *conn, id).await
}

/// Earliest pending item, if any.
pub async fn next_pending(pool: &SqlitePool) -> Result<Option<QueueItem>> {
    let row: Option<ItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM queue_items WHERE status = 'pending' ORDER BY created_at, rowid LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    row.map(decode_row).transpose()
}

/// Take the earliest pending item and mark it `processing` in one statement.
///
/// A concurrent `clear` either removes the item before it is claimed, in
/// which case the next one is taken, or finds it already processing.
pub async fn claim_next(pool: &SqlitePool) -> Result<Option<QueueItem>> {
    let row: Option<ItemRow> = sqlx::query_as(&format!(
        "UPDATE queue_items SET status = 'processing', error = NULL, error_kind = NULL, updated_at = ?
         WHERE id = (
             SELECT id FROM queue_items WHERE status = 'pending' ORDER BY created_at, rowid LIMIT 1
         )
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(format_ts(stored_now()))
    .fetch_optional(pool)
    .await?;

    let item = row.map(decode_row).transpose()?;
    if let Some(item) = &item {
        tracing::debug!("Queue item {} claimed", item.id);
    }
    Ok(item)
}

/// Move an item to `status`.
///
/// Only `pending→processing`, `processing→completed`, `processing→failed` and
/// `failed→pending` are accepted. A `failed` target requires `failure`; any
/// other target clears the stored error.
///
/// # Errors
/// `ItemNotFound` for an unknown id, `InvalidTransition` for a disallowed move,
/// `Validation` for a failed status without a reason.
pub async fn set_status(
    pool: &SqlitePool,
    id: &QueueItemId,
    status: ItemStatus,
    failure: Option<ItemFailure>,
) -> Result<QueueItem> {
    let (error, kind) = match (status, failure) {
        (ItemStatus::Failed, Some(f)) => (Some(f.message), Some(f.kind.as_str())),
        (ItemStatus::Failed, None) => {
            return Err(DatabaseError::Validation(
                "a failed item requires an error message".to_string(),
            ))
        }
        _ => (None, None),
    };

    let mut tx = pool.begin().await?;
    let current = fetch_item(&mut *tx, id)
        .await?
        .ok_or_else(|| DatabaseError::ItemNotFound(id.to_string()))?;

    if !current.status.can_transition_to(status) {
        return Err(DatabaseError::InvalidTransition {
            id: id.to_string(),
            from: current.status,
            to: status,
        });
    }

    let updated_at = stored_now();
    sqlx::query(
        "UPDATE queue_items SET status = ?, error = ?, error_kind = ?, updated_at = ?
         WHERE id = ? AND status = ?",
    )
    .bind(status.as_str())
    .bind(&error)
    .bind(kind)
    .bind(format_ts(updated_at))
    .bind(id.as_str())
    .bind(current.status.as_str())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::debug!("Queue item {} {} -> {}", id, current.status, status);

    Ok(QueueItem {
        status,
        error,
        error_kind: kind.and_then(|k| k.parse().ok()),
        updated_at,
        ..current
    })
}

/// Return failed items to `pending`: all of them, or only `ids`.
///
/// Ids that are unknown or not failed are ignored. Returns how many moved.
pub async fn retry_failed(pool: &SqlitePool, ids: Option<&[QueueItemId]>) -> Result<u32> {
    let now = format_ts(stored_now());
    let reset = "UPDATE queue_items SET status = 'pending', error = NULL, error_kind = NULL, updated_at = ?
                 WHERE status = 'failed'";

    let moved = match ids {
        None => {
            sqlx::query(reset)
                .bind(&now)
                .execute(pool)
                .await?
                .rows_affected()
        }
        Some(ids) => {
            let mut tx = pool.begin().await?;
            let mut moved = 0;
            for id in ids {
                moved += sqlx::query(&format!("{reset} AND id = ?"))
                    .bind(&now)
                    .bind(id.as_str())
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            }
            tx.commit().await?;
            moved
        }
    };

    let moved = u32::try_from(moved).unwrap_or(u32::MAX);
    tracing::info!("Retrying {} failed queue items", moved);
    Ok(moved)
}

/// Return items stranded in `processing` to `pending`.
///
/// Only valid at startup, before any processor runs.
pub async fn recover_interrupted(pool: &SqlitePool) -> Result<u32> {
    let moved = sqlx::query(
        "UPDATE queue_items SET status = 'pending', error = NULL, error_kind = NULL, updated_at = ?
         WHERE status = 'processing'",
    )
    .bind(format_ts(stored_now()))
    .execute(pool)
    .await?
    .rows_affected();

    let moved = u32::try_from(moved).unwrap_or(u32::MAX);
    if moved > 0 {
        tracing::warn!("Recovered {} interrupted queue items", moved);
    }
    Ok(moved)
}

/// Remove items with status `filter`, or all items if `filter` is `None`.
///
/// `confirm` sees the plan before anything is deleted and may decline.
/// Items in `processing` are never removed: clearing that status, or
/// clearing everything while any item is processing, is refused.
///
/// # Errors
/// `ClearRefused` when the request would touch processing items.
pub async fn clear<F>(pool: &SqlitePool, filter: Option<ItemStatus>, confirm: F) -> Result<ClearOutcome>
where
    F: FnOnce(&ClearPlan) -> bool,
{
    if filter == Some(ItemStatus::Processing) {
        return Err(DatabaseError::ClearRefused(
            "cannot clear items that are processing; pause the processor first".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let processing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE status = 'processing'")
            .fetch_one(&mut *tx)
            .await?;
    if filter.is_none() && processing > 0 {
        return Err(DatabaseError::ClearRefused(
            "cannot clear the queue while an item is processing; pause the processor first"
                .to_string(),
        ));
    }

    let matching: i64 = match filter {
        Some(status) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM queue_items WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&mut *tx)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM queue_items")
                .fetch_one(&mut *tx)
                .await?
        }
    };

    let plan = ClearPlan {
        filter,
        matching: u32::try_from(matching).unwrap_or(u32::MAX),
    };
    if plan.matching == 0 {
        return Ok(ClearOutcome::Removed(0));
    }
    if !confirm(&plan) {
        tracing::debug!("Clear of {} items declined", plan.matching);
        return Ok(ClearOutcome::Declined);
    }

    let removed = match filter {
        Some(status) => {
            sqlx::query("DELETE FROM queue_items WHERE status = ?")
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?
        }
        None => sqlx::query("DELETE FROM queue_items").execute(&mut *tx).await?,
    }
    .rows_affected();
    tx.commit().await?;

    let removed = u32::try_from(removed).unwrap_or(u32::MAX);
    tracing::info!(
        "Cleared {} queue items (filter: {})",
        removed,
        filter.map_or("all", |s| s.as_str())
    );
    Ok(ClearOutcome::Removed(removed))
}
