//! Persistence of the hourly and daily import counters.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use promtitude_scheduler::{RateWindow, WindowCounter, WindowSpan};
use sqlx::{SqliteConnection, SqlitePool};

async fn load_counter(
    conn: &mut SqliteConnection,
    span: WindowSpan,
    now: DateTime<Utc>,
) -> Result<WindowCounter> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT count, window_start FROM rate_counters WHERE span = ?")
            .bind(span.as_str())
            .fetch_optional(&mut *conn)
            .await?;

    let Some((count, window_start)) = row else {
        return Ok(WindowCounter::new(now));
    };

    let window_start = DateTime::parse_from_rfc3339(&window_start)
        .map_err(|e| DatabaseError::Decode(format!("invalid window_start '{window_start}': {e}")))?
        .with_timezone(&Utc);
    let count = u32::try_from(count)
        .map_err(|_| DatabaseError::Decode(format!("invalid {} count {count}", span.as_str())))?;

    Ok(WindowCounter {
        count,
        window_start,
    })
}

async fn save_counter(
    conn: &mut SqliteConnection,
    span: WindowSpan,
    counter: &WindowCounter,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO rate_counters (span, count, window_start) VALUES (?, ?, ?)
         ON CONFLICT(span) DO UPDATE SET count = excluded.count, window_start = excluded.window_start",
    )
    .bind(span.as_str())
    .bind(i64::from(counter.count))
    .bind(counter.window_start.to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Stored counters, or fresh ones starting at `now` if none were saved yet.
pub async fn load_rate_window(pool: &SqlitePool, now: DateTime<Utc>) -> Result<RateWindow> {
    let mut conn = pool.acquire().await?;
    Ok(RateWindow {
        hourly: load_counter(&mut conn, WindowSpan::Hourly, now).await?,
        daily: load_counter(&mut conn, WindowSpan::Daily, now).await?,
    })
}

pub async fn save_rate_window(pool: &SqlitePool, window: &RateWindow) -> Result<()> {
    let mut tx = pool.begin().await?;
    save_counter(&mut tx, WindowSpan::Hourly, &window.hourly).await?;
    save_counter(&mut tx, WindowSpan::Daily, &window.daily).await?;
    tx.commit().await?;
    Ok(())
}

/// Count one successful import and persist the result atomically.
pub async fn record_success(pool: &SqlitePool, now: DateTime<Utc>) -> Result<RateWindow> {
    let mut tx = pool.begin().await?;
    let mut window = RateWindow {
        hourly: load_counter(&mut tx, WindowSpan::Hourly, now).await?,
        daily: load_counter(&mut tx, WindowSpan::Daily, now).await?,
    };
    window.record_success(now);
    save_counter(&mut tx, WindowSpan::Hourly, &window.hourly).await?;
    save_counter(&mut tx, WindowSpan::Daily, &window.daily).await?;
    tx.commit().await?;

    tracing::debug!(
        "Import recorded: {} this hour, {} today",
        window.hourly.count,
        window.daily.count
    );
    Ok(window)
}
