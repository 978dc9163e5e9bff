//! Persistence for the profile importer.
//!
//! A single `SQLite` database holds the import queue, the rate counters and
//! a small settings table. Migrations are embedded with `sqlx::migrate!` and
//! applied by [`Database::run_migrations`].
//!
//! # Example
//!
//! ```ignore
//! use promtitude_db::{queue, Database};
//!
//! let db = Database::open("queue.db").await?;
//! db.run_migrations().await?;
//! let next = queue::next_pending(db.pool()).await?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

pub mod connection;
pub mod error;
pub mod migrations;
pub mod queue;
pub mod rate_counters;
pub mod settings;

pub use error::{DatabaseError, Result};
pub use queue::{
    ClearOutcome, ClearPlan, EnqueueCandidate, EnqueueReport, ItemFailure, QueueItem,
    StatusCounts,
};

use sqlx::{Pool, Sqlite};
use std::path::Path;

/// Handle to the importer database. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (creating if missing) the database file at `path`.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let pool = connection::connect(path).await?;
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::open(connection::IN_MEMORY).await
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Run all pending database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(&self.pool).await
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::info!("Database pool closed");
    }
}
