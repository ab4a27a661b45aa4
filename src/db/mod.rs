//! Ban database.
//!
//! Async SQLite access through SQLx. The database holds permanent local
//! reservations so they survive restarts; everything else is in-memory.

mod bans;

pub use bans::{BanRepository, ResvRow};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a new database connection, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let options = if path == ":memory:" {
            // Shared cache keeps the pool's connections on one database;
            // the serial keeps separate handles (tests) apart.
            static MEMORY_SERIAL: std::sync::atomic::AtomicU64 =
                std::sync::atomic::AtomicU64::new(0);
            let serial = MEMORY_SERIAL.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            SqliteConnectOptions::new()
                .filename(format!("file:corvidd-mem-{serial}?mode=memory&cache=shared"))
                .shared_cache(true)
                .create_if_missing(true)
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };

        // One connection is always kept; an in-memory database lives
        // only as long as some connection holds it open.
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .acquire_timeout(Self::ACQUIRE_TIMEOUT)
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        info!(path = %path, "Ban database connected");

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run the embedded schema, statement by statement.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        let migration = include_str!("../../migrations/001_init.sql");
        for statement in migration.split(';') {
            let sql: String = statement
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");
            if sql.is_empty() {
                continue;
            }
            sqlx::query(&sql).execute(pool).await?;
        }
        Ok(())
    }

    /// Get ban repository.
    pub fn bans(&self) -> BanRepository<'_> {
        BanRepository::new(&self.pool)
    }
}
