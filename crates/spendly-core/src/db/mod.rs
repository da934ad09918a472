//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `users` - WhatsApp users and the onboarding flag
//! - `expenses` - Expense recording and queries
//! - `budgets` - Budget envelopes per category and period

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::Result;

mod budgets;
mod expense_filter;
mod expenses;
mod users;

pub use expense_filter::{ExpenseFilter, FilterResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Storage format for timestamps. Fixed width so text comparison orders correctly.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Format a timestamp for storage
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse the stored timestamp read from `column`
///
/// A value in neither format fails the row instead of landing in every
/// current window.
pub(crate) fn parse_datetime(s: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    // Rows written by CURRENT_TIMESTAMP have no fractional part
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| dt.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) the database at `path` and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "spendly_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the webhook writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Users (one per WhatsApp number)
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                phone_number TEXT NOT NULL UNIQUE,
                name TEXT,
                is_first_time BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL
            );

            -- Expenses
            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                amount REAL NOT NULL DEFAULT 0,
                category TEXT NOT NULL DEFAULT 'Uncategorized',
                description TEXT,
                source TEXT NOT NULL DEFAULT 'whatsapp',   -- whatsapp, manual, image
                raw_text TEXT,
                image_url TEXT,
                structured_data TEXT,                      -- JSON of the extraction payload
                created_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_user_created ON expenses(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses(category);

            -- Budgets (one row per active period instance)
            CREATE TABLE IF NOT EXISTS budgets (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                period TEXT NOT NULL,                      -- daily, weekly, monthly
                start_date DATETIME NOT NULL,
                end_date DATETIME NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                alert_threshold REAL NOT NULL DEFAULT 0.8,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_budgets_user_active ON budgets(user_id, is_active);
            -- At most one active budget per window
            CREATE UNIQUE INDEX IF NOT EXISTS idx_budgets_active_window
                ON budgets(user_id, category, period, start_date) WHERE is_active = 1;
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}
