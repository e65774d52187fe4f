//! SQLite pool construction.
//!
//! One writer at a time is plenty here: uploads and extraction write-backs
//! are short transactions, while listing/search/Q&A reads dominate. WAL
//! keeps readers unblocked during those writes, and a busy timeout absorbs
//! the occasional collision between a request and the background
//! extraction task instead of surfacing `SQLITE_BUSY`.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

const POOL_SIZE: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    // First run: the configured path may be in a directory that does not
    // exist yet
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT)
        // document_tags and qa_messages reference their parents
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(POOL_SIZE)
        .connect_with(options)
        .await?;

    Ok(pool)
}
