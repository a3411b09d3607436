mod filter;
mod location_repo;
mod pantry_repo;

pub use filter::{Filter, Value};
pub use location_repo::LocationRepository;
pub use pantry_repo::PantryRepository;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, ShareError};

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ShareError::Storage(e.into()))?;
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::debug!("Opened database {}", path.display());
    Ok(pool)
}

pub(crate) fn parse_uuid(table: &'static str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| ShareError::corrupt(table, format!("{}: {}", value, e)))
}

pub(crate) fn parse_opt_uuid(table: &'static str, value: Option<&str>) -> Result<Option<Uuid>> {
    value.map(|v| parse_uuid(table, v)).transpose()
}

pub(crate) fn parse_status<T>(table: &'static str, value: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    T::from_str(value).map_err(|e| ShareError::corrupt(table, e))
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}
