//! Notices commits made by other connections or processes.
//!
//! SQLite bumps `PRAGMA data_version` on a connection whenever another
//! connection commits to the same database file. The poller keeps one
//! connection of its own and turns a changed value into an external
//! invalidation of every watched table.

use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{ChangeEvent, ChangeFeed, Table};
use crate::error::Result;

pub struct DataVersionPoller {
    conn: SqliteConnection,
    feed: ChangeFeed,
    every: Duration,
    last: i64,
}

impl DataVersionPoller {
    /// Takes a connection out of `pool` for the poller's lifetime.
    pub async fn new(pool: &SqlitePool, feed: ChangeFeed, every: Duration) -> Result<Self> {
        let mut conn = pool.acquire().await?.detach();
        let last = data_version(&mut conn).await?;
        Ok(Self {
            conn,
            feed,
            every,
            last,
        })
    }

    /// Checks once. Returns whether anything was committed since the last
    /// check.
    pub async fn poll_once(&mut self) -> Result<bool> {
        let version = data_version(&mut self.conn).await?;
        if version == self.last {
            return Ok(false);
        }

        tracing::debug!("data_version {} -> {}", self.last, version);
        self.last = version;
        for table in Table::ALL {
            self.feed.publish(ChangeEvent::external(table));
        }
        Ok(true)
    }

    /// Polls until the returned task is aborted.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.every);
            loop {
                ticker.tick().await;
                if let Err(e) = self.poll_once().await {
                    tracing::warn!("Polling for external changes failed: {}", e);
                }
            }
        })
    }
}

async fn data_version(conn: &mut SqliteConnection) -> Result<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA data_version")
        .fetch_one(conn)
        .await?;
    Ok(version)
}
