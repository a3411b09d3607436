//! Wires the components together over one pool and one change feed.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::board::RequestBoard;
use crate::config::{Config, NeighborsConfig};
use crate::db::{init_db, LocationRepository, PantryRepository};
use crate::error::Result;
use crate::feed::{BridgeHandle, ChangeFeed, ChangeFeedBridge, DataVersionPoller};
use crate::matcher::OfferMatcher;
use crate::neighbors::{NearbyUsersClient, NeighborLocator, SearchRadius};
use crate::notify::SqliteNotificationSink;
use crate::registry::ShareRegistry;

#[derive(Clone)]
pub struct Engine {
    pub pool: SqlitePool,
    pub feed: ChangeFeed,
    pub locations: LocationRepository,
    pub pantry: PantryRepository,
    pub locator: NeighborLocator,
    pub registry: ShareRegistry,
    pub board: RequestBoard,
    pub matcher: OfferMatcher,
    pub notifications: SqliteNotificationSink,
}

impl Engine {
    /// Opens the configured database and builds every component.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = init_db(&config.database_path.value).await?;
        Ok(Self::new(pool, &config.neighbors))
    }

    pub fn new(pool: SqlitePool, neighbors: &NeighborsConfig) -> Self {
        let feed = ChangeFeed::new();
        let locations = LocationRepository::new(pool.clone());

        let mut locator = NeighborLocator::new(locations.clone());
        if let Some(url) = &neighbors.url {
            tracing::debug!("Using remote neighbor lookup at {}", url);
            locator = locator.with_remote(NearbyUsersClient::new(
                url.clone(),
                neighbors.api_key.clone(),
            ));
        }

        let registry = ShareRegistry::new(pool.clone()).with_feed(feed.clone());
        let board = RequestBoard::new(pool.clone()).with_feed(feed.clone());
        let notifications = SqliteNotificationSink::new(pool.clone());
        let matcher = OfferMatcher::new(
            pool.clone(),
            board.clone(),
            registry.clone(),
            Arc::new(notifications.clone()),
        )
        .with_feed(feed.clone());

        Self {
            pantry: PantryRepository::new(pool.clone()),
            pool,
            feed,
            locations,
            locator,
            registry,
            board,
            matcher,
            notifications,
        }
    }

    /// Starts a live neighborhood view for `viewer`.
    pub async fn watch(&self, viewer: Uuid, radius: SearchRadius) -> Result<BridgeHandle> {
        let candidates = self.locator.find_neighbors_of(viewer, radius).await?;
        Ok(ChangeFeedBridge::spawn(
            &self.feed,
            self.registry.clone(),
            self.board.clone(),
            self.matcher.clone(),
            Some(viewer),
            candidates,
        ))
    }

    /// Poller that turns commits from other processes into feed events.
    pub async fn external_changes(&self, every: Duration) -> Result<DataVersionPoller> {
        DataVersionPoller::new(&self.pool, self.feed.clone(), every).await
    }
}
