//! Change feed.
//!
//! Every mutation of a shared item, request or offer is announced on a
//! [`ChangeFeed`], whether it happened in this process or somewhere else.
//! Events carry no row content: consumers treat them as "this table changed,
//! refetch it". Duplicates and reordering are therefore harmless.

mod bridge;
mod poller;

pub use bridge::{BridgeCommand, BridgeHandle, ChangeFeedBridge, NeighborhoodView};
pub use poller::DataVersionPoller;

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Tables whose changes are announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    SharedItems,
    FoodRequests,
    FoodRequestOffers,
}

impl Table {
    pub const ALL: [Table; 3] = [
        Table::SharedItems,
        Table::FoodRequests,
        Table::FoodRequestOffers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::SharedItems => "shared_items",
            Table::FoodRequests => "food_requests",
            Table::FoodRequestOffers => "food_request_offers",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row_id: Option<Uuid>,
    pub origin: Origin,
}

impl ChangeEvent {
    pub fn local(table: Table, kind: ChangeKind, row_id: Uuid) -> Self {
        Self {
            table,
            kind,
            row_id: Some(row_id),
            origin: Origin::Local,
        }
    }

    /// A change made elsewhere, where only the table is known.
    pub fn external(table: Table) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            row_id: None,
            origin: Origin::External,
        }
    }
}

/// Broadcast hub for change events.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ChangeEvent) {
        tracing::trace!(
            "change {:?} on {} ({:?})",
            event.kind,
            event.table,
            event.origin
        );
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes to an optional feed. Components hold one of these so they can
/// run without a feed in tests and one-shot CLI commands.
#[derive(Clone, Default)]
pub(crate) struct FeedPublisher(Option<ChangeFeed>);

impl FeedPublisher {
    pub(crate) fn new(feed: Option<ChangeFeed>) -> Self {
        Self(feed)
    }

    pub(crate) fn emit(&self, table: Table, kind: ChangeKind, row_id: Uuid) {
        if let Some(feed) = &self.0 {
            feed.publish(ChangeEvent::local(table, kind, row_id));
        }
    }
}
