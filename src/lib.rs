//! Pantry Share
//!
//! Neighborhood food sharing: find neighbors, share pantry items, post food
//! requests and settle offers on them.

pub mod board;
pub mod cascade;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod feed;
pub mod geo;
pub mod matcher;
pub mod models;
pub mod neighbors;
pub mod notify;
pub mod registry;

pub use board::{FulfillOutcome, RequestBoard};
pub use cascade::{run_cascade, CascadeReport, Criticality, Step, StepWarning};
pub use config::{Config, ConfigError};
pub use engine::Engine;
pub use error::{Entity, ErrorKind, Result, ShareError};
pub use feed::{ChangeEvent, ChangeFeed, ChangeFeedBridge, NeighborhoodView, Table};
pub use matcher::OfferMatcher;
pub use neighbors::{CandidateSet, Neighbor, NeighborLocator, SearchRadius};
pub use notify::{NotificationSink, SqliteNotificationSink, TracingNotificationSink};
pub use registry::ShareRegistry;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
