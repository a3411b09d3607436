//! Keeps a viewer's neighborhood snapshot fresh.
//!
//! The bridge is a background task. It listens to the [`ChangeFeed`] and to
//! a control channel, marks tables dirty and refetches each dirty table once.
//! Readers get whole snapshots through a `watch` channel and never see a
//! half-updated view.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{ChangeEvent, ChangeFeed, Table};
use crate::board::RequestBoard;
use crate::error::{Result, ShareError};
use crate::matcher::OfferMatcher;
use crate::models::{AvailableShare, FoodRequest, FoodRequestOffer};
use crate::neighbors::CandidateSet;
use crate::registry::ShareRegistry;

/// What a viewer sees around them.
#[derive(Debug, Clone, Default)]
pub struct NeighborhoodView {
    /// Available shares of candidates, closest first.
    pub shares: Arc<Vec<AvailableShare>>,
    /// Active requests of candidates, newest first.
    pub requests: Arc<Vec<FoodRequest>>,
    /// Offers made on the viewer's own requests.
    pub offers: Arc<Vec<FoodRequestOffer>>,
    /// Bumped on every published snapshot.
    pub generation: u64,
}

#[derive(Debug)]
pub enum BridgeCommand {
    Invalidate(Table),
    InvalidateAll,
    /// Swap in a new candidate set, e.g. after a radius change.
    SetCandidates(CandidateSet),
    Shutdown,
}

pub struct BridgeHandle {
    view: watch::Receiver<NeighborhoodView>,
    control: mpsc::Sender<BridgeCommand>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// The latest snapshot.
    pub fn view(&self) -> NeighborhoodView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NeighborhoodView> {
        self.view.clone()
    }

    pub async fn invalidate(&self, table: Table) -> Result<()> {
        self.send(BridgeCommand::Invalidate(table)).await
    }

    pub async fn invalidate_all(&self) -> Result<()> {
        self.send(BridgeCommand::InvalidateAll).await
    }

    pub async fn set_candidates(&self, candidates: CandidateSet) -> Result<()> {
        self.send(BridgeCommand::SetCandidates(candidates)).await
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.control.send(BridgeCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!("Change feed bridge task failed: {}", e);
        }
    }

    async fn send(&self, command: BridgeCommand) -> Result<()> {
        self.control
            .send(command)
            .await
            .map_err(|_| ShareError::BridgeClosed)
    }
}

pub struct ChangeFeedBridge {
    registry: ShareRegistry,
    board: RequestBoard,
    matcher: OfferMatcher,
    viewer: Option<Uuid>,
    candidates: CandidateSet,
    view: NeighborhoodView,
    publish: watch::Sender<NeighborhoodView>,
}

impl ChangeFeedBridge {
    /// Starts the bridge. The first snapshot is fetched right away.
    pub fn spawn(
        feed: &ChangeFeed,
        registry: ShareRegistry,
        board: RequestBoard,
        matcher: OfferMatcher,
        viewer: Option<Uuid>,
        candidates: CandidateSet,
    ) -> BridgeHandle {
        let events = feed.subscribe();
        let (control_tx, control_rx) = mpsc::channel(16);
        let (view_tx, view_rx) = watch::channel(NeighborhoodView::default());

        let bridge = ChangeFeedBridge {
            registry,
            board,
            matcher,
            viewer,
            candidates,
            view: NeighborhoodView::default(),
            publish: view_tx,
        };
        let task = tokio::spawn(bridge.run(events, control_rx));

        BridgeHandle {
            view: view_rx,
            control: control_tx,
            task,
        }
    }

    async fn run(
        mut self,
        mut events: broadcast::Receiver<ChangeEvent>,
        mut control: mpsc::Receiver<BridgeCommand>,
    ) {
        let mut dirty: BTreeSet<Table> = Table::ALL.into_iter().collect();
        let mut feed_open = true;

        loop {
            if !dirty.is_empty() {
                self.refresh(&mut dirty).await;
            }

            tokio::select! {
                event = events.recv(), if feed_open => match event {
                    Ok(event) => {
                        dirty.insert(event.table);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Change feed lagged by {} event(s), refetching everything", skipped);
                        dirty.extend(Table::ALL);
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Change feed closed");
                        feed_open = false;
                    }
                },
                command = control.recv() => match command {
                    Some(BridgeCommand::Invalidate(table)) => {
                        dirty.insert(table);
                    }
                    Some(BridgeCommand::InvalidateAll) => dirty.extend(Table::ALL),
                    Some(BridgeCommand::SetCandidates(candidates)) => {
                        tracing::debug!(
                            "Candidates changed: {} user(s) within {}",
                            candidates.len(),
                            candidates.radius
                        );
                        self.candidates = candidates;
                        dirty.insert(Table::SharedItems);
                        dirty.insert(Table::FoodRequests);
                    }
                    Some(BridgeCommand::Shutdown) | None => break,
                },
            }

            // Coalesce whatever else is already queued
            while feed_open {
                match events.try_recv() {
                    Ok(event) => {
                        dirty.insert(event.table);
                    }
                    Err(TryRecvError::Lagged(_)) => dirty.extend(Table::ALL),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Closed) => feed_open = false,
                }
            }
        }

        tracing::debug!("Change feed bridge stopped");
    }

    /// Refetches every dirty table and publishes one snapshot if any
    /// refetch succeeded. A failed table keeps its previous rows.
    async fn refresh(&mut self, dirty: &mut BTreeSet<Table>) {
        let mut changed = false;

        for table in std::mem::take(dirty) {
            let result = match table {
                Table::SharedItems => self
                    .registry
                    .list_available(&self.candidates)
                    .await
                    .map(|rows| self.view.shares = Arc::new(rows)),
                Table::FoodRequests => self
                    .board
                    .list_active_for(&self.candidates)
                    .await
                    .map(|rows| self.view.requests = Arc::new(rows)),
                Table::FoodRequestOffers => match self.viewer {
                    Some(viewer) => self
                        .matcher
                        .offers_for_requester(viewer)
                        .await
                        .map(|rows| self.view.offers = Arc::new(rows)),
                    None => Ok(()),
                },
            };

            match result {
                Ok(()) => changed = true,
                Err(e) => tracing::warn!("Refetch of {} failed, keeping old rows: {}", table, e),
            }
        }

        if changed {
            self.view.generation += 1;
            self.publish.send_replace(self.view.clone());
        }
    }
}
