//! Share registry: the lifecycle of a shared pantry item.
//!
//! ```text
//! available ──request──▶ requested ──complete──▶ completed
//!     │                                   ▲
//!     ├──────────────complete─────────────┘
//!     └──withdraw──▶ (deleted)
//! ```
//!
//! Every transition is a guarded write: the `UPDATE` carries the expected
//! current status in its `WHERE` clause and zero affected rows means another
//! writer got there first.

use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::db::{parse_date, parse_status, parse_timestamp, parse_uuid, Filter, PantryRepository};
use crate::error::{Entity, Result, ShareError};
use crate::feed::{ChangeFeed, ChangeKind, FeedPublisher, Table};
use crate::models::{AvailableShare, PantryItem, ShareStatus, SharedItem};
use crate::neighbors::CandidateSet;

const TABLE: &str = "shared_items";

#[derive(Clone)]
pub struct ShareRegistry {
    pool: SqlitePool,
    pantry: PantryRepository,
    feed: FeedPublisher,
}

#[derive(sqlx::FromRow)]
struct SharedItemRow {
    id: String,
    item_id: String,
    user_id: String,
    status: String,
    offered_at: String,
}

#[derive(sqlx::FromRow)]
struct AvailableShareRow {
    #[sqlx(flatten)]
    share: SharedItemRow,
    name: String,
    quantity: f64,
    expiration_date: Option<String>,
}

impl TryFrom<SharedItemRow> for SharedItem {
    type Error = ShareError;

    fn try_from(row: SharedItemRow) -> Result<Self> {
        Ok(SharedItem {
            id: parse_uuid(TABLE, &row.id)?,
            item_id: parse_uuid(TABLE, &row.item_id)?,
            owner_id: parse_uuid(TABLE, &row.user_id)?,
            status: parse_status(TABLE, &row.status)?,
            offered_at: parse_timestamp(&row.offered_at),
        })
    }
}

impl ShareRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pantry: PantryRepository::new(pool.clone()),
            pool,
            feed: FeedPublisher::default(),
        }
    }

    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = FeedPublisher::new(Some(feed));
        self
    }

    /// Publishes a pantry item for neighbors to claim.
    pub async fn publish(&self, item_id: Uuid, owner_id: Uuid) -> Result<SharedItem> {
        let item = self
            .pantry
            .get(item_id)
            .await?
            .ok_or_else(|| ShareError::not_found(Entity::PantryItem, item_id))?;
        if item.owner_id != owner_id {
            return Err(ShareError::Forbidden(format!(
                "pantry item {} belongs to another user",
                item_id
            )));
        }
        if self.active_for_item(item_id).await?.is_some() {
            return Err(ShareError::AlreadyShared(item_id));
        }

        let share = SharedItem::new(item_id, owner_id);
        let inserted = sqlx::query(
            "INSERT INTO shared_items (id, item_id, user_id, status, offered_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(share.id.to_string())
        .bind(share.item_id.to_string())
        .bind(share.owner_id.to_string())
        .bind(share.status.as_str())
        .bind(share.offered_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => {}
            // Lost a race with a concurrent publish of the same item
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ShareError::AlreadyShared(item_id));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Shared item {} ({}) as {}", item.name, item_id, share.id);
        self.feed.emit(Table::SharedItems, ChangeKind::Insert, share.id);
        Ok(share)
    }

    /// Available shares owned by a candidate, closest owner first.
    ///
    /// Shares whose pantry item no longer exists are left out.
    pub async fn list_available(&self, candidates: &CandidateSet) -> Result<Vec<AvailableShare>> {
        let filter = Filter::all(vec![
            Filter::eq("s.status", ShareStatus::Available.as_str()),
            Filter::in_list("s.user_id", candidates.ids()),
        ]);
        let mut query = filter.query(
            "SELECT s.id, s.item_id, s.user_id, s.status, s.offered_at, p.name, p.quantity, p.expiration_date \
             FROM shared_items s JOIN pantry_items p ON p.id = s.item_id",
        );
        query.push(" ORDER BY s.offered_at DESC");
        let rows: Vec<AvailableShareRow> = query.build_query_as().fetch_all(&self.pool).await?;

        let mut shares = Vec::with_capacity(rows.len());
        for row in rows {
            let share = SharedItem::try_from(row.share)?;
            let distance_km = candidates.distance_to(share.owner_id);
            shares.push(AvailableShare {
                share,
                name: row.name,
                quantity: row.quantity,
                expiration_date: parse_date(row.expiration_date.as_deref()),
                distance_km,
            });
        }
        shares.sort_by(|a, b| {
            let da = a.distance_km.unwrap_or(f64::MAX);
            let db = b.distance_km.unwrap_or(f64::MAX);
            da.total_cmp(&db)
        });

        tracing::debug!(
            "{} available share(s) among {} candidate(s)",
            shares.len(),
            candidates.len()
        );
        Ok(shares)
    }

    /// Claims an available share. Fails with `NotAvailable` if someone else
    /// already did.
    pub async fn request(&self, shared_item_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE shared_items SET status = 'requested' WHERE id = ? AND status = 'available'",
        )
        .bind(shared_item_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_failed_transition(shared_item_id).await);
        }

        tracing::info!("Shared item {} requested", shared_item_id);
        self.feed
            .emit(Table::SharedItems, ChangeKind::Update, shared_item_id);
        Ok(())
    }

    /// Marks a share as handed over. Used by the offer acceptance cascade.
    pub async fn complete(&self, shared_item_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE shared_items SET status = 'completed' WHERE id = ? AND status IN ('available', 'requested')",
        )
        .bind(shared_item_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_failed_transition(shared_item_id).await);
        }

        tracing::info!("Shared item {} completed", shared_item_id);
        self.feed
            .emit(Table::SharedItems, ChangeKind::Update, shared_item_id);
        Ok(())
    }

    /// Removes an available share. Only its owner may do this.
    pub async fn withdraw(&self, shared_item_id: Uuid, owner_id: Uuid) -> Result<()> {
        let share = self
            .get(shared_item_id)
            .await?
            .ok_or_else(|| ShareError::not_found(Entity::SharedItem, shared_item_id))?;
        if share.owner_id != owner_id {
            return Err(ShareError::Forbidden(format!(
                "shared item {} belongs to another user",
                shared_item_id
            )));
        }

        let result = sqlx::query(
            "DELETE FROM shared_items WHERE id = ? AND user_id = ? AND status = 'available'",
        )
        .bind(shared_item_id.to_string())
        .bind(owner_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.explain_failed_transition(shared_item_id).await);
        }

        tracing::info!("Shared item {} withdrawn", shared_item_id);
        self.feed
            .emit(Table::SharedItems, ChangeKind::Delete, shared_item_id);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SharedItem>> {
        let row: Option<SharedItemRow> = sqlx::query_as("SELECT * FROM shared_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SharedItem::try_from).transpose()
    }

    /// The available or requested share of a pantry item, if any.
    pub async fn active_for_item(&self, item_id: Uuid) -> Result<Option<SharedItem>> {
        let row: Option<SharedItemRow> = sqlx::query_as(
            "SELECT * FROM shared_items WHERE item_id = ? AND status IN ('available', 'requested')",
        )
        .bind(item_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(SharedItem::try_from).transpose()
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<SharedItem>> {
        let rows: Vec<SharedItemRow> =
            sqlx::query_as("SELECT * FROM shared_items WHERE user_id = ? ORDER BY offered_at DESC")
                .bind(owner_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(SharedItem::try_from).collect()
    }

    /// Pantry items of `owner_id` that are not currently shared.
    pub async fn shareable_items(&self, owner_id: Uuid) -> Result<Vec<PantryItem>> {
        let active: HashSet<Uuid> = self
            .list_for_owner(owner_id)
            .await?
            .into_iter()
            .filter(|s| s.status.is_active())
            .map(|s| s.item_id)
            .collect();

        Ok(self
            .pantry
            .list_for_owner(owner_id)
            .await?
            .into_iter()
            .filter(|item| !active.contains(&item.id))
            .collect())
    }

    /// Works out why a guarded write touched no row.
    async fn explain_failed_transition(&self, id: Uuid) -> ShareError {
        match self.get(id).await {
            Ok(Some(_)) => ShareError::NotAvailable(id),
            Ok(None) => ShareError::not_found(Entity::SharedItem, id),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{test_db, TestDb};
    use crate::neighbors::{Neighbor, SearchRadius};
    use std::sync::Arc;

    struct TestContext {
        registry: ShareRegistry,
        pantry: PantryRepository,
        _db: TestDb,
    }

    async fn setup() -> TestContext {
        let db = test_db().await;
        TestContext {
            registry: ShareRegistry::new(db.pool.clone()),
            pantry: PantryRepository::new(db.pool.clone()),
            _db: db,
        }
    }

    fn candidates(neighbors: &[(Uuid, f64)]) -> CandidateSet {
        CandidateSet::new(
            None,
            SearchRadius::Km5,
            neighbors
                .iter()
                .map(|(user_id, distance_km)| Neighbor {
                    user_id: *user_id,
                    distance_km: *distance_km,
                })
                .collect(),
        )
    }

    async fn pantry_item(ctx: &TestContext, owner: Uuid, name: &str) -> PantryItem {
        ctx.pantry
            .create(&PantryItem::new(owner, name))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_publish_creates_available_share() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Lentils").await;

        let share = ctx.registry.publish(item.id, owner).await.unwrap();
        assert_eq!(share.status, ShareStatus::Available);

        let fetched = ctx.registry.get(share.id).await.unwrap().unwrap();
        assert_eq!(fetched, share);
    }

    #[tokio::test]
    async fn test_publish_twice_is_already_shared() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Lentils").await;

        ctx.registry.publish(item.id, owner).await.unwrap();
        let err = ctx.registry.publish(item.id, owner).await.unwrap_err();
        assert!(matches!(err, ShareError::AlreadyShared(id) if id == item.id));
    }

    #[tokio::test]
    async fn test_publish_requires_ownership() {
        let ctx = setup().await;
        let item = pantry_item(&ctx, Uuid::new_v4(), "Lentils").await;

        let err = ctx.registry.publish(item.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ShareError::Forbidden(_)));

        let err = ctx
            .registry
            .publish(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::NotFound {
                entity: Entity::PantryItem,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_publish_keeps_single_active_share() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Flour").await;

        let registry = Arc::new(ctx.registry.clone());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.publish(item.id, owner).await }));
        }

        let mut ok = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(ShareError::AlreadyShared(_)) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 1);

        let active: Vec<_> = ctx
            .registry
            .list_for_owner(owner)
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.status.is_active())
            .collect();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_republish_after_completion() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Eggs").await;

        let first = ctx.registry.publish(item.id, owner).await.unwrap();
        ctx.registry.complete(first.id).await.unwrap();

        let second = ctx.registry.publish(item.id, owner).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_request_is_guarded() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Bread").await;
        let share = ctx.registry.publish(item.id, owner).await.unwrap();

        ctx.registry.request(share.id).await.unwrap();
        let err = ctx.registry.request(share.id).await.unwrap_err();
        assert!(matches!(err, ShareError::NotAvailable(_)));

        let err = ctx.registry.request(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ShareError::NotFound { .. }));

        let fetched = ctx.registry.get(share.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ShareStatus::Requested);
    }

    #[tokio::test]
    async fn test_racing_requests_one_wins() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Bread").await;
        let share = ctx.registry.publish(item.id, owner).await.unwrap();

        let (a, b) = tokio::join!(ctx.registry.request(share.id), ctx.registry.request(share.id));
        assert!(a.is_ok() ^ b.is_ok());
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(ShareError::NotAvailable(_))));
    }

    #[tokio::test]
    async fn test_complete_from_requested_and_twice() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Rice").await;
        let share = ctx.registry.publish(item.id, owner).await.unwrap();

        ctx.registry.request(share.id).await.unwrap();
        ctx.registry.complete(share.id).await.unwrap();
        assert_eq!(
            ctx.registry.get(share.id).await.unwrap().unwrap().status,
            ShareStatus::Completed
        );

        let err = ctx.registry.complete(share.id).await.unwrap_err();
        assert!(matches!(err, ShareError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_withdraw_rules() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Pasta").await;
        let share = ctx.registry.publish(item.id, owner).await.unwrap();

        let err = ctx
            .registry
            .withdraw(share.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Forbidden(_)));

        ctx.registry.withdraw(share.id, owner).await.unwrap();
        assert!(ctx.registry.get(share.id).await.unwrap().is_none());

        // Requested shares can no longer be withdrawn
        let share = ctx.registry.publish(item.id, owner).await.unwrap();
        ctx.registry.request(share.id).await.unwrap();
        let err = ctx.registry.withdraw(share.id, owner).await.unwrap_err();
        assert!(matches!(err, ShareError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_list_available_scoped_to_candidates() {
        let ctx = setup().await;
        let near = Uuid::new_v4();
        let nearer = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let a = pantry_item(&ctx, near, "Apples").await;
        let b = pantry_item(&ctx, nearer, "Beans").await;
        let c = pantry_item(&ctx, stranger, "Corn").await;
        let d = pantry_item(&ctx, near, "Dates").await;
        ctx.registry.publish(a.id, near).await.unwrap();
        ctx.registry.publish(b.id, nearer).await.unwrap();
        ctx.registry.publish(c.id, stranger).await.unwrap();
        let requested = ctx.registry.publish(d.id, near).await.unwrap();
        ctx.registry.request(requested.id).await.unwrap();

        let set = candidates(&[(nearer, 0.4), (near, 1.2)]);
        let shares = ctx.registry.list_available(&set).await.unwrap();
        let names: Vec<&str> = shares.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Beans", "Apples"]);
        assert_eq!(shares[0].distance_km, Some(0.4));

        let none = ctx
            .registry
            .list_available(&CandidateSet::empty(SearchRadius::Km1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_available_skips_deleted_pantry_items() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let item = pantry_item(&ctx, owner, "Soup").await;
        ctx.registry.publish(item.id, owner).await.unwrap();
        ctx.pantry.delete(item.id).await.unwrap();

        let shares = ctx
            .registry
            .list_available(&candidates(&[(owner, 1.0)]))
            .await
            .unwrap();
        assert!(shares.is_empty());
    }

    #[tokio::test]
    async fn test_shareable_items_excludes_active_shares() {
        let ctx = setup().await;
        let owner = Uuid::new_v4();
        let shared = pantry_item(&ctx, owner, "Oats").await;
        let free = pantry_item(&ctx, owner, "Tea").await;
        ctx.registry.publish(shared.id, owner).await.unwrap();

        let items = ctx.registry.shareable_items(owner).await.unwrap();
        let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![free.id]);
    }

    #[tokio::test]
    async fn test_mutations_are_announced() {
        let db = test_db().await;
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe();
        let registry = ShareRegistry::new(db.pool.clone()).with_feed(feed);
        let owner = Uuid::new_v4();
        let item = PantryRepository::new(db.pool.clone())
            .create(&PantryItem::new(owner, "Milk"))
            .await
            .unwrap();

        let share = registry.publish(item.id, owner).await.unwrap();
        registry.withdraw(share.id, owner).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Insert);
        assert_eq!(second.kind, ChangeKind::Delete);
        assert_eq!(second.row_id, Some(share.id));
    }
}
