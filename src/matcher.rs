//! Offer matcher: neighbors answer food requests with offers, the requester
//! accepts one or declines them.
//!
//! Accepting an offer touches three tables without a transaction. The steps
//! run in a fixed order through [`run_cascade`]:
//!
//! | accept                    | on failure |
//! |---------------------------|------------|
//! | notify helper             | warn       |
//! | fulfill request           | abort      |
//! | mark offer accepted       | abort      |
//! | complete shared item      | abort      |
//! | delete other pending offers | warn     |
//!
//! The helper is told first so a crash later on still leaves them informed.
//! Two acceptances racing on the same request are settled by the guarded
//! write in [`RequestBoard::fulfill_for_offer`]: exactly one sees `Fulfilled`,
//! and only while its offer is still pending. Declining only deletes an offer
//! whose request is still active, so a fulfilled request keeps its accepted
//! offer.

use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::board::{FulfillOutcome, RequestBoard};
use crate::cascade::{run_cascade, CascadeReport, Step};
use crate::db::{parse_opt_uuid, parse_status, parse_timestamp, parse_uuid, Filter};
use crate::error::{Entity, Result, ShareError};
use crate::feed::{ChangeFeed, ChangeKind, FeedPublisher, Table};
use crate::models::{
    Decision, FoodRequest, FoodRequestOffer, NewNotification, NotificationType, OfferStatus,
    RequestStatus,
};
use crate::notify::NotificationSink;
use crate::registry::ShareRegistry;

const TABLE: &str = "food_request_offers";

#[derive(Clone)]
pub struct OfferMatcher {
    pool: SqlitePool,
    board: RequestBoard,
    registry: ShareRegistry,
    sink: Arc<dyn NotificationSink>,
    feed: FeedPublisher,
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: String,
    request_id: String,
    helper_id: String,
    message: String,
    shared_item_id: Option<String>,
    status: String,
    offered_at: String,
}

impl TryFrom<OfferRow> for FoodRequestOffer {
    type Error = ShareError;

    fn try_from(row: OfferRow) -> Result<Self> {
        Ok(FoodRequestOffer {
            id: parse_uuid(TABLE, &row.id)?,
            request_id: parse_uuid(TABLE, &row.request_id)?,
            helper_id: parse_uuid(TABLE, &row.helper_id)?,
            message: row.message,
            shared_item_id: parse_opt_uuid(TABLE, row.shared_item_id.as_deref())?,
            status: parse_status(TABLE, &row.status)?,
            offered_at: parse_timestamp(&row.offered_at),
        })
    }
}

impl OfferMatcher {
    pub fn new(
        pool: SqlitePool,
        board: RequestBoard,
        registry: ShareRegistry,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            pool,
            board,
            registry,
            sink,
            feed: FeedPublisher::default(),
        }
    }

    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = FeedPublisher::new(Some(feed));
        self
    }

    /// Offers to help with an active request.
    ///
    /// `shared_item_id` names one of the helper's active shares to hand over.
    /// When it is absent and the request was made for one of the helper's
    /// pantry items, the helper's active share of that item is attached.
    pub async fn make_offer(
        &self,
        request_id: Uuid,
        helper_id: Uuid,
        message: &str,
        shared_item_id: Option<Uuid>,
    ) -> Result<FoodRequestOffer> {
        let request = self.require_request(request_id).await?;
        if request.requester_id == helper_id {
            return Err(ShareError::SelfOffer);
        }
        if request.status != RequestStatus::Active {
            return Err(ShareError::RequestNotActive(request_id));
        }

        let shared_item_id = match shared_item_id {
            Some(id) => {
                let share = self
                    .registry
                    .get(id)
                    .await?
                    .ok_or_else(|| ShareError::not_found(Entity::SharedItem, id))?;
                if share.owner_id != helper_id {
                    return Err(ShareError::Forbidden(format!(
                        "shared item {} belongs to another user",
                        id
                    )));
                }
                if !share.status.is_active() {
                    return Err(ShareError::NotAvailable(id));
                }
                Some(id)
            }
            None => match (request.related_sharer_id, request.related_item_id) {
                (Some(sharer), Some(item_id)) if sharer == helper_id => self
                    .registry
                    .active_for_item(item_id)
                    .await?
                    .map(|share| share.id),
                _ => None,
            },
        };

        let mut offer = FoodRequestOffer::new(request_id, helper_id, message);
        offer.shared_item_id = shared_item_id;

        let result = sqlx::query(
            r#"
            INSERT INTO food_request_offers (id, request_id, helper_id, message, shared_item_id, status, offered_at)
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM food_requests WHERE id = ? AND status = 'active')
            "#,
        )
        .bind(offer.id.to_string())
        .bind(offer.request_id.to_string())
        .bind(offer.helper_id.to_string())
        .bind(&offer.message)
        .bind(offer.shared_item_id.map(|id| id.to_string()))
        .bind(offer.status.as_str())
        .bind(offer.offered_at.to_rfc3339())
        .bind(request_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // The request changed between the read above and the insert
            self.require_request(request_id).await?;
            return Err(ShareError::RequestNotActive(request_id));
        }

        tracing::info!(
            "Offer {} from {} on request {}",
            offer.id,
            helper_id,
            request_id
        );
        self.feed
            .emit(Table::FoodRequestOffers, ChangeKind::Insert, offer.id);

        let notification = NewNotification::new(
            request.requester_id,
            NotificationType::FoodOffer,
            "New offer",
            format!("A neighbor offered to help with {}", request.item_name),
        )
        .about_offer(offer.id, request_id);
        if let Err(e) = self.sink.notify(notification).await {
            tracing::warn!("Could not notify requester about offer {}: {}", offer.id, e);
        }

        Ok(offer)
    }

    /// Accepts or declines an offer by id.
    pub async fn resolve(
        &self,
        offer_id: Uuid,
        decision: Decision,
        response: Option<&str>,
    ) -> Result<CascadeReport> {
        let offer = self
            .get_offer(offer_id)
            .await?
            .ok_or_else(|| ShareError::not_found(Entity::Offer, offer_id))?;
        self.resolve_offer(&offer, decision, response).await
    }

    /// Accepts or declines an offer the caller already loaded.
    ///
    /// The snapshot may be stale. Accepting re-reads the request and the
    /// offer first and the fulfill step is a guarded write, so a second
    /// acceptance fails with `RequestAlreadyFulfilled` and an offer that was
    /// declined meanwhile fails with `NotFound(offer)`; neither changes
    /// anything.
    pub async fn resolve_offer(
        &self,
        offer: &FoodRequestOffer,
        decision: Decision,
        response: Option<&str>,
    ) -> Result<CascadeReport> {
        let request = match decision {
            Decision::Accept => Some(self.check_acceptable(offer).await?),
            Decision::Decline => self.board.get(offer.request_id).await?,
        };

        let item_name = request
            .as_ref()
            .map(|r| r.item_name.as_str())
            .unwrap_or("your request");
        let notification = self.decision_notification(offer, decision, item_name, response);

        let report = match decision {
            Decision::Accept => {
                let mut steps = vec![
                    Step::best_effort("notify helper", self.sink.notify(notification)),
                    Step::critical("fulfill request", self.fulfill(offer)),
                    Step::critical("mark offer accepted", self.mark_accepted(offer)),
                ];
                if let Some(shared_item_id) = offer.shared_item_id {
                    steps.push(Step::critical(
                        "complete shared item",
                        self.registry.complete(shared_item_id),
                    ));
                }
                steps.push(Step::best_effort(
                    "delete other pending offers",
                    self.delete_competing(offer.request_id, offer.id),
                ));
                run_cascade("accept offer", steps).await?
            }
            Decision::Decline => {
                let steps = vec![
                    Step::best_effort("notify helper", self.sink.notify(notification)),
                    Step::critical("delete offer", self.delete_declined(offer)),
                ];
                run_cascade("decline offer", steps).await?
            }
        };

        tracing::info!(
            "Offer {} on request {}: {} ({} warning(s))",
            offer.id,
            offer.request_id,
            decision,
            report.warnings.len()
        );
        Ok(report)
    }

    pub async fn get_offer(&self, offer_id: Uuid) -> Result<Option<FoodRequestOffer>> {
        let row: Option<OfferRow> = sqlx::query_as("SELECT * FROM food_request_offers WHERE id = ?")
            .bind(offer_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(FoodRequestOffer::try_from).transpose()
    }

    /// Offers on one request, oldest first.
    pub async fn offers_for_request(&self, request_id: Uuid) -> Result<Vec<FoodRequestOffer>> {
        self.fetch(Filter::eq("o.request_id", request_id)).await
    }

    /// Offers on any request posted by `requester_id`.
    pub async fn offers_for_requester(&self, requester_id: Uuid) -> Result<Vec<FoodRequestOffer>> {
        self.fetch(Filter::eq("r.requester_id", requester_id)).await
    }

    pub async fn offers_by_helper(&self, helper_id: Uuid) -> Result<Vec<FoodRequestOffer>> {
        self.fetch(Filter::eq("o.helper_id", helper_id)).await
    }

    async fn fetch(&self, filter: Filter) -> Result<Vec<FoodRequestOffer>> {
        let mut query = filter.query(
            "SELECT o.* FROM food_request_offers o JOIN food_requests r ON r.id = o.request_id",
        );
        query.push(" ORDER BY o.offered_at");
        let rows: Vec<OfferRow> = query.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(FoodRequestOffer::try_from).collect()
    }

    async fn require_request(&self, request_id: Uuid) -> Result<FoodRequest> {
        self.board
            .get(request_id)
            .await?
            .ok_or_else(|| ShareError::not_found(Entity::FoodRequest, request_id))
    }

    fn decision_notification(
        &self,
        offer: &FoodRequestOffer,
        decision: Decision,
        item_name: &str,
        response: Option<&str>,
    ) -> NewNotification {
        let (title, verb) = match decision {
            Decision::Accept => ("Offer accepted", "accepted"),
            Decision::Decline => ("Offer declined", "declined"),
        };
        let message = match response {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => format!("Your offer for {} was {}", item_name, verb),
        };
        NewNotification::new(offer.helper_id, NotificationType::OfferResponse, title, message)
            .about_offer(offer.id, offer.request_id)
    }

    /// The offer must still be pending on an active request.
    async fn check_acceptable(&self, offer: &FoodRequestOffer) -> Result<FoodRequest> {
        let request = self.require_request(offer.request_id).await?;
        if request.status == RequestStatus::Active {
            let current = self.get_offer(offer.id).await?;
            if matches!(current, Some(ref o) if o.status == OfferStatus::Pending) {
                return Ok(request);
            }
        }

        // Re-read: a competing acceptance may have landed since the first read
        let request = self.require_request(offer.request_id).await?;
        Err(match request.status {
            RequestStatus::Active => ShareError::not_found(Entity::Offer, offer.id),
            RequestStatus::Fulfilled => ShareError::RequestAlreadyFulfilled(request.id),
            RequestStatus::Cancelled => ShareError::RequestNotActive(request.id),
        })
    }

    async fn fulfill(&self, offer: &FoodRequestOffer) -> Result<()> {
        match self.board.fulfill_for_offer(offer.request_id, offer.id).await? {
            FulfillOutcome::Fulfilled => Ok(()),
            FulfillOutcome::AlreadyFulfilled => {
                Err(ShareError::RequestAlreadyFulfilled(offer.request_id))
            }
        }
    }

    async fn mark_accepted(&self, offer: &FoodRequestOffer) -> Result<()> {
        let result = sqlx::query(
            "UPDATE food_request_offers SET status = 'accepted' WHERE id = ? AND status = 'pending'",
        )
        .bind(offer.id.to_string())
        .execute(&self.pool)
        .await;
        let result = match result {
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(ShareError::RequestAlreadyFulfilled(offer.request_id));
            }
            other => other?,
        };
        if result.rows_affected() == 0 {
            return Err(ShareError::not_found(Entity::Offer, offer.id));
        }
        self.feed
            .emit(Table::FoodRequestOffers, ChangeKind::Update, offer.id);
        Ok(())
    }

    async fn delete_competing(&self, request_id: Uuid, winner_id: Uuid) -> Result<()> {
        let filter = Filter::all(vec![
            Filter::eq("request_id", request_id),
            Filter::ne("id", winner_id),
            Filter::eq("status", OfferStatus::Pending.as_str()),
        ]);
        let mut query = filter.query("DELETE FROM food_request_offers");
        query.push(" RETURNING id");
        let deleted: Vec<(String,)> = query.build_query_as().fetch_all(&self.pool).await?;

        for (id,) in &deleted {
            let id = parse_uuid(TABLE, id)?;
            self.feed.emit(Table::FoodRequestOffers, ChangeKind::Delete, id);
        }
        tracing::debug!(
            "Removed {} competing offer(s) on request {}",
            deleted.len(),
            request_id
        );
        Ok(())
    }

    async fn delete_declined(&self, offer: &FoodRequestOffer) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM food_request_offers
            WHERE id = ? AND status = 'pending'
              AND EXISTS (SELECT 1 FROM food_requests r WHERE r.id = food_request_offers.request_id AND r.status = 'active')
            "#,
        )
        .bind(offer.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if self.get_offer(offer.id).await?.is_none() {
                return Err(ShareError::not_found(Entity::Offer, offer.id));
            }
            // Still there: accepted, or its request is no longer active
            let status = self.board.get(offer.request_id).await?.map(|r| r.status);
            return Err(match status {
                Some(RequestStatus::Cancelled) => ShareError::RequestNotActive(offer.request_id),
                _ => ShareError::RequestAlreadyFulfilled(offer.request_id),
            });
        }

        self.feed
            .emit(Table::FoodRequestOffers, ChangeKind::Delete, offer.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{test_db, TestDb};
    use crate::db::PantryRepository;
    use crate::models::{NewFoodRequest, PantryItem, ShareStatus, Urgency};
    use crate::notify::test_support::RecordingSink;

    struct TestContext {
        matcher: OfferMatcher,
        board: RequestBoard,
        registry: ShareRegistry,
        pantry: PantryRepository,
        sink: Arc<RecordingSink>,
        db: TestDb,
    }

    async fn setup_with_sink(sink: RecordingSink) -> TestContext {
        let db = test_db().await;
        let board = RequestBoard::new(db.pool.clone());
        let registry = ShareRegistry::new(db.pool.clone());
        let sink = Arc::new(sink);
        let matcher = OfferMatcher::new(
            db.pool.clone(),
            board.clone(),
            registry.clone(),
            sink.clone(),
        );
        TestContext {
            matcher,
            board,
            registry,
            pantry: PantryRepository::new(db.pool.clone()),
            sink,
            db,
        }
    }

    async fn setup() -> TestContext {
        setup_with_sink(RecordingSink::default()).await
    }

    async fn post(ctx: &TestContext, requester: Uuid) -> FoodRequest {
        ctx.board
            .create(NewFoodRequest::new(requester, "Eggs", Urgency::High))
            .await
            .unwrap()
            .0
    }

    async fn share(ctx: &TestContext, owner: Uuid, name: &str) -> (PantryItem, Uuid) {
        let item = PantryItem::new(owner, name);
        ctx.pantry.create(&item).await.unwrap();
        let share = ctx.registry.publish(item.id, owner).await.unwrap();
        (item, share.id)
    }

    #[tokio::test]
    async fn test_accept_resolves_competing_offers() {
        let ctx = setup().await;
        let requester = Uuid::new_v4();
        let helper_a = Uuid::new_v4();
        let helper_b = Uuid::new_v4();
        let request = post(&ctx, requester).await;

        let o1 = ctx
            .matcher
            .make_offer(request.id, helper_a, "I have six", None)
            .await
            .unwrap();
        let o2 = ctx
            .matcher
            .make_offer(request.id, helper_b, "I have a dozen", None)
            .await
            .unwrap();

        let report = ctx.matcher.resolve(o1.id, Decision::Accept, None).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(
            report.completed,
            vec![
                "notify helper",
                "fulfill request",
                "mark offer accepted",
                "delete other pending offers"
            ]
        );

        let request = ctx.board.get(request.id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Fulfilled);
        let accepted = ctx.matcher.get_offer(o1.id).await.unwrap().unwrap();
        assert_eq!(accepted.status, OfferStatus::Accepted);
        assert!(ctx.matcher.get_offer(o2.id).await.unwrap().is_none());

        let to_a: Vec<_> = ctx
            .sink
            .sent()
            .into_iter()
            .filter(|n| n.user_id == helper_a)
            .collect();
        assert_eq!(to_a.len(), 1);
        assert_eq!(to_a[0].kind, NotificationType::OfferResponse);
        assert_eq!(to_a[0].related_offer_id, Some(o1.id));

        // A second acceptance from a stale snapshot changes nothing
        let sent_before = ctx.sink.sent().len();
        let err = ctx
            .matcher
            .resolve_offer(&o2, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::RequestAlreadyFulfilled(id) if id == request.id));
        assert_eq!(ctx.sink.sent().len(), sent_before);
        let after = ctx.board.get(request.id).await.unwrap().unwrap();
        assert_eq!(after, request);

        // By id the losing offer is simply gone
        let err = ctx.matcher.resolve(o2.id, Decision::Accept, None).await.unwrap_err();
        assert!(matches!(
            err,
            ShareError::NotFound {
                entity: Entity::Offer,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_accepts_fulfill_once() {
        let ctx = setup().await;
        let request = post(&ctx, Uuid::new_v4()).await;
        let o1 = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();
        let o2 = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        let (r1, r2) = tokio::join!(
            ctx.matcher.resolve_offer(&o1, Decision::Accept, None),
            ctx.matcher.resolve_offer(&o2, Decision::Accept, None),
        );

        let results = [r1, r2];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ShareError::RequestAlreadyFulfilled(_))));

        let request = ctx.board.get(request.id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Fulfilled);
        let accepted = ctx
            .matcher
            .offers_for_request(request.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|o| o.status == OfferStatus::Accepted)
            .count();
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_accept_completes_attached_share() {
        let ctx = setup().await;
        let helper = Uuid::new_v4();
        let request = post(&ctx, Uuid::new_v4()).await;
        let (_, share_id) = share(&ctx, helper, "Eggs").await;

        let offer = ctx
            .matcher
            .make_offer(request.id, helper, "", Some(share_id))
            .await
            .unwrap();
        assert_eq!(offer.shared_item_id, Some(share_id));

        let report = ctx.matcher.resolve(offer.id, Decision::Accept, None).await.unwrap();
        assert!(report.completed.contains(&"complete shared item"));
        let share = ctx.registry.get(share_id).await.unwrap().unwrap();
        assert_eq!(share.status, ShareStatus::Completed);
    }

    #[tokio::test]
    async fn test_accepting_declined_offer_changes_nothing() {
        let ctx = setup().await;
        let request = post(&ctx, Uuid::new_v4()).await;
        let o1 = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();
        let o2 = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        ctx.matcher.resolve(o1.id, Decision::Decline, None).await.unwrap();
        let sent_before = ctx.sink.sent().len();

        let err = ctx
            .matcher
            .resolve_offer(&o1, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::NotFound {
                entity: Entity::Offer,
                id,
            } if id == o1.id
        ));
        assert_eq!(ctx.sink.sent().len(), sent_before);
        assert_eq!(
            ctx.board.get(request.id).await.unwrap().unwrap().status,
            RequestStatus::Active
        );
        let remaining = ctx.matcher.get_offer(o2.id).await.unwrap().unwrap();
        assert_eq!(remaining.status, OfferStatus::Pending);
    }

    #[tokio::test]
    async fn test_accept_racing_decline_of_same_offer() {
        let ctx = setup().await;
        let request = post(&ctx, Uuid::new_v4()).await;
        let o1 = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();
        ctx.matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        let (accepted, declined) = tokio::join!(
            ctx.matcher.resolve_offer(&o1, Decision::Accept, None),
            ctx.matcher.resolve_offer(&o1, Decision::Decline, None),
        );
        assert!(accepted.is_ok() != declined.is_ok());

        let request = ctx.board.get(request.id).await.unwrap().unwrap();
        let offers = ctx.matcher.offers_for_request(request.id).await.unwrap();
        if accepted.is_ok() {
            assert_eq!(request.status, RequestStatus::Fulfilled);
            assert_eq!(offers.len(), 1);
            assert_eq!(offers[0].id, o1.id);
            assert_eq!(offers[0].status, OfferStatus::Accepted);
        } else {
            assert_eq!(request.status, RequestStatus::Active);
            assert_eq!(offers.len(), 1);
            assert_eq!(offers[0].status, OfferStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_offer_made_during_acceptance_does_not_linger() {
        let ctx = setup().await;
        for _ in 0..10 {
            let request = post(&ctx, Uuid::new_v4()).await;
            let winner = ctx
                .matcher
                .make_offer(request.id, Uuid::new_v4(), "", None)
                .await
                .unwrap();

            let (accepted, late) = tokio::join!(
                ctx.matcher.resolve_offer(&winner, Decision::Accept, None),
                ctx.matcher.make_offer(request.id, Uuid::new_v4(), "", None),
            );
            accepted.unwrap();
            if let Err(e) = late {
                assert!(matches!(e, ShareError::RequestNotActive(_)));
            }

            let offers = ctx.matcher.offers_for_request(request.id).await.unwrap();
            assert_eq!(offers.len(), 1);
            assert_eq!(offers[0].id, winner.id);
        }
    }

    #[tokio::test]
    async fn test_make_offer_on_fulfilled_request_inserts_nothing() {
        let ctx = setup().await;
        let request = post(&ctx, Uuid::new_v4()).await;
        sqlx::query("UPDATE food_requests SET status = 'fulfilled' WHERE id = ?")
            .bind(request.id.to_string())
            .execute(&ctx.db.pool)
            .await
            .unwrap();

        let err = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::RequestNotActive(_)));

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM food_request_offers WHERE request_id = ?")
                .bind(request.id.to_string())
                .fetch_one(&ctx.db.pool)
                .await
                .unwrap();
        assert_eq!(count, 0);
        assert!(ctx.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_completed_share_aborts_acceptance() {
        let ctx = setup().await;
        let helper = Uuid::new_v4();
        let request = post(&ctx, Uuid::new_v4()).await;
        let (_, share_id) = share(&ctx, helper, "Eggs").await;

        let offer = ctx
            .matcher
            .make_offer(request.id, helper, "", Some(share_id))
            .await
            .unwrap();
        let other = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        // Handed over elsewhere before the requester got to it
        ctx.registry.complete(share_id).await.unwrap();

        let err = ctx
            .matcher
            .resolve(offer.id, Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotAvailable(id) if id == share_id));

        let left = ctx.matcher.get_offer(other.id).await.unwrap().unwrap();
        assert_eq!(left.status, OfferStatus::Pending);
    }

    #[tokio::test]
    async fn test_offer_attaches_share_of_related_item() {
        let ctx = setup().await;
        let sharer = Uuid::new_v4();
        let (item, share_id) = share(&ctx, sharer, "Flour").await;
        let (request, _) = ctx
            .board
            .create(NewFoodRequest::new(Uuid::new_v4(), "Flour", Urgency::Low).for_item(sharer, item.id))
            .await
            .unwrap();

        let offer = ctx
            .matcher
            .make_offer(request.id, sharer, "It's yours", None)
            .await
            .unwrap();
        assert_eq!(offer.shared_item_id, Some(share_id));

        let other = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();
        assert_eq!(other.shared_item_id, None);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_acceptance() {
        let ctx = setup_with_sink(RecordingSink::failing()).await;
        let request = post(&ctx, Uuid::new_v4()).await;
        let offer = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        let report = ctx
            .matcher
            .resolve(offer.id, Decision::Accept, Some("Thanks!"))
            .await
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].step, "notify helper");
        assert_eq!(
            ctx.board.get(request.id).await.unwrap().unwrap().status,
            RequestStatus::Fulfilled
        );
    }

    #[tokio::test]
    async fn test_decline_deletes_offer_and_notifies() {
        let ctx = setup().await;
        let helper = Uuid::new_v4();
        let request = post(&ctx, Uuid::new_v4()).await;
        let offer = ctx
            .matcher
            .make_offer(request.id, helper, "", None)
            .await
            .unwrap();

        let report = ctx
            .matcher
            .resolve(offer.id, Decision::Decline, Some("Got some already"))
            .await
            .unwrap();
        assert_eq!(report.completed, vec!["notify helper", "delete offer"]);
        assert!(ctx.matcher.get_offer(offer.id).await.unwrap().is_none());
        assert_eq!(
            ctx.board.get(request.id).await.unwrap().unwrap().status,
            RequestStatus::Active
        );

        let to_helper: Vec<_> = ctx
            .sink
            .sent()
            .into_iter()
            .filter(|n| n.user_id == helper)
            .collect();
        assert_eq!(to_helper.len(), 1);
        assert_eq!(to_helper[0].title, "Offer declined");
        assert_eq!(to_helper[0].message, "Got some already");
    }

    #[tokio::test]
    async fn test_make_offer_preconditions() {
        let ctx = setup().await;
        let requester = Uuid::new_v4();
        let request = post(&ctx, requester).await;

        let err = ctx
            .matcher
            .make_offer(request.id, requester, "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::SelfOffer));

        let err = ctx
            .matcher
            .make_offer(Uuid::new_v4(), Uuid::new_v4(), "", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::NotFound {
                entity: Entity::FoodRequest,
                ..
            }
        ));

        let helper = Uuid::new_v4();
        let (_, foreign_share) = share(&ctx, Uuid::new_v4(), "Eggs").await;
        let err = ctx
            .matcher
            .make_offer(request.id, helper, "", Some(foreign_share))
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::Forbidden(_)));

        let (_, done_share) = share(&ctx, helper, "Eggs").await;
        ctx.registry.complete(done_share).await.unwrap();
        let err = ctx
            .matcher
            .make_offer(request.id, helper, "", Some(done_share))
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::NotAvailable(_)));

        ctx.board.fulfill(request.id).await.unwrap();
        let err = ctx
            .matcher
            .make_offer(request.id, helper, "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::RequestNotActive(_)));
    }

    #[tokio::test]
    async fn test_make_offer_notifies_requester() {
        let ctx = setup().await;
        let requester = Uuid::new_v4();
        let request = post(&ctx, requester).await;
        let offer = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        let sent = ctx.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].user_id, requester);
        assert_eq!(sent[0].kind, NotificationType::FoodOffer);
        assert_eq!(sent[0].related_request_id, Some(request.id));
        assert_eq!(sent[0].related_offer_id, Some(offer.id));
    }

    #[tokio::test]
    async fn test_offer_listings() {
        let ctx = setup().await;
        let requester = Uuid::new_v4();
        let helper = Uuid::new_v4();
        let r1 = post(&ctx, requester).await;
        let r2 = post(&ctx, requester).await;

        ctx.matcher.make_offer(r1.id, helper, "", None).await.unwrap();
        ctx.matcher.make_offer(r2.id, helper, "", None).await.unwrap();
        ctx.matcher
            .make_offer(r2.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();

        assert_eq!(ctx.matcher.offers_for_request(r2.id).await.unwrap().len(), 2);
        assert_eq!(ctx.matcher.offers_for_requester(requester).await.unwrap().len(), 3);
        assert_eq!(ctx.matcher.offers_by_helper(helper).await.unwrap().len(), 2);

        ctx.board.cancel(r2.id, requester).await.unwrap();
        assert!(ctx.matcher.offers_for_request(r2.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accept_cancelled_request() {
        let ctx = setup().await;
        let request = post(&ctx, Uuid::new_v4()).await;
        let offer = ctx
            .matcher
            .make_offer(request.id, Uuid::new_v4(), "", None)
            .await
            .unwrap();
        sqlx::query("UPDATE food_requests SET status = 'cancelled' WHERE id = ?")
            .bind(request.id.to_string())
            .execute(&ctx.db.pool)
            .await
            .unwrap();

        let err = ctx.matcher.resolve(offer.id, Decision::Accept, None).await.unwrap_err();
        assert!(matches!(err, ShareError::RequestNotActive(_)));
    }
}
