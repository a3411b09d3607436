//! Request board: the lifecycle of a food request.
//!
//! Only the requester creates, edits or cancels a request. The one write
//! another component may do is [`RequestBoard::fulfill`], which the offer
//! matcher calls when an offer is accepted.

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::cascade::{run_cascade, CascadeReport, Step};
use crate::db::{parse_opt_uuid, parse_status, parse_timestamp, parse_uuid, Filter};
use crate::error::{Entity, Result, ShareError};
use crate::feed::{ChangeFeed, ChangeKind, FeedPublisher, Table};
use crate::models::{FoodRequest, NewFoodRequest, RequestEdit, RequestStatus};
use crate::neighbors::CandidateSet;

const TABLE: &str = "food_requests";

/// Result of [`RequestBoard::fulfill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillOutcome {
    /// This call moved the request from active to fulfilled.
    Fulfilled,
    /// The request was fulfilled before this call; nothing changed.
    AlreadyFulfilled,
}

#[derive(Clone)]
pub struct RequestBoard {
    pool: SqlitePool,
    feed: FeedPublisher,
}

#[derive(sqlx::FromRow)]
struct FoodRequestRow {
    id: String,
    requester_id: String,
    item_name: String,
    description: String,
    urgency: String,
    status: String,
    related_sharer_id: Option<String>,
    related_item_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<FoodRequestRow> for FoodRequest {
    type Error = ShareError;

    fn try_from(row: FoodRequestRow) -> Result<Self> {
        Ok(FoodRequest {
            id: parse_uuid(TABLE, &row.id)?,
            requester_id: parse_uuid(TABLE, &row.requester_id)?,
            item_name: row.item_name,
            description: row.description,
            urgency: parse_status(TABLE, &row.urgency)?,
            status: parse_status(TABLE, &row.status)?,
            related_sharer_id: parse_opt_uuid(TABLE, row.related_sharer_id.as_deref())?,
            related_item_id: parse_opt_uuid(TABLE, row.related_item_id.as_deref())?,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

impl RequestBoard {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            feed: FeedPublisher::default(),
        }
    }

    pub fn with_feed(mut self, feed: ChangeFeed) -> Self {
        self.feed = FeedPublisher::new(Some(feed));
        self
    }

    /// Posts a new active request.
    ///
    /// When the request names a pantry item, a connection record is written
    /// afterwards. That write is best-effort: its failure shows up in the
    /// returned report but the request stays.
    pub async fn create(&self, new: NewFoodRequest) -> Result<(FoodRequest, CascadeReport)> {
        let now = Utc::now();
        let request = FoodRequest {
            id: Uuid::new_v4(),
            requester_id: new.requester_id,
            item_name: new.item_name,
            description: new.description,
            urgency: new.urgency,
            status: RequestStatus::Active,
            related_sharer_id: new.related_sharer_id,
            related_item_id: new.related_item_id,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO food_requests (id, requester_id, item_name, description, urgency, status, related_sharer_id, related_item_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.requester_id.to_string())
        .bind(&request.item_name)
        .bind(&request.description)
        .bind(request.urgency.as_str())
        .bind(request.status.as_str())
        .bind(request.related_sharer_id.map(|id| id.to_string()))
        .bind(request.related_item_id.map(|id| id.to_string()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Request {} posted by {}: {} ({})",
            request.id,
            request.requester_id,
            request.item_name,
            request.urgency
        );
        self.feed
            .emit(Table::FoodRequests, ChangeKind::Insert, request.id);

        let mut steps = Vec::new();
        if let Some(item_id) = request.related_item_id {
            steps.push(Step::best_effort(
                "link pantry item",
                self.connect_item(request.id, item_id),
            ));
        }
        let report = run_cascade("create request", steps).await?;

        Ok((request, report))
    }

    /// Changes an active request. Only the requester may do this.
    pub async fn edit(&self, request_id: Uuid, requester_id: Uuid, edit: RequestEdit) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE food_requests
            SET item_name = COALESCE(?, item_name),
                description = COALESCE(?, description),
                urgency = COALESCE(?, urgency),
                updated_at = ?
            WHERE id = ? AND requester_id = ? AND status = 'active'
            "#,
        )
        .bind(edit.item_name.as_deref())
        .bind(edit.description.as_deref())
        .bind(edit.urgency.map(|u| u.as_str()))
        .bind(Utc::now().to_rfc3339())
        .bind(request_id.to_string())
        .bind(requester_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let request = self.require(request_id).await?;
            if request.requester_id != requester_id {
                return Err(forbidden(request_id));
            }
            return Err(ShareError::RequestNotActive(request_id));
        }

        tracing::info!("Request {} edited", request_id);
        self.feed
            .emit(Table::FoodRequests, ChangeKind::Update, request_id);
        Ok(())
    }

    /// Deletes a request together with its connection records and the
    /// offers made on it.
    pub async fn cancel(&self, request_id: Uuid, requester_id: Uuid) -> Result<()> {
        let request = self.require(request_id).await?;
        if request.requester_id != requester_id {
            return Err(forbidden(request_id));
        }

        sqlx::query("DELETE FROM request_item_connections WHERE request_id = ?")
            .bind(request_id.to_string())
            .execute(&self.pool)
            .await?;

        let offers: Vec<(String,)> =
            sqlx::query_as("DELETE FROM food_request_offers WHERE request_id = ? RETURNING id")
                .bind(request_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let result = sqlx::query("DELETE FROM food_requests WHERE id = ? AND requester_id = ?")
            .bind(request_id.to_string())
            .bind(requester_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ShareError::not_found(Entity::FoodRequest, request_id));
        }

        tracing::info!("Request {} cancelled", request_id);
        self.feed
            .emit(Table::FoodRequests, ChangeKind::Delete, request_id);
        for (id,) in &offers {
            let id = parse_uuid("food_request_offers", id)?;
            self.feed.emit(Table::FoodRequestOffers, ChangeKind::Delete, id);
        }
        Ok(())
    }

    /// Active requests posted by a candidate, newest first.
    pub async fn list_active_for(&self, candidates: &CandidateSet) -> Result<Vec<FoodRequest>> {
        let filter = Filter::all(vec![
            Filter::eq("status", RequestStatus::Active.as_str()),
            Filter::in_list("requester_id", candidates.ids()),
        ]);
        let mut query = filter.query("SELECT * FROM food_requests");
        query.push(" ORDER BY created_at DESC");
        let rows: Vec<FoodRequestRow> = query.build_query_as().fetch_all(&self.pool).await?;

        tracing::debug!("{} active request(s) nearby", rows.len());
        rows.into_iter().map(FoodRequest::try_from).collect()
    }

    /// Moves an active request to fulfilled.
    ///
    /// Calling it on an already fulfilled request changes nothing and reports
    /// [`FulfillOutcome::AlreadyFulfilled`]. A cancelled request is an error.
    pub async fn fulfill(&self, request_id: Uuid) -> Result<FulfillOutcome> {
        self.mark_fulfilled(request_id, None).await
    }

    /// Like [`RequestBoard::fulfill`], but the write only lands while
    /// `offer_id` is still a pending offer on the request. An active request
    /// whose offer is gone yields `NotFound(offer)`.
    pub async fn fulfill_for_offer(&self, request_id: Uuid, offer_id: Uuid) -> Result<FulfillOutcome> {
        self.mark_fulfilled(request_id, Some(offer_id)).await
    }

    async fn mark_fulfilled(&self, request_id: Uuid, offer_id: Option<Uuid>) -> Result<FulfillOutcome> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE food_requests SET status = 'fulfilled', updated_at = ");
        query.push_bind(Utc::now().to_rfc3339());
        query.push(" WHERE id = ");
        query.push_bind(request_id.to_string());
        query.push(" AND status = 'active'");
        if let Some(offer_id) = offer_id {
            query.push(" AND EXISTS (SELECT 1 FROM food_request_offers o WHERE o.id = ");
            query.push_bind(offer_id.to_string());
            query.push(" AND o.request_id = food_requests.id AND o.status = 'pending')");
        }
        let result = query.build().execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            let request = self.require(request_id).await?;
            return match (request.status, offer_id) {
                (RequestStatus::Fulfilled, _) => Ok(FulfillOutcome::AlreadyFulfilled),
                (RequestStatus::Active, Some(offer_id)) => {
                    Err(ShareError::not_found(Entity::Offer, offer_id))
                }
                _ => Err(ShareError::RequestNotActive(request_id)),
            };
        }

        tracing::info!("Request {} fulfilled", request_id);
        self.feed
            .emit(Table::FoodRequests, ChangeKind::Update, request_id);
        Ok(FulfillOutcome::Fulfilled)
    }

    pub async fn get(&self, request_id: Uuid) -> Result<Option<FoodRequest>> {
        let row: Option<FoodRequestRow> =
            sqlx::query_as("SELECT * FROM food_requests WHERE id = ?")
                .bind(request_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(FoodRequest::try_from).transpose()
    }

    pub async fn list_for_requester(&self, requester_id: Uuid) -> Result<Vec<FoodRequest>> {
        let rows: Vec<FoodRequestRow> = sqlx::query_as(
            "SELECT * FROM food_requests WHERE requester_id = ? ORDER BY created_at DESC",
        )
        .bind(requester_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FoodRequest::try_from).collect()
    }

    /// Pantry items linked to a request.
    pub async fn connected_items(&self, request_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT item_id FROM request_item_connections WHERE request_id = ? ORDER BY created_at",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|(id,)| parse_uuid("request_item_connections", id))
            .collect()
    }

    async fn require(&self, request_id: Uuid) -> Result<FoodRequest> {
        self.get(request_id)
            .await?
            .ok_or_else(|| ShareError::not_found(Entity::FoodRequest, request_id))
    }

    async fn connect_item(&self, request_id: Uuid, item_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO request_item_connections (request_id, item_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(request_id.to_string())
        .bind(item_id.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn forbidden(request_id: Uuid) -> ShareError {
    ShareError::Forbidden(format!("food request {} belongs to another user", request_id))
}
