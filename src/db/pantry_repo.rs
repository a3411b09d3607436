use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_date, parse_timestamp, parse_uuid};
use crate::error::Result;
use crate::models::PantryItem;

const TABLE: &str = "pantry_items";

/// Minimal pantry storage. The sharing engine only reads it.
#[derive(Clone)]
pub struct PantryRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PantryRow {
    id: String,
    user_id: String,
    name: String,
    quantity: f64,
    expiration_date: Option<String>,
    created_at: String,
}

impl TryFrom<PantryRow> for PantryItem {
    type Error = crate::error::ShareError;

    fn try_from(row: PantryRow) -> Result<Self> {
        Ok(PantryItem {
            id: parse_uuid(TABLE, &row.id)?,
            owner_id: parse_uuid(TABLE, &row.user_id)?,
            name: row.name,
            quantity: row.quantity,
            expiration_date: parse_date(row.expiration_date.as_deref()),
            created_at: parse_timestamp(&row.created_at),
        })
    }
}

impl PantryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, item: &PantryItem) -> Result<PantryItem> {
        sqlx::query(
            r#"
            INSERT INTO pantry_items (id, user_id, name, quantity, expiration_date, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.owner_id.to_string())
        .bind(&item.name)
        .bind(item.quantity)
        .bind(item.expiration_date.map(|d| d.to_string()))
        .bind(item.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(item.id)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<PantryItem>> {
        let row: Option<PantryRow> = sqlx::query_as("SELECT * FROM pantry_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(PantryItem::try_from).transpose()
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<PantryItem>> {
        let rows: Vec<PantryRow> = sqlx::query_as(
            "SELECT * FROM pantry_items WHERE user_id = ? ORDER BY expiration_date IS NULL, expiration_date, name",
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PantryItem::try_from).collect()
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM pantry_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
