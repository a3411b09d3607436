use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid, Filter};
use crate::error::Result;
use crate::geo::BoundingBox;
use crate::models::UserLocation;

const TABLE: &str = "user_locations";

/// Read access to the profile layer's stored user coordinates.
///
/// `upsert` and `delete` exist for the CLI and tests; the sharing engine only reads.
#[derive(Clone)]
pub struct LocationRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LocationRow {
    user_id: String,
    latitude: f64,
    longitude: f64,
    updated_at: String,
}

impl TryFrom<LocationRow> for UserLocation {
    type Error = crate::error::ShareError;

    fn try_from(row: LocationRow) -> Result<Self> {
        Ok(UserLocation {
            user_id: parse_uuid(TABLE, &row.user_id)?,
            latitude: row.latitude,
            longitude: row.longitude,
            updated_at: parse_timestamp(&row.updated_at),
        })
    }
}

impl LocationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, location: &UserLocation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_locations (user_id, latitude, longitude, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE
            SET latitude = excluded.latitude,
                longitude = excluded.longitude,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(location.user_id.to_string())
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<UserLocation>> {
        let row: Option<LocationRow> =
            sqlx::query_as("SELECT * FROM user_locations WHERE user_id = ?")
                .bind(user_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(UserLocation::try_from).transpose()
    }

    /// Locations for the given users. Users without a row are skipped.
    pub async fn get_many(&self, user_ids: &[Uuid]) -> Result<Vec<UserLocation>> {
        self.select(Filter::in_list("user_id", user_ids.iter().copied()))
            .await
    }

    /// Every location inside `bbox` except `exclude`'s own.
    pub async fn in_box(&self, bbox: &BoundingBox, exclude: Uuid) -> Result<Vec<UserLocation>> {
        let filter = Filter::all(vec![
            bbox_filter(bbox),
            Filter::ne("user_id", exclude),
        ]);
        self.select(filter).await
    }

    pub async fn delete(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM user_locations WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn select(&self, filter: Filter) -> Result<Vec<UserLocation>> {
        let rows: Vec<LocationRow> = filter
            .query("SELECT * FROM user_locations")
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(UserLocation::try_from).collect()
    }
}

fn bbox_filter(bbox: &BoundingBox) -> Filter {
    let latitude = Filter::between("latitude", bbox.south, bbox.north);
    let longitude = if bbox.crosses_antimeridian() {
        Filter::any(vec![
            Filter::between("longitude", bbox.west, 180.0),
            Filter::between("longitude", -180.0, bbox.east),
        ])
    } else {
        Filter::between("longitude", bbox.west, bbox.east)
    };
    Filter::all(vec![latitude, longitude])
}
