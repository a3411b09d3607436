//! Neighbor discovery.
//!
//! Finds the users within a radius of a center point. A cheap bounding-box
//! query narrows the rows, then the exact Haversine distance decides. When a
//! remote `get_nearby_users` procedure is configured, it replaces the box
//! query but the exact filter still runs locally.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::LocationRepository;
use crate::error::{Entity, Result, ShareError};
use crate::geo::{haversine_km, BoundingBox};
use crate::models::{GeoPoint, UserLocation};

/// The radii a user can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchRadius {
    HalfKm,
    Km1,
    Km2,
    #[default]
    Km5,
    Km10,
    Km15,
    Km25,
}

impl SearchRadius {
    pub const ALL: [SearchRadius; 7] = [
        SearchRadius::HalfKm,
        SearchRadius::Km1,
        SearchRadius::Km2,
        SearchRadius::Km5,
        SearchRadius::Km10,
        SearchRadius::Km15,
        SearchRadius::Km25,
    ];

    pub fn km(&self) -> f64 {
        match self {
            SearchRadius::HalfKm => 0.5,
            SearchRadius::Km1 => 1.0,
            SearchRadius::Km2 => 2.0,
            SearchRadius::Km5 => 5.0,
            SearchRadius::Km10 => 10.0,
            SearchRadius::Km15 => 15.0,
            SearchRadius::Km25 => 25.0,
        }
    }

    pub fn meters(&self) -> f64 {
        self.km() * 1000.0
    }

    /// The allowed radius equal to `km`, if any.
    pub fn from_km(km: f64) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|r| (r.km() - km).abs() < f64::EPSILON)
    }
}

impl fmt::Display for SearchRadius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} km", self.km())
    }
}

impl FromStr for SearchRadius {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        let number = trimmed.trim_end_matches("km").trim();
        number
            .parse::<f64>()
            .ok()
            .and_then(Self::from_km)
            .ok_or_else(|| {
                format!(
                    "Invalid radius '{}'. Valid options: 0.5, 1, 2, 5, 10, 15, 25 (km)",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub user_id: Uuid,
    pub distance_km: f64,
}

/// Users found around a center for one radius.
///
/// A snapshot: it is never updated in place. A new radius or a new center
/// produces a new set, which replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub center_user: Option<Uuid>,
    pub radius: SearchRadius,
    neighbors: Arc<[Neighbor]>,
}

impl CandidateSet {
    /// `neighbors` must already be sorted by distance.
    pub fn new(center_user: Option<Uuid>, radius: SearchRadius, neighbors: Vec<Neighbor>) -> Self {
        Self {
            center_user,
            radius,
            neighbors: neighbors.into(),
        }
    }

    pub fn empty(radius: SearchRadius) -> Self {
        Self::new(None, radius, Vec::new())
    }

    /// Neighbors in ascending distance.
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.neighbors.iter().map(|n| n.user_id).collect()
    }

    pub fn distance_to(&self, user_id: Uuid) -> Option<f64> {
        self.neighbors
            .iter()
            .find(|n| n.user_id == user_id)
            .map(|n| n.distance_km)
    }

    pub fn contains(&self, user_id: Uuid) -> bool {
        self.distance_to(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Keeps the locations within `radius_km` of `center` (other than
/// `exclude`), closest first.
pub fn rank_by_distance(
    center: GeoPoint,
    radius_km: f64,
    exclude: Uuid,
    locations: impl IntoIterator<Item = UserLocation>,
) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = locations
        .into_iter()
        .filter(|loc| loc.user_id != exclude)
        .map(|loc| Neighbor {
            user_id: loc.user_id,
            distance_km: haversine_km(center, loc.point()),
        })
        .filter(|n| n.distance_km <= radius_km)
        .collect();

    neighbors.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    neighbors
}

/// Client for a server-side `get_nearby_users` procedure.
#[derive(Clone)]
pub struct NearbyUsersClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct NearbyUsersParams {
    lat: f64,
    lng: f64,
    radius_meters: f64,
    exclude_user_id: Uuid,
}

#[derive(Deserialize)]
struct NearbyUser {
    id: Uuid,
}

impl NearbyUsersClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
        }
    }

    pub async fn nearby(
        &self,
        center: GeoPoint,
        radius: SearchRadius,
        exclude: Uuid,
    ) -> Result<Vec<Uuid>> {
        let url = format!(
            "{}/rest/v1/rpc/get_nearby_users",
            self.base_url.trim_end_matches('/')
        );
        let params = NearbyUsersParams {
            lat: center.lat,
            lng: center.lng,
            radius_meters: radius.meters(),
            exclude_user_id: exclude,
        };

        let mut request = self.http.post(&url).json(&params);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let users: Vec<NearbyUser> = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::debug!("get_nearby_users returned {} user(s)", users.len());
        Ok(users.into_iter().map(|u| u.id).collect())
    }
}

/// Finds candidate neighbors for a user.
#[derive(Clone)]
pub struct NeighborLocator {
    locations: LocationRepository,
    remote: Option<NearbyUsersClient>,
}

impl NeighborLocator {
    pub fn new(locations: LocationRepository) -> Self {
        Self {
            locations,
            remote: None,
        }
    }

    /// Delegates the coarse lookup to a remote procedure.
    pub fn with_remote(mut self, client: NearbyUsersClient) -> Self {
        self.remote = Some(client);
        self
    }

    /// Neighbors of `center` within `radius`, closest first, never including
    /// `center` itself.
    pub async fn find_neighbors(
        &self,
        center: &UserLocation,
        radius: SearchRadius,
    ) -> Result<CandidateSet> {
        let point = center.point();
        let radius_km = radius.km();

        let coarse = match &self.remote {
            Some(client) => {
                let ids = client.nearby(point, radius, center.user_id).await?;
                self.locations.get_many(&ids).await?
            }
            None => {
                let bbox = BoundingBox::around(point, radius_km);
                self.locations.in_box(&bbox, center.user_id).await?
            }
        };

        let prefiltered = coarse.len();
        let neighbors = rank_by_distance(point, radius_km, center.user_id, coarse);
        tracing::debug!(
            "Neighbors of {} within {}: {} of {} prefiltered",
            center.user_id,
            radius,
            neighbors.len(),
            prefiltered
        );

        Ok(CandidateSet::new(Some(center.user_id), radius, neighbors))
    }

    /// Like [`find_neighbors`](Self::find_neighbors), starting from the stored
    /// location of `user_id`.
    pub async fn find_neighbors_of(
        &self,
        user_id: Uuid,
        radius: SearchRadius,
    ) -> Result<CandidateSet> {
        let center = self
            .locations
            .get(user_id)
            .await?
            .ok_or_else(|| ShareError::not_found(Entity::UserLocation, user_id))?;
        self.find_neighbors(&center, radius).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::geo::EARTH_RADIUS_KM;
    use axum::{routing::post, Json, Router};
    use std::sync::Mutex;

    fn east_of(origin: GeoPoint, km: f64) -> GeoPoint {
        let dlng = (km / EARTH_RADIUS_KM) / origin.lat.to_radians().cos();
        GeoPoint::new(origin.lat, origin.lng + dlng.to_degrees())
    }

    fn north_of(origin: GeoPoint, km: f64) -> GeoPoint {
        GeoPoint::new(origin.lat + (km / EARTH_RADIUS_KM).to_degrees(), origin.lng)
    }

    async fn place(repo: &LocationRepository, p: GeoPoint) -> Uuid {
        let id = Uuid::new_v4();
        repo.upsert(&UserLocation::new(id, p.lat, p.lng)).await.unwrap();
        id
    }

    #[test]
    fn test_search_radius_parse() {
        assert_eq!(SearchRadius::from_str("2").unwrap(), SearchRadius::Km2);
        assert_eq!(SearchRadius::from_str("0.5").unwrap(), SearchRadius::HalfKm);
        assert_eq!(SearchRadius::from_str("25km").unwrap(), SearchRadius::Km25);
        assert!(SearchRadius::from_str("3").is_err());
        assert!(SearchRadius::from_str("far").is_err());
    }

    #[test]
    fn test_rank_by_distance_sorts_and_excludes() {
        let center = GeoPoint::new(41.0, 28.97);
        let me = Uuid::new_v4();
        let a = UserLocation::new(Uuid::new_v4(), north_of(center, 1.5).lat, center.lng);
        let b = UserLocation::new(Uuid::new_v4(), north_of(center, 0.5).lat, center.lng);
        let c = UserLocation::new(Uuid::new_v4(), north_of(center, 3.0).lat, center.lng);
        let self_loc = UserLocation::new(me, center.lat, center.lng);

        let ranked = rank_by_distance(center, 2.0, me, vec![a.clone(), b.clone(), c, self_loc]);
        let ids: Vec<Uuid> = ranked.iter().map(|n| n.user_id).collect();
        assert_eq!(ids, vec![b.user_id, a.user_id]);
        assert!((ranked[0].distance_km - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_two_km_radius_boundary() {
        let db = test_db().await;
        let repo = LocationRepository::new(db.pool.clone());
        let locator = NeighborLocator::new(repo.clone());

        let center = GeoPoint::new(41.00, 28.97);
        let me = place(&repo, center).await;
        let inside = place(&repo, east_of(center, 1.9)).await;
        let outside = place(&repo, east_of(center, 2.3)).await;

        let me_loc = repo.get(me).await.unwrap().unwrap();
        let set = locator.find_neighbors(&me_loc, SearchRadius::Km2).await.unwrap();

        assert!(set.contains(inside));
        assert!(!set.contains(outside));
        assert!(!set.contains(me));
        assert!((set.distance_to(inside).unwrap() - 1.9).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_neighbor_correctness_matches_haversine() {
        let db = test_db().await;
        let repo = LocationRepository::new(db.pool.clone());
        let locator = NeighborLocator::new(repo.clone());

        let center = GeoPoint::new(41.00, 28.97);
        let me = place(&repo, center).await;
        let mut others = Vec::new();
        for i in 0..24 {
            let km = 0.3 * i as f64;
            let p = if i % 2 == 0 {
                east_of(center, km)
            } else {
                north_of(east_of(center, km / 2.0), km / 2.0)
            };
            others.push((place(&repo, p).await, p));
        }
        // A user with no location is never a candidate
        let ghost = Uuid::new_v4();

        let me_loc = repo.get(me).await.unwrap().unwrap();
        for radius in SearchRadius::ALL {
            let set = locator.find_neighbors(&me_loc, radius).await.unwrap();
            for (id, p) in &others {
                let expected = haversine_km(center, *p) <= radius.km();
                assert_eq!(set.contains(*id), expected, "radius {} user at {:?}", radius, p);
            }
            assert!(!set.contains(me));
            assert!(!set.contains(ghost));
            let distances: Vec<f64> = set.neighbors().iter().map(|n| n.distance_km).collect();
            assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[tokio::test]
    async fn test_find_neighbors_of_unknown_user() {
        let db = test_db().await;
        let locator = NeighborLocator::new(LocationRepository::new(db.pool.clone()));
        let err = locator
            .find_neighbors_of(Uuid::new_v4(), SearchRadius::Km1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShareError::NotFound {
                entity: Entity::UserLocation,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_remote_lookup_is_refiltered_locally() {
        let db = test_db().await;
        let repo = LocationRepository::new(db.pool.clone());

        let center = GeoPoint::new(41.00, 28.97);
        let me = place(&repo, center).await;
        let near = place(&repo, east_of(center, 1.0)).await;
        let too_far = place(&repo, east_of(center, 4.0)).await;
        let no_location = Uuid::new_v4();

        let seen: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
        let returned = vec![near, too_far, no_location];
        let seen_in_handler = seen.clone();
        let app = Router::new().route(
            "/rest/v1/rpc/get_nearby_users",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = seen_in_handler.clone();
                let returned = returned.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(
                        returned
                            .iter()
                            .map(|id| serde_json::json!({ "id": id }))
                            .collect::<Vec<_>>(),
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let locator = NeighborLocator::new(repo.clone())
            .with_remote(NearbyUsersClient::new(format!("http://{}/", addr), None));
        let me_loc = repo.get(me).await.unwrap().unwrap();
        let set = locator.find_neighbors(&me_loc, SearchRadius::Km2).await.unwrap();

        assert_eq!(set.ids(), vec![near]);

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["radius_meters"], 2000.0);
        assert_eq!(body["exclude_user_id"], me.to_string());
    }
}
