//! Great-circle distance and bounding-box prefilter math.

use crate::models::GeoPoint;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Equirectangular approximation of one degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Haversine distance between two points in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// A rectangular lat/lng window around a point.
///
/// When `west > east` the box crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    /// Box that contains every point within `radius_km` of `center`.
    /// It may include points further away; callers filter with [`haversine_km`].
    pub fn around(center: GeoPoint, radius_km: f64) -> Self {
        let dlat = radius_km / KM_PER_DEGREE;
        let south = (center.lat - dlat).max(-90.0);
        let north = (center.lat + dlat).min(90.0);

        let cos_lat = center.lat.to_radians().cos();
        let touches_pole = south <= -90.0 || north >= 90.0;
        if touches_pole || cos_lat <= f64::EPSILON {
            return Self::full_longitude(south, north);
        }

        let dlng = radius_km / (KM_PER_DEGREE * cos_lat);
        if dlng >= 180.0 {
            return Self::full_longitude(south, north);
        }

        Self {
            south,
            north,
            west: wrap_longitude(center.lng - dlng),
            east: wrap_longitude(center.lng + dlng),
        }
    }

    fn full_longitude(south: f64, north: f64) -> Self {
        Self {
            south,
            north,
            west: -180.0,
            east: 180.0,
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    pub fn contains(&self, p: GeoPoint) -> bool {
        if p.lat < self.south || p.lat > self.north {
            return false;
        }
        if self.crosses_antimeridian() {
            p.lng >= self.west || p.lng <= self.east
        } else {
            p.lng >= self.west && p.lng <= self.east
        }
    }
}

fn wrap_longitude(lng: f64) -> f64 {
    if lng < -180.0 {
        lng + 360.0
    } else if lng > 180.0 {
        lng - 360.0
    } else {
        lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point `km` kilometres due east of `origin` along its parallel.
    fn east_of(origin: GeoPoint, km: f64) -> GeoPoint {
        let dlng = (km / EARTH_RADIUS_KM) / origin.lat.to_radians().cos();
        GeoPoint::new(origin.lat, origin.lng + dlng.to_degrees())
    }

    #[test]
    fn test_haversine_zero_distance() {
        let p = GeoPoint::new(41.0, 28.97);
        assert!(haversine_km(p, p).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Istanbul (Sultanahmet) to Ankara (Kizilay), roughly 350 km
        let istanbul = GeoPoint::new(41.0054, 28.9768);
        let ankara = GeoPoint::new(39.9208, 32.8541);
        let d = haversine_km(istanbul, ankara);
        assert!((340.0..360.0).contains(&d), "got {}", d);
    }

    #[test]
    fn test_haversine_is_symmetric() {
        let a = GeoPoint::new(41.0, 28.97);
        let b = GeoPoint::new(41.02, 29.01);
        assert!((haversine_km(a, b) - haversine_km(b, a)).abs() < 1e-12);
    }

    #[test]
    fn test_box_contains_points_within_radius() {
        let center = GeoPoint::new(41.0, 28.97);
        let bbox = BoundingBox::around(center, 2.0);
        assert!(bbox.contains(center));
        assert!(bbox.contains(east_of(center, 1.99)));
        assert!(bbox.contains(GeoPoint::new(41.0 - 1.99 / 111.2, 28.97)));
        assert!(!bbox.contains(east_of(center, 3.0)));
    }

    #[test]
    fn test_box_wraps_antimeridian() {
        let center = GeoPoint::new(0.0, 179.99);
        let bbox = BoundingBox::around(center, 5.0);
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.contains(GeoPoint::new(0.0, -179.99)));
        assert!(!bbox.contains(GeoPoint::new(0.0, 0.0)));
    }

    #[test]
    fn test_box_near_pole_spans_all_longitudes() {
        let bbox = BoundingBox::around(GeoPoint::new(89.99, 10.0), 5.0);
        assert_eq!(bbox.west, -180.0);
        assert_eq!(bbox.east, 180.0);
        assert_eq!(bbox.north, 90.0);
    }
}
