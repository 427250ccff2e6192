pub mod google;
pub mod routing;

use crate::models::ride::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const MINUTES_PER_KM: f64 = 2.5;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Rough travel time for a straight-line distance, in whole minutes.
pub fn estimated_minutes(distance_km: f64) -> f64 {
    (distance_km.max(0.0) * MINUTES_PER_KM).round()
}

/// Address label used when no geocoder is available.
pub fn coordinate_label(point: &GeoPoint) -> String {
    format!("Lat: {:.4}, Lng: {:.4}", point.lat, point.lng)
}

#[cfg(test)]
mod tests {
    use super::{coordinate_label, estimated_minutes, haversine_km};
    use crate::models::ride::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: -23.5505,
            lng: -46.6333,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let sao_paulo = GeoPoint {
            lat: -23.5505,
            lng: -46.6333,
        };
        let campinas = GeoPoint {
            lat: -22.9099,
            lng: -47.0626,
        };
        let there = haversine_km(&sao_paulo, &campinas);
        let back = haversine_km(&campinas, &sao_paulo);
        assert!((there - back).abs() < 1e-9);
    }

    #[test]
    fn sao_paulo_to_rio_is_around_360_km() {
        let sao_paulo = GeoPoint {
            lat: -23.5505,
            lng: -46.6333,
        };
        let rio = GeoPoint {
            lat: -22.9068,
            lng: -43.1729,
        };
        let distance = haversine_km(&sao_paulo, &rio);
        assert!((distance - 360.0).abs() < 10.0);
    }

    #[test]
    fn duration_heuristic_rounds_to_minutes() {
        assert_eq!(estimated_minutes(5.0), 13.0);
        assert_eq!(estimated_minutes(4.0), 10.0);
        assert_eq!(estimated_minutes(-1.0), 0.0);
    }

    #[test]
    fn coordinate_label_uses_four_decimals() {
        let p = GeoPoint {
            lat: -23.550512,
            lng: -46.633309,
        };
        assert_eq!(coordinate_label(&p), "Lat: -23.5505, Lng: -46.6333");
    }
}
