use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AppError;
use crate::geo::routing::{RouteInfo, RoutingProvider};
use crate::models::ride::GeoPoint;

/// Google Directions and Geocoding web services.
pub struct GoogleMaps {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl GoogleMaps {
    pub fn new(base_url: String, api_key: String, language: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            language,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(format!("{}/{path}", self.base_url))
            .query(query)
            .query(&[("key", &self.api_key), ("language", &self.language)])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

fn lat_lng(point: &GeoPoint) -> String {
    format!("{},{}", point.lat, point.lng)
}

#[derive(Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Deserialize)]
struct DirectionsRoute {
    legs: Vec<DirectionsLeg>,
    overview_polyline: Polyline,
}

#[derive(Deserialize)]
struct DirectionsLeg {
    distance: Measure,
    duration: Measure,
}

#[derive(Deserialize)]
struct Measure {
    value: f64,
}

#[derive(Deserialize)]
struct Polyline {
    points: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: String,
    geometry: Geometry,
}

#[derive(Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl RoutingProvider for GoogleMaps {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteInfo, AppError> {
        let body: DirectionsResponse = self
            .get(
                "directions/json",
                &[("origin", lat_lng(&from)), ("destination", lat_lng(&to))],
            )
            .await?;

        if body.status != "OK" {
            return Err(AppError::Backend(format!("directions status {}", body.status)));
        }

        let route = body
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Backend("directions returned no routes".to_string()))?;
        let leg = route
            .legs
            .first()
            .ok_or_else(|| AppError::Backend("directions route has no legs".to_string()))?;

        Ok(RouteInfo {
            distance_km: leg.distance.value / 1000.0,
            duration_min: (leg.duration.value / 60.0).round(),
            polyline: route.overview_polyline.points,
        })
    }

    async fn reverse_geocode(&self, point: GeoPoint) -> Result<Option<String>, AppError> {
        let body: GeocodeResponse = self
            .get("geocode/json", &[("latlng", lat_lng(&point))])
            .await?;

        if body.status != "OK" {
            return Ok(None);
        }
        Ok(body.results.into_iter().next().map(|r| r.formatted_address))
    }

    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>, AppError> {
        let body: GeocodeResponse = self
            .get("geocode/json", &[("address", query.to_string())])
            .await?;

        if body.status != "OK" {
            return Ok(None);
        }
        Ok(body.results.into_iter().next().map(|r| GeoPoint {
            lat: r.geometry.location.lat,
            lng: r.geometry.location.lng,
        }))
    }
}
