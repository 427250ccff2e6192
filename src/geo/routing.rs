use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::geo::{coordinate_label, estimated_minutes, haversine_km};
use crate::models::ride::GeoPoint;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteInfo {
    pub distance_km: f64,
    pub duration_min: f64,
    /// Encoded polyline; empty for straight-line estimates.
    pub polyline: String,
}

/// External directions and geocoding service.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(&self, from: GeoPoint, to: GeoPoint) -> Result<RouteInfo, AppError>;

    async fn reverse_geocode(&self, point: GeoPoint) -> Result<Option<String>, AppError>;

    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>, AppError>;
}

/// Resolves routes and addresses through the configured provider, falling
/// back to haversine estimates when there is none or it fails.
#[derive(Clone)]
pub struct RouteResolver {
    provider: Option<Arc<dyn RoutingProvider>>,
    metrics: Metrics,
}

impl RouteResolver {
    pub fn new(provider: Option<Arc<dyn RoutingProvider>>, metrics: Metrics) -> Self {
        Self { provider, metrics }
    }

    pub fn straight_line(metrics: Metrics) -> Self {
        Self::new(None, metrics)
    }

    pub async fn route(&self, from: GeoPoint, to: GeoPoint) -> RouteInfo {
        if let Some(provider) = &self.provider {
            match provider.route(from, to).await {
                Ok(route) => {
                    self.metrics
                        .route_lookups_total
                        .with_label_values(&["provider"])
                        .inc();
                    return route;
                }
                Err(err) => {
                    warn!(error = %err, "routing provider failed; using straight-line estimate");
                }
            }
        } else {
            debug!("no routing provider configured; using straight-line estimate");
        }

        self.metrics
            .route_lookups_total
            .with_label_values(&["fallback"])
            .inc();
        straight_line_route(&from, &to)
    }

    pub async fn address_for(&self, point: GeoPoint) -> String {
        if let Some(provider) = &self.provider {
            match provider.reverse_geocode(point).await {
                Ok(Some(address)) => return address,
                Ok(None) => {}
                Err(err) => warn!(error = %err, "reverse geocoding failed"),
            }
        }
        coordinate_label(&point)
    }

    pub async fn locate(&self, query: &str) -> Option<GeoPoint> {
        let provider = self.provider.as_ref()?;
        match provider.geocode(query).await {
            Ok(point) => point,
            Err(err) => {
                warn!(error = %err, "geocoding failed");
                None
            }
        }
    }
}

pub fn straight_line_route(from: &GeoPoint, to: &GeoPoint) -> RouteInfo {
    let distance_km = haversine_km(from, to);
    RouteInfo {
        distance_km,
        duration_min: estimated_minutes(distance_km),
        polyline: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{RouteInfo, RouteResolver, RoutingProvider};
    use crate::error::AppError;
    use crate::models::ride::GeoPoint;
    use crate::observability::metrics::Metrics;

    struct Unreachable;

    #[async_trait]
    impl RoutingProvider for Unreachable {
        async fn route(&self, _from: GeoPoint, _to: GeoPoint) -> Result<RouteInfo, AppError> {
            Err(AppError::Backend("connection refused".to_string()))
        }

        async fn reverse_geocode(&self, _point: GeoPoint) -> Result<Option<String>, AppError> {
            Err(AppError::Backend("connection refused".to_string()))
        }

        async fn geocode(&self, _query: &str) -> Result<Option<GeoPoint>, AppError> {
            Err(AppError::Backend("connection refused".to_string()))
        }
    }

    struct Fixed;

    #[async_trait]
    impl RoutingProvider for Fixed {
        async fn route(&self, _from: GeoPoint, _to: GeoPoint) -> Result<RouteInfo, AppError> {
            Ok(RouteInfo {
                distance_km: 7.2,
                duration_min: 18.0,
                polyline: "abc".to_string(),
            })
        }

        async fn reverse_geocode(&self, _point: GeoPoint) -> Result<Option<String>, AppError> {
            Ok(Some("Av. Paulista, 1000".to_string()))
        }

        async fn geocode(&self, _query: &str) -> Result<Option<GeoPoint>, AppError> {
            Ok(Some(GeoPoint { lat: 1.0, lng: 2.0 }))
        }
    }

    fn a() -> GeoPoint {
        GeoPoint {
            lat: -23.5505,
            lng: -46.6333,
        }
    }

    fn b() -> GeoPoint {
        GeoPoint {
            lat: -23.5614,
            lng: -46.6559,
        }
    }

    #[tokio::test]
    async fn without_provider_uses_haversine() {
        let resolver = RouteResolver::straight_line(Metrics::new());
        let route = resolver.route(a(), b()).await;

        assert!(route.distance_km > 2.0 && route.distance_km < 3.0);
        assert!(route.polyline.is_empty());
        assert_eq!(resolver.locate("Av. Paulista").await, None);
        assert_eq!(resolver.address_for(a()).await, "Lat: -23.5505, Lng: -46.6333");
    }

    #[tokio::test]
    async fn failing_provider_falls_back() {
        let resolver = RouteResolver::new(Some(Arc::new(Unreachable)), Metrics::new());
        let route = resolver.route(a(), b()).await;

        assert!(route.distance_km > 2.0 && route.distance_km < 3.0);
        assert!(resolver.address_for(a()).await.starts_with("Lat: "));
        assert_eq!(resolver.locate("Av. Paulista").await, None);
    }

    #[tokio::test]
    async fn provider_result_wins_when_available() {
        let resolver = RouteResolver::new(Some(Arc::new(Fixed)), Metrics::new());
        let route = resolver.route(a(), b()).await;

        assert_eq!(route.distance_km, 7.2);
        assert_eq!(route.polyline, "abc");
        assert_eq!(resolver.address_for(a()).await, "Av. Paulista, 1000");
        assert_eq!(
            resolver.locate("paulista").await,
            Some(GeoPoint { lat: 1.0, lng: 2.0 })
        );
    }
}
