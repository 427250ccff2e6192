use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::fare;
use crate::error::AppError;
use crate::models::ride::{GeoPoint, ServiceType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/geo/quote", post(quote))
        .route("/geo/address", post(address))
        .route("/geo/search", get(search))
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub service_type: ServiceType,
}

#[derive(Serialize)]
pub struct QuoteResponse {
    pub distance_km: f64,
    pub duration_min: f64,
    pub polyline: String,
    pub estimated_price: f64,
}

#[derive(Deserialize)]
pub struct AddressRequest {
    pub point: GeoPoint,
}

#[derive(Serialize)]
pub struct AddressResponse {
    pub address: String,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub point: Option<GeoPoint>,
}

async fn quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let session = state.session().await?;
    let route = state.routing.route(payload.origin, payload.destination).await;
    let tariffs = state.gateway.active_tariffs(&session.credentials).await?;

    Ok(Json(QuoteResponse {
        estimated_price: fare::estimate(&tariffs, payload.service_type, route.distance_km),
        distance_km: route.distance_km,
        duration_min: route.duration_min,
        polyline: route.polyline,
    }))
}

async fn address(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddressRequest>,
) -> Json<AddressResponse> {
    Json(AddressResponse {
        address: state.routing.address_for(payload.point).await,
    })
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = params.q.trim().to_string();
    if query.is_empty() {
        return Err(AppError::Validation("q cannot be empty".to_string()));
    }

    let point = state.routing.locate(&query).await;
    Ok(Json(SearchResponse { query, point }))
}
