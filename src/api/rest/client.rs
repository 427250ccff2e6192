use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::AsClient;
use crate::engine::coordinator::RideRequest;
use crate::error::AppError;
use crate::models::balance::History;
use crate::models::ride::{ActiveRide, Ride};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/client/rides", post(request_ride))
        .route("/client/rides/active", get(active_ride))
        .route("/client/rides/active/reload", post(reload_active))
        .route("/client/rides/:id/cancel", post(cancel_ride))
        .route("/client/history", get(history))
        .route("/client/history/:id/rating", post(rate_ride))
}

#[derive(Deserialize)]
pub struct RatingRequest {
    pub rating: u8,
}

async fn request_ride(
    AsClient(view): AsClient,
    Json(payload): Json<RideRequest>,
) -> Result<(StatusCode, Json<ActiveRide>), AppError> {
    let active = view.coordinator.request_ride(payload).await?;
    Ok((StatusCode::CREATED, Json(active)))
}

async fn active_ride(AsClient(view): AsClient) -> Json<Option<ActiveRide>> {
    Json(view.coordinator.active())
}

async fn reload_active(AsClient(view): AsClient) -> Json<Option<ActiveRide>> {
    Json(view.coordinator.reload().await)
}

async fn cancel_ride(
    AsClient(view): AsClient,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(view.coordinator.cancel_ride(id).await?))
}

async fn history(AsClient(view): AsClient) -> Result<Json<History>, AppError> {
    Ok(Json(view.history.history().await?))
}

async fn rate_ride(
    AsClient(view): AsClient,
    Path(id): Path<Uuid>,
    Json(payload): Json<RatingRequest>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(view.history.rate_ride(id, payload.rating).await?))
}
