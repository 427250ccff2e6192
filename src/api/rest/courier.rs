use std::sync::Arc;

use axum::extract::Path;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::AsCourier;
use crate::error::AppError;
use crate::models::balance::{Balance, History};
use crate::models::ride::{ActiveRide, AvailableRide, GeoPoint, Ride, RideStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courier/pool", get(list_pool))
        .route("/courier/pool/refresh", post(refresh_pool))
        .route("/courier/pool/:id/accept", post(accept_ride))
        .route("/courier/rides/active", get(active_ride))
        .route("/courier/rides/active/location", post(share_location))
        .route("/courier/rides/:id/status", post(advance_status))
        .route("/courier/rides/:id/cancel", post(cancel_ride))
        .route("/courier/history", get(history))
        .route("/courier/balance", get(balance))
        .route("/courier/balance/:ride_id/settle", post(settle))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: RideStatus,
}

async fn list_pool(AsCourier(view): AsCourier) -> Json<Vec<AvailableRide>> {
    Json(view.pool.list().await)
}

async fn refresh_pool(AsCourier(view): AsCourier) -> Json<Vec<AvailableRide>> {
    Json(view.pool.refresh().await)
}

async fn accept_ride(
    AsCourier(view): AsCourier,
    Path(id): Path<Uuid>,
) -> Result<Json<ActiveRide>, AppError> {
    Ok(Json(view.coordinator.accept_ride(id).await?))
}

async fn active_ride(AsCourier(view): AsCourier) -> Json<Option<ActiveRide>> {
    Json(view.coordinator.active())
}

async fn share_location(
    AsCourier(view): AsCourier,
    Json(point): Json<GeoPoint>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(view.coordinator.share_location(point).await?))
}

async fn advance_status(
    AsCourier(view): AsCourier,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(view.coordinator.advance_status(id, payload.status).await?))
}

async fn cancel_ride(
    AsCourier(view): AsCourier,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(view.coordinator.cancel_ride(id).await?))
}

async fn history(AsCourier(view): AsCourier) -> Result<Json<History>, AppError> {
    Ok(Json(view.history.history().await?))
}

async fn balance(AsCourier(view): AsCourier) -> Json<Balance> {
    Json(view.history.balance().await)
}

async fn settle(
    AsCourier(view): AsCourier,
    Path(ride_id): Path<Uuid>,
) -> Result<Json<Balance>, AppError> {
    Ok(Json(view.history.settle(ride_id).await?))
}
