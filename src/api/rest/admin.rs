use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::extract::AsAdmin;
use crate::error::AppError;
use crate::models::admin::Dashboard;
use crate::models::ride::{Ride, RideStatus};
use crate::models::tariff::{Tariff, TariffUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/dashboard/reload", post(reload_dashboard))
        .route("/admin/stats/refresh", post(refresh_stats))
        .route("/admin/couriers/:id", delete(reject_courier))
        .route("/admin/couriers/:id/approve", post(approve_courier))
        .route("/admin/users/:id/ban", post(ban_user))
        .route("/admin/rides/:id/status", patch(override_status))
        .route("/admin/tariffs/:id", put(update_tariff))
}

#[derive(Deserialize)]
pub struct StatusOverride {
    pub status: RideStatus,
}

async fn dashboard(AsAdmin(view): AsAdmin) -> Json<Dashboard> {
    Json(view.aggregator.dashboard().await)
}

async fn reload_dashboard(AsAdmin(view): AsAdmin) -> Json<Dashboard> {
    Json(view.aggregator.load().await)
}

async fn refresh_stats(AsAdmin(view): AsAdmin) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(view.aggregator.refresh_stats().await?))
}

async fn approve_courier(
    AsAdmin(view): AsAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    view.aggregator.approve_courier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reject_courier(
    AsAdmin(view): AsAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    view.aggregator.reject_courier(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ban_user(AsAdmin(view): AsAdmin, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    view.aggregator.ban_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn override_status(
    AsAdmin(view): AsAdmin,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusOverride>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(
        view.aggregator.update_ride_status(id, payload.status).await?,
    ))
}

async fn update_tariff(
    AsAdmin(view): AsAdmin,
    Path(id): Path<Uuid>,
    Json(payload): Json<TariffUpdate>,
) -> Result<Json<Tariff>, AppError> {
    Ok(Json(view.aggregator.update_tariff(id, payload).await?))
}
