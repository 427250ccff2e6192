use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::session::{SessionInfo, SignIn, SignUp};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/session", get(current))
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-up", post(sign_up))
        .route("/session/sign-out", post(sign_out))
        .route("/session/profile", patch(update_profile))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

async fn current(State(state): State<Arc<AppState>>) -> Result<Json<SessionInfo>, AppError> {
    let session = state.session().await?;
    Ok(Json(SessionInfo::from(&session)))
}

async fn sign_in(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignIn>,
) -> Result<Json<SessionInfo>, AppError> {
    Ok(Json(state.sign_in(&payload).await?))
}

async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignUp>,
) -> Result<(StatusCode, Json<SessionInfo>), AppError> {
    let info = state.sign_up(&payload).await?;
    Ok((StatusCode::CREATED, Json(info)))
}

async fn sign_out(State(state): State<Arc<AppState>>) -> Result<StatusCode, AppError> {
    state.sign_out().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<SessionInfo>, AppError> {
    Ok(Json(state.update_profile(payload.name, payload.phone).await?))
}
