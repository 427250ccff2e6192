use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::models::profile::Role;
use crate::state::{AdminView, AppState, ClientView, CourierView, View};

fn wrong_role(expected: Role, actual: Role) -> AppError {
    AppError::Forbidden(format!(
        "{actual:?} sessions cannot use {expected:?} routes"
    ))
}

/// Signed-in client. 401 without a session, 403 for other roles.
pub struct AsClient(pub Arc<ClientView>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AsClient {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match state.view().await? {
            View::Client(view) => Ok(Self(view)),
            other => Err(wrong_role(Role::Client, other.role())),
        }
    }
}

pub struct AsCourier(pub Arc<CourierView>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AsCourier {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match state.view().await? {
            View::Courier(view) => Ok(Self(view)),
            other => Err(wrong_role(Role::Courier, other.role())),
        }
    }
}

pub struct AsAdmin(pub Arc<AdminView>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AsAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match state.view().await? {
            View::Admin(view) => Ok(Self(view)),
            other => Err(wrong_role(Role::Admin, other.role())),
        }
    }
}
