//! Backend gateway: persistence, auth and realtime row changes.
//!
//! Every data call takes the caller's [`Credentials`] so the backend can
//! apply its row-level policies; nothing here holds an ambient session.

pub mod memory;
pub mod postgrest;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::admin::{AdminStats, AuditEntry};
use crate::models::balance::BalanceEntry;
use crate::models::profile::{ProfilePatch, UserProfile};
use crate::models::ride::{NewRide, Ride, RideChange, RidePatch, RideQuery, RideStatus};
use crate::models::tariff::{Tariff, TariffUpdate};
use crate::session::Credentials;

/// Stream of UPDATE events for a single ride. Dropping it ends the
/// subscription.
pub type RideFeed = Pin<Box<dyn Stream<Item = RideChange> + Send>>;

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials, AppError>;

    async fn register(&self, email: &str, password: &str) -> Result<Credentials, AppError>;

    async fn revoke(&self, auth: &Credentials) -> Result<(), AppError>;

    async fn insert_profile(&self, auth: &Credentials, profile: &UserProfile)
        -> Result<(), AppError>;

    async fn profile(&self, auth: &Credentials, id: Uuid) -> Result<Option<UserProfile>, AppError>;

    async fn profiles_by_ids(
        &self,
        auth: &Credentials,
        ids: &[Uuid],
    ) -> Result<Vec<UserProfile>, AppError>;

    /// Most recently created profiles first.
    async fn recent_profiles(
        &self,
        auth: &Credentials,
        limit: usize,
    ) -> Result<Vec<UserProfile>, AppError>;

    async fn update_profile(
        &self,
        auth: &Credentials,
        id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, AppError>;

    async fn delete_profile(&self, auth: &Credentials, id: Uuid) -> Result<(), AppError>;

    async fn insert_ride(&self, auth: &Credentials, ride: &NewRide) -> Result<Ride, AppError>;

    async fn ride(&self, auth: &Credentials, id: Uuid) -> Result<Option<Ride>, AppError>;

    async fn rides(&self, auth: &Credentials, query: &RideQuery) -> Result<Vec<Ride>, AppError>;

    async fn update_ride(
        &self,
        auth: &Credentials,
        id: Uuid,
        patch: &RidePatch,
    ) -> Result<Ride, AppError>;

    /// Applies `patch` only while the row's status equals `expected`.
    /// `Ok(None)` means no row matched.
    async fn update_ride_if(
        &self,
        auth: &Credentials,
        id: Uuid,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<Option<Ride>, AppError>;

    fn subscribe_ride(&self, auth: &Credentials, id: Uuid) -> RideFeed;

    async fn active_tariffs(&self, auth: &Credentials) -> Result<Vec<Tariff>, AppError>;

    async fn update_tariff(
        &self,
        auth: &Credentials,
        id: Uuid,
        update: &TariffUpdate,
    ) -> Result<Tariff, AppError>;

    async fn insert_audit(&self, auth: &Credentials, entry: &AuditEntry) -> Result<(), AppError>;

    async fn latest_stats(&self, auth: &Credentials) -> Result<Option<AdminStats>, AppError>;

    async fn refresh_daily_stats(&self, auth: &Credentials) -> Result<(), AppError>;

    /// Newest entries first.
    async fn balance_entries(
        &self,
        auth: &Credentials,
        courier_id: Uuid,
    ) -> Result<Vec<BalanceEntry>, AppError>;

    async fn settle_ride(&self, auth: &Credentials, ride_id: Uuid) -> Result<(), AppError>;
}
