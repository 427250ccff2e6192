use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::join::profiles_for;
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::models::admin::{AdminRide, AuditEntry, Dashboard, PartySummary};
use crate::models::profile::ProfilePatch;
use crate::models::ride::{Ride, RidePatch, RideQuery, RideStatus, SortOrder};
use crate::models::tariff::{Tariff, TariffUpdate};
use crate::session::Session;

#[derive(Debug, Clone, Copy)]
pub struct DashboardLimits {
    pub rides: usize,
    pub users: usize,
}

impl Default for DashboardLimits {
    fn default() -> Self {
        Self {
            rides: 50,
            users: 100,
        }
    }
}

/// Admin dashboard cache plus the moderation actions.
///
/// Every action is audited after it succeeds. A failed audit write is
/// logged and the action stands.
pub struct AdminAggregator {
    gateway: Arc<dyn Gateway>,
    session: Session,
    limits: DashboardLimits,
    dashboard: RwLock<Dashboard>,
}

impl AdminAggregator {
    pub fn new(gateway: Arc<dyn Gateway>, session: Session, limits: DashboardLimits) -> Self {
        Self {
            gateway,
            session,
            limits,
            dashboard: RwLock::new(Dashboard::default()),
        }
    }

    pub async fn dashboard(&self) -> Dashboard {
        self.dashboard.read().await.clone()
    }

    /// Reloads stats, recent rides and recent users. The previous dashboard
    /// survives a failed load.
    pub async fn load(&self) -> Dashboard {
        match self.fetch().await {
            Ok(dashboard) => {
                *self.dashboard.write().await = dashboard.clone();
                dashboard
            }
            Err(err) => {
                warn!(error = %err, "failed to load admin dashboard");
                self.dashboard().await
            }
        }
    }

    async fn fetch(&self) -> Result<Dashboard, AppError> {
        let auth = &self.session.credentials;

        let stats = self.gateway.latest_stats(auth).await?;
        let query = RideQuery::default()
            .ordered(SortOrder::NewestFirst)
            .limit(self.limits.rides);
        let rides = self.gateway.rides(auth, &query).await?;
        let users = self.gateway.recent_profiles(auth, self.limits.users).await?;

        let parties = profiles_for(
            self.gateway.as_ref(),
            auth,
            rides
                .iter()
                .flat_map(|ride| std::iter::once(ride.requester_id).chain(ride.courier_id)),
        )
        .await?;

        let rides = rides
            .into_iter()
            .map(|ride| {
                let requester = parties.get(&ride.requester_id).map(|p| PartySummary {
                    rating: None,
                    ..PartySummary::from(p)
                });
                let courier = ride
                    .courier_id
                    .and_then(|id| parties.get(&id))
                    .map(PartySummary::from);
                AdminRide {
                    ride,
                    requester,
                    courier,
                }
            })
            .collect();

        Ok(Dashboard {
            stats,
            rides,
            users,
        })
    }

    pub async fn approve_courier(&self, courier_id: Uuid) -> Result<(), AppError> {
        let patch = ProfilePatch {
            license_verified: Some(true),
            vehicle_docs_verified: Some(true),
            ..ProfilePatch::default()
        };
        self.gateway
            .update_profile(&self.session.credentials, courier_id, &patch)
            .await?;
        info!(courier_id = %courier_id, "courier approved");

        self.audit("approve_courier", json!({ "courier_id": courier_id }))
            .await;
        Ok(())
    }

    pub async fn reject_courier(&self, courier_id: Uuid) -> Result<(), AppError> {
        self.gateway
            .delete_profile(&self.session.credentials, courier_id)
            .await?;
        info!(courier_id = %courier_id, "courier rejected");

        self.audit("reject_courier", json!({ "courier_id": courier_id }))
            .await;
        Ok(())
    }

    pub async fn ban_user(&self, user_id: Uuid) -> Result<(), AppError> {
        let patch = ProfilePatch {
            banned: Some(true),
            ..ProfilePatch::default()
        };
        self.gateway
            .update_profile(&self.session.credentials, user_id, &patch)
            .await?;
        info!(user_id = %user_id, "user banned");

        self.audit("ban_user", json!({ "user_id": user_id })).await;
        Ok(())
    }

    /// Overrides a ride's status without lifecycle checks.
    pub async fn update_ride_status(
        &self,
        ride_id: Uuid,
        status: RideStatus,
    ) -> Result<Ride, AppError> {
        let ride = self
            .gateway
            .update_ride(&self.session.credentials, ride_id, &RidePatch::status(status))
            .await?;
        info!(ride_id = %ride_id, status = %status, "ride status overridden");

        self.audit(
            "update_ride_status",
            json!({ "ride_id": ride_id, "new_status": status }),
        )
        .await;
        Ok(ride)
    }

    pub async fn refresh_stats(&self) -> Result<Dashboard, AppError> {
        self.gateway
            .refresh_daily_stats(&self.session.credentials)
            .await?;
        self.audit("refresh_stats", json!({})).await;
        Ok(self.load().await)
    }

    pub async fn update_tariff(
        &self,
        tariff_id: Uuid,
        update: TariffUpdate,
    ) -> Result<Tariff, AppError> {
        if !(update.base_fee >= 0.0 && update.per_km_rate >= 0.0) {
            return Err(AppError::Validation(
                "tariff fees must be non-negative".to_string(),
            ));
        }

        let tariff = self
            .gateway
            .update_tariff(&self.session.credentials, tariff_id, &update)
            .await?;
        info!(tariff_id = %tariff_id, base_fee = update.base_fee, per_km_rate = update.per_km_rate, "tariff updated");

        self.audit(
            "update_tariff",
            json!({
                "tariff_id": tariff_id,
                "base_fee": update.base_fee,
                "per_km_rate": update.per_km_rate,
            }),
        )
        .await;
        Ok(tariff)
    }

    async fn audit(&self, action: &str, details: serde_json::Value) {
        let entry = AuditEntry {
            admin_id: self.session.user_id(),
            action: action.to_string(),
            details,
            created_at: Utc::now(),
        };
        if let Err(err) = self
            .gateway
            .insert_audit(&self.session.credentials, &entry)
            .await
        {
            warn!(action, error = %err, "failed to write audit entry");
        }
    }
}
