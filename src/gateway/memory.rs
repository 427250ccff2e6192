//! In-process gateway used by the tests and by offline runs when no backend
//! is configured.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{Gateway, RideFeed};
use crate::models::admin::{AdminStats, AuditEntry};
use crate::models::balance::BalanceEntry;
use crate::models::profile::{ProfilePatch, Role, UserProfile};
use crate::models::ride::{NewRide, Ride, RideChange, RidePatch, RideQuery, RideStatus, SortOrder};
use crate::models::tariff::{Tariff, TariffUpdate};
use crate::session::Credentials;

/// Share of a ride's value kept by the platform on settlement.
const SETTLEMENT_FEE_RATE: f64 = 0.20;

struct Account {
    user_id: Uuid,
    password: String,
}

struct StoredRide {
    seq: u64,
    ride: Ride,
}

struct LedgerRow {
    courier_id: Uuid,
    entry: BalanceEntry,
}

pub struct MemoryGateway {
    accounts: DashMap<String, Account>,
    profiles: DashMap<Uuid, UserProfile>,
    rides: DashMap<Uuid, StoredRide>,
    ride_seq: AtomicU64,
    tariffs: DashMap<Uuid, Tariff>,
    audit: Mutex<Vec<AuditEntry>>,
    stats: RwLock<Option<AdminStats>>,
    ledger: DashMap<Uuid, LedgerRow>,
    changes_tx: broadcast::Sender<RideChange>,
}

impl MemoryGateway {
    pub fn new(event_buffer_size: usize) -> Self {
        let (changes_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        Self {
            accounts: DashMap::new(),
            profiles: DashMap::new(),
            rides: DashMap::new(),
            ride_seq: AtomicU64::new(0),
            tariffs: DashMap::new(),
            audit: Mutex::new(Vec::new()),
            stats: RwLock::new(None),
            ledger: DashMap::new(),
            changes_tx,
        }
    }

    /// Gateway preloaded with the default tariffs.
    pub fn seeded(event_buffer_size: usize) -> Self {
        let gateway = Self::new(event_buffer_size);
        for tariff in Tariff::defaults() {
            gateway.put_tariff(tariff);
        }
        gateway
    }

    pub fn put_tariff(&self, tariff: Tariff) {
        self.tariffs.insert(tariff.id, tariff);
    }

    pub fn tariffs(&self) -> Vec<Tariff> {
        self.tariffs.iter().map(|entry| entry.value().clone()).collect()
    }

    pub async fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().await.clone()
    }

    fn mutate_ride<F>(&self, id: Uuid, mutate: F) -> Result<Option<Ride>, AppError>
    where
        F: FnOnce(&Ride) -> Option<RidePatch>,
    {
        let change = {
            let mut stored = self
                .rides
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))?;

            let Some(patch) = mutate(&stored.ride) else {
                return Ok(None);
            };

            let old = stored.ride.clone();
            patch.apply(&mut stored.ride);
            stored.ride.updated_at = Utc::now();
            RideChange {
                old: Some(old),
                new: stored.ride.clone(),
            }
        };

        let ride = change.new.clone();
        let _ = self.changes_tx.send(change);
        Ok(Some(ride))
    }

    fn compute_stats(&self) -> AdminStats {
        let count_role =
            |role: Role| self.profiles.iter().filter(|p| p.role == role).count() as i64;
        let count_status =
            |status: RideStatus| self.rides.iter().filter(|r| r.ride.status == status).count() as i64;

        let today = Utc::now().date_naive();
        let completed: Vec<Ride> = self
            .rides
            .iter()
            .filter(|r| r.ride.status == RideStatus::Completed)
            .map(|r| r.ride.clone())
            .collect();

        AdminStats {
            id: Uuid::new_v4(),
            reference_date: today,
            total_users: self.profiles.len() as i64,
            total_clients: count_role(Role::Client),
            total_couriers: count_role(Role::Courier),
            total_rides: self.rides.len() as i64,
            pending_rides: count_status(RideStatus::Pending),
            in_progress_rides: count_status(RideStatus::InProgress),
            completed_rides: completed.len() as i64,
            total_revenue: completed.iter().map(Ride::charged_price).sum(),
            daily_revenue: completed
                .iter()
                .filter(|ride| ride.updated_at.date_naive() == today)
                .map(Ride::charged_price)
                .sum(),
        }
    }
}

fn issue_credentials(user_id: Uuid) -> Credentials {
    Credentials {
        user_id,
        access_token: Uuid::new_v4().to_string(),
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials, AppError> {
        let account = self
            .accounts
            .get(&email.to_lowercase())
            .ok_or_else(|| AppError::Validation("invalid email or password".to_string()))?;

        if account.password != password {
            return Err(AppError::Validation("invalid email or password".to_string()));
        }
        Ok(issue_credentials(account.user_id))
    }

    async fn register(&self, email: &str, password: &str) -> Result<Credentials, AppError> {
        let key = email.to_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(AppError::Validation(format!("{email} is already registered")));
        }

        let user_id = Uuid::new_v4();
        self.accounts.insert(
            key,
            Account {
                user_id,
                password: password.to_string(),
            },
        );
        Ok(issue_credentials(user_id))
    }

    async fn revoke(&self, _auth: &Credentials) -> Result<(), AppError> {
        Ok(())
    }

    async fn insert_profile(
        &self,
        _auth: &Credentials,
        profile: &UserProfile,
    ) -> Result<(), AppError> {
        self.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn profile(&self, _auth: &Credentials, id: Uuid) -> Result<Option<UserProfile>, AppError> {
        Ok(self.profiles.get(&id).map(|entry| entry.value().clone()))
    }

    async fn profiles_by_ids(
        &self,
        _auth: &Credentials,
        ids: &[Uuid],
    ) -> Result<Vec<UserProfile>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.profiles.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn recent_profiles(
        &self,
        _auth: &Credentials,
        limit: usize,
    ) -> Result<Vec<UserProfile>, AppError> {
        let mut profiles: Vec<UserProfile> = self
            .profiles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        profiles.truncate(limit);
        Ok(profiles)
    }

    async fn update_profile(
        &self,
        _auth: &Credentials,
        id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, AppError> {
        let mut profile = self
            .profiles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;
        patch.apply(&mut profile);
        Ok(profile.clone())
    }

    async fn delete_profile(&self, _auth: &Credentials, id: Uuid) -> Result<(), AppError> {
        self.profiles
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    async fn insert_ride(&self, _auth: &Credentials, new: &NewRide) -> Result<Ride, AppError> {
        let now = Utc::now();
        let ride = Ride {
            id: Uuid::new_v4(),
            requester_id: new.requester_id,
            courier_id: None,
            origin: new.origin.clone(),
            destination: new.destination.clone(),
            service_type: new.service_type,
            status: RideStatus::Pending,
            estimated_price: new.estimated_price,
            final_price: None,
            distance_km: new.distance_km,
            duration_min: new.duration_min,
            rating: None,
            courier_location: None,
            created_at: now,
            updated_at: now,
        };

        let seq = self.ride_seq.fetch_add(1, Ordering::SeqCst);
        self.rides.insert(
            ride.id,
            StoredRide {
                seq,
                ride: ride.clone(),
            },
        );
        Ok(ride)
    }

    async fn ride(&self, _auth: &Credentials, id: Uuid) -> Result<Option<Ride>, AppError> {
        Ok(self.rides.get(&id).map(|stored| stored.ride.clone()))
    }

    async fn rides(&self, _auth: &Credentials, query: &RideQuery) -> Result<Vec<Ride>, AppError> {
        let mut matched: Vec<(u64, Ride)> = self
            .rides
            .iter()
            .filter(|stored| query.matches(&stored.ride))
            .map(|stored| (stored.seq, stored.ride.clone()))
            .collect();

        matched.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        if query.order == SortOrder::NewestFirst {
            matched.reverse();
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        Ok(matched.into_iter().map(|(_, ride)| ride).collect())
    }

    async fn update_ride(
        &self,
        _auth: &Credentials,
        id: Uuid,
        patch: &RidePatch,
    ) -> Result<Ride, AppError> {
        self.mutate_ride(id, |_| Some(patch.clone()))?
            .ok_or_else(|| AppError::Internal(format!("update of ride {id} was skipped")))
    }

    async fn update_ride_if(
        &self,
        _auth: &Credentials,
        id: Uuid,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<Option<Ride>, AppError> {
        match self.mutate_ride(id, |ride| (ride.status == expected).then(|| patch.clone())) {
            Err(AppError::NotFound(_)) => Ok(None),
            other => other,
        }
    }

    fn subscribe_ride(&self, _auth: &Credentials, id: Uuid) -> RideFeed {
        let stream = BroadcastStream::new(self.changes_tx.subscribe()).filter_map(move |item| {
            match item {
                Ok(change) if change.new.id == id => Some(change),
                Ok(_) => None,
                Err(err) => {
                    warn!(ride_id = %id, error = %err, "ride feed lagged");
                    None
                }
            }
        });
        Box::pin(stream)
    }

    async fn active_tariffs(&self, _auth: &Credentials) -> Result<Vec<Tariff>, AppError> {
        Ok(self
            .tariffs
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_tariff(
        &self,
        _auth: &Credentials,
        id: Uuid,
        update: &TariffUpdate,
    ) -> Result<Tariff, AppError> {
        let mut tariff = self
            .tariffs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("tariff {id} not found")))?;
        tariff.base_fee = update.base_fee;
        tariff.per_km_rate = update.per_km_rate;
        Ok(tariff.clone())
    }

    async fn insert_audit(&self, _auth: &Credentials, entry: &AuditEntry) -> Result<(), AppError> {
        self.audit.lock().await.push(entry.clone());
        Ok(())
    }

    async fn latest_stats(&self, _auth: &Credentials) -> Result<Option<AdminStats>, AppError> {
        Ok(self.stats.read().await.clone())
    }

    async fn refresh_daily_stats(&self, _auth: &Credentials) -> Result<(), AppError> {
        let stats = self.compute_stats();
        *self.stats.write().await = Some(stats);
        Ok(())
    }

    async fn balance_entries(
        &self,
        _auth: &Credentials,
        courier_id: Uuid,
    ) -> Result<Vec<BalanceEntry>, AppError> {
        let mut entries: Vec<BalanceEntry> = self
            .ledger
            .iter()
            .filter(|row| row.courier_id == courier_id)
            .map(|row| row.entry.clone())
            .collect();
        entries.sort_by(|a, b| b.ride_date.cmp(&a.ride_date));
        Ok(entries)
    }

    async fn settle_ride(&self, _auth: &Credentials, ride_id: Uuid) -> Result<(), AppError> {
        let ride = self
            .rides
            .get(&ride_id)
            .map(|stored| stored.ride.clone())
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        let courier_id = match (ride.status, ride.courier_id) {
            (RideStatus::Completed, Some(courier_id)) => courier_id,
            _ => {
                return Err(AppError::Validation(format!(
                    "ride {ride_id} is not a completed ride"
                )));
            }
        };

        if self.ledger.iter().any(|row| row.entry.ride_id == ride_id) {
            return Err(AppError::Validation(format!("ride {ride_id} is already settled")));
        }

        let ride_value = ride.charged_price();
        let app_fee = ride_value * SETTLEMENT_FEE_RATE;
        let entry = BalanceEntry {
            id: Uuid::new_v4(),
            ride_id,
            ride_value,
            app_fee,
            courier_value: ride_value - app_fee,
            ride_date: ride.updated_at,
        };
        self.ledger.insert(entry.id, LedgerRow { courier_id, entry });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use uuid::Uuid;

    use super::MemoryGateway;
    use crate::gateway::Gateway;
    use crate::models::ride::{GeoPoint, NewRide, Place, RidePatch, RideStatus, ServiceType};
    use crate::session::Credentials;

    fn creds() -> Credentials {
        Credentials {
            user_id: Uuid::new_v4(),
            access_token: "token".to_string(),
        }
    }

    fn new_ride(requester_id: Uuid) -> NewRide {
        let place = |label: &str| Place {
            label: label.to_string(),
            point: Some(GeoPoint { lat: 0.0, lng: 0.0 }),
        };
        NewRide {
            requester_id,
            origin: place("a"),
            destination: place("b"),
            service_type: ServiceType::Goods,
            estimated_price: 10.0,
            distance_km: Some(2.5),
            duration_min: Some(6.0),
        }
    }

    #[tokio::test]
    async fn conditional_update_applies_once() {
        let gateway = MemoryGateway::new(16);
        let auth = creds();
        let ride = gateway.insert_ride(&auth, &new_ride(auth.user_id)).await.unwrap();

        let patch = RidePatch {
            status: Some(RideStatus::Accepted),
            courier_id: Some(Some(Uuid::new_v4())),
            ..RidePatch::default()
        };

        let first = gateway
            .update_ride_if(&auth, ride.id, RideStatus::Pending, &patch)
            .await
            .unwrap();
        let second = gateway
            .update_ride_if(&auth, ride.id, RideStatus::Pending, &patch)
            .await
            .unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn subscription_only_sees_its_ride() {
        let gateway = MemoryGateway::new(16);
        let auth = creds();
        let watched = gateway.insert_ride(&auth, &new_ride(auth.user_id)).await.unwrap();
        let other = gateway.insert_ride(&auth, &new_ride(auth.user_id)).await.unwrap();

        let mut feed = gateway.subscribe_ride(&auth, watched.id);

        gateway
            .update_ride(&auth, other.id, &RidePatch::status(RideStatus::Cancelled))
            .await
            .unwrap();
        gateway
            .update_ride(&auth, watched.id, &RidePatch::status(RideStatus::Cancelled))
            .await
            .unwrap();

        let change = feed.next().await.unwrap();
        assert_eq!(change.new.id, watched.id);
        assert_eq!(change.old.unwrap().status, RideStatus::Pending);
        assert_eq!(change.new.status, RideStatus::Cancelled);
    }

    #[tokio::test]
    async fn settlement_requires_completed_ride() {
        let gateway = MemoryGateway::new(16);
        let auth = creds();
        let courier = Uuid::new_v4();
        let ride = gateway.insert_ride(&auth, &new_ride(auth.user_id)).await.unwrap();

        assert!(gateway.settle_ride(&auth, ride.id).await.is_err());

        gateway
            .update_ride(
                &auth,
                ride.id,
                &RidePatch {
                    status: Some(RideStatus::Completed),
                    courier_id: Some(Some(courier)),
                    ..RidePatch::default()
                },
            )
            .await
            .unwrap();
        gateway.settle_ride(&auth, ride.id).await.unwrap();
        assert!(gateway.settle_ride(&auth, ride.id).await.is_err());

        let entries = gateway.balance_entries(&auth, courier).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!((entries[0].courier_value - 8.0).abs() < 1e-9);
    }
}
