use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::engine::join::profiles_for;
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::models::ride::{AvailableRide, RideQuery, RideStatus, SortOrder};
use crate::observability::metrics::Metrics;
use crate::session::Credentials;

/// Courier-side snapshot of the rides still waiting for a courier.
///
/// No client-side locking: two couriers may see the same ride and the
/// backend's conditional accept decides who gets it.
pub struct AvailabilityPool {
    gateway: Arc<dyn Gateway>,
    credentials: Credentials,
    metrics: Metrics,
    rides: RwLock<Vec<AvailableRide>>,
}

impl AvailabilityPool {
    pub fn new(gateway: Arc<dyn Gateway>, credentials: Credentials, metrics: Metrics) -> Self {
        Self {
            gateway,
            credentials,
            metrics,
            rides: RwLock::new(Vec::new()),
        }
    }

    pub async fn list(&self) -> Vec<AvailableRide> {
        self.rides.read().await.clone()
    }

    /// Reloads pending rides, oldest first. On failure the previous
    /// snapshot is kept.
    pub async fn refresh(&self) -> Vec<AvailableRide> {
        match self.load().await {
            Ok(rides) => {
                debug!(pending = rides.len(), "availability pool refreshed");
                self.metrics.pool_size.set(rides.len() as i64);
                *self.rides.write().await = rides.clone();
                rides
            }
            Err(err) => {
                warn!(error = %err, "failed to refresh availability pool");
                self.list().await
            }
        }
    }

    async fn load(&self) -> Result<Vec<AvailableRide>, AppError> {
        let query = RideQuery::default()
            .with_statuses(&[RideStatus::Pending])
            .ordered(SortOrder::OldestFirst);
        let rides = self.gateway.rides(&self.credentials, &query).await?;

        let names = profiles_for(
            self.gateway.as_ref(),
            &self.credentials,
            rides.iter().map(|ride| ride.requester_id),
        )
        .await?;

        Ok(rides
            .into_iter()
            .map(|ride| AvailableRide {
                requester_name: names.get(&ride.requester_id).map(|p| p.name.clone()),
                ride,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::AvailabilityPool;
    use crate::gateway::memory::MemoryGateway;
    use crate::gateway::Gateway;
    use crate::models::profile::{Role, UserProfile};
    use crate::models::ride::{GeoPoint, NewRide, Place, RidePatch, RideStatus, ServiceType};
    use crate::observability::metrics::Metrics;
    use crate::session::Credentials;

    fn new_ride(requester_id: Uuid, label: &str) -> NewRide {
        let place = Place {
            label: label.to_string(),
            point: Some(GeoPoint {
                lat: -23.55,
                lng: -46.63,
            }),
        };
        NewRide {
            requester_id,
            origin: place.clone(),
            destination: place,
            service_type: ServiceType::Person,
            estimated_price: 12.0,
            distance_km: Some(1.0),
            duration_min: Some(3.0),
        }
    }

    #[tokio::test]
    async fn lists_pending_rides_oldest_first_with_names() {
        let gateway = Arc::new(MemoryGateway::new(16));
        let auth = Credentials {
            user_id: Uuid::new_v4(),
            access_token: "t".to_string(),
        };
        let client = UserProfile::signed_up(
            Uuid::new_v4(),
            "Maria".to_string(),
            "1199".to_string(),
            Role::Client,
        );
        gateway.insert_profile(&auth, &client).await.unwrap();

        let first = gateway.insert_ride(&auth, &new_ride(client.id, "first")).await.unwrap();
        let taken = gateway.insert_ride(&auth, &new_ride(client.id, "taken")).await.unwrap();
        let third = gateway.insert_ride(&auth, &new_ride(client.id, "third")).await.unwrap();
        gateway
            .update_ride(&auth, taken.id, &RidePatch::status(RideStatus::Accepted))
            .await
            .unwrap();

        let pool = AvailabilityPool::new(gateway.clone(), auth, Metrics::new());
        let listed = pool.refresh().await;

        let ids: Vec<Uuid> = listed.iter().map(|entry| entry.ride.id).collect();
        assert_eq!(ids, vec![first.id, third.id]);
        assert_eq!(listed[0].requester_name.as_deref(), Some("Maria"));
        assert_eq!(pool.list().await.len(), 2);
    }
}
