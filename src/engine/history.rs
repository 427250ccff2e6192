use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::Gateway;
use crate::models::balance::{Balance, Earnings, History};
use crate::models::profile::Role;
use crate::models::ride::{Ride, RidePatch, RideQuery, RideStatus, SortOrder};
use crate::session::Session;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// Finished rides, ratings and the courier ledger for the signed-in user.
pub struct RideHistory {
    gateway: Arc<dyn Gateway>,
    session: Session,
}

impl RideHistory {
    pub fn new(gateway: Arc<dyn Gateway>, session: Session) -> Self {
        Self { gateway, session }
    }

    pub async fn history(&self) -> Result<History, AppError> {
        let user_id = self.session.user_id();
        let query = match self.session.role() {
            Role::Courier => RideQuery::default().assigned_to(user_id),
            _ => RideQuery::default().requested_by(user_id),
        }
        .with_statuses(&RideStatus::TERMINAL)
        .ordered(SortOrder::NewestFirst);

        let rides = self
            .gateway
            .rides(&self.session.credentials, &query)
            .await?;

        let earnings = (self.session.role() == Role::Courier).then(|| earnings_of(&rides));
        Ok(History { rides, earnings })
    }

    pub async fn rate_ride(&self, ride_id: Uuid, rating: u8) -> Result<Ride, AppError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(AppError::Validation(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }

        let auth = &self.session.credentials;
        let ride = self
            .gateway
            .ride(auth, ride_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        if ride.requester_id != self.session.user_id() {
            return Err(AppError::Forbidden(
                "only the requester can rate a ride".to_string(),
            ));
        }
        if ride.status != RideStatus::Completed {
            return Err(AppError::Validation(
                "only completed rides can be rated".to_string(),
            ));
        }

        let patch = RidePatch {
            rating: Some(rating),
            ..RidePatch::default()
        };
        let rated = self.gateway.update_ride(auth, ride_id, &patch).await?;
        info!(ride_id = %ride_id, rating, "ride rated");
        Ok(rated)
    }

    /// Courier ledger. A failed read yields an empty balance.
    pub async fn balance(&self) -> Balance {
        match self
            .gateway
            .balance_entries(&self.session.credentials, self.session.user_id())
            .await
        {
            Ok(entries) => Balance::from_entries(entries),
            Err(err) => {
                warn!(error = %err, "failed to load courier balance");
                Balance::default()
            }
        }
    }

    pub async fn settle(&self, ride_id: Uuid) -> Result<Balance, AppError> {
        let auth = &self.session.credentials;
        let ride = self
            .gateway
            .ride(auth, ride_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))?;

        if ride.courier_id != Some(self.session.user_id()) {
            return Err(AppError::Forbidden(
                "only the assigned courier settles a ride".to_string(),
            ));
        }
        if ride.status != RideStatus::Completed {
            return Err(AppError::Validation(
                "only completed rides can be settled".to_string(),
            ));
        }

        self.gateway.settle_ride(auth, ride_id).await?;
        info!(ride_id = %ride_id, "ride settled");
        Ok(self.balance().await)
    }
}

fn earnings_of(rides: &[Ride]) -> Earnings {
    let completed: Vec<&Ride> = rides
        .iter()
        .filter(|ride| ride.status == RideStatus::Completed)
        .collect();
    Earnings {
        completed_rides: completed.len(),
        total: completed.iter().map(|ride| ride.charged_price()).sum(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::RideHistory;
    use crate::error::AppError;
    use crate::gateway::memory::MemoryGateway;
    use crate::gateway::Gateway;
    use crate::models::profile::Role;
    use crate::models::ride::{GeoPoint, NewRide, Place, Ride, RidePatch, RideStatus, ServiceType};
    use crate::session::{sign_up, Session, SignUp};

    async fn register(gateway: &MemoryGateway, name: &str, role: Role) -> Session {
        sign_up(
            gateway,
            &SignUp {
                email: format!("{name}@example.com"),
                password: "pw".to_string(),
                name: name.to_string(),
                phone: "11".to_string(),
                role,
            },
        )
        .await
        .unwrap()
    }

    async fn finished_ride(
        gateway: &MemoryGateway,
        client: &Session,
        courier: &Session,
        price: f64,
        status: RideStatus,
    ) -> Ride {
        let place = Place {
            label: "Centro".to_string(),
            point: Some(GeoPoint {
                lat: -23.55,
                lng: -46.63,
            }),
        };
        let ride = gateway
            .insert_ride(
                &client.credentials,
                &NewRide {
                    requester_id: client.user_id(),
                    origin: place.clone(),
                    destination: place,
                    service_type: ServiceType::Person,
                    estimated_price: price,
                    distance_km: Some(1.0),
                    duration_min: Some(3.0),
                },
            )
            .await
            .unwrap();
        gateway
            .update_ride(
                &courier.credentials,
                ride.id,
                &RidePatch {
                    status: Some(status),
                    courier_id: Some(Some(courier.user_id())),
                    ..RidePatch::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn courier_history_sums_completed_rides() {
        let gateway = Arc::new(MemoryGateway::seeded(16));
        let client = register(&gateway, "ana", Role::Client).await;
        let courier = register(&gateway, "bruno", Role::Courier).await;

        let first = finished_ride(&gateway, &client, &courier, 20.0, RideStatus::Completed).await;
        finished_ride(&gateway, &client, &courier, 7.0, RideStatus::CancelledWithPenalty).await;
        let last = finished_ride(&gateway, &client, &courier, 12.5, RideStatus::Completed).await;

        let history = RideHistory::new(gateway.clone(), courier).history().await.unwrap();

        assert_eq!(history.rides.len(), 3);
        assert_eq!(history.rides[0].id, last.id);
        assert_eq!(history.rides[2].id, first.id);
        let earnings = history.earnings.unwrap();
        assert_eq!(earnings.completed_rides, 2);
        assert!((earnings.total - 32.5).abs() < 1e-9);

        let client_history = RideHistory::new(gateway.clone(), client).history().await.unwrap();
        assert_eq!(client_history.rides.len(), 3);
        assert!(client_history.earnings.is_none());
    }

    #[tokio::test]
    async fn rating_is_bounded_and_reserved_for_requester() {
        let gateway = Arc::new(MemoryGateway::seeded(16));
        let client = register(&gateway, "ana", Role::Client).await;
        let courier = register(&gateway, "bruno", Role::Courier).await;
        let ride = finished_ride(&gateway, &client, &courier, 20.0, RideStatus::Completed).await;

        let as_client = RideHistory::new(gateway.clone(), client);
        for rating in [0, 6] {
            let result = as_client.rate_ride(ride.id, rating).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }

        let as_courier = RideHistory::new(gateway.clone(), courier);
        let result = as_courier.rate_ride(ride.id, 4).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let rated = as_client.rate_ride(ride.id, 4).await.unwrap();
        assert_eq!(rated.rating, Some(4));
    }

    #[tokio::test]
    async fn settling_updates_the_balance() {
        let gateway = Arc::new(MemoryGateway::seeded(16));
        let client = register(&gateway, "ana", Role::Client).await;
        let courier = register(&gateway, "bruno", Role::Courier).await;
        let ride = finished_ride(&gateway, &client, &courier, 25.0, RideStatus::Completed).await;
        let cancelled =
            finished_ride(&gateway, &client, &courier, 9.0, RideStatus::Cancelled).await;

        let ledger = RideHistory::new(gateway.clone(), courier);
        assert!(ledger.balance().await.entries.is_empty());

        let result = ledger.settle(cancelled.id).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let balance = ledger.settle(ride.id).await.unwrap();
        assert_eq!(balance.entries.len(), 1);
        assert!((balance.total - 20.0).abs() < 1e-9);
    }
}
