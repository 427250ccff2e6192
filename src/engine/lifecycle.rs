use uuid::Uuid;

use crate::error::AppError;
use crate::models::profile::Role;
use crate::models::ride::{Ride, RideStatus};

/// Checks a non-admin status change against the ride's current row.
///
/// `pending -> accepted` goes through the conditional accept instead, and
/// nothing moves a ride back to `pending`.
pub fn check_transition(
    user_id: Uuid,
    role: Role,
    ride: &Ride,
    next: RideStatus,
) -> Result<(), AppError> {
    let from = ride.status;
    let invalid = || AppError::InvalidTransition { from, to: next };

    if from.is_terminal() {
        return Err(invalid());
    }

    let assigned_courier = role == Role::Courier && ride.courier_id == Some(user_id);

    match next {
        RideStatus::Pending | RideStatus::Accepted => Err(invalid()),
        RideStatus::InProgress | RideStatus::Completed => {
            if !assigned_courier {
                return Err(AppError::Forbidden(
                    "only the assigned courier can advance this ride".to_string(),
                ));
            }
            let expected = if next == RideStatus::InProgress {
                RideStatus::Accepted
            } else {
                RideStatus::InProgress
            };
            if from != expected {
                return Err(invalid());
            }
            Ok(())
        }
        RideStatus::Cancelled | RideStatus::CancelledWithPenalty => {
            if !ride.is_party(user_id) {
                return Err(AppError::Forbidden(
                    "only the requester or the assigned courier can cancel".to_string(),
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::check_transition;
    use crate::error::AppError;
    use crate::models::profile::Role;
    use crate::models::ride::{Place, Ride, RideStatus, ServiceType};

    fn ride(status: RideStatus, requester: Uuid, courier: Option<Uuid>) -> Ride {
        let place = Place {
            label: "x".to_string(),
            point: None,
        };
        Ride {
            id: Uuid::new_v4(),
            requester_id: requester,
            courier_id: courier,
            origin: place.clone(),
            destination: place,
            service_type: ServiceType::Person,
            status,
            estimated_price: 10.0,
            final_price: None,
            distance_km: None,
            duration_min: None,
            rating: None,
            courier_location: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn courier_walks_the_happy_path() {
        let client = Uuid::new_v4();
        let courier = Uuid::new_v4();

        let accepted = ride(RideStatus::Accepted, client, Some(courier));
        assert!(check_transition(courier, Role::Courier, &accepted, RideStatus::InProgress).is_ok());

        let started = ride(RideStatus::InProgress, client, Some(courier));
        assert!(check_transition(courier, Role::Courier, &started, RideStatus::Completed).is_ok());
    }

    #[test]
    fn courier_cannot_skip_states() {
        let client = Uuid::new_v4();
        let courier = Uuid::new_v4();

        let pending = ride(RideStatus::Pending, client, None);
        let result = check_transition(courier, Role::Courier, &pending, RideStatus::Completed);
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let accepted = ride(RideStatus::Accepted, client, Some(courier));
        let result = check_transition(courier, Role::Courier, &accepted, RideStatus::Completed);
        assert!(matches!(
            result,
            Err(AppError::InvalidTransition {
                from: RideStatus::Accepted,
                to: RideStatus::Completed
            })
        ));
    }

    #[test]
    fn client_cannot_advance() {
        let client = Uuid::new_v4();
        let accepted = ride(RideStatus::Accepted, client, Some(Uuid::new_v4()));
        let result = check_transition(client, Role::Client, &accepted, RideStatus::InProgress);
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn other_courier_cannot_advance() {
        let accepted = ride(RideStatus::Accepted, Uuid::new_v4(), Some(Uuid::new_v4()));
        let result = check_transition(
            Uuid::new_v4(),
            Role::Courier,
            &accepted,
            RideStatus::InProgress,
        );
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[test]
    fn either_party_cancels_active_rides() {
        let client = Uuid::new_v4();
        let courier = Uuid::new_v4();

        for status in RideStatus::ACTIVE {
            let assigned = (status != RideStatus::Pending).then_some(courier);
            let row = ride(status, client, assigned);
            assert!(check_transition(client, Role::Client, &row, RideStatus::Cancelled).is_ok());
            if assigned.is_some() {
                assert!(
                    check_transition(courier, Role::Courier, &row, RideStatus::Cancelled).is_ok()
                );
            }
        }
    }

    #[test]
    fn terminal_rides_and_pending_are_final() {
        let client = Uuid::new_v4();
        let courier = Uuid::new_v4();

        let completed = ride(RideStatus::Completed, client, Some(courier));
        assert!(check_transition(client, Role::Client, &completed, RideStatus::Cancelled).is_err());

        let accepted = ride(RideStatus::Accepted, client, Some(courier));
        assert!(check_transition(courier, Role::Courier, &accepted, RideStatus::Pending).is_err());
    }
}
