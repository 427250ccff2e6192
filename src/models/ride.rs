use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A human-readable label plus the coordinate it was resolved to, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub label: String,
    pub point: Option<GeoPoint>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Person,
    Goods,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    CancelledWithPenalty,
}

impl RideStatus {
    pub const ACTIVE: [RideStatus; 3] = [
        RideStatus::Pending,
        RideStatus::Accepted,
        RideStatus::InProgress,
    ];

    pub const TERMINAL: [RideStatus; 3] = [
        RideStatus::Completed,
        RideStatus::Cancelled,
        RideStatus::CancelledWithPenalty,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Pending => "pending",
            RideStatus::Accepted => "accepted",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::CancelledWithPenalty => "cancelled_with_penalty",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ride {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub origin: Place,
    pub destination: Place,
    pub service_type: ServiceType,
    pub status: RideStatus,
    pub estimated_price: f64,
    pub final_price: Option<f64>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
    pub rating: Option<u8>,
    pub courier_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Final price when the ride was settled, otherwise the creation quote.
    pub fn charged_price(&self) -> f64 {
        self.final_price.unwrap_or(self.estimated_price)
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id || self.courier_id == Some(user_id)
    }
}

/// Row payload for a ride insert; the gateway assigns id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRide {
    pub requester_id: Uuid,
    pub origin: Place,
    pub destination: Place,
    pub service_type: ServiceType,
    pub estimated_price: f64,
    pub distance_km: Option<f64>,
    pub duration_min: Option<f64>,
}

/// Partial update. `None` leaves a column untouched; `courier_id: Some(None)`
/// clears the courier reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RidePatch {
    pub status: Option<RideStatus>,
    pub courier_id: Option<Option<Uuid>>,
    pub final_price: Option<f64>,
    pub rating: Option<u8>,
    pub courier_location: Option<GeoPoint>,
}

impl RidePatch {
    pub fn status(status: RideStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, ride: &mut Ride) {
        if let Some(status) = self.status {
            ride.status = status;
        }
        if let Some(courier_id) = self.courier_id {
            ride.courier_id = courier_id;
        }
        if let Some(final_price) = self.final_price {
            ride.final_price = Some(final_price);
        }
        if let Some(rating) = self.rating {
            ride.rating = Some(rating);
        }
        if let Some(location) = self.courier_location {
            ride.courier_location = Some(location);
        }
    }
}

/// A realtime UPDATE event for one ride row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideChange {
    pub old: Option<Ride>,
    pub new: Ride,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filter for ride reads. Empty `statuses` matches every status.
#[derive(Debug, Clone, Default)]
pub struct RideQuery {
    pub requester_id: Option<Uuid>,
    pub courier_id: Option<Uuid>,
    pub statuses: Vec<RideStatus>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl RideQuery {
    pub fn requested_by(mut self, user_id: Uuid) -> Self {
        self.requester_id = Some(user_id);
        self
    }

    pub fn assigned_to(mut self, courier_id: Uuid) -> Self {
        self.courier_id = Some(courier_id);
        self
    }

    pub fn with_statuses(mut self, statuses: &[RideStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, ride: &Ride) -> bool {
        if self.requester_id.is_some_and(|id| ride.requester_id != id) {
            return false;
        }
        if self.courier_id.is_some() && ride.courier_id != self.courier_id {
            return false;
        }
        self.statuses.is_empty() || self.statuses.contains(&ride.status)
    }
}

/// Name of the other party of a ride, joined from its profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Counterpart {
    pub id: Uuid,
    pub name: String,
}

/// The ride an actor is currently tracking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActiveRide {
    pub ride: Ride,
    pub counterpart: Option<Counterpart>,
}

/// A pending ride as listed in a courier's availability pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableRide {
    pub ride: Ride,
    pub requester_name: Option<String>,
}
