use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::profile::UserProfile;
use crate::models::ride::Ride;

/// Precomputed daily snapshot maintained by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminStats {
    pub id: Uuid,
    pub reference_date: NaiveDate,
    pub total_users: i64,
    pub total_clients: i64,
    pub total_couriers: i64,
    pub total_rides: i64,
    pub pending_rides: i64,
    pub in_progress_rides: i64,
    pub completed_rides: i64,
    pub total_revenue: f64,
    pub daily_revenue: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub admin_id: Uuid,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartySummary {
    pub name: String,
    pub phone: String,
    pub rating: Option<f64>,
}

impl From<&UserProfile> for PartySummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            phone: profile.phone.clone(),
            rating: profile.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRide {
    pub ride: Ride,
    pub requester: Option<PartySummary>,
    pub courier: Option<PartySummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dashboard {
    pub stats: Option<AdminStats>,
    pub rides: Vec<AdminRide>,
    pub users: Vec<UserProfile>,
}
