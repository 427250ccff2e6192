use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ride::Ride;

/// One settled ride in a courier's ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceEntry {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub ride_value: f64,
    pub app_fee: f64,
    pub courier_value: f64,
    pub ride_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub total: f64,
    pub entries: Vec<BalanceEntry>,
}

impl Balance {
    pub fn from_entries(entries: Vec<BalanceEntry>) -> Self {
        let total = entries.iter().map(|entry| entry.courier_value).sum();
        Self { total, entries }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Earnings {
    pub completed_rides: usize,
    pub total: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    pub rides: Vec<Ride>,
    pub earnings: Option<Earnings>,
}
