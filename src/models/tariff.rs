use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ride::ServiceType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tariff {
    pub id: Uuid,
    pub service_type: ServiceType,
    pub base_fee: f64,
    pub per_km_rate: f64,
    pub active: bool,
}

impl Tariff {
    pub fn new(service_type: ServiceType, base_fee: f64, per_km_rate: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            service_type,
            base_fee,
            per_km_rate,
            active: true,
        }
    }

    /// Tariffs used when no backend is configured.
    pub fn defaults() -> Vec<Tariff> {
        vec![
            Tariff::new(ServiceType::Person, 8.00, 3.50),
            Tariff::new(ServiceType::Goods, 5.00, 2.00),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffUpdate {
    pub base_fee: f64,
    pub per_km_rate: f64,
}
