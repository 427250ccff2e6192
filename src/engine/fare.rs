use crate::models::ride::ServiceType;
use crate::models::tariff::Tariff;

/// Active tariff for a service type, if one is configured.
pub fn tariff_for(tariffs: &[Tariff], service_type: ServiceType) -> Option<&Tariff> {
    tariffs
        .iter()
        .find(|tariff| tariff.active && tariff.service_type == service_type)
}

/// Quoted price: base fee plus the per-km rate over the route distance.
/// Zero when the service type has no active tariff.
pub fn estimate(tariffs: &[Tariff], service_type: ServiceType, distance_km: f64) -> f64 {
    match tariff_for(tariffs, service_type) {
        Some(tariff) => tariff.base_fee + tariff.per_km_rate * distance_km.max(0.0),
        None => 0.0,
    }
}
