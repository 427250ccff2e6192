use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ride_requests_total: IntCounterVec,
    pub accept_attempts_total: IntCounterVec,
    pub status_transitions_total: IntCounterVec,
    pub realtime_pushes_total: IntCounterVec,
    pub route_lookups_total: IntCounterVec,
    pub pool_size: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let ride_requests_total = IntCounterVec::new(
            Opts::new("ride_requests_total", "Ride requests by outcome"),
            &["outcome"],
        )
        .expect("valid ride_requests_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Ride accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Ride status changes issued from this instance",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let realtime_pushes_total = IntCounterVec::new(
            Opts::new(
                "realtime_pushes_total",
                "Realtime ride updates by reconciliation path",
            ),
            &["path"],
        )
        .expect("valid realtime_pushes_total metric");

        let route_lookups_total = IntCounterVec::new(
            Opts::new("route_lookups_total", "Route resolutions by source"),
            &["source"],
        )
        .expect("valid route_lookups_total metric");

        let pool_size = IntGauge::new("pool_size", "Pending rides in the availability pool")
            .expect("valid pool_size metric");

        registry
            .register(Box::new(ride_requests_total.clone()))
            .expect("register ride_requests_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(realtime_pushes_total.clone()))
            .expect("register realtime_pushes_total");
        registry
            .register(Box::new(route_lookups_total.clone()))
            .expect("register route_lookups_total");
        registry
            .register(Box::new(pool_size.clone()))
            .expect("register pool_size");

        Self {
            registry,
            ride_requests_total,
            accept_attempts_total,
            status_transitions_total,
            realtime_pushes_total,
            route_lookups_total,
            pool_size,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
