//! Ride lifecycle coordinator.
//!
//! One actor per signed-in client or courier. It owns the actor's active
//! ride and consumes three inputs in arrival order: local intents sent
//! through [`CoordinatorHandle`], realtime changes of the tracked ride, and
//! the results of mutations it spawned. Mutations run in their own tasks so
//! pushes keep being applied while a request is in flight; whichever update
//! is applied last wins.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::fare;
use crate::engine::lifecycle::check_transition;
use crate::engine::pool::AvailabilityPool;
use crate::error::AppError;
use crate::gateway::{Gateway, RideFeed};
use crate::geo::routing::RouteResolver;
use crate::models::profile::Role;
use crate::models::ride::{
    ActiveRide, Counterpart, GeoPoint, NewRide, Place, Ride, RideChange, RidePatch, RideQuery,
    RideStatus, ServiceType, SortOrder,
};
use crate::observability::metrics::Metrics;
use crate::session::Session;

#[derive(Debug, Clone, Deserialize)]
pub struct RideRequest {
    pub origin: Place,
    pub destination: Place,
    pub service_type: ServiceType,
}

/// Change notifications for observers of the active ride.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RideEvent {
    Tracked { active: ActiveRide },
    Updated { active: ActiveRide },
    Cleared { ride_id: Uuid, status: RideStatus },
}

/// Everything a coordinator task needs to talk to the outside world.
#[derive(Clone)]
pub struct CoordinatorContext {
    pub gateway: Arc<dyn Gateway>,
    pub routing: RouteResolver,
    pub session: Session,
    pub pool: Option<Arc<AvailabilityPool>>,
    pub metrics: Metrics,
}

type Reply<T> = oneshot::Sender<Result<T, AppError>>;

enum Intent {
    Request {
        request: RideRequest,
        reply: Reply<ActiveRide>,
    },
    Accept {
        ride_id: Uuid,
        reply: Reply<ActiveRide>,
    },
    Advance {
        ride_id: Uuid,
        next: RideStatus,
        reply: Reply<Ride>,
    },
    Cancel {
        ride_id: Uuid,
        reply: Reply<Ride>,
    },
    ShareLocation {
        point: GeoPoint,
        reply: Reply<Ride>,
    },
    Reload {
        reply: oneshot::Sender<Option<ActiveRide>>,
    },
}

enum Settled {
    Tracked {
        result: Result<ActiveRide, AppError>,
        reply: Reply<ActiveRide>,
    },
    Updated {
        result: Result<Ride, AppError>,
        reply: Reply<Ride>,
    },
    Reloaded {
        generation: u64,
        result: Result<Option<ActiveRide>, AppError>,
        reply: Option<oneshot::Sender<Option<ActiveRide>>>,
    },
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    intents: mpsc::Sender<Intent>,
    active: watch::Receiver<Option<ActiveRide>>,
    events: broadcast::Sender<RideEvent>,
}

impl CoordinatorHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Intent,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.intents
            .send(make(reply))
            .await
            .map_err(|_| AppError::Internal("ride coordinator stopped".to_string()))?;
        response
            .await
            .map_err(|_| AppError::Internal("ride coordinator dropped the request".to_string()))
    }

    pub async fn request_ride(&self, request: RideRequest) -> Result<ActiveRide, AppError> {
        self.call(|reply| Intent::Request { request, reply }).await?
    }

    pub async fn accept_ride(&self, ride_id: Uuid) -> Result<ActiveRide, AppError> {
        self.call(|reply| Intent::Accept { ride_id, reply }).await?
    }

    pub async fn advance_status(&self, ride_id: Uuid, next: RideStatus) -> Result<Ride, AppError> {
        self.call(|reply| Intent::Advance {
            ride_id,
            next,
            reply,
        })
        .await?
    }

    pub async fn cancel_ride(&self, ride_id: Uuid) -> Result<Ride, AppError> {
        self.call(|reply| Intent::Cancel { ride_id, reply }).await?
    }

    pub async fn share_location(&self, point: GeoPoint) -> Result<Ride, AppError> {
        self.call(|reply| Intent::ShareLocation { point, reply })
            .await?
    }

    /// Re-reads the active ride. Failures keep the previous state.
    pub async fn reload(&self) -> Option<ActiveRide> {
        match self.call(|reply| Intent::Reload { reply }).await {
            Ok(active) => active,
            Err(_) => self.active(),
        }
    }

    pub fn active(&self) -> Option<ActiveRide> {
        self.active.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<ActiveRide>> {
        self.active.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RideEvent> {
        self.events.subscribe()
    }
}

/// Starts the coordinator task and loads the actor's active ride.
pub fn spawn(
    ctx: CoordinatorContext,
    command_queue_size: usize,
    event_buffer_size: usize,
) -> CoordinatorHandle {
    let (intents_tx, intents_rx) = mpsc::channel(command_queue_size.max(1));
    let (settled_tx, settled_rx) = mpsc::unbounded_channel();
    let (active_tx, active_rx) = watch::channel(None);
    let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

    let coordinator = Coordinator {
        ctx,
        active: None,
        tracking_in_flight: false,
        feed: None,
        generation: 0,
        settled_tx,
        active_tx,
        events_tx: events_tx.clone(),
    };
    coordinator.spawn_reload(None);

    tokio::spawn(coordinator.run(intents_rx, settled_rx));

    CoordinatorHandle {
        intents: intents_tx,
        active: active_rx,
        events: events_tx,
    }
}

struct Coordinator {
    ctx: CoordinatorContext,
    active: Option<ActiveRide>,
    /// Set while a request or accept is running; at most one may be.
    tracking_in_flight: bool,
    feed: Option<RideFeed>,
    /// Bumped whenever the tracked ride changes; stale reloads are dropped.
    generation: u64,
    settled_tx: mpsc::UnboundedSender<Settled>,
    active_tx: watch::Sender<Option<ActiveRide>>,
    events_tx: broadcast::Sender<RideEvent>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        mut settled: mpsc::UnboundedReceiver<Settled>,
    ) {
        info!(user_id = %self.ctx.session.user_id(), "ride coordinator started");

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => self.on_intent(intent),
                    None => break,
                },
                Some(outcome) = settled.recv() => self.on_settled(outcome),
                change = next_change(&mut self.feed) => match change {
                    Some(change) => self.on_push(change),
                    None => self.feed = None,
                },
            }
        }

        info!(user_id = %self.ctx.session.user_id(), "ride coordinator stopped");
    }

    fn role(&self) -> Role {
        self.ctx.session.role()
    }

    fn on_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Request { request, reply } => {
                if let Err(err) = self.precheck_request(&request) {
                    let _ = reply.send(Err(err));
                    return;
                }
                self.tracking_in_flight = true;
                let ctx = self.ctx.clone();
                let settled = self.settled_tx.clone();
                tokio::spawn(async move {
                    let result = request_ride(&ctx, request).await;
                    let _ = settled.send(Settled::Tracked { result, reply });
                });
            }
            Intent::Accept { ride_id, reply } => {
                if let Err(err) = self.precheck_accept() {
                    let _ = reply.send(Err(err));
                    return;
                }
                self.tracking_in_flight = true;
                let ctx = self.ctx.clone();
                let settled = self.settled_tx.clone();
                tokio::spawn(async move {
                    let result = accept_ride(&ctx, ride_id).await;
                    let _ = settled.send(Settled::Tracked { result, reply });
                });
            }
            Intent::Advance {
                ride_id,
                next,
                reply,
            } => {
                let ctx = self.ctx.clone();
                let settled = self.settled_tx.clone();
                tokio::spawn(async move {
                    let result = advance_status(&ctx, ride_id, next).await;
                    let _ = settled.send(Settled::Updated { result, reply });
                });
            }
            Intent::Cancel { ride_id, reply } => {
                let ctx = self.ctx.clone();
                let settled = self.settled_tx.clone();
                tokio::spawn(async move {
                    let result = cancel_ride(&ctx, ride_id).await;
                    let _ = settled.send(Settled::Updated { result, reply });
                });
            }
            Intent::ShareLocation { point, reply } => {
                let ride_id = match self.shareable_ride() {
                    Ok(ride_id) => ride_id,
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        return;
                    }
                };
                let ctx = self.ctx.clone();
                let settled = self.settled_tx.clone();
                tokio::spawn(async move {
                    let patch = RidePatch {
                        courier_location: Some(point),
                        ..RidePatch::default()
                    };
                    let result = ctx
                        .gateway
                        .update_ride(&ctx.session.credentials, ride_id, &patch)
                        .await;
                    let _ = settled.send(Settled::Updated { result, reply });
                });
            }
            Intent::Reload { reply } => self.spawn_reload(Some(reply)),
        }
    }

    fn precheck_request(&self, request: &RideRequest) -> Result<(), AppError> {
        if self.role() != Role::Client {
            return Err(AppError::Forbidden("only clients can request rides".to_string()));
        }
        if self.active.is_some() || self.tracking_in_flight {
            return Err(AppError::Validation(
                "an active ride is already being tracked".to_string(),
            ));
        }
        if request.origin.point.is_none() {
            return Err(AppError::Validation("origin coordinates are required".to_string()));
        }
        if request.destination.point.is_none() {
            return Err(AppError::Validation(
                "destination coordinates are required".to_string(),
            ));
        }
        Ok(())
    }

    fn precheck_accept(&self) -> Result<(), AppError> {
        if self.role() != Role::Courier {
            return Err(AppError::Forbidden("only couriers can accept rides".to_string()));
        }
        if self.active.is_some() || self.tracking_in_flight {
            return Err(AppError::Validation(
                "finish the current ride before accepting another".to_string(),
            ));
        }
        Ok(())
    }

    fn shareable_ride(&self) -> Result<Uuid, AppError> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| AppError::Validation("no active ride to share a location on".to_string()))?;
        let ride = &active.ride;

        if self.role() != Role::Courier || ride.courier_id != Some(self.ctx.session.user_id()) {
            return Err(AppError::Forbidden(
                "only the assigned courier shares its location".to_string(),
            ));
        }
        if !matches!(ride.status, RideStatus::Accepted | RideStatus::InProgress) {
            return Err(AppError::Validation(format!(
                "cannot share a location on a {} ride",
                ride.status
            )));
        }
        Ok(ride.id)
    }

    fn on_settled(&mut self, outcome: Settled) {
        match outcome {
            Settled::Tracked { result, reply } => {
                self.tracking_in_flight = false;
                match &result {
                    Ok(active) => self.track(active.clone()),
                    Err(err) => log_failure(err),
                }
                let _ = reply.send(result);
            }
            Settled::Updated { result, reply } => {
                match &result {
                    Ok(ride) => self.apply_update(ride.clone()),
                    Err(err) => log_failure(err),
                }
                let _ = reply.send(result);
            }
            Settled::Reloaded {
                generation,
                result,
                reply,
            } => {
                if generation == self.generation {
                    match result {
                        Ok(Some(active)) => self.track(active),
                        Ok(None) => {
                            if let Some(current) = self.active.clone() {
                                self.clear(current.ride.id, current.ride.status);
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to reload active ride"),
                    }
                } else {
                    debug!(generation, current = self.generation, "dropping stale reload");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(self.active.clone());
                }
            }
        }
    }

    fn on_push(&mut self, change: RideChange) {
        let Some(current) = self.active.clone() else {
            return;
        };
        if change.new.id != current.ride.id || change.new == current.ride {
            return;
        }

        let previous_courier = change
            .old
            .as_ref()
            .map(|old| old.courier_id)
            .unwrap_or(current.ride.courier_id);

        // The counterpart's name only comes with a full read. A terminal
        // push is published as-is since nothing remains to track.
        if !change.new.status.is_terminal() && change.new.courier_id != previous_courier {
            debug!(ride_id = %change.new.id, "courier changed; reloading active ride");
            self.ctx
                .metrics
                .realtime_pushes_total
                .with_label_values(&["reload"])
                .inc();
            self.spawn_reload(None);
            return;
        }

        self.ctx
            .metrics
            .realtime_pushes_total
            .with_label_values(&["merge"])
            .inc();
        self.apply_update(change.new);
    }

    /// Merges a fresh row of the tracked ride, keeping the joined counterpart.
    fn apply_update(&mut self, ride: Ride) {
        let Some(current) = self.active.clone() else {
            if !ride.status.is_terminal() {
                self.spawn_reload(None);
            }
            return;
        };

        if current.ride.id != ride.id {
            if !ride.status.is_terminal() {
                self.spawn_reload(None);
            }
            return;
        }

        let status = ride.status;
        let active = ActiveRide {
            ride,
            counterpart: current.counterpart,
        };
        self.active = Some(active.clone());
        self.active_tx.send_replace(Some(active.clone()));
        let _ = self.events_tx.send(RideEvent::Updated { active });

        if status.is_terminal() {
            self.clear(current.ride.id, status);
        }
    }

    fn track(&mut self, active: ActiveRide) {
        let same_ride = self
            .active
            .as_ref()
            .is_some_and(|current| current.ride.id == active.ride.id);

        if !same_ride || self.feed.is_none() {
            self.feed = Some(
                self.ctx
                    .gateway
                    .subscribe_ride(&self.ctx.session.credentials, active.ride.id),
            );
            debug!(ride_id = %active.ride.id, "subscribed to ride changes");
        }
        if !same_ride {
            self.generation += 1;
        }

        info!(ride_id = %active.ride.id, status = %active.ride.status, "tracking ride");
        self.active = Some(active.clone());
        self.active_tx.send_replace(Some(active.clone()));
        let _ = self.events_tx.send(RideEvent::Tracked { active });
    }

    fn clear(&mut self, ride_id: Uuid, status: RideStatus) {
        self.active = None;
        self.feed = None;
        self.generation += 1;
        self.active_tx.send_replace(None);
        let _ = self.events_tx.send(RideEvent::Cleared { ride_id, status });
        info!(ride_id = %ride_id, status = %status, "stopped tracking ride");
    }

    fn spawn_reload(&self, reply: Option<oneshot::Sender<Option<ActiveRide>>>) {
        let ctx = self.ctx.clone();
        let settled = self.settled_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = load_active(&ctx).await;
            let _ = settled.send(Settled::Reloaded {
                generation,
                result,
                reply,
            });
        });
    }
}

fn log_failure(err: &AppError) {
    match err {
        AppError::Backend(_) | AppError::Internal(_) => {
            warn!(error = %err, kind = err.kind(), "ride mutation failed")
        }
        _ => debug!(error = %err, kind = err.kind(), "ride mutation refused"),
    }
}

async fn next_change(feed: &mut Option<RideFeed>) -> Option<RideChange> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

async fn refresh_pool(ctx: &CoordinatorContext) {
    if let Some(pool) = &ctx.pool {
        pool.refresh().await;
    }
}

async fn request_ride(
    ctx: &CoordinatorContext,
    request: RideRequest,
) -> Result<ActiveRide, AppError> {
    let result = create_ride(ctx, request).await;
    let outcome = match &result {
        Ok(_) => "created",
        Err(err) => err.kind(),
    };
    ctx.metrics
        .ride_requests_total
        .with_label_values(&[outcome])
        .inc();
    result
}

async fn create_ride(
    ctx: &CoordinatorContext,
    request: RideRequest,
) -> Result<ActiveRide, AppError> {
    let (Some(from), Some(to)) = (request.origin.point, request.destination.point) else {
        return Err(AppError::Validation(
            "origin and destination coordinates are required".to_string(),
        ));
    };

    let route = ctx.routing.route(from, to).await;
    let auth = &ctx.session.credentials;
    let tariffs = ctx.gateway.active_tariffs(auth).await?;
    let estimated_price = fare::estimate(&tariffs, request.service_type, route.distance_km);

    let new_ride = NewRide {
        requester_id: ctx.session.user_id(),
        origin: request.origin,
        destination: request.destination,
        service_type: request.service_type,
        estimated_price,
        distance_km: Some(route.distance_km),
        duration_min: Some(route.duration_min),
    };
    let ride = ctx.gateway.insert_ride(auth, &new_ride).await?;

    info!(
        ride_id = %ride.id,
        service_type = ?ride.service_type,
        distance_km = route.distance_km,
        estimated_price,
        "ride requested"
    );

    Ok(ActiveRide {
        ride,
        counterpart: None,
    })
}

async fn accept_ride(ctx: &CoordinatorContext, ride_id: Uuid) -> Result<ActiveRide, AppError> {
    let courier_id = ctx.session.user_id();
    let patch = RidePatch {
        status: Some(RideStatus::Accepted),
        courier_id: Some(Some(courier_id)),
        ..RidePatch::default()
    };

    let updated = ctx
        .gateway
        .update_ride_if(
            &ctx.session.credentials,
            ride_id,
            RideStatus::Pending,
            &patch,
        )
        .await;

    refresh_pool(ctx).await;

    let result = match updated {
        Ok(Some(ride)) => {
            info!(ride_id = %ride.id, courier_id = %courier_id, "ride accepted");
            Ok(with_counterpart(ctx, ride).await)
        }
        Ok(None) => {
            info!(ride_id = %ride_id, "ride already taken");
            Err(AppError::RideUnavailable(ride_id))
        }
        Err(err) => Err(err),
    };

    let outcome = match &result {
        Ok(_) => "accepted",
        Err(err) => err.kind(),
    };
    ctx.metrics
        .accept_attempts_total
        .with_label_values(&[outcome])
        .inc();
    result
}

async fn current_row(ctx: &CoordinatorContext, ride_id: Uuid) -> Result<Ride, AppError> {
    ctx.gateway
        .ride(&ctx.session.credentials, ride_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("ride {ride_id} not found")))
}

async fn advance_status(
    ctx: &CoordinatorContext,
    ride_id: Uuid,
    next: RideStatus,
) -> Result<Ride, AppError> {
    let ride = current_row(ctx, ride_id).await?;
    check_transition(ctx.session.user_id(), ctx.session.role(), &ride, next)?;

    let updated = ctx
        .gateway
        .update_ride(&ctx.session.credentials, ride_id, &RidePatch::status(next))
        .await?;
    ctx.metrics
        .status_transitions_total
        .with_label_values(&[next.as_str()])
        .inc();
    info!(ride_id = %ride_id, from = %ride.status, to = %next, "ride status advanced");

    if ctx.session.role() == Role::Courier {
        refresh_pool(ctx).await;
    }
    Ok(updated)
}

async fn cancel_ride(ctx: &CoordinatorContext, ride_id: Uuid) -> Result<Ride, AppError> {
    let ride = current_row(ctx, ride_id).await?;
    let role = ctx.session.role();
    check_transition(ctx.session.user_id(), role, &ride, RideStatus::Cancelled)?;

    // A courier walking away drops its reference; the ride stays cancelled.
    let patch = RidePatch {
        status: Some(RideStatus::Cancelled),
        courier_id: (role == Role::Courier).then_some(None),
        ..RidePatch::default()
    };
    let updated = ctx
        .gateway
        .update_ride(&ctx.session.credentials, ride_id, &patch)
        .await?;
    ctx.metrics
        .status_transitions_total
        .with_label_values(&[RideStatus::Cancelled.as_str()])
        .inc();
    info!(ride_id = %ride_id, role = ?role, "ride cancelled");

    if role == Role::Courier {
        refresh_pool(ctx).await;
    }
    Ok(updated)
}

async fn load_active(ctx: &CoordinatorContext) -> Result<Option<ActiveRide>, AppError> {
    let user_id = ctx.session.user_id();
    let query = match ctx.session.role() {
        Role::Client => RideQuery::default()
            .requested_by(user_id)
            .with_statuses(&RideStatus::ACTIVE),
        Role::Courier => RideQuery::default()
            .assigned_to(user_id)
            .with_statuses(&[RideStatus::Accepted, RideStatus::InProgress]),
        Role::Admin => return Ok(None),
    }
    .ordered(SortOrder::NewestFirst)
    .limit(1);

    let ride = ctx
        .gateway
        .rides(&ctx.session.credentials, &query)
        .await?
        .into_iter()
        .next();

    match ride {
        Some(ride) => Ok(Some(with_counterpart(ctx, ride).await)),
        None => Ok(None),
    }
}

/// Joins the other party's name. A failed lookup leaves it empty.
async fn with_counterpart(ctx: &CoordinatorContext, ride: Ride) -> ActiveRide {
    let counterpart_id = match ctx.session.role() {
        Role::Courier => Some(ride.requester_id),
        _ => ride.courier_id,
    };

    let counterpart = match counterpart_id {
        Some(id) => match ctx.gateway.profile(&ctx.session.credentials, id).await {
            Ok(profile) => profile.map(|profile| Counterpart {
                id,
                name: profile.name,
            }),
            Err(err) => {
                warn!(ride_id = %ride.id, error = %err, "failed to load counterpart");
                None
            }
        },
        None => None,
    };

    ActiveRide { ride, counterpart }
}
