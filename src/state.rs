use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::admin::{AdminAggregator, DashboardLimits};
use crate::engine::coordinator::{self, CoordinatorContext, CoordinatorHandle};
use crate::engine::history::RideHistory;
use crate::engine::pool::AvailabilityPool;
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::geo::routing::{RouteResolver, RoutingProvider};
use crate::models::profile::{ProfilePatch, Role};
use crate::observability::metrics::Metrics;
use crate::session::{self, Session, SessionInfo, SignIn, SignUp};

pub struct ClientView {
    pub coordinator: CoordinatorHandle,
    pub history: RideHistory,
}

pub struct CourierView {
    pub coordinator: CoordinatorHandle,
    pub pool: Arc<AvailabilityPool>,
    pub history: RideHistory,
}

pub struct AdminView {
    pub aggregator: AdminAggregator,
}

/// Role-specific surface, chosen once when the session opens.
#[derive(Clone)]
pub enum View {
    Client(Arc<ClientView>),
    Courier(Arc<CourierView>),
    Admin(Arc<AdminView>),
}

impl View {
    pub fn role(&self) -> Role {
        match self {
            View::Client(_) => Role::Client,
            View::Courier(_) => Role::Courier,
            View::Admin(_) => Role::Admin,
        }
    }

    pub fn coordinator(&self) -> Option<&CoordinatorHandle> {
        match self {
            View::Client(view) => Some(&view.coordinator),
            View::Courier(view) => Some(&view.coordinator),
            View::Admin(_) => None,
        }
    }
}

struct SignedIn {
    session: Session,
    view: View,
}

pub struct AppState {
    pub config: Config,
    pub gateway: Arc<dyn Gateway>,
    pub routing: RouteResolver,
    pub metrics: Metrics,
    signed_in: RwLock<Option<SignedIn>>,
}

impl AppState {
    pub fn new(
        config: Config,
        gateway: Arc<dyn Gateway>,
        routing_provider: Option<Arc<dyn RoutingProvider>>,
    ) -> Self {
        let metrics = Metrics::new();
        Self {
            config,
            gateway,
            routing: RouteResolver::new(routing_provider, metrics.clone()),
            metrics,
            signed_in: RwLock::new(None),
        }
    }

    pub async fn sign_in(&self, request: &SignIn) -> Result<SessionInfo, AppError> {
        let session = session::sign_in(self.gateway.as_ref(), request).await?;
        Ok(self.open(session).await)
    }

    pub async fn sign_up(&self, request: &SignUp) -> Result<SessionInfo, AppError> {
        let session = session::sign_up(self.gateway.as_ref(), request).await?;
        Ok(self.open(session).await)
    }

    /// Drops the role view, which stops its coordinator and subscriptions.
    pub async fn sign_out(&self) -> Result<(), AppError> {
        let signed_in = self
            .signed_in
            .write()
            .await
            .take()
            .ok_or(AppError::Unauthenticated)?;

        self.close(signed_in).await;
        Ok(())
    }

    pub async fn session(&self) -> Result<Session, AppError> {
        self.signed_in
            .read()
            .await
            .as_ref()
            .map(|signed_in| signed_in.session.clone())
            .ok_or(AppError::Unauthenticated)
    }

    pub async fn view(&self) -> Result<View, AppError> {
        self.signed_in
            .read()
            .await
            .as_ref()
            .map(|signed_in| signed_in.view.clone())
            .ok_or(AppError::Unauthenticated)
    }

    pub async fn update_profile(
        &self,
        name: Option<String>,
        phone: Option<String>,
    ) -> Result<SessionInfo, AppError> {
        let name = name.map(|name| name.trim().to_string());
        let phone = phone.map(|phone| phone.trim().to_string());
        if name.as_deref().is_some_and(str::is_empty) || phone.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::Validation(
                "name and phone cannot be empty".to_string(),
            ));
        }

        let session = self.session().await?;
        let patch = ProfilePatch {
            name,
            phone,
            ..ProfilePatch::default()
        };
        let profile = self
            .gateway
            .update_profile(&session.credentials, session.user_id(), &patch)
            .await?;

        let mut guard = self.signed_in.write().await;
        let signed_in = guard.as_mut().ok_or(AppError::Unauthenticated)?;
        signed_in.session.profile = profile;
        Ok(SessionInfo::from(&signed_in.session))
    }

    async fn open(&self, session: Session) -> SessionInfo {
        let view = self.build_view(&session).await;
        let info = SessionInfo::from(&session);

        let previous = self
            .signed_in
            .write()
            .await
            .replace(SignedIn { session, view });
        if let Some(previous) = previous {
            self.close(previous).await;
        }
        info
    }

    async fn close(&self, signed_in: SignedIn) {
        let SignedIn { session, view } = signed_in;
        drop(view);
        if let Err(err) = self.gateway.revoke(&session.credentials).await {
            warn!(error = %err, "failed to revoke session token");
        }
        info!(user_id = %session.user_id(), "signed out");
    }

    async fn build_view(&self, session: &Session) -> View {
        let context = |pool: Option<Arc<AvailabilityPool>>| CoordinatorContext {
            gateway: self.gateway.clone(),
            routing: self.routing.clone(),
            session: session.clone(),
            pool,
            metrics: self.metrics.clone(),
        };
        let spawn = |ctx: CoordinatorContext| {
            coordinator::spawn(
                ctx,
                self.config.command_queue_size,
                self.config.event_buffer_size,
            )
        };

        match session.role() {
            Role::Client => View::Client(Arc::new(ClientView {
                coordinator: spawn(context(None)),
                history: RideHistory::new(self.gateway.clone(), session.clone()),
            })),
            Role::Courier => {
                let pool = Arc::new(AvailabilityPool::new(
                    self.gateway.clone(),
                    session.credentials.clone(),
                    self.metrics.clone(),
                ));
                pool.refresh().await;
                View::Courier(Arc::new(CourierView {
                    coordinator: spawn(context(Some(pool.clone()))),
                    pool,
                    history: RideHistory::new(self.gateway.clone(), session.clone()),
                }))
            }
            Role::Admin => {
                let aggregator = AdminAggregator::new(
                    self.gateway.clone(),
                    session.clone(),
                    DashboardLimits {
                        rides: self.config.dashboard_ride_limit,
                        users: self.config.dashboard_user_limit,
                    },
                );
                aggregator.load().await;
                View::Admin(Arc::new(AdminView { aggregator }))
            }
        }
    }
}
