//! Gateway for a Supabase-style backend: GoTrue auth under `/auth/v1` and
//! PostgREST tables and RPCs under `/rest/v1`.
//!
//! Row realtime is emulated by polling the watched row and diffing it
//! against the last seen version.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::gateway::{Gateway, RideFeed};
use crate::models::admin::{AdminStats, AuditEntry};
use crate::models::balance::BalanceEntry;
use crate::models::profile::{ProfilePatch, Role, UserProfile};
use crate::models::ride::{
    GeoPoint, NewRide, Place, Ride, RideChange, RidePatch, RideQuery, RideStatus, ServiceType,
    SortOrder,
};
use crate::models::tariff::{Tariff, TariffUpdate};
use crate::session::Credentials;

const RIDES: &str = "corridas";
const PROFILES: &str = "usuarios";
const TARIFFS: &str = "tarifas";
const AUDIT_LOG: &str = "admin_logs";
const STATS: &str = "admin_stats";
const LEDGER: &str = "saldos_motoboys";

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct PostgrestGateway {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    poll_interval: Duration,
}

impl PostgrestGateway {
    pub fn new(base_url: &str, anon_key: &str, poll_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    fn request(&self, method: Method, path: &str, auth: Option<&Credentials>) -> RequestBuilder {
        let token = auth.map_or(self.anon_key.as_str(), |auth| auth.access_token.as_str());
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    fn table(&self, method: Method, table: &str, auth: &Credentials) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"), Some(auth))
    }

    fn rpc(&self, function: &str, auth: &Credentials) -> RequestBuilder {
        self.request(Method::POST, &format!("/rest/v1/rpc/{function}"), Some(auth))
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, AppError> {
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    async fn first<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>, AppError> {
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), AppError> {
        checked(request.send().await?).await?;
        Ok(())
    }

    async fn sign(&self, path: &str, email: &str, password: &str) -> Result<Credentials, AppError> {
        let request = self
            .request(Method::POST, path, None)
            .json(&json!({ "email": email, "password": password }));
        let response: AuthResponse = checked(request.send().await?).await?.json().await?;

        let user_id = response
            .user
            .map(|user| user.id)
            .or(response.id)
            .ok_or_else(|| AppError::Backend("auth response without a user".to_string()))?;
        let access_token = response.access_token.ok_or_else(|| {
            AppError::Validation("confirm the email address before signing in".to_string())
        })?;

        Ok(Credentials {
            user_id,
            access_token,
        })
    }
}

async fn checked(response: Response) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(%status, body = %body, "backend request rejected");
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AppError::Validation(body),
        StatusCode::UNAUTHORIZED => AppError::Unauthenticated,
        StatusCode::FORBIDDEN => AppError::Forbidden(body),
        StatusCode::NOT_FOUND => AppError::NotFound(body),
        _ => AppError::Backend(format!("{status}: {body}")),
    })
}

/// Diffs a polled row against the last one seen. The first poll is always
/// emitted so a change made before it is not lost.
fn observe(last: &mut Option<Ride>, ride: Ride) -> Option<RideChange> {
    if last.as_ref() == Some(&ride) {
        return None;
    }
    let old = last.replace(ride.clone());
    Some(RideChange { old, new: ride })
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn one_of<T: std::fmt::Display>(values: impl IntoIterator<Item = T>) -> String {
    let joined: Vec<String> = values.into_iter().map(|value| value.to_string()).collect();
    format!("in.({})", joined.join(","))
}

#[derive(Deserialize)]
struct AuthUser {
    id: Uuid,
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    user: Option<AuthUser>,
    /// Sign-up without a session returns the bare user object.
    id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum WireStatus {
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "aceito")]
    Accepted,
    #[serde(rename = "em_andamento")]
    InProgress,
    #[serde(rename = "concluido")]
    Completed,
    #[serde(rename = "cancelado")]
    Cancelled,
    #[serde(rename = "cancelado_com_multa")]
    CancelledWithPenalty,
}

impl WireStatus {
    fn as_str(self) -> &'static str {
        match self {
            WireStatus::Pending => "pendente",
            WireStatus::Accepted => "aceito",
            WireStatus::InProgress => "em_andamento",
            WireStatus::Completed => "concluido",
            WireStatus::Cancelled => "cancelado",
            WireStatus::CancelledWithPenalty => "cancelado_com_multa",
        }
    }
}

impl From<RideStatus> for WireStatus {
    fn from(status: RideStatus) -> Self {
        match status {
            RideStatus::Pending => WireStatus::Pending,
            RideStatus::Accepted => WireStatus::Accepted,
            RideStatus::InProgress => WireStatus::InProgress,
            RideStatus::Completed => WireStatus::Completed,
            RideStatus::Cancelled => WireStatus::Cancelled,
            RideStatus::CancelledWithPenalty => WireStatus::CancelledWithPenalty,
        }
    }
}

impl From<WireStatus> for RideStatus {
    fn from(status: WireStatus) -> Self {
        match status {
            WireStatus::Pending => RideStatus::Pending,
            WireStatus::Accepted => RideStatus::Accepted,
            WireStatus::InProgress => RideStatus::InProgress,
            WireStatus::Completed => RideStatus::Completed,
            WireStatus::Cancelled => RideStatus::Cancelled,
            WireStatus::CancelledWithPenalty => RideStatus::CancelledWithPenalty,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum WireService {
    #[serde(rename = "pessoa")]
    Person,
    #[serde(rename = "mercadoria")]
    Goods,
}

impl From<ServiceType> for WireService {
    fn from(service: ServiceType) -> Self {
        match service {
            ServiceType::Person => WireService::Person,
            ServiceType::Goods => WireService::Goods,
        }
    }
}

impl From<WireService> for ServiceType {
    fn from(service: WireService) -> Self {
        match service {
            WireService::Person => ServiceType::Person,
            WireService::Goods => ServiceType::Goods,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum WireRole {
    #[serde(rename = "cliente")]
    Client,
    #[serde(rename = "motoboy")]
    Courier,
    #[serde(rename = "admin")]
    Admin,
}

impl From<Role> for WireRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Client => WireRole::Client,
            Role::Courier => WireRole::Courier,
            Role::Admin => WireRole::Admin,
        }
    }
}

impl From<WireRole> for Role {
    fn from(role: WireRole) -> Self {
        match role {
            WireRole::Client => Role::Client,
            WireRole::Courier => Role::Courier,
            WireRole::Admin => Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct WirePoint {
    latitude: f64,
    longitude: f64,
}

impl From<GeoPoint> for WirePoint {
    fn from(point: GeoPoint) -> Self {
        Self {
            latitude: point.lat,
            longitude: point.lng,
        }
    }
}

impl From<WirePoint> for GeoPoint {
    fn from(point: WirePoint) -> Self {
        Self {
            lat: point.latitude,
            lng: point.longitude,
        }
    }
}

#[derive(Deserialize)]
struct RideRow {
    id: Uuid,
    usuario_id: Uuid,
    motoboy_id: Option<Uuid>,
    origem: String,
    destino: String,
    origem_coords: Option<WirePoint>,
    destino_coords: Option<WirePoint>,
    tipo_servico: WireService,
    valor_estimado: f64,
    valor_final: Option<f64>,
    status_corrida: WireStatus,
    distancia: Option<f64>,
    duracao: Option<f64>,
    avaliacao: Option<f64>,
    localizacao_motoboy: Option<WirePoint>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RideRow> for Ride {
    fn from(row: RideRow) -> Self {
        Self {
            id: row.id,
            requester_id: row.usuario_id,
            courier_id: row.motoboy_id,
            origin: Place {
                label: row.origem,
                point: row.origem_coords.map(GeoPoint::from),
            },
            destination: Place {
                label: row.destino,
                point: row.destino_coords.map(GeoPoint::from),
            },
            service_type: row.tipo_servico.into(),
            status: row.status_corrida.into(),
            estimated_price: row.valor_estimado,
            final_price: row.valor_final,
            distance_km: row.distancia,
            duration_min: row.duracao,
            rating: row.avaliacao.map(|rating| rating.round().clamp(0.0, 5.0) as u8),
            courier_location: row.localizacao_motoboy.map(GeoPoint::from),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Serialize)]
struct NewRideRow<'a> {
    usuario_id: Uuid,
    origem: &'a str,
    destino: &'a str,
    origem_coords: Option<WirePoint>,
    destino_coords: Option<WirePoint>,
    tipo_servico: WireService,
    valor_estimado: f64,
    status_corrida: WireStatus,
    distancia: Option<f64>,
    duracao: Option<f64>,
}

impl<'a> From<&'a NewRide> for NewRideRow<'a> {
    fn from(ride: &'a NewRide) -> Self {
        Self {
            usuario_id: ride.requester_id,
            origem: &ride.origin.label,
            destino: &ride.destination.label,
            origem_coords: ride.origin.point.map(WirePoint::from),
            destino_coords: ride.destination.point.map(WirePoint::from),
            tipo_servico: ride.service_type.into(),
            valor_estimado: ride.estimated_price,
            status_corrida: WireStatus::Pending,
            distancia: ride.distance_km,
            duracao: ride.duration_min,
        }
    }
}

#[derive(Serialize)]
struct RidePatchRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    status_corrida: Option<WireStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    motoboy_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valor_final: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avaliacao: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    localizacao_motoboy: Option<WirePoint>,
    updated_at: DateTime<Utc>,
}

impl From<&RidePatch> for RidePatchRow {
    fn from(patch: &RidePatch) -> Self {
        Self {
            status_corrida: patch.status.map(WireStatus::from),
            motoboy_id: patch.courier_id,
            valor_final: patch.final_price,
            avaliacao: patch.rating,
            localizacao_motoboy: patch.courier_location.map(WirePoint::from),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ProfileRow {
    id: Uuid,
    nome: String,
    telefone: String,
    tipo_usuario: WireRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    avaliacao: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cnh_verificada: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documento_moto_verificado: Option<bool>,
    #[serde(default)]
    banido: Option<bool>,
    #[serde(skip_serializing)]
    created_at: Option<DateTime<Utc>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            id: row.id,
            name: row.nome,
            phone: row.telefone,
            role: row.tipo_usuario.into(),
            rating: row.avaliacao,
            license_verified: row.cnh_verificada,
            vehicle_docs_verified: row.documento_moto_verificado,
            banned: row.banido.unwrap_or(false),
            created_at: row.created_at.unwrap_or_else(Utc::now),
        }
    }
}

impl From<&UserProfile> for ProfileRow {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id,
            nome: profile.name.clone(),
            telefone: profile.phone.clone(),
            tipo_usuario: profile.role.into(),
            avaliacao: profile.rating,
            cnh_verificada: profile.license_verified,
            documento_moto_verificado: profile.vehicle_docs_verified,
            banido: Some(profile.banned),
            created_at: None,
        }
    }
}

#[derive(Serialize)]
struct ProfilePatchRow<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    nome: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    telefone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cnh_verificada: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    documento_moto_verificado: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    banido: Option<bool>,
    updated_at: DateTime<Utc>,
}

impl<'a> From<&'a ProfilePatch> for ProfilePatchRow<'a> {
    fn from(patch: &'a ProfilePatch) -> Self {
        Self {
            nome: patch.name.as_deref(),
            telefone: patch.phone.as_deref(),
            cnh_verificada: patch.license_verified,
            documento_moto_verificado: patch.vehicle_docs_verified,
            banido: patch.banned,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Deserialize)]
struct TariffRow {
    id: Uuid,
    tipo_servico: WireService,
    taxa_base: f64,
    taxa_por_km: f64,
    ativo: bool,
}

impl From<TariffRow> for Tariff {
    fn from(row: TariffRow) -> Self {
        Self {
            id: row.id,
            service_type: row.tipo_servico.into(),
            base_fee: row.taxa_base,
            per_km_rate: row.taxa_por_km,
            active: row.ativo,
        }
    }
}

#[derive(Deserialize)]
struct StatsRow {
    id: Uuid,
    data_referencia: NaiveDate,
    total_usuarios: i64,
    total_clientes: i64,
    total_motoboys: i64,
    total_corridas: i64,
    corridas_pendentes: i64,
    corridas_em_andamento: i64,
    corridas_concluidas: i64,
    receita_total: f64,
    receita_dia: f64,
}

impl From<StatsRow> for AdminStats {
    fn from(row: StatsRow) -> Self {
        Self {
            id: row.id,
            reference_date: row.data_referencia,
            total_users: row.total_usuarios,
            total_clients: row.total_clientes,
            total_couriers: row.total_motoboys,
            total_rides: row.total_corridas,
            pending_rides: row.corridas_pendentes,
            in_progress_rides: row.corridas_em_andamento,
            completed_rides: row.corridas_concluidas,
            total_revenue: row.receita_total,
            daily_revenue: row.receita_dia,
        }
    }
}

#[derive(Deserialize)]
struct LedgerRow {
    id: Uuid,
    corrida_id: Uuid,
    valor_corrida: f64,
    taxa_app: f64,
    valor_motoboy: f64,
    data_corrida: DateTime<Utc>,
}

impl From<LedgerRow> for BalanceEntry {
    fn from(row: LedgerRow) -> Self {
        Self {
            id: row.id,
            ride_id: row.corrida_id,
            ride_value: row.valor_corrida,
            app_fee: row.taxa_app,
            courier_value: row.valor_motoboy,
            ride_date: row.data_corrida,
        }
    }
}

fn ride_filters(query: &RideQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_string())];
    if let Some(requester_id) = query.requester_id {
        params.push(("usuario_id", eq(requester_id)));
    }
    if let Some(courier_id) = query.courier_id {
        params.push(("motoboy_id", eq(courier_id)));
    }
    if !query.statuses.is_empty() {
        params.push((
            "status_corrida",
            one_of(
                query
                    .statuses
                    .iter()
                    .map(|status| WireStatus::from(*status).as_str()),
            ),
        ));
    }
    let order = match query.order {
        SortOrder::NewestFirst => "created_at.desc",
        SortOrder::OldestFirst => "created_at.asc",
    };
    params.push(("order", order.to_string()));
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

#[async_trait]
impl Gateway for PostgrestGateway {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials, AppError> {
        self.sign("/auth/v1/token?grant_type=password", email, password)
            .await
    }

    async fn register(&self, email: &str, password: &str) -> Result<Credentials, AppError> {
        self.sign("/auth/v1/signup", email, password).await
    }

    async fn revoke(&self, auth: &Credentials) -> Result<(), AppError> {
        self.execute(self.request(Method::POST, "/auth/v1/logout", Some(auth)))
            .await
    }

    async fn insert_profile(
        &self,
        auth: &Credentials,
        profile: &UserProfile,
    ) -> Result<(), AppError> {
        let request = self
            .table(Method::POST, PROFILES, auth)
            .json(&ProfileRow::from(profile));
        self.execute(request).await
    }

    async fn profile(&self, auth: &Credentials, id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let request = self
            .table(Method::GET, PROFILES, auth)
            .query(&[("select", "*".to_string()), ("id", eq(id))]);
        Ok(self.first::<ProfileRow>(request).await?.map(UserProfile::from))
    }

    async fn profiles_by_ids(
        &self,
        auth: &Credentials,
        ids: &[Uuid],
    ) -> Result<Vec<UserProfile>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .table(Method::GET, PROFILES, auth)
            .query(&[("select", "*".to_string()), ("id", one_of(ids))]);
        let rows: Vec<ProfileRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn recent_profiles(
        &self,
        auth: &Credentials,
        limit: usize,
    ) -> Result<Vec<UserProfile>, AppError> {
        let request = self.table(Method::GET, PROFILES, auth).query(&[
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        let rows: Vec<ProfileRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn update_profile(
        &self,
        auth: &Credentials,
        id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, AppError> {
        let request = self
            .table(Method::PATCH, PROFILES, auth)
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .json(&ProfilePatchRow::from(patch));
        self.first::<ProfileRow>(request)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
    }

    async fn delete_profile(&self, auth: &Credentials, id: Uuid) -> Result<(), AppError> {
        let request = self
            .table(Method::DELETE, PROFILES, auth)
            .query(&[("id", eq(id))]);
        self.execute(request).await
    }

    async fn insert_ride(&self, auth: &Credentials, ride: &NewRide) -> Result<Ride, AppError> {
        let request = self
            .table(Method::POST, RIDES, auth)
            .header("Prefer", "return=representation")
            .json(&NewRideRow::from(ride));
        self.first::<RideRow>(request)
            .await?
            .map(Ride::from)
            .ok_or_else(|| AppError::Backend("ride insert returned no row".to_string()))
    }

    async fn ride(&self, auth: &Credentials, id: Uuid) -> Result<Option<Ride>, AppError> {
        let request = self
            .table(Method::GET, RIDES, auth)
            .query(&[("select", "*".to_string()), ("id", eq(id))]);
        Ok(self.first::<RideRow>(request).await?.map(Ride::from))
    }

    async fn rides(&self, auth: &Credentials, query: &RideQuery) -> Result<Vec<Ride>, AppError> {
        let request = self
            .table(Method::GET, RIDES, auth)
            .query(&ride_filters(query));
        let rows: Vec<RideRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(Ride::from).collect())
    }

    async fn update_ride(
        &self,
        auth: &Credentials,
        id: Uuid,
        patch: &RidePatch,
    ) -> Result<Ride, AppError> {
        let request = self
            .table(Method::PATCH, RIDES, auth)
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .json(&RidePatchRow::from(patch));
        self.first::<RideRow>(request)
            .await?
            .map(Ride::from)
            .ok_or_else(|| AppError::NotFound(format!("ride {id} not found")))
    }

    async fn update_ride_if(
        &self,
        auth: &Credentials,
        id: Uuid,
        expected: RideStatus,
        patch: &RidePatch,
    ) -> Result<Option<Ride>, AppError> {
        let request = self
            .table(Method::PATCH, RIDES, auth)
            .query(&[
                ("id", eq(id)),
                ("status_corrida", eq(WireStatus::from(expected).as_str())),
            ])
            .header("Prefer", "return=representation")
            .json(&RidePatchRow::from(patch));
        Ok(self.first::<RideRow>(request).await?.map(Ride::from))
    }

    fn subscribe_ride(&self, auth: &Credentials, id: Uuid) -> RideFeed {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let state = (self.clone(), auth.clone(), ticker, None::<Ride>);

        let stream = futures::stream::unfold(state, move |(gateway, auth, mut ticker, mut last)| async move {
            loop {
                ticker.tick().await;
                match gateway.ride(&auth, id).await {
                    Ok(Some(ride)) => {
                        if let Some(change) = observe(&mut last, ride) {
                            return Some((change, (gateway, auth, ticker, last)));
                        }
                    }
                    Ok(None) => {
                        debug!(ride_id = %id, "watched ride disappeared; ending feed");
                        return None;
                    }
                    Err(err) => warn!(ride_id = %id, error = %err, "ride poll failed"),
                }
            }
        });
        Box::pin(stream)
    }

    async fn active_tariffs(&self, auth: &Credentials) -> Result<Vec<Tariff>, AppError> {
        let request = self.table(Method::GET, TARIFFS, auth).query(&[
            ("select", "*"),
            ("ativo", "eq.true"),
            ("order", "tipo_servico"),
        ]);
        let rows: Vec<TariffRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(Tariff::from).collect())
    }

    async fn update_tariff(
        &self,
        auth: &Credentials,
        id: Uuid,
        update: &TariffUpdate,
    ) -> Result<Tariff, AppError> {
        let request = self
            .table(Method::PATCH, TARIFFS, auth)
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .json(&json!({
                "taxa_base": update.base_fee,
                "taxa_por_km": update.per_km_rate,
            }));
        self.first::<TariffRow>(request)
            .await?
            .map(Tariff::from)
            .ok_or_else(|| AppError::NotFound(format!("tariff {id} not found")))
    }

    async fn insert_audit(&self, auth: &Credentials, entry: &AuditEntry) -> Result<(), AppError> {
        let request = self.table(Method::POST, AUDIT_LOG, auth).json(&json!({
            "admin_id": entry.admin_id,
            "acao": entry.action,
            "detalhes": entry.details,
        }));
        self.execute(request).await
    }

    async fn latest_stats(&self, auth: &Credentials) -> Result<Option<AdminStats>, AppError> {
        let request = self.table(Method::GET, STATS, auth).query(&[
            ("select", "*"),
            ("order", "data_referencia.desc"),
            ("limit", "1"),
        ]);
        Ok(self.first::<StatsRow>(request).await?.map(AdminStats::from))
    }

    async fn refresh_daily_stats(&self, auth: &Credentials) -> Result<(), AppError> {
        self.execute(self.rpc("update_daily_stats", auth).json(&json!({})))
            .await
    }

    async fn balance_entries(
        &self,
        auth: &Credentials,
        courier_id: Uuid,
    ) -> Result<Vec<BalanceEntry>, AppError> {
        let request = self.table(Method::GET, LEDGER, auth).query(&[
            ("select", "*".to_string()),
            ("motoboy_id", eq(courier_id)),
            ("order", "data_corrida.desc".to_string()),
        ]);
        let rows: Vec<LedgerRow> = self.rows(request).await?;
        Ok(rows.into_iter().map(BalanceEntry::from).collect())
    }

    async fn settle_ride(&self, auth: &Credentials, ride_id: Uuid) -> Result<(), AppError> {
        let request = self
            .rpc("processar_pagamento_corrida", auth)
            .json(&json!({ "corrida_uuid": ride_id }));
        self.execute(request).await
    }
}
