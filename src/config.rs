use std::env;
use std::time::Duration;

use crate::error::AppError;

pub const PLACEHOLDER_BACKEND_URL: &str = "https://placeholder.supabase.co";
pub const PLACEHOLDER_BACKEND_KEY: &str = "placeholder-key";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub backend_url: String,
    pub backend_anon_key: String,
    pub routing_api_key: Option<String>,
    pub routing_base_url: String,
    pub routing_language: String,
    pub event_buffer_size: usize,
    pub command_queue_size: usize,
    pub realtime_poll_interval: Duration,
    pub dashboard_ride_limit: usize,
    pub dashboard_user_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            backend_url: PLACEHOLDER_BACKEND_URL.to_string(),
            backend_anon_key: PLACEHOLDER_BACKEND_KEY.to_string(),
            routing_api_key: None,
            routing_base_url: "https://maps.googleapis.com/maps/api".to_string(),
            routing_language: "pt-BR".to_string(),
            event_buffer_size: 1024,
            command_queue_size: 64,
            realtime_poll_interval: Duration::from_millis(2000),
            dashboard_ride_limit: 50,
            dashboard_user_limit: 100,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            backend_url: non_empty("BACKEND_URL").unwrap_or(defaults.backend_url),
            backend_anon_key: non_empty("BACKEND_ANON_KEY").unwrap_or(defaults.backend_anon_key),
            routing_api_key: non_empty("ROUTING_API_KEY"),
            routing_base_url: non_empty("ROUTING_BASE_URL").unwrap_or(defaults.routing_base_url),
            routing_language: non_empty("ROUTING_LANGUAGE").unwrap_or(defaults.routing_language),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            command_queue_size: parse_or_default("COMMAND_QUEUE_SIZE", defaults.command_queue_size)?,
            realtime_poll_interval: Duration::from_millis(parse_or_default(
                "REALTIME_POLL_MS",
                2000u64,
            )?),
            dashboard_ride_limit: parse_or_default(
                "DASHBOARD_RIDE_LIMIT",
                defaults.dashboard_ride_limit,
            )?,
            dashboard_user_limit: parse_or_default(
                "DASHBOARD_USER_LIMIT",
                defaults.dashboard_user_limit,
            )?,
        })
    }

    /// False while either backend setting still holds its placeholder.
    pub fn backend_configured(&self) -> bool {
        self.backend_url != PLACEHOLDER_BACKEND_URL && self.backend_anon_key != PLACEHOLDER_BACKEND_KEY
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
