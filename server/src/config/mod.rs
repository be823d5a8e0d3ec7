use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/smartqueue";
const DEV_JWT_SECRET: &str = "smartqueue-dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Which notification channels the deployment may use.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub sms_enabled: bool,
    pub push_enabled: bool,
    pub email_enabled: bool,
    pub sms_simulate_failure: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub storage_backend: StorageBackend,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_access_ttl_minutes: i64,
    pub jwt_refresh_ttl_days: i64,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_tickets_per_user_per_day: i64,
    pub max_appointments_per_user_per_day: i64,
    pub expiry_sweep_interval_secs: u64,
    pub channels: ChannelConfig,
    pub payment_simulation_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            storage_backend: parse_var("STORAGE_BACKEND", StorageBackend::Postgres)?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5)?,
            bind_addr: parse_var("BIND_ADDR", default_bind_addr())?,
            jwt_secret,
            jwt_access_ttl_minutes: parse_var("JWT_ACCESS_TTL_MINUTES", 60)?,
            jwt_refresh_ttl_days: parse_var("JWT_REFRESH_TTL_DAYS", 7)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").ok(),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            default_page_size: parse_var("DEFAULT_PAGE_SIZE", 20)?,
            max_page_size: parse_var("MAX_PAGE_SIZE", 100)?,
            max_tickets_per_user_per_day: parse_var("MAX_TICKETS_PER_USER_PER_DAY", 5)?,
            max_appointments_per_user_per_day: parse_var("MAX_APPOINTMENTS_PER_USER_PER_DAY", 3)?,
            expiry_sweep_interval_secs: parse_var("EXPIRY_SWEEP_INTERVAL_SECS", 60)?,
            channels: ChannelConfig {
                sms_enabled: parse_bool("SMS_ENABLED", true)?,
                push_enabled: parse_bool("PUSH_ENABLED", true)?,
                email_enabled: parse_bool("EMAIL_ENABLED", true)?,
                sms_simulate_failure: parse_bool("SMS_SIMULATE_FAILURE", false)?,
            },
            payment_simulation_enabled: parse_bool("PAYMENT_SIMULATION_ENABLED", true)?,
        })
    }

    /// Settings for tests and local demos: in-memory storage, no sweep task.
    pub fn for_tests() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            storage_backend: StorageBackend::Memory,
            database_max_connections: 1,
            bind_addr: default_bind_addr(),
            jwt_secret: "test-secret".to_string(),
            jwt_access_ttl_minutes: 60,
            jwt_refresh_ttl_days: 7,
            cors_allowed_origins: None,
            production: false,
            default_page_size: 20,
            max_page_size: 100,
            max_tickets_per_user_per_day: 5,
            max_appointments_per_user_per_day: 3,
            expiry_sweep_interval_secs: 0,
            channels: ChannelConfig {
                sms_enabled: true,
                push_enabled: true,
                email_enabled: true,
                sms_simulate_failure: false,
            },
            payment_simulation_enabled: true,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(default),
    }
}
