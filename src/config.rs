//! Process configuration read once at boot.
//!
//! Payment keys, mode and the admin credential are not here: those are
//! settings, resolved per request in [`crate::settings`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::payments::stripe::DEFAULT_API_BASE;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_UPLOAD_DIR: &str = "public/images/uploads";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    /// Selects the PostgreSQL store when present.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// Flat-file store directory, used without `database_url`.
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub public_base_url: Option<String>,
    pub currency: String,
    pub session_secret: Option<String>,
    pub cookie_secure: bool,
    pub nats_url: Option<String>,
    pub stripe_api_base: String,
    pub provider_timeout: Duration,
    pub seed_products: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            public_base_url: None,
            currency: DEFAULT_CURRENCY.to_string(),
            session_secret: None,
            cookie_secure: false,
            nats_url: None,
            stripe_api_base: DEFAULT_API_BASE.to_string(),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            seed_products: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(defaults.port),
            database_url: get("DATABASE_URL"),
            db_max_connections: parse(&get, "DB_MAX_CONNECTIONS")?.unwrap_or(defaults.db_max_connections),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            upload_dir: get("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            public_base_url: get("PUBLIC_BASE_URL").map(|u| u.trim_end_matches('/').to_string()),
            currency: get("CURRENCY").map(|c| c.to_ascii_lowercase()).unwrap_or(defaults.currency),
            session_secret: get("SESSION_SECRET"),
            cookie_secure: match get("COOKIE_SECURE") {
                Some(v) => parse_bool("COOKIE_SECURE", &v)?,
                None => get("APP_ENV").is_some_and(|env| env == "production"),
            },
            nats_url: get("NATS_URL"),
            stripe_api_base: get("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            provider_timeout: parse::<u64>(&get, "STRIPE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            seed_products: get("SEED_PRODUCTS").map(PathBuf::from),
        })
    }
}

fn parse<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError> {
    get(name)
        .map(|v| v.parse::<T>().map_err(|_| ConfigError::Invalid { name, value: v.clone() }))
        .transpose()
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid { name, value: value.to_string() }),
    }
}
