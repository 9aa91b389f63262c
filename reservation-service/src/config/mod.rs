use chrono::{FixedOffset, Offset, Utc};
use secrecy::Secret;
use service_core::config::{self as core_config, get_env, get_env_parsed, Environment};
use service_core::error::AppError;

use crate::services::writer::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Clone)]
pub struct ReservationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageBackend,
    pub numbering: NumberingConfig,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Mongo(MongoConfig),
    /// Process-local; everything is lost on restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
    /// Multi-document transactions; the server must be a replica set.
    pub use_transactions: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct NumberingConfig {
    /// Offset in which the (year, month) of a sequence scope is read.
    pub utc_offset: FixedOffset,
    pub max_attempts: u32,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReservationConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.environment == Environment::Prod;

        let storage = match get_env("STORAGE_BACKEND", Some("mongo"), is_prod)?
            .trim()
            .to_lowercase()
            .as_str()
        {
            "mongo" | "mongodb" => StorageBackend::Mongo(MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("reservations"), is_prod)?,
                use_transactions: get_env_parsed("MONGODB_TRANSACTIONS", Some("true"), is_prod)?,
            }),
            "memory" => {
                if is_prod {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "STORAGE_BACKEND=memory is not allowed in production"
                    )));
                }
                StorageBackend::Memory
            }
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORAGE_BACKEND '{}', expected mongo or memory",
                    other
                )))
            }
        };

        let offset_minutes: i32 =
            get_env_parsed("SEQUENCE_UTC_OFFSET_MINUTES", Some("0"), is_prod)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "SEQUENCE_UTC_OFFSET_MINUTES out of range: {}",
                offset_minutes
            ))
        })?;
        let max_attempts: u32 = get_env_parsed(
            "SEQUENCE_MAX_ATTEMPTS",
            Some(&DEFAULT_MAX_ATTEMPTS.to_string()),
            is_prod,
        )?;
        if max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SEQUENCE_MAX_ATTEMPTS must be at least 1"
            )));
        }

        Ok(Self {
            service_name: get_env("SERVICE_NAME", Some("reservation-service"), is_prod)?,
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: std::env::var("OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            storage,
            numbering: NumberingConfig {
                utc_offset,
                max_attempts,
            },
            common,
        })
    }
}
