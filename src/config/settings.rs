use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub presence: PresenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub environment: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PresenceStoreKind {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub store: PresenceStoreKind,
    /// Devices provisioned into the in-memory store at startup.
    pub memory_devices: Vec<MemoryDevice>,
}

/// One `device_id:subject_id` pair from `MEMORY_DEVICES`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryDevice {
    pub device_id: String,
    pub subject_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
}

/// Timing for the liveness sweep and the per-socket keepalive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceConfig {
    pub sweep_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub ws_ping_interval_secs: u64,
    pub ws_client_timeout_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            ws_ping_interval_secs: 30,
            ws_client_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl AppSettings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // App config
        let app_name = var_or("APP_NAME", "signage-presence");
        let environment = var_or("ENVIRONMENT", "development");

        // Database config
        let store = match var_or("PRESENCE_STORE", "postgres").to_lowercase().as_str() {
            "postgres" => PresenceStoreKind::Postgres,
            "memory" => PresenceStoreKind::Memory,
            other => {
                return Err(AppError::Configuration(format!(
                    "PRESENCE_STORE must be 'postgres' or 'memory', got '{}'",
                    other
                )));
            }
        };
        let database_url = lookup("DATABASE_URL");
        if store == PresenceStoreKind::Postgres && database_url.is_none() {
            return Err(AppError::Configuration("DATABASE_URL must be set".to_string()));
        }
        let memory_devices = parse_memory_devices(&var_or("MEMORY_DEVICES", ""))?;

        // Server config
        let server_host = var_or("SERVER_HOST", "0.0.0.0");
        let server_port = parse_var::<u16>(&var_or("SERVER_PORT", "3000"), "SERVER_PORT")?;
        let cors_origins = var_or("CORS_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Auth config
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Configuration("JWT_SECRET must be set".to_string()))?;
        let jwt_issuer = lookup("JWT_ISSUER").filter(|s| !s.is_empty());

        // Presence timing
        let presence = PresenceConfig {
            sweep_interval_secs: parse_var(
                &var_or("PRESENCE_SWEEP_INTERVAL_SECS", "30"),
                "PRESENCE_SWEEP_INTERVAL_SECS",
            )?,
            heartbeat_timeout_secs: parse_var(
                &var_or("PRESENCE_HEARTBEAT_TIMEOUT_SECS", "60"),
                "PRESENCE_HEARTBEAT_TIMEOUT_SECS",
            )?,
            ws_ping_interval_secs: parse_var(
                &var_or("WS_PING_INTERVAL_SECS", "30"),
                "WS_PING_INTERVAL_SECS",
            )?,
            ws_client_timeout_secs: parse_var(
                &var_or("WS_CLIENT_TIMEOUT_SECS", "60"),
                "WS_CLIENT_TIMEOUT_SECS",
            )?,
        };
        presence.validate()?;

        let level = var_or("LOG_LEVEL", "info");

        Ok(Self {
            app: AppConfig {
                name: app_name,
                environment,
            },
            database: DatabaseConfig {
                url: database_url,
                store,
                memory_devices,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
                cors_origins,
            },
            auth: AuthConfig {
                jwt_secret,
                jwt_issuer,
            },
            presence,
            logging: LoggingConfig { level },
        })
    }
}

impl PresenceConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.sweep_interval_secs == 0 || self.ws_ping_interval_secs == 0 {
            return Err(AppError::Configuration(
                "presence intervals must be greater than zero".to_string(),
            ));
        }
        // At least one missed heartbeat window must be tolerated before a sweep fires.
        if !fits_twice(self.sweep_interval_secs, self.heartbeat_timeout_secs) {
            return Err(AppError::Configuration(format!(
                "PRESENCE_HEARTBEAT_TIMEOUT_SECS ({}) must be at least twice PRESENCE_SWEEP_INTERVAL_SECS ({})",
                self.heartbeat_timeout_secs, self.sweep_interval_secs
            )));
        }
        // Pongs refresh `last_seen` once per ping, so two pings must fit in the timeout.
        if !fits_twice(self.ws_ping_interval_secs, self.heartbeat_timeout_secs) {
            return Err(AppError::Configuration(format!(
                "PRESENCE_HEARTBEAT_TIMEOUT_SECS ({}) must be at least twice WS_PING_INTERVAL_SECS ({})",
                self.heartbeat_timeout_secs, self.ws_ping_interval_secs
            )));
        }
        if self.ws_client_timeout_secs <= self.ws_ping_interval_secs {
            return Err(AppError::Configuration(
                "WS_CLIENT_TIMEOUT_SECS must be greater than WS_PING_INTERVAL_SECS".to_string(),
            ));
        }
        self.heartbeat_timeout()?;
        Ok(())
    }

    /// Staleness threshold for the liveness sweep.
    pub fn heartbeat_timeout(&self) -> Result<chrono::Duration, AppError> {
        i64::try_from(self.heartbeat_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                AppError::Configuration(format!(
                    "PRESENCE_HEARTBEAT_TIMEOUT_SECS ({}) is out of range",
                    self.heartbeat_timeout_secs
                ))
            })
    }
}

fn fits_twice(interval: u64, window: u64) -> bool {
    interval.checked_mul(2).is_some_and(|twice| twice <= window)
}

fn parse_memory_devices(value: &str) -> Result<Vec<MemoryDevice>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((device_id, subject_id))
                if !device_id.trim().is_empty() && !subject_id.trim().is_empty() =>
            {
                Ok(MemoryDevice {
                    device_id: device_id.trim().to_string(),
                    subject_id: subject_id.trim().to_string(),
                })
            }
            _ => Err(AppError::Configuration(format!(
                "MEMORY_DEVICES entries must look like device_id:subject_id, got '{}'",
                entry
            ))),
        })
        .collect()
}

fn parse_var<T: FromStr>(value: &str, key: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| AppError::Configuration(format!("{} must be a valid number", key)))
}
