//! Configuration loader for the telemetry session service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). The broker defaults match what the device
//! firmware ships with, so a fresh install connects without any setup.
//!
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable with a default value.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| $default.to_string())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Broker host used when a connect request leaves it out.
    pub broker_host: String,

    /// Broker port used when a connect request leaves it out.
    pub broker_port: u16,

    /// Telemetry topic used when a connect request leaves it out.
    pub topic: String,

    /// MQTT client identifier.
    pub client_id: String,

    /// MQTT keep-alive interval.
    pub keep_alive: Duration,

    /// Connect to the default broker right after startup.
    pub auto_connect: bool,

    /// Largest poll rate, in seconds, accepted from callers.
    pub poll_rate_max_secs: u32,

    /// Directory receiving `data.csv` exports.
    pub export_dir: PathBuf,

    /// Port of the HTTP control surface.
    pub http_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        // ---
        Self {
            broker_host: "broker.emqx.io".to_string(),
            broker_port: 1883,
            topic: "BenRID".to_string(),
            client_id: "sensorflow-client".to_string(),
            keep_alive: Duration::from_secs(60),
            auto_connect: false,
            poll_rate_max_secs: 10,
            export_dir: PathBuf::from("."),
            http_port: 8080,
        }
    }
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `MQTT_BROKER_HOST` – default broker host (default: broker.emqx.io)
/// - `MQTT_BROKER_PORT` – default broker port (default: 1883)
/// - `MQTT_TOPIC` – default telemetry topic (default: BenRID)
/// - `MQTT_CLIENT_ID` – MQTT client id (default: sensorflow-client)
/// - `MQTT_KEEP_ALIVE_SECS` – keep-alive in seconds (default: 60)
/// - `MQTT_AUTO_CONNECT` – connect on startup (default: false)
/// - `POLL_RATE_MAX_SECS` – max accepted poll rate (default: 10)
/// - `EXPORT_DIR` – CSV export directory (default: .)
/// - `HTTP_PORT` – control surface port (default: 8080)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let defaults = Config::default();

    let keep_alive_secs = parse_env!("MQTT_KEEP_ALIVE_SECS", u64, defaults.keep_alive.as_secs());
    let poll_rate_max_secs = parse_env!("POLL_RATE_MAX_SECS", u32, defaults.poll_rate_max_secs);
    if poll_rate_max_secs == 0 {
        return Err(anyhow!("Invalid POLL_RATE_MAX_SECS: must be at least 1"));
    }

    Ok(Config {
        broker_host: env_or!("MQTT_BROKER_HOST", defaults.broker_host),
        broker_port: parse_env!("MQTT_BROKER_PORT", u16, defaults.broker_port),
        topic: env_or!("MQTT_TOPIC", defaults.topic),
        client_id: env_or!("MQTT_CLIENT_ID", defaults.client_id),
        keep_alive: Duration::from_secs(keep_alive_secs),
        auto_connect: parse_env!("MQTT_AUTO_CONNECT", bool, defaults.auto_connect),
        poll_rate_max_secs,
        export_dir: PathBuf::from(env_or!("EXPORT_DIR", defaults.export_dir.display())),
        http_port: parse_env!("HTTP_PORT", u16, defaults.http_port),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  MQTT_BROKER_HOST     : {}", self.broker_host);
        tracing::info!("  MQTT_BROKER_PORT     : {}", self.broker_port);
        tracing::info!("  MQTT_TOPIC           : {}", self.topic);
        tracing::info!("  MQTT_CLIENT_ID       : {}", self.client_id);
        tracing::info!("  MQTT_KEEP_ALIVE_SECS : {}", self.keep_alive.as_secs());
        tracing::info!("  MQTT_AUTO_CONNECT    : {}", self.auto_connect);
        tracing::info!("  POLL_RATE_MAX_SECS   : {}", self.poll_rate_max_secs);
        tracing::info!("  EXPORT_DIR           : {}", self.export_dir.display());
        tracing::info!("  HTTP_PORT            : {}", self.http_port);
    }
}
