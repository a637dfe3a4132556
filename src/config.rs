//! Configuration loader for the `infra-telemetry` binaries.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). The API server and the bootstrap share
//! [`Config`]; the simulator has its own [`SimulatorConfig`].
//!
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::simulator::SimulatedDevice;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional `u64` environment variable; `None` when unset.
macro_rules! parse_env_opt_u64 {
    ($var_name:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
    };
}

/// Parse an optional boolean environment variable with a default value.
macro_rules! parse_env_bool {
    ($var_name:expr, $default:expr) => {
        match env::var($var_name) {
            Ok(v) => parse_bool(&v).ok_or_else(|| anyhow!("Invalid {}: {}", $var_name, v))?,
            Err(_) => $default,
        }
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Strongly typed server configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Address the HTTP server listens on.
    pub bind_addr: SocketAddr,

    /// Drop existing tables before bootstrapping.
    pub db_reset: bool,

    /// Optional JSON file replacing the built-in required-fields table.
    pub required_fields_path: Option<String>,
}

/// Load server configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `BIND_ADDR` – listen address (default: `0.0.0.0:8080`)
/// - `DB_RESET` – destructive schema reset (default: false)
/// - `REQUIRED_FIELDS_PATH` – required-fields JSON table
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let bind_addr = match env::var("BIND_ADDR") {
        Ok(v) => v
            .parse::<SocketAddr>()
            .map_err(|e| anyhow!("Invalid BIND_ADDR: {}", e))?,
        Err(_) => SocketAddr::from(([0, 0, 0, 0], 8080)),
    };
    let db_reset = parse_env_bool!("DB_RESET", false);
    let required_fields_path = env::var("REQUIRED_FIELDS_PATH").ok();

    Ok(Config {
        db_url,
        db_pool_max,
        bind_addr,
        db_reset,
        required_fields_path,
    })
}

/// Mask the password component of a connection string.
fn mask_db_url(db_url: &str) -> String {
    // ---
    // Skip the scheme so its colon is never taken for the password separator.
    let userinfo_start = db_url.find("://").map_or(0, |p| p + 3);

    if let Some(at_pos) = db_url.rfind('@') {
        let userinfo = db_url.get(userinfo_start..at_pos).unwrap_or("");
        if let Some(colon_pos) = userinfo.rfind(':') {
            let colon_pos = userinfo_start + colon_pos;
            return format!("{}:****{}", &db_url[..colon_pos], &db_url[at_pos..]);
        }
    }
    db_url.to_string()
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks the database password while showing all other values.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL         : {}", mask_db_url(&self.db_url));
        tracing::info!("  DB_POOL_MAX          : {}", self.db_pool_max);
        tracing::info!("  BIND_ADDR            : {}", self.bind_addr);
        tracing::info!("  DB_RESET             : {}", self.db_reset);
        tracing::info!(
            "  REQUIRED_FIELDS_PATH : {}",
            self.required_fields_path.as_deref().unwrap_or("<built-in>")
        );
    }
}

// ---

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    // ---
    /// Base URL of the ingestion API.
    pub api_url: String,

    /// Delay between ticks.
    pub interval: Duration,

    /// Per-device run time; `None` runs forever.
    pub duration: Option<Duration>,

    /// Devices to simulate, run one after another.
    pub devices: Vec<SimulatedDevice>,

    /// Create each device's asset before sending readings.
    pub register: bool,
}

/// Load simulator configuration from environment variables.
///
/// Optional:
/// - `SIMULATOR_API_URL` – ingestion API base (default: `http://localhost:8080`)
/// - `SIMULATOR_INTERVAL_SECS` – tick interval (default: 5)
/// - `SIMULATOR_DURATION_SECS` – per-device run time (default: forever)
/// - `SIMULATOR_DEVICES` – `id:type:lat:lng;...` (default: demo devices)
/// - `SIMULATOR_REGISTER` – create assets first (default: true)
pub fn load_simulator_from_env() -> Result<SimulatorConfig> {
    // ---
    let api_url = env::var("SIMULATOR_API_URL")
        .unwrap_or_else(|_| "http://localhost:8080".into())
        .trim_end_matches('/')
        .to_string();
    let interval = Duration::from_secs(parse_env_u32!("SIMULATOR_INTERVAL_SECS", 5) as u64);
    let duration = parse_env_opt_u64!("SIMULATOR_DURATION_SECS").map(Duration::from_secs);
    let devices = match env::var("SIMULATOR_DEVICES") {
        Ok(v) => parse_devices(&v)?,
        Err(_) => SimulatedDevice::demo_fleet(),
    };
    let register = parse_env_bool!("SIMULATOR_REGISTER", true);

    if interval.is_zero() {
        return Err(anyhow!("SIMULATOR_INTERVAL_SECS must be greater than 0"));
    }

    Ok(SimulatorConfig {
        api_url,
        interval,
        duration,
        devices,
        register,
    })
}

/// Parse `id:type:lat:lng` entries separated by `;`.
pub fn parse_devices(raw: &str) -> Result<Vec<SimulatedDevice>> {
    // ---
    let devices = raw
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            let [id, device_type, lat, lng] = parts.as_slice() else {
                return Err(anyhow!("Invalid device entry '{}': expected id:type:lat:lng", entry));
            };
            let lat = lat
                .parse::<f64>()
                .map_err(|e| anyhow!("Invalid latitude in '{}': {}", entry, e))?;
            let lng = lng
                .parse::<f64>()
                .map_err(|e| anyhow!("Invalid longitude in '{}': {}", entry, e))?;
            Ok(SimulatedDevice::new(*id, *device_type, lat, lng))
        })
        .collect::<Result<Vec<_>>>()?;

    if devices.is_empty() {
        return Err(anyhow!("SIMULATOR_DEVICES contains no devices"));
    }
    Ok(devices)
}

impl SimulatorConfig {
    /// Log the loaded configuration.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Simulator configuration loaded:");
        tracing::info!("  SIMULATOR_API_URL       : {}", self.api_url);
        tracing::info!("  SIMULATOR_INTERVAL_SECS : {}", self.interval.as_secs());
        match self.duration {
            Some(d) => tracing::info!("  SIMULATOR_DURATION_SECS : {}", d.as_secs()),
            None => tracing::info!("  SIMULATOR_DURATION_SECS : <forever>"),
        }
        tracing::info!("  SIMULATOR_REGISTER      : {}", self.register);
        for device in &self.devices {
            tracing::info!("  device {} ({})", device.id, device.device_type);
        }
    }
}
