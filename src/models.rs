//! Data models for infrastructure assets and their sensor readings.
//!
//! `New*` types are the request bodies accepted by the ingestion API; the
//! plain types are the stored rows echoed back to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ---

/// Request body for creating an infrastructure asset.
///
/// Accepts the legacy column names (`location_lat`, `location_lon`, `mdata`)
/// as aliases so older clients keep working.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewInfrastructure {
    // ---
    pub device_id: String,
    pub device_type: String,
    #[serde(alias = "location_lat")]
    pub lat: f64,
    #[serde(alias = "location_lon")]
    pub lon: f64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "mdata")]
    pub metadata: Map<String, Value>,
}

/// A stored infrastructure asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InfrastructureAsset {
    // ---
    pub id: i64,
    pub device_id: String,
    pub device_type: String,
    pub lat: f64,
    pub lon: f64,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for a single sensor reading.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NewSensorReading {
    // ---
    pub device_id: String,
    /// Ingestion time is used when absent.
    #[serde(default, deserialize_with = "iso8601::deserialize_option")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub operational_status: Option<String>,
    #[serde(default)]
    pub weather_condition: Option<String>,
    #[serde(default)]
    pub sensor_readings: Map<String, Value>,
}

/// A stored sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SensorReading {
    // ---
    pub id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub operational_status: Option<String>,
    pub weather_condition: Option<String>,
    #[sqlx(json)]
    pub sensor_readings: Map<String, Value>,
}

// ---

/// ISO-8601 timestamps, with or without an offset.
///
/// RFC 3339 is tried first; a timestamp without an offset (as produced by
/// many clients' naive `isoformat()`) is read as UTC.
pub mod iso8601 {
    // ---
    use super::*;

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| raw.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ---

/// Geographic position as sent by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// One measurement inside a telemetry envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: Value,
    pub unit: Option<String>,
}

/// Payload posted by the simulator to `/api/data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    // ---
    pub infrastructure_id: String,
    pub infrastructure_type: String,
    pub location: Location,
    #[serde(deserialize_with = "iso8601::deserialize")]
    pub timestamp: DateTime<Utc>,
    pub readings: BTreeMap<String, Measurement>,
}

/// Measurements that map onto the common reading columns.
const TEMPERATURE_KEY: &str = "temperature";
const WEATHER_KEY: &str = "weather";
const OPERATIONAL_STATUS_KEY: &str = "operational_status";

impl TelemetryEnvelope {
    // ---
    /// Flatten the envelope into a sensor reading.
    ///
    /// Every measurement keeps its value under its own name in
    /// `sensor_readings`, so the required-key check sees exactly what the
    /// device sent. `temperature`, `weather` and `operational_status` are
    /// additionally copied into the common columns when they have the
    /// expected JSON type. Units are dropped.
    pub fn into_sensor_reading(self) -> NewSensorReading {
        // ---
        let mut reading = NewSensorReading {
            device_id: self.infrastructure_id,
            timestamp: Some(self.timestamp),
            temperature: None,
            operational_status: None,
            weather_condition: None,
            sensor_readings: Map::new(),
        };

        for (name, measurement) in self.readings {
            let value = measurement.value;
            match name.as_str() {
                TEMPERATURE_KEY => reading.temperature = value.as_f64(),
                WEATHER_KEY => reading.weather_condition = value.as_str().map(str::to_string),
                OPERATIONAL_STATUS_KEY => {
                    reading.operational_status = value.as_str().map(str::to_string)
                }
                _ => {}
            }
            reading.sensor_readings.insert(name, value);
        }

        reading
    }
}
