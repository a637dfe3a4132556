//! Synthetic telemetry generator.
//!
//! Each [`SimulatedDevice`] carries a measurement profile chosen by its
//! device type. A tick draws one value per measurement, wraps them in a
//! [`TelemetryEnvelope`] and posts it to the ingestion API. Failed posts are
//! logged and the loop moves on to the next tick.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::models::{Location, Measurement, NewInfrastructure, TelemetryEnvelope};

// ---

/// Fraction of a numeric range added as symmetric noise.
pub const JITTER_FRACTION: f64 = 0.05;

/// How a single measurement is simulated.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementSpec {
    Numeric {
        min: f64,
        max: f64,
        unit: &'static str,
    },
    Categorical {
        states: &'static [&'static str],
    },
}

use MeasurementSpec::{Categorical, Numeric};

impl MeasurementSpec {
    // ---
    fn unit(&self) -> Option<&'static str> {
        match self {
            Numeric { unit, .. } => Some(*unit),
            Categorical { .. } => None,
        }
    }

    /// Draw one value.
    ///
    /// Numeric values are uniform over `[min, max]` plus up to ±5 % of the
    /// range, rounded to two decimals.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Value {
        // ---
        match self {
            Numeric { min, max, .. } => {
                let span = max - min;
                let base = rng.gen_range(*min..=*max);
                let jitter = JITTER_FRACTION * span;
                let noise = rng.gen_range(-jitter..=jitter);
                json!(round2(base + noise))
            }
            Categorical { states } => {
                let state = states.choose(rng).copied().unwrap_or_default();
                json!(state)
            }
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

const WEATHER: &[&str] = &["clear", "rain", "snow", "fog"];

/// Measurements shared by every device type.
fn base_profile() -> Vec<(&'static str, MeasurementSpec)> {
    vec![
        ("traffic_flow", Numeric { min: 0.0, max: 2000.0, unit: "vehicles/hour" }),
        ("average_speed", Numeric { min: 0.0, max: 120.0, unit: "km/h" }),
        ("weather", Categorical { states: WEATHER }),
        ("temperature", Numeric { min: -20.0, max: 50.0, unit: "°C" }),
    ]
}

/// Measurements specific to one device type.
fn type_profile(device_type: &str) -> Vec<(&'static str, MeasurementSpec)> {
    // ---
    match device_type {
        "road" => vec![
            ("surface_temperature", Numeric { min: -20.0, max: 60.0, unit: "°C" }),
            ("surface_moisture", Numeric { min: 0.0, max: 100.0, unit: "%" }),
            ("surface_condition", Categorical { states: &["dry", "wet", "icy", "snow_covered"] }),
        ],
        "highway" => vec![
            ("surface_temperature", Numeric { min: -20.0, max: 60.0, unit: "°C" }),
            ("surface_moisture", Numeric { min: 0.0, max: 100.0, unit: "%" }),
            ("weight_load", Numeric { min: 0.0, max: 50000.0, unit: "kg" }),
            ("emergency_lane_status", Categorical { states: &["clear", "occupied"] }),
        ],
        "tunnel" => vec![
            ("air_quality", Numeric { min: 0.0, max: 500.0, unit: "ppm" }),
            ("visibility", Numeric { min: 0.0, max: 100.0, unit: "%" }),
            ("ventilation_status", Categorical { states: &["off", "low", "medium", "high"] }),
            ("emergency_lighting", Categorical { states: &["off", "on"] }),
        ],
        "bridge" => vec![
            ("structural_stress", Numeric { min: 0.0, max: 100.0, unit: "MPa" }),
            ("vibration", Numeric { min: 0.0, max: 50.0, unit: "Hz" }),
            ("expansion_joint_status", Numeric { min: 0.0, max: 100.0, unit: "%" }),
            ("weight_load", Numeric { min: 0.0, max: 100000.0, unit: "kg" }),
        ],
        "traffic_signal" => vec![
            ("signal_status", Categorical { states: &["red", "yellow", "green"] }),
            ("queue_length", Numeric { min: 0.0, max: 50.0, unit: "vehicles" }),
            ("wait_time", Numeric { min: 0.0, max: 120.0, unit: "seconds" }),
            ("operational_status", Categorical { states: &["normal", "flashing", "off"] }),
        ],
        "streetlight" => vec![
            ("light_status", Categorical { states: &["off", "on", "dimmed"] }),
            ("light_intensity", Numeric { min: 0.0, max: 100.0, unit: "%" }),
            ("power_consumption", Numeric { min: 0.0, max: 400.0, unit: "W" }),
            ("bulb_health", Numeric { min: 0.0, max: 100.0, unit: "%" }),
        ],
        _ => Vec::new(),
    }
}

/// Full measurement table for `device_type`; type entries override base ones.
pub fn sensor_profile(device_type: &str) -> BTreeMap<&'static str, MeasurementSpec> {
    base_profile()
        .into_iter()
        .chain(type_profile(device_type))
        .collect()
}

// ---

/// One simulated piece of infrastructure.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedDevice {
    pub id: String,
    pub device_type: String,
    pub location: Location,
    pub sensors: BTreeMap<&'static str, MeasurementSpec>,
}

impl SimulatedDevice {
    // ---
    pub fn new(id: impl Into<String>, device_type: impl Into<String>, lat: f64, lng: f64) -> Self {
        // ---
        let device_type = device_type.into();
        let sensors = sensor_profile(&device_type);
        Self {
            id: id.into(),
            device_type,
            location: Location { lat, lng },
            sensors,
        }
    }

    /// The three downtown devices used when nothing else is configured.
    pub fn demo_fleet() -> Vec<Self> {
        vec![
            Self::new("ROAD_001", "road", 40.7128, -74.0060),
            Self::new("TUNNEL_001", "tunnel", 40.7131, -74.0089),
            Self::new("BRIDGE_001", "bridge", 40.7064, -73.9969),
        ]
    }

    /// Build one envelope with a fresh value for every measurement.
    pub fn generate_payload<R: Rng>(&self, rng: &mut R) -> TelemetryEnvelope {
        // ---
        let readings = self
            .sensors
            .iter()
            .map(|(name, spec)| {
                let measurement = Measurement {
                    value: spec.sample(rng),
                    unit: spec.unit().map(str::to_string),
                };
                (name.to_string(), measurement)
            })
            .collect();

        TelemetryEnvelope {
            infrastructure_id: self.id.clone(),
            infrastructure_type: self.device_type.clone(),
            location: self.location,
            timestamp: Utc::now(),
            readings,
        }
    }

    /// Asset row matching this device, for registration.
    pub fn asset(&self) -> NewInfrastructure {
        // ---
        let mut metadata = Map::new();
        metadata.insert("source".into(), json!("simulator"));

        NewInfrastructure {
            device_id: self.id.clone(),
            device_type: self.device_type.clone(),
            lat: self.location.lat,
            lon: self.location.lng,
            name: format!("Simulated {} {}", self.device_type, self.id),
            description: None,
            metadata,
        }
    }
}

// ---

/// Posts simulated readings for one device to the ingestion API.
pub struct Simulator {
    device: SimulatedDevice,
    client: Client,
    api_url: String,
}

impl Simulator {
    // ---
    pub fn new(device: SimulatedDevice, client: Client, api_url: impl Into<String>) -> Self {
        Self {
            device,
            client,
            api_url: api_url.into(),
        }
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    /// Create the device's asset; an existing asset counts as success.
    pub async fn register(&self) -> bool {
        // ---
        let url = format!("{}/infrastructure", self.api_url);
        match self.client.post(&url).json(&self.device.asset()).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Registered {} ({})", self.device.id, self.device.device_type);
                true
            }
            Ok(resp) if resp.status() == StatusCode::CONFLICT => {
                debug!("{} already registered", self.device.id);
                true
            }
            Ok(resp) => {
                warn!("Registering {} returned {}", self.device.id, resp.status());
                false
            }
            Err(e) => {
                error!("Error registering {}: {}", self.device.id, e);
                false
            }
        }
    }

    /// Generate and post one envelope. Returns whether the API accepted it.
    pub async fn send_data(&self) -> bool {
        // ---
        let payload = self.device.generate_payload(&mut rand::thread_rng());
        let url = format!("{}/api/data", self.api_url);

        match self.client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(
                    "Data sent for {}: {}",
                    self.device.id,
                    serde_json::to_string(&payload).unwrap_or_default()
                );
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("API rejected data for {}: {} {}", self.device.id, status, body);
                false
            }
            Err(e) => {
                error!("Error sending data for {}: {}", self.device.id, e);
                false
            }
        }
    }

    /// Send on a fixed interval, for `duration` or forever.
    ///
    /// Returns the number of ticks that were accepted by the API.
    pub async fn run(&self, interval: Duration, duration: Option<Duration>) -> u64 {
        // ---
        let start = Instant::now();
        let mut iteration: u64 = 1;
        let mut accepted: u64 = 0;

        info!(
            "Starting {} sensor simulator (ID: {}), sending every {:?}",
            self.device.device_type, self.device.id, interval
        );

        loop {
            if self.send_data().await {
                accepted += 1;
            }
            debug!("Iteration {} completed", iteration);

            if duration.is_some_and(|d| start.elapsed() >= d) {
                info!("Simulation duration completed for {}", self.device.id);
                break;
            }

            iteration += 1;
            sleep(interval).await;
        }

        accepted
    }
}
