use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::InfrastructureStore;
use crate::error::{IngestError, IngestResult};
use crate::models::{InfrastructureAsset, NewInfrastructure, NewSensorReading, SensorReading};

// ---

#[derive(Debug, Default)]
struct Tables {
    assets: HashMap<String, InfrastructureAsset>,
    readings: Vec<SensorReading>,
    next_asset_id: i64,
    next_reading_id: i64,
}

/// Process-local store with the same constraints as the database schema.
///
/// Used for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> IngestResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| IngestError::Storage(anyhow!("memory store lock poisoned")))
    }

    /// All readings stored for `device_id`, oldest first.
    pub fn readings_for(&self, device_id: &str) -> IngestResult<Vec<SensorReading>> {
        // ---
        let tables = self.lock()?;
        let mut readings: Vec<_> = tables
            .readings
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }
}

#[async_trait]
impl InfrastructureStore for MemoryStore {
    // ---
    async fn insert_asset(&self, asset: NewInfrastructure) -> IngestResult<InfrastructureAsset> {
        // ---
        let mut tables = self.lock()?;
        if tables.assets.contains_key(&asset.device_id) {
            return Err(IngestError::DuplicateDevice(asset.device_id));
        }

        tables.next_asset_id += 1;
        let now = Utc::now();
        let stored = InfrastructureAsset {
            id: tables.next_asset_id,
            device_id: asset.device_id,
            device_type: asset.device_type,
            lat: asset.lat,
            lon: asset.lon,
            name: asset.name,
            description: asset.description,
            metadata: asset.metadata,
            created_at: now,
            updated_at: now,
        };

        tables
            .assets
            .insert(stored.device_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_asset(&self, device_id: &str) -> IngestResult<Option<InfrastructureAsset>> {
        Ok(self.lock()?.assets.get(device_id).cloned())
    }

    async fn insert_reading(
        &self,
        reading: NewSensorReading,
        timestamp: DateTime<Utc>,
    ) -> IngestResult<SensorReading> {
        // ---
        let mut tables = self.lock()?;
        if !tables.assets.contains_key(&reading.device_id) {
            return Err(IngestError::UnknownDevice(reading.device_id));
        }

        tables.next_reading_id += 1;
        let stored = SensorReading {
            id: tables.next_reading_id,
            device_id: reading.device_id,
            timestamp,
            temperature: reading.temperature,
            operational_status: reading.operational_status,
            weather_condition: reading.weather_condition,
            sensor_readings: reading.sensor_readings,
        };

        tables.readings.push(stored.clone());
        Ok(stored)
    }
}
