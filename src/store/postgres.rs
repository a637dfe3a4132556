use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;

use super::InfrastructureStore;
use crate::error::{IngestError, IngestResult};
use crate::models::{InfrastructureAsset, NewInfrastructure, NewSensorReading, SensorReading};

// ---

const ASSET_COLUMNS: &str =
    "id, device_id, device_type, lat, lon, name, description, metadata, created_at, updated_at";

const READING_COLUMNS: &str =
    "id, device_id, timestamp, temperature, operational_status, weather_condition, sensor_readings";

/// PostgreSQL/TimescaleDB backed store.
///
/// Every call checks a connection out of the pool and returns it when the
/// statement finishes, whether or not it succeeded.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Translate constraint violations into domain errors.
fn map_db_error(err: sqlx::Error, device_id: &str) -> IngestError {
    // ---
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return IngestError::DuplicateDevice(device_id.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return IngestError::UnknownDevice(device_id.to_string());
        }
    }
    IngestError::Storage(anyhow!(err))
}

#[async_trait]
impl InfrastructureStore for PgStore {
    // ---
    async fn insert_asset(&self, asset: NewInfrastructure) -> IngestResult<InfrastructureAsset> {
        // ---
        let sql = format!(
            r#"
            INSERT INTO infrastructure (
                device_id, device_type, lat, lon, name, description, metadata
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ASSET_COLUMNS}
            "#
        );

        let stored = sqlx::query_as::<_, InfrastructureAsset>(&sql)
            .bind(&asset.device_id)
            .bind(&asset.device_type)
            .bind(asset.lat)
            .bind(asset.lon)
            .bind(&asset.name)
            .bind(&asset.description)
            .bind(Json(&asset.metadata))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(e, &asset.device_id))?;

        debug!(device_id = %stored.device_id, id = stored.id, "Inserted asset row");
        Ok(stored)
    }

    async fn find_asset(&self, device_id: &str) -> IngestResult<Option<InfrastructureAsset>> {
        // ---
        let sql = format!("SELECT {ASSET_COLUMNS} FROM infrastructure WHERE device_id = $1");

        sqlx::query_as::<_, InfrastructureAsset>(&sql)
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(anyhow!(e)))
    }

    async fn insert_reading(
        &self,
        reading: NewSensorReading,
        timestamp: DateTime<Utc>,
    ) -> IngestResult<SensorReading> {
        // ---
        let sql = format!(
            r#"
            INSERT INTO sensor_data (
                device_id, timestamp, temperature,
                operational_status, weather_condition, sensor_readings
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {READING_COLUMNS}
            "#
        );

        let stored = sqlx::query_as::<_, SensorReading>(&sql)
            .bind(&reading.device_id)
            .bind(timestamp)
            .bind(reading.temperature)
            .bind(&reading.operational_status)
            .bind(&reading.weather_condition)
            .bind(Json(&reading.sensor_readings))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error(e, &reading.device_id))?;

        debug!(device_id = %stored.device_id, id = stored.id, "Inserted reading row");
        Ok(stored)
    }
}
