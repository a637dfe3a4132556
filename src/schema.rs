//! Database schema management for `infra-telemetry`.
//!
//! Ensures the asset and reading tables, the TimescaleDB hypertable and the
//! secondary indexes exist before serving requests. Applied once on startup
//! from `main.rs`, or on its own by the `bootstrap` binary.
//!
//! Every statement is create-if-not-exists. Existing tables are only dropped
//! when a reset is explicitly requested.

use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};

// ---

/// Bootstrap failure, tagged with the step that failed.
#[derive(Debug, Error)]
#[error("Storage setup failed at '{stage}': {source}")]
pub struct SetupError {
    pub stage: &'static str,
    #[source]
    pub source: sqlx::Error,
}

/// A named DDL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub stage: &'static str,
    pub sql: &'static str,
}

const RESET_STEPS: &[Step] = &[
    Step {
        stage: "drop sensor_data",
        sql: "DROP TABLE IF EXISTS sensor_data CASCADE",
    },
    Step {
        stage: "drop infrastructure",
        sql: "DROP TABLE IF EXISTS infrastructure CASCADE",
    },
];

const CREATE_STEPS: &[Step] = &[
    Step {
        stage: "timescaledb extension",
        sql: "CREATE EXTENSION IF NOT EXISTS timescaledb",
    },
    // device_id is UNIQUE so sensor_data can reference it.
    Step {
        stage: "infrastructure table",
        sql: r#"
        CREATE TABLE IF NOT EXISTS infrastructure (
            id          BIGSERIAL        PRIMARY KEY,
            device_id   TEXT             NOT NULL UNIQUE,
            device_type TEXT             NOT NULL,
            lat         DOUBLE PRECISION NOT NULL,
            lon         DOUBLE PRECISION NOT NULL,
            name        TEXT             NOT NULL,
            description TEXT,
            metadata    JSONB            NOT NULL DEFAULT '{}'::jsonb,
            created_at  TIMESTAMPTZ      NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at  TIMESTAMPTZ      NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    },
    Step {
        stage: "infrastructure device_type index",
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_infrastructure_device_type
            ON infrastructure (device_type)
        "#,
    },
    Step {
        stage: "updated_at function",
        sql: r#"
        CREATE OR REPLACE FUNCTION touch_updated_at() RETURNS TRIGGER AS $$
        BEGIN
            NEW.updated_at = CURRENT_TIMESTAMP;
            RETURN NEW;
        END;
        $$ LANGUAGE plpgsql
        "#,
    },
    Step {
        stage: "updated_at trigger",
        sql: r#"
        CREATE OR REPLACE TRIGGER trg_infrastructure_updated_at
            BEFORE UPDATE ON infrastructure
            FOR EACH ROW EXECUTE FUNCTION touch_updated_at()
        "#,
    },
    // The hypertable's unique keys must include the partition column.
    Step {
        stage: "sensor_data table",
        sql: r#"
        CREATE TABLE IF NOT EXISTS sensor_data (
            id                 BIGSERIAL        NOT NULL,
            device_id          TEXT             NOT NULL REFERENCES infrastructure (device_id),
            timestamp          TIMESTAMPTZ      NOT NULL DEFAULT CURRENT_TIMESTAMP,
            temperature        DOUBLE PRECISION,
            operational_status TEXT,
            weather_condition  TEXT,
            sensor_readings    JSONB            NOT NULL DEFAULT '{}'::jsonb,
            PRIMARY KEY (id, timestamp)
        )
        "#,
    },
    Step {
        stage: "sensor_data hypertable",
        sql: r#"
        SELECT create_hypertable('sensor_data', 'timestamp',
            if_not_exists => TRUE,
            chunk_time_interval => INTERVAL '1 day'
        )
        "#,
    },
    Step {
        stage: "device/time index",
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_data_device_time
            ON sensor_data (device_id, timestamp DESC)
        "#,
    },
    Step {
        stage: "sensor_readings GIN index",
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings
            ON sensor_data USING GIN (sensor_readings)
        "#,
    },
];

/// Ordered list of statements the bootstrap will run.
pub fn plan(reset: bool) -> Vec<Step> {
    // ---
    let mut steps = Vec::with_capacity(RESET_STEPS.len() + CREATE_STEPS.len());
    if reset {
        steps.extend_from_slice(RESET_STEPS);
    }
    steps.extend_from_slice(CREATE_STEPS);
    steps
}

/// Create the database schema (idempotent unless `reset` is set).
///
/// With `reset`, both tables are dropped first and every stored row is lost.
/// All steps run in one transaction; the first failure is logged, rolls the
/// transaction back and is returned to the caller.
pub async fn create_schema(pool: &PgPool, reset: bool) -> Result<(), SetupError> {
    // ---
    if reset {
        warn!("DB_RESET is set: dropping existing tables before bootstrap");
    }

    let mut tx = pool.begin().await.map_err(|source| SetupError {
        stage: "begin transaction",
        source,
    })?;

    for step in plan(reset) {
        tracing::debug!("Schema step: {}", step.stage);
        if let Err(source) = sqlx::query(step.sql).execute(&mut *tx).await {
            let err = SetupError {
                stage: step.stage,
                source,
            };
            error!("{}", err);
            return Err(err);
        }
    }

    tx.commit().await.map_err(|source| SetupError {
        stage: "commit",
        source,
    })?;

    info!("Schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_default_plan_is_non_destructive() {
        // ---
        for step in plan(false) {
            assert!(
                !step.sql.to_uppercase().contains("DROP TABLE"),
                "{} drops a table",
                step.stage
            );
        }
    }

    #[test]
    fn test_reset_plan_drops_before_creating() {
        // ---
        let steps = plan(true);
        assert_eq!(steps.len(), RESET_STEPS.len() + CREATE_STEPS.len());
        assert_eq!(steps[0].stage, "drop sensor_data");
        assert_eq!(steps[1].stage, "drop infrastructure");
        assert_eq!(&steps[2..], CREATE_STEPS);
    }

    #[test]
    fn test_create_steps_are_idempotent() {
        // ---
        for step in CREATE_STEPS {
            let sql = step.sql.to_uppercase();
            let idempotent = sql.contains("IF NOT EXISTS")
                || sql.contains("OR REPLACE")
                || sql.contains("IF_NOT_EXISTS => TRUE");
            assert!(idempotent, "{} is not idempotent", step.stage);
        }
    }

    #[test]
    fn test_hypertable_uses_daily_chunks() {
        // ---
        let hypertable = CREATE_STEPS
            .iter()
            .find(|s| s.stage == "sensor_data hypertable")
            .unwrap();
        assert!(hypertable.sql.contains("INTERVAL '1 day'"));

        let position = |stage: &str| CREATE_STEPS.iter().position(|s| s.stage == stage);
        assert!(position("sensor_data table") < position("sensor_data hypertable"));
        assert!(position("sensor_data hypertable") < position("device/time index"));
    }
}
