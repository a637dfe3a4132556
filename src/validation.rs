//! Per-device-type required measurement keys.
//!
//! The table maps a device type to the keys that every reading for that type
//! must carry in `sensor_readings`. Extra keys are always allowed, and device
//! types absent from the table are not validated at all.
//!
//! A built-in table covers the standard asset types; deployments can replace
//! it with a JSON file of the form `{"road": ["traffic_flow", ...], ...}`.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

// ---

/// Rejection for a reading that lacks required keys for its device type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required fields for {device_type}: {}", join_keys(.missing))]
pub struct ValidationError {
    pub device_type: String,
    pub missing: BTreeSet<String>,
}

fn join_keys(keys: &BTreeSet<String>) -> String {
    keys.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Device type → required measurement keys.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RequiredFields {
    table: HashMap<String, BTreeSet<String>>,
}

const DEFAULT_TABLE: &[(&str, &[&str])] = &[
    ("road", &["traffic_flow", "surface_moisture", "surface_condition"]),
    ("bridge", &["structural_stress", "vibration", "weight_load"]),
    ("tunnel", &["air_quality", "visibility", "ventilation_status"]),
    ("traffic_signal", &["signal_status", "queue_length", "wait_time"]),
    ("streetlight", &["light_status", "light_intensity", "power_consumption"]),
];

impl Default for RequiredFields {
    fn default() -> Self {
        // ---
        let table = DEFAULT_TABLE
            .iter()
            .map(|(device_type, keys)| {
                let keys = keys.iter().map(|k| k.to_string()).collect();
                (device_type.to_string(), keys)
            })
            .collect();

        Self { table }
    }
}

impl RequiredFields {
    // ---
    /// Parse a table from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid required-fields table")
    }

    /// Load a table from a JSON file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        // ---
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read required-fields file {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Load from `path` when given, otherwise use the built-in table.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Required keys for `device_type`, if the type is validated at all.
    pub fn required_for(&self, device_type: &str) -> Option<&BTreeSet<String>> {
        self.table.get(device_type)
    }

    /// Number of device types with requirements.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Check `readings` against the requirements for `device_type`.
    pub fn validate(
        &self,
        device_type: &str,
        readings: &Map<String, Value>,
    ) -> Result<(), ValidationError> {
        // ---
        let Some(required) = self.required_for(device_type) else {
            return Ok(());
        };

        let missing: BTreeSet<String> = required
            .iter()
            .filter(|key| !readings.contains_key(key.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                device_type: device_type.to_string(),
                missing,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn readings_with(keys: &BTreeSet<String>) -> Map<String, Value> {
        keys.iter().map(|k| (k.clone(), json!(1))).collect()
    }

    #[test]
    fn test_full_key_set_passes_for_every_type() {
        // ---
        let fields = RequiredFields::default();
        assert_eq!(fields.len(), 5);

        for (device_type, _) in DEFAULT_TABLE {
            let required = fields.required_for(device_type).unwrap();
            let readings = readings_with(required);
            assert_eq!(fields.validate(device_type, &readings), Ok(()));
        }
    }

    #[test]
    fn test_dropping_any_key_names_exactly_that_key() {
        // ---
        let fields = RequiredFields::default();

        for (device_type, keys) in DEFAULT_TABLE {
            let required = fields.required_for(device_type).unwrap();
            for key in keys.iter() {
                let mut readings = readings_with(required);
                readings.remove(*key);

                let err = fields.validate(device_type, &readings).unwrap_err();
                assert_eq!(err.device_type, *device_type);
                assert_eq!(err.missing, BTreeSet::from([key.to_string()]));
            }
        }
    }

    #[test]
    fn test_extra_keys_are_permitted() {
        // ---
        let fields = RequiredFields::default();
        let readings = json!({
            "traffic_flow": 1500,
            "surface_moisture": 15,
            "surface_condition": "dry",
            "average_speed": 65.5
        });

        let readings = readings.as_object().unwrap();
        assert!(fields.validate("road", readings).is_ok());
    }

    #[test]
    fn test_unknown_types_skip_validation() {
        // ---
        let fields = RequiredFields::default();
        let empty = Map::new();

        assert!(fields.validate("highway", &empty).is_ok());
        assert!(fields.validate("unknown_type", &empty).is_ok());
        assert!(fields.required_for("highway").is_none());
    }

    #[test]
    fn test_error_message_lists_sorted_keys() {
        // ---
        let fields = RequiredFields::default();
        let readings = json!({"traffic_flow": 1500});

        let err = fields
            .validate("road", readings.as_object().unwrap())
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "missing required fields for road: surface_condition, surface_moisture"
        );
    }

    #[test]
    fn test_device_type_match_is_exact() {
        // ---
        let fields = RequiredFields::default();
        assert!(fields.validate("Road", &Map::new()).is_ok());
        assert!(fields.validate("road", &Map::new()).is_err());
    }

    #[test]
    fn test_table_from_json_replaces_defaults() {
        // ---
        let fields = RequiredFields::from_json(r#"{"highway": ["weight_load"]}"#).unwrap();

        assert_eq!(fields.len(), 1);
        assert!(fields.validate("road", &Map::new()).is_ok());

        let err = fields.validate("highway", &Map::new()).unwrap_err();
        assert_eq!(err.missing, BTreeSet::from(["weight_load".to_string()]));
    }

    #[test]
    fn test_table_from_invalid_json_fails() {
        // ---
        assert!(RequiredFields::from_json(r#"{"road": "traffic_flow"}"#).is_err());
        assert!(RequiredFields::from_file("/nonexistent/required_fields.json").is_err());
    }

    #[test]
    fn test_table_from_file() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("required_fields.json");
        std::fs::write(&path, r#"{"road": ["traffic_flow"]}"#).unwrap();

        let fields = RequiredFields::from_file(&path).unwrap();
        assert_eq!(fields.len(), 1);
        let loaded = RequiredFields::load(path.to_str()).unwrap();
        assert_eq!(loaded, fields);

        let err = fields.validate("road", &Map::new()).unwrap_err();
        assert_eq!(err.missing, BTreeSet::from(["traffic_flow".to_string()]));
    }

    #[test]
    fn test_load_without_path_uses_defaults() {
        // ---
        assert_eq!(RequiredFields::load(None).unwrap(), RequiredFields::default());
    }
}
