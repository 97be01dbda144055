//! Instrument identity and run metadata.
//!
//! Two records live here:
//!
//! - **`InstrumentInfo`**: static identity of the connected instrument (model,
//!   serial, connection identifier). The driver hands it out without touching
//!   the device; [`Keithley2401::identify`](crate::instrument::Keithley2401::identify)
//!   refreshes it from `*IDN?`.
//! - **`RunMetadata`**: everything needed to make sense of a measurement run
//!   later, built at the start of a run with [`RunMetadataBuilder`]. Includes the
//!   software version and a fresh run id so repeated runs can be told apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Identity of the connected instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstrumentInfo {
    /// Model identifier.
    pub model_number: String,
    /// Serial number, `"Unknown"` until identified.
    pub serial_number: String,
    /// Connection identifier (VISA resource string).
    pub resource_name: String,
}

impl InstrumentInfo {
    /// Identity for a resource that has not been queried yet.
    pub fn new(model_number: &str, resource_name: &str) -> Self {
        Self {
            model_number: model_number.to_string(),
            serial_number: "Unknown".to_string(),
            resource_name: resource_name.to_string(),
        }
    }

    /// Update model and serial from an `*IDN?` reply.
    ///
    /// The reply is `manufacturer,model,serial,firmware`. Missing fields leave
    /// the current values in place.
    pub fn apply_identity(&mut self, idn: &str) {
        let mut fields = idn.trim().split(',').map(str::trim);
        let _manufacturer = fields.next();
        if let Some(model) = fields.next().filter(|m| !m.is_empty()) {
            self.model_number = model.to_string();
        }
        if let Some(serial) = fields.next().filter(|s| !s.is_empty()) {
            self.serial_number = serial.to_string();
        }
    }

    /// Flatten into a string map for logging.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("model_number".to_string(), self.model_number.clone()),
            ("serial_number".to_string(), self.serial_number.clone()),
            ("resource_name".to_string(), self.resource_name.clone()),
        ])
    }
}

/// Metadata captured for a measurement run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Name of the experiment (e.g. `constant_current`).
    pub experiment_name: String,
    /// Free-text description.
    pub description: String,
    /// Instrument identity at the start of the run.
    pub instrument: Option<InstrumentInfo>,
    /// Run parameters (levels, durations, settings).
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Version of this software.
    pub software_version: String,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            experiment_name: "Default Experiment".to_string(),
            description: String::new(),
            instrument: None,
            parameters: BTreeMap::new(),
            started_at: Utc::now(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Builder for [`RunMetadata`].
#[derive(Default)]
pub struct RunMetadataBuilder {
    inner: RunMetadata,
}

impl RunMetadataBuilder {
    /// Empty metadata with a fresh run id and start time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the run type.
    pub fn experiment_name(mut self, name: &str) -> Self {
        self.inner.experiment_name = name.to_string();
        self
    }

    /// Free-text description.
    pub fn description(mut self, description: &str) -> Self {
        self.inner.description = description.to_string();
        self
    }

    /// Instrument the run was taken on.
    pub fn instrument(mut self, info: InstrumentInfo) -> Self {
        self.inner.instrument = Some(info);
        self
    }

    /// Record one run parameter.
    pub fn parameter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.inner.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Finish building.
    pub fn build(self) -> RunMetadata {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_identity() {
        let mut info = InstrumentInfo::new("Keithley2401", "GPIB0::3::INSTR");
        info.apply_identity("KEITHLEY INSTRUMENTS INC.,MODEL 2401,4099121,C30   Mar 17 2006 09:29:29/A02  /K/J\n");
        assert_eq!(info.model_number, "MODEL 2401");
        assert_eq!(info.serial_number, "4099121");
        assert_eq!(info.resource_name, "GPIB0::3::INSTR");
    }

    #[test]
    fn test_apply_partial_identity_keeps_defaults() {
        let mut info = InstrumentInfo::new("Keithley2401", "GPIB0::3::INSTR");
        info.apply_identity("KEITHLEY");
        assert_eq!(info.model_number, "Keithley2401");
        assert_eq!(info.serial_number, "Unknown");
    }

    #[test]
    fn test_as_map() {
        let info = InstrumentInfo::new("Keithley2401", "GPIB0::3::INSTR");
        let map = info.as_map();
        assert_eq!(map.len(), 3);
        assert_eq!(map["model_number"], "Keithley2401");
        assert_eq!(map["serial_number"], "Unknown");
        assert_eq!(map["resource_name"], "GPIB0::3::INSTR");
    }

    #[test]
    fn test_builder() {
        let metadata = RunMetadataBuilder::new()
            .experiment_name("constant_current")
            .description("hold 1 mA")
            .parameter("level", 1e-3)
            .parameter("num_readings", 40)
            .build();

        assert_eq!(metadata.experiment_name, "constant_current");
        assert_eq!(metadata.parameters["level"], serde_json::json!(1e-3));
        assert_eq!(metadata.parameters["num_readings"], serde_json::json!(40));
        assert_eq!(metadata.software_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = RunMetadataBuilder::new().build();
        let b = RunMetadataBuilder::new().build();
        assert_ne!(a.run_id, b.run_id);
    }
}
