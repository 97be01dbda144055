//! In-memory model of what the instrument has been told to do.
//!
//! The driver owns exactly one `InstrumentState` and is the only thing that
//! mutates it. Callers get a shared reference through
//! [`Keithley2401::state`](super::Keithley2401::state) and can inspect, never
//! edit.

use serde::Serialize;
use std::fmt;

/// Hard ceiling on any sourced current, independent of compliance settings.
pub const CURRENT_HARD_MAX: f64 = 10e-3;

/// Quantity the instrument forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceFunction {
    /// Source current, measure voltage.
    Current,
    /// Source voltage, measure current.
    Voltage,
}

impl SourceFunction {
    /// SCPI mnemonic for the forced quantity.
    pub fn mnemonic(self) -> &'static str {
        match self {
            SourceFunction::Current => "CURR",
            SourceFunction::Voltage => "VOLT",
        }
    }

    /// SCPI mnemonic for the measured (complementary) quantity.
    pub fn measured_mnemonic(self) -> &'static str {
        match self {
            SourceFunction::Current => "VOLT",
            SourceFunction::Voltage => "CURR",
        }
    }
}

impl fmt::Display for SourceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Single set-point or a pre-loaded sequence advanced once per trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriveMode {
    /// One level held until changed.
    Fixed,
    /// Source list stepped once per trigger.
    List,
}

impl DriveMode {
    /// SCPI mnemonic used with `:SOURce:<func>:MODE`.
    pub fn mnemonic(self) -> &'static str {
        match self {
            DriveMode::Fixed => "FIXED",
            DriveMode::List => "LIST",
        }
    }
}

/// Source configuration shared by the fixed and list entry points.
///
/// `compliance` is the protection level written to the instrument for the
/// measured quantity. `voltage_ceiling` only exists for voltage sourcing: it is
/// the caller's declared limit on the magnitude of any sourced voltage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceSettings {
    /// Forced quantity.
    pub function: SourceFunction,
    /// Integration time in power-line cycles, applied to both sense channels.
    pub nplc: f64,
    /// Source range for the forced quantity.
    pub range: f64,
    /// Protection level on the measured quantity.
    pub compliance: f64,
    /// Declared ceiling on sourced voltage (voltage sourcing only).
    pub voltage_ceiling: Option<f64>,
}

impl SourceSettings {
    /// Source current and measure voltage, protected at `voltage_compliance` volts.
    pub fn current(nplc: f64, current_range: f64, voltage_compliance: f64) -> Self {
        Self {
            function: SourceFunction::Current,
            nplc,
            range: current_range,
            compliance: voltage_compliance,
            voltage_ceiling: None,
        }
    }

    /// Source voltage and measure current, protected at `current_compliance`
    /// amps, refusing any level above `voltage_ceiling` volts.
    pub fn voltage(
        nplc: f64,
        voltage_range: f64,
        current_compliance: f64,
        voltage_ceiling: f64,
    ) -> Self {
        Self {
            function: SourceFunction::Voltage,
            nplc,
            range: voltage_range,
            compliance: current_compliance,
            voltage_ceiling: Some(voltage_ceiling),
        }
    }

    /// Magnitude limit that every level sourced under these settings must respect.
    pub fn level_ceiling(&self) -> f64 {
        match self.function {
            SourceFunction::Current => CURRENT_HARD_MAX,
            SourceFunction::Voltage => self.voltage_ceiling.unwrap_or(self.compliance),
        }
    }
}

/// The last configuration that was completely written to the instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveConfiguration {
    /// Settings the sequence was built from.
    pub settings: SourceSettings,
    /// Fixed or list sourcing.
    pub drive_mode: DriveMode,
    /// Programmed set-points, one per reading.
    pub levels: Vec<f64>,
    /// Readings the instrument produces per trigger.
    pub expected_reading_count: usize,
}

/// Driver-side model of the instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstrumentState {
    initialized: bool,
    configuration: Option<ActiveConfiguration>,
    output_enabled: bool,
    read_pending: bool,
}

impl InstrumentState {
    /// Whether the reset sequence has completed since the driver was created.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Current configuration, if one has been fully written.
    pub fn configuration(&self) -> Option<&ActiveConfiguration> {
        self.configuration.as_ref()
    }

    /// Forced quantity of the active configuration.
    pub fn source_function(&self) -> Option<SourceFunction> {
        self.configuration.as_ref().map(|c| c.settings.function)
    }

    /// Drive mode of the active configuration.
    pub fn drive_mode(&self) -> Option<DriveMode> {
        self.configuration.as_ref().map(|c| c.drive_mode)
    }

    /// Integration time of the active configuration.
    pub fn nplc(&self) -> Option<f64> {
        self.configuration.as_ref().map(|c| c.settings.nplc)
    }

    /// Source range of the active configuration.
    pub fn range_setting(&self) -> Option<f64> {
        self.configuration.as_ref().map(|c| c.settings.range)
    }

    /// Protection level of the active configuration.
    pub fn compliance_limit(&self) -> Option<f64> {
        self.configuration.as_ref().map(|c| c.settings.compliance)
    }

    /// Readings the next trigger will produce.
    pub fn expected_reading_count(&self) -> Option<usize> {
        self.configuration
            .as_ref()
            .map(|c| c.expected_reading_count)
    }

    /// Whether the source output is switched on.
    pub fn output_enabled(&self) -> bool {
        self.output_enabled
    }

    /// Whether `:READ?` was sent and its reply has not been fetched yet.
    pub fn read_pending(&self) -> bool {
        self.read_pending
    }

    pub(crate) fn mark_reset(&mut self) {
        self.initialized = true;
        self.configuration = None;
        self.output_enabled = false;
        self.read_pending = false;
    }

    pub(crate) fn commit(&mut self, configuration: ActiveConfiguration) {
        self.configuration = Some(configuration);
        self.read_pending = false;
    }

    pub(crate) fn invalidate(&mut self) {
        self.configuration = None;
        self.read_pending = false;
    }

    pub(crate) fn set_output(&mut self, enabled: bool) {
        self.output_enabled = enabled;
    }

    pub(crate) fn set_read_pending(&mut self, pending: bool) {
        self.read_pending = pending;
    }

    pub(crate) fn set_fixed_level(&mut self, level: f64) {
        if let Some(config) = self.configuration.as_mut() {
            config.levels = vec![level];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ceiling_for_current_ignores_compliance() {
        let settings = SourceSettings::current(1.0, 10e-3, 50.0);
        assert_eq!(settings.level_ceiling(), CURRENT_HARD_MAX);
    }

    #[test]
    fn test_level_ceiling_for_voltage_uses_declared_ceiling() {
        let settings = SourceSettings::voltage(1.0, 20.0, 0.1, 11.0);
        assert_eq!(settings.level_ceiling(), 11.0);
        assert_eq!(settings.compliance, 0.1);
    }

    #[test]
    fn test_reset_clears_configuration() {
        let mut state = InstrumentState::default();
        state.mark_reset();
        state.commit(ActiveConfiguration {
            settings: SourceSettings::current(1.0, 10e-3, 5.0),
            drive_mode: DriveMode::Fixed,
            levels: vec![1e-3],
            expected_reading_count: 1,
        });
        state.set_output(true);
        assert_eq!(state.expected_reading_count(), Some(1));

        state.mark_reset();
        assert!(state.is_initialized());
        assert!(state.configuration().is_none());
        assert!(!state.output_enabled());
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(SourceFunction::Current.to_string(), "CURR");
        assert_eq!(SourceFunction::Voltage.measured_mnemonic(), "CURR");
        assert_eq!(DriveMode::List.mnemonic(), "LIST");
    }
}
