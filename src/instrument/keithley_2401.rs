//! Keithley 2401 source-measure unit driver
//!
//! Translates configuration requests into the instrument's SCPI command
//! sequences and decodes `:READ?` replies into [`Measurement`]s.
//!
//! ## Session protocol
//!
//! 1. [`reset_to_known_state`](Keithley2401::reset_to_known_state) once per
//!    session: device reset, clock zeroed, four-wire sensing, voltage and
//!    current both sensed, output latched until explicitly switched off.
//! 2. [`configure_fixed`](Keithley2401::configure_fixed) or
//!    [`configure_list`](Keithley2401::configure_list).
//! 3. [`set_output(true)`](Keithley2401::set_output).
//! 4. [`trigger_and_fetch`](Keithley2401::trigger_and_fetch) as many times as
//!    needed, reconfiguring in between if desired.
//! 5. `set_output(false)`.
//!
//! Calling out of order fails with [`SmuError::Precondition`] and writes
//! nothing.
//!
//! ## Safety limits
//!
//! Every level is checked locally before the first command of a sequence is
//! written: sourced current may never exceed 10 mA in magnitude regardless of
//! compliance, and sourced voltage may never exceed the declared ceiling in
//! [`SourceSettings`]. A rejected configuration writes nothing and leaves the
//! driver state as it was.
//!
//! ## Example
//!
//! ```
//! use smu_daq::adapters::SimulatedSmu;
//! use smu_daq::instrument::{Keithley2401, SourceSettings};
//!
//! # fn main() -> smu_daq::error::AppResult<()> {
//! let mut smu = Keithley2401::new(SimulatedSmu::new(1_000.0));
//! smu.reset_to_known_state()?;
//! smu.configure_fixed(&SourceSettings::current(1.0, 10e-3, 5.0), 1e-3)?;
//! smu.set_output(true)?;
//! let (current, voltage) = smu.trigger_and_fetch()?.as_single().unwrap_or_default();
//! smu.set_output(false)?;
//! assert!((voltage - 1.0).abs() < 1e-6);
//! # let _ = current;
//! # Ok(())
//! # }
//! ```

use super::state::{ActiveConfiguration, DriveMode, InstrumentState, SourceSettings};
use super::validation::{check_levels, check_settings};
use crate::adapters::CommandChannel;
use crate::error::{AppResult, SmuError};
use crate::measurement::{parse_reply, Measurement, ReadingBuffer};
use crate::metadata::InstrumentInfo;
use tracing::{debug, info, warn};

/// Model identifier reported before the instrument is identified.
pub const MODEL_NUMBER: &str = "Keithley2401";

const RESET_SEQUENCE: [&str; 10] = [
    "*RST;",
    "*CLS;",
    // output stays on until explicitly turned off
    ":SOUR:CLE:AUTO OFF;",
    ":SYST:BEEP:STAT 0;",
    ":SYSTem:TIME:RESet",
    ":TRIGger:CLEar",
    ":SYST:RSEN ON;",
    ":SENS:FUNC:OFF:ALL;",
    ":SENS:FUNC 'VOLT';",
    ":SENS:FUNC 'CURR';",
];

const READ_COMMAND: &str = ":READ?";
const OUTPUT_ON: &str = ":OUTP ON";
const OUTPUT_OFF: &str = ":OUTP OFF;";

/// Driver for one instrument on an exclusively owned channel.
pub struct Keithley2401<C: CommandChannel> {
    channel: C,
    state: InstrumentState,
    info: InstrumentInfo,
}

impl<C: CommandChannel> Keithley2401<C> {
    /// Wrap a channel. Nothing is written until a method is called.
    pub fn new(channel: C) -> Self {
        let info = InstrumentInfo::new(MODEL_NUMBER, &channel.resource_name());
        Self {
            channel,
            state: InstrumentState::default(),
            info,
        }
    }

    /// Current driver-side model of the instrument.
    pub fn state(&self) -> &InstrumentState {
        &self.state
    }

    /// Borrow the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Release the underlying channel.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Static identity for logging. Does not touch the instrument.
    pub fn get_metadata(&self) -> &InstrumentInfo {
        &self.info
    }

    /// Query `*IDN?` and record model and serial in the metadata.
    pub fn identify(&mut self) -> AppResult<String> {
        let idn = self.channel.query("*IDN?")?;
        self.info.apply_identity(&idn);
        info!(
            model = %self.info.model_number,
            serial = %self.info.serial_number,
            resource = %self.info.resource_name,
            "SMU identified"
        );
        Ok(idn.trim().to_string())
    }

    /// Put the instrument in the baseline every other call assumes.
    ///
    /// Clears any previous configuration; the device reset also switches the
    /// output off.
    pub fn reset_to_known_state(&mut self) -> AppResult<()> {
        info!(resource = %self.info.resource_name, "Resetting SMU to known state");
        for command in RESET_SEQUENCE {
            if let Err(e) = self.send(command) {
                self.state = InstrumentState::default();
                return Err(e);
            }
        }
        self.state.mark_reset();
        Ok(())
    }

    /// Program a single static set-point.
    ///
    /// # Errors
    /// `Precondition` before the reset sequence, `Validation` for a bad level or
    /// setting (nothing written in either case), `Channel` if a write fails
    /// part-way (the driver is then unconfigured).
    pub fn configure_fixed(&mut self, settings: &SourceSettings, level: f64) -> AppResult<()> {
        self.require_initialized("configure_fixed")?;
        self.validate(settings, &[level])?;

        let func = settings.function.mnemonic();
        let mut commands = self.common_setup(settings);
        commands.push(format!(":SOURce:{func}:MODE {}", DriveMode::Fixed.mnemonic()));
        commands.push(format!(":SOUR:{func}:LEV {level}"));
        commands.push(":TRIG:COUN 1".to_string());

        self.send_configuration(
            commands,
            ActiveConfiguration {
                settings: *settings,
                drive_mode: DriveMode::Fixed,
                levels: vec![level],
                expected_reading_count: 1,
            },
        )
    }

    /// Program a sequence of set-points, one sample each per trigger.
    ///
    /// Every entry is validated; one bad entry rejects the whole list.
    pub fn configure_list(&mut self, settings: &SourceSettings, levels: &[f64]) -> AppResult<()> {
        self.require_initialized("configure_list")?;
        self.validate(settings, levels)?;

        let func = settings.function.mnemonic();
        let mut commands = self.common_setup(settings);
        commands.push(format!(":SOURce:{func}:MODE {}", DriveMode::List.mnemonic()));
        if let Some((first, rest)) = levels.split_first() {
            commands.push(format!(":SOUR:LIST:{func} {first}"));
            commands.extend(rest.iter().map(|level| format!(":SOUR:LIST:{func}:APP {level}")));
        }
        commands.push(format!(":TRIG:COUN {}", levels.len()));

        self.send_configuration(
            commands,
            ActiveConfiguration {
                settings: *settings,
                drive_mode: DriveMode::List,
                levels: levels.to_vec(),
                expected_reading_count: levels.len(),
            },
        )
    }

    /// Change the level of an active fixed-mode configuration.
    ///
    /// Only the level command is written; function, range and compliance stay
    /// as configured. The new level is held to the same ceiling.
    pub fn set_source_level(&mut self, level: f64) -> AppResult<()> {
        let settings = match self.state.configuration() {
            Some(config) if config.drive_mode == DriveMode::Fixed => config.settings,
            Some(_) => {
                return Err(SmuError::Precondition(
                    "set_source_level requires a fixed-mode configuration".to_string(),
                ))
            }
            None => {
                return Err(SmuError::Precondition(
                    "set_source_level called before configure_fixed".to_string(),
                ))
            }
        };
        self.validate(&settings, &[level])?;

        let command = format!(":SOUR:{}:LEV {level}", settings.function.mnemonic());
        if let Err(e) = self.send(&command) {
            self.state.invalidate();
            return Err(e);
        }
        self.state.set_fixed_level(level);
        Ok(())
    }

    /// Switch the source output on or off.
    ///
    /// Switching on requires a completed configuration. Switching off is
    /// always allowed.
    pub fn set_output(&mut self, enabled: bool) -> AppResult<()> {
        if enabled && self.state.configuration().is_none() {
            return Err(SmuError::Precondition(
                "output enabled before the source was configured".to_string(),
            ));
        }
        self.send(if enabled { OUTPUT_ON } else { OUTPUT_OFF })?;
        self.state.set_output(enabled);
        info!(enabled, "SMU output switched");
        Ok(())
    }

    /// Start a measurement without waiting for the data.
    pub fn initiate(&mut self) -> AppResult<()> {
        if self.state.configuration().is_none() {
            return Err(SmuError::Precondition(
                "read initiated before the source was configured".to_string(),
            ));
        }
        if self.state.read_pending() {
            return Err(SmuError::Precondition(
                "previous read has not been fetched".to_string(),
            ));
        }
        self.send(READ_COMMAND)?;
        self.state.set_read_pending(true);
        Ok(())
    }

    /// Block on the reply to the last [`initiate`](Self::initiate) and decode it.
    pub fn fetch(&mut self) -> AppResult<Measurement> {
        let expected = self.state.expected_reading_count().ok_or_else(|| {
            SmuError::Precondition("fetch called before the source was configured".to_string())
        })?;
        if !self.state.read_pending() {
            return Err(SmuError::Precondition(
                "fetch called without an initiated read".to_string(),
            ));
        }

        self.state.set_read_pending(false);
        let raw = self.channel.read()?;
        let mut readings = parse_reply(&raw, expected).map_err(|e| {
            warn!(error = %e, expected, "Failed to decode SMU reply");
            e
        })?;
        debug!(count = readings.len(), "SMU readings decoded");

        if expected == 1 {
            let reading = readings.remove(0);
            Ok(Measurement::Single {
                current: reading.current,
                voltage: reading.voltage,
            })
        } else {
            Ok(Measurement::Series(ReadingBuffer::new(readings)))
        }
    }

    /// Trigger a measurement and wait for its readings.
    pub fn trigger_and_fetch(&mut self) -> AppResult<Measurement> {
        self.initiate()?;
        self.fetch()
    }

    fn require_initialized(&self, operation: &str) -> AppResult<()> {
        if self.state.is_initialized() {
            Ok(())
        } else {
            Err(SmuError::Precondition(format!(
                "{operation} called before reset_to_known_state"
            )))
        }
    }

    fn validate(&self, settings: &SourceSettings, levels: &[f64]) -> AppResult<()> {
        check_settings(settings)
            .and_then(|()| check_levels(settings, levels))
            .map_err(|e| {
                warn!(error = %e, function = %settings.function, "Rejected SMU configuration");
                SmuError::from(e)
            })
    }

    /// NPLC, source function, range and protection: the part of the
    /// sequence shared by fixed and list configurations.
    fn common_setup(&self, settings: &SourceSettings) -> Vec<String> {
        let func = settings.function.mnemonic();
        let sense = settings.function.measured_mnemonic();
        vec![
            format!(":SENS:CURR:NPLC {};", settings.nplc),
            format!(":SENS:VOLT:NPLC {};", settings.nplc),
            format!(":SOUR:FUNC {func};"),
            format!(":SOUR:{func}:RANG {} ;", settings.range),
            // measurement range follows the compliance value
            format!(":SENS:{sense}:PROT:RSYN ON;"),
            format!(":SENS:{sense}:PROT {}", settings.compliance),
        ]
    }

    fn send_configuration(
        &mut self,
        commands: Vec<String>,
        configuration: ActiveConfiguration,
    ) -> AppResult<()> {
        for command in &commands {
            if let Err(e) = self.send(command) {
                self.state.invalidate();
                return Err(e);
            }
        }
        info!(
            function = %configuration.settings.function,
            mode = configuration.drive_mode.mnemonic(),
            readings = configuration.expected_reading_count,
            "SMU configured"
        );
        self.state.commit(configuration);
        Ok(())
    }

    fn send(&mut self, command: &str) -> AppResult<()> {
        debug!(command, "SMU write");
        self.channel.write(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockChannel;
    use tracing_test::traced_test;

    fn ready_driver() -> (MockChannel, Keithley2401<MockChannel>) {
        let mock = MockChannel::new();
        let mut smu = Keithley2401::new(mock.clone());
        smu.reset_to_known_state().unwrap();
        mock.clear_log();
        (mock, smu)
    }

    #[test]
    fn test_reset_sequence_is_verbatim() {
        let mock = MockChannel::new();
        let mut smu = Keithley2401::new(mock.clone());
        smu.reset_to_known_state().unwrap();
        assert_eq!(mock.writes(), RESET_SEQUENCE.to_vec());
        assert!(smu.state().is_initialized());
    }

    #[test]
    fn test_reset_failure_leaves_driver_uninitialized() {
        let mock = MockChannel::new();
        let mut smu = Keithley2401::new(mock.clone());
        mock.inject_failure_after(3);
        assert!(matches!(
            smu.reset_to_known_state(),
            Err(SmuError::Channel(_))
        ));
        assert!(!smu.state().is_initialized());
    }

    #[traced_test]
    #[test]
    fn test_rejection_is_logged() {
        let (mock, mut smu) = ready_driver();
        let settings = SourceSettings::current(1.0, 10e-3, 5.0);
        assert!(smu.configure_fixed(&settings, 0.02).is_err());
        assert_eq!(mock.write_count(), 0);
        assert!(logs_contain("Rejected SMU configuration"));
    }

    #[test]
    fn test_set_source_level_writes_only_level() {
        let (mock, mut smu) = ready_driver();
        let settings = SourceSettings::voltage(1.0, 20.0, 0.1, 11.0);
        smu.configure_fixed(&settings, 0.0).unwrap();
        mock.clear_log();

        smu.set_source_level(2.5).unwrap();
        assert_eq!(mock.writes(), vec![":SOUR:VOLT:LEV 2.5"]);
        assert_eq!(smu.state().configuration().unwrap().levels, vec![2.5]);

        assert!(smu.set_source_level(12.0).is_err());
        assert_eq!(mock.write_count(), 1);
    }

    #[test]
    fn test_set_source_level_rejected_in_list_mode() {
        let (_mock, mut smu) = ready_driver();
        let settings = SourceSettings::current(1.0, 10e-3, 5.0);
        smu.configure_list(&settings, &[1e-3, 2e-3]).unwrap();
        assert!(matches!(
            smu.set_source_level(1e-3),
            Err(SmuError::Precondition(_))
        ));
    }

    #[test]
    fn test_identify_updates_metadata() {
        let mock = MockChannel::new().with_resource_name("GPIB0::3::INSTR");
        mock.push_reply("KEITHLEY INSTRUMENTS INC.,MODEL 2401,4099121,C30\n");
        let mut smu = Keithley2401::new(mock.clone());

        assert_eq!(smu.get_metadata().serial_number, "Unknown");
        let idn = smu.identify().unwrap();
        assert!(idn.ends_with("C30"));
        assert_eq!(smu.get_metadata().serial_number, "4099121");
        assert_eq!(smu.get_metadata().resource_name, "GPIB0::3::INSTR");
    }

    #[test]
    fn test_fetch_requires_initiate() {
        let (mock, mut smu) = ready_driver();
        smu.configure_fixed(&SourceSettings::current(1.0, 10e-3, 5.0), 1e-3)
            .unwrap();
        mock.push_reply("0.5,0.001,0,0.0,0");
        assert!(matches!(smu.fetch(), Err(SmuError::Precondition(_))));

        smu.initiate().unwrap();
        assert!(matches!(smu.initiate(), Err(SmuError::Precondition(_))));
        assert!(smu.fetch().is_ok());
    }
}
