//! Simulated source-measure unit
//!
//! `SimulatedSmu` interprets the same SCPI vocabulary the driver emits and
//! answers `:READ?` with reply buffers in the instrument's 5-field format. The
//! device under test is modelled as a resistor; the measured quantity is
//! clamped at the programmed compliance, and clamped samples carry the
//! compliance bit in their status field.
//!
//! The instrument clock starts at construction and restarts on
//! `:SYSTem:TIME:RESet`. Samples inside one trigger are spaced by the
//! integration time (`nplc / line_frequency`).

use super::CommandChannel;
use crate::error::{AppResult, SmuError};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

const IDENTITY: &str = "KEITHLEY INSTRUMENTS INC.,MODEL 2401,0000000,C30 (simulated)";
const RESISTANCE_NOT_MEASURED: f64 = 9.91e37;
const STATUS_COMPLIANCE: u32 = 1 << 3;
const LINE_FREQUENCY_HZ: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Current,
    Voltage,
}

impl Quantity {
    fn parse(mnemonic: &str) -> Option<Self> {
        match mnemonic {
            "CURR" | "'CURR'" => Some(Quantity::Current),
            "VOLT" | "'VOLT'" => Some(Quantity::Voltage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct SourceModel {
    function: Quantity,
    list_mode: bool,
    current_level: f64,
    voltage_level: f64,
    current_list: Vec<f64>,
    voltage_list: Vec<f64>,
    current_compliance: f64,
    voltage_compliance: f64,
    nplc: f64,
    trigger_count: usize,
    output_on: bool,
}

impl Default for SourceModel {
    fn default() -> Self {
        // *RST defaults of the 2400 family
        Self {
            function: Quantity::Voltage,
            list_mode: false,
            current_level: 0.0,
            voltage_level: 0.0,
            current_list: Vec::new(),
            voltage_list: Vec::new(),
            current_compliance: 105e-6,
            voltage_compliance: 21.0,
            nplc: 1.0,
            trigger_count: 1,
            output_on: false,
        }
    }
}

/// Behavioral model of the instrument behind a [`CommandChannel`].
#[derive(Debug)]
pub struct SimulatedSmu {
    resource: String,
    load_ohms: f64,
    model: SourceModel,
    clock_origin: Instant,
    replies: VecDeque<String>,
    history: Vec<String>,
}

impl SimulatedSmu {
    /// Simulate an instrument wired to a resistive load.
    pub fn new(load_ohms: f64) -> Self {
        Self {
            resource: "SIM::SMU::INSTR".to_string(),
            load_ohms,
            model: SourceModel::default(),
            clock_origin: Instant::now(),
            replies: VecDeque::new(),
            history: Vec::new(),
        }
    }

    /// Use a specific resource name in metadata.
    pub fn with_resource_name(mut self, resource: &str) -> Self {
        self.resource = resource.to_string();
        self
    }

    /// Commands received so far, in order.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// Whether the simulated output relay is closed.
    pub fn output_on(&self) -> bool {
        self.model.output_on
    }

    /// Level the source would apply on the next fixed-mode sample.
    pub fn fixed_level(&self) -> f64 {
        match self.model.function {
            Quantity::Current => self.model.current_level,
            Quantity::Voltage => self.model.voltage_level,
        }
    }

    fn apply(&mut self, command: &str) -> AppResult<()> {
        let trimmed = command.trim().trim_end_matches(';').trim();
        let (header, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((header, argument)) => (header.to_ascii_uppercase(), argument.trim()),
            None => (trimmed.to_ascii_uppercase(), ""),
        };

        match header.as_str() {
            "*RST" => {
                self.model = SourceModel::default();
                self.replies.clear();
            }
            "*CLS" | ":SOUR:CLE:AUTO" | ":SYST:BEEP:STAT" | ":TRIGGER:CLEAR" | ":SYST:RSEN"
            | ":SENS:FUNC:OFF:ALL" | ":SENS:FUNC" | ":SENS:VOLT:PROT:RSYN"
            | ":SENS:CURR:PROT:RSYN" | ":SOUR:CURR:RANG" | ":SOUR:VOLT:RANG" => {}
            ":SYSTEM:TIME:RESET" => self.clock_origin = Instant::now(),
            "*IDN?" => self.replies.push_back(IDENTITY.to_string()),
            ":SENS:CURR:NPLC" | ":SENS:VOLT:NPLC" => self.model.nplc = number(&header, argument)?,
            ":SOUR:FUNC" => {
                self.model.function = Quantity::parse(&argument.to_ascii_uppercase())
                    .ok_or_else(|| undefined(command))?;
            }
            ":SENS:VOLT:PROT" => self.model.voltage_compliance = number(&header, argument)?,
            ":SENS:CURR:PROT" => self.model.current_compliance = number(&header, argument)?,
            ":SOURCE:CURR:MODE" | ":SOURCE:VOLT:MODE" => {
                self.model.list_mode = match argument.to_ascii_uppercase().as_str() {
                    "FIXED" => false,
                    "LIST" => true,
                    _ => return Err(undefined(command)),
                };
            }
            ":SOUR:CURR:LEV" => self.model.current_level = number(&header, argument)?,
            ":SOUR:VOLT:LEV" => self.model.voltage_level = number(&header, argument)?,
            ":SOUR:LIST:CURR" => self.model.current_list = vec![number(&header, argument)?],
            ":SOUR:LIST:VOLT" => self.model.voltage_list = vec![number(&header, argument)?],
            ":SOUR:LIST:CURR:APP" => self.model.current_list.push(number(&header, argument)?),
            ":SOUR:LIST:VOLT:APP" => self.model.voltage_list.push(number(&header, argument)?),
            ":TRIG:COUN" => {
                self.model.trigger_count = argument.parse().map_err(|_| undefined(command))?;
            }
            ":OUTP" => {
                self.model.output_on = match argument.to_ascii_uppercase().as_str() {
                    "ON" | "1" => true,
                    "OFF" | "0" => false,
                    _ => return Err(undefined(command)),
                };
            }
            ":READ?" => {
                let reply = self.sample_buffer();
                self.replies.push_back(reply);
            }
            _ => return Err(undefined(command)),
        }
        Ok(())
    }

    fn set_point(&self, index: usize) -> f64 {
        let (fixed, list) = match self.model.function {
            Quantity::Current => (self.model.current_level, &self.model.current_list),
            Quantity::Voltage => (self.model.voltage_level, &self.model.voltage_list),
        };
        if self.model.list_mode && !list.is_empty() {
            list[index % list.len()]
        } else {
            fixed
        }
    }

    /// `(voltage, current, in_compliance)` at the terminals for a set-point.
    fn solve(&self, set_point: f64) -> (f64, f64, bool) {
        if !self.model.output_on {
            return (0.0, 0.0, false);
        }
        match self.model.function {
            Quantity::Current => {
                let limit = self.model.voltage_compliance.abs();
                let voltage = set_point * self.load_ohms;
                if voltage.abs() > limit {
                    let clamped = limit.copysign(voltage);
                    (clamped, clamped / self.load_ohms, true)
                } else {
                    (voltage, set_point, false)
                }
            }
            Quantity::Voltage => {
                let limit = self.model.current_compliance.abs();
                let current = set_point / self.load_ohms;
                if current.abs() > limit {
                    let clamped = limit.copysign(current);
                    (clamped * self.load_ohms, clamped, true)
                } else {
                    (set_point, current, false)
                }
            }
        }
    }

    fn sample_buffer(&self) -> String {
        let start = self.clock_origin.elapsed().as_secs_f64();
        let integration = self.model.nplc / LINE_FREQUENCY_HZ;

        (0..self.model.trigger_count)
            .map(|k| {
                let (voltage, current, in_compliance) = self.solve(self.set_point(k));
                let status = if in_compliance { STATUS_COMPLIANCE } else { 0 };
                let timestamp = start + integration * (k + 1) as f64;
                format!(
                    "{:+.6E},{:+.6E},{:+.6E},{:+.6E},{:+.6E}",
                    voltage, current, RESISTANCE_NOT_MEASURED, timestamp, status as f64
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn number(header: &str, argument: &str) -> AppResult<f64> {
    argument
        .parse::<f64>()
        .map_err(|_| SmuError::Channel(format!("{header}: invalid numeric argument '{argument}'")))
}

fn undefined(command: &str) -> SmuError {
    SmuError::Channel(format!("simulated instrument: undefined header in '{command}'"))
}

impl CommandChannel for SimulatedSmu {
    fn write(&mut self, command: &str) -> AppResult<()> {
        debug!(command, "simulated write");
        self.history.push(command.to_string());
        self.apply(command)
    }

    fn read(&mut self) -> AppResult<String> {
        self.replies.pop_front().ok_or_else(|| {
            SmuError::Channel("simulated instrument has no pending reply".to_string())
        })
    }

    fn resource_name(&self) -> String {
        self.resource.clone()
    }
}
