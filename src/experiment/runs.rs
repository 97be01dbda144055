//! Timed measurement runs
//!
//! Each run configures the source, switches the output on, takes paced
//! single-point measurements and switches the output off again. The output is
//! switched off even when a measurement fails part-way; the measurement error
//! is the one returned.
//!
//! Records are handed to a [`SampleSink`] as they are taken so a caller can
//! plot or stream them live, and are also collected into the returned
//! [`RunLog`].

use super::sweep::SweepPlan;
use crate::adapters::CommandChannel;
use crate::error::{AppResult, SmuError};
use crate::instrument::{Keithley2401, SourceSettings};
use crate::metadata::{RunMetadata, RunMetadataBuilder};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One sample of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Seconds since the output was switched on.
    pub elapsed_s: f64,
    /// Level the source was programmed to for this sample.
    pub set_point: f64,
    /// Measured current (A).
    pub current: f64,
    /// Measured voltage (V).
    pub voltage: f64,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    /// Run id, start time, instrument and parameters.
    pub metadata: RunMetadata,
    /// Samples in the order they were taken.
    pub records: Vec<RunRecord>,
}

impl RunLog {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no sample was taken.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Measured currents (A), one per sample.
    pub fn currents(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.current).collect()
    }

    /// Measured voltages (V), one per sample.
    pub fn voltages(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.voltage).collect()
    }
}

/// Receives each record as soon as it is measured.
pub trait SampleSink {
    /// Called once per sample, before the next one is taken.
    fn record(&mut self, record: &RunRecord);
}

impl<F: FnMut(&RunRecord)> SampleSink for F {
    fn record(&mut self, record: &RunRecord) {
        self(record)
    }
}

/// Hold a current and read back the voltage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantCurrentParams {
    /// Sourced current (A), at most 10 mA in magnitude.
    pub level: f64,
    /// Total run time; readings are spaced `duration / num_readings` apart.
    pub duration: Duration,
    /// Number of samples to take.
    pub num_readings: usize,
    /// Integration time in power-line cycles.
    pub nplc: f64,
    /// Source range (A).
    pub current_range: f64,
    /// Voltage protection limit (V).
    pub voltage_compliance: f64,
}

impl Default for ConstantCurrentParams {
    fn default() -> Self {
        Self {
            level: 10e-3,
            duration: Duration::from_secs(20),
            num_readings: 40,
            nplc: 1.0,
            current_range: 10e-3,
            voltage_compliance: 5.0,
        }
    }
}

impl ConstantCurrentParams {
    fn settings(&self) -> SourceSettings {
        SourceSettings::current(self.nplc, self.current_range, self.voltage_compliance)
    }
}

/// Hold a voltage and read back the current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantVoltageParams {
    /// Sourced voltage (V).
    pub level: f64,
    /// Total run time; readings are spaced `duration / num_readings` apart.
    pub duration: Duration,
    /// Number of samples to take.
    pub num_readings: usize,
    /// Integration time in power-line cycles.
    pub nplc: f64,
    /// Source range (V).
    pub voltage_range: f64,
    /// Current protection limit (A).
    pub current_compliance: f64,
    /// Largest voltage this run may source.
    pub voltage_ceiling: f64,
}

impl Default for ConstantVoltageParams {
    fn default() -> Self {
        Self {
            level: 3.0,
            duration: Duration::from_secs(10),
            num_readings: 20,
            nplc: 1.0,
            voltage_range: 20.0,
            current_compliance: 0.1,
            voltage_ceiling: 5.0,
        }
    }
}

impl ConstantVoltageParams {
    fn settings(&self) -> SourceSettings {
        SourceSettings::voltage(
            self.nplc,
            self.voltage_range,
            self.current_compliance,
            self.voltage_ceiling,
        )
    }
}

/// Step a voltage through a [`SweepPlan`] and read the current at each point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclicVoltammetryParams {
    /// Start and end voltage of each cycle.
    pub initial_voltage: f64,
    /// Peak voltage of each cycle.
    pub final_voltage: f64,
    /// Voltage step between consecutive points.
    pub scan_rate: f64,
    /// Number of up-and-down cycles.
    pub cycles: usize,
    /// Time spent at each point.
    pub dwell: Duration,
    /// Integration time in power-line cycles.
    pub nplc: f64,
    /// Source range (V).
    pub voltage_range: f64,
    /// Current protection limit (A).
    pub current_compliance: f64,
    /// Largest voltage the sweep may reach.
    pub voltage_ceiling: f64,
}

impl Default for CyclicVoltammetryParams {
    fn default() -> Self {
        Self {
            initial_voltage: 0.0,
            final_voltage: 4.0,
            scan_rate: 0.1,
            cycles: 5,
            dwell: Duration::from_secs(1),
            nplc: 1.0,
            voltage_range: 20.0,
            current_compliance: 0.1,
            voltage_ceiling: 11.0,
        }
    }
}

impl CyclicVoltammetryParams {
    fn settings(&self) -> SourceSettings {
        SourceSettings::voltage(
            self.nplc,
            self.voltage_range,
            self.current_compliance,
            self.voltage_ceiling,
        )
    }
}

/// Hold a constant current and record the voltage.
pub fn constant_current<C: CommandChannel>(
    driver: &mut Keithley2401<C>,
    params: &ConstantCurrentParams,
    sink: &mut impl SampleSink,
) -> AppResult<RunLog> {
    let metadata = RunMetadataBuilder::new()
        .experiment_name("constant_current")
        .description(&format!("constant current at {} A", params.level))
        .instrument(driver.get_metadata().clone())
        .parameter("level", params.level)
        .parameter("duration_s", params.duration.as_secs_f64())
        .parameter("num_readings", params.num_readings)
        .parameter("nplc", params.nplc)
        .parameter("current_range", params.current_range)
        .parameter("voltage_compliance", params.voltage_compliance)
        .build();

    ensure_reset(driver)?;
    driver.configure_fixed(&params.settings(), params.level)?;
    let interval = reading_interval(params.duration, params.num_readings);
    let records = with_output(driver, |driver| {
        hold_level(driver, params.level, params.num_readings, interval, sink)
    })?;
    finish(metadata, records)
}

/// Hold a constant voltage and record the current.
pub fn constant_voltage<C: CommandChannel>(
    driver: &mut Keithley2401<C>,
    params: &ConstantVoltageParams,
    sink: &mut impl SampleSink,
) -> AppResult<RunLog> {
    let metadata = RunMetadataBuilder::new()
        .experiment_name("constant_voltage")
        .description(&format!("constant voltage at {} V", params.level))
        .instrument(driver.get_metadata().clone())
        .parameter("level", params.level)
        .parameter("duration_s", params.duration.as_secs_f64())
        .parameter("num_readings", params.num_readings)
        .parameter("nplc", params.nplc)
        .parameter("voltage_range", params.voltage_range)
        .parameter("current_compliance", params.current_compliance)
        .parameter("voltage_ceiling", params.voltage_ceiling)
        .build();

    ensure_reset(driver)?;
    driver.configure_fixed(&params.settings(), params.level)?;
    let interval = reading_interval(params.duration, params.num_readings);
    let records = with_output(driver, |driver| {
        hold_level(driver, params.level, params.num_readings, interval, sink)
    })?;
    finish(metadata, records)
}

/// Sweep the voltage up and down and record the current at each point.
///
/// The whole plan is checked against the voltage ceiling before anything is
/// written to the instrument.
pub fn cyclic_voltammetry<C: CommandChannel>(
    driver: &mut Keithley2401<C>,
    params: &CyclicVoltammetryParams,
    sink: &mut impl SampleSink,
) -> AppResult<RunLog> {
    let plan = SweepPlan::generate(
        params.initial_voltage,
        params.final_voltage,
        params.scan_rate,
        params.cycles,
    )?;
    let settings = params.settings();
    crate::instrument::validation::check_settings(&settings)?;
    crate::instrument::validation::check_levels(&settings, plan.points())?;

    let metadata = RunMetadataBuilder::new()
        .experiment_name("cyclic_voltammetry")
        .description(&format!(
            "{}-{} V at {} V/step, {} cycles",
            params.initial_voltage, params.final_voltage, params.scan_rate, params.cycles
        ))
        .instrument(driver.get_metadata().clone())
        .parameter("initial_voltage", params.initial_voltage)
        .parameter("final_voltage", params.final_voltage)
        .parameter("scan_rate", params.scan_rate)
        .parameter("cycles", params.cycles)
        .parameter("dwell_s", params.dwell.as_secs_f64())
        .parameter("points", plan.len())
        .build();

    ensure_reset(driver)?;
    driver.configure_fixed(&settings, params.initial_voltage)?;
    info!(points = plan.len(), cycles = params.cycles, "Starting voltage sweep");

    let records = with_output(driver, |driver| {
        let start = Instant::now();
        let mut records = Vec::with_capacity(plan.len());
        for &voltage in &plan {
            let sample_start = Instant::now();
            driver.set_source_level(voltage)?;
            let record = measure(driver, start, voltage)?;
            sink.record(&record);
            records.push(record);
            pace(sample_start, params.dwell);
        }
        Ok(records)
    })?;
    finish(metadata, records)
}

fn ensure_reset<C: CommandChannel>(driver: &mut Keithley2401<C>) -> AppResult<()> {
    if driver.state().is_initialized() {
        Ok(())
    } else {
        driver.reset_to_known_state()
    }
}

fn reading_interval(duration: Duration, num_readings: usize) -> Duration {
    match u32::try_from(num_readings) {
        Ok(0) => Duration::ZERO,
        Ok(n) => duration / n,
        Err(_) => Duration::ZERO,
    }
}

/// Output on, run `body`, output off whatever happened.
fn with_output<C, T>(
    driver: &mut Keithley2401<C>,
    body: impl FnOnce(&mut Keithley2401<C>) -> AppResult<T>,
) -> AppResult<T>
where
    C: CommandChannel,
{
    driver.set_output(true)?;
    let result = body(driver);
    let off = driver.set_output(false);
    match (result, off) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(off_err)) => {
            warn!(error = %off_err, "Failed to switch output off after run error");
            Err(e)
        }
    }
}

fn hold_level<C: CommandChannel>(
    driver: &mut Keithley2401<C>,
    level: f64,
    num_readings: usize,
    interval: Duration,
    sink: &mut impl SampleSink,
) -> AppResult<Vec<RunRecord>> {
    let start = Instant::now();
    let mut records = Vec::with_capacity(num_readings);
    for _ in 0..num_readings {
        let sample_start = Instant::now();
        let record = measure(driver, start, level)?;
        sink.record(&record);
        records.push(record);
        pace(sample_start, interval);
    }
    Ok(records)
}

fn measure<C: CommandChannel>(
    driver: &mut Keithley2401<C>,
    start: Instant,
    set_point: f64,
) -> AppResult<RunRecord> {
    let (current, voltage) = driver.trigger_and_fetch()?.as_single().ok_or_else(|| {
        SmuError::Precondition("expected a single reading from a fixed-mode source".to_string())
    })?;
    Ok(RunRecord {
        elapsed_s: start.elapsed().as_secs_f64(),
        set_point,
        current,
        voltage,
    })
}

/// Sleep out whatever is left of `interval`; a late sample continues at once.
fn pace(sample_start: Instant, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    let took = sample_start.elapsed();
    match interval.checked_sub(took) {
        Some(remaining) => thread::sleep(remaining),
        None => warn!(
            took_ms = took.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Sample overran its interval"
        ),
    }
}

fn finish(metadata: RunMetadata, records: Vec<RunRecord>) -> AppResult<RunLog> {
    info!(
        run_id = %metadata.run_id,
        experiment = %metadata.experiment_name,
        samples = records.len(),
        "Run complete"
    );
    Ok(RunLog { metadata, records })
}
