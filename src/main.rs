// smu_daq -- command-line front end for the Keithley 2401 driver.
//
// Usage:
//   smu_daq --mock idn
//   smu_daq --resource GPIB0::3::INSTR constant-current --level 1e-3 --duration 20 --readings 40
//   smu_daq constant-voltage --level 3 --ceiling 5
//   smu_daq --json cyclic-voltammetry --initial 0 --final 4 --scan-rate 0.1 --cycles 5
//
// Connection settings come from config/smu_daq.toml (or --config) and
// SMUDAQ_* environment variables; --resource and --mock override them.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use smu_daq::adapters::visa_adapter::VisaChannelBuilder;
use smu_daq::adapters::{CommandChannel, SimulatedSmu};
use smu_daq::config::{SmuConfig, DEFAULT_CONFIG_PATH};
use smu_daq::experiment::{
    constant_current, constant_voltage, cyclic_voltammetry, ConstantCurrentParams,
    ConstantVoltageParams, CyclicVoltammetryParams, RunLog, RunRecord, SampleSink,
};
use smu_daq::instrument::Keithley2401;
use smu_daq::logging::{self, LogFormat};

/// Drive a Keithley 2401 source-measure unit.
#[derive(Parser)]
#[command(name = "smu_daq", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// VISA resource string, overriding the configuration.
    #[arg(long, global = true)]
    resource: Option<String>,

    /// Use the simulated instrument instead of real hardware.
    #[arg(long, global = true)]
    mock: bool,

    /// Print results (and logs) as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Query the instrument identity.
    Idn,

    /// Source a constant current and record the voltage.
    ConstantCurrent {
        /// Current in amps (at most 10 mA).
        #[arg(long, default_value_t = 10e-3)]
        level: f64,
        /// Total run time in seconds.
        #[arg(long, default_value_t = 20.0)]
        duration: f64,
        /// Number of readings.
        #[arg(long, default_value_t = 40)]
        readings: usize,
        #[arg(long, default_value_t = 1.0)]
        nplc: f64,
        /// Current range in amps.
        #[arg(long, default_value_t = 10e-3)]
        range: f64,
        /// Voltage compliance in volts.
        #[arg(long, default_value_t = 5.0)]
        compliance: f64,
    },

    /// Source a constant voltage and record the current.
    ConstantVoltage {
        /// Voltage in volts.
        #[arg(long, default_value_t = 3.0)]
        level: f64,
        #[arg(long, default_value_t = 10.0)]
        duration: f64,
        #[arg(long, default_value_t = 20)]
        readings: usize,
        #[arg(long, default_value_t = 1.0)]
        nplc: f64,
        /// Voltage range in volts.
        #[arg(long, default_value_t = 20.0)]
        range: f64,
        /// Current compliance in amps.
        #[arg(long, default_value_t = 0.1)]
        compliance: f64,
        /// Largest voltage the run may source.
        #[arg(long, default_value_t = 5.0)]
        ceiling: f64,
    },

    /// Sweep the voltage up and down and record the current.
    CyclicVoltammetry {
        #[arg(long, default_value_t = 0.0)]
        initial: f64,
        #[arg(long = "final", default_value_t = 4.0)]
        final_voltage: f64,
        /// Voltage step between points.
        #[arg(long, default_value_t = 0.1)]
        scan_rate: f64,
        #[arg(long, default_value_t = 5)]
        cycles: usize,
        /// Seconds spent at each point.
        #[arg(long, default_value_t = 1.0)]
        dwell: f64,
        #[arg(long, default_value_t = 1.0)]
        nplc: f64,
        #[arg(long, default_value_t = 20.0)]
        range: f64,
        #[arg(long, default_value_t = 0.1)]
        compliance: f64,
        #[arg(long, default_value_t = 11.0)]
        ceiling: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SmuConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(resource) = &cli.resource {
        config.instrument.resource = resource.clone();
        config.instrument.mock = false;
    }
    if cli.mock {
        config.instrument.mock = true;
    }

    let format = if cli.json { LogFormat::Json } else { LogFormat::Pretty };
    logging::init(&config, format).context("initialising logging")?;
    info!(
        app = %config.application.name,
        resource = %config.instrument.resource,
        mock = config.instrument.mock,
        "Starting"
    );

    let channel = open_channel(&config)?;
    let mut smu = Keithley2401::new(channel);

    let log = match cli.command {
        Command::Idn => {
            let idn = smu.identify().context("querying *IDN?")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(smu.get_metadata())?);
            } else {
                println!("{idn}");
            }
            return Ok(());
        }
        Command::ConstantCurrent {
            level,
            duration,
            readings,
            nplc,
            range,
            compliance,
        } => {
            let params = ConstantCurrentParams {
                level,
                duration: seconds(duration)?,
                num_readings: readings,
                nplc,
                current_range: range,
                voltage_compliance: compliance,
            };
            run_with_table(cli.json, |sink| constant_current(&mut smu, &params, sink))?
        }
        Command::ConstantVoltage {
            level,
            duration,
            readings,
            nplc,
            range,
            compliance,
            ceiling,
        } => {
            let params = ConstantVoltageParams {
                level,
                duration: seconds(duration)?,
                num_readings: readings,
                nplc,
                voltage_range: range,
                current_compliance: compliance,
                voltage_ceiling: ceiling,
            };
            run_with_table(cli.json, |sink| constant_voltage(&mut smu, &params, sink))?
        }
        Command::CyclicVoltammetry {
            initial,
            final_voltage,
            scan_rate,
            cycles,
            dwell,
            nplc,
            range,
            compliance,
            ceiling,
        } => {
            let params = CyclicVoltammetryParams {
                initial_voltage: initial,
                final_voltage,
                scan_rate,
                cycles,
                dwell: seconds(dwell)?,
                nplc,
                voltage_range: range,
                current_compliance: compliance,
                voltage_ceiling: ceiling,
            };
            run_with_table(cli.json, |sink| cyclic_voltammetry(&mut smu, &params, sink))?
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&log)?);
    }
    Ok(())
}

fn open_channel(config: &SmuConfig) -> Result<Box<dyn CommandChannel>> {
    let instrument = &config.instrument;
    if instrument.mock {
        let sim = SimulatedSmu::new(instrument.simulated_load_ohms)
            .with_resource_name(&instrument.resource);
        return Ok(Box::new(sim));
    }
    let channel = VisaChannelBuilder::new(&instrument.resource)
        .with_timeout(instrument.timeout())
        .with_write_terminator(&instrument.write_terminator)
        .open()
        .with_context(|| format!("opening {}", instrument.resource))?;
    Ok(Box::new(channel))
}

/// Prints one table row per record; silent when JSON output is wanted.
struct TablePrinter {
    json: bool,
}

impl SampleSink for TablePrinter {
    fn record(&mut self, r: &RunRecord) {
        if !self.json {
            println!(
                "{:>10.3}  {:>12.4e}  {:>14.6e}  {:>12.6}",
                r.elapsed_s, r.set_point, r.current, r.voltage
            );
        }
    }
}

fn run_with_table<F>(json: bool, run: F) -> Result<RunLog>
where
    F: FnOnce(&mut TablePrinter) -> smu_daq::error::AppResult<RunLog>,
{
    if !json {
        println!(
            "{:>10}  {:>12}  {:>14}  {:>12}",
            "time (s)", "set point", "current (A)", "voltage (V)"
        );
    }
    let log = run(&mut TablePrinter { json }).context("measurement run failed")?;
    info!(run_id = %log.metadata.run_id, samples = log.len(), "Run finished");
    Ok(log)
}

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid duration {value} s"))
}
