//! Measurement experiments
//!
//! - **Sweeps**: [`SweepPlan`] builds the triangular voltage list used by
//!   cyclic voltammetry
//! - **Runs**: constant-current, constant-voltage and cyclic-voltammetry
//!   procedures that drive a [`Keithley2401`](crate::instrument::Keithley2401)
//!   and return a [`RunLog`]
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use smu_daq::adapters::SimulatedSmu;
//! use smu_daq::experiment::{cyclic_voltammetry, CyclicVoltammetryParams, RunRecord};
//! use smu_daq::instrument::Keithley2401;
//!
//! # fn main() -> smu_daq::error::AppResult<()> {
//! let mut smu = Keithley2401::new(SimulatedSmu::new(1_000.0));
//! let params = CyclicVoltammetryParams {
//!     final_voltage: 1.0,
//!     scan_rate: 0.5,
//!     cycles: 1,
//!     dwell: Duration::ZERO,
//!     ..Default::default()
//! };
//! let log = cyclic_voltammetry(&mut smu, &params, &mut |r: &RunRecord| {
//!     println!("{:.3} V -> {:.3e} A", r.voltage, r.current);
//! })?;
//! assert_eq!(log.len(), 5);
//! # Ok(())
//! # }
//! ```

pub mod runs;
pub mod sweep;

pub use runs::{
    constant_current, constant_voltage, cyclic_voltammetry, ConstantCurrentParams,
    ConstantVoltageParams, CyclicVoltammetryParams, RunLog, RunRecord, SampleSink,
};
pub use sweep::{SweepPlan, MAX_SWEEP_POINTS};
