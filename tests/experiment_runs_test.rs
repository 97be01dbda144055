//! End-to-end runs against the simulated instrument.

use std::time::Duration;

use smu_daq::adapters::{MockChannel, SimulatedSmu};
use smu_daq::error::SmuError;
use smu_daq::experiment::{
    constant_current, constant_voltage, cyclic_voltammetry, ConstantCurrentParams,
    ConstantVoltageParams, CyclicVoltammetryParams, RunRecord, SweepPlan,
};
use smu_daq::instrument::Keithley2401;

#[test]
fn constant_voltage_reads_ohmic_current() {
    let mut smu = Keithley2401::new(SimulatedSmu::new(100.0));
    let params = ConstantVoltageParams {
        level: 2.0,
        duration: Duration::ZERO,
        num_readings: 4,
        ..Default::default()
    };

    let log = constant_voltage(&mut smu, &params, &mut |_: &RunRecord| {}).unwrap();
    assert_eq!(log.len(), 4);
    for current in log.currents() {
        assert!((current - 0.02).abs() < 1e-9);
    }
    assert_eq!(log.metadata.parameters["level"], serde_json::json!(2.0));
    assert!(!smu.channel().output_on());

    let history = smu.into_channel().history().to_vec();
    assert_eq!(history.first().map(String::as_str), Some("*RST;"));
    assert_eq!(history.last().map(String::as_str), Some(":OUTP OFF;"));
    assert_eq!(history.iter().filter(|c| *c == ":READ?").count(), 4);
}

#[test]
fn constant_current_clamps_at_voltage_compliance() {
    let mut smu = Keithley2401::new(SimulatedSmu::new(10_000.0));
    let params = ConstantCurrentParams {
        level: 1e-3,
        duration: Duration::ZERO,
        num_readings: 2,
        voltage_compliance: 5.0,
        ..Default::default()
    };

    let log = constant_current(&mut smu, &params, &mut |_: &RunRecord| {}).unwrap();
    for voltage in log.voltages() {
        assert!((voltage - 5.0).abs() < 1e-9);
    }
}

#[test]
fn cyclic_voltammetry_follows_the_sweep() {
    let mut smu = Keithley2401::new(SimulatedSmu::new(1_000.0));
    let params = CyclicVoltammetryParams {
        initial_voltage: 0.0,
        final_voltage: 1.0,
        scan_rate: 0.25,
        cycles: 2,
        dwell: Duration::ZERO,
        ..Default::default()
    };
    let plan = SweepPlan::generate(0.0, 1.0, 0.25, 2).unwrap();

    let mut live = Vec::new();
    let log = cyclic_voltammetry(&mut smu, &params, &mut |r: &RunRecord| live.push(*r)).unwrap();

    assert_eq!(live, log.records);
    assert_eq!(log.len(), plan.len());
    for (record, set_point) in log.records.iter().zip(plan.iter()) {
        assert_eq!(record.set_point, *set_point);
        assert!((record.voltage - set_point).abs() < 1e-9);
        assert!((record.current - set_point / 1_000.0).abs() < 1e-9);
    }
    let elapsed: Vec<f64> = log.records.iter().map(|r| r.elapsed_s).collect();
    assert!(elapsed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(log.metadata.experiment_name, "cyclic_voltammetry");
    assert!(!smu.state().output_enabled());
}

#[test]
fn cyclic_voltammetry_rejects_bad_sweep_before_writing() {
    let mock = MockChannel::new();
    let mut smu = Keithley2401::new(mock.clone());
    let params = CyclicVoltammetryParams {
        scan_rate: 0.0,
        ..Default::default()
    };
    assert!(matches!(
        cyclic_voltammetry(&mut smu, &params, &mut |_: &RunRecord| {}),
        Err(SmuError::Sweep(_))
    ));
    assert_eq!(mock.write_count(), 0);
}

#[test]
fn pacing_spaces_samples() {
    let mut smu = Keithley2401::new(SimulatedSmu::new(1_000.0));
    let params = ConstantCurrentParams {
        level: 1e-3,
        duration: Duration::from_millis(60),
        num_readings: 3,
        ..Default::default()
    };
    let log = constant_current(&mut smu, &params, &mut |_: &RunRecord| {}).unwrap();
    let last = log.records.last().unwrap();
    // two full intervals must have passed before the third sample
    assert!(last.elapsed_s >= 0.04);
}

#[test]
fn run_log_serializes_to_json() {
    let mut smu = Keithley2401::new(SimulatedSmu::new(1_000.0));
    let params = ConstantCurrentParams {
        level: 1e-3,
        duration: Duration::ZERO,
        num_readings: 1,
        ..Default::default()
    };
    let log = constant_current(&mut smu, &params, &mut |_: &RunRecord| {}).unwrap();
    let json = serde_json::to_value(&log).unwrap();
    assert_eq!(json["metadata"]["experiment_name"], "constant_current");
    assert_eq!(json["records"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["metadata"]["instrument"]["resource_name"], "SIM::SMU::INSTR");
}
