//! Integration tests running both devices against the in-memory echo controllers.

use approx::assert_relative_eq;
use tweezers_daq::codec;
use tweezers_daq::config::{InjectManConfig, VoltageControlConfig};
use tweezers_daq::instrument::inject_man::LimitSwitches;
use tweezers_daq::kinematics::{Geometry, Position};
use tweezers_daq::simulation::CANNED_POSITION_REPLY;
use tweezers_daq::{ErrorCategory, InjectMan, VoltageControl};

#[test]
fn test_position_query_is_deterministic() {
    let mut im = InjectMan::open(&InjectManConfig::simulated()).unwrap();
    for _ in 0..5 {
        assert_eq!(im.call("C010").unwrap(), CANNED_POSITION_REPLY);
    }

    let report = im.query_position().unwrap();
    assert_eq!(report.position, [595, 0, 778]);
    assert_eq!(report.switches(), LimitSwitches::empty());
    im.close().unwrap();
}

#[test]
fn test_codes_are_acknowledged() {
    let mut im = InjectMan::simulated();
    assert_eq!(im.query_version().unwrap(), "A001");
    assert_eq!(im.switch_to_remote_control().unwrap(), "A004");
    assert_eq!(im.trigger_short_acoustic_signals(2).unwrap(), "A014 2");
    assert_eq!(im.call("X001").unwrap(), "ERR:X001");
}

#[test]
fn test_move_to_scenario() {
    let mut im = InjectMan::simulated();
    let reply = im
        .move_to(Position::new(0.0, 0.0, 4700.0), Some(7000.0), true)
        .unwrap();

    let decoded = codec::decode(&reply).unwrap();
    assert_eq!(decoded.code, "007");

    let cos: f64 = 10000.0 / 15557.0;
    let sin: f64 = 11917.0 / 15557.0;
    let d3 = 4700.0 / cos;
    let d1 = d3 * sin;
    assert_eq!(
        decoded.fields,
        vec![d1.round() as i64, 0, d3.round() as i64, 7000, 7000, 7000]
    );
}

#[test]
fn test_current_position_round_trips_through_geometry() {
    let mut im = InjectMan::simulated();
    let p = im.current_position().unwrap();
    let motor = Geometry::default().position_to_motor(p);
    assert_relative_eq!(motor.d1, 595.0, epsilon = 1e-9);
    assert_relative_eq!(motor.d3, 778.0, epsilon = 1e-9);
}

#[test]
fn test_invalid_move_is_configuration_error() {
    let mut im = InjectMan::simulated();
    let err = im
        .goto_position([30_000.0, 0.0, 0.0], [1000.0; 3])
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Configuration);
    assert!(err.to_string().contains("30000.0"));
}

#[test]
fn test_voltage_controller_round_trip() {
    let mut vc = VoltageControl::open(&VoltageControlConfig::simulated()).unwrap();
    assert_eq!(vc.set_voltage(1, 2500).unwrap(), 2500);
    assert_eq!(vc.sense_voltage(1).unwrap(), 2500);
    assert_eq!(vc.sense_voltage(2).unwrap(), 0);

    vc.set_outputs(&[100, 200]).unwrap();
    assert_eq!(vc.set_voltage(2, -40).unwrap(), -40);
    vc.close().unwrap();
}
