//! Delta-compressed transport with an extension unit

mod common;

use common::*;
use std::sync::atomic::Ordering;
use txt_io::controller::ControllerOptions;
use txt_io::{Error, LoopState, TransportKind};

#[test]
fn test_extension_unit_inputs_and_motor() {
    let mut rig = rig_with(TransportKind::Compressed, 2, ControllerOptions::default());
    rig.sim.lock().set_input(1, 3, 777);
    start(&mut rig);

    let voltage = rig.controller.voltage(1, 3).unwrap();
    cycles(&rig, 2);
    assert_eq!(voltage.voltage(), 777);

    let motor = rig.controller.motor(1, 2).unwrap();
    motor.set_speed(512);
    motor.set_distance(16, None).unwrap();
    motor.wait_finished(POLL).unwrap();
    assert_eq!(motor.current_distance(), 16);
    assert_eq!(rig.sim.lock().unit(1).map(|u| u.pwm[4]), Some(512));
    rig.controller.stop_online().unwrap();
}

#[test]
fn test_unchanged_frames_keep_previous_values() {
    let mut rig = rig_with(TransportKind::Compressed, 1, ControllerOptions::default());
    rig.sim.lock().set_input(0, 0, 1234);
    start(&mut rig);
    cycles(&rig, 2);
    let input = rig.controller.resistor(0, 0).unwrap();
    assert_eq!(input.value(), 1234);

    // Nothing changes on either side: responses carry the previous CRC
    let before = rig.sim.lock().exchanges();
    cycles(&rig, 5);
    assert!(rig.sim.lock().exchanges() >= before + 5);
    assert_eq!(input.value(), 1234);
}

#[test]
fn test_compressed_restart_resets_baselines() {
    let mut rig = rig_with(TransportKind::Compressed, 1, ControllerOptions::default());
    rig.sim.lock().set_input(0, 7, 55);
    start(&mut rig);
    cycles(&rig, 1);
    rig.controller.stop_online().unwrap();

    rig.sim.lock().set_input(0, 7, 66);
    start(&mut rig);
    cycles(&rig, 1);
    assert_eq!(rig.controller.shared().read(|s| s.master().current_input[7]), 66);
}

#[test]
fn test_response_missing_an_extension_unit_stops_session() {
    let (on_error, calls) = counting_callback(true);
    let options = ControllerOptions {
        on_error,
        on_data: None,
    };
    let mut rig = rig_with(TransportKind::Compressed, 2, options);
    rig.sim.lock().set_response_units(Some(1));
    rig.controller.shared().write(|s| s.units[1].current_input[2] = 31);

    rig.controller.start_online().unwrap();
    assert!(matches!(
        rig.controller.wait_for_next_cycle(POLL),
        Err(Error::Stopped)
    ));
    assert_eq!(rig.controller.loop_state(), LoopState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Nothing of the short response was merged
    assert_eq!(rig.controller.shared().read(|s| s.units[1].current_input[2]), 31);
}
