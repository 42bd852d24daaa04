//! Direct serial link to the motor shield

mod common;

use common::*;
use txt_io::{Error, TransportKind};

#[test]
fn test_pwm_bytes_on_the_wire() {
    let mut rig = rig(TransportKind::Serial);
    start(&mut rig);
    let lamp = rig.controller.output(0, 0).unwrap();
    let motor = rig.controller.motor(0, 1).unwrap();

    lamp.set_level(301);
    motor.set_speed(512);
    cycles(&rig, 2);
    let pwm = rig.sim.lock().unit(0).map(|u| u.pwm).unwrap();
    // 301 travels as 150, 512 saturates at 255
    assert_eq!(pwm[0], 300);
    assert_eq!(&pwm[2..4], &[512, 0]);
    rig.controller.stop_online().unwrap();
}

#[test]
fn test_serial_motor_distance_echo() {
    let mut rig = rig(TransportKind::Serial);
    start(&mut rig);
    let motor = rig.controller.motor(0, 3).unwrap();
    motor.set_speed(512);
    motor.set_distance(12, None).unwrap();
    motor.wait_finished(POLL).unwrap();
    assert_eq!(motor.current_distance(), 12);
}

#[test]
fn test_serial_inputs_merge() {
    let mut rig = rig(TransportKind::Serial);
    rig.sim.lock().set_input(0, 6, 1500);
    start(&mut rig);
    let ultrasonic = rig.controller.ultrasonic(0, 6).unwrap();
    cycles(&rig, 2);
    assert_eq!(ultrasonic.distance(), 1500);
}

#[test]
fn test_serial_has_no_session_extras() {
    let mut rig = rig(TransportKind::Serial);
    assert_eq!(rig.controller.device_name().unwrap(), "TXT direct");
    start(&mut rig);
    assert!(matches!(
        rig.controller.start_camera(),
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        rig.controller.play_sound(2, 1),
        Err(Error::NotSupported(_))
    ));
}
