//! Session lifecycle and error handling against the simulator

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use txt_io::controller::ControllerOptions;
use txt_io::{Error, LoopState, TransportKind};

#[test]
fn test_status_and_firmware() {
    let mut rig = rig(TransportKind::Tcp);
    let status = rig.controller.query_status().unwrap();
    assert!(status.id_matches());
    assert_eq!(rig.controller.device_name().unwrap(), "TXT sim");
    assert_eq!(rig.controller.firmware_version().unwrap(), "4.1.5");
}

#[test]
fn test_session_cycles_until_stopped() {
    let mut rig = rig(TransportKind::Tcp);
    start(&mut rig);
    cycles(&rig, 3);
    assert_eq!(rig.controller.loop_state(), LoopState::Running);
    assert!(rig.sim.lock().exchanges() >= 4);

    rig.controller.stop_online().unwrap();
    assert_eq!(rig.controller.loop_state(), LoopState::Stopped);
    assert!(matches!(
        rig.controller.wait_for_next_cycle(POLL),
        Err(Error::Stopped)
    ));
}

/// Keep-alive short enough to fire several times within [`OUTLIVE`]
const FAST_KEEP_ALIVE_MS: u64 = 50;
const OUTLIVE: Duration = Duration::from_millis(400);

fn fast_keep_alive_rig(options: ControllerOptions) -> SimRig {
    let mut config = config(TransportKind::Tcp, 1);
    config.exchange.keep_alive_ms = FAST_KEEP_ALIVE_MS;
    rig_with_config(config, options)
}

#[test]
fn test_short_response_stops_loop_and_reports_once() {
    let (on_error, calls) = counting_callback(true);
    let options = ControllerOptions {
        on_error,
        on_data: None,
    };
    let mut rig = fast_keep_alive_rig(options);
    rig.sim.lock().set_truncate(Some(40));

    rig.controller.start_online().unwrap();
    assert!(matches!(
        rig.controller.wait_for_next_cycle(POLL),
        Err(Error::Stopped)
    ));
    rig.link.close();
    // Long past the keep-alive limit: nothing may report a second time
    thread::sleep(OUTLIVE);

    assert_eq!(rig.controller.loop_state(), LoopState::Stopped);
    assert!(!rig.controller.is_online());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_closed_link_reports_once_and_keep_alive_stays_quiet() {
    let (on_error, calls) = counting_callback(false);
    let options = ControllerOptions {
        on_error,
        on_data: None,
    };
    let mut rig = fast_keep_alive_rig(options);
    start(&mut rig);
    cycles(&rig, 1);

    rig.link.close();
    let writes = rig.link.write_count();
    thread::sleep(OUTLIVE);

    assert_eq!(rig.controller.loop_state(), LoopState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // At most the one failing exchange write, no status queries after it
    assert!(rig.link.write_count() <= writes + 1);
}

#[test]
fn test_truncated_ir_tolerated_once() {
    let (on_error, calls) = counting_callback(false);
    let options = ControllerOptions {
        on_error,
        on_data: None,
    };
    let mut rig = rig_with(TransportKind::Tcp, 1, options);
    // Everything up to the IR block arrives
    rig.sim.lock().set_truncate(Some(58));

    rig.controller.start_online().unwrap();
    assert!(matches!(
        rig.controller.wait_for_next_cycle(POLL),
        Ok(()) | Err(Error::Stopped)
    ));
    assert!(matches!(
        rig.controller.wait_for_next_cycle(POLL),
        Err(Error::Stopped)
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rejected_config_stops_loop() {
    let (on_error, calls) = counting_callback(true);
    let options = ControllerOptions {
        on_error,
        on_data: None,
    };
    let mut rig = rig_with(TransportKind::Tcp, 1, options);
    rig.sim.lock().set_reject_config(true);

    rig.controller.start_online().unwrap();
    assert!(matches!(
        rig.controller.wait_for_next_cycle(POLL),
        Err(Error::Stopped)
    ));
    assert_eq!(rig.controller.loop_state(), LoopState::Stopped);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(rig.sim.lock().exchanges(), 0);
}

#[test]
fn test_restart_after_error() {
    let (on_error, _calls) = counting_callback(false);
    let options = ControllerOptions {
        on_error,
        on_data: None,
    };
    let mut rig = rig_with(TransportKind::Tcp, 1, options);
    rig.sim.lock().set_truncate(Some(10));
    rig.controller.start_online().unwrap();
    assert!(rig.controller.wait_for_next_cycle(POLL).is_err());

    rig.sim.lock().set_truncate(None);
    start(&mut rig);
    assert!(rig.controller.is_online());
    cycles(&rig, 2);
    rig.controller.stop_online().unwrap();
}

#[test]
fn test_data_callback_sees_merged_inputs() {
    use std::sync::atomic::AtomicI32;
    use std::sync::Arc;
    use txt_io::core::SharedState;

    let seen = Arc::new(AtomicI32::new(0));
    let sink = Arc::clone(&seen);
    let options = ControllerOptions {
        on_data: Some(Arc::new(move |shared: &SharedState| {
            let v = shared.read(|s| s.master().current_input[5]);
            sink.store(v as i32, Ordering::SeqCst);
        })),
        ..ControllerOptions::default()
    };
    let mut rig = rig_with(TransportKind::Tcp, 1, options);
    rig.sim.lock().set_input(0, 5, 4321);
    start(&mut rig);
    cycles(&rig, 1);
    assert_eq!(seen.load(Ordering::SeqCst), 4321);
}

#[test]
fn test_remote_control_over_socket() {
    let mut rig = rig(TransportKind::Tcp);
    let mut ir = [0u8; 26];
    ir[0] = (-40i8) as u8; // left x
    ir[3] = 25; // right y
    ir[4] = 1 | (2 << 2); // ON pressed, DIP 2
    ir[15..20].copy_from_slice(&[10, 0, 0, 0, 1 | (2 << 2)]);
    rig.sim.lock().set_ir(ir);
    start(&mut rig);
    cycles(&rig, 1);

    use txt_io::handles::{Button, Stick};
    let any = rig.controller.joystick(Stick::Left, 0).unwrap();
    assert_eq!(any.left_right(), -40);
    assert_eq!(rig.controller.joystick(Stick::Right, 0).unwrap().up_down(), 25);
    assert_eq!(rig.controller.joystick(Stick::Left, 3).unwrap().left_right(), 10);
    assert!(rig.controller.joy_button(Button::On, 0).unwrap().pressed());
    assert!(!rig.controller.joy_button(Button::Off, 0).unwrap().pressed());
    assert_eq!(rig.controller.joy_dip_switch().setting(), 2);
    assert!(rig.controller.joystick(Stick::Left, 5).is_err());
}
