//! Shared helpers: a controller wired to an in-process simulator
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use txt_io::controller::{Controller, ControllerOptions};
use txt_io::exchange::ErrorCallback;
use txt_io::sim::{DeviceSimulator, SimHandle};
use txt_io::transport::{Connector, MockTransport, Transport};
use txt_io::{Config, Error, TransportKind};

/// Poll slice for cycle waits
pub const POLL: Duration = Duration::from_millis(50);

pub fn config(kind: TransportKind, units: usize) -> Config {
    let mut config = Config::default();
    config.connection.transport = kind;
    config.exchange.extension_units = units;
    config.exchange.update_interval_ms = 1;
    config.exchange.keep_alive_ms = 500;
    config
}

/// Error callback that counts its calls and answers `verdict`
pub fn counting_callback(verdict: bool) -> (ErrorCallback, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let callback: ErrorCallback = Arc::new(move |message: &str, error: Option<&Error>| {
        log::debug!("callback: {} ({:?})", message, error);
        counter.fetch_add(1, Ordering::SeqCst);
        verdict
    });
    (callback, calls)
}

pub struct SimRig {
    pub sim: SimHandle,
    /// Another handle on the link the controller talks over
    pub link: MockTransport,
    pub controller: Controller,
}

pub fn rig_with_config(config: Config, options: ControllerOptions) -> SimRig {
    let (sim, mock) = DeviceSimulator::new().into_transport();
    let link = mock.clone();
    let connector: Connector = Box::new(move || Ok(Box::new(mock.clone()) as Box<dyn Transport>));
    let controller =
        Controller::with_connector(config, connector, None, options).expect("controller");
    SimRig {
        sim,
        link,
        controller,
    }
}

pub fn rig_with(kind: TransportKind, units: usize, options: ControllerOptions) -> SimRig {
    rig_with_config(config(kind, units), options)
}

pub fn rig(kind: TransportKind) -> SimRig {
    rig_with(kind, 1, ControllerOptions::default())
}

/// Start the session and wait until the first cycle merged
pub fn start(rig: &mut SimRig) {
    rig.controller.start_online().expect("start online");
    rig.controller.wait_for_next_cycle(POLL).expect("first cycle");
}

/// Let `n` full cycles pass
pub fn cycles(rig: &SimRig, n: usize) {
    for _ in 0..n {
        rig.controller.wait_for_next_cycle(POLL).expect("cycle");
    }
}
