//! txt-io - Exchange daemon for the TXT robotics controller
//!
//! Connects with the transport named in the configuration, starts the online
//! session and logs a JSON snapshot of the device state once per second
//! until Ctrl-C.
//!
//! ```text
//! txt-io [config.toml]          real device
//! txt-io --simulate [config]    in-process simulator, no hardware
//! ```

use crossbeam_channel::{bounded, RecvTimeoutError};
use std::env;
use std::path::Path;
use std::time::Duration;
use txt_io::controller::{Controller, ControllerOptions};
use txt_io::error::{Error, Result};
use txt_io::transport::{Connector, Transport};
use txt_io::{Config, DeviceSimulator};

const DEFAULT_CONFIG_PATH: &str = "/etc/txt-io.toml";
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

struct Args {
    config_path: String,
    simulate: bool,
}

/// Parse command line arguments.
///
/// Supports `txt-io <path>`, `txt-io --config <path>` / `-c <path>`, and
/// `--simulate`. Defaults to `/etc/txt-io.toml`; a missing default file
/// falls back to built-in defaults.
fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = None;
    let mut simulate = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--simulate" | "-s" => simulate = true,
            "--config" | "-c" if i + 1 < args.len() => {
                config_path = Some(args[i + 1].clone());
                i += 1;
            }
            other if !other.starts_with('-') && config_path.is_none() => {
                config_path = Some(other.to_string());
            }
            other => eprintln!("Ignoring unknown argument: {}", other),
        }
        i += 1;
    }

    Args {
        config_path: config_path.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
        simulate,
    }
}

fn load_config(path: &str) -> Result<Config> {
    if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
        return Ok(Config::default());
    }
    Config::load(path)
}

fn build_controller(config: Config, simulate: bool) -> Result<Controller> {
    if !simulate {
        return Controller::connect(config, ControllerOptions::default());
    }
    let (_sim, mock) = DeviceSimulator::new().into_transport();
    let connector: Connector = Box::new(move || Ok(Box::new(mock.clone()) as Box<dyn Transport>));
    Controller::with_connector(config, connector, None, ControllerOptions::default())
}

fn main() -> Result<()> {
    let args = parse_args();
    let config = load_config(&args.config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("txt-io v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", args.config_path);
    log::info!(
        "Transport: {:?} ({})",
        config.connection.transport,
        if args.simulate {
            "simulated".to_string()
        } else {
            config.connection.address()
        }
    );

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        let _ = shutdown_tx.try_send(());
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut controller = build_controller(config, args.simulate)?;
    let status = controller.query_status()?;
    log::info!(
        "Device: {} firmware {}",
        status.name,
        status.firmware().unwrap_or_else(|| format!("{:#x}", status.version))
    );

    controller.start_online()?;
    log::info!("txt-io running. Press Ctrl-C to stop.");

    loop {
        match shutdown_rx.recv_timeout(REPORT_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if !controller.is_online() {
            log::error!("Exchange loop stopped ({:?})", controller.loop_state());
            break;
        }
        let snapshot = controller.shared().snapshot();
        match serde_json::to_string(&snapshot.units) {
            Ok(json) => log::info!(
                "cycle {}: {}",
                controller.shared().cycle_count(),
                json
            ),
            Err(e) => log::warn!("Failed to serialize state: {}", e),
        }
    }

    log::info!("Shutting down...");
    controller.stop_online()?;
    log::info!("txt-io stopped");
    Ok(())
}
