//! txt-io - Client-side driver for the TXT robotics controller
//!
//! The core is a data-exchange engine: a background loop that packs the
//! current outputs (PWM levels, motor sync/distance targets, command ids)
//! into a fixed binary frame, sends it over the selected transport, and
//! merges the response into a shared state that application threads read
//! and write concurrently.
//!
//! ## Layers
//!
//! - [`protocol`] and [`delta`]: frame codecs and the delta compressor
//! - [`transport`]: TCP, serial and mock byte transports
//! - [`core`]: device state, synchronized updates, command sequencer
//! - [`exchange`]: exchange loop and keep-alive task
//! - [`controller`]: session lifecycle, status, configuration, camera
//! - [`handles`]: per-channel motor, output, sensor and remote handles
//! - [`sim`]: in-process device simulator for hardware-free testing

pub mod camera;
pub mod config;
pub mod constants;
pub mod controller;
pub mod core;
pub mod delta;
pub mod error;
pub mod exchange;
pub mod handles;
pub mod protocol;
pub mod sim;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, TransportKind};
pub use controller::{Controller, ControllerOptions};
pub use error::{Error, Result};
pub use exchange::LoopState;
pub use sim::DeviceSimulator;
