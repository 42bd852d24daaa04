//! Core data model shared by the exchange loop and the channel handles.
//!
//! - [`state`]: per-unit output and input fields
//! - [`shared::SharedState`]: the lock around them plus cycle signalling
//! - [`sequencer`]: command-id bump / acknowledge
//! - [`types`]: I/O configuration

pub mod sequencer;
pub mod shared;
pub mod state;
pub mod types;

pub use sequencer::CmdId;
pub use shared::{SharedState, SyncScope};
pub use state::{DeviceState, RemoteState, UnitState};
pub use types::{InputConfig, InputMode, IoConfig, OutputMode};
