//! Device state model
//!
//! One [`UnitState`] per controller on the bus (master first). Output fields
//! are written by the application and read by the exchange loop; `current_*`
//! fields are written only by the exchange loop.

use super::types::IoConfig;
use crate::constants::{NUM_COUNTERS, NUM_INPUTS, NUM_MOTORS, NUM_OUTPUTS, NUM_REMOTE_SLOTS};
use serde::Serialize;

/// Axes and buttons of one IR remote slot
///
/// Axes range -15..=15 on the serial link and -100..=100 over the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoteState {
    pub left_x: i8,
    pub left_y: i8,
    pub right_x: i8,
    pub right_y: i8,
    /// bit 0 = ON, bit 1 = OFF
    pub buttons: u8,
    /// DIP switch setting 0-3
    pub dip: u8,
}

/// All I/O fields of one unit
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitState {
    // Outputs (application -> device)
    /// Duty 0-512 per output
    pub pwm: [i16; NUM_OUTPUTS],
    /// 0 = none, 1-4 = synchronized to motor N, 5-8 = error injection onto motor N-4
    pub motor_sync: [i16; NUM_MOTORS],
    /// Target counter distance, 0 = no distance stop
    pub motor_distance: [u16; NUM_MOTORS],
    pub motor_cmd_id: [u8; NUM_MOTORS],
    pub counter_cmd_id: [u8; NUM_COUNTERS],
    pub sound_index: u16,
    pub sound_repeat: u16,
    pub sound_cmd_id: u8,

    // Inputs (device -> application)
    pub current_input: [i16; NUM_INPUTS],
    /// 1 if the counter changed since the previous exchange
    pub current_counter: [i16; NUM_COUNTERS],
    pub current_counter_value: [u16; NUM_COUNTERS],
    pub current_counter_cmd_id: [u8; NUM_COUNTERS],
    pub current_motor_cmd_id: [u8; NUM_MOTORS],
    pub current_sound_cmd_id: u8,
    pub remotes: [RemoteState; NUM_REMOTE_SLOTS],

    // Telemetry, serial link only
    pub power: u16,
    pub temperature: u16,
    pub reference_power: u16,
    pub extension_power: u16,

    pub io_config: IoConfig,
}

/// State of every unit plus the config generation counter
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub units: Vec<UnitState>,
    /// Bumped whenever any unit's `io_config` must be pushed again
    pub config_generation: u32,
}

impl DeviceState {
    pub fn new(unit_count: usize) -> Self {
        Self {
            units: vec![UnitState::default(); unit_count.max(1)],
            config_generation: 0,
        }
    }

    pub fn master(&self) -> &UnitState {
        &self.units[0]
    }

    pub fn master_mut(&mut self) -> &mut UnitState {
        &mut self.units[0]
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(1)
    }
}
