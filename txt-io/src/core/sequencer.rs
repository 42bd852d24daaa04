//! Command-id handshakes
//!
//! The device has no per-command replies. Instead every command that needs
//! completion tracking carries a small wrapping counter; the caller bumps it
//! once per logical command and the device echoes the value back once the
//! command has been applied (distance reached, counter reset, sound done).
//!
//! ```text
//! caller:  motor_cmd_id  0 -> 1          (bump)
//! device:  current_motor_cmd_id 0 ... 0 -> 1   (echo)
//!          acknowledged when both are equal
//! ```
//!
//! Motor and counter ids are 3 bits wide, the sound id is 4 bits wide.
//! Wraparound is the normal case. Speed changes need no bump; they are sent
//! every cycle.

use super::state::UnitState;
use crate::constants::{
    COUNTER_CMD_ID_BITS, MOTOR_CMD_ID_BITS, NUM_COUNTERS, NUM_MOTORS, SOUND_CMD_ID_BITS,
};
use crate::error::{Error, Result};

/// A command-id slot of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdId {
    /// Motor index 0-3
    Motor(usize),
    /// Counter index 0-3
    Counter(usize),
    Sound,
}

impl CmdId {
    /// Width of the counter in bits
    pub fn bits(self) -> u32 {
        match self {
            CmdId::Motor(_) => MOTOR_CMD_ID_BITS,
            CmdId::Counter(_) => COUNTER_CMD_ID_BITS,
            CmdId::Sound => SOUND_CMD_ID_BITS,
        }
    }

    fn validate(self) -> Result<Self> {
        match self {
            CmdId::Motor(i) if i >= NUM_MOTORS => Err(Error::out_of_range("motor", i, NUM_MOTORS)),
            CmdId::Counter(i) if i >= NUM_COUNTERS => {
                Err(Error::out_of_range("counter", i, NUM_COUNTERS))
            }
            _ => Ok(self),
        }
    }
}

/// Truncate to a `bits`-wide counter
#[inline]
pub fn mask_id(value: u8, bits: u32) -> u8 {
    value & ((1u16 << bits) - 1) as u8
}

/// Next value of a `bits`-wide wrapping counter
#[inline]
pub fn next_id(value: u8, bits: u32) -> u8 {
    mask_id(value.wrapping_add(1), bits)
}

impl UnitState {
    fn cmd_id_slot(&mut self, id: CmdId) -> &mut u8 {
        match id {
            CmdId::Motor(i) => &mut self.motor_cmd_id[i],
            CmdId::Counter(i) => &mut self.counter_cmd_id[i],
            CmdId::Sound => &mut self.sound_cmd_id,
        }
    }

    /// Locally held id
    pub fn cmd_id(&self, id: CmdId) -> Result<u8> {
        Ok(match id.validate()? {
            CmdId::Motor(i) => self.motor_cmd_id[i],
            CmdId::Counter(i) => self.counter_cmd_id[i],
            CmdId::Sound => self.sound_cmd_id,
        })
    }

    /// Id last echoed by the device
    pub fn echoed_cmd_id(&self, id: CmdId) -> Result<u8> {
        Ok(match id.validate()? {
            CmdId::Motor(i) => self.current_motor_cmd_id[i],
            CmdId::Counter(i) => self.current_counter_cmd_id[i],
            CmdId::Sound => self.current_sound_cmd_id,
        })
    }

    /// Advance a command id, returning the new value
    pub fn bump(&mut self, id: CmdId) -> Result<u8> {
        let id = id.validate()?;
        let bits = id.bits();
        let slot = self.cmd_id_slot(id);
        *slot = next_id(*slot, bits);
        Ok(*slot)
    }

    /// True once the device echo equals the local id
    pub fn is_acknowledged(&self, id: CmdId) -> Result<bool> {
        Ok(self.cmd_id(id)? == self.echoed_cmd_id(id)?)
    }
}
