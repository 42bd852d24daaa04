//! I/O configuration types.
//!
//! The device needs to know how each input is wired before its readings mean
//! anything. [`IoConfig`] holds that per unit; pushing it to the device is the
//! exchange loop's job, triggered by a bump of the config generation.

use crate::constants::{NUM_COUNTERS, NUM_INPUTS, NUM_MOTORS};
use serde::{Deserialize, Serialize};

/// Input sensing mode as encoded in the socket configuration frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum InputMode {
    /// Voltage measurement (0-10 V)
    Voltage = 0,
    /// 5k pull-up: switches when digital, resistance when analog
    Resistor = 1,
    /// Ultrasonic distance sensor
    Ultrasonic = 3,
}

/// Mode + digital flag for one input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    pub mode: InputMode,
    pub digital: bool,
}

impl InputConfig {
    /// Push button / reed contact
    pub const fn switch() -> Self {
        Self {
            mode: InputMode::Resistor,
            digital: true,
        }
    }

    /// Photo resistor, NTC
    pub const fn resistor() -> Self {
        Self {
            mode: InputMode::Resistor,
            digital: false,
        }
    }

    /// Analog voltage (also the color sensor)
    pub const fn voltage() -> Self {
        Self {
            mode: InputMode::Voltage,
            digital: false,
        }
    }

    /// Digital voltage threshold (trail follower)
    pub const fn digital_voltage() -> Self {
        Self {
            mode: InputMode::Voltage,
            digital: true,
        }
    }

    pub const fn ultrasonic() -> Self {
        Self {
            mode: InputMode::Ultrasonic,
            digital: false,
        }
    }

    /// Mode nibble understood by the motor shield on the serial link.
    ///
    /// Combinations the shield has no code for fall back to analog voltage.
    pub fn direct_mode(&self) -> u8 {
        match (self.mode, self.digital) {
            (InputMode::Voltage, true) => 0,
            (InputMode::Resistor, true) => 1,
            (InputMode::Voltage, false) => 2,
            (InputMode::Resistor, false) => 3,
            (InputMode::Ultrasonic, _) => 4,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self::switch()
    }
}

/// How an output pair is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum OutputMode {
    /// Two independent single-ended outputs (lamps)
    Output = 0,
    /// One bidirectional motor
    #[default]
    Motor = 1,
}

/// Per-unit I/O configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoConfig {
    pub motors: [OutputMode; NUM_MOTORS],
    pub inputs: [InputConfig; NUM_INPUTS],
    /// Counter modes (1 = normal)
    pub counters: [u8; NUM_COUNTERS],
    /// Reserved motor parameters, sent verbatim
    pub motor_config: [i16; 16],
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            motors: [OutputMode::Motor; NUM_MOTORS],
            inputs: [InputConfig::switch(); NUM_INPUTS],
            counters: [1; NUM_COUNTERS],
            motor_config: [0; 16],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_mode_mapping() {
        assert_eq!(InputConfig::switch().direct_mode(), 1);
        assert_eq!(InputConfig::digital_voltage().direct_mode(), 0);
        assert_eq!(InputConfig::resistor().direct_mode(), 3);
        assert_eq!(InputConfig::voltage().direct_mode(), 2);
        assert_eq!(InputConfig::ultrasonic().direct_mode(), 4);
        let digital_us = InputConfig {
            mode: InputMode::Ultrasonic,
            digital: true,
        };
        assert_eq!(digital_us.direct_mode(), 4);
    }

    #[test]
    fn test_default_io_config() {
        let cfg = IoConfig::default();
        assert!(cfg.motors.iter().all(|m| *m == OutputMode::Motor));
        assert!(cfg.inputs.iter().all(|i| *i == InputConfig::switch()));
        assert_eq!(cfg.counters, [1; 4]);
    }
}
