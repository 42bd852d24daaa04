//! Per-channel handles
//!
//! Lightweight views onto [`SharedState`]: each handle holds the shared
//! state, a unit index and a channel index, validated once on creation.
//! Output handles write fields, input handles read `current_*` fields and
//! interpret them according to their [`SensorKind`].
//!
//! Creating a motor, output or sensor handle rewrites that channel's I/O
//! configuration and bumps the config generation so the exchange loop
//! pushes it before the next cycle.

use crate::constants::{
    NUM_INPUTS, NUM_MOTORS, NUM_OUTPUTS, NUM_REMOTE_SLOTS, PWM_MAX, SYNC_INJECT_OFFSET,
    SYNC_NONE,
};
use crate::core::{CmdId, InputConfig, OutputMode, RemoteState, SharedState, UnitState};
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

fn check_unit(shared: &SharedState, unit: usize) -> Result<()> {
    let count = shared.unit_count();
    if unit >= count {
        return Err(Error::out_of_range("unit", unit, count));
    }
    Ok(())
}

fn check_channel(kind: &'static str, index: usize, limit: usize) -> Result<()> {
    if index >= limit {
        return Err(Error::out_of_range(kind, index, limit));
    }
    Ok(())
}

/// Channel indices are validated on creation, so direct indexing is safe
fn unit_ref<R>(shared: &SharedState, unit: usize, f: impl FnOnce(&UnitState) -> R) -> R {
    shared.read(|s| f(&s.units[unit]))
}

fn unit_mut<R>(shared: &SharedState, unit: usize, f: impl FnOnce(&mut UnitState) -> R) -> R {
    shared.write(|s| f(&mut s.units[unit]))
}

// ============================================================================
// Motors and outputs
// ============================================================================

/// Motor on an output pair (M1-M4 = index 0-3)
#[derive(Clone)]
pub struct Motor {
    shared: Arc<SharedState>,
    unit: usize,
    channel: usize,
}

impl Motor {
    /// Configure the output pair as motor and return its handle
    ///
    /// Also issues a "run freely" command (distance 0, no sync) with a fresh
    /// cmd-id, so any distance left over on the device is cancelled.
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        check_unit(&shared, unit)?;
        check_channel("motor", channel, NUM_MOTORS)?;
        let motor = Self {
            shared,
            unit,
            channel,
        };
        {
            let _scope = motor.shared.begin_sync();
            unit_mut(&motor.shared, unit, |u| {
                u.io_config.motors[channel] = OutputMode::Motor;
                u.pwm[2 * channel] = 0;
                u.pwm[2 * channel + 1] = 0;
                u.motor_distance[channel] = 0;
                u.motor_sync[channel] = SYNC_NONE;
                u.bump(CmdId::Motor(channel))
            })?;
            motor.shared.bump_config_generation();
        }
        Ok(motor)
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Speed -512..=512; the sign selects the direction.
    ///
    /// Takes effect on the next cycle, no cmd-id involved.
    pub fn set_speed(&self, speed: i16) {
        let speed = speed.clamp(-PWM_MAX, PWM_MAX);
        let ch = self.channel;
        unit_mut(&self.shared, self.unit, |u| {
            if speed > 0 {
                u.pwm[2 * ch] = speed;
                u.pwm[2 * ch + 1] = 0;
            } else {
                u.pwm[2 * ch] = 0;
                u.pwm[2 * ch + 1] = -speed;
            }
        });
    }

    /// Stop after `distance` counter ticks (0 = run freely).
    ///
    /// With `sync_to`, both motors get the same distance, each is synced to
    /// the other, and both cmd-ids are bumped once, all in one synchronized
    /// update.
    pub fn set_distance(&self, distance: u16, sync_to: Option<&Motor>) -> Result<()> {
        let Some(other) = sync_to else {
            return self.set_distance_with_sync(distance, SYNC_NONE);
        };
        if other.unit != self.unit || other.channel == self.channel {
            return Err(Error::NotSupported(format!(
                "motor {} of unit {} cannot sync to motor {} of unit {}",
                self.channel, self.unit, other.channel, other.unit
            )));
        }

        let (a, b) = (self.channel, other.channel);
        unit_mut(&self.shared, self.unit, |u| -> Result<()> {
            u.motor_distance[a] = distance;
            u.motor_distance[b] = distance;
            u.motor_sync[a] = b as i16 + 1;
            u.motor_sync[b] = a as i16 + 1;
            u.bump(CmdId::Motor(a))?;
            u.bump(CmdId::Motor(b))?;
            Ok(())
        })
    }

    /// Distance with a raw sync value: 0 none, 1-4 synced to motor N,
    /// 5-8 error injection onto motor N-4.
    ///
    /// Error injection disables the device's distance stop for this motor:
    /// the command is never acknowledged and [`Motor::finished`] stays false.
    pub fn set_distance_with_sync(&self, distance: u16, sync: i16) -> Result<()> {
        if !(0..=2 * SYNC_INJECT_OFFSET).contains(&sync) {
            return Err(Error::out_of_range(
                "sync",
                sync.max(0) as usize,
                2 * SYNC_INJECT_OFFSET as usize + 1,
            ));
        }
        let ch = self.channel;
        unit_mut(&self.shared, self.unit, |u| {
            u.motor_distance[ch] = distance;
            u.motor_sync[ch] = sync;
            u.bump(CmdId::Motor(ch)).map(|_| ())
        })
    }

    /// The device has acknowledged the last distance/sync command
    pub fn finished(&self) -> bool {
        unit_ref(&self.shared, self.unit, |u| {
            u.is_acknowledged(CmdId::Motor(self.channel))
                .unwrap_or(false)
        })
    }

    /// Block until [`Motor::finished`], re-checking after every cycle
    pub fn wait_finished(&self, min_poll: Duration) -> Result<()> {
        while !self.finished() {
            self.shared.wait_for_next_cycle(min_poll)?;
        }
        Ok(())
    }

    /// Counter ticks since the last distance command
    pub fn current_distance(&self) -> u16 {
        unit_ref(&self.shared, self.unit, |u| {
            u.current_counter_value[self.channel]
        })
    }

    /// Speed 0 and distance 0, as one update
    pub fn stop(&self) -> Result<()> {
        let _scope = self.shared.begin_sync();
        self.set_speed(0);
        self.set_distance(0, None)
    }
}

/// Single-ended output (O1-O8 = index 0-7), e.g. a lamp
#[derive(Clone)]
pub struct Output {
    shared: Arc<SharedState>,
    unit: usize,
    channel: usize,
}

impl Output {
    /// Configure the containing pair as outputs and return the handle
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        check_unit(&shared, unit)?;
        check_channel("output", channel, NUM_OUTPUTS)?;
        {
            let _scope = shared.begin_sync();
            unit_mut(&shared, unit, |u| {
                u.io_config.motors[channel / 2] = OutputMode::Output;
            });
            shared.bump_config_generation();
        }
        Ok(Self {
            shared,
            unit,
            channel,
        })
    }

    /// Duty 0-512
    pub fn set_level(&self, level: i16) {
        let level = level.clamp(0, PWM_MAX);
        unit_mut(&self.shared, self.unit, |u| u.pwm[self.channel] = level);
    }

    pub fn level(&self) -> i16 {
        unit_ref(&self.shared, self.unit, |u| u.pwm[self.channel])
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// What is wired to an input; fixes its configuration and interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Switch,
    Resistor,
    Ultrasonic,
    Voltage,
    ColorSensor,
    TrailFollower,
}

impl SensorKind {
    pub fn input_config(self) -> InputConfig {
        match self {
            SensorKind::Switch => InputConfig::switch(),
            SensorKind::Resistor => InputConfig::resistor(),
            SensorKind::Ultrasonic => InputConfig::ultrasonic(),
            SensorKind::Voltage | SensorKind::ColorSensor => InputConfig::voltage(),
            SensorKind::TrailFollower => InputConfig::digital_voltage(),
        }
    }
}

/// An input channel (I1-I8 = index 0-7) configured for one sensor kind
#[derive(Clone)]
pub struct InputChannel {
    shared: Arc<SharedState>,
    unit: usize,
    channel: usize,
    kind: SensorKind,
}

impl InputChannel {
    pub fn attach(
        shared: Arc<SharedState>,
        unit: usize,
        channel: usize,
        kind: SensorKind,
    ) -> Result<Self> {
        check_unit(&shared, unit)?;
        check_channel("input", channel, NUM_INPUTS)?;
        {
            let _scope = shared.begin_sync();
            unit_mut(&shared, unit, |u| {
                u.io_config.inputs[channel] = kind.input_config();
            });
            shared.bump_config_generation();
        }
        Ok(Self {
            shared,
            unit,
            channel,
            kind,
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Last reading as received
    pub fn raw(&self) -> i16 {
        unit_ref(&self.shared, self.unit, |u| u.current_input[self.channel])
    }
}

/// Push button, reed contact: 1 open, 0 closed to ground
#[derive(Clone)]
pub struct Input(InputChannel);

impl Input {
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        InputChannel::attach(shared, unit, channel, SensorKind::Switch).map(Self)
    }

    pub fn state(&self) -> i16 {
        self.0.raw()
    }
}

/// Resistance in ohms (saturates around 15 kOhm)
#[derive(Clone)]
pub struct Resistor(InputChannel);

impl Resistor {
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        InputChannel::attach(shared, unit, channel, SensorKind::Resistor).map(Self)
    }

    pub fn value(&self) -> i16 {
        self.0.raw()
    }

    /// Temperature of the standard NTC in degrees Celsius; 10000 when the
    /// reading is 0.
    pub fn ntc_temperature(&self) -> f64 {
        ntc_temperature(self.value())
    }
}

/// Quadratic fit of ln(R) for the kit's NTC
pub fn ntc_temperature(resistance: i16) -> f64 {
    if resistance == 0 {
        return 10000.0;
    }
    let x = f64::from(resistance).ln();
    x * x * 1.393_235_22 - x * 43.941_740_5 + 271.870_481
}

/// Ultrasonic distance sensor, centimetres
#[derive(Clone)]
pub struct Ultrasonic(InputChannel);

impl Ultrasonic {
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        InputChannel::attach(shared, unit, channel, SensorKind::Ultrasonic).map(Self)
    }

    pub fn distance(&self) -> i16 {
        self.0.raw()
    }
}

/// Voltage in millivolts (5 mV - 10 V)
#[derive(Clone)]
pub struct Voltage(InputChannel);

impl Voltage {
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        InputChannel::attach(shared, unit, channel, SensorKind::Voltage).map(Self)
    }

    pub fn voltage(&self) -> i16 {
        self.0.raw()
    }
}

/// Surface colour seen by the colour sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Red,
    Blue,
}

impl Color {
    /// Classify a colour sensor voltage (mV)
    pub fn from_millivolts(mv: i16) -> Self {
        if mv < 200 {
            Color::White
        } else if mv < 1000 {
            Color::Red
        } else {
            Color::Blue
        }
    }
}

/// Colour sensor: a photo transistor read as voltage
#[derive(Clone)]
pub struct ColorSensor(InputChannel);

impl ColorSensor {
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        InputChannel::attach(shared, unit, channel, SensorKind::ColorSensor).map(Self)
    }

    pub fn value(&self) -> i16 {
        self.0.raw()
    }

    pub fn color(&self) -> Color {
        Color::from_millivolts(self.value())
    }
}

/// Trail follower: 1 on white, 0 on black
#[derive(Clone)]
pub struct TrailFollower(InputChannel);

/// Millivolts above which an analog trail reading counts as white
const TRAIL_THRESHOLD_MV: i16 = 600;

impl TrailFollower {
    pub fn attach(shared: Arc<SharedState>, unit: usize, channel: usize) -> Result<Self> {
        InputChannel::attach(shared, unit, channel, SensorKind::TrailFollower).map(Self)
    }

    /// The shield reports a digital 1 itself; the socket link may deliver
    /// millivolts instead.
    pub fn state(&self) -> u8 {
        let v = self.0.raw();
        (v == 1 || v > TRAIL_THRESHOLD_MV) as u8
    }
}

// ============================================================================
// IR remote
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    /// Left button
    On,
    /// Right button
    Off,
}

fn remote(shared: &SharedState, slot: usize) -> RemoteState {
    shared.read(|s| s.master().remotes[slot])
}

/// Joystick of an IR remote; slot 0 = any remote, 1-4 by DIP setting
#[derive(Clone)]
pub struct Joystick {
    shared: Arc<SharedState>,
    stick: Stick,
    slot: usize,
}

impl Joystick {
    pub fn attach(shared: Arc<SharedState>, stick: Stick, slot: usize) -> Result<Self> {
        check_channel("remote", slot, NUM_REMOTE_SLOTS)?;
        Ok(Self {
            shared,
            stick,
            slot,
        })
    }

    /// Horizontal axis, negative = left
    pub fn left_right(&self) -> i8 {
        let r = remote(&self.shared, self.slot);
        match self.stick {
            Stick::Left => r.left_x,
            Stick::Right => r.right_x,
        }
    }

    /// Vertical axis, negative = down
    pub fn up_down(&self) -> i8 {
        let r = remote(&self.shared, self.slot);
        match self.stick {
            Stick::Left => r.left_y,
            Stick::Right => r.right_y,
        }
    }
}

/// ON/OFF button of an IR remote
#[derive(Clone)]
pub struct JoyButton {
    shared: Arc<SharedState>,
    button: Button,
    slot: usize,
}

impl JoyButton {
    pub fn attach(shared: Arc<SharedState>, button: Button, slot: usize) -> Result<Self> {
        check_channel("remote", slot, NUM_REMOTE_SLOTS)?;
        Ok(Self {
            shared,
            button,
            slot,
        })
    }

    pub fn pressed(&self) -> bool {
        let buttons = remote(&self.shared, self.slot).buttons;
        match self.button {
            Button::On => buttons == 1,
            Button::Off => buttons >> 1 == 1,
        }
    }
}

/// DIP switch of the remote that sent last (0-3)
#[derive(Clone)]
pub struct JoyDipSwitch {
    shared: Arc<SharedState>,
}

impl JoyDipSwitch {
    pub fn attach(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    pub fn setting(&self) -> u8 {
        remote(&self.shared, 0).dip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> Arc<SharedState> {
        Arc::new(SharedState::new(1))
    }

    #[test]
    fn test_motor_speed_direction() {
        let s = shared();
        let m = Motor::attach(Arc::clone(&s), 0, 1).unwrap();
        m.set_speed(300);
        assert_eq!(s.read_unit(0, |u| (u.pwm[2], u.pwm[3])).unwrap(), (300, 0));
        m.set_speed(-700);
        assert_eq!(s.read_unit(0, |u| (u.pwm[2], u.pwm[3])).unwrap(), (0, 512));
    }

    #[test]
    fn test_set_distance_bumps_once() {
        let s = shared();
        let m = Motor::attach(Arc::clone(&s), 0, 0).unwrap();
        m.set_distance(100, None).unwrap();
        assert!(!m.finished());
        s.write_unit(0, |u| u.current_motor_cmd_id[0] = u.motor_cmd_id[0]).unwrap();
        assert!(m.finished());
        // One from attach, one from the distance command
        assert_eq!(s.read_unit(0, |u| u.motor_cmd_id[0]).unwrap(), 2);
    }

    #[test]
    fn test_attach_issues_run_freely_command() {
        let s = shared();
        s.write_unit(0, |u| {
            u.motor_distance[1] = 500;
            u.motor_sync[1] = 3;
        })
        .unwrap();
        let m = Motor::attach(Arc::clone(&s), 0, 1).unwrap();
        let (id, distance, sync) = s
            .read_unit(0, |u| (u.motor_cmd_id[1], u.motor_distance[1], u.motor_sync[1]))
            .unwrap();
        assert_eq!((id, distance, sync), (1, 0, SYNC_NONE));
        assert!(!m.finished());
        s.write_unit(0, |u| u.current_motor_cmd_id[1] = u.motor_cmd_id[1]).unwrap();
        assert!(m.finished());
    }

    #[test]
    fn test_error_injection_sync_range() {
        let s = shared();
        let m = Motor::attach(Arc::clone(&s), 0, 0).unwrap();
        m.set_distance_with_sync(50, 6).unwrap();
        assert_eq!(s.read_unit(0, |u| u.motor_sync[0]).unwrap(), 6);
        assert!(matches!(
            m.set_distance_with_sync(50, 9),
            Err(Error::ChannelOutOfRange { kind: "sync", .. })
        ));
    }

    #[test]
    fn test_motor_cannot_sync_to_itself() {
        let s = shared();
        let m = Motor::attach(Arc::clone(&s), 0, 2).unwrap();
        assert!(matches!(m.set_distance(10, Some(&m)), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_channels_validated() {
        let s = shared();
        assert!(Motor::attach(Arc::clone(&s), 0, 4).is_err());
        assert!(Motor::attach(Arc::clone(&s), 1, 0).is_err());
        assert!(Output::attach(Arc::clone(&s), 0, 8).is_err());
        assert!(Input::attach(Arc::clone(&s), 0, 8).is_err());
        assert!(Joystick::attach(Arc::clone(&s), Stick::Left, 5).is_err());
    }

    #[test]
    fn test_attach_updates_config() {
        let s = shared();
        let before = s.read(|st| st.config_generation);
        let _lamp = Output::attach(Arc::clone(&s), 0, 5).unwrap();
        let _ntc = Resistor::attach(Arc::clone(&s), 0, 3).unwrap();
        let (motors, input, generation) = s.read(|st| {
            let cfg = &st.master().io_config;
            (cfg.motors, cfg.inputs[3], st.config_generation)
        });
        assert_eq!(motors[2], OutputMode::Output);
        assert_eq!(input, InputConfig::resistor());
        assert_eq!(generation, before + 2);
    }

    #[test]
    fn test_output_level_clamped() {
        let s = shared();
        let lamp = Output::attach(Arc::clone(&s), 0, 6).unwrap();
        lamp.set_level(900);
        assert_eq!(lamp.level(), 512);
        lamp.set_level(-3);
        assert_eq!(lamp.level(), 0);
    }

    #[test]
    fn test_ntc_temperature() {
        assert_eq!(ntc_temperature(0), 10000.0);
        // About 25 degrees at 1.5 kOhm for the kit NTC
        let t = ntc_temperature(1500);
        assert!((t - 25.0).abs() < 3.0, "got {}", t);
    }

    #[test]
    fn test_color_thresholds() {
        assert_eq!(Color::from_millivolts(150), Color::White);
        assert_eq!(Color::from_millivolts(200), Color::Red);
        assert_eq!(Color::from_millivolts(999), Color::Red);
        assert_eq!(Color::from_millivolts(1000), Color::Blue);
    }

    #[test]
    fn test_trail_follower_digital_or_threshold() {
        let s = shared();
        let trail = TrailFollower::attach(Arc::clone(&s), 0, 0).unwrap();
        for (raw, expected) in [(0, 0), (1, 1), (600, 0), (601, 1)] {
            s.write_unit(0, |u| u.current_input[0] = raw).unwrap();
            assert_eq!(trail.state(), expected, "raw {}", raw);
        }
    }

    #[test]
    fn test_remote_buttons() {
        let s = shared();
        let on = JoyButton::attach(Arc::clone(&s), Button::On, 0).unwrap();
        let off = JoyButton::attach(Arc::clone(&s), Button::Off, 0).unwrap();
        s.write(|st| st.master_mut().remotes[0].buttons = 2);
        assert!(!on.pressed());
        assert!(off.pressed());
    }
}
