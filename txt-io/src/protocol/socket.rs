//! Plain TCP protocol frames
//!
//! Every request starts with a 32-bit command id; the device answers with the
//! matching acknowledgement id. All fields little-endian.
//!
//! # Exchange request (60 bytes)
//!
//! ```text
//! ┌────┬──────────┬─────────┬──────────┬───────────┬────────────┬───────────────────┬─────┐
//! │ id │ pwm 8×i16│sync 4×i16│dist 4×i16│motor id 4×│counter id 4│ sound id/idx/rep │ 2 rsv│
//! └────┴──────────┴─────────┴──────────┴───────────┴────────────┴───────────────────┴─────┘
//! ```
//!
//! # Exchange response (80 bytes)
//!
//! ```text
//! id, input 8×i16, counter flag 4×i16, counter value 4×i16,
//! counter id echo 4×i16, motor id echo 4×i16, sound id echo u16,  (54 bytes)
//! IR: 5 slots × {lx, ly, rx, ry: i8, buttons|dip<<2: u8} + 1 rsv    (26 bytes)
//! ```

use super::wire::{peek_id, Packer, Unpacker};
use crate::constants::*;
use crate::core::sequencer::mask_id;
use crate::core::{IoConfig, RemoteState, UnitState};
use crate::error::{Error, Result};

/// Answer to the status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Id found in the response; a mismatch is only advisory
    pub id: u32,
    pub name: String,
    pub version: u32,
}

impl StatusResponse {
    pub fn id_matches(&self) -> bool {
        self.id == ID_QUERY_STATUS_ACK
    }

    pub fn firmware(&self) -> Option<String> {
        firmware_string(self.version)
    }
}

/// Render a version number as `major.minor.patch` from its hex digits
///
/// `0x4010500` becomes `4.1.5`: first hex digit, then two pairs read as
/// decimal numbers.
pub fn firmware_string(version: u32) -> Option<String> {
    let hex = format!("{:x}", version);
    if hex.len() < 5 {
        return None;
    }
    let major: u32 = hex.get(0..1)?.parse().ok()?;
    let minor: u32 = hex.get(1..3)?.parse().ok()?;
    let patch: u32 = hex.get(3..5)?.parse().ok()?;
    Some(format!("{}.{}.{}", major, minor, patch))
}

pub fn encode_status_request() -> [u8; ACK_SIZE] {
    ID_QUERY_STATUS.to_le_bytes()
}

/// Decode a status response; only the length is enforced
pub fn decode_status(data: &[u8]) -> Result<StatusResponse> {
    if data.len() != STATUS_RESPONSE_SIZE {
        return Err(Error::ShortRead {
            expected: STATUS_RESPONSE_SIZE,
            actual: data.len(),
        });
    }
    let mut u = Unpacker::new(data);
    let id = u.u32();
    let raw_name = u.bytes(16);
    let name = String::from_utf8_lossy(raw_name)
        .trim_end_matches('\0')
        .to_string();
    let version = u.u32();
    Ok(StatusResponse { id, name, version })
}

pub fn encode_start_online() -> [u8; START_ONLINE_REQUEST_SIZE] {
    let mut p = Packer::<START_ONLINE_REQUEST_SIZE>::new();
    p.u32(ID_START_ONLINE).zeros(64);
    p.finish()
}

pub fn encode_stop_online() -> [u8; ACK_SIZE] {
    ID_STOP_ONLINE.to_le_bytes()
}

/// Check a 4-byte acknowledgement frame
pub fn check_ack(command: &'static str, expected: u32, data: &[u8]) -> Result<()> {
    if data.len() != ACK_SIZE {
        return Err(Error::ShortRead {
            expected: ACK_SIZE,
            actual: data.len(),
        });
    }
    let actual = peek_id(data).unwrap_or(0);
    if actual != expected {
        return Err(Error::ResponseMismatch {
            command,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Configuration frame for one unit
pub fn encode_config(
    config: &IoConfig,
    config_id: i16,
    extension_id: i16,
) -> [u8; CONFIG_REQUEST_SIZE] {
    let mut p = Packer::<CONFIG_REQUEST_SIZE>::new();
    p.u32(ID_UPDATE_CONFIG)
        .i16(config_id)
        .i16(extension_id)
        .u8(0) // program state request
        .u8(0) // old FtTransfer
        .zeros(2);
    for motor in &config.motors {
        p.u8(*motor as u8);
    }
    for input in &config.inputs {
        p.u8(input.mode as u8).u8(input.digital as u8).zeros(2);
    }
    for counter in &config.counters {
        p.u8(*counter).zeros(3);
    }
    for v in &config.motor_config {
        p.i16(*v);
    }
    p.finish()
}

/// Exchange request built from a unit's outputs
pub fn encode_exchange(unit: &UnitState) -> [u8; EXCHANGE_REQUEST_SIZE] {
    let mut p = Packer::<EXCHANGE_REQUEST_SIZE>::new();
    p.u32(ID_EXCHANGE_DATA);
    for v in &unit.pwm {
        p.i16(*v);
    }
    for v in &unit.motor_sync {
        p.i16(*v);
    }
    for v in &unit.motor_distance {
        p.u16(*v);
    }
    for v in &unit.motor_cmd_id {
        p.i16(*v as i16);
    }
    for v in &unit.counter_cmd_id {
        p.i16(*v as i16);
    }
    p.u16(unit.sound_cmd_id as u16)
        .u16(unit.sound_index)
        .u16(unit.sound_repeat)
        .zeros(2);
    p.finish()
}

/// Decoded exchange response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResponse {
    pub input: [i16; NUM_INPUTS],
    pub counter: [i16; NUM_COUNTERS],
    pub counter_value: [u16; NUM_COUNTERS],
    pub counter_cmd_id: [u8; NUM_COUNTERS],
    pub motor_cmd_id: [u8; NUM_MOTORS],
    pub sound_cmd_id: u8,
    /// Absent when the frame ended inside the IR block
    pub ir: Option<[u8; IR_BLOCK_SIZE]>,
}

/// Mask a device echo to the width of its local counter
fn echo_id(raw: i16, bits: u32) -> u8 {
    mask_id(raw as u8, bits)
}

/// Decode an exchange response.
///
/// A frame of full length decodes completely. A frame that stops inside the
/// IR block (core fields intact) decodes with `ir: None`; whether that is
/// acceptable is the caller's decision. Anything shorter or longer is a
/// [`Error::ShortRead`].
pub fn decode_exchange(data: &[u8]) -> Result<ExchangeResponse> {
    let len = data.len();
    if len < EXCHANGE_RESPONSE_CORE_SIZE || len > EXCHANGE_RESPONSE_SIZE {
        return Err(Error::ShortRead {
            expected: EXCHANGE_RESPONSE_SIZE,
            actual: len,
        });
    }
    let mut u = Unpacker::new(data);
    let id = u.u32();
    if id != ID_EXCHANGE_DATA_ACK {
        return Err(Error::ResponseMismatch {
            command: "exchange data",
            expected: ID_EXCHANGE_DATA_ACK,
            actual: id,
        });
    }

    let mut r = ExchangeResponse {
        input: [0; NUM_INPUTS],
        counter: [0; NUM_COUNTERS],
        counter_value: [0; NUM_COUNTERS],
        counter_cmd_id: [0; NUM_COUNTERS],
        motor_cmd_id: [0; NUM_MOTORS],
        sound_cmd_id: 0,
        ir: None,
    };
    for v in r.input.iter_mut() {
        *v = u.i16();
    }
    for v in r.counter.iter_mut() {
        *v = u.i16();
    }
    for v in r.counter_value.iter_mut() {
        *v = u.u16();
    }
    for v in r.counter_cmd_id.iter_mut() {
        *v = echo_id(u.i16(), COUNTER_CMD_ID_BITS);
    }
    for v in r.motor_cmd_id.iter_mut() {
        *v = echo_id(u.i16(), MOTOR_CMD_ID_BITS);
    }
    r.sound_cmd_id = echo_id(u.i16(), SOUND_CMD_ID_BITS);

    if u.remaining() == IR_BLOCK_SIZE {
        let mut ir = [0u8; IR_BLOCK_SIZE];
        ir.copy_from_slice(u.bytes(IR_BLOCK_SIZE));
        r.ir = Some(ir);
    }
    Ok(r)
}

fn remote_from_slot(slot: &[u8]) -> RemoteState {
    RemoteState {
        left_x: slot[0] as i8,
        left_y: slot[1] as i8,
        right_x: slot[2] as i8,
        right_y: slot[3] as i8,
        buttons: slot[4] & 0x03,
        dip: (slot[4] >> 2) & 0x03,
    }
}

/// Update remote slots from an IR block.
///
/// Slot 0 always reflects the remote that sent last; the numbered slot
/// selected by that remote's DIP switch is refreshed from its own record.
pub fn merge_ir(ir: &[u8; IR_BLOCK_SIZE], remotes: &mut [RemoteState; NUM_REMOTE_SLOTS]) {
    remotes[0] = remote_from_slot(&ir[0..5]);
    let nr = ((ir[4] >> 2) & 0x03) as usize + 1;
    remotes[nr] = remote_from_slot(&ir[nr * 5..nr * 5 + 5]);
}

impl ExchangeResponse {
    /// Merge into a unit's input fields
    pub fn merge_into(&self, unit: &mut UnitState) {
        unit.current_input = self.input;
        unit.current_counter = self.counter;
        unit.current_counter_value = self.counter_value;
        unit.current_counter_cmd_id = self.counter_cmd_id;
        unit.current_motor_cmd_id = self.motor_cmd_id;
        unit.current_sound_cmd_id = self.sound_cmd_id;
        if let Some(ir) = &self.ir {
            merge_ir(ir, &mut unit.remotes);
        }
    }
}

/// Camera start request
pub fn encode_start_camera(
    width: i32,
    height: i32,
    framerate: i32,
    power_line_freq: i32,
) -> [u8; CAMERA_START_REQUEST_SIZE] {
    let mut p = Packer::<CAMERA_START_REQUEST_SIZE>::new();
    p.u32(ID_START_CAMERA)
        .i32(width)
        .i32(height)
        .i32(framerate)
        .i32(power_line_freq);
    p.finish()
}

pub fn encode_stop_camera() -> [u8; ACK_SIZE] {
    ID_STOP_CAMERA.to_le_bytes()
}
