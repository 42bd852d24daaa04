//! Compressed exchange frames for master + extension
//!
//! ```text
//! ┌──────────┬──────────────┬──────────┬──────────────┬──────────┬─────────────────────┐
//! │ id (u32) │ payload_len  │ crc32    │ active units │ reserved │ bitstream           │
//! │          │ (u32)        │ (u32)    │ (u16)        │ (u16)    │ (payload_len bytes) │
//! └──────────┴──────────────┴──────────┴──────────────┴──────────┴─────────────────────┘
//! ```
//!
//! The bitstream is the delta coding of a flat word list, units concatenated
//! master first. `payload_len == 0` means the words are unchanged since the
//! previous frame (same CRC).
//!
//! Request words per unit (27): pwm 8, sync 4, distance 4, motor id 4,
//! counter id 4, sound id, sound index, sound repeat.
//!
//! Response words per unit (51): input 8, counter flag 4, counter value 4,
//! counter id echo 4, motor id echo 4, sound id echo, IR 26 (one byte per word).

use super::wire::{Packer, Unpacker};
use crate::constants::*;
use crate::core::sequencer::mask_id;
use crate::core::UnitState;
use crate::delta::EncodedFrame;
use crate::error::{Error, Result};

/// Fixed part of a compressed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u32,
    pub payload_len: u32,
    pub crc: u32,
    pub units: u16,
}

impl Header {
    pub fn encode(&self) -> [u8; COMPRESSED_HEADER_SIZE] {
        let mut p = Packer::<COMPRESSED_HEADER_SIZE>::new();
        p.u32(self.id)
            .u32(self.payload_len)
            .u32(self.crc)
            .u16(self.units)
            .u16(0);
        p.finish()
    }

    /// Parse a header and check its id against `expected`
    pub fn decode(data: &[u8], command: &'static str, expected: u32) -> Result<Self> {
        if data.len() != COMPRESSED_HEADER_SIZE {
            return Err(Error::ShortRead {
                expected: COMPRESSED_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut u = Unpacker::new(data);
        let header = Header {
            id: u.u32(),
            payload_len: u.u32(),
            crc: u.u32(),
            units: u.u16(),
        };
        if header.id != expected {
            return Err(Error::ResponseMismatch {
                command,
                expected,
                actual: header.id,
            });
        }
        if header.payload_len as usize > MAX_COMPRESSED_PAYLOAD {
            return Err(Error::Bitstream(format!(
                "payload of {} bytes exceeds {}",
                header.payload_len, MAX_COMPRESSED_PAYLOAD
            )));
        }
        if header.units == 0 || header.units as usize > MAX_UNITS {
            return Err(Error::Bitstream(format!("invalid unit count {}", header.units)));
        }
        Ok(header)
    }
}

/// Header plus bitstream
pub fn encode_frame(id: u32, frame: &EncodedFrame, units: usize) -> Vec<u8> {
    let header = Header {
        id,
        payload_len: frame.payload.len() as u32,
        crc: frame.crc,
        units: units as u16,
    };
    let mut out = Vec::with_capacity(COMPRESSED_HEADER_SIZE + frame.payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(&frame.payload);
    out
}

/// Flatten one unit's outputs into request words
pub fn push_request_words(unit: &UnitState, words: &mut Vec<u16>) {
    words.extend(unit.pwm.iter().map(|v| *v as u16));
    words.extend(unit.motor_sync.iter().map(|v| *v as u16));
    words.extend_from_slice(&unit.motor_distance);
    words.extend(unit.motor_cmd_id.iter().map(|v| *v as u16));
    words.extend(unit.counter_cmd_id.iter().map(|v| *v as u16));
    words.push(unit.sound_cmd_id as u16);
    words.push(unit.sound_index);
    words.push(unit.sound_repeat);
}

/// Request words of all units, master first
pub fn request_words(units: &[UnitState]) -> Vec<u16> {
    let mut words = Vec::with_capacity(units.len() * COMPRESSED_REQUEST_WORDS);
    for unit in units {
        push_request_words(unit, &mut words);
    }
    words
}

/// Device side: apply one unit's request words to its outputs
pub fn apply_request_words(words: &[u16], unit: &mut UnitState) -> Result<()> {
    if words.len() != COMPRESSED_REQUEST_WORDS {
        return Err(Error::Bitstream(format!(
            "unit request has {} words, expected {}",
            words.len(),
            COMPRESSED_REQUEST_WORDS
        )));
    }
    let (pwm, rest) = words.split_at(NUM_OUTPUTS);
    let (sync, rest) = rest.split_at(NUM_MOTORS);
    let (dist, rest) = rest.split_at(NUM_MOTORS);
    let (motor_ids, rest) = rest.split_at(NUM_MOTORS);
    let (counter_ids, rest) = rest.split_at(NUM_COUNTERS);
    for (dst, src) in unit.pwm.iter_mut().zip(pwm) {
        *dst = *src as i16;
    }
    for (dst, src) in unit.motor_sync.iter_mut().zip(sync) {
        *dst = *src as i16;
    }
    unit.motor_distance.copy_from_slice(dist);
    for (dst, src) in unit.motor_cmd_id.iter_mut().zip(motor_ids) {
        *dst = mask_id(*src as u8, MOTOR_CMD_ID_BITS);
    }
    for (dst, src) in unit.counter_cmd_id.iter_mut().zip(counter_ids) {
        *dst = mask_id(*src as u8, COUNTER_CMD_ID_BITS);
    }
    unit.sound_cmd_id = mask_id(rest[0] as u8, SOUND_CMD_ID_BITS);
    unit.sound_index = rest[1];
    unit.sound_repeat = rest[2];
    Ok(())
}

/// Device side: one unit's input fields as response words
pub fn push_response_words(unit: &UnitState, ir: &[u8; IR_BLOCK_SIZE], words: &mut Vec<u16>) {
    words.extend(unit.current_input.iter().map(|v| *v as u16));
    words.extend(unit.current_counter.iter().map(|v| *v as u16));
    words.extend_from_slice(&unit.current_counter_value);
    words.extend(unit.current_counter_cmd_id.iter().map(|v| *v as u16));
    words.extend(unit.current_motor_cmd_id.iter().map(|v| *v as u16));
    words.push(unit.current_sound_cmd_id as u16);
    words.extend(ir.iter().map(|b| *b as u16));
}

/// Merge one unit's response words into its input fields
pub fn merge_response_words(words: &[u16], unit: &mut UnitState) -> Result<()> {
    if words.len() != COMPRESSED_RESPONSE_WORDS {
        return Err(Error::Bitstream(format!(
            "unit response has {} words, expected {}",
            words.len(),
            COMPRESSED_RESPONSE_WORDS
        )));
    }
    let (input, rest) = words.split_at(NUM_INPUTS);
    let (counter, rest) = rest.split_at(NUM_COUNTERS);
    let (value, rest) = rest.split_at(NUM_COUNTERS);
    let (counter_ids, rest) = rest.split_at(NUM_COUNTERS);
    let (motor_ids, rest) = rest.split_at(NUM_MOTORS);
    let (sound, ir_words) = rest.split_at(1);

    for (dst, src) in unit.current_input.iter_mut().zip(input) {
        *dst = *src as i16;
    }
    for (dst, src) in unit.current_counter.iter_mut().zip(counter) {
        *dst = *src as i16;
    }
    unit.current_counter_value.copy_from_slice(value);
    for (dst, src) in unit.current_counter_cmd_id.iter_mut().zip(counter_ids) {
        *dst = mask_id(*src as u8, COUNTER_CMD_ID_BITS);
    }
    for (dst, src) in unit.current_motor_cmd_id.iter_mut().zip(motor_ids) {
        *dst = mask_id(*src as u8, MOTOR_CMD_ID_BITS);
    }
    unit.current_sound_cmd_id = mask_id(sound[0] as u8, SOUND_CMD_ID_BITS);

    let mut ir = [0u8; IR_BLOCK_SIZE];
    for (dst, src) in ir.iter_mut().zip(ir_words) {
        *dst = *src as u8;
    }
    super::socket::merge_ir(&ir, &mut unit.remotes);
    Ok(())
}
