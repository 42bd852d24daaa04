//! Direct serial link to the motor shield
//!
//! Byte-packed frames: 15-byte I/O configuration (0x51) and 44-byte data
//! exchange (0x54). The shield answers each frame with one of the same size.
//!
//! # Packed command ids (bit 7 .. bit 0)
//!
//! ```text
//! byte0: c3 c3 c2 c2 c2 c1 c1 c1
//! byte1: m2 m1 m1 m1 c4 c4 c4 c3
//! byte2: m4 m4 m4 m3 m3 m3 m2 m2
//! ```
//!
//! # Analog inputs
//!
//! 8 low bytes plus 6 high bits per channel, the high bits of four channels
//! sharing three bytes:
//!
//! ```text
//! [9..12]  22111111 33332222 44444433     (I1-I4)
//! [16..19] 66555555 77776666 88888877     (I5-I8)
//! ```

use super::wire::{Packer, Unpacker};
use crate::constants::*;
use crate::core::{IoConfig, RemoteState, UnitState};
use crate::error::{Error, Result};

/// Wire byte for a PWM duty 0-512: 512 saturates at 255, others halve
#[inline]
pub fn pwm_byte(duty: i16) -> u8 {
    if duty >= PWM_MAX {
        255
    } else {
        (duty.max(0) / 2) as u8
    }
}

/// Pack 4 counter ids and 4 motor ids into 3 bytes
pub fn pack_cmd_ids(counters: &[u8; NUM_COUNTERS], motors: &[u8; NUM_MOTORS]) -> [u8; 3] {
    let c = counters.map(|v| v & 0x07);
    let m = motors.map(|v| v & 0x07);
    let b0 = c[0] | (c[1] << 3) | ((c[2] & 0x03) << 6);
    let b1 = ((c[2] & 0x04) >> 2) | (c[3] << 1) | (m[0] << 4) | ((m[1] & 0x01) << 7);
    let b2 = ((m[1] & 0x06) >> 1) | (m[2] << 2) | (m[3] << 5);
    [b0, b1, b2]
}

/// Inverse of [`pack_cmd_ids`]: (counter ids, motor ids)
pub fn unpack_cmd_ids(b: [u8; 3]) -> ([u8; NUM_COUNTERS], [u8; NUM_MOTORS]) {
    let [b0, b1, b2] = b;
    let counters = [
        b0 & 0x07,
        (b0 >> 3) & 0x07,
        ((b0 >> 6) & 0x03) | ((b1 << 2) & 0x04),
        (b1 >> 1) & 0x07,
    ];
    let motors = [
        (b1 >> 4) & 0x07,
        ((b1 >> 7) & 0x01) | ((b2 << 1) & 0x06),
        (b2 >> 2) & 0x07,
        (b2 >> 5) & 0x07,
    ];
    (counters, motors)
}

/// Reconstruct four analog readings from low bytes and shared high bits
pub fn decode_analog(low: &[u8], high: &[u8]) -> [u16; 4] {
    let lo = |k: usize| low[k] as u16;
    let h0 = high[0] as u16;
    let h1 = high[1] as u16;
    let h2 = high[2] as u16;
    [
        lo(0) + 256 * (h0 & 0x3F),
        lo(1) + 256 * (((h0 >> 6) & 0x03) | ((h1 << 2) & 0x3C)),
        lo(2) + 256 * (((h1 >> 4) & 0x0F) | ((h2 << 4) & 0x30)),
        lo(3) + 256 * ((h2 >> 2) & 0x3F),
    ]
}

/// Inverse of [`decode_analog`], for the simulator and tests
pub fn encode_analog(values: &[u16; 4]) -> ([u8; 4], [u8; 3]) {
    let low = values.map(|v| (v & 0xFF) as u8);
    let h = values.map(|v| ((v >> 8) & 0x3F) as u8);
    let high = [
        h[0] | (h[1] << 6),
        (h[1] >> 2) | (h[2] << 4),
        (h[2] >> 4) | (h[3] << 2),
    ];
    (low, high)
}

/// I/O configuration frame (0x51)
pub fn encode_config(config: &IoConfig, cycle: u8) -> [u8; SERIAL_CONFIG_SIZE] {
    let mut modes = [0u8; 4];
    for (k, input) in config.inputs.iter().enumerate() {
        modes[k / 2] |= (input.direct_mode() & 0x0F) << (4 * (k % 2));
    }
    let mut p = Packer::<SERIAL_CONFIG_SIZE>::new();
    p.u8(CMD_CONFIG_IO)
        .u8(cycle)
        .u8(0) // extension mask: master only
        .bytes(&modes)
        .u16(0) // crc, unused by the shield
        .zeros(6);
    p.finish()
}

/// Check the shield's answer to a configuration frame
pub fn check_config_ack(data: &[u8]) -> Result<()> {
    match data.first() {
        Some(&CMD_CONFIG_IO) => Ok(()),
        Some(&other) => Err(Error::ResponseMismatch {
            command: "serial config",
            expected: CMD_CONFIG_IO as u32,
            actual: other as u32,
        }),
        None => Err(Error::ShortRead {
            expected: SERIAL_CONFIG_SIZE,
            actual: 0,
        }),
    }
}

/// Data exchange frame (0x54)
pub fn encode_exchange(unit: &UnitState, cycle: u8) -> [u8; SERIAL_EXCHANGE_SIZE] {
    let s = unit.motor_sync.map(|v| (v as u8) & 0x0F);
    let ids = pack_cmd_ids(&unit.counter_cmd_id, &unit.motor_cmd_id);

    let mut p = Packer::<SERIAL_EXCHANGE_SIZE>::new();
    p.u8(CMD_EXCHANGE_DATA)
        .u8(SERIAL_EXCHANGE_SIZE as u8)
        .u8(cycle)
        .u8(0);
    for duty in &unit.pwm {
        p.u8(pwm_byte(*duty));
    }
    p.u8(s[0] | (s[1] << 4)).u8(s[2] | (s[3] << 4));
    p.bytes(&ids).u8(0);
    for d in &unit.motor_distance {
        p.u16(*d);
    }
    p.zeros(4) // reserved
        .zeros(12) // filler, the shield answers with as many bytes as it got
        .u16(0); // crc, unused
    p.finish()
}

/// Decoded shield response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResponse {
    pub cycle: u8,
    pub digital: u8,
    pub analog: [u16; NUM_INPUTS],
    pub power: u16,
    pub temperature: u16,
    pub reference_power: u16,
    pub extension_power: u16,
    pub counter_flags: u8,
    pub counter_value: [u16; NUM_COUNTERS],
    /// IR bytes 34..37: sign/button flags, right joystick, left joystick
    pub ir: [u8; 3],
    pub counter_cmd_id: [u8; NUM_COUNTERS],
    pub motor_cmd_id: [u8; NUM_MOTORS],
}

/// Decode a shield response.
///
/// Only a full 44-byte frame carries the command-id echoes, so unlike the
/// socket variant no partial frame is accepted.
pub fn decode_exchange(data: &[u8]) -> Result<ExchangeResponse> {
    if data.len() != SERIAL_EXCHANGE_SIZE {
        return Err(Error::ShortRead {
            expected: SERIAL_EXCHANGE_SIZE,
            actual: data.len(),
        });
    }
    if data[0] != CMD_EXCHANGE_DATA {
        return Err(Error::ResponseMismatch {
            command: "serial exchange",
            expected: CMD_EXCHANGE_DATA as u32,
            actual: data[0] as u32,
        });
    }

    let mut u = Unpacker::new(data);
    u.skip(2);
    let cycle = u.u8();
    u.skip(1);
    let digital = u.u8();
    let low_a = u.bytes(4);
    let high_a = u.bytes(3);
    let low_b = u.bytes(4);
    let high_b = u.bytes(3);
    let a = decode_analog(low_a, high_a);
    let b = decode_analog(low_b, high_b);

    let power_lo = u.u8() as u16;
    let temp_lo = u.u8() as u16;
    let pt = u.u8() as u16;
    let ref_lo = u.u8() as u16;
    let ext_lo = u.u8() as u16;
    let er = u.u8() as u16;
    let counter_flags = u.u8();
    let mut counter_value = [0u16; NUM_COUNTERS];
    for v in counter_value.iter_mut() {
        *v = u.u16();
    }
    let ir_bytes = u.bytes(3);
    u.skip(1);
    let ids = u.bytes(3);
    let (counter_cmd_id, motor_cmd_id) = unpack_cmd_ids([ids[0], ids[1], ids[2]]);

    Ok(ExchangeResponse {
        cycle,
        digital,
        analog: [a[0], a[1], a[2], a[3], b[0], b[1], b[2], b[3]],
        power: power_lo + 256 * (pt & 0x3F),
        temperature: temp_lo + 256 * ((pt >> 6) & 0x03),
        reference_power: ref_lo + 256 * (er & 0x0F),
        extension_power: ext_lo + 256 * ((er >> 4) & 0x0F),
        counter_flags,
        counter_value,
        ir: [ir_bytes[0], ir_bytes[1], ir_bytes[2]],
        counter_cmd_id,
        motor_cmd_id,
    })
}

/// Axis with its sign taken from a flag bit
#[inline]
fn signed_axis(magnitude: u8, positive: bool) -> i8 {
    let m = (magnitude & 0x0F) as i8;
    if positive {
        m
    } else {
        -m
    }
}

/// Update remote slots from the three serial IR bytes.
///
/// Slot 0 is the remote that sent; the numbered slot picked by its DIP
/// switch receives a copy.
pub fn merge_ir(ir: [u8; 3], remotes: &mut [RemoteState; NUM_REMOTE_SLOTS]) {
    let [flags, right, left] = ir;
    let remote = RemoteState {
        right_x: signed_axis(right, flags & 0x01 != 0),
        right_y: signed_axis(right >> 4, flags & 0x02 != 0),
        left_x: signed_axis(left, flags & 0x04 != 0),
        left_y: signed_axis(left >> 4, flags & 0x08 != 0),
        buttons: (flags >> 4) & 0x03,
        dip: (flags >> 6) & 0x03,
    };
    remotes[0] = remote;
    remotes[remote.dip as usize + 1] = remote;
}

impl ExchangeResponse {
    /// Merge into a unit; digital channels read their bit, analog the value
    pub fn merge_into(&self, unit: &mut UnitState) {
        for k in 0..NUM_INPUTS {
            unit.current_input[k] = if unit.io_config.inputs[k].digital {
                ((self.digital >> k) & 1) as i16
            } else {
                self.analog[k] as i16
            };
        }
        unit.power = self.power;
        unit.temperature = self.temperature;
        unit.reference_power = self.reference_power;
        unit.extension_power = self.extension_power;
        for k in 0..NUM_COUNTERS {
            unit.current_counter[k] = ((self.counter_flags >> k) & 1) as i16;
        }
        unit.current_counter_value = self.counter_value;
        unit.current_counter_cmd_id = self.counter_cmd_id;
        unit.current_motor_cmd_id = self.motor_cmd_id;
        merge_ir(self.ir, &mut unit.remotes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::InputConfig;

    #[test]
    fn test_pwm_bytes() {
        assert_eq!(pwm_byte(512), 255);
        assert_eq!(pwm_byte(0), 0);
        assert_eq!(pwm_byte(1), 0);
        assert_eq!(pwm_byte(511), 255);
        assert_eq!(pwm_byte(300), 150);
    }

    #[test]
    fn test_cmd_id_packing_layout() {
        let packed = pack_cmd_ids(&[1, 2, 5, 7], &[3, 5, 6, 4]);
        // b0 = c1 | c2<<3 | (c3&3)<<6 = 1 | 16 | 64
        assert_eq!(packed[0], 0b0101_0001);
        // b1 = (c3&4)>>2 | c4<<1 | m1<<4 | (m2&1)<<7
        assert_eq!(packed[1], 0b1011_1111);
        // b2 = (m2&6)>>1 | m3<<2 | m4<<5
        assert_eq!(packed[2], 0b1001_1010);
        assert_eq!(unpack_cmd_ids(packed), ([1, 2, 5, 7], [3, 5, 6, 4]));
    }

    #[test]
    fn test_cmd_id_packing_every_value() {
        for v in 0..8u8 {
            let c = [v, 7 - v, v, (v + 3) & 7];
            let m = [(v + 1) & 7, v, 7 - v, v];
            assert_eq!(unpack_cmd_ids(pack_cmd_ids(&c, &m)), (c, m));
        }
    }

    #[test]
    fn test_analog_high_bit_mapping() {
        // 8 low + 6 high bits: 0x3FFF is the largest reading
        let values = [0x3FFFu16, 0x0155, 0x2A00, 0x1234];
        let (low, high) = encode_analog(&values);
        assert_eq!(decode_analog(&low, &high), values);

        // I2's high bits straddle bytes 0 and 1
        let (low, high) = encode_analog(&[0, 0x3F00, 0, 0]);
        assert_eq!(low, [0; 4]);
        assert_eq!(high, [0b1100_0000, 0b0000_1111, 0]);
    }

    #[test]
    fn test_config_frame_nibbles() {
        let mut cfg = IoConfig::default();
        cfg.inputs[0] = InputConfig::ultrasonic();
        cfg.inputs[1] = InputConfig::voltage();
        cfg.inputs[7] = InputConfig::resistor();
        let frame = encode_config(&cfg, 3);
        assert_eq!(frame.len(), 15);
        assert_eq!(frame[0], 0x51);
        assert_eq!(frame[1], 3);
        assert_eq!(frame[3], 0x24);
        assert_eq!(frame[4], 0x11);
        assert_eq!(frame[6], 0x31);
        assert_eq!(&frame[7..], &[0u8; 8]);
    }

    #[test]
    fn test_exchange_frame_layout() {
        let mut unit = UnitState::default();
        unit.pwm[0] = 512;
        unit.pwm[1] = 101;
        unit.motor_sync = [2, 1, 0, 6];
        unit.motor_distance[1] = 0x0203;
        unit.motor_cmd_id[0] = 1;
        let frame = encode_exchange(&unit, 15);
        assert_eq!(frame.len(), 44);
        assert_eq!(&frame[..4], &[0x54, 44, 15, 0]);
        assert_eq!(frame[4], 255);
        assert_eq!(frame[5], 50);
        assert_eq!(frame[12], 0x12);
        assert_eq!(frame[13], 0x60);
        assert_eq!(frame[15], 0x10);
        assert_eq!(&frame[20..22], &[0x03, 0x02]);
        assert!(frame[26..].iter().all(|b| *b == 0));
    }

    fn shield_response() -> [u8; 44] {
        let mut r = [0u8; 44];
        r[0] = 0x54;
        r[1] = 44;
        r[2] = 7;
        r[4] = 0b0000_0101;
        let (low, high) = encode_analog(&[1000, 2000, 3000, 4000]);
        r[5..9].copy_from_slice(&low);
        r[9..12].copy_from_slice(&high);
        let (low, high) = encode_analog(&[5, 6, 7, 8]);
        r[12..16].copy_from_slice(&low);
        r[16..19].copy_from_slice(&high);
        r[19] = 0x10;
        r[20] = 0x20;
        r[21] = 0b1000_0011; // temp high 2, power high 3
        r[22] = 0x30;
        r[23] = 0x40;
        r[24] = 0x5A; // ext high 5, ref high 10
        r[25] = 0b0010;
        r[26..28].copy_from_slice(&77u16.to_le_bytes());
        r[34] = 0b0110_0101; // dip 1, buttons 2, rx+, ry-, lx+, ly-
        r[35] = 0x3C; // right: x 12, y 3
        r[36] = 0x71; // left: x 1, y 7
        r[38..41].copy_from_slice(&pack_cmd_ids(&[0, 0, 0, 0], &[4, 0, 0, 0]));
        r
    }

    #[test]
    fn test_decode_response() {
        let r = decode_exchange(&shield_response()).unwrap();
        assert_eq!(r.cycle, 7);
        assert_eq!(r.analog[..4], [1000, 2000, 3000, 4000]);
        assert_eq!(r.analog[7], 8);
        assert_eq!(r.power, 0x10 + 256 * 3);
        assert_eq!(r.temperature, 0x20 + 256 * 2);
        assert_eq!(r.reference_power, 0x30 + 256 * 10);
        assert_eq!(r.extension_power, 0x40 + 256 * 5);
        assert_eq!(r.counter_value[0], 77);
        assert_eq!(r.motor_cmd_id, [4, 0, 0, 0]);
    }

    #[test]
    fn test_merge_respects_digital_config() {
        let r = decode_exchange(&shield_response()).unwrap();
        let mut unit = UnitState::default();
        unit.io_config.inputs[1] = InputConfig::voltage();
        r.merge_into(&mut unit);
        assert_eq!(unit.current_input[0], 1); // digital bit 0
        assert_eq!(unit.current_input[1], 2000); // analog
        assert_eq!(unit.current_input[2], 1); // digital bit 2
        assert_eq!(unit.current_counter, [0, 1, 0, 0]);
        assert_eq!(unit.current_motor_cmd_id[0], 4);

        let any = unit.remotes[0];
        assert_eq!(any.right_x, 12);
        assert_eq!(any.right_y, -3);
        assert_eq!(any.left_x, 1);
        assert_eq!(any.left_y, -7);
        assert_eq!(any.buttons, 2);
        assert_eq!(any.dip, 1);
        assert_eq!(unit.remotes[2], any);
    }

    #[test]
    fn test_response_size_and_command_checked() {
        let r = shield_response();
        assert!(matches!(
            decode_exchange(&r[..30]),
            Err(Error::ShortRead { expected: 44, actual: 30 })
        ));
        let mut bad = r;
        bad[0] = 0x51;
        assert!(matches!(decode_exchange(&bad), Err(Error::ResponseMismatch { .. })));
    }

    #[test]
    fn test_config_ack() {
        assert!(check_config_ack(&[0x51, 0, 0]).is_ok());
        assert!(check_config_ack(&[0x54]).is_err());
        assert!(check_config_ack(&[]).is_err());
    }
}
