//! In-process device simulator
//!
//! Answers the socket command set (status, session, configuration, plain and
//! compressed exchange, camera start/stop) and the serial shield frames, so
//! the whole driver can run without hardware:
//!
//! ```text
//! ExchangeLoop ──▶ MockTransport ──responder──▶ DeviceSimulator::handle
//!                       ▲                               │
//!                       └────────── response ───────────┘
//! ```
//!
//! Motor model: a new motor cmd-id with a distance arms a distance stop and
//! clears the motor's counter. While armed and driven the counter advances
//! every exchange; on reaching the distance the motor stops and the cmd-id is
//! echoed. Motors whose sync value is 5-8 (error injection) are never stopped
//! by distance and so never echo a distance command. Counter resets and sound
//! commands are echoed on the next exchange.

use crate::constants::*;
use crate::core::sequencer::mask_id;
use crate::core::UnitState;
use crate::delta::{Decoded, DeltaDecoder, DeltaEncoder};
use crate::protocol::wire::{peek_id, Packer, Unpacker};
use crate::protocol::{compressed, serial};
use crate::transport::MockTransport;
use parking_lot::Mutex;
use std::sync::Arc;

/// Simulator shared between a test and the transport answering for it
pub type SimHandle = Arc<Mutex<DeviceSimulator>>;

/// Default device name and version (firmware 4.1.5)
const SIM_NAME: &str = "TXT sim";
const SIM_VERSION: u32 = 0x0401_0500;

#[derive(Debug, Clone, Default)]
struct SimUnit {
    state: UnitState,
    seen_motor_cmd: [u8; NUM_MOTORS],
    seen_counter_cmd: [u8; NUM_COUNTERS],
    seen_sound_cmd: u8,
    /// Distance stop armed and not reached yet
    armed: [bool; NUM_MOTORS],
}

impl SimUnit {
    /// Advance one exchange period
    fn step(&mut self) {
        let s = &mut self.state;

        for c in 0..NUM_COUNTERS {
            if s.counter_cmd_id[c] != self.seen_counter_cmd[c] {
                self.seen_counter_cmd[c] = s.counter_cmd_id[c];
                s.current_counter_value[c] = 0;
                s.current_counter_cmd_id[c] = s.counter_cmd_id[c];
            }
        }

        for m in 0..NUM_MOTORS {
            if s.motor_cmd_id[m] != self.seen_motor_cmd[m] {
                self.seen_motor_cmd[m] = s.motor_cmd_id[m];
                s.current_counter_value[m] = 0;
                self.armed[m] = s.motor_distance[m] > 0;
                if !self.armed[m] {
                    s.current_motor_cmd_id[m] = s.motor_cmd_id[m];
                }
            }

            let speed = s.pwm[2 * m].max(s.pwm[2 * m + 1]);
            let driven = speed > 0 && (self.armed[m] || s.motor_distance[m] == 0);
            s.current_counter[m] = driven as i16;
            if !driven {
                continue;
            }
            let ticks = (speed / 64).max(1) as u16;
            s.current_counter_value[m] = s.current_counter_value[m].saturating_add(ticks);

            let injecting = (SYNC_INJECT_OFFSET + 1..=2 * SYNC_INJECT_OFFSET)
                .contains(&s.motor_sync[m]);
            if self.armed[m] && !injecting && s.current_counter_value[m] >= s.motor_distance[m] {
                s.current_counter_value[m] = s.motor_distance[m];
                self.armed[m] = false;
                s.current_motor_cmd_id[m] = s.motor_cmd_id[m];
            }
        }

        if s.sound_cmd_id != self.seen_sound_cmd {
            self.seen_sound_cmd = s.sound_cmd_id;
            s.current_sound_cmd_id = s.sound_cmd_id;
        }
    }
}

/// Protocol-level fake of the controller
#[derive(Debug)]
pub struct DeviceSimulator {
    name: String,
    version: u32,
    online: bool,
    camera_running: bool,
    units: Vec<SimUnit>,
    ir: [u8; IR_BLOCK_SIZE],
    request_decoder: DeltaDecoder,
    response_encoder: DeltaEncoder,
    exchanges: u64,
    config_pushes: u32,
    /// Cut every exchange response to this many bytes
    truncate_to: Option<usize>,
    /// Answer configuration pushes with a wrong id
    reject_config: bool,
    /// Unit count of compressed responses, when not the requested one
    response_units: Option<usize>,
}

impl DeviceSimulator {
    pub fn new() -> Self {
        Self {
            name: SIM_NAME.to_string(),
            version: SIM_VERSION,
            online: false,
            camera_running: false,
            units: vec![SimUnit::default(); MAX_UNITS],
            ir: [0; IR_BLOCK_SIZE],
            request_decoder: DeltaDecoder::new(),
            response_encoder: DeltaEncoder::new(),
            exchanges: 0,
            config_pushes: 0,
            truncate_to: None,
            reject_config: false,
            response_units: None,
        }
    }

    /// Wrap in a [`SimHandle`] and a transport that answers through it
    pub fn into_transport(self) -> (SimHandle, MockTransport) {
        let handle: SimHandle = Arc::new(Mutex::new(self));
        let sim = Arc::clone(&handle);
        let transport = MockTransport::with_responder(move |req| sim.lock().handle(req));
        (handle, transport)
    }

    // ---- knobs and inspection ----

    pub fn set_input(&mut self, unit: usize, channel: usize, value: i16) {
        if let Some(u) = self.units.get_mut(unit) {
            if let Some(slot) = u.state.current_input.get_mut(channel) {
                *slot = value;
            }
        }
    }

    /// IR block reported over the socket protocols
    pub fn set_ir(&mut self, ir: [u8; IR_BLOCK_SIZE]) {
        self.ir = ir;
    }

    pub fn set_truncate(&mut self, len: Option<usize>) {
        self.truncate_to = len;
    }

    pub fn set_reject_config(&mut self, reject: bool) {
        self.reject_config = reject;
    }

    /// Answer compressed exchanges for `units` units regardless of the request
    pub fn set_response_units(&mut self, units: Option<usize>) {
        self.response_units = units;
    }

    /// Device-side view of a unit: outputs as last received
    pub fn unit(&self, unit: usize) -> Option<&UnitState> {
        self.units.get(unit).map(|u| &u.state)
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn camera_running(&self) -> bool {
        self.camera_running
    }

    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    pub fn config_pushes(&self) -> u32 {
        self.config_pushes
    }

    // ---- request dispatch ----

    /// Answer one request frame
    pub fn handle(&mut self, req: &[u8]) -> Vec<u8> {
        match (req.len(), req.first().copied()) {
            (SERIAL_CONFIG_SIZE, Some(CMD_CONFIG_IO)) => return self.serial_config(req),
            (SERIAL_EXCHANGE_SIZE, Some(CMD_EXCHANGE_DATA)) => return self.serial_exchange(req),
            _ => {}
        }

        match peek_id(req) {
            Some(ID_QUERY_STATUS) => self.status(),
            Some(ID_START_ONLINE) => {
                self.online = true;
                self.request_decoder.reset();
                self.response_encoder.reset();
                log::debug!("Simulator online");
                ID_START_ONLINE_ACK.to_le_bytes().to_vec()
            }
            Some(ID_STOP_ONLINE) => {
                self.online = false;
                ID_STOP_ONLINE_ACK.to_le_bytes().to_vec()
            }
            Some(ID_UPDATE_CONFIG) if req.len() == CONFIG_REQUEST_SIZE => {
                self.config_pushes += 1;
                if self.reject_config {
                    0u32.to_le_bytes().to_vec()
                } else {
                    ID_UPDATE_CONFIG_ACK.to_le_bytes().to_vec()
                }
            }
            Some(ID_EXCHANGE_DATA) if req.len() == EXCHANGE_REQUEST_SIZE => {
                let resp = self.socket_exchange(req);
                self.truncated(resp)
            }
            Some(ID_EXCHANGE_COMPRESSED) => {
                let resp = self.compressed_exchange(req);
                self.truncated(resp)
            }
            Some(ID_START_CAMERA) if req.len() == CAMERA_START_REQUEST_SIZE => {
                self.camera_running = true;
                ID_START_CAMERA_ACK.to_le_bytes().to_vec()
            }
            Some(ID_STOP_CAMERA) => {
                self.camera_running = false;
                ID_STOP_CAMERA_ACK.to_le_bytes().to_vec()
            }
            other => {
                log::warn!("Simulator ignoring request {:?} ({} bytes)", other, req.len());
                Vec::new()
            }
        }
    }

    fn truncated(&self, mut resp: Vec<u8>) -> Vec<u8> {
        if let Some(len) = self.truncate_to {
            resp.truncate(len);
        }
        resp
    }

    fn status(&self) -> Vec<u8> {
        let mut name = [0u8; 16];
        let raw = self.name.as_bytes();
        let n = raw.len().min(name.len());
        name[..n].copy_from_slice(&raw[..n]);
        let mut p = Packer::<STATUS_RESPONSE_SIZE>::new();
        p.u32(ID_QUERY_STATUS_ACK).bytes(&name).u32(self.version);
        p.finish().to_vec()
    }

    fn socket_exchange(&mut self, req: &[u8]) -> Vec<u8> {
        let words: Vec<u16> = req[4..4 + 2 * COMPRESSED_REQUEST_WORDS]
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();
        let unit = &mut self.units[0];
        if let Err(e) = compressed::apply_request_words(&words, &mut unit.state) {
            log::warn!("Simulator rejected exchange request: {}", e);
            return Vec::new();
        }
        unit.step();
        self.exchanges += 1;

        // The plain response is the compressed response word list with the
        // IR words narrowed back to bytes.
        let mut resp_words = Vec::with_capacity(COMPRESSED_RESPONSE_WORDS);
        compressed::push_response_words(&unit.state, &self.ir, &mut resp_words);
        let (fields, ir) = resp_words.split_at(COMPRESSED_RESPONSE_WORDS - IR_BLOCK_SIZE);
        let mut p = Packer::<EXCHANGE_RESPONSE_SIZE>::new();
        p.u32(ID_EXCHANGE_DATA_ACK);
        for w in fields {
            p.u16(*w);
        }
        for w in ir {
            p.u8(*w as u8);
        }
        p.finish().to_vec()
    }

    fn compressed_exchange(&mut self, req: &[u8]) -> Vec<u8> {
        let header = match compressed::Header::decode(
            req.get(..COMPRESSED_HEADER_SIZE).unwrap_or(req),
            "compressed request",
            ID_EXCHANGE_COMPRESSED,
        ) {
            Ok(h) => h,
            Err(e) => {
                log::warn!("Simulator rejected compressed header: {}", e);
                return Vec::new();
            }
        };
        let units = header.units as usize;
        let payload = &req[COMPRESSED_HEADER_SIZE..];
        match self
            .request_decoder
            .decode_frame(header.crc, payload, units * COMPRESSED_REQUEST_WORDS)
        {
            Ok(Decoded::Changed(words)) => {
                for (unit, chunk) in self
                    .units
                    .iter_mut()
                    .zip(words.chunks(COMPRESSED_REQUEST_WORDS))
                {
                    if let Err(e) = compressed::apply_request_words(chunk, &mut unit.state) {
                        log::warn!("Simulator rejected unit words: {}", e);
                    }
                }
            }
            Ok(Decoded::Unchanged) => {}
            Err(e) => {
                log::warn!("Simulator failed to decode request: {}", e);
                return Vec::new();
            }
        }

        let answered = self.response_units.unwrap_or(units).clamp(1, MAX_UNITS);
        let mut words = Vec::with_capacity(answered * COMPRESSED_RESPONSE_WORDS);
        for unit in self.units.iter_mut().take(answered) {
            unit.step();
            compressed::push_response_words(&unit.state, &self.ir, &mut words);
        }
        self.exchanges += 1;
        let frame = self.response_encoder.encode_frame(&words);
        compressed::encode_frame(ID_EXCHANGE_COMPRESSED_ACK, &frame, answered)
    }

    fn serial_config(&mut self, req: &[u8]) -> Vec<u8> {
        self.config_pushes += 1;
        let mut resp = req.to_vec();
        if self.reject_config {
            resp[0] = 0;
        }
        resp
    }

    fn serial_exchange(&mut self, req: &[u8]) -> Vec<u8> {
        let mut u = Unpacker::new(req);
        u.skip(2);
        let cycle = u.u8();
        u.skip(1);

        let unit = &mut self.units[0];
        let s = &mut unit.state;
        for duty in s.pwm.iter_mut() {
            *duty = match u.u8() {
                255 => PWM_MAX,
                b => b as i16 * 2,
            };
        }
        let (sync_lo, sync_hi) = (u.u8(), u.u8());
        s.motor_sync = [
            (sync_lo & 0x0F) as i16,
            (sync_lo >> 4) as i16,
            (sync_hi & 0x0F) as i16,
            (sync_hi >> 4) as i16,
        ];
        let ids = u.bytes(3);
        let (counter_ids, motor_ids) = serial::unpack_cmd_ids([ids[0], ids[1], ids[2]]);
        s.counter_cmd_id = counter_ids;
        s.motor_cmd_id = motor_ids.map(|v| mask_id(v, MOTOR_CMD_ID_BITS));
        u.skip(1);
        for d in s.motor_distance.iter_mut() {
            *d = u.u16();
        }
        unit.step();
        self.exchanges += 1;

        let s = &unit.state;
        let digital = s
            .current_input
            .iter()
            .enumerate()
            .fold(0u8, |acc, (k, v)| acc | (((*v != 0) as u8) << k));
        let analog = s.current_input.map(|v| v.max(0) as u16);
        let (low_a, high_a) = serial::encode_analog(&[analog[0], analog[1], analog[2], analog[3]]);
        let (low_b, high_b) = serial::encode_analog(&[analog[4], analog[5], analog[6], analog[7]]);
        let counter_flags = s
            .current_counter
            .iter()
            .enumerate()
            .fold(0u8, |acc, (k, v)| acc | (((*v != 0) as u8) << k));

        let mut p = Packer::<SERIAL_EXCHANGE_SIZE>::new();
        p.u8(CMD_EXCHANGE_DATA)
            .u8(SERIAL_EXCHANGE_SIZE as u8)
            .u8(cycle)
            .u8(0)
            .u8(digital)
            .bytes(&low_a)
            .bytes(&high_a)
            .bytes(&low_b)
            .bytes(&high_b)
            .zeros(6) // telemetry
            .u8(counter_flags);
        for v in &s.current_counter_value {
            p.u16(*v);
        }
        p.zeros(4) // IR bytes + reserved
            .bytes(&serial::pack_cmd_ids(
                &s.current_counter_cmd_id,
                &s.current_motor_cmd_id,
            ))
            .zeros(3);
        let resp = p.finish().to_vec();
        self.truncated(resp)
    }
}

impl Default for DeviceSimulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::socket;

    fn exchange(sim: &mut DeviceSimulator, unit: &UnitState) -> socket::ExchangeResponse {
        let resp = sim.handle(&socket::encode_exchange(unit));
        socket::decode_exchange(&resp).unwrap()
    }

    #[test]
    fn test_status_reports_name_and_version() {
        let mut sim = DeviceSimulator::new();
        let status = socket::decode_status(&sim.handle(&socket::encode_status_request())).unwrap();
        assert!(status.id_matches());
        assert_eq!(status.name, "TXT sim");
        assert_eq!(status.firmware().as_deref(), Some("4.1.5"));
    }

    #[test]
    fn test_session_acks() {
        let mut sim = DeviceSimulator::new();
        let resp = sim.handle(&socket::encode_start_online());
        socket::check_ack("start online", ID_START_ONLINE_ACK, &resp).unwrap();
        assert!(sim.is_online());
        let resp = sim.handle(&socket::encode_stop_online());
        socket::check_ack("stop online", ID_STOP_ONLINE_ACK, &resp).unwrap();
        assert!(!sim.is_online());
    }

    #[test]
    fn test_distance_command_acknowledged_on_arrival() {
        let mut sim = DeviceSimulator::new();
        let mut unit = UnitState::default();
        unit.pwm[0] = 512;
        unit.motor_distance[0] = 20;
        unit.motor_cmd_id[0] = 1;

        let first = exchange(&mut sim, &unit);
        assert_eq!(first.motor_cmd_id[0], 0);
        assert_eq!(first.counter_value[0], 8);

        exchange(&mut sim, &unit);
        let third = exchange(&mut sim, &unit);
        assert_eq!(third.counter_value[0], 20);
        assert_eq!(third.motor_cmd_id[0], 1);

        // Stopped at the target
        let fourth = exchange(&mut sim, &unit);
        assert_eq!(fourth.counter_value[0], 20);
        assert_eq!(fourth.counter[0], 0);
    }

    #[test]
    fn test_error_injection_never_acknowledged() {
        let mut sim = DeviceSimulator::new();
        let mut unit = UnitState::default();
        unit.pwm[2] = 512;
        unit.motor_distance[1] = 10;
        unit.motor_sync[1] = 5;
        unit.motor_cmd_id[1] = 1;
        for _ in 0..10 {
            let resp = exchange(&mut sim, &unit);
            assert_eq!(resp.motor_cmd_id[1], 0);
        }
    }

    #[test]
    fn test_serial_exchange_echoes_ids() {
        let mut sim = DeviceSimulator::new();
        sim.set_input(0, 2, 1234);
        let mut unit = UnitState::default();
        unit.counter_cmd_id[3] = 6;
        let resp = sim.handle(&serial::encode_exchange(&unit, 9));
        let decoded = serial::decode_exchange(&resp).unwrap();
        assert_eq!(decoded.cycle, 9);
        assert_eq!(decoded.counter_cmd_id[3], 6);
        assert_eq!(decoded.analog[2], 1234);
        assert_eq!(decoded.digital, 0b100);
    }

    #[test]
    fn test_rejected_config() {
        let mut sim = DeviceSimulator::new();
        sim.set_reject_config(true);
        let frame = socket::encode_config(&Default::default(), 1, 0);
        let resp = sim.handle(&frame);
        assert!(socket::check_ack("update config", ID_UPDATE_CONFIG_ACK, &resp).is_err());
        assert_eq!(sim.config_pushes(), 1);
    }
}
