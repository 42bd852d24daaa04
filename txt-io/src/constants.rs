//! Constants for the TXT controller protocols

// Channel counts per unit
pub const NUM_OUTPUTS: usize = 8; // O1-O8, two per motor
pub const NUM_MOTORS: usize = 4; // M1-M4
pub const NUM_INPUTS: usize = 8; // I1-I8
pub const NUM_COUNTERS: usize = 4; // C1-C4
pub const NUM_REMOTE_SLOTS: usize = 5; // 0 = any remote, 1-4 = by DIP switch
pub const IR_BLOCK_SIZE: usize = 26; // 5 slots x 5 bytes + 1 reserved
pub const MAX_UNITS: usize = 2; // master + one extension

// PWM range (duty in 1/512)
pub const PWM_MAX: i16 = 512;

// Cmd-id widths
pub const MOTOR_CMD_ID_BITS: u32 = 3;
pub const COUNTER_CMD_ID_BITS: u32 = 3;
pub const SOUND_CMD_ID_BITS: u32 = 4;

// Motor sync values
pub const SYNC_NONE: i16 = 0;
pub const SYNC_INJECT_OFFSET: i16 = 4; // 5-8 = "error injection" onto motor 1-4

// Socket command ids (request, response)
pub const ID_QUERY_STATUS: u32 = 0xDC21_219A;
pub const ID_QUERY_STATUS_ACK: u32 = 0xBAC9_723E;
pub const ID_START_ONLINE: u32 = 0x163F_F61D;
pub const ID_START_ONLINE_ACK: u32 = 0xCA68_9F75;
pub const ID_STOP_ONLINE: u32 = 0x9BE5_082C;
pub const ID_STOP_ONLINE_ACK: u32 = 0xFBF6_00D2;
pub const ID_UPDATE_CONFIG: u32 = 0x060E_F27E;
pub const ID_UPDATE_CONFIG_ACK: u32 = 0x9689_A68C;
pub const ID_EXCHANGE_DATA: u32 = 0xCC35_97BA;
pub const ID_EXCHANGE_DATA_ACK: u32 = 0x4EEF_AC41;
pub const ID_EXCHANGE_COMPRESSED: u32 = 0xFBC5_6F98;
pub const ID_EXCHANGE_COMPRESSED_ACK: u32 = 0x6F3B_54E6;
pub const ID_START_CAMERA: u32 = 0x882A_40A6;
pub const ID_START_CAMERA_ACK: u32 = 0xCF41_B24E;
pub const ID_STOP_CAMERA: u32 = 0x17C3_1F2F;
pub const ID_STOP_CAMERA_ACK: u32 = 0x4B3C_1EB6;
pub const ID_CAMERA_FRAME: u32 = 0xBDC2_D7A1;
pub const ID_CAMERA_FRAME_ACK: u32 = 0xADA0_9FBA;

// Serial motor-shield command codes
pub const CMD_CONFIG_IO: u8 = 0x51;
pub const CMD_EXCHANGE_DATA: u8 = 0x54;

// Frame sizes (bytes)
pub const STATUS_RESPONSE_SIZE: usize = 24;
pub const START_ONLINE_REQUEST_SIZE: usize = 68;
pub const ACK_SIZE: usize = 4;
pub const CONFIG_REQUEST_SIZE: usize = 96;
pub const EXCHANGE_REQUEST_SIZE: usize = 60;
pub const EXCHANGE_RESPONSE_SIZE: usize = 80;
pub const EXCHANGE_RESPONSE_CORE_SIZE: usize = 54; // everything before the IR block
pub const SERIAL_CONFIG_SIZE: usize = 15;
pub const SERIAL_EXCHANGE_SIZE: usize = 44;
pub const COMPRESSED_HEADER_SIZE: usize = 16;
pub const CAMERA_HEADER_SIZE: usize = 20;
pub const CAMERA_START_REQUEST_SIZE: usize = 20;

// Compressed word layout per unit
pub const COMPRESSED_REQUEST_WORDS: usize = 27;
pub const COMPRESSED_RESPONSE_WORDS: usize = 51;
pub const MAX_COMPRESSED_PAYLOAD: usize = 1024; // 2 units of literals fit in 230

// Serial cycle counter wraps after 15
pub const SERIAL_CYCLE_MODULO: u8 = 16;

// Timing defaults
pub const DEFAULT_PORT: u16 = 65000;
pub const DEFAULT_BAUD_RATE: u32 = 230_000;
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 10;
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const CAMERA_CONNECT_RETRY_MS: u64 = 20;
pub const CAMERA_CONNECT_ATTEMPTS: u32 = 150;
pub const MAX_CAMERA_FRAME_SIZE: usize = 4 * 1024 * 1024;
