//! Table-driven CRC-32 (IEEE 802.3, reflected)
//!
//! Polynomial 0x04C11DB7, processed LSB first with the reflected constant
//! 0xEDB88320. Init and final xor are 0xFFFFFFFF, so the check value of
//! `"123456789"` is 0xCBF43926.

const CRC32_TABLE: [u32; 256] = generate_crc32_table();

/// Generate the lookup table at compile time
const fn generate_crc32_table() -> [u32; 256] {
    const POLYNOMIAL: u32 = 0xEDB8_8320;
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Running CRC-32 accumulator
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub const fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    #[inline]
    pub fn update_byte(&mut self, byte: u8) {
        let index = ((self.state ^ byte as u32) & 0xFF) as usize;
        self.state = (self.state >> 8) ^ CRC32_TABLE[index];
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.update_byte(byte);
        }
    }

    /// Feed one 16-bit word as two little-endian bytes
    #[inline]
    pub fn update_word(&mut self, word: u16) {
        let [lo, hi] = word.to_le_bytes();
        self.update_byte(lo);
        self.update_byte(hi);
    }

    pub fn finish(&self) -> u32 {
        !self.state
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 of a byte slice
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}

/// CRC-32 of a word sequence, each word as two little-endian bytes
pub fn crc32_words(words: &[u16]) -> u32 {
    let mut crc = Crc32::new();
    for &w in words {
        crc.update_word(w);
    }
    crc.finish()
}
