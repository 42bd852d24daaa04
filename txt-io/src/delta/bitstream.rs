//! LSB-first bit writer and reader
//!
//! Bits fill each byte from bit 0 upward; multi-bit fields are written
//! least-significant bit first. The final byte is zero padded.

use crate::error::{Error, Result};

/// Appends bit fields to a growing byte buffer
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `count` bits of `value` (count <= 32)
    pub fn write(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        for i in 0..count {
            let bit = (value >> i) & 1;
            let offset = self.bit_len % 8;
            if offset == 0 {
                self.bytes.push(0);
            }
            if bit != 0 {
                if let Some(last) = self.bytes.last_mut() {
                    *last |= 1 << offset;
                }
            }
            self.bit_len += 1;
        }
    }

    /// Number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Reads bit fields from a byte slice
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read `count` bits (count <= 32), LSB first
    pub fn read(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);
        if self.pos + count as usize > self.data.len() * 8 {
            return Err(Error::Bitstream(format!(
                "needed {} bits at offset {}, stream has {}",
                count,
                self.pos,
                self.data.len() * 8
            )));
        }
        let mut value = 0u32;
        for i in 0..count {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (self.pos % 8)) & 1;
            value |= (bit as u32) << i;
            self.pos += 1;
        }
        Ok(value)
    }

    /// Bits consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsb_first_packing() {
        let mut w = BitWriter::new();
        w.write(0b01, 2);
        w.write(0b11, 2);
        w.write(0xABCD, 16);
        assert_eq!(w.bit_len(), 20);
        let bytes = w.into_bytes();
        // 0b01 | 0b11<<2 | 0xD<<4 in the first byte
        assert_eq!(bytes, vec![0xDD, 0xBC, 0x0A]);

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read(2).unwrap(), 0b01);
        assert_eq!(r.read(2).unwrap(), 0b11);
        assert_eq!(r.read(16).unwrap(), 0xABCD);
        assert_eq!(r.position(), 20);
    }

    #[test]
    fn test_read_past_end() {
        let bytes = [0xFFu8];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read(6).unwrap(), 0x3F);
        assert!(matches!(r.read(4), Err(Error::Bitstream(_))));
    }

    #[test]
    fn test_empty_writer() {
        let w = BitWriter::new();
        assert_eq!(w.bit_len(), 0);
        assert!(w.into_bytes().is_empty());
    }
}
