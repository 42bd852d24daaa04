//! Camera stream frame header
//!
//! ```text
//! id u32 | frames_ready i32 | width i16 | height i16 | raw_size i32 | compressed_size i32
//! ```
//!
//! followed by `compressed_size` bytes of JPEG data. The client acknowledges
//! each complete frame with a 4-byte ack id.

use super::wire::{Packer, Unpacker};
use crate::constants::{ACK_SIZE, CAMERA_HEADER_SIZE, ID_CAMERA_FRAME, ID_CAMERA_FRAME_ACK};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u32,
    pub frames_ready: i32,
    pub width: i16,
    pub height: i16,
    pub raw_size: i32,
    pub compressed_size: i32,
}

impl FrameHeader {
    /// Header id matches the frame id (mismatches are only warned about)
    pub fn id_matches(&self) -> bool {
        self.id == ID_CAMERA_FRAME
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != CAMERA_HEADER_SIZE {
            return Err(Error::ShortRead {
                expected: CAMERA_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let mut u = Unpacker::new(data);
        Ok(Self {
            id: u.u32(),
            frames_ready: u.i32(),
            width: u.i16(),
            height: u.i16(),
            raw_size: u.i32(),
            compressed_size: u.i32(),
        })
    }

    pub fn encode(&self) -> [u8; CAMERA_HEADER_SIZE] {
        let mut p = Packer::<CAMERA_HEADER_SIZE>::new();
        p.u32(self.id)
            .i32(self.frames_ready)
            .i16(self.width)
            .i16(self.height)
            .i32(self.raw_size)
            .i32(self.compressed_size);
        p.finish()
    }
}

pub fn encode_frame_ack() -> [u8; ACK_SIZE] {
    ID_CAMERA_FRAME_ACK.to_le_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader {
            id: ID_CAMERA_FRAME,
            frames_ready: 1,
            width: 320,
            height: 240,
            raw_size: 320 * 240 * 2,
            compressed_size: 4711,
        };
        let bytes = header.encode();
        assert_eq!(&bytes[8..10], &320i16.to_le_bytes());
        assert_eq!(&bytes[16..20], &4711i32.to_le_bytes());
        let back = FrameHeader::decode(&bytes).unwrap();
        assert!(back.id_matches());
        assert_eq!(back, header);
        assert!(FrameHeader::decode(&bytes[..19]).is_err());
    }
}
