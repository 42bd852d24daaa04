//! Delta compressor for the extension transport
//!
//! Encodes a flat sequence of 16-bit words against the previous frame as a
//! bitstream of run-length, toggle and literal codes, guarded by a CRC-32 over
//! the plain words.

mod bitstream;
mod codec;
mod crc;

pub use bitstream::{BitReader, BitWriter};
pub use codec::{decode, encode, Decoded, DeltaDecoder, DeltaEncoder, EncodedFrame, MAX_RUN};
pub use crc::{crc32, crc32_words, Crc32};
