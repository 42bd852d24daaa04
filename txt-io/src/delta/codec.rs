//! Run-length / toggle / literal word codec
//!
//! Each word is coded against the word at the same position in the previous
//! frame:
//!
//! ```text
//! op  meaning                         payload
//! 00  one unchanged word              -
//! 01  toggle (nonzero -> 0, 0 -> 1)   -
//! 10  literal                         16 bits
//! 11  run of n unchanged words        2 bits n-1         (n = 2..4)
//!                                     or 2b 0, 4 bits n-4   (5..19)
//!                                     or 6b 0, 8 bits n-19  (20..274)
//!                                     or 14b 0, 12 bits n-275 (275..4370)
//! ```
//!
//! Runs longer than 4370 words are split into consecutive codes. A frame of
//! unchanged words therefore costs a single run code.

use super::bitstream::{BitReader, BitWriter};
use super::crc::crc32_words;
use crate::error::{Error, Result};

const OP_SINGLE: u32 = 0b00;
const OP_TOGGLE: u32 = 0b01;
const OP_LITERAL: u32 = 0b10;
const OP_RUN: u32 = 0b11;

/// Longest run a single code can express
pub const MAX_RUN: usize = 4370;

/// Previous value of a slot; slots past the end of the baseline read as zero
#[inline]
fn prev_at(prev: &[u16], i: usize) -> u16 {
    prev.get(i).copied().unwrap_or(0)
}

fn write_run(w: &mut BitWriter, mut len: usize) {
    while len > 0 {
        if len == 1 {
            w.write(OP_SINGLE, 2);
            return;
        }
        let n = len.min(MAX_RUN);
        w.write(OP_RUN, 2);
        match n {
            2..=4 => w.write((n - 1) as u32, 2),
            5..=19 => {
                w.write(0, 2);
                w.write((n - 4) as u32, 4);
            }
            20..=274 => {
                w.write(0, 6);
                w.write((n - 19) as u32, 8);
            }
            _ => {
                w.write(0, 14);
                w.write((n - 275) as u32, 12);
            }
        }
        len -= n;
    }
}

fn read_run(r: &mut BitReader<'_>) -> Result<usize> {
    let n = r.read(2)?;
    if n != 0 {
        return Ok(n as usize + 1);
    }
    let n = r.read(4)?;
    if n != 0 {
        return Ok(n as usize + 4);
    }
    let n = r.read(8)?;
    if n != 0 {
        return Ok(n as usize + 19);
    }
    Ok(r.read(12)? as usize + 275)
}

/// Encode `next` against `prev`, returning the bitstream and CRC-32 of `next`
pub fn encode(prev: &[u16], next: &[u16]) -> (Vec<u8>, u32) {
    let mut w = BitWriter::new();
    let mut run = 0usize;

    for (i, &word) in next.iter().enumerate() {
        let old = prev_at(prev, i);
        if word == old {
            run += 1;
            continue;
        }
        write_run(&mut w, run);
        run = 0;

        let toggles = (old != 0 && word == 0) || (old == 0 && word == 1);
        if toggles {
            w.write(OP_TOGGLE, 2);
        } else {
            w.write(OP_LITERAL, 2);
            w.write(word as u32, 16);
        }
    }
    write_run(&mut w, run);

    (w.into_bytes(), crc32_words(next))
}

/// Decode `word_count` words from `bits` against `prev`
pub fn decode(prev: &[u16], bits: &[u8], word_count: usize) -> Result<Vec<u16>> {
    let mut r = BitReader::new(bits);
    let mut out = Vec::with_capacity(word_count);

    while out.len() < word_count {
        let i = out.len();
        match r.read(2)? {
            OP_SINGLE => out.push(prev_at(prev, i)),
            OP_TOGGLE => out.push(if prev_at(prev, i) == 0 { 1 } else { 0 }),
            OP_LITERAL => out.push(r.read(16)? as u16),
            _ => {
                let n = read_run(&mut r)?;
                if i + n > word_count {
                    return Err(Error::Bitstream(format!(
                        "run of {} at word {} overflows frame of {}",
                        n, i, word_count
                    )));
                }
                out.extend((i..i + n).map(|j| prev_at(prev, j)));
            }
        }
    }

    Ok(out)
}

/// Result of feeding one received frame to a [`DeltaDecoder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// CRC equals the previous frame's; prior values stay valid
    Unchanged,
    /// New word values
    Changed(Vec<u16>),
}

/// Outbound side: remembers the last transmitted frame and its CRC
#[derive(Debug, Default)]
pub struct DeltaEncoder {
    prev: Vec<u16>,
    prev_crc: Option<u32>,
}

/// One encoded outbound frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Bitstream; empty when `unchanged`
    pub payload: Vec<u8>,
    pub crc: u32,
    pub unchanged: bool,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `words`, or flag the frame unchanged when its CRC repeats
    pub fn encode_frame(&mut self, words: &[u16]) -> EncodedFrame {
        let crc = crc32_words(words);
        if self.prev_crc == Some(crc) {
            return EncodedFrame {
                payload: Vec::new(),
                crc,
                unchanged: true,
            };
        }
        let (payload, crc) = encode(&self.prev, words);
        self.prev.clear();
        self.prev.extend_from_slice(words);
        self.prev_crc = Some(crc);
        EncodedFrame {
            payload,
            crc,
            unchanged: false,
        }
    }

    /// Forget the baseline (new session)
    pub fn reset(&mut self) {
        self.prev.clear();
        self.prev_crc = None;
    }
}

/// Inbound side: remembers the last decoded frame and its CRC
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    prev: Vec<u16>,
    prev_crc: Option<u32>,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one frame.
    ///
    /// A CRC equal to the previous one short-circuits to [`Decoded::Unchanged`]
    /// without touching the bitstream. Two different frames sharing a CRC are
    /// thus indistinguishable; that collision risk is part of the protocol.
    pub fn decode_frame(&mut self, crc: u32, payload: &[u8], word_count: usize) -> Result<Decoded> {
        if self.prev_crc == Some(crc) {
            return Ok(Decoded::Unchanged);
        }
        let words = decode(&self.prev, payload, word_count)?;
        let actual = crc32_words(&words);
        if actual != crc {
            return Err(Error::CrcMismatch {
                expected: crc,
                actual,
            });
        }
        self.prev.clone_from(&words);
        self.prev_crc = Some(crc);
        Ok(Decoded::Changed(words))
    }

    /// Last successfully decoded words
    pub fn last(&self) -> &[u16] {
        &self.prev
    }

    pub fn reset(&mut self) {
        self.prev.clear();
        self.prev_crc = None;
    }
}
