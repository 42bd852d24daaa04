//! Little-endian packing helpers shared by the frame codecs
//!
//! [`Packer`] fills a fixed-size frame field by field; [`Unpacker`] walks a
//! received frame whose length the caller has already checked.

/// Sequential writer into a fixed frame
pub struct Packer<const N: usize> {
    data: [u8; N],
    pos: usize,
}

impl<const N: usize> Packer<N> {
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            pos: 0,
        }
    }

    #[inline]
    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.data[self.pos] = v;
        self.pos += 1;
        self
    }

    #[inline]
    pub fn i8(&mut self, v: i8) -> &mut Self {
        self.u8(v as u8)
    }

    #[inline]
    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    #[inline]
    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    #[inline]
    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    #[inline]
    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    #[inline]
    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.data[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
        self
    }

    /// Skip `n` zero bytes
    #[inline]
    pub fn zeros(&mut self, n: usize) -> &mut Self {
        self.pos += n;
        self
    }

    /// Bytes written so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn finish(&self) -> [u8; N] {
        debug_assert_eq!(self.pos, N, "frame not completely packed");
        self.data
    }
}

impl<const N: usize> Default for Packer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential reader over a length-checked frame
pub struct Unpacker<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn u8(&mut self) -> u8 {
        let v = self.data[self.pos];
        self.pos += 1;
        v
    }

    #[inline]
    pub fn i8(&mut self) -> i8 {
        self.u8() as i8
    }

    #[inline]
    pub fn u16(&mut self) -> u16 {
        let v = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
        self.pos += 2;
        v
    }

    #[inline]
    pub fn i16(&mut self) -> i16 {
        self.u16() as i16
    }

    #[inline]
    pub fn u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(b)
    }

    #[inline]
    pub fn i32(&mut self) -> i32 {
        self.u32() as i32
    }

    pub fn bytes(&mut self, n: usize) -> &'a [u8] {
        let v = &self.data[self.pos..self.pos + n];
        self.pos += n;
        v
    }

    pub fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }
}

/// First four bytes of a frame as a little-endian id
pub fn peek_id(data: &[u8]) -> Option<u32> {
    data.get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
