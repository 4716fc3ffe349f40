//! Sub-byte sample packing for 10- and 12-bit sensor data
//!
//! Samples arrive in 16-bit words with only the low 10 or 12 bits meaningful.
//! Packing drops the unused high bits:
//!
//! - 10-bit samples are appended LSB-first to a little-endian bit stream, so
//!   four samples fill exactly five bytes.
//! - 12-bit samples are stored in pairs as three bytes, most significant
//!   nibbles first. A trailing odd sample takes two bytes.
//!
//! Unpacking is lenient about short input: it decodes as many whole samples
//! as the buffer holds and reports how many that was.

use serde::{Deserialize, Serialize};

/// Significant bits per stored sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitDepth {
    /// 10 bits per sample (0..=1023)
    Ten,
    /// 12 bits per sample (0..=4095)
    Twelve,
}

impl BitDepth {
    /// Number of significant bits
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Ten => 10,
            Self::Twelve => 12,
        }
    }

    /// Largest representable sample value
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::Ten => 0x3FF,
            Self::Twelve => 0xFFF,
        }
    }

    /// Bytes needed to pack `samples` values at this depth
    #[must_use]
    pub const fn packed_len(self, samples: usize) -> usize {
        match self {
            Self::Ten => (samples * 10 + 7) / 8,
            Self::Twelve => (samples * 3 + 1) / 2,
        }
    }
}

/// Little-endian bit accumulator
///
/// Bits enter at the top of the filled region and leave from the bottom,
/// one byte or one sample at a time. The register never holds more than
/// 8 + 10 bits while packing or unpacking 10-bit samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitAccumulator {
    register: u32,
    count: u32,
}

impl BitAccumulator {
    /// Empty accumulator
    #[must_use]
    pub const fn new() -> Self {
        Self {
            register: 0,
            count: 0,
        }
    }

    /// Number of valid bits held
    #[must_use]
    pub const fn bit_count(&self) -> u32 {
        self.count
    }

    /// Append the low `width` bits of `value`
    pub fn push(&mut self, value: u32, width: u32) {
        debug_assert!(self.count + width <= 32);
        let mask = (1u32 << width) - 1;
        self.register |= (value & mask) << self.count;
        self.count += width;
    }

    /// Remove and return the low `width` bits, if that many are held
    pub fn take(&mut self, width: u32) -> Option<u32> {
        if self.count < width {
            return None;
        }
        let mask = (1u32 << width) - 1;
        let value = self.register & mask;
        self.register >>= width;
        self.count -= width;
        Some(value)
    }

    /// Remove the remaining bits as a zero-padded byte
    pub fn drain_partial(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let byte = (self.register & 0xFF) as u8;
        self.register = 0;
        self.count = 0;
        Some(byte)
    }
}

/// Pack samples at `depth` into `dst`, returning the number of bytes written
///
/// # Panics
///
/// Panics if `dst` is shorter than [`BitDepth::packed_len`] for `src`
pub fn pack(depth: BitDepth, src: &[u16], dst: &mut [u8]) -> usize {
    match depth {
        BitDepth::Ten => pack_10bit(src, dst),
        BitDepth::Twelve => pack_12bit(src, dst),
    }
}

/// Unpack samples at `depth` from `src`, returning the number of samples
/// decoded
///
/// Decoding stops at `dst.len()` samples or when `src` runs out of whole
/// samples, whichever comes first.
pub fn unpack(depth: BitDepth, src: &[u8], dst: &mut [u16]) -> usize {
    match depth {
        BitDepth::Ten => unpack_10bit(src, dst),
        BitDepth::Twelve => unpack_12bit(src, dst),
    }
}

/// Pack 10-bit samples as a little-endian bit stream
///
/// # Panics
///
/// Panics if `dst` is shorter than `ceil(src.len() * 10 / 8)`
pub fn pack_10bit(src: &[u16], dst: &mut [u8]) -> usize {
    let packed_len = BitDepth::Ten.packed_len(src.len());
    assert!(
        dst.len() >= packed_len,
        "pack buffer too small: {} < {packed_len}",
        dst.len()
    );

    let mut acc = BitAccumulator::new();
    let mut out = 0;
    for &sample in src {
        acc.push(u32::from(sample), 10);
        while let Some(byte) = acc.take(8) {
            dst[out] = byte as u8;
            out += 1;
        }
    }
    if let Some(byte) = acc.drain_partial() {
        dst[out] = byte;
        out += 1;
    }

    debug_assert_eq!(out, packed_len);
    out
}

/// Unpack a 10-bit little-endian bit stream
pub fn unpack_10bit(src: &[u8], dst: &mut [u16]) -> usize {
    let mut acc = BitAccumulator::new();
    let mut bytes = src.iter();
    let mut decoded = 0;

    while decoded < dst.len() {
        while acc.bit_count() < 10 {
            match bytes.next() {
                Some(&byte) => acc.push(u32::from(byte), 8),
                None => return decoded,
            }
        }
        if let Some(sample) = acc.take(10) {
            dst[decoded] = sample as u16;
            decoded += 1;
        }
    }

    decoded
}

/// Pack 12-bit samples, two samples per three bytes
///
/// # Panics
///
/// Panics if `dst` is shorter than `ceil(src.len() * 3 / 2)`
pub fn pack_12bit(src: &[u16], dst: &mut [u8]) -> usize {
    let packed_len = BitDepth::Twelve.packed_len(src.len());
    assert!(
        dst.len() >= packed_len,
        "pack buffer too small: {} < {packed_len}",
        dst.len()
    );

    let mut pairs = src.chunks_exact(2);
    let mut out = 0;
    for pair in pairs.by_ref() {
        let a = pair[0] & 0xFFF;
        let b = pair[1] & 0xFFF;
        dst[out] = (a >> 4) as u8;
        dst[out + 1] = (((a & 0xF) << 4) | (b >> 8)) as u8;
        dst[out + 2] = (b & 0xFF) as u8;
        out += 3;
    }
    if let &[a] = pairs.remainder() {
        let a = a & 0xFFF;
        dst[out] = (a >> 4) as u8;
        dst[out + 1] = ((a & 0xF) << 4) as u8;
        out += 2;
    }

    out
}

/// Unpack 12-bit samples stored two per three bytes
pub fn unpack_12bit(src: &[u8], dst: &mut [u16]) -> usize {
    let mut decoded = 0;
    let mut pos = 0;

    while decoded < dst.len() && pos + 3 <= src.len() {
        let (b0, b1, b2) = (
            u16::from(src[pos]),
            u16::from(src[pos + 1]),
            u16::from(src[pos + 2]),
        );
        pos += 3;

        dst[decoded] = (b0 << 4) | (b1 >> 4);
        decoded += 1;
        if decoded < dst.len() {
            dst[decoded] = ((b1 & 0xF) << 8) | b2;
            decoded += 1;
        }
    }

    // Odd trailing sample
    if decoded < dst.len() && pos + 2 <= src.len() {
        dst[decoded] = (u16::from(src[pos]) << 4) | (u16::from(src[pos + 1]) >> 4);
        decoded += 1;
    }

    decoded
}
