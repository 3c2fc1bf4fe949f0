//! Bit-granular writer and reader for compressed line payloads.
//!
//! Fields are packed LSB-first into bytes. Prefix codes are written one bit
//! at a time, most significant bit first, so a decoder can walk a code table
//! bit by bit without knowing the code length up front.

use crate::error::{CompressionError, Result};

/// Sequential bit writer.
#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    bit_buffer: u128,
    bit_count: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the low `bits` bits of `value` (at most 64).
    pub fn write_bits(&mut self, value: u64, bits: u32) {
        debug_assert!(bits <= 64, "cannot write {bits} bits at once");
        if bits == 0 {
            return;
        }
        let masked = if bits == 64 { value } else { value & ((1u64 << bits) - 1) };
        self.bit_buffer |= (masked as u128) << self.bit_count;
        self.bit_count += bits;

        while self.bit_count >= 8 {
            self.buffer.push(self.bit_buffer as u8);
            self.bit_buffer >>= 8;
            self.bit_count -= 8;
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(bit as u64, 1);
    }

    /// Append a prefix code of `len` bits, most significant bit first.
    pub fn write_code(&mut self, code: u32, len: u32) {
        for i in (0..len).rev() {
            self.write_bit((code >> i) & 1 == 1);
        }
    }

    /// Number of bits written so far.
    pub fn bits_written(&self) -> usize {
        self.buffer.len() * 8 + self.bit_count as usize
    }

    /// Flush the partial trailing byte (zero padded) and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.buffer.push(self.bit_buffer as u8);
        }
        self.buffer
    }
}

/// Sequential bit reader bounded by an explicit bit length.
///
/// Reading past `bit_len` is a decode error, even if padding bits remain in
/// the last byte.
pub struct BitReader<'a> {
    data: &'a [u8],
    bit_len: usize,
    position: usize,
}

impl<'a> BitReader<'a> {
    /// Fails if `bit_len` claims more bits than `data` holds.
    pub fn new(data: &'a [u8], bit_len: usize) -> Result<Self> {
        if bit_len > data.len() * 8 {
            return Err(CompressionError::malformed(format!(
                "bit length {} exceeds payload of {} bytes",
                bit_len,
                data.len()
            )));
        }
        Ok(Self {
            data,
            bit_len,
            position: 0,
        })
    }

    /// Read `bits` bits (at most 64) as an unsigned value.
    pub fn read_bits(&mut self, bits: u32) -> Result<u64> {
        debug_assert!(bits <= 64, "cannot read {bits} bits at once");
        if bits as usize > self.remaining() {
            return Err(CompressionError::malformed(format!(
                "stream truncated: wanted {} bits at offset {}, {} left",
                bits,
                self.position,
                self.remaining()
            )));
        }
        let mut value = 0u64;
        for i in 0..bits {
            let pos = self.position + i as usize;
            let bit = (self.data[pos / 8] >> (pos % 8)) & 1;
            value |= (bit as u64) << i;
        }
        self.position += bits as usize;
        Ok(value)
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn remaining(&self) -> usize {
        self.bit_len - self.position
    }
}

/// Sign-extend the low `bits` bits of `value` to 64 bits.
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// True when `value` (a two's-complement quantity) is representable in
/// `bits` signed bits.
pub fn fits_signed(value: i64, bits: u32) -> bool {
    if bits >= 64 {
        return true;
    }
    if bits == 0 {
        return value == 0;
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&value)
}

/// Mask with the low `bits` bits set.
pub fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
