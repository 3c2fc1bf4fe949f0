//! Per-chunk encoding rules for the dictionary compressor.
//!
//! Each encoder recognises one structural pattern in a chunk (a little-endian
//! word of `chunk_size` bytes) and owns a prefix code. The codes form a
//! complete prefix-free set, written most significant bit first:
//!
//! ```text
//! 0      zero chunk
//! 10     exact dictionary match        + index
//! 1100   one repeated byte             + byte
//! 1101   narrow delta from zero        + 8-bit delta
//! 11100  narrow delta from dictionary  + index + 8-bit delta
//! 11101  half-width delta from dict.   + index + W/2-bit delta
//! 11110  half-width delta from zero    + W/2-bit delta
//! 11111  literal                       + W bits
//! ```

use linepack_core::bits::{fits_signed, low_mask, sign_extend, BitReader, BitWriter};
use linepack_core::CompressionError;

use crate::dictionary::Dictionary;

/// Longest code in the table above.
const MAX_CODE_LEN: u32 = 5;

/// Narrow delta width, independent of the chunk size.
const NARROW_DELTA_BITS: u32 = 8;

/// Geometry shared by every encoder for one compressor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    /// Chunk width in bits.
    pub width: u32,
    /// Bits per dictionary index.
    pub index_bits: u32,
}

impl ChunkLayout {
    pub fn new(chunk_size: usize, dictionary: &Dictionary) -> Self {
        Self {
            width: chunk_size as u32 * 8,
            index_bits: dictionary.index_bits(),
        }
    }
}

/// What an encoder needs to write a matched chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub index: Option<usize>,
    pub payload: u64,
}

impl PatternMatch {
    fn bare(payload: u64) -> Self {
        Self { index: None, payload }
    }
}

/// One encoding rule.
pub trait PatternEncoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prefix code and its length in bits.
    fn code(&self) -> (u32, u32);

    /// Payload bits following the code, index included.
    fn payload_bits(&self, layout: &ChunkLayout) -> u32;

    fn encoded_bits(&self, layout: &ChunkLayout) -> u32 {
        self.code().1 + self.payload_bits(layout)
    }

    fn matches(&self, chunk: u64, layout: &ChunkLayout, dictionary: &Dictionary) -> Option<PatternMatch>;

    /// Payload width only; the index, if any, is written first.
    fn data_bits(&self, layout: &ChunkLayout) -> u32 {
        self.payload_bits(layout) - if self.uses_index() { layout.index_bits } else { 0 }
    }

    fn uses_index(&self) -> bool {
        false
    }

    /// Whether the encoded chunk becomes a new dictionary base.
    fn inserts_base(&self) -> bool {
        false
    }

    fn encode(&self, m: &PatternMatch, layout: &ChunkLayout, writer: &mut BitWriter) {
        let (code, len) = self.code();
        writer.write_code(code, len);
        if let Some(index) = m.index {
            writer.write_bits(index as u64, layout.index_bits);
        }
        writer.write_bits(m.payload, self.data_bits(layout));
    }

    /// Read everything after the code and rebuild the chunk value.
    fn decode(
        &self,
        reader: &mut BitReader<'_>,
        layout: &ChunkLayout,
        dictionary: &Dictionary,
    ) -> Result<u64, CompressionError>;
}

fn read_base(
    reader: &mut BitReader<'_>,
    layout: &ChunkLayout,
    dictionary: &Dictionary,
) -> Result<u64, CompressionError> {
    let index = reader.read_bits(layout.index_bits)? as usize;
    dictionary.get(index).ok_or_else(|| {
        CompressionError::malformed(format!(
            "dictionary index {} out of range ({} entries)",
            index,
            dictionary.len()
        ))
    })
}

// ── Encoders ────────────────────────────────────────────────────────────────

pub struct ZeroRun;

impl PatternEncoder for ZeroRun {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn code(&self) -> (u32, u32) {
        (0b0, 1)
    }

    fn payload_bits(&self, _layout: &ChunkLayout) -> u32 {
        0
    }

    fn matches(&self, chunk: u64, _layout: &ChunkLayout, _dictionary: &Dictionary) -> Option<PatternMatch> {
        (chunk == 0).then(|| PatternMatch::bare(0))
    }

    fn decode(&self, _reader: &mut BitReader<'_>, _layout: &ChunkLayout, _dictionary: &Dictionary) -> Result<u64, CompressionError> {
        Ok(0)
    }
}

pub struct DictionaryMatch;

impl PatternEncoder for DictionaryMatch {
    fn name(&self) -> &'static str {
        "dictionary_match"
    }

    fn code(&self) -> (u32, u32) {
        (0b10, 2)
    }

    fn payload_bits(&self, layout: &ChunkLayout) -> u32 {
        layout.index_bits
    }

    fn uses_index(&self) -> bool {
        true
    }

    fn matches(&self, chunk: u64, _layout: &ChunkLayout, dictionary: &Dictionary) -> Option<PatternMatch> {
        dictionary.lookup(chunk).map(|index| PatternMatch {
            index: Some(index),
            payload: 0,
        })
    }

    fn decode(&self, reader: &mut BitReader<'_>, layout: &ChunkLayout, dictionary: &Dictionary) -> Result<u64, CompressionError> {
        read_base(reader, layout, dictionary)
    }
}

/// Every byte of the chunk holds the same value.
pub struct RepeatedValue;

impl PatternEncoder for RepeatedValue {
    fn name(&self) -> &'static str {
        "repeated_byte"
    }

    fn code(&self) -> (u32, u32) {
        (0b1100, 4)
    }

    fn payload_bits(&self, _layout: &ChunkLayout) -> u32 {
        8
    }

    fn matches(&self, chunk: u64, layout: &ChunkLayout, _dictionary: &Dictionary) -> Option<PatternMatch> {
        let byte = chunk & 0xFF;
        (splat(byte, layout.width) == chunk).then(|| PatternMatch::bare(byte))
    }

    fn decode(&self, reader: &mut BitReader<'_>, layout: &ChunkLayout, _dictionary: &Dictionary) -> Result<u64, CompressionError> {
        Ok(splat(reader.read_bits(8)?, layout.width))
    }
}

fn splat(byte: u64, width: u32) -> u64 {
    (0x0101_0101_0101_0101u64 * byte) & low_mask(width)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaBase {
    Zero,
    Dictionary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaWidth {
    /// Eight bits.
    Narrow,
    /// Half the chunk width.
    Half,
}

/// The chunk equals a base plus a two's-complement delta narrower than the
/// chunk itself.
pub struct BaseDelta {
    pub base: DeltaBase,
    pub width: DeltaWidth,
}

impl BaseDelta {
    fn delta_bits(&self, layout: &ChunkLayout) -> u32 {
        match self.width {
            DeltaWidth::Narrow => NARROW_DELTA_BITS,
            DeltaWidth::Half => layout.width / 2,
        }
    }
}

impl PatternEncoder for BaseDelta {
    fn name(&self) -> &'static str {
        match (self.base, self.width) {
            (DeltaBase::Zero, DeltaWidth::Narrow) => "zero_base_narrow",
            (DeltaBase::Zero, DeltaWidth::Half) => "zero_base_half",
            (DeltaBase::Dictionary, DeltaWidth::Narrow) => "dictionary_narrow",
            (DeltaBase::Dictionary, DeltaWidth::Half) => "dictionary_half",
        }
    }

    fn code(&self) -> (u32, u32) {
        match (self.base, self.width) {
            (DeltaBase::Zero, DeltaWidth::Narrow) => (0b1101, 4),
            (DeltaBase::Dictionary, DeltaWidth::Narrow) => (0b11100, 5),
            (DeltaBase::Dictionary, DeltaWidth::Half) => (0b11101, 5),
            (DeltaBase::Zero, DeltaWidth::Half) => (0b11110, 5),
        }
    }

    fn payload_bits(&self, layout: &ChunkLayout) -> u32 {
        let index = if self.uses_index() { layout.index_bits } else { 0 };
        index + self.delta_bits(layout)
    }

    fn uses_index(&self) -> bool {
        self.base == DeltaBase::Dictionary
    }

    fn inserts_base(&self) -> bool {
        self.base == DeltaBase::Dictionary
    }

    fn matches(&self, chunk: u64, layout: &ChunkLayout, dictionary: &Dictionary) -> Option<PatternMatch> {
        let delta_bits = self.delta_bits(layout);
        let mask = low_mask(layout.width);
        let fits = |base: u64| {
            let delta = sign_extend(chunk.wrapping_sub(base) & mask, layout.width);
            fits_signed(delta, delta_bits).then_some(delta as u64 & low_mask(delta_bits))
        };
        match self.base {
            DeltaBase::Zero => fits(0).map(PatternMatch::bare),
            // Every entry costs the same, so the lowest index wins.
            DeltaBase::Dictionary => dictionary
                .entries()
                .iter()
                .enumerate()
                .find_map(|(index, &base)| {
                    fits(base).map(|payload| PatternMatch {
                        index: Some(index),
                        payload,
                    })
                }),
        }
    }

    fn decode(&self, reader: &mut BitReader<'_>, layout: &ChunkLayout, dictionary: &Dictionary) -> Result<u64, CompressionError> {
        let base = match self.base {
            DeltaBase::Zero => 0,
            DeltaBase::Dictionary => read_base(reader, layout, dictionary)?,
        };
        let delta_bits = self.delta_bits(layout);
        let delta = sign_extend(reader.read_bits(delta_bits)?, delta_bits);
        Ok(base.wrapping_add(delta as u64) & low_mask(layout.width))
    }
}

/// Fallback: the chunk verbatim. Always matches.
pub struct Literal;

impl PatternEncoder for Literal {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn code(&self) -> (u32, u32) {
        (0b11111, 5)
    }

    fn payload_bits(&self, layout: &ChunkLayout) -> u32 {
        layout.width
    }

    fn inserts_base(&self) -> bool {
        true
    }

    fn matches(&self, chunk: u64, _layout: &ChunkLayout, _dictionary: &Dictionary) -> Option<PatternMatch> {
        Some(PatternMatch::bare(chunk))
    }

    fn decode(&self, reader: &mut BitReader<'_>, layout: &ChunkLayout, _dictionary: &Dictionary) -> Result<u64, CompressionError> {
        reader.read_bits(layout.width)
    }
}

// ── Pattern set ─────────────────────────────────────────────────────────────

/// The full encoder family with its selection and code lookup rules.
pub struct PatternSet {
    dictionary_match: Box<dyn PatternEncoder>,
    /// Candidates in tie-break order.
    candidates: Vec<Box<dyn PatternEncoder>>,
}

impl Default for PatternSet {
    fn default() -> Self {
        Self {
            dictionary_match: Box::new(DictionaryMatch),
            candidates: vec![
                Box::new(ZeroRun),
                Box::new(RepeatedValue),
                Box::new(BaseDelta { base: DeltaBase::Zero, width: DeltaWidth::Narrow }),
                Box::new(BaseDelta { base: DeltaBase::Zero, width: DeltaWidth::Half }),
                Box::new(BaseDelta { base: DeltaBase::Dictionary, width: DeltaWidth::Narrow }),
                Box::new(BaseDelta { base: DeltaBase::Dictionary, width: DeltaWidth::Half }),
                Box::new(Literal),
            ],
        }
    }
}

impl PatternSet {
    /// Pick the encoding for `chunk`.
    ///
    /// An exact dictionary hit always wins. Otherwise the smallest matching
    /// candidate is chosen, earlier candidates winning ties.
    pub fn select(
        &self,
        chunk: u64,
        layout: &ChunkLayout,
        dictionary: &Dictionary,
    ) -> (&dyn PatternEncoder, PatternMatch) {
        if let Some(m) = self.dictionary_match.matches(chunk, layout, dictionary) {
            return (self.dictionary_match.as_ref(), m);
        }

        let mut best: Option<(&dyn PatternEncoder, PatternMatch, u32)> = None;
        for encoder in &self.candidates {
            let bits = encoder.encoded_bits(layout);
            if best.as_ref().is_some_and(|(_, _, best_bits)| bits >= *best_bits) {
                continue;
            }
            if let Some(m) = encoder.matches(chunk, layout, dictionary) {
                best = Some((encoder.as_ref(), m, bits));
            }
        }
        match best {
            Some((encoder, m, _)) => (encoder, m),
            // Literal is last and always matches.
            None => (&Literal, PatternMatch::bare(chunk)),
        }
    }

    fn all(&self) -> impl Iterator<Item = &Box<dyn PatternEncoder>> {
        std::iter::once(&self.dictionary_match).chain(self.candidates.iter())
    }

    /// Read one prefix code and return the encoder it names.
    pub fn read_code(&self, reader: &mut BitReader<'_>) -> Result<&dyn PatternEncoder, CompressionError> {
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN {
            code = (code << 1) | reader.read_bit()? as u32;
            if let Some(encoder) = self.all().find(|e| e.code() == (code, len)) {
                return Ok(encoder.as_ref());
            }
        }
        Err(CompressionError::malformed(format!("unknown pattern code {:#b}", code)))
    }
}
