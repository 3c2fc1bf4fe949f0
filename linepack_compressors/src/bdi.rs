use linepack_core::bits::{fits_signed, low_mask, sign_extend, BitReader, BitWriter};
use linepack_core::config::{BaseParams, BdiConfig, CompressorConfig};
use linepack_core::format::COMPRESSOR_BDI;
use linepack_core::{BlockMeta, CompressedBlock, CompressionError, CompressionStats, Compressor};

/// Width of the encoding id at the head of every BDI stream.
const HEADER_BITS: u32 = 4;

/// One BDI encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BdiEncoding {
    /// Every byte is zero.
    Zero,
    /// Every 8-byte word holds the same value.
    Repeated,
    /// One explicit base plus one delta per `base_bytes` segment; each
    /// segment may instead be an immediate relative to an implicit zero base.
    BaseDelta { base_bytes: usize, delta_bits: u32 },
}

/// Base/delta candidates in id order. Base-size 1 pairs with a nibble delta,
/// the only width narrower than one byte.
const BASE_DELTA: [(usize, u32); 7] = [(1, 4), (2, 8), (4, 8), (4, 16), (8, 8), (8, 16), (8, 32)];

/// How much of the candidate space a search covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBreadth {
    /// Every (base, delta) combination.
    All,
    /// Only the narrowest delta for each base size.
    NarrowestDelta,
}

impl SearchBreadth {
    pub fn from_use_more_compressors(use_more: bool) -> Self {
        if use_more {
            SearchBreadth::All
        } else {
            SearchBreadth::NarrowestDelta
        }
    }
}

impl BdiEncoding {
    fn id(&self) -> u64 {
        match self {
            BdiEncoding::Zero => 0,
            BdiEncoding::Repeated => 1,
            BdiEncoding::BaseDelta { base_bytes, delta_bits } => {
                let pos = BASE_DELTA
                    .iter()
                    .position(|&(b, d)| b == *base_bytes && d == *delta_bits)
                    .unwrap_or(BASE_DELTA.len());
                2 + pos as u64
            }
        }
    }

    fn from_id(id: u64) -> Option<Self> {
        match id {
            0 => Some(BdiEncoding::Zero),
            1 => Some(BdiEncoding::Repeated),
            n => BASE_DELTA
                .get(n as usize - 2)
                .map(|&(base_bytes, delta_bits)| BdiEncoding::BaseDelta { base_bytes, delta_bits }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BdiEncoding::Zero => "zero",
            BdiEncoding::Repeated => "repeated",
            BdiEncoding::BaseDelta { base_bytes, delta_bits } => match (base_bytes, delta_bits) {
                (1, 4) => "base1_delta4",
                (2, 8) => "base2_delta8",
                (4, 8) => "base4_delta8",
                (4, 16) => "base4_delta16",
                (8, 8) => "base8_delta8",
                (8, 16) => "base8_delta16",
                _ => "base8_delta32",
            },
        }
    }

    /// Encoded size for a block of `block_size` bytes.
    pub fn bits(&self, block_size: usize) -> usize {
        let header = HEADER_BITS as usize;
        match self {
            BdiEncoding::Zero => header,
            BdiEncoding::Repeated => header + 64,
            BdiEncoding::BaseDelta { base_bytes, delta_bits } => {
                let segments = block_size / base_bytes;
                header + base_bytes * 8 + segments * (*delta_bits as usize + 1)
            }
        }
    }

    /// Tie-break key: smaller size, then smaller base, then smaller delta.
    fn rank(&self, block_size: usize) -> (usize, usize, u32) {
        let (base, delta) = match self {
            BdiEncoding::Zero => (0, 0),
            BdiEncoding::Repeated => (8, 0),
            BdiEncoding::BaseDelta { base_bytes, delta_bits } => (*base_bytes, *delta_bits),
        };
        (self.bits(block_size), base, delta)
    }

    /// Candidates covered by `breadth`, in no particular order.
    pub fn candidates(breadth: SearchBreadth) -> Vec<BdiEncoding> {
        let mut all = vec![BdiEncoding::Zero, BdiEncoding::Repeated];
        let mut last_base = 0;
        for &(base_bytes, delta_bits) in &BASE_DELTA {
            // BASE_DELTA lists each base's narrowest delta first.
            if breadth == SearchBreadth::NarrowestDelta && base_bytes == last_base {
                continue;
            }
            last_base = base_bytes;
            all.push(BdiEncoding::BaseDelta { base_bytes, delta_bits });
        }
        all
    }
}

fn segment_values(block: &[u8], width: usize) -> impl Iterator<Item = u64> + '_ {
    block.chunks_exact(width).map(move |seg| {
        let mut word = [0u8; 8];
        word[..width].copy_from_slice(seg);
        u64::from_le_bytes(word)
    })
}

/// Base-Delta-Immediate compressor.
pub struct Bdi {
    params: BaseParams,
    breadth: SearchBreadth,
    stats: CompressionStats,
}

impl Bdi {
    pub fn new(config: &BdiConfig) -> Result<Self, CompressionError> {
        CompressorConfig::Bdi(config.clone()).validate()?;
        Ok(Self {
            params: config.base.params(),
            breadth: SearchBreadth::from_use_more_compressors(config.use_more_compressors),
            stats: CompressionStats::default(),
        })
    }

    pub fn breadth(&self) -> SearchBreadth {
        self.breadth
    }

    /// Find the smallest encoding of `block` among the candidates `breadth`
    /// allows. Candidates are tried cheapest first, so the first success is
    /// the answer.
    pub fn search(block: &[u8], breadth: SearchBreadth) -> Option<(BdiEncoding, BitWriter)> {
        let mut candidates = BdiEncoding::candidates(breadth);
        candidates.retain(|c| match c {
            BdiEncoding::BaseDelta { base_bytes, .. } => block.len() % base_bytes == 0,
            _ => block.len() % 8 == 0,
        });
        candidates.sort_by_key(|c| c.rank(block.len()));
        candidates
            .into_iter()
            .find_map(|c| try_encode(block, c).map(|w| (c, w)))
    }
}

fn try_encode(block: &[u8], encoding: BdiEncoding) -> Option<BitWriter> {
    let mut writer = BitWriter::new();
    writer.write_bits(encoding.id(), HEADER_BITS);
    match encoding {
        BdiEncoding::Zero => block.iter().all(|&b| b == 0).then_some(writer),
        BdiEncoding::Repeated => {
            let mut words = segment_values(block, 8);
            let first = words.next()?;
            if !words.all(|w| w == first) {
                return None;
            }
            writer.write_bits(first, 64);
            Some(writer)
        }
        BdiEncoding::BaseDelta { base_bytes, delta_bits } => {
            let width = base_bytes as u32 * 8;
            let mask = low_mask(width);
            let delta_mask = low_mask(delta_bits);
            let is_immediate = |v: u64| fits_signed(sign_extend(v, width), delta_bits);

            let base = segment_values(block, base_bytes)
                .find(|&v| !is_immediate(v))
                .unwrap_or(0);
            writer.write_bits(base, width);

            for value in segment_values(block, base_bytes) {
                if is_immediate(value) {
                    writer.write_bit(false);
                    writer.write_bits(value & delta_mask, delta_bits);
                    continue;
                }
                let delta = sign_extend(value.wrapping_sub(base) & mask, width);
                if !fits_signed(delta, delta_bits) {
                    return None;
                }
                writer.write_bit(true);
                writer.write_bits(delta as u64 & delta_mask, delta_bits);
            }
            Some(writer)
        }
    }
}

impl Compressor for Bdi {
    fn id(&self) -> u16 {
        COMPRESSOR_BDI
    }

    fn name(&self) -> &'static str {
        "bdi"
    }

    fn params(&self) -> BaseParams {
        self.params
    }

    fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut CompressionStats {
        &mut self.stats
    }

    fn encode(&mut self, block: &[u8]) -> Result<Option<CompressedBlock>, CompressionError> {
        let Some((encoding, writer)) = Bdi::search(block, self.breadth) else {
            self.stats.record_pattern("uncompressed");
            return Ok(None);
        };
        self.stats.record_pattern(encoding.name());
        let bit_len = writer.bits_written();
        Ok(Some(CompressedBlock {
            compressor_id: COMPRESSOR_BDI,
            payload: writer.finish(),
            bit_len,
            meta: BlockMeta::default(),
        }))
    }

    fn decode(&self, compressed: &CompressedBlock) -> Result<Vec<u8>, CompressionError> {
        let block_size = self.params.block_size;
        let mut reader = BitReader::new(&compressed.payload, compressed.bit_len)?;
        let id = reader.read_bits(HEADER_BITS)?;
        let encoding = BdiEncoding::from_id(id)
            .ok_or_else(|| CompressionError::malformed(format!("unknown BDI encoding {}", id)))?;

        let mut block = Vec::with_capacity(block_size);
        match encoding {
            BdiEncoding::Zero => block.resize(block_size, 0),
            BdiEncoding::Repeated => {
                let word = reader.read_bits(64)?.to_le_bytes();
                for _ in 0..block_size / 8 {
                    block.extend_from_slice(&word);
                }
            }
            BdiEncoding::BaseDelta { base_bytes, delta_bits } => {
                let width = base_bytes as u32 * 8;
                let base = reader.read_bits(width)?;
                for _ in 0..block_size / base_bytes {
                    let explicit = reader.read_bit()?;
                    let delta = sign_extend(reader.read_bits(delta_bits)?, delta_bits) as u64;
                    let value = if explicit { base.wrapping_add(delta) } else { delta };
                    let value = value & low_mask(width);
                    block.extend_from_slice(&value.to_le_bytes()[..base_bytes]);
                }
            }
        }

        if reader.remaining() != 0 {
            return Err(CompressionError::malformed(format!(
                "{} trailing bits after {} payload",
                reader.remaining(),
                encoding.name()
            )));
        }
        Ok(block)
    }
}
