use linepack_core::bits::{BitReader, BitWriter};
use linepack_core::config::{BaseParams, CompressorConfig, CpackConfig, DictionaryScope};
use linepack_core::format::COMPRESSOR_CPACK;
use linepack_core::{BlockMeta, CompressedBlock, CompressionError, CompressionStats, Compressor};

use crate::dictionary::Dictionary;
use crate::patterns::{ChunkLayout, PatternSet};

/// Dictionary compressor in the style of C-Pack.
///
/// The block is scanned in `chunk_size`-byte words. Each word is encoded as
/// a dictionary reference when it was seen before, or by the smallest
/// matching pattern otherwise; literals and dictionary-relative deltas then
/// become new dictionary bases. The output is the bare code stream.
///
/// With [`DictionaryScope::Instance`] the dictionary outlives the block, so
/// every compressed block carries a snapshot of the dictionary it started
/// from in its sidecar. Decoding replays the same inserts on a private copy
/// of that snapshot and never reads the live dictionary.
///
/// The snapshot is not part of the compressed size. A full dictionary costs
/// `12 + 8 * dictionary_size` bytes per line (524 bytes with the defaults),
/// so a LINEPACK1 file of instance-scoped lines can be larger than the raw
/// image even when every payload shrinks. [`DictionaryScope::Block`] lines
/// carry no snapshot.
pub struct CPack {
    params: BaseParams,
    chunk_size: usize,
    scope: DictionaryScope,
    dictionary: Dictionary,
    layout: ChunkLayout,
    patterns: PatternSet,
    stats: CompressionStats,
}

impl CPack {
    pub fn new(config: &CpackConfig) -> Result<Self, CompressionError> {
        CompressorConfig::Cpack(config.clone()).validate()?;
        let dictionary = Dictionary::new(config.dictionary_size())?;
        Ok(Self {
            params: config.base.params(),
            chunk_size: config.chunk_size,
            scope: config.dictionary_scope,
            layout: ChunkLayout::new(config.chunk_size, &dictionary),
            dictionary,
            patterns: PatternSet::default(),
            stats: CompressionStats::default(),
        })
    }

    /// The live dictionary, as left by the last `compress` call.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    fn chunk_value(&self, chunk: &[u8]) -> u64 {
        let mut word = [0u8; 8];
        word[..self.chunk_size].copy_from_slice(chunk);
        u64::from_le_bytes(word)
    }

    fn starting_dictionary(&self, meta: &BlockMeta) -> Result<Dictionary, CompressionError> {
        if meta.sidecar.is_empty() {
            return Dictionary::new(self.dictionary.capacity());
        }
        let dictionary = Dictionary::from_bytes(&meta.sidecar)?;
        if dictionary.capacity() != self.dictionary.capacity() {
            return Err(CompressionError::malformed(format!(
                "dictionary snapshot has {} slots, compressor has {}",
                dictionary.capacity(),
                self.dictionary.capacity()
            )));
        }
        Ok(dictionary)
    }
}

impl Compressor for CPack {
    fn id(&self) -> u16 {
        COMPRESSOR_CPACK
    }

    fn name(&self) -> &'static str {
        "cpack"
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
        if self.scope == DictionaryScope::Block {
            self.dictionary.reset();
        }
        let sidecar = match self.scope {
            DictionaryScope::Instance => self.dictionary.to_bytes(),
            DictionaryScope::Block => Vec::new(),
        };

        // Work on a copy and commit once the whole block is encoded.
        let mut dictionary = self.dictionary.clone();
        let mut writer = BitWriter::new();
        let mut chosen = Vec::with_capacity(block.len() / self.chunk_size);

        for chunk in block.chunks_exact(self.chunk_size) {
            let value = self.chunk_value(chunk);
            let (encoder, m) = self.patterns.select(value, &self.layout, &dictionary);
            encoder.encode(&m, &self.layout, &mut writer);
            if encoder.inserts_base() {
                dictionary.insert(value);
            }
            chosen.push(encoder.name());
        }

        self.dictionary = dictionary;
        for name in chosen {
            self.stats.record_pattern(name);
        }

        let bit_len = writer.bits_written();
        Ok(Some(CompressedBlock {
            compressor_id: COMPRESSOR_CPACK,
            payload: writer.finish(),
            bit_len,
            meta: BlockMeta { sidecar },
        }))
    }

    fn decode(&self, compressed: &CompressedBlock) -> Result<Vec<u8>, CompressionError> {
        if compressed.payload.len() != compressed.size_bytes() {
            return Err(CompressionError::malformed(format!(
                "{} payload bytes for a {}-bit stream",
                compressed.payload.len(),
                compressed.bit_len
            )));
        }
        let mut dictionary = self.starting_dictionary(&compressed.meta)?;
        let mut reader = BitReader::new(&compressed.payload, compressed.bit_len)?;
        let mut block = Vec::with_capacity(self.params.block_size);

        for _ in 0..self.params.block_size / self.chunk_size {
            let encoder = self.patterns.read_code(&mut reader)?;
            let value = encoder.decode(&mut reader, &self.layout, &dictionary)?;
            if encoder.inserts_base() {
                dictionary.insert(value);
            }
            block.extend_from_slice(&value.to_le_bytes()[..self.chunk_size]);
        }

        if reader.remaining() != 0 {
            return Err(CompressionError::malformed(format!(
                "{} trailing bits after the last chunk",
                reader.remaining()
            )));
        }
        Ok(block)
    }
}
