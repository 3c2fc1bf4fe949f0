use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace};

use crate::config::BaseParams;
use crate::error::{CompressionError, Result};
use crate::stats::CompressionStats;

/// Per-block sidecar metadata written by the compressor and handed back on
/// decompress.
///
/// For BDI this is always empty. For CPack it carries a snapshot of the
/// dictionary as it stood when the block was compressed, which makes every
/// block decodable without the compressor's live dictionary.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    pub sidecar: Vec<u8>,
}

/// A block in compressed form: the packed bitstream plus its exact length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    /// Id of the compressor that produced the stream.
    pub compressor_id: u16,
    pub payload: Vec<u8>,
    /// Meaningful bits in `payload`; the rest of the last byte is padding.
    pub bit_len: usize,
    pub meta: BlockMeta,
}

impl CompressedBlock {
    /// Achieved size, rounded up to whole bytes.
    pub fn size_bytes(&self) -> usize {
        self.bit_len.div_ceil(8)
    }
}

/// How a block is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Compression did not pay off; the raw bytes are kept verbatim.
    Uncompressed(Vec<u8>),
    Compressed(CompressedBlock),
}

impl Representation {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Representation::Compressed(_))
    }
}

/// Outcome of compressing one block, returned to the cache controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionResult {
    pub representation: Representation,
    /// True when the best candidate was strictly smaller than `size_threshold`.
    pub fits_under_threshold: bool,
    /// Stored size in bytes: the compressed size, or `block_size` on fallback.
    pub size_bytes: usize,
    /// Bit length of the best candidate, or `block_size * 8` if none exists.
    pub compressed_bits: usize,
}

/// Shared contract of every cache-line compressor.
///
/// Variants implement [`encode`](Compressor::encode) and
/// [`decode`](Compressor::decode); the provided [`compress`](Compressor::compress)
/// and [`decompress`](Compressor::decompress) wrap them with size validation,
/// the threshold decision, and statistics.
///
/// Calls on one instance must be serialized. Wrap the compressor in a
/// [`SharedCompressor`] when several threads need it.
pub trait Compressor: Send + Sync {
    /// Stable id stored in LINEPACK1 headers.
    fn id(&self) -> u16;

    fn name(&self) -> &'static str;

    fn params(&self) -> BaseParams;

    fn stats(&self) -> &CompressionStats;

    fn stats_mut(&mut self) -> &mut CompressionStats;

    /// Produce the best compressed candidate for `block`, or `None` when the
    /// variant has no encoding for it. `block` is already `block_size` long.
    ///
    /// May update internal state such as a dictionary.
    fn encode(&mut self, block: &[u8]) -> Result<Option<CompressedBlock>>;

    /// Invert [`encode`](Compressor::encode). Must not touch internal state.
    fn decode(&self, compressed: &CompressedBlock) -> Result<Vec<u8>>;

    /// Compress one block and decide whether the compressed form is kept.
    ///
    /// Fails only with `InvalidBlockSize`; a block that does not compress well
    /// enough comes back as [`Representation::Uncompressed`].
    fn compress(&mut self, block: &[u8]) -> Result<CompressionResult> {
        let params = self.params();
        if block.len() != params.block_size {
            return Err(CompressionError::InvalidBlockSize {
                expected: params.block_size,
                actual: block.len(),
            });
        }

        let candidate = self.encode(block)?;
        let compressed_bits = candidate
            .as_ref()
            .map_or(params.block_size * 8, |c| c.bit_len);

        let result = match candidate {
            Some(c) if c.size_bytes() < params.size_threshold => CompressionResult {
                size_bytes: c.size_bytes(),
                representation: Representation::Compressed(c),
                fits_under_threshold: true,
                compressed_bits,
            },
            _ => {
                debug!(
                    "{}: {} candidate bits do not fit under {} bytes, storing raw",
                    self.name(),
                    compressed_bits,
                    params.size_threshold
                );
                CompressionResult {
                    representation: Representation::Uncompressed(block.to_vec()),
                    fits_under_threshold: false,
                    size_bytes: params.block_size,
                    compressed_bits,
                }
            }
        };

        trace!(
            "{}: block stored in {} bytes ({} candidate bits)",
            self.name(),
            result.size_bytes,
            compressed_bits
        );
        self.stats_mut().record_block(
            params.block_size,
            result.size_bytes,
            compressed_bits,
            result.fits_under_threshold,
        );
        Ok(result)
    }

    /// Reconstruct the original block.
    fn decompress(&self, representation: &Representation) -> Result<Vec<u8>> {
        let block_size = self.params().block_size;
        let raw = match representation {
            Representation::Uncompressed(raw) => raw.clone(),
            Representation::Compressed(c) => {
                if c.compressor_id != self.id() {
                    return Err(CompressionError::malformed(format!(
                        "block was produced by compressor {} but {} has id {}",
                        c.compressor_id,
                        self.name(),
                        self.id()
                    )));
                }
                self.decode(c)?
            }
        };
        if raw.len() != block_size {
            return Err(CompressionError::malformed(format!(
                "decoded {} bytes, expected a {}-byte block",
                raw.len(),
                block_size
            )));
        }
        Ok(raw)
    }
}

/// A compressor behind a single mutex, for hosts that call it from several
/// threads. Each `compress` holds the lock for the whole call, so dictionary
/// lookup and insert stay atomic with respect to other callers.
#[derive(Clone)]
pub struct SharedCompressor {
    inner: Arc<Mutex<Box<dyn Compressor>>>,
}

impl SharedCompressor {
    pub fn new(compressor: Box<dyn Compressor>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(compressor)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Compressor>> {
        // A panic mid-call cannot leave a half-applied dictionary update:
        // compressors commit state only after a block is fully encoded.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn compress(&self, block: &[u8]) -> Result<CompressionResult> {
        self.lock().compress(block)
    }

    pub fn decompress(&self, representation: &Representation) -> Result<Vec<u8>> {
        self.lock().decompress(representation)
    }

    pub fn stats(&self) -> CompressionStats {
        self.lock().stats().clone()
    }
}
