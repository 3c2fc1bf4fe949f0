use std::collections::BTreeMap;

/// Number of power-of-two buckets in the candidate size histogram.
/// Bucket `i` counts candidates of up to `2^i` bits; bucket 0 holds 0..=1.
pub const SIZE_BUCKETS: usize = 16;

/// Compression-ratio bookkeeping for one compressor instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    pub blocks: u64,
    pub compressed_blocks: u64,
    pub uncompressed_blocks: u64,
    /// Sum of raw block sizes in bytes.
    pub raw_bytes: u64,
    /// Sum of stored sizes in bytes (compressed size, or raw size on fallback).
    pub stored_bytes: u64,
    /// Histogram of best candidate sizes, bucketed by `ceil(log2(bits))`.
    pub size_histogram: [u64; SIZE_BUCKETS],
    /// How often each encoding pattern was chosen.
    pub patterns: BTreeMap<&'static str, u64>,
}

impl CompressionStats {
    pub fn record_block(&mut self, raw_len: usize, stored_len: usize, candidate_bits: usize, compressed: bool) {
        self.blocks += 1;
        if compressed {
            self.compressed_blocks += 1;
        } else {
            self.uncompressed_blocks += 1;
        }
        self.raw_bytes += raw_len as u64;
        self.stored_bytes += stored_len as u64;
        self.size_histogram[size_bucket(candidate_bits)] += 1;
    }

    pub fn record_pattern(&mut self, name: &'static str) {
        *self.patterns.entry(name).or_insert(0) += 1;
    }

    /// Raw / stored ratio; 1.0 before any block has been seen.
    pub fn ratio(&self) -> f64 {
        if self.stored_bytes == 0 {
            return 1.0;
        }
        self.raw_bytes as f64 / self.stored_bytes as f64
    }

    pub fn merge(&mut self, other: &CompressionStats) {
        self.blocks += other.blocks;
        self.compressed_blocks += other.compressed_blocks;
        self.uncompressed_blocks += other.uncompressed_blocks;
        self.raw_bytes += other.raw_bytes;
        self.stored_bytes += other.stored_bytes;
        for (dst, src) in self.size_histogram.iter_mut().zip(other.size_histogram.iter()) {
            *dst += src;
        }
        for (name, count) in &other.patterns {
            *self.patterns.entry(*name).or_insert(0) += count;
        }
    }
}

fn size_bucket(bits: usize) -> usize {
    let bucket = if bits <= 1 {
        0
    } else {
        (usize::BITS - (bits - 1).leading_zeros()) as usize
    };
    bucket.min(SIZE_BUCKETS - 1)
}
