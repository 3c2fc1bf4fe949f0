use linepack_compressors::{Bdi, BdiEncoding, SearchBreadth};
use linepack_core::format::COMPRESSOR_BDI;
use linepack_core::{
    BaseConfig, BdiConfig, BlockMeta, CompressedBlock, CompressionError, Compressor, Representation,
};

fn bdi(block_size: usize, size_threshold: Option<usize>, use_more_compressors: bool) -> Bdi {
    Bdi::new(&BdiConfig {
        base: BaseConfig {
            block_size,
            size_threshold,
        },
        use_more_compressors,
    })
    .unwrap()
}

/// Eight 8-byte words one apart, far from zero.
fn sequential_words() -> Vec<u8> {
    (0..8u64)
        .flat_map(|i| (0x1122_3344_5566_7788u64 + i).to_le_bytes())
        .collect()
}

/// A pointer table: high half shared, low half stepping by 0x40.
fn pointer_table() -> Vec<u8> {
    (0..8u64)
        .flat_map(|i| (0x7fff_5a00_1000u64 + i * 0x40).to_le_bytes())
        .collect()
}

#[test]
fn zero_block_is_header_only() {
    let mut c = bdi(64, None, true);
    let result = c.compress(&[0u8; 64]).unwrap();
    assert_eq!(result.compressed_bits, 4);
    assert_eq!(result.size_bytes, 1);
    assert_eq!(c.stats().patterns["zero"], 1);
    assert_eq!(c.decompress(&result.representation).unwrap(), vec![0u8; 64]);
}

#[test]
fn zero_block_round_trips_at_every_block_size() {
    for block_size in [8, 32, 128] {
        for use_more_compressors in [true, false] {
            let mut c = bdi(block_size, None, use_more_compressors);
            let zeros = vec![0u8; block_size];
            let result = c.compress(&zeros).unwrap();
            assert!(result.fits_under_threshold, "block {block_size}");
            assert_eq!(result.compressed_bits, 4);
            assert_eq!(c.decompress(&result.representation).unwrap(), zeros);
        }
    }
}

#[test]
fn repeated_word_block() {
    let mut c = bdi(64, None, true);
    let block = 0xDEAD_BEEF_CAFE_BABEu64.to_le_bytes().repeat(8);
    let result = c.compress(&block).unwrap();
    assert_eq!(result.compressed_bits, 68);
    assert_eq!(result.size_bytes, 9);
    assert_eq!(c.stats().patterns["repeated"], 1);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn smallest_base_size_wins_on_narrow_values() {
    // With an 8-byte block, base-1/delta-4 (52 bits) beats base-4/delta-8
    // (54 bits) and every other candidate.
    let mut c = bdi(8, None, true);
    let block = [0x10, 0x11, 0x12, 0x13, 0x10, 0x11, 0x12, 0x13];
    let result = c.compress(&block).unwrap();
    assert!(result.fits_under_threshold);
    assert_eq!(result.compressed_bits, 52);
    assert_eq!(result.size_bytes, 7);
    assert_eq!(c.stats().patterns["base1_delta4"], 1);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn threshold_is_exclusive() {
    // Best candidate is base-8/delta-8: 4 + 64 + 8 * 9 = 140 bits = 18 bytes.
    let block = sequential_words();

    let at = bdi(64, Some(18), true).compress(&block).unwrap();
    assert_eq!(at.compressed_bits, 140);
    assert!(!at.fits_under_threshold, "18 bytes is not strictly below 18");
    assert_eq!(at.size_bytes, 64);
    assert_eq!(at.representation, Representation::Uncompressed(block.clone()));

    let above = bdi(64, Some(19), true).compress(&block).unwrap();
    assert!(above.fits_under_threshold);
    assert_eq!(above.size_bytes, 18);

    let below = bdi(64, Some(17), true).compress(&block).unwrap();
    assert!(!below.fits_under_threshold);
    assert_eq!(below.compressed_bits, 140);
}

#[test]
fn reduced_search_misses_wide_deltas() {
    let block = pointer_table();

    let mut full = bdi(64, None, true);
    let result = full.compress(&block).unwrap();
    assert_eq!(result.compressed_bits, 4 + 64 + 8 * 17, "base-8/delta-16");
    assert_eq!(full.stats().patterns["base8_delta16"], 1);
    assert_eq!(full.decompress(&result.representation).unwrap(), block);

    let mut reduced = bdi(64, None, false);
    let result = reduced.compress(&block).unwrap();
    assert!(!result.fits_under_threshold);
    assert_eq!(result.compressed_bits, 64 * 8, "no candidate means block-size bits");
    assert_eq!(reduced.stats().patterns["uncompressed"], 1);
}

#[test]
fn search_breadth_candidate_sets() {
    assert_eq!(BdiEncoding::candidates(SearchBreadth::All).len(), 9);
    let narrow = BdiEncoding::candidates(SearchBreadth::NarrowestDelta);
    assert_eq!(narrow.len(), 6);
    assert!(!narrow.contains(&BdiEncoding::BaseDelta {
        base_bytes: 8,
        delta_bits: 16
    }));
    assert_eq!(bdi(64, None, false).breadth(), SearchBreadth::NarrowestDelta);
}

#[test]
fn negative_immediates_round_trip() {
    let mut c = bdi(64, None, true);
    let block: Vec<u8> = (0..16i32).flat_map(|i| (-i - 1).to_le_bytes()).collect();
    let result = c.compress(&block).unwrap();
    assert!(result.fits_under_threshold);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn mixed_immediates_and_base_round_trip() {
    let mut c = bdi(64, None, true);
    let block: Vec<u8> = (0..16u32)
        .flat_map(|i| {
            let value = if i % 2 == 0 { i } else { 0x4000_0000 + i };
            value.to_le_bytes()
        })
        .collect();
    let result = c.compress(&block).unwrap();
    assert!(result.fits_under_threshold);
    assert_eq!(c.stats().patterns["base4_delta8"], 1);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn random_block_falls_back() {
    let mut rng = 7u64;
    let block: Vec<u8> = (0..64)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect();
    let mut c = bdi(64, None, true);
    let result = c.compress(&block).unwrap();
    assert!(!result.fits_under_threshold);
    assert_eq!(result.size_bytes, 64);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn wrong_block_size_is_rejected() {
    let mut c = bdi(64, None, true);
    assert_eq!(
        c.compress(&[0u8; 32]).unwrap_err(),
        CompressionError::InvalidBlockSize {
            expected: 64,
            actual: 32
        }
    );
}

#[test]
fn malformed_streams_are_rejected() {
    let c = bdi(64, None, true);
    let block = |payload: Vec<u8>, bit_len: usize| {
        Representation::Compressed(CompressedBlock {
            compressor_id: COMPRESSOR_BDI,
            payload,
            bit_len,
            meta: BlockMeta::default(),
        })
    };

    // Encoding id 15 does not exist.
    assert!(c.decompress(&block(vec![0x0F], 4)).is_err());
    // Zero encoding followed by stray bits.
    assert!(c.decompress(&block(vec![0x00], 8)).is_err());
    // Repeated encoding cut short.
    assert!(c.decompress(&block(vec![0x01, 0xFF], 12)).is_err());
    // Bit length beyond the payload.
    assert!(c.decompress(&block(vec![0x00], 9)).is_err());
}
