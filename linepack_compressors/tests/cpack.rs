use linepack_compressors::{build_compressor, compressor_by_id, CPack, Dictionary};
use linepack_core::bits::BitWriter;
use linepack_core::config::MAX_DICTIONARY_SIZE;
use linepack_core::format::{COMPRESSOR_BDI, COMPRESSOR_CPACK};
use linepack_core::{
    BaseConfig, BdiConfig, BlockMeta, CompressedBlock, CompressionError, Compressor, CompressorConfig,
    CpackConfig, DictionaryScope, Representation,
};

fn cpack(dictionary_size: usize, scope: DictionaryScope) -> CPack {
    CPack::new(&CpackConfig {
        base: BaseConfig::default(),
        dictionary_size: Some(dictionary_size),
        chunk_size: 4,
        dictionary_scope: scope,
    })
    .unwrap()
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn noise(seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..64)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

fn compressed(result: &Representation) -> &CompressedBlock {
    match result {
        Representation::Compressed(c) => c,
        Representation::Uncompressed(_) => panic!("expected a compressed block"),
    }
}

#[test]
fn zero_block_is_one_bit_per_chunk() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let result = c.compress(&[0u8; 64]).unwrap();
    assert!(result.fits_under_threshold);
    assert_eq!(result.compressed_bits, 16);
    assert_eq!(result.size_bytes, 2);
    assert_eq!(c.stats().patterns["zero"], 16);
    assert!(c.dictionary().is_empty(), "zero chunks never become bases");
    assert_eq!(c.decompress(&result.representation).unwrap(), vec![0u8; 64]);
}

#[test]
fn zero_block_round_trips_at_every_block_size() {
    for block_size in [8, 32, 128] {
        for chunk_size in [4, 8] {
            let mut c = CPack::new(&CpackConfig {
                base: BaseConfig {
                    block_size,
                    size_threshold: None,
                },
                dictionary_size: None,
                chunk_size,
                dictionary_scope: DictionaryScope::Instance,
            })
            .unwrap();
            let zeros = vec![0u8; block_size];
            let result = c.compress(&zeros).unwrap();
            assert!(result.fits_under_threshold, "block {block_size}, chunk {chunk_size}");
            assert_eq!(result.compressed_bits, block_size / chunk_size);
            assert_eq!(c.decompress(&result.representation).unwrap(), zeros);
        }
    }
}

#[test]
fn repeated_word_is_learned_within_the_block() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let block = words(&[0x1234_5678; 16]);
    let result = c.compress(&block).unwrap();
    // One 37-bit literal, then fifteen 8-bit dictionary matches.
    assert_eq!(result.compressed_bits, 37 + 15 * 8);
    assert_eq!(result.size_bytes, 20);
    assert_eq!(c.dictionary().entries(), &[0x1234_5678]);
    assert_eq!(c.stats().patterns["literal"], 1);
    assert_eq!(c.stats().patterns["dictionary_match"], 15);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn dictionary_persists_across_blocks() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let block = words(&[0x1234_5678; 16]);
    let first = c.compress(&block).unwrap();
    let second = c.compress(&block).unwrap();
    assert_eq!(second.compressed_bits, 16 * 8, "every chunk hits the dictionary");
    assert!(second.size_bytes < first.size_bytes);

    // Both blocks still decode, whatever the live dictionary holds now.
    c.compress(&noise(5)).unwrap();
    assert_eq!(c.decompress(&first.representation).unwrap(), block);
    assert_eq!(c.decompress(&second.representation).unwrap(), block);
}

#[test]
fn block_scope_forgets_between_blocks() {
    let mut c = cpack(64, DictionaryScope::Block);
    let block = words(&[0x1234_5678; 16]);
    let first = c.compress(&block).unwrap();
    let second = c.compress(&block).unwrap();
    assert_eq!(first, second);
    assert!(compressed(&second.representation).meta.sidecar.is_empty());
    assert_eq!(c.decompress(&second.representation).unwrap(), block);
}

#[test]
fn dictionary_delta_encodes_near_values() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let mut values = vec![0xABCD_0000];
    values.extend((1..16).map(|i| 0xABCD_0000 + i * 3));
    let block = words(&values);
    let result = c.compress(&block).unwrap();
    // Literal, then fifteen narrow deltas against entry 0: 5 + 6 + 8 bits each.
    assert_eq!(result.compressed_bits, 37 + 15 * 19);
    assert_eq!(c.stats().patterns["dictionary_narrow"], 15);
    assert_eq!(c.dictionary().len(), 16, "dictionary deltas become new bases");
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn incompressible_block_falls_back_but_updates_dictionary() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let block = noise(1);
    let result = c.compress(&block).unwrap();
    assert!(!result.fits_under_threshold);
    assert_eq!(result.size_bytes, 64);
    assert!(result.compressed_bits > 64 * 8);
    assert_eq!(result.representation, Representation::Uncompressed(block.clone()));
    assert!(!c.dictionary().is_empty(), "rejected blocks still train the dictionary");
    assert_eq!(c.stats().uncompressed_blocks, 1);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn wrong_block_size_leaves_state_untouched() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let err = c.compress(&words(&[0x1234_5678; 15])).unwrap_err();
    assert_eq!(
        err,
        CompressionError::InvalidBlockSize {
            expected: 64,
            actual: 60
        }
    );
    assert!(c.dictionary().is_empty());
    assert_eq!(c.stats().blocks, 0);
}

#[test]
fn identical_sequences_give_identical_results() {
    let blocks: Vec<Vec<u8>> = (0..10)
        .map(|i| match i % 3 {
            0 => noise(i),
            1 => words(&[0x1000 + i as u32; 16]),
            _ => [0u8; 64].to_vec(),
        })
        .collect();
    let mut a = cpack(4, DictionaryScope::Instance);
    let mut b = cpack(4, DictionaryScope::Instance);
    for block in &blocks {
        assert_eq!(a.compress(block).unwrap(), b.compress(block).unwrap());
    }
    assert_eq!(a.dictionary(), b.dictionary());
    assert_eq!(a.stats(), b.stats());
}

#[test]
fn full_dictionary_reuses_the_oldest_slot() {
    let mut d = Dictionary::new(4).unwrap();
    for v in 10..14 {
        d.insert(v);
    }
    assert_eq!(d.len(), 4);
    assert_eq!(d.insert(99), 0, "oldest entry's index is reused");
    assert_eq!(d.lookup(10), None);
    assert_eq!(d.lookup(99), Some(0));
    assert_eq!(d.insert(100), 1);
    assert_eq!(d.entries(), &[99, 100, 12, 13]);
    assert_eq!(d.len(), d.capacity());
}

#[test]
fn lookup_returns_lowest_index() {
    let mut d = Dictionary::new(4).unwrap();
    d.insert(7);
    d.insert(8);
    d.insert(7);
    assert_eq!(d.lookup(7), Some(0));
}

#[test]
fn dictionary_snapshot_restores_cursor() {
    let mut d = Dictionary::new(3).unwrap();
    for v in 0..5 {
        d.insert(v);
    }
    let mut restored = Dictionary::from_bytes(&d.to_bytes()).unwrap();
    assert_eq!(restored, d);
    assert_eq!(restored.insert(42), d.insert(42));
}

#[test]
fn dictionary_capacity_is_bounded() {
    assert!(matches!(Dictionary::new(0), Err(CompressionError::InvalidConfig(_))));
    assert!(matches!(
        Dictionary::new(MAX_DICTIONARY_SIZE + 1),
        Err(CompressionError::InvalidConfig(_))
    ));
    let d = Dictionary::new(MAX_DICTIONARY_SIZE).unwrap();
    assert_eq!(d.index_bits(), 13);

    let mut oversized = Dictionary::new(4).unwrap().to_bytes();
    oversized[..4].copy_from_slice(&(MAX_DICTIONARY_SIZE as u32 + 1).to_le_bytes());
    assert!(Dictionary::from_bytes(&oversized).is_err());
}

#[test]
fn corrupt_snapshot_is_rejected() {
    let mut bytes = Dictionary::new(4).unwrap().to_bytes();
    bytes[8] = 5; // len > capacity
    assert!(matches!(
        Dictionary::from_bytes(&bytes),
        Err(CompressionError::MalformedRepresentation(_))
    ));
    assert!(Dictionary::from_bytes(&[1, 2, 3]).is_err());
}

#[test]
fn out_of_range_index_is_malformed() {
    let c = cpack(64, DictionaryScope::Instance);
    let mut w = BitWriter::new();
    w.write_code(0b10, 2);
    w.write_bits(5, 6);
    for _ in 0..15 {
        w.write_code(0, 1);
    }
    let bit_len = w.bits_written();
    let block = CompressedBlock {
        compressor_id: COMPRESSOR_CPACK,
        payload: w.finish(),
        bit_len,
        meta: BlockMeta::default(),
    };
    let err = c.decompress(&Representation::Compressed(block)).unwrap_err();
    assert!(matches!(err, CompressionError::MalformedRepresentation(_)), "got {err:?}");
}

#[test]
fn truncated_and_padded_streams_are_malformed() {
    let mut c = cpack(64, DictionaryScope::Instance);
    let result = c.compress(&[0u8; 64]).unwrap();
    let good = compressed(&result.representation).clone();

    let mut short = good.clone();
    short.bit_len = 15;
    assert!(c.decompress(&Representation::Compressed(short)).is_err());

    let mut long = good.clone();
    long.payload.push(0);
    long.bit_len = 17;
    assert!(c.decompress(&Representation::Compressed(long)).is_err());

    let mut foreign = good;
    foreign.compressor_id = COMPRESSOR_BDI;
    assert!(c.decompress(&Representation::Compressed(foreign)).is_err());
}

#[test]
fn raw_block_of_wrong_length_is_malformed() {
    let c = cpack(64, DictionaryScope::Instance);
    let err = c.decompress(&Representation::Uncompressed(vec![0; 10])).unwrap_err();
    assert!(matches!(err, CompressionError::MalformedRepresentation(_)));
}

#[test]
fn eight_byte_chunks_round_trip() {
    let config = CompressorConfig::Cpack(CpackConfig {
        chunk_size: 8,
        ..CpackConfig::default()
    });
    let mut c = build_compressor(&config).unwrap();
    let block: Vec<u8> = (0..8u64)
        .flat_map(|i| (0x7fff_0000_1000u64 + i * 16).to_le_bytes())
        .collect();
    let result = c.compress(&block).unwrap();
    assert!(result.fits_under_threshold);
    assert_eq!(c.decompress(&result.representation).unwrap(), block);
}

#[test]
fn factory_checks_ids_and_config() {
    let config = CompressorConfig::Cpack(CpackConfig::default());
    assert_eq!(compressor_by_id(COMPRESSOR_CPACK, &config).unwrap().name(), "cpack");
    assert!(matches!(
        compressor_by_id(COMPRESSOR_BDI, &config),
        Err(CompressionError::InvalidConfig(_))
    ));
    assert!(compressor_by_id(99, &config).is_err());

    let bad = CompressorConfig::Bdi(BdiConfig {
        base: BaseConfig {
            block_size: 60,
            size_threshold: None,
        },
        use_more_compressors: true,
    });
    assert!(matches!(build_compressor(&bad), Err(CompressionError::InvalidConfig(_))));
}
