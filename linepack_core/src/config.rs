//! Compressor instantiation parameters.
//!
//! A configuration is normally built from CLI flags or loaded from a JSON
//! file. Unset sizes inherit from the cache line size, the same way the
//! simulator's parameter layer defaults them to the parent cache's line size.
//!
//! ```json
//! { "kind": "cpack", "block_size": 64, "dictionary_size": 16 }
//! { "kind": "bdi", "size_threshold": 48, "use_more_compressors": false }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{CompressionError, Result};
use crate::format::{COMPRESSOR_BDI, COMPRESSOR_CPACK};

/// Default cache line size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 64;

/// Default CPack chunk (word) size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4;

/// Largest accepted block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

/// Largest accepted dictionary. A full dictionary snapshot (12 bytes of
/// counters plus 8 bytes per entry) must fit the u16 sidecar length of a
/// LINEPACK1 line.
pub const MAX_DICTIONARY_SIZE: usize = (u16::MAX as usize - 12) / 8;

/// Parameters shared by every compressor variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Block (cache line) size in bytes.
    #[serde(default = "BaseConfig::default_block_size")]
    pub block_size: usize,

    /// A compressed block must be strictly smaller than this many bytes to be
    /// stored compressed. Defaults to `block_size`.
    #[serde(default)]
    pub size_threshold: Option<usize>,
}

impl BaseConfig {
    fn default_block_size() -> usize {
        DEFAULT_BLOCK_SIZE
    }

    pub fn size_threshold(&self) -> usize {
        self.size_threshold.unwrap_or(self.block_size)
    }

    pub fn params(&self) -> BaseParams {
        BaseParams {
            block_size: self.block_size,
            size_threshold: self.size_threshold(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % 8 != 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(CompressionError::InvalidConfig(format!(
                "block_size must be a positive multiple of 8 up to {}, got {}",
                MAX_BLOCK_SIZE, self.block_size
            )));
        }
        let threshold = self.size_threshold();
        if threshold == 0 || threshold > self.block_size {
            return Err(CompressionError::InvalidConfig(format!(
                "size_threshold must be in 1..={}, got {}",
                self.block_size, threshold
            )));
        }
        Ok(())
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            size_threshold: None,
        }
    }
}

/// Resolved base parameters every compressor carries at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseParams {
    pub block_size: usize,
    pub size_threshold: usize,
}

/// Lifetime of a dictionary's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryScope {
    /// Entries persist for the lifetime of the compressor instance.
    #[default]
    Instance,
    /// The dictionary is cleared before every block.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpackConfig {
    #[serde(flatten)]
    pub base: BaseConfig,

    /// Number of dictionary entries. Defaults to `block_size`.
    #[serde(default)]
    pub dictionary_size: Option<usize>,

    /// Bytes per chunk matched against the dictionary (4 or 8).
    #[serde(default = "CpackConfig::default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub dictionary_scope: DictionaryScope,
}

impl CpackConfig {
    fn default_chunk_size() -> usize {
        DEFAULT_CHUNK_SIZE
    }

    pub fn dictionary_size(&self) -> usize {
        self.dictionary_size.unwrap_or(self.base.block_size)
    }
}

impl Default for CpackConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig::default(),
            dictionary_size: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            dictionary_scope: DictionaryScope::Instance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdiConfig {
    #[serde(flatten)]
    pub base: BaseConfig,

    /// Evaluate every (base, delta) combination instead of only the narrowest
    /// delta for each base size.
    #[serde(default = "BdiConfig::default_use_more_compressors")]
    pub use_more_compressors: bool,
}

impl BdiConfig {
    fn default_use_more_compressors() -> bool {
        true
    }
}

impl Default for BdiConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig::default(),
            use_more_compressors: true,
        }
    }
}

/// Configuration for one compressor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CompressorConfig {
    Bdi(BdiConfig),
    Cpack(CpackConfig),
}

impl CompressorConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        Self::from_json(&text).with_context(|| format!("parsing config {:?}", path))
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: CompressorConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn base(&self) -> &BaseConfig {
        match self {
            CompressorConfig::Bdi(c) => &c.base,
            CompressorConfig::Cpack(c) => &c.base,
        }
    }

    /// Compressor id stored in LINEPACK1 headers.
    pub fn compressor_id(&self) -> u16 {
        match self {
            CompressorConfig::Bdi(_) => COMPRESSOR_BDI,
            CompressorConfig::Cpack(_) => COMPRESSOR_CPACK,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CompressorConfig::Bdi(_) => "bdi",
            CompressorConfig::Cpack(_) => "cpack",
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.base().validate()?;
        if let CompressorConfig::Cpack(c) = self {
            let dictionary_size = c.dictionary_size();
            if dictionary_size == 0 || dictionary_size > MAX_DICTIONARY_SIZE {
                return Err(CompressionError::InvalidConfig(format!(
                    "dictionary_size must be in 1..={}, got {}",
                    MAX_DICTIONARY_SIZE, dictionary_size
                )));
            }
            if c.chunk_size != 4 && c.chunk_size != 8 {
                return Err(CompressionError::InvalidConfig(format!(
                    "chunk_size must be 4 or 8, got {}",
                    c.chunk_size
                )));
            }
            if c.base.block_size % c.chunk_size != 0 {
                return Err(CompressionError::InvalidConfig(format!(
                    "chunk_size {} does not divide block_size {}",
                    c.chunk_size, c.base.block_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_inherit_from_block_size() {
        let config = CompressorConfig::from_json(r#"{"kind":"cpack","block_size":32}"#).unwrap();
        let CompressorConfig::Cpack(c) = config else {
            panic!("expected cpack config");
        };
        assert_eq!(c.base.size_threshold(), 32);
        assert_eq!(c.dictionary_size(), 32);
        assert_eq!(c.chunk_size, 4);
        assert_eq!(c.dictionary_scope, DictionaryScope::Instance);
    }

    #[test]
    fn bdi_defaults_to_full_search() {
        let config = CompressorConfig::from_json(r#"{"kind":"bdi"}"#).unwrap();
        assert_eq!(config, CompressorConfig::Bdi(BdiConfig::default()));
        assert_eq!(config.base().params().size_threshold, DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let err = CompressorConfig::from_json(r#"{"kind":"bdi","size_threshold":65}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("size_threshold"), "got: {err}");
        assert!(CompressorConfig::from_json(r#"{"kind":"bdi","size_threshold":0}"#).is_err());
    }

    #[test]
    fn bad_chunk_size_is_rejected() {
        assert!(CompressorConfig::from_json(r#"{"kind":"cpack","chunk_size":3}"#).is_err());
        assert!(CompressorConfig::from_json(r#"{"kind":"cpack","block_size":8,"chunk_size":16}"#).is_err());
    }

    #[test]
    fn dictionary_size_is_bounded_by_the_sidecar() {
        assert_eq!(MAX_DICTIONARY_SIZE, 8190);
        assert!(CompressorConfig::from_json(r#"{"kind":"cpack","dictionary_size":8190}"#).is_ok());
        let err = CompressorConfig::from_json(r#"{"kind":"cpack","dictionary_size":8191}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("dictionary_size"), "got: {err}");
        assert!(
            CompressorConfig::from_json(r#"{"kind":"cpack","dictionary_size":18446744073709551615}"#)
                .is_err()
        );
    }

    #[test]
    fn large_blocks_need_an_explicit_dictionary_size() {
        // The dictionary defaults to one entry per block byte.
        assert!(CompressorConfig::from_json(r#"{"kind":"cpack","block_size":16384}"#).is_err());
        assert!(
            CompressorConfig::from_json(r#"{"kind":"cpack","block_size":16384,"dictionary_size":64}"#)
                .is_ok()
        );
        assert!(CompressorConfig::from_json(r#"{"kind":"bdi","block_size":65536}"#).is_ok());
        assert!(CompressorConfig::from_json(r#"{"kind":"bdi","block_size":65544}"#).is_err());
    }
}
