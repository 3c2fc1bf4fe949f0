mod bdi;
mod cpack;
mod dictionary;
pub mod patterns;

pub use bdi::{Bdi, BdiEncoding, SearchBreadth};
pub use cpack::CPack;
pub use dictionary::Dictionary;

use linepack_core::format::{COMPRESSOR_BDI, COMPRESSOR_CPACK};
use linepack_core::{CompressionError, Compressor, CompressorConfig, LinepackHeader};
use std::sync::Arc;

/// Build a fresh compressor from its configuration.
pub fn build_compressor(config: &CompressorConfig) -> Result<Box<dyn Compressor>, CompressionError> {
    Ok(match config {
        CompressorConfig::Bdi(c) => Box::new(Bdi::new(c)?),
        CompressorConfig::Cpack(c) => Box::new(CPack::new(c)?),
    })
}

/// Build a compressor for an on-disk `compressor_id`, checking that `config`
/// describes the same variant.
pub fn compressor_by_id(
    id: u16,
    config: &CompressorConfig,
) -> Result<Box<dyn Compressor>, CompressionError> {
    match id {
        COMPRESSOR_BDI | COMPRESSOR_CPACK if id == config.compressor_id() => build_compressor(config),
        COMPRESSOR_BDI | COMPRESSOR_CPACK => Err(CompressionError::InvalidConfig(format!(
            "compressor id {} does not match a {} configuration",
            id,
            config.name()
        ))),
        _ => Err(CompressionError::InvalidConfig(format!(
            "unknown compressor id {}; supported: {} (bdi), {} (cpack)",
            id, COMPRESSOR_BDI, COMPRESSOR_CPACK
        ))),
    }
}

/// Resolve the compressor an existing LINEPACK1 file was written with.
///
/// Called by the CLI when opening a file, so the reader can be initialized
/// with the right compressor automatically.
pub fn compressor_for_header(header: &LinepackHeader) -> anyhow::Result<Arc<dyn Compressor>> {
    let config = header.config()?;
    Ok(Arc::from(compressor_by_id(header.compressor_id, &config)?))
}
