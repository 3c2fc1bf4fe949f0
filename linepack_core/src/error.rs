use thiserror::Error;

/// Errors surfaced by a cache-line compressor.
///
/// Dictionary overflow is not represented here: a full dictionary evicts an
/// entry and carries on. Only caller bugs and corrupt input are errors;
/// everything else degrades to uncompressed storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressionError {
    #[error("invalid block size: expected {expected} bytes, got {actual}")]
    InvalidBlockSize { expected: usize, actual: usize },

    #[error("malformed representation: {0}")]
    MalformedRepresentation(String),

    #[error("invalid compressor configuration: {0}")]
    InvalidConfig(String),
}

impl CompressionError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        CompressionError::MalformedRepresentation(msg.into())
    }
}

pub type Result<T, E = CompressionError> = std::result::Result<T, E>;
