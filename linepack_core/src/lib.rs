pub mod bits;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod reader;
pub mod stats;
pub mod writer;

pub use codec::{BlockMeta, CompressedBlock, CompressionResult, Compressor, Representation, SharedCompressor};
pub use config::{BaseConfig, BaseParams, BdiConfig, CompressorConfig, CpackConfig, DictionaryScope};
pub use error::CompressionError;
pub use format::{LineEntry, LinepackHeader, HEADER_SIZE, MAGIC};
pub use reader::{read_header, Reader};
pub use stats::CompressionStats;
pub use writer::Writer;
