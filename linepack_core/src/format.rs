use crate::config::{
    BaseConfig, BdiConfig, CompressorConfig, CpackConfig, DictionaryScope,
};

/// Magic bytes for LINEPACK version 1 files.
/// 14 bytes: "LINEPACK1\n" followed by 4 null bytes.
pub const MAGIC: &[u8; 14] = b"LINEPACK1\n\x00\x00\x00\x00";

pub const FORMAT_VERSION: u16 = 1;

/// Fixed size of the LINEPACK1 file header in bytes.
///   magic[14] + version:u16 + compressor_id:u16 + block_size:u32
///   + line_count:u64 + flags:u64 + size_threshold:u32 + dictionary_size:u32
///   + chunk_size:u8 + options:u8 + raw_size:u64
///   = 14 + 2 + 2 + 4 + 8 + 8 + 4 + 4 + 1 + 1 + 8 = 56
pub const HEADER_SIZE: u64 = 56;

/// Size of each LineEntry in the line index, in bytes.
///   offset:u64 + stored_len:u32 + bit_len:u32 + checksum:u64
///   + metadata_len:u16 + kind:u8 + _pad[5]
///   = 8 + 4 + 4 + 8 + 2 + 1 + 5 = 32
pub const LINE_ENTRY_SIZE: u64 = 32;

/// Size of the index footer (single u64 offset) in bytes.
pub const FOOTER_SIZE: u64 = 8;

// ── Flags ──────────────────────────────────────────────────────────────────

/// Each line carries an xxhash3-64 checksum of its payload.
pub const FLAG_HAS_CHECKSUM: u64 = 1 << 0;

/// Lines may be prefixed with a metadata sidecar (CPack dictionary snapshots).
/// Only set for instance-scoped dictionaries; readers reject sidecars otherwise.
pub const FLAG_PER_LINE_META: u64 = 1 << 1;

// ── Options byte ───────────────────────────────────────────────────────────

pub const OPT_USE_MORE_COMPRESSORS: u8 = 1 << 0;
pub const OPT_BLOCK_DICTIONARY: u8 = 1 << 1;

// ── Compressor IDs ─────────────────────────────────────────────────────────

pub const COMPRESSOR_BDI: u16 = 1;
pub const COMPRESSOR_CPACK: u16 = 2;

// ── Line kinds ─────────────────────────────────────────────────────────────

pub const LINE_RAW: u8 = 0;
pub const LINE_COMPRESSED: u8 = 1;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 56-byte LINEPACK1 file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinepackHeader {
    pub version: u16,
    pub compressor_id: u16,
    pub block_size: u32,
    pub line_count: u64,
    pub flags: u64,
    pub size_threshold: u32,
    /// Zero for compressors without a dictionary.
    pub dictionary_size: u32,
    /// Zero for compressors that do not chunk lines.
    pub chunk_size: u8,
    pub options: u8,
    /// Logical input length; the last line is zero padded past this point.
    pub raw_size: u64,
}

impl LinepackHeader {
    /// Header for a file written with `config`; counts are filled in later.
    pub fn for_config(config: &CompressorConfig) -> Self {
        let base = config.base();
        let mut flags = FLAG_HAS_CHECKSUM;
        let (dictionary_size, chunk_size, options) = match config {
            CompressorConfig::Bdi(c) => (
                0,
                0,
                if c.use_more_compressors { OPT_USE_MORE_COMPRESSORS } else { 0 },
            ),
            CompressorConfig::Cpack(c) => {
                if c.dictionary_scope == DictionaryScope::Instance {
                    flags |= FLAG_PER_LINE_META;
                }
                let options = if c.dictionary_scope == DictionaryScope::Block {
                    OPT_BLOCK_DICTIONARY
                } else {
                    0
                };
                (c.dictionary_size() as u32, c.chunk_size as u8, options)
            }
        };
        Self {
            version: FORMAT_VERSION,
            compressor_id: config.compressor_id(),
            block_size: base.block_size as u32,
            line_count: 0,
            flags,
            size_threshold: base.size_threshold() as u32,
            dictionary_size,
            chunk_size,
            options,
            raw_size: 0,
        }
    }

    /// Rebuild the configuration the file was written with.
    pub fn config(&self) -> anyhow::Result<CompressorConfig> {
        let base = BaseConfig {
            block_size: self.block_size as usize,
            size_threshold: Some(self.size_threshold as usize),
        };
        let config = match self.compressor_id {
            COMPRESSOR_BDI => CompressorConfig::Bdi(BdiConfig {
                base,
                use_more_compressors: self.options & OPT_USE_MORE_COMPRESSORS != 0,
            }),
            COMPRESSOR_CPACK => CompressorConfig::Cpack(CpackConfig {
                base,
                dictionary_size: Some(self.dictionary_size as usize),
                chunk_size: self.chunk_size as usize,
                dictionary_scope: if self.options & OPT_BLOCK_DICTIONARY != 0 {
                    DictionaryScope::Block
                } else {
                    DictionaryScope::Instance
                },
            }),
            other => anyhow::bail!("unknown compressor id {} in LINEPACK1 header", other),
        };
        config.validate()?;
        Ok(config)
    }

    /// Serialize to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..14].copy_from_slice(MAGIC);
        buf[14..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..18].copy_from_slice(&self.compressor_id.to_le_bytes());
        buf[18..22].copy_from_slice(&self.block_size.to_le_bytes());
        buf[22..30].copy_from_slice(&self.line_count.to_le_bytes());
        buf[30..38].copy_from_slice(&self.flags.to_le_bytes());
        buf[38..42].copy_from_slice(&self.size_threshold.to_le_bytes());
        buf[42..46].copy_from_slice(&self.dictionary_size.to_le_bytes());
        buf[46] = self.chunk_size;
        buf[47] = self.options;
        buf[48..56].copy_from_slice(&self.raw_size.to_le_bytes());
        buf
    }

    /// Deserialize from `HEADER_SIZE` bytes, checking the magic.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> anyhow::Result<Self> {
        if &buf[..14] != MAGIC {
            anyhow::bail!("invalid magic bytes: not a LINEPACK1 file");
        }
        Ok(Self {
            version: u16::from_le_bytes(buf[14..16].try_into()?),
            compressor_id: u16::from_le_bytes(buf[16..18].try_into()?),
            block_size: u32::from_le_bytes(buf[18..22].try_into()?),
            line_count: u64::from_le_bytes(buf[22..30].try_into()?),
            flags: u64::from_le_bytes(buf[30..38].try_into()?),
            size_threshold: u32::from_le_bytes(buf[38..42].try_into()?),
            dictionary_size: u32::from_le_bytes(buf[42..46].try_into()?),
            chunk_size: buf[46],
            options: buf[47],
            raw_size: u64::from_le_bytes(buf[48..56].try_into()?),
        })
    }

    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }
}

// ── Line index entry ────────────────────────────────────────────────────────

/// One entry in the line index. Locates and describes a single stored line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEntry {
    /// Byte offset of this line from the start of the file.
    pub offset: u64,
    /// Length of the stored payload in bytes (excluding metadata prefix).
    pub stored_len: u32,
    /// Meaningful bits in the payload. `stored_len * 8` for raw lines.
    pub bit_len: u32,
    /// xxhash3-64 of the payload bytes.
    pub checksum: u64,
    /// Bytes of sidecar metadata written before the payload.
    pub metadata_len: u16,
    /// `LINE_RAW` or `LINE_COMPRESSED`.
    pub kind: u8,
}

impl LineEntry {
    /// Serialize to exactly `LINE_ENTRY_SIZE` bytes.
    pub fn to_bytes(&self) -> [u8; LINE_ENTRY_SIZE as usize] {
        let mut buf = [0u8; LINE_ENTRY_SIZE as usize];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.stored_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.bit_len.to_le_bytes());
        buf[16..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf[24..26].copy_from_slice(&self.metadata_len.to_le_bytes());
        buf[26] = self.kind;
        // buf[27..32] = 5 bytes padding, stays zero
        buf
    }

    /// Deserialize from `LINE_ENTRY_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; LINE_ENTRY_SIZE as usize]) -> anyhow::Result<Self> {
        let kind = buf[26];
        if kind != LINE_RAW && kind != LINE_COMPRESSED {
            anyhow::bail!("unknown line kind {}", kind);
        }
        Ok(Self {
            offset: u64::from_le_bytes(buf[0..8].try_into()?),
            stored_len: u32::from_le_bytes(buf[8..12].try_into()?),
            bit_len: u32::from_le_bytes(buf[12..16].try_into()?),
            checksum: u64::from_le_bytes(buf[16..24].try_into()?),
            metadata_len: u16::from_le_bytes(buf[24..26].try_into()?),
            kind,
        })
    }

    /// Bytes this line occupies on disk, including the sidecar prefix.
    pub fn disk_len(&self) -> u64 {
        let meta = if self.metadata_len > 0 { 2 + self.metadata_len as u64 } else { 0 };
        meta + self.stored_len as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_carries_cpack_config() {
        let config = CompressorConfig::Cpack(CpackConfig {
            base: BaseConfig {
                block_size: 64,
                size_threshold: Some(40),
            },
            dictionary_size: Some(16),
            chunk_size: 8,
            dictionary_scope: DictionaryScope::Block,
        });
        let mut header = LinepackHeader::for_config(&config);
        header.line_count = 3;
        header.raw_size = 150;

        let decoded = LinepackHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.config().unwrap(), config);
        assert!(!decoded.has_flag(FLAG_PER_LINE_META), "block dictionaries need no sidecar");
    }

    #[test]
    fn bdi_header_restores_search_breadth() {
        let config = CompressorConfig::Bdi(BdiConfig {
            base: BaseConfig::default(),
            use_more_compressors: false,
        });
        let header = LinepackHeader::for_config(&config);
        let restored = header.config().unwrap();
        let CompressorConfig::Bdi(bdi) = restored else {
            panic!("expected bdi config");
        };
        assert!(!bdi.use_more_compressors);
        assert_eq!(bdi.base.size_threshold(), 64);
        assert!(!header.has_flag(FLAG_PER_LINE_META));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = LinepackHeader::for_config(&CompressorConfig::Bdi(BdiConfig::default())).to_bytes();
        bytes[0] = b'X';
        assert!(LinepackHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn entry_disk_len_counts_sidecar_prefix() {
        let entry = LineEntry {
            stored_len: 10,
            metadata_len: 20,
            kind: LINE_COMPRESSED,
            ..Default::default()
        };
        assert_eq!(entry.disk_len(), 32);
        let decoded = LineEntry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(decoded, entry);
    }
}
