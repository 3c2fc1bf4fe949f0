use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::{BlockMeta, CompressedBlock, Compressor, Representation};
use crate::format::{
    LineEntry, LinepackHeader, FLAG_HAS_CHECKSUM, FLAG_PER_LINE_META, FORMAT_VERSION, HEADER_SIZE,
    LINE_COMPRESSED, LINE_ENTRY_SIZE,
};

/// Read only the header of a LINEPACK1 file.
///
/// Used to pick a compressor before opening the file with [`Reader::open`].
pub fn read_header(path: impl AsRef<Path>) -> anyhow::Result<LinepackHeader> {
    let path = path.as_ref();
    let mut file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let mut buf = [0u8; HEADER_SIZE as usize];
    file.read_exact(&mut buf)?;
    LinepackHeader::from_bytes(&buf)
}

/// Random-access reader for LINEPACK1 files.
///
/// # Open sequence
/// 1. Read the 56-byte header (magic, compressor id and configuration).
/// 2. Seek to `file_end - 8`, read the `index_offset` u64.
/// 3. Seek to `index_offset`, load the line index into RAM.
///
/// # Access pattern
/// [`read_line`](Reader::read_line) seeks directly to one line and decodes
/// only that line. CPack lines carry their own dictionary snapshot, so no
/// earlier line has to be replayed first.
pub struct Reader {
    file: BufReader<File>,
    pub header: LinepackHeader,
    entries: Vec<LineEntry>,
    compressor: Arc<dyn Compressor>,
}

impl Reader {
    /// Open a LINEPACK1 file.
    ///
    /// `compressor` must match the header's compressor id and block size.
    /// `linepack_compressors::compressor_for_header` builds the right one.
    pub fn open(path: impl AsRef<Path>, compressor: Arc<dyn Compressor>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut file = BufReader::new(File::open(path).with_context(|| format!("opening {:?}", path))?);

        // ── Read and validate header ────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header_buf)?;
        let header = LinepackHeader::from_bytes(&header_buf)?;

        if header.version != FORMAT_VERSION {
            anyhow::bail!(
                "unsupported LINEPACK version {} (only version {} is supported)",
                header.version,
                FORMAT_VERSION
            );
        }
        if header.compressor_id != compressor.id() {
            anyhow::bail!(
                "compressor mismatch: file uses compressor {} but provided compressor has id {}",
                header.compressor_id,
                compressor.id()
            );
        }
        if header.block_size as usize != compressor.params().block_size {
            anyhow::bail!(
                "block size mismatch: file uses {} bytes but compressor expects {}",
                header.block_size,
                compressor.params().block_size
            );
        }

        // ── Read footer → index offset ──────────────────────────────────────
        file.seek(SeekFrom::End(-8))?;
        let mut footer_buf = [0u8; 8];
        file.read_exact(&mut footer_buf)?;
        let index_offset = u64::from_le_bytes(footer_buf);

        // ── Load line index ─────────────────────────────────────────────────
        file.seek(SeekFrom::Start(index_offset))?;
        let mut entries = Vec::with_capacity(header.line_count as usize);
        let mut entry_buf = [0u8; LINE_ENTRY_SIZE as usize];
        for i in 0..header.line_count {
            file.read_exact(&mut entry_buf)
                .with_context(|| format!("reading index entry {}", i))?;
            entries.push(LineEntry::from_bytes(&entry_buf)?);
        }

        Ok(Self {
            file,
            header,
            entries,
            compressor,
        })
    }

    #[inline]
    pub fn line_count(&self) -> u64 {
        self.header.line_count
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.header.block_size
    }

    /// Logical size of the original input in bytes.
    pub fn raw_size(&self) -> u64 {
        self.header.raw_size
    }

    /// Bytes used by all lines on disk, sidecars included.
    pub fn stored_size(&self) -> u64 {
        self.entries.iter().map(LineEntry::disk_len).sum()
    }

    /// Bytes used by line payloads alone, as a cache would account them.
    pub fn payload_size(&self) -> u64 {
        self.entries.iter().map(|e| e.stored_len as u64).sum()
    }

    /// Compression ratio of the payloads (padded raw size / payload size).
    pub fn ratio(&self) -> f64 {
        let payload = self.payload_size();
        if payload == 0 {
            return 1.0;
        }
        (self.line_count() * self.block_size() as u64) as f64 / payload as f64
    }

    pub fn entries(&self) -> &[LineEntry] {
        &self.entries
    }

    /// Load line `idx` in its stored representation without decoding it.
    pub fn read_representation(&mut self, idx: u64) -> anyhow::Result<Representation> {
        let entry = self
            .entries
            .get(idx as usize)
            .ok_or_else(|| {
                anyhow::anyhow!("line index {} out of range (total {})", idx, self.header.line_count)
            })?
            .clone();

        self.file.seek(SeekFrom::Start(entry.offset))?;

        let meta = if entry.metadata_len > 0 {
            if !self.header.has_flag(FLAG_PER_LINE_META) {
                anyhow::bail!("line {} carries a sidecar but the file has no per-line metadata", idx);
            }
            // The line starts with [metadata_len:u16][sidecar bytes]
            let mut len_buf = [0u8; 2];
            self.file.read_exact(&mut len_buf)?;
            let on_disk_meta_len = u16::from_le_bytes(len_buf);
            if on_disk_meta_len != entry.metadata_len {
                anyhow::bail!(
                    "line {} metadata_len mismatch: index says {} but on-disk prefix says {}",
                    idx,
                    entry.metadata_len,
                    on_disk_meta_len
                );
            }
            let mut sidecar = vec![0u8; entry.metadata_len as usize];
            self.file.read_exact(&mut sidecar)?;
            BlockMeta { sidecar }
        } else {
            BlockMeta::default()
        };

        let mut payload = vec![0u8; entry.stored_len as usize];
        self.file.read_exact(&mut payload)?;

        if self.header.has_flag(FLAG_HAS_CHECKSUM) {
            let computed = xxh3_64(&payload);
            if computed != entry.checksum {
                anyhow::bail!(
                    "line {} checksum mismatch: expected {:016x}, got {:016x}",
                    idx,
                    entry.checksum,
                    computed
                );
            }
        }

        Ok(if entry.kind == LINE_COMPRESSED {
            Representation::Compressed(CompressedBlock {
                compressor_id: self.header.compressor_id,
                payload,
                bit_len: entry.bit_len as usize,
                meta,
            })
        } else {
            Representation::Uncompressed(payload)
        })
    }

    /// Decompress and return the raw bytes of line `idx`.
    pub fn read_line(&mut self, idx: u64) -> anyhow::Result<Vec<u8>> {
        let representation = self.read_representation(idx)?;
        let raw = self
            .compressor
            .decompress(&representation)
            .with_context(|| format!("decoding line {}", idx))?;
        Ok(raw)
    }

    /// Return exactly `len` bytes starting at logical offset `start`, clipped
    /// to the original input size.
    pub fn read_range(&mut self, start: u64, len: u64) -> anyhow::Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        let raw_total = self.raw_size();
        if start >= raw_total {
            anyhow::bail!("read_range start {} is beyond raw size {}", start, raw_total);
        }

        let end = (start + len).min(raw_total);
        let block_size = self.header.block_size as u64;

        let first_line = start / block_size;
        let last_line = (end - 1) / block_size;

        let mut result = Vec::with_capacity((end - start) as usize);

        for line_idx in first_line..=last_line {
            let line = self.read_line(line_idx)?;
            let line_start = line_idx * block_size;

            let slice_start = if line_idx == first_line {
                (start - line_start) as usize
            } else {
                0
            };
            let slice_end = if line_idx == last_line {
                ((end - line_start) as usize).min(line.len())
            } else {
                line.len()
            };

            result.extend_from_slice(&line[slice_start..slice_end]);
        }

        Ok(result)
    }
}
