use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::Context;
use xxhash_rust::xxh3::xxh3_64;

use crate::codec::{Compressor, Representation};
use crate::config::CompressorConfig;
use crate::format::{LineEntry, LinepackHeader, HEADER_SIZE, LINE_COMPRESSED, LINE_RAW};
use crate::stats::CompressionStats;

/// Streaming writer for LINEPACK1 files.
///
/// # Write contract
/// Call [`write`](Writer::write) any number of times with arbitrary-sized
/// byte slices. The writer cuts the stream into `block_size` lines and runs
/// each through the compressor in order, so a dictionary compressor sees the
/// lines in the same sequence a cache would. Call [`finish`](Writer::finish)
/// to zero-pad and flush a trailing partial line, append the line index and
/// footer, and write back the final header.
///
/// # Format layout written
/// ```text
/// [HEADER: 56 bytes placeholder]
/// [LINE 0] [LINE 1] ... [LINE N-1]   ← [meta_len u16][sidecar] payload
/// [LINE INDEX: 32 bytes × N]
/// [FOOTER: 8 bytes, u64 LE offset of line index]
/// ← seek back to 0, overwrite header with real values
/// ```
pub struct Writer {
    file: BufWriter<File>,
    compressor: Box<dyn Compressor>,
    header: LinepackHeader,
    block_size: usize,
    /// Pending raw bytes not yet flushed into a line.
    pending: Vec<u8>,
    entries: Vec<LineEntry>,
    /// Current write position in the file (mirrors the file cursor).
    current_offset: u64,
    raw_size: u64,
}

impl Writer {
    /// Create a new LINEPACK1 file at `path`, overwriting any existing file.
    ///
    /// `compressor` must have been built from `config`; the configuration is
    /// recorded in the header so readers can rebuild a matching decoder.
    pub fn create(
        path: impl AsRef<Path>,
        config: &CompressorConfig,
        compressor: Box<dyn Compressor>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        if compressor.id() != config.compressor_id() {
            anyhow::bail!(
                "compressor {} (id {}) does not match configured id {}",
                compressor.name(),
                compressor.id(),
                config.compressor_id()
            );
        }
        let block_size = compressor.params().block_size;
        if block_size != config.base().block_size {
            anyhow::bail!(
                "compressor block size {} does not match configured {}",
                block_size,
                config.base().block_size
            );
        }

        let path = path.as_ref();
        let mut file = BufWriter::new(
            File::create(path).with_context(|| format!("creating {:?}", path))?,
        );
        // Placeholder header, overwritten in finish()
        file.write_all(&[0u8; HEADER_SIZE as usize])?;
        Ok(Self {
            file,
            compressor,
            header: LinepackHeader::for_config(config),
            block_size,
            pending: Vec::with_capacity(block_size * 2),
            entries: Vec::new(),
            current_offset: HEADER_SIZE,
            raw_size: 0,
        })
    }

    /// Buffer `data` and compress complete lines as they fill up.
    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.raw_size += data.len() as u64;
        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.block_size {
            let line: Vec<u8> = self.pending.drain(..self.block_size).collect();
            self.flush_line(&line)?;
        }
        Ok(())
    }

    /// Compress `line` and append it to the file.
    fn flush_line(&mut self, line: &[u8]) -> anyhow::Result<()> {
        let result = self
            .compressor
            .compress(line)
            .with_context(|| format!("compressing line {}", self.entries.len()))?;

        let line_offset = self.current_offset;
        let (payload, bit_len, sidecar, kind) = match &result.representation {
            Representation::Uncompressed(raw) => (raw.as_slice(), raw.len() * 8, &[][..], LINE_RAW),
            Representation::Compressed(c) => (
                c.payload.as_slice(),
                c.bit_len,
                c.meta.sidecar.as_slice(),
                LINE_COMPRESSED,
            ),
        };

        let metadata_len = u16::try_from(sidecar.len())
            .with_context(|| format!("line sidecar of {} bytes is too large", sidecar.len()))?;
        if metadata_len > 0 {
            self.file.write_all(&metadata_len.to_le_bytes())?;
            self.file.write_all(sidecar)?;
            self.current_offset += 2 + sidecar.len() as u64;
        }

        self.file.write_all(payload)?;
        self.current_offset += payload.len() as u64;

        self.entries.push(LineEntry {
            offset: line_offset,
            stored_len: payload.len() as u32,
            bit_len: bit_len as u32,
            checksum: xxh3_64(payload),
            metadata_len,
            kind,
        });

        Ok(())
    }

    /// Flush remaining buffered data, write the line index + footer, and seal
    /// the file by writing the final header.
    ///
    /// Returns the number of lines written and the compressor's statistics.
    pub fn finish(mut self) -> anyhow::Result<(u64, CompressionStats)> {
        // Zero-pad a partial trailing line
        if !self.pending.is_empty() {
            let mut remaining = std::mem::take(&mut self.pending);
            remaining.resize(self.block_size, 0);
            self.flush_line(&remaining)?;
        }

        // ── Line index ─────────────────────────────────────────────────────
        let index_offset = self.current_offset;
        for entry in &self.entries {
            self.file.write_all(&entry.to_bytes())?;
        }

        // ── Footer: 8-byte u64 LE offset of line index start ───────────────
        self.file.write_all(&index_offset.to_le_bytes())?;

        // ── Seek back to 0 and write the real header ────────────────────────
        let line_count = self.entries.len() as u64;
        self.header.line_count = line_count;
        self.header.raw_size = self.raw_size;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.flush()?;

        Ok((line_count, self.compressor.stats().clone()))
    }
}
