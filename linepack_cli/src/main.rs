use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{debug, info};

use linepack_compressors::{build_compressor, compressor_for_header};
use linepack_core::config::{DEFAULT_BLOCK_SIZE, DEFAULT_CHUNK_SIZE};
use linepack_core::format::LINE_COMPRESSED;
use linepack_core::{
    read_header, BaseConfig, BdiConfig, CompressionStats, Compressor, CompressorConfig, CpackConfig,
    DictionaryScope, Reader, Writer,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "linepack",
    about = "Cache-line compression: pack memory images line by line, inspect them, and compare compressors",
    version
)]
struct Cli {
    /// Log at info level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a memory image into a LINEPACK1 file
    Compress {
        /// Source file to compress ("-" reads stdin)
        input: PathBuf,
        /// Destination LINEPACK1 file
        output: PathBuf,
        #[command(flatten)]
        compressor: CompressorArgs,
    },
    /// Fully decompress a LINEPACK1 file back to raw bytes
    Decompress {
        /// Source LINEPACK1 file
        input: PathBuf,
        /// Destination file ("-" writes to stdout)
        output: PathBuf,
    },
    /// Print header metadata and line index statistics
    Inspect {
        /// LINEPACK1 file to inspect
        file: PathBuf,
        /// Print per-line details
        #[arg(long)]
        lines: bool,
    },
    /// Decompress a single line by index
    ReadLine {
        /// LINEPACK1 file
        file: PathBuf,
        /// Zero-based line index to read
        #[arg(short, long)]
        index: u64,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Benchmark random-access reads across N randomly chosen lines
    Bench {
        /// LINEPACK1 file
        file: PathBuf,
        /// Number of random lines to read
        #[arg(short, long, default_value_t = 1000)]
        count: u64,
        /// Fixed random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Compress a memory image in memory with every compressor and compare
    Analyze {
        /// Memory image to analyse
        input: PathBuf,
        /// Cache line size in bytes
        #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
}

/// Compressor selection for `compress`. `--config` overrides every other flag.
#[derive(Args)]
struct CompressorArgs {
    /// JSON compressor configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Compressor to use: bdi | cpack
    #[arg(short, long, default_value = "bdi")]
    compressor: String,
    /// Cache line size in bytes
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,
    /// Store a line compressed only if it shrinks below this many bytes
    /// (default: block size)
    #[arg(long)]
    size_threshold: Option<usize>,
    /// CPack dictionary entries (default: block size)
    #[arg(long)]
    dictionary_size: Option<usize>,
    /// CPack chunk size in bytes: 4 | 8
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// BDI: only try the narrowest delta for each base size
    #[arg(long)]
    reduced_search: bool,
    /// CPack: clear the dictionary before every line
    #[arg(long)]
    block_dictionary: bool,
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn config_from_args(args: &CompressorArgs) -> anyhow::Result<CompressorConfig> {
    if let Some(path) = &args.config {
        return CompressorConfig::from_json_file(path);
    }
    let base = BaseConfig {
        block_size: args.block_size,
        size_threshold: args.size_threshold,
    };
    let config = match args.compressor.as_str() {
        "bdi" | "b" => CompressorConfig::Bdi(BdiConfig {
            base,
            use_more_compressors: !args.reduced_search,
        }),
        "cpack" | "c" => CompressorConfig::Cpack(CpackConfig {
            base,
            dictionary_size: args.dictionary_size,
            chunk_size: args.chunk_size,
            dictionary_scope: if args.block_dictionary {
                DictionaryScope::Block
            } else {
                DictionaryScope::Instance
            },
        }),
        other => anyhow::bail!("unknown compressor '{}'. Valid options: bdi, cpack", other),
    };
    config.validate()?;
    Ok(config)
}

fn open_reader(file: &Path) -> anyhow::Result<Reader> {
    let header = read_header(file)?;
    let compressor = compressor_for_header(&header)
        .with_context(|| format!("building compressor for {:?}", file))?;
    Reader::open(file, compressor)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn print_stats(stats: &CompressionStats) {
    println!("  lines       : {}", stats.blocks);
    println!("  compressed  : {}", stats.compressed_blocks);
    println!("  raw         : {}", stats.uncompressed_blocks);
    println!("  stored      : {}", human_bytes(stats.stored_bytes));
    println!("  ratio       : {:.3}x", stats.ratio());
    if !stats.patterns.is_empty() {
        println!("  patterns:");
        for (name, count) in &stats.patterns {
            println!("    {:<16} {}", name, count);
        }
    }
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(input: PathBuf, output: PathBuf, args: &CompressorArgs) -> anyhow::Result<()> {
    let config = config_from_args(args)?;
    let compressor = build_compressor(&config)?;
    let block_size = config.base().block_size;
    info!(
        "compressing {:?} with {} ({})",
        input,
        compressor.name(),
        serde_json::to_string(&config)?
    );

    let mut writer = Writer::create(&output, &config, compressor)
        .with_context(|| format!("creating output file {:?}", output))?;

    let t0 = Instant::now();
    let mut src: Box<dyn Read> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening input file {:?}", input))?,
        ))
    };
    let mut buf = vec![0u8; block_size * 1024];
    let mut bytes_read = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n])?;
        bytes_read += n as u64;
    }

    let (line_count, stats) = writer.finish()?;
    let elapsed = t0.elapsed();
    let file_size = std::fs::metadata(&output)?.len();

    eprintln!("  compressor  : {}", config.name());
    eprintln!("  block size  : {}", human_bytes(block_size as u64));
    eprintln!("  lines       : {}", line_count);
    eprintln!("  raw size    : {}", human_bytes(bytes_read));
    eprintln!("  compressed  : {} of {} lines", stats.compressed_blocks, stats.blocks);
    eprintln!("  stored      : {}", human_bytes(stats.stored_bytes));
    eprintln!("  file on disk: {}", human_bytes(file_size));
    eprintln!("  ratio       : {:.3}x (payloads only)", stats.ratio());
    eprintln!(
        "  file ratio  : {:.3}x (dictionary snapshots included)",
        bytes_read as f64 / file_size as f64
    );
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((bytes_read as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_decompress(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let mut reader = open_reader(&input)?;

    let is_stdout = output.to_str() == Some("-");
    let mut dst: Box<dyn Write> = if is_stdout {
        Box::new(io::stdout())
    } else {
        Box::new(
            File::create(&output).with_context(|| format!("creating output file {:?}", output))?,
        )
    };

    let t0 = Instant::now();
    let line_count = reader.line_count();
    let mut remaining = reader.raw_size();

    for idx in 0..line_count {
        let line = reader.read_line(idx)?;
        // The last line is zero padded past the original length
        let keep = (line.len() as u64).min(remaining) as usize;
        dst.write_all(&line[..keep])?;
        remaining -= keep as u64;
    }
    dst.flush()?;

    let elapsed = t0.elapsed();
    let total_raw = reader.raw_size();
    eprintln!("  lines       : {}", line_count);
    eprintln!("  raw size    : {}", human_bytes(total_raw));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_inspect(file: PathBuf, show_lines: bool) -> anyhow::Result<()> {
    let reader = open_reader(&file)?;
    let config = reader.header.config()?;
    let file_size = std::fs::metadata(&file)?.len();
    let compressed = reader
        .entries()
        .iter()
        .filter(|e| e.kind == LINE_COMPRESSED)
        .count();

    println!("=== LINEPACK1 File: {:?} ===", file);
    println!();
    println!("  format version : {}", reader.header.version);
    println!("  compressor     : {} (id={})", config.name(), reader.header.compressor_id);
    println!("  config         : {}", serde_json::to_string(&config)?);
    println!("  block size     : {}", human_bytes(reader.block_size() as u64));
    println!("  line count     : {}", reader.line_count());
    println!("  compressed     : {} lines", compressed);
    println!("  raw size       : {}", human_bytes(reader.raw_size()));
    println!("  payloads       : {}", human_bytes(reader.payload_size()));
    println!(
        "  sidecars       : {}",
        human_bytes(reader.stored_size() - reader.payload_size())
    );
    println!("  file on disk   : {}", human_bytes(file_size));
    println!("  ratio          : {:.3}x (payloads only)", reader.ratio());
    println!(
        "  file ratio     : {:.3}x (raw size / file on disk)",
        reader.raw_size() as f64 / file_size as f64
    );
    if reader.stored_size() > reader.payload_size() {
        println!("  note           : dictionary snapshots are stored per line and are not");
        println!("                   counted by ratio; use --block-dictionary for compact files");
    }
    println!("  flags          : 0x{:016x}", reader.header.flags);

    if show_lines {
        println!();
        println!(
            "  {:>8}  {:>12}  {:>5}  {:>8}  {:>8}  {:>8}  {:>16}",
            "line", "file offset", "kind", "bits", "stored", "sidecar", "checksum"
        );
        println!("  {}", "-".repeat(78));
        for (i, e) in reader.entries().iter().enumerate() {
            println!(
                "  {:>8}  {:>12}  {:>5}  {:>8}  {:>8}  {:>8}  {:016x}",
                i,
                e.offset,
                if e.kind == LINE_COMPRESSED { "comp" } else { "raw" },
                e.bit_len,
                e.stored_len,
                e.metadata_len,
                e.checksum
            );
        }
    }

    Ok(())
}

fn run_read_line(file: PathBuf, index: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let entry = reader
        .entries()
        .get(index as usize)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("line {} out of range (total {})", index, reader.line_count()))?;

    eprintln!(
        "seeking to line {} (offset {} bytes from file start, {} bits stored)...",
        index, entry.offset, entry.bit_len
    );

    let t0 = Instant::now();
    let raw = reader.read_line(index)?;
    let elapsed = t0.elapsed();

    eprintln!(
        "  decoded {} in {:.3}ms",
        human_bytes(raw.len() as u64),
        elapsed.as_secs_f64() * 1000.0
    );

    match output {
        Some(path) => {
            std::fs::write(&path, &raw)?;
            eprintln!("  written to {:?}", path);
        }
        None => {
            println!("--- line {} ({} bytes) ---", index, raw.len());
            for (i, chunk) in raw.chunks(16).enumerate() {
                print!("  {:04x}  ", i * 16);
                for b in chunk {
                    print!("{:02x} ", b);
                }
                for _ in chunk.len()..16 {
                    print!("   ");
                }
                print!("  |");
                for b in chunk {
                    if b.is_ascii_graphic() || *b == b' ' {
                        print!("{}", *b as char);
                    } else {
                        print!(".");
                    }
                }
                println!("|");
            }
        }
    }

    Ok(())
}

fn run_bench(file: PathBuf, count: u64, seed: u64) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let line_count = reader.line_count();

    if line_count == 0 {
        anyhow::bail!("file has no lines");
    }
    if count == 0 {
        anyhow::bail!("--count must be at least 1");
    }

    // LCG for reproducible random line indices
    let indices: Vec<u64> = {
        let mut rng = seed;
        (0..count)
            .map(|_| {
                rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (rng >> 33) % line_count
            })
            .collect()
    };

    eprintln!(
        "benchmarking {} random line reads across {} lines...",
        count, line_count
    );

    let t0 = Instant::now();
    let mut total_raw = 0u64;
    let mut latencies_ns: Vec<u64> = Vec::with_capacity(count as usize);

    for &idx in &indices {
        let t = Instant::now();
        let line = reader.read_line(idx)?;
        latencies_ns.push(t.elapsed().as_nanos() as u64);
        total_raw += line.len() as u64;
    }

    let elapsed = t0.elapsed();
    latencies_ns.sort_unstable();

    let pct = |p: f64| latencies_ns[((latencies_ns.len() as f64 * p) as usize).min(latencies_ns.len() - 1)];

    println!();
    println!("=== Random Line Access Benchmark ===");
    println!("  lines read  : {}", count);
    println!("  total raw   : {}", human_bytes(total_raw));
    println!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    println!(
        "  throughput  : {}/s",
        human_bytes((total_raw as f64 / elapsed.as_secs_f64()) as u64)
    );
    println!("  latency:");
    println!("    min  : {} ns", latencies_ns[0]);
    println!("    p50  : {} ns", pct(0.50));
    println!("    p95  : {} ns", pct(0.95));
    println!("    p99  : {} ns", pct(0.99));
    println!("    max  : {} ns", latencies_ns[latencies_ns.len() - 1]);

    Ok(())
}

fn run_analyze(input: PathBuf, block_size: usize) -> anyhow::Result<()> {
    let base = BaseConfig {
        block_size,
        size_threshold: None,
    };
    let configs = [
        (
            "bdi",
            CompressorConfig::Bdi(BdiConfig {
                base: base.clone(),
                use_more_compressors: true,
            }),
        ),
        (
            "bdi (reduced)",
            CompressorConfig::Bdi(BdiConfig {
                base: base.clone(),
                use_more_compressors: false,
            }),
        ),
        (
            "cpack",
            CompressorConfig::Cpack(CpackConfig {
                base,
                ..CpackConfig::default()
            }),
        ),
    ];
    for (_, config) in &configs {
        config.validate()?;
    }

    let mut image = std::fs::read(&input).with_context(|| format!("reading {:?}", input))?;
    if image.is_empty() {
        anyhow::bail!("{:?} is empty", input);
    }
    let raw_size = image.len();
    let padded = raw_size.div_ceil(block_size) * block_size;
    image.resize(padded, 0);

    println!("=== Line Compression Analysis: {:?} ===", input);
    println!("  raw size    : {}", human_bytes(raw_size as u64));
    println!("  block size  : {}", block_size);

    for (label, config) in &configs {
        let mut compressor = build_compressor(config)?;
        let t0 = Instant::now();
        for line in image.chunks_exact(block_size) {
            compressor.compress(line)?;
        }
        debug!("{} analysed in {:.3}s", label, t0.elapsed().as_secs_f64());
        println!();
        println!("--- {} ---", label);
        print_stats(compressor.stats());
    }

    // Per-line general-purpose baselines
    let mut lz4_bytes = 0u64;
    let mut zstd_bytes = 0u64;
    for line in image.chunks_exact(block_size) {
        lz4_bytes += lz4_flex::block::compress(line).len().min(block_size) as u64;
        zstd_bytes += zstd::bulk::compress(line, 3)?.len().min(block_size) as u64;
    }
    println!();
    println!("--- per-line baselines ---");
    println!("  lz4         : {:.3}x", padded as f64 / lz4_bytes as f64);
    println!("  zstd (l3)   : {:.3}x", padded as f64 / zstd_bytes as f64);

    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Info);
    }
    logger.init();

    match cli.command {
        Commands::Compress {
            input,
            output,
            compressor,
        } => run_compress(input, output, &compressor),
        Commands::Decompress { input, output } => run_decompress(input, output),
        Commands::Inspect { file, lines } => run_inspect(file, lines),
        Commands::ReadLine {
            file,
            index,
            output,
        } => run_read_line(file, index, output),
        Commands::Bench { file, count, seed } => run_bench(file, count, seed),
        Commands::Analyze { input, block_size } => run_analyze(input, block_size),
    }
}
