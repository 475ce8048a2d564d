use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;

use pdf_shrink::config::DEFAULT_MAX_UPLOAD_BYTES;
use pdf_shrink::engine::{default_engine, ImageRecompression};
use pdf_shrink::types::size_in_mb;
use pdf_shrink::{
    compressed_file_name, validate_upload, CompressionConfig, CompressionOrchestrator,
    CompressionStats, StrategyKind,
};

/// Shrink PDF files, keeping the best of several compression strategies
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input PDF files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for `<name>_compressed.pdf` outputs (defaults to each input's directory)
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Files compressed in parallel (0 = one per CPU)
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Base render scale for deep compression
    #[arg(long, default_value_t = 0.6)]
    deep_scale: f64,

    /// Base render scale for the deep retry
    #[arg(long, default_value_t = 0.5)]
    retry_scale: f64,

    /// Re-render JPEG quality (0.0-1.0)
    #[arg(long, default_value_t = 0.6)]
    quality: f64,

    /// Largest accepted size ratio for deep compression
    #[arg(long, default_value_t = 0.7)]
    deep_max_ratio: f64,

    /// Largest accepted size ratio for the structural re-save
    #[arg(long, default_value_t = 0.9)]
    standard_max_ratio: f64,

    /// Largest accepted size ratio for the deep retry
    #[arg(long, default_value_t = 0.8)]
    retry_max_ratio: f64,

    /// Leave embedded images alone during the structural re-save
    #[arg(long)]
    no_image_recompression: bool,

    /// JPEG quality for embedded images (1-100)
    #[arg(long, default_value_t = 50)]
    image_quality: u8,

    /// Max embedded image dimension (longer side)
    #[arg(long, default_value_t = 1500)]
    max_dim: u32,

    /// Reject inputs larger than this many MiB
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024))]
    max_size_mb: u64,

    /// Print one JSON report per file instead of text
    #[arg(long)]
    json: bool,
}

impl Args {
    fn compression_config(&self) -> CompressionConfig {
        let mut config = CompressionConfig::default();
        config.deep.scale = self.deep_scale;
        config.deep.quality = self.quality;
        config.retry.scale = self.retry_scale;
        config.retry.quality = self.quality;
        config.deep_max_ratio = self.deep_max_ratio;
        config.standard_max_ratio = self.standard_max_ratio;
        config.retry_max_ratio = self.retry_max_ratio;
        if self.no_image_recompression {
            config
        } else {
            config.with_image_recompression(ImageRecompression {
                quality: self.image_quality,
                max_dimension: self.max_dim,
                ..ImageRecompression::default()
            })
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileReport {
    input: PathBuf,
    output: PathBuf,
    strategy: StrategyKind,
    skipped: bool,
    #[serde(flatten)]
    stats: CompressionStats,
}

fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let name = compressed_file_name(&input.file_name().unwrap_or_default().to_string_lossy());
    let dir = out_dir
        .or_else(|| input.parent())
        .unwrap_or_else(|| Path::new("."));
    dir.join(name)
}

fn compress_file(args: &Args, config: &CompressionConfig, input: &Path) -> Result<FileReport> {
    let size = std::fs::metadata(input)
        .with_context(|| format!("Failed to stat {:?}", input))?
        .len();
    validate_upload(
        &input.file_name().unwrap_or_default().to_string_lossy(),
        size,
        args.max_size_mb * 1024 * 1024,
    )
    .with_context(|| format!("Rejected {:?}", input))?;

    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;
    let start = Instant::now();
    let result = CompressionOrchestrator::with_config(default_engine(), config.clone())
        .compress_or_passthrough(bytes);
    log::debug!("{:?} processed in {:.2?}", input, start.elapsed());

    let output = output_path(input, args.out_dir.as_deref());
    let report = FileReport {
        input: input.to_path_buf(),
        output: output.clone(),
        strategy: result.strategy(),
        skipped: result.skipped(),
        stats: result.stats(),
    };
    std::fs::write(&output, result.into_bytes())
        .with_context(|| format!("Failed to write {:?}", output))?;
    Ok(report)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.compression_config();

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs)
        .build()
        .context("Failed to build thread pool")?;

    let compressed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    let reports: Vec<Result<FileReport>> = pool.install(|| {
        args.inputs
            .par_iter()
            .map(|input| {
                let report = compress_file(&args, &config, input);
                match &report {
                    Ok(r) if r.skipped => skipped.fetch_add(1, Ordering::Relaxed),
                    Ok(_) => compressed.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
                report
            })
            .collect()
    });

    for report in &reports {
        match report {
            Ok(r) if args.json => println!("{}", serde_json::to_string(r)?),
            Ok(r) => {
                println!("{:?} -> {:?}", r.input, r.output);
                println!(
                    "  {} : {:.2} MB -> {:.2} MB ({:.2}% reduction, ratio {:.2})",
                    if r.skipped { "skipped" } else { r.strategy.as_str() },
                    size_in_mb(r.stats.original_size),
                    size_in_mb(r.stats.compressed_size),
                    r.stats.percent_reduction,
                    r.stats.compression_ratio
                );
            }
            Err(e) => eprintln!("Error: {:#}", e),
        }
    }

    if !args.json {
        println!(
            "Compressed {} files, skipped {}, failed {}.",
            compressed.load(Ordering::Relaxed),
            skipped.load(Ordering::Relaxed),
            failed.load(Ordering::Relaxed)
        );
    }

    if failed.load(Ordering::Relaxed) > 0 {
        anyhow::bail!("{} file(s) could not be processed", failed.load(Ordering::Relaxed));
    }
    Ok(())
}
