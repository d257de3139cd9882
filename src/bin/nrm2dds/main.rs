// nrm2dds - Convert EXR normal maps to BC5 DDS textures
//
// Pipeline per file:
//   1. Pick *.exr files whose name carries the normal-map marker
//   2. Remap signed data to 0..1, clamp, write a 16-bit TIFF
//   3. Look up the output name(s) and size cap (hero 2K, prop 1K)
//   4. Run texconv, move its DDS to the final name
//
// Usage: cargo run --bin nrm2dds -- [--config job.toml] [--input-dir DIR] [--output-dir DIR] [--texconv EXE]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use assetprep::config::{TextureJob, load_toml};
use assetprep::texture::{self, Texconv};

#[derive(Parser)]
#[command(name = "nrm2dds", about = "Batch-convert EXR normal maps to block-compressed DDS")]
struct Cli {
    /// TOML job description; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    input_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Path to the texconv executable
    #[arg(long)]
    texconv: Option<PathBuf>,
    #[arg(long)]
    hero_cap: Option<u32>,
    #[arg(long)]
    prop_cap: Option<u32>,
    /// Exit non-zero if any file failed
    #[arg(long)]
    strict: bool,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    assetprep::logging::init(cli.verbose);

    let mut job = match &cli.config {
        Some(path) => load_toml::<TextureJob>(path)
            .with_context(|| format!("loading job {}", path.display()))?,
        None => TextureJob::default(),
    };
    if let Some(dir) = cli.input_dir {
        job.input_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        job.output_dir = dir;
    }
    if let Some(exe) = cli.texconv {
        job.texconv = exe;
    }
    job.hero_cap = cli.hero_cap.unwrap_or(job.hero_cap);
    job.prop_cap = cli.prop_cap.unwrap_or(job.prop_cap);

    info!(
        "Converting {} -> {} ({}, hero {}px, prop {}px)",
        job.input_dir.display(),
        job.output_dir.display(),
        job.format,
        job.hero_cap,
        job.prop_cap
    );

    let compressor = Texconv::new(&job.texconv, &job.format);
    let report = texture::run(&job, &compressor)?;

    if cli.strict && !report.failures.is_empty() {
        anyhow::bail!("{} of {} conversions failed", report.failures.len(), report.failures.len() + report.produced.len());
    }
    Ok(())
}
