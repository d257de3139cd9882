// batch.rs - Normal map batch conversion
//
// For every matching source: normalize into the shared intermediate, then
// compress once per output target and move the result into place.
// Per-file problems are logged and skipped; the batch keeps going.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::classify::{classify, resolution_cap};
use super::normal;
use super::texconv::{Compressor, relocate_output};
use crate::config::TextureJob;
use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Produced {
    pub source: PathBuf,
    pub target: String,
    pub path: PathBuf,
    pub cap: u32,
}

#[derive(Debug)]
pub struct Failure {
    pub source: PathBuf,
    /// `None` when the source itself could not be read.
    pub target: Option<String>,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub sources: usize,
    pub produced: Vec<Produced>,
    pub failures: Vec<Failure>,
}

/// Removes the intermediate when the batch ends, however it ends.
struct Intermediate<'a>(&'a Path);

impl Drop for Intermediate<'_> {
    fn drop(&mut self) {
        if self.0.exists() {
            match fs::remove_file(self.0) {
                Ok(()) => debug!("removed {}", self.0.display()),
                Err(e) => warn!("could not remove {}: {}", self.0.display(), e),
            }
        }
    }
}

/// Source files in `job.input_dir` that look like normal maps, by name.
pub fn collect_sources(job: &TextureJob) -> Result<Vec<PathBuf>> {
    let ext = job.extension.to_lowercase();
    let entries = fs::read_dir(&job.input_dir).map_err(|e| Error::io(&job.input_dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(&job.input_dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.to_lowercase().ends_with(&ext) && name.contains(&job.marker) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn run(job: &TextureJob, compressor: &dyn Compressor) -> Result<BatchReport> {
    let mut report = BatchReport::default();

    if !job.input_dir.is_dir() {
        error!("Input directory does not exist: {}", job.input_dir.display());
        return Ok(report);
    }
    fs::create_dir_all(&job.output_dir).map_err(|e| Error::io(&job.output_dir, e))?;

    let sources = collect_sources(job)?;
    if sources.is_empty() {
        info!("No normal maps found in {}", job.input_dir.display());
        return Ok(report);
    }
    report.sources = sources.len();

    let _cleanup = Intermediate(&job.intermediate);

    for source in &sources {
        let filename = source.file_name().unwrap_or_default().to_string_lossy();
        info!("Processing: {}...", filename);

        let prepared = match normal::prepare(source, &job.intermediate) {
            Ok(p) => p,
            Err(e) => {
                error!("  Could not read {}: {}", source.display(), e);
                report.failures.push(Failure { source: source.clone(), target: None, error: e });
                continue;
            }
        };
        if prepared.remapped {
            info!("  Remapped signed data (min {:.3}) into 0..1", prepared.min.unwrap_or_default());
        }

        for target in classify(&job.categories, &filename, &job.fallback_target) {
            let cap = resolution_cap(target, &job.hero_targets, job.hero_cap, job.prop_cap);
            let final_path = job.output_dir.join(format!("{}.dds", target));

            if let Err(e) = compressor.compress(&job.intermediate, &job.output_dir, cap) {
                error!("  Compression failed for {} -> {}: {}", filename, target, e);
                report.failures.push(Failure { source: source.clone(), target: Some(target.into()), error: e });
                continue;
            }

            match relocate_output(&job.output_dir, &job.expected_output, &job.intermediate, &final_path) {
                Ok(moved) => {
                    let alt = if moved.fallback { " (alt)" } else { "" };
                    info!("  -> Generated{}: {} ({}px cap)", alt, final_path.display(), cap);
                    report.produced.push(Produced {
                        source: source.clone(),
                        target: target.into(),
                        path: final_path,
                        cap,
                    });
                }
                Err(e) => {
                    match &e {
                        Error::MissingOutput { .. } => warn!("  Expected DDS not found for {}: {}", filename, e),
                        _ => error!("  Could not move DDS for {} -> {}: {}", filename, target, e),
                    }
                    report.failures.push(Failure { source: source.clone(), target: Some(target.into()), error: e });
                }
            }
        }
    }

    info!(
        "Done. {} sources, {} DDS written, {} failures.",
        report.sources,
        report.produced.len(),
        report.failures.len()
    );
    Ok(report)
}
