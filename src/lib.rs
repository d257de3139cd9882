// ============================================================================
// ASSETPREP - One-shot fixes for exported models and texture sets
// ============================================================================
//
// onnx/     Load, down-cast, patch and re-save ONNX models
// texture/  Batch-convert EXR normal maps to BC5 DDS via texconv
//
// Both jobs are single-threaded and run start to finish; configuration is
// plain data (see `config`) so the jobs can be pointed elsewhere without
// code changes.

pub mod config;
pub mod error;
pub mod logging;
pub mod onnx;
pub mod texture;

pub use error::{Error, Result};
