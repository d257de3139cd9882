// error.rs - Library error type
//
// Fatal conditions propagate as `Error`; the texture batch downgrades the
// per-file ones to logged failures.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode ONNX model {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: prost::DecodeError,
    },

    #[error("model has no graph")]
    MissingGraph,

    #[error("graph has no declared outputs ({stage})")]
    NoOutputs { stage: &'static str },

    #[error("tensor '{tensor}': bad external data: {reason}")]
    ExternalData { tensor: String, reason: String },

    #[error("tensor '{tensor}': {reason}")]
    Tensor { tensor: String, reason: String },

    #[error("image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("raster {}: {reason}", path.display())]
    Raster { path: PathBuf, reason: String },

    #[error("config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("onnx runtime: {0}")]
    Runtime(String),

    #[error("{tool} exited with {status}")]
    CompressorFailed { tool: String, status: String },

    #[error("expected compressor output not found (tried {tried:?})")]
    MissingOutput { tried: Vec<PathBuf> },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
