// texture - EXR normal maps to block-compressed DDS

pub mod batch;
pub mod classify;
pub mod normal;
pub mod texconv;

pub use batch::{BatchReport, run};
pub use texconv::{Compressor, Texconv};
