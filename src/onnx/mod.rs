// onnx - Model fixer
//
// Load a serialized model, patch precision and top-level metadata, save it
// back in the external-data layout.

pub mod fp16;
pub mod inspect;
pub mod io;
pub mod patch;
pub mod proto;
pub mod recipe;
pub mod tensor;
pub mod verify;
mod walk;

pub use fp16::{Fp16Options, convert_float_to_float16};
pub use io::{SaveOptions, load_model, save_model};
pub use recipe::{FixRecipe, FixReport, Preset, run_recipe};
