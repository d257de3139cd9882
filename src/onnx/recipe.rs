// recipe.rs - Load, patch and save a model in one pass
//
// A recipe lists which fixes to apply. Every check runs before anything is
// written, so a failed precondition leaves the output untouched.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::fp16::{Fp16Options, Fp16Summary, convert_float_to_float16};
use super::io::{DEFAULT_SIZE_THRESHOLD, SaveOptions, SaveSummary, load_model, save_model};
use super::patch::{
    force_opset, graft_outputs, log_summary, primary_opset, require_outputs, set_graph_name,
    set_ir_version, transplant_metadata,
};
use crate::error::Result;

pub const DEFAULT_SOURCE: &str = "models/dreamer/onnx/sdxl_turbo_unet_768x768.onnx";
pub const DEFAULT_FP16: &str = "models/dreamer/onnx/sdxl_turbo_unet_768x768_fp16.onnx";
pub const DEFAULT_DATA_LOCATION: &str = "sdxl_turbo_unet_768x768_fp16.onnx.data";
pub const DEFAULT_GRAPH_NAME: &str = "SDXL_Turbo_UNet";
pub const DEFAULT_OPSET: i64 = 17;
pub const DEFAULT_IR_VERSION: i64 = 8;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FixRecipe {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Sidecar for tensor payloads; `None` writes a single inline file.
    pub data_location: Option<String>,
    pub size_threshold: usize,
    pub fp16: Option<Fp16Options>,
    /// Restore the pre-conversion outputs if the graph ends up with none.
    pub graft_outputs: bool,
    /// Copy opset, IR version (and outputs if missing) from this model.
    pub transplant_from: Option<PathBuf>,
    pub opset: Option<i64>,
    pub ir_version: Option<i64>,
    pub graph_name: Option<String>,
    /// Abort unless the graph declares outputs before and after the fixes.
    pub require_outputs: bool,
}

impl Default for FixRecipe {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_SOURCE),
            output: PathBuf::from(DEFAULT_FP16),
            data_location: Some(DEFAULT_DATA_LOCATION.to_string()),
            size_threshold: DEFAULT_SIZE_THRESHOLD,
            fp16: None,
            graft_outputs: false,
            transplant_from: None,
            opset: None,
            ir_version: None,
            graph_name: None,
            require_outputs: false,
        }
    }
}

/// The canned fixes, one per known failure of an fp16 export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// Plain float16 conversion.
    Convert,
    /// float16 conversion, then re-attach outputs the converter dropped.
    Repair,
    /// float16 conversion keeping I/O types, outputs required on both sides.
    Smart,
    /// Name the graph in place.
    Rename,
    /// Force opset 17, IR 8 and the graph name in place.
    ForceOpset,
    /// Copy opset/IR/outputs from the source model onto the fp16 one in place.
    Transplant,
}

impl FixRecipe {
    pub fn preset(preset: Preset) -> Self {
        let base = Self::default();
        let in_place = Self { input: PathBuf::from(DEFAULT_FP16), ..Self::default() };
        match preset {
            Preset::Convert => Self { fp16: Some(Fp16Options::default()), ..base },
            Preset::Repair => Self { fp16: Some(Fp16Options::default()), graft_outputs: true, ..base },
            Preset::Smart => Self {
                fp16: Some(Fp16Options { keep_io_types: true, ..Default::default() }),
                require_outputs: true,
                ..base
            },
            Preset::Rename => Self { graph_name: Some(DEFAULT_GRAPH_NAME.into()), ..in_place },
            Preset::ForceOpset => Self {
                opset: Some(DEFAULT_OPSET),
                ir_version: Some(DEFAULT_IR_VERSION),
                graph_name: Some(DEFAULT_GRAPH_NAME.into()),
                ..in_place
            },
            Preset::Transplant => Self { transplant_from: Some(PathBuf::from(DEFAULT_SOURCE)), ..in_place },
        }
    }

    pub fn with_paths(mut self, input: Option<&Path>, output: Option<&Path>) -> Self {
        if let Some(p) = input {
            self.input = p.to_path_buf();
        }
        if let Some(p) = output {
            self.output = p.to_path_buf();
        }
        self
    }
}

#[derive(Debug, Default)]
pub struct FixReport {
    pub inputs_before: usize,
    pub outputs_before: usize,
    pub inputs_after: usize,
    pub outputs_after: usize,
    pub opset: Option<i64>,
    pub ir_version: i64,
    pub graph_name: String,
    pub grafted: bool,
    pub fp16: Option<Fp16Summary>,
    pub saved: SaveSummary,
}

pub fn run_recipe(recipe: &FixRecipe) -> Result<FixReport> {
    let mut step = 1;
    info!("{}. Loading model from {}...", step, recipe.input.display());
    let mut model = load_model(&recipe.input)?;
    log_summary(&model, "Original");

    let mut report = FixReport {
        inputs_before: model.input_count(),
        outputs_before: model.output_count(),
        ..Default::default()
    };

    if recipe.require_outputs {
        require_outputs(&model, "source model")?;
    }
    let original_outputs = model.graph().map(|g| g.output.clone()).unwrap_or_default();

    if let Some(opts) = &recipe.fp16 {
        step += 1;
        let mode = if opts.keep_io_types { " (keeping I/O types)" } else { "" };
        info!("{}. Converting to FP16{}...", step, mode);
        let summary = convert_float_to_float16(&mut model, opts)?;
        info!(
            "   > {} tensors, {} value types, {} boundary casts, {} block-list casts",
            summary.tensors, summary.value_infos, summary.io_casts, summary.block_casts
        );
        report.fp16 = Some(summary);
    }

    if recipe.graft_outputs {
        step += 1;
        info!("{}. Checking for missing outputs...", step);
        if graft_outputs(&mut model, &original_outputs) {
            info!("   > Outputs are missing! Grafted {} original outputs back on", original_outputs.len());
            report.grafted = true;
        } else {
            info!("   > Outputs survived, nothing to graft");
        }
    }

    if let Some(reference_path) = &recipe.transplant_from {
        step += 1;
        info!("{}. Transplanting metadata from {}...", step, reference_path.display());
        let reference = load_model(reference_path)?;
        log_summary(&reference, "Reference");
        if transplant_metadata(&mut model, &reference) {
            info!("   > Re-grafted outputs from reference");
            report.grafted = true;
        }
    }

    if let Some(v) = recipe.opset {
        step += 1;
        info!("{}. Forcing opset version to {}...", step, v);
        force_opset(&mut model, v);
    }
    if let Some(v) = recipe.ir_version {
        step += 1;
        info!("{}. Setting IR version to {}...", step, v);
        set_ir_version(&mut model, v);
    }
    if let Some(name) = &recipe.graph_name {
        step += 1;
        info!("{}. Setting graph name to '{}'...", step, name);
        set_graph_name(&mut model, name);
    }

    if recipe.require_outputs || recipe.graft_outputs || recipe.transplant_from.is_some() {
        require_outputs(&model, "after fixes")?;
    }
    log_summary(&model, "Result");

    report.inputs_after = model.input_count();
    report.outputs_after = model.output_count();
    report.opset = primary_opset(&model);
    report.ir_version = model.ir_version;
    report.graph_name = model.graph().map(|g| g.name.clone()).unwrap_or_default();

    step += 1;
    info!("{}. Saving to {}...", step, recipe.output.display());
    let opts = SaveOptions { location: recipe.data_location.clone(), size_threshold: recipe.size_threshold };
    report.saved = save_model(model, &recipe.output, &opts)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_known_fixes() {
        let smart = FixRecipe::preset(Preset::Smart);
        assert!(smart.require_outputs);
        assert!(smart.fp16.as_ref().unwrap().keep_io_types);
        assert_eq!(smart.output, PathBuf::from(DEFAULT_FP16));

        let force = FixRecipe::preset(Preset::ForceOpset);
        assert_eq!(force.input, force.output);
        assert_eq!(force.opset, Some(17));
        assert_eq!(force.ir_version, Some(8));
        assert_eq!(force.graph_name.as_deref(), Some("SDXL_Turbo_UNet"));

        let transplant = FixRecipe::preset(Preset::Transplant);
        assert_eq!(transplant.transplant_from, Some(PathBuf::from(DEFAULT_SOURCE)));
        assert!(transplant.fp16.is_none());
    }

    #[test]
    fn recipe_parses_from_toml() {
        let recipe: FixRecipe = toml::from_str(
            r#"
            input = "a.onnx"
            output = "b.onnx"
            graft_outputs = true
            opset = 18

            [fp16]
            keep_io_types = true
            "#,
        )
        .unwrap();
        assert_eq!(recipe.input, PathBuf::from("a.onnx"));
        assert_eq!(recipe.opset, Some(18));
        assert_eq!(recipe.data_location.as_deref(), Some(DEFAULT_DATA_LOCATION));
        let fp16 = recipe.fp16.unwrap();
        assert!(fp16.keep_io_types);
        assert_eq!(fp16.max_finite_val, 1e4);
        assert!(fp16.op_block_list.iter().any(|op| op == "Resize"));
    }
}
