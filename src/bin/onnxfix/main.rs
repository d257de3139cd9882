// onnxfix - Repair and down-cast an exported ONNX model
//
// Fixes:
//   convert      float32 -> float16
//   repair       float16 + re-attach outputs the converter dropped
//   smart        float16 keeping I/O types, outputs required before and after
//   rename       name the graph
//   force-opset  opset 17, IR 8, graph name
//   transplant   copy opset/IR/outputs from the original export
//   run          any combination, from a TOML recipe
//
// Every fix saves with tensor payloads in a sidecar file unless --inline.
//
// Usage: cargo run --bin onnxfix -- smart --input unet.onnx --output unet_fp16.onnx

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use assetprep::config::load_toml;
use assetprep::onnx::inspect::{inspect, log_info};
use assetprep::onnx::verify::verify_model;
use assetprep::onnx::{FixRecipe, FixReport, Preset, load_model, run_recipe};

#[derive(Parser)]
#[command(name = "onnxfix", about = "Patch precision and metadata of an ONNX model")]
struct Cli {
    /// Log debug detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Convert(FixArgs),
    Repair(FixArgs),
    Smart(FixArgs),
    Rename {
        #[command(flatten)]
        fix: FixArgs,
        #[arg(long)]
        name: Option<String>,
    },
    ForceOpset {
        #[command(flatten)]
        fix: FixArgs,
        #[arg(long)]
        opset: Option<i64>,
        #[arg(long)]
        ir_version: Option<i64>,
        #[arg(long)]
        name: Option<String>,
    },
    Transplant {
        #[command(flatten)]
        fix: FixArgs,
        /// Model to copy opset, IR version and outputs from
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Apply a TOML recipe
    Run {
        config: PathBuf,
        #[arg(long)]
        verify: bool,
    },
    /// Print opsets, IR version, graph name and I/O
    Inspect { model: PathBuf },
    /// Open a model in ONNX Runtime and list its signature
    Verify { model: PathBuf },
}

#[derive(Args)]
struct FixArgs {
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    output: Option<PathBuf>,
    /// Sidecar file name for tensor data
    #[arg(long, conflicts_with = "inline")]
    data_location: Option<String>,
    /// Keep all tensors inside the model file
    #[arg(long)]
    inline: bool,
    /// Open the saved model in ONNX Runtime afterwards
    #[arg(long)]
    verify: bool,
}

impl FixArgs {
    fn apply(&self, preset: Preset) -> FixRecipe {
        let mut recipe = FixRecipe::preset(preset).with_paths(self.input.as_deref(), self.output.as_deref());
        // In-place fixes follow --input unless --output says otherwise
        if recipe_is_in_place(preset) && self.output.is_none() {
            recipe.output = recipe.input.clone();
        }
        if self.inline {
            recipe.data_location = None;
        } else if let Some(loc) = &self.data_location {
            recipe.data_location = Some(loc.clone());
        }
        recipe
    }
}

fn recipe_is_in_place(preset: Preset) -> bool {
    matches!(preset, Preset::Rename | Preset::ForceOpset | Preset::Transplant)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    assetprep::logging::init(cli.verbose);

    let (recipe, verify) = match cli.command {
        Command::Convert(args) => (args.apply(Preset::Convert), args.verify),
        Command::Repair(args) => (args.apply(Preset::Repair), args.verify),
        Command::Smart(args) => (args.apply(Preset::Smart), args.verify),
        Command::Rename { fix, name } => {
            let mut recipe = fix.apply(Preset::Rename);
            if name.is_some() {
                recipe.graph_name = name;
            }
            (recipe, fix.verify)
        }
        Command::ForceOpset { fix, opset, ir_version, name } => {
            let mut recipe = fix.apply(Preset::ForceOpset);
            recipe.opset = opset.or(recipe.opset);
            recipe.ir_version = ir_version.or(recipe.ir_version);
            recipe.graph_name = name.or(recipe.graph_name);
            (recipe, fix.verify)
        }
        Command::Transplant { fix, source } => {
            let mut recipe = fix.apply(Preset::Transplant);
            recipe.transplant_from = source.or(recipe.transplant_from);
            (recipe, fix.verify)
        }
        Command::Run { config, verify } => {
            let recipe: FixRecipe = load_toml(&config)
                .with_context(|| format!("loading recipe {}", config.display()))?;
            (recipe, verify)
        }
        Command::Inspect { model } => {
            info!("Loading {}...", model.display());
            let m = load_model(&model).with_context(|| format!("loading {}", model.display()))?;
            log_info(&inspect(&m));
            return Ok(());
        }
        Command::Verify { model } => {
            info!("Opening {} in ONNX Runtime...", model.display());
            verify_model(&model)?;
            info!("Model loads.");
            return Ok(());
        }
    };

    let report = run_recipe(&recipe)
        .with_context(|| format!("fixing {}", recipe.input.display()))?;
    print_report(&report);

    if verify {
        info!("Verifying {} in ONNX Runtime...", recipe.output.display());
        verify_model(&recipe.output)?;
    }

    info!("Done! The graph is valid and has {} outputs.", report.outputs_after);
    Ok(())
}

fn print_report(report: &FixReport) {
    info!(
        "  Inputs {} -> {}, outputs {} -> {}{}",
        report.inputs_before,
        report.inputs_after,
        report.outputs_before,
        report.outputs_after,
        if report.grafted { " (grafted)" } else { "" }
    );
    if let Some(fp16) = &report.fp16 {
        info!("  Converted {} tensors to FP16", fp16.tensors);
    }
}
