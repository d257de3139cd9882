// patch.rs - Top-level metadata fixes
//
// Opset, IR version, graph name, and output-list repair.

use tracing::info;

use super::proto::{ModelProto, OperatorSetIdProto, ValueInfoProto};
use crate::error::{Error, Result};

/// Force the operator-set version. Adds a default-domain entry when the
/// model declares none, otherwise overwrites the first entry.
pub fn force_opset(model: &mut ModelProto, version: i64) {
    match model.opset_import.first_mut() {
        Some(op) => op.version = version,
        None => model.opset_import.push(OperatorSetIdProto { domain: String::new(), version }),
    }
}

pub fn set_ir_version(model: &mut ModelProto, version: i64) {
    model.ir_version = version;
}

pub fn set_graph_name(model: &mut ModelProto, name: &str) {
    model.graph_mut().name = name.to_string();
}

/// Re-attach outputs to a graph that lost them. Does nothing (and
/// returns false) when the graph still declares outputs.
pub fn graft_outputs(model: &mut ModelProto, outputs: &[ValueInfoProto]) -> bool {
    let graph = model.graph_mut();
    if !graph.output.is_empty() {
        return false;
    }
    graph.output.extend_from_slice(outputs);
    true
}

/// Copy opset list and IR version from `source`, and its outputs when the
/// target has none. Returns whether outputs were grafted.
pub fn transplant_metadata(target: &mut ModelProto, source: &ModelProto) -> bool {
    target.opset_import = source.opset_import.clone();
    target.ir_version = source.ir_version;
    let outputs = source.graph().map(|g| g.output.as_slice()).unwrap_or(&[]);
    graft_outputs(target, outputs)
}

/// Fails when the graph declares no outputs.
pub fn require_outputs(model: &ModelProto, stage: &'static str) -> Result<()> {
    if model.output_count() == 0 {
        return Err(Error::NoOutputs { stage });
    }
    Ok(())
}

pub fn primary_opset(model: &ModelProto) -> Option<i64> {
    model.opset_import.first().map(|op| op.version)
}

/// Log the fields these fixes touch.
pub fn log_summary(model: &ModelProto, label: &str) {
    let opset = primary_opset(model).map_or("None".to_string(), |v| v.to_string());
    info!(
        "   > {}: opset {}, IR {}, graph '{}', {} inputs, {} outputs",
        label,
        opset,
        model.ir_version,
        model.graph().map_or("", |g| g.name.as_str()),
        model.input_count(),
        model.output_count()
    );
}
