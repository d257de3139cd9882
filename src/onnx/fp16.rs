// fp16.rs - Down-cast a model's float32 tensors to float16
//
// Initializers, constant attribute tensors, declared value types and
// Cast targets move to FLOAT16. Operators on the block list stay in
// float32 behind a pair of Cast nodes. With `keep_io_types` the graph's
// declared inputs and outputs keep FLOAT and boundary casts do the
// conversion inside the graph.

use std::collections::{HashMap, HashSet};

use half::f16;
use serde::Deserialize;
use tracing::debug;

use super::proto::attribute_proto::AttributeType;
use super::proto::tensor_proto::DataType;
use super::proto::{AttributeProto, GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto};
use super::tensor::{float_values, store_half, to_half};
use crate::error::{Error, Result};

/// Operators that have no float16 kernel in common runtimes.
pub const DEFAULT_OP_BLOCK_LIST: &[&str] = &[
    "ArrayFeatureExtractor", "Binarizer", "CastMap", "CategoryMapper", "DictVectorizer",
    "FeatureVectorizer", "Imputer", "LabelEncoder", "LinearClassifier", "LinearRegressor",
    "Normalizer", "OneHotEncoder", "RandomUniformLike", "SVMClassifier", "SVMRegressor",
    "Scaler", "TreeEnsembleClassifier", "TreeEnsembleRegressor", "ZipMap",
    "NonMaxSuppression", "TopK", "RoiAlign", "Resize", "Range", "CumSum", "Min", "Max",
    "Upsample",
];

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Fp16Options {
    /// Keep FLOAT on the graph's declared inputs and outputs.
    pub keep_io_types: bool,
    pub min_positive_val: f32,
    pub max_finite_val: f32,
    pub op_block_list: Vec<String>,
}

impl Default for Fp16Options {
    fn default() -> Self {
        Self {
            keep_io_types: false,
            min_positive_val: 1e-7,
            max_finite_val: 1e4,
            op_block_list: DEFAULT_OP_BLOCK_LIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fp16Summary {
    pub tensors: usize,
    pub value_infos: usize,
    pub cast_targets: usize,
    pub io_casts: usize,
    pub block_casts: usize,
}

pub fn convert_float_to_float16(model: &mut ModelProto, opts: &Fp16Options) -> Result<Fp16Summary> {
    let graph = model.graph.as_mut().ok_or(Error::MissingGraph)?;
    let block: HashSet<&str> = opts.op_block_list.iter().map(String::as_str).collect();
    let mut summary = Fp16Summary::default();

    let io_cast_nodes = if opts.keep_io_types {
        insert_io_casts(graph)
    } else {
        HashSet::new()
    };
    summary.io_casts = io_cast_nodes.len();

    convert_graph(graph, opts, &block, !opts.keep_io_types, &io_cast_nodes, &mut summary)?;
    debug!("fp16 conversion: {:?}", summary);
    Ok(summary)
}

fn convert_graph(
    graph: &mut GraphProto,
    opts: &Fp16Options,
    block: &HashSet<&str>,
    convert_io: bool,
    skip_nodes: &HashSet<String>,
    summary: &mut Fp16Summary,
) -> Result<()> {
    let io_names: HashSet<String> = if convert_io {
        HashSet::new()
    } else {
        graph.input.iter().chain(&graph.output).map(|v| v.name.clone()).collect()
    };

    // Initializers read only by blocked operators stay float32. So do
    // initializers listed as kept-FLOAT graph inputs; an initializer and
    // its input entry must always agree on the element type.
    let mut keep_float = blocked_only_initializers(graph, block);
    keep_float.extend(io_names.iter().cloned());

    if convert_io {
        for v in graph.input.iter_mut().chain(graph.output.iter_mut()) {
            if !keep_float.contains(&v.name) {
                summary.value_infos += usize::from(retype_half(v));
            }
        }
    }
    for v in &mut graph.value_info {
        if !keep_float.contains(&v.name) {
            summary.value_infos += usize::from(retype_half(v));
        }
    }

    for t in &mut graph.initializer {
        if t.elem_type() == DataType::Float && !keep_float.contains(&t.name) {
            convert_tensor(t, opts)?;
            summary.tensors += 1;
        }
    }

    let half_names = declared_half(graph);
    let nodes = std::mem::take(&mut graph.node);
    let mut out = Vec::with_capacity(nodes.len());

    for (idx, mut node) in nodes.into_iter().enumerate() {
        if block.contains(node.op_type.as_str()) {
            let base = if node.name.is_empty() {
                format!("{}_{}", node.op_type, idx)
            } else {
                node.name.clone()
            };

            for (i, input) in node.input.iter_mut().enumerate() {
                if !half_names.contains(input.as_str()) {
                    continue;
                }
                let cast_out = format!("{base}_input_cast_{i}");
                out.push(cast_node(format!("{base}_input_cast{i}"), input.clone(), cast_out.clone(), DataType::Float));
                *input = cast_out;
                summary.block_casts += 1;
            }

            let mut after = Vec::new();
            for (i, output) in node.output.iter_mut().enumerate() {
                if !half_names.contains(output.as_str()) {
                    continue;
                }
                let cast_in = format!("{base}_output_cast_{i}");
                after.push(cast_node(format!("{base}_output_cast{i}"), cast_in.clone(), output.clone(), DataType::Float16));
                *output = cast_in;
                summary.block_casts += 1;
            }

            out.push(node);
            out.extend(after);
            continue;
        }

        if !skip_nodes.contains(&node.name) {
            convert_node(&mut node, opts, block, summary)?;
        }
        out.push(node);
    }

    graph.node = out;
    Ok(())
}

fn convert_node(
    node: &mut NodeProto,
    opts: &Fp16Options,
    block: &HashSet<&str>,
    summary: &mut Fp16Summary,
) -> Result<()> {
    let is_cast = node.op_type == "Cast";
    let no_skip = HashSet::new();

    for attr in &mut node.attribute {
        if is_cast && attr.name == "to" && attr.i == DataType::Float as i64 {
            attr.i = DataType::Float16 as i64;
            summary.cast_targets += 1;
        }
        if let Some(t) = attr.t.as_mut() {
            if t.elem_type() == DataType::Float {
                convert_tensor(t, opts)?;
                summary.tensors += 1;
            }
        }
        for t in &mut attr.tensors {
            if t.elem_type() == DataType::Float {
                convert_tensor(t, opts)?;
                summary.tensors += 1;
            }
        }
        if let Some(g) = attr.g.as_mut() {
            convert_graph(g, opts, block, true, &no_skip, summary)?;
        }
        for g in &mut attr.graphs {
            convert_graph(g, opts, block, true, &no_skip, summary)?;
        }
    }
    Ok(())
}

fn convert_tensor(t: &mut TensorProto, opts: &Fp16Options) -> Result<()> {
    let values = float_values(t)?;
    let halves: Vec<f16> = values
        .iter()
        .map(|&v| to_half(v, opts.min_positive_val, opts.max_finite_val))
        .collect();
    store_half(t, &halves);
    Ok(())
}

// ============================================================================
// Boundary casts (keep_io_types)
// ============================================================================

/// Route float inputs/outputs through Cast nodes so the declared I/O
/// types stay FLOAT. Returns the names of the inserted nodes.
fn insert_io_casts(graph: &mut GraphProto) -> HashSet<String> {
    let mut inserted = HashSet::new();
    let mut front = Vec::new();
    let mut back = Vec::new();
    let mut value_infos = Vec::new();

    for (i, input) in graph.input.iter().enumerate() {
        if input.tensor_elem_type() != Some(DataType::Float) {
            continue;
        }
        // Initializers that older exporters also list as inputs get a cast
        // too; the initializer itself stays FLOAT to match its declaration.
        let cast_out = format!("graph_input_cast_{i}");
        for node in &mut graph.node {
            for name in &mut node.input {
                if *name == input.name {
                    *name = cast_out.clone();
                }
            }
        }

        value_infos.push(half_alias(input, &cast_out));
        let node_name = format!("graph_input_cast{i}");
        front.push(cast_node(node_name.clone(), input.name.clone(), cast_out, DataType::Float16));
        inserted.insert(node_name);
    }

    for (i, output) in graph.output.iter().enumerate() {
        if output.tensor_elem_type() != Some(DataType::Float) {
            continue;
        }
        if !graph.node.iter().any(|n| n.output.contains(&output.name)) {
            continue;
        }

        let cast_in = format!("graph_output_cast_{i}");
        for node in &mut graph.node {
            for name in node.output.iter_mut().chain(node.input.iter_mut()) {
                if *name == output.name {
                    *name = cast_in.clone();
                }
            }
        }

        value_infos.push(half_alias(output, &cast_in));
        let node_name = format!("graph_output_cast{i}");
        back.push(cast_node(node_name.clone(), cast_in, output.name.clone(), DataType::Float));
        inserted.insert(node_name);
    }

    graph.node.splice(0..0, front);
    graph.node.extend(back);
    graph.value_info.extend(value_infos);
    inserted
}

fn half_alias(v: &ValueInfoProto, name: &str) -> ValueInfoProto {
    let mut alias = v.clone();
    alias.name = name.to_string();
    alias.set_tensor_elem_type(DataType::Float16);
    alias
}

fn cast_node(name: String, input: String, output: String, to: DataType) -> NodeProto {
    NodeProto {
        name,
        op_type: "Cast".into(),
        input: vec![input],
        output: vec![output],
        attribute: vec![AttributeProto {
            name: "to".into(),
            r#type: AttributeType::Int as i32,
            i: to as i64,
            ..Default::default()
        }],
        ..Default::default()
    }
}

// ============================================================================
// Type bookkeeping
// ============================================================================

fn retype_half(v: &mut ValueInfoProto) -> bool {
    if v.tensor_elem_type() == Some(DataType::Float) {
        v.set_tensor_elem_type(DataType::Float16);
        true
    } else {
        false
    }
}

/// Names whose declared type is FLOAT16 after conversion.
fn declared_half(graph: &GraphProto) -> HashSet<String> {
    let declared = graph
        .input
        .iter()
        .chain(&graph.output)
        .chain(&graph.value_info)
        .filter(|v| v.tensor_elem_type() == Some(DataType::Float16))
        .map(|v| v.name.clone());
    let initializers = graph
        .initializer
        .iter()
        .filter(|t| t.elem_type() == DataType::Float16)
        .map(|t| t.name.clone());
    declared.chain(initializers).collect()
}

fn blocked_only_initializers(graph: &GraphProto, block: &HashSet<&str>) -> HashSet<String> {
    // name -> (all readers, blocked readers)
    let mut readers: HashMap<&str, (usize, usize)> = HashMap::new();
    for node in &graph.node {
        let blocked = block.contains(node.op_type.as_str());
        for input in &node.input {
            let e = readers.entry(input.as_str()).or_default();
            e.0 += 1;
            e.1 += usize::from(blocked);
        }
    }
    graph
        .initializer
        .iter()
        .filter(|t| matches!(readers.get(t.name.as_str()), Some(&(all, blocked)) if all > 0 && all == blocked))
        .map(|t| t.name.clone())
        .collect()
}
