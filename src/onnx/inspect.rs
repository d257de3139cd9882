// inspect.rs - Summarize a model's top-level metadata

use std::collections::BTreeMap;

use tracing::info;

use super::proto::tensor_proto::DataType;
use super::proto::{ModelProto, TensorProto, ValueInfoProto};
use super::walk::for_each_tensor;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ModelInfo {
    pub ir_version: i64,
    pub opsets: Vec<(String, i64)>,
    pub producer: String,
    pub graph_name: String,
    pub inputs: Vec<(String, &'static str)>,
    pub outputs: Vec<(String, &'static str)>,
    /// Tensor count per element type, across all graphs.
    pub tensors: BTreeMap<&'static str, usize>,
}

pub fn inspect(model: &ModelProto) -> ModelInfo {
    let mut tensors = BTreeMap::new();
    for_each_tensor(model, &mut |t: &TensorProto| {
        *tensors.entry(t.elem_type().as_str_name()).or_insert(0) += 1;
    });

    let describe = |v: &ValueInfoProto| {
        let ty = v.tensor_elem_type().map_or("non-tensor", |dt: DataType| dt.as_str_name());
        (v.name.clone(), ty)
    };
    let graph = model.graph();

    ModelInfo {
        ir_version: model.ir_version,
        opsets: model.opset_import.iter().map(|op| (op.domain.clone(), op.version)).collect(),
        producer: format!("{} {}", model.producer_name, model.producer_version).trim().to_string(),
        graph_name: graph.map(|g| g.name.clone()).unwrap_or_default(),
        inputs: graph.map(|g| g.input.iter().map(describe).collect()).unwrap_or_default(),
        outputs: graph.map(|g| g.output.iter().map(describe).collect()).unwrap_or_default(),
        tensors,
    }
}

pub fn log_info(info: &ModelInfo) {
    info!("  IR version: {}", info.ir_version);
    for (domain, version) in &info.opsets {
        let domain = if domain.is_empty() { "ai.onnx" } else { domain.as_str() };
        info!("  Opset: {} v{}", domain, version);
    }
    if !info.producer.is_empty() {
        info!("  Producer: {}", info.producer);
    }
    info!("  Graph: '{}'", info.graph_name);
    info!("  Inputs ({}):", info.inputs.len());
    for (name, ty) in &info.inputs {
        info!("    {} [{}]", name, ty);
    }
    info!("  Outputs ({}):", info.outputs.len());
    for (name, ty) in &info.outputs {
        info!("    {} [{}]", name, ty);
    }
    for (ty, count) in &info.tensors {
        info!("  {} tensors: {}", ty, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::proto::{GraphProto, OperatorSetIdProto};

    #[test]
    fn counts_tensors_by_type() {
        let t = |dt: DataType| TensorProto { data_type: dt as i32, ..Default::default() };
        let model = ModelProto {
            ir_version: 8,
            opset_import: vec![OperatorSetIdProto { domain: String::new(), version: 17 }],
            graph: Some(GraphProto {
                name: "unet".into(),
                initializer: vec![t(DataType::Float16), t(DataType::Float16), t(DataType::Int64)],
                input: vec![ValueInfoProto { name: "sample".into(), ..Default::default() }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = inspect(&model);
        assert_eq!(info.graph_name, "unet");
        assert_eq!(info.opsets, vec![(String::new(), 17)]);
        assert_eq!(info.inputs, vec![("sample".to_string(), "non-tensor")]);
        assert_eq!(info.tensors.get("FLOAT16"), Some(&2));
        assert_eq!(info.tensors.get("INT64"), Some(&1));
    }
}
