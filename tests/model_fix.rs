use std::fs;
use std::path::Path;

use assetprep::Error;
use assetprep::onnx::proto::tensor_proto::DataType;
use assetprep::onnx::proto::{
    GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto, TypeProto, ValueInfoProto, type_proto,
};
use assetprep::onnx::tensor::half_values;
use assetprep::onnx::{FixRecipe, Preset, SaveOptions, load_model, run_recipe, save_model};

fn value(name: &str, dt: DataType) -> ValueInfoProto {
    ValueInfoProto {
        name: name.into(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor { elem_type: dt as i32, shape: None })),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// x, y -> Add(w) / Mul(w) with a 512-element float weight.
fn unet_like(outputs: &[&str]) -> ModelProto {
    let w: Vec<f32> = (0..512).map(|i| i as f32 * 0.25 - 64.0).collect();
    ModelProto {
        ir_version: 7,
        producer_name: "exporter".into(),
        opset_import: vec![OperatorSetIdProto { domain: String::new(), version: 14 }],
        graph: Some(GraphProto {
            name: "torch_jit".into(),
            node: vec![
                NodeProto {
                    op_type: "Add".into(),
                    name: "add".into(),
                    input: vec!["x".into(), "w".into()],
                    output: vec!["sample".into()],
                    ..Default::default()
                },
                NodeProto {
                    op_type: "Mul".into(),
                    name: "mul".into(),
                    input: vec!["x".into(), "w".into()],
                    output: vec!["aux".into()],
                    ..Default::default()
                },
            ],
            initializer: vec![TensorProto {
                name: "w".into(),
                data_type: DataType::Float as i32,
                dims: vec![512],
                raw_data: w.iter().flat_map(|v| v.to_le_bytes()).collect(),
                ..Default::default()
            }],
            input: vec![value("x", DataType::Float)],
            output: outputs.iter().map(|n| value(n, DataType::Float)).collect(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn write_inline(model: ModelProto, path: &Path) {
    save_model(model, path, &SaveOptions::default()).unwrap();
}

fn recipe(preset: Preset, input: &Path, output: &Path) -> FixRecipe {
    FixRecipe {
        data_location: Some("model_fp16.onnx.data".into()),
        ..FixRecipe::preset(preset).with_paths(Some(input), Some(output))
    }
}

#[test]
fn smart_keeps_io_types_and_every_output() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("model.onnx");
    let dst = dir.path().join("model_fp16.onnx");
    write_inline(unet_like(&["sample", "aux"]), &src);

    let report = run_recipe(&recipe(Preset::Smart, &src, &dst)).unwrap();
    assert_eq!((report.outputs_before, report.outputs_after), (2, 2));
    assert_eq!(report.saved.external_tensors, 1);
    assert_eq!(report.saved.external_bytes, 1024);

    let sidecar = dir.path().join("model_fp16.onnx.data");
    assert_eq!(fs::metadata(&sidecar).unwrap().len(), 1024);

    let fixed = load_model(&dst).unwrap();
    let graph = fixed.graph().unwrap();
    let names: Vec<&str> = graph.output.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["sample", "aux"]);
    assert!(graph.input.iter().chain(&graph.output).all(|v| v.tensor_elem_type() == Some(DataType::Float)));

    let w = graph.initializer.iter().find(|t| t.name == "w").unwrap();
    assert_eq!(w.elem_type(), DataType::Float16);
    let halves = half_values(w).unwrap();
    assert_eq!(halves.len(), 512);
    assert_eq!(halves[0].to_f32(), -64.0);
    assert_eq!(halves[511].to_f32(), 63.75);
}

#[test]
fn missing_outputs_abort_before_anything_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("model.onnx");
    let dst = dir.path().join("model_fp16.onnx");
    write_inline(unet_like(&[]), &src);

    let err = run_recipe(&recipe(Preset::Smart, &src, &dst)).unwrap_err();
    assert!(matches!(err, Error::NoOutputs { .. }), "{err}");
    assert!(!dst.exists());
    assert!(!dir.path().join("model_fp16.onnx.data").exists());
}

#[test]
fn repair_retypes_io_to_half() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("model.onnx");
    let dst = dir.path().join("model_fp16.onnx");
    write_inline(unet_like(&["sample"]), &src);

    let report = run_recipe(&recipe(Preset::Repair, &src, &dst)).unwrap();
    assert!(!report.grafted);

    let fixed = load_model(&dst).unwrap();
    let graph = fixed.graph().unwrap();
    assert_eq!(graph.input[0].tensor_elem_type(), Some(DataType::Float16));
    assert_eq!(graph.output[0].tensor_elem_type(), Some(DataType::Float16));
}

#[test]
fn transplant_restores_metadata_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("model.onnx");
    let broken = dir.path().join("model_fp16.onnx");
    write_inline(unet_like(&["sample", "aux"]), &source);

    let mut lost = unet_like(&[]);
    lost.opset_import.clear();
    lost.ir_version = 3;
    save_model(lost, &broken, &SaveOptions::external("model_fp16.onnx.data")).unwrap();

    let recipe = FixRecipe {
        transplant_from: Some(source.clone()),
        ..recipe(Preset::Transplant, &broken, &broken)
    };
    let report = run_recipe(&recipe).unwrap();
    assert!(report.grafted);
    assert_eq!(report.opset, Some(14));

    let fixed = load_model(&broken).unwrap();
    assert_eq!(fixed.ir_version, 7);
    assert_eq!(fixed.opset_import.len(), 1);
    assert_eq!(fixed.output_count(), 2);
    // weights survive the in-place resave through the same sidecar
    let w = &fixed.graph().unwrap().initializer[0];
    assert_eq!(w.raw_data.len(), 2048);
}

#[test]
fn force_opset_and_rename_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model_fp16.onnx");
    let mut model = unet_like(&["sample"]);
    model.opset_import.clear();
    write_inline(model, &path);

    let report = run_recipe(&recipe(Preset::ForceOpset, &path, &path)).unwrap();
    assert_eq!(report.opset, Some(17));
    assert_eq!(report.ir_version, 8);
    assert_eq!(report.graph_name, "SDXL_Turbo_UNet");

    let fixed = load_model(&path).unwrap();
    assert_eq!(fixed.opset_import, vec![OperatorSetIdProto { domain: String::new(), version: 17 }]);
    assert_eq!(fixed.graph().unwrap().name, "SDXL_Turbo_UNet");
    assert_eq!(fixed.producer_name, "exporter");
}
