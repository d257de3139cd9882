// verify.rs - Check that a patched model opens in ONNX Runtime
//
// Building a session runs the runtime's own graph checks, which catch the
// failures the fixes target (unnamed graph, missing outputs, wrong opset).

use std::path::Path;

use ort::session::Session;
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct SessionSignature {
    pub inputs: Vec<(String, String)>,
    pub outputs: Vec<(String, String)>,
}

/// Open `path` in a runtime session and return its signature.
/// A session with no outputs is an error.
pub fn verify_model(path: &Path) -> Result<SessionSignature> {
    if !path.exists() {
        return Err(Error::io(path, std::io::Error::from(std::io::ErrorKind::NotFound)));
    }

    let session = Session::builder()
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| Error::Runtime(e.to_string()))?;

    let signature = SessionSignature {
        inputs: session
            .inputs
            .iter()
            .map(|i| (i.name.clone(), format!("{:?}", i.input_type)))
            .collect(),
        outputs: session
            .outputs
            .iter()
            .map(|o| (o.name.clone(), format!("{:?}", o.output_type)))
            .collect(),
    };

    for (name, ty) in &signature.inputs {
        info!("   > input  {}: {}", name, ty);
    }
    for (name, ty) in &signature.outputs {
        info!("   > output {}: {}", name, ty);
    }

    if signature.outputs.is_empty() {
        return Err(Error::NoOutputs { stage: "runtime session" });
    }
    Ok(signature)
}
