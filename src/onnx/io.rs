// io.rs - Load and save ONNX models
//
// Loading pulls external tensor data back into `raw_data` so the whole
// model lives in memory. Saving can split large tensors into a single
// sidecar file next to the model (the "external data" layout).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use prost::Message;
use tracing::{debug, info, warn};

use super::proto::tensor_proto::DataLocation;
use super::proto::{ModelProto, StringStringEntryProto, TensorProto};
use super::tensor::typed_to_raw;
use super::walk::for_each_tensor_mut;
use crate::error::{Error, Result};

/// Tensors smaller than this stay inline in the model file.
pub const DEFAULT_SIZE_THRESHOLD: usize = 1024;

#[derive(Clone, Debug)]
pub struct SaveOptions {
    /// Sidecar file name, resolved next to the output model.
    /// `None` saves everything inline.
    pub location: Option<String>,
    pub size_threshold: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { location: None, size_threshold: DEFAULT_SIZE_THRESHOLD }
    }
}

impl SaveOptions {
    pub fn external(location: impl Into<String>) -> Self {
        Self { location: Some(location.into()), ..Default::default() }
    }
}

#[derive(Debug, Default)]
pub struct SaveSummary {
    pub model_path: PathBuf,
    pub data_path: Option<PathBuf>,
    pub external_tensors: usize,
    pub external_bytes: u64,
}

/// Load a model, resolving external tensor data relative to its directory.
pub fn load_model(path: &Path) -> Result<ModelProto> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let mut model = ModelProto::decode(bytes.as_slice())
        .map_err(|source| Error::Decode { path: path.to_path_buf(), source })?;
    drop(bytes);

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let loaded = load_external_data(&mut model, base)?;
    if loaded > 0 {
        debug!("resolved {} external tensors for {}", loaded, path.display());
    }
    Ok(model)
}

/// Read every EXTERNAL tensor's bytes into `raw_data`. Returns the count.
pub fn load_external_data(model: &mut ModelProto, base: &Path) -> Result<usize> {
    let mut files: HashMap<String, File> = HashMap::new();
    let mut count = 0;

    for_each_tensor_mut(model, &mut |t: &mut TensorProto| {
        if !t.is_external() {
            return Ok(());
        }
        let entry = ExternalEntry::parse(t)?;
        let path = base.join(checked_location(&t.name, &entry.location)?);

        let file = match files.entry(entry.location.clone()) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => v.insert(File::open(&path).map_err(|e| Error::io(&path, e))?),
        };

        let file_len = file.metadata().map_err(|e| Error::io(&path, e))?.len();
        let length = entry.length.unwrap_or(file_len.saturating_sub(entry.offset));
        if entry.offset + length > file_len {
            return Err(Error::ExternalData {
                tensor: t.name.clone(),
                reason: format!(
                    "range {}..{} exceeds {} ({} bytes)",
                    entry.offset,
                    entry.offset + length,
                    path.display(),
                    file_len
                ),
            });
        }

        let mut buf = vec![0u8; length as usize];
        file.seek(SeekFrom::Start(entry.offset)).map_err(|e| Error::io(&path, e))?;
        file.read_exact(&mut buf).map_err(|e| Error::io(&path, e))?;

        t.raw_data = buf;
        t.external_data.clear();
        t.data_location = Some(DataLocation::Default as i32);
        count += 1;
        Ok(())
    })?;

    Ok(count)
}

/// Save a model. With a sidecar location, every tensor of at least
/// `size_threshold` bytes is appended to one freshly truncated data file.
///
/// Both files are written to temporary siblings and renamed into place
/// once complete; on failure the temporaries are removed. The two renames
/// are separate steps: if the model rename fails after the sidecar one,
/// an existing model at `path` is left next to the new sidecar.
pub fn save_model(mut model: ModelProto, path: &Path, opts: &SaveOptions) -> Result<SaveSummary> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut summary = SaveSummary { model_path: path.to_path_buf(), ..Default::default() };
    let mut staged = Staged::default();

    let mut data_target = None;
    if let Some(location) = &opts.location {
        let data_path = dir.join(checked_location("<sidecar>", location)?);
        let tmp_path = staged.add(tmp_sibling(&data_path));
        let file = File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut offset = 0u64;

        for_each_tensor_mut(&mut model, &mut |t: &mut TensorProto| {
            if !typed_to_raw(t) || t.raw_data.len() < opts.size_threshold {
                return Ok(());
            }
            let len = t.raw_data.len() as u64;
            writer.write_all(&t.raw_data).map_err(|e| Error::io(&tmp_path, e))?;
            t.raw_data = Vec::new();
            t.data_location = Some(DataLocation::External as i32);
            t.external_data = vec![
                entry("location", location),
                entry("offset", &offset.to_string()),
                entry("length", &len.to_string()),
            ];
            offset += len;
            summary.external_tensors += 1;
            Ok(())
        })?;

        writer.flush().map_err(|e| Error::io(&tmp_path, e))?;
        summary.external_bytes = offset;
        data_target = Some((tmp_path, data_path));
    }

    let model_tmp = staged.add(tmp_sibling(path));
    fs::write(&model_tmp, model.encode_to_vec()).map_err(|e| Error::io(&model_tmp, e))?;

    if let Some((tmp, data_path)) = data_target {
        staged.commit(&tmp, &data_path)?;
        summary.data_path = Some(data_path);
    }
    staged.commit(&model_tmp, path)?;

    match &summary.data_path {
        Some(data) => info!(
            "  Saved {} (+ {}: {} tensors, {} bytes)",
            path.display(),
            data.display(),
            summary.external_tensors,
            summary.external_bytes
        ),
        None => info!("  Saved {}", path.display()),
    }
    Ok(summary)
}

// ============================================================================
// External data entries
// ============================================================================

struct ExternalEntry {
    location: String,
    offset: u64,
    length: Option<u64>,
}

impl ExternalEntry {
    fn parse(t: &TensorProto) -> Result<Self> {
        let bad = |reason: String| Error::ExternalData { tensor: t.name.clone(), reason };
        let mut location = None;
        let mut offset = 0u64;
        let mut length = None;

        for kv in &t.external_data {
            match kv.key.as_str() {
                "location" => location = Some(kv.value.clone()),
                "offset" => {
                    offset = kv.value.parse().map_err(|_| bad(format!("offset '{}'", kv.value)))?
                }
                "length" => {
                    length = Some(kv.value.parse().map_err(|_| bad(format!("length '{}'", kv.value)))?)
                }
                _ => {}
            }
        }

        let location = location.ok_or_else(|| bad("missing location".into()))?;
        Ok(Self { location, offset, length })
    }
}

fn entry(key: &str, value: &str) -> StringStringEntryProto {
    StringStringEntryProto { key: key.into(), value: value.into() }
}

/// Sidecar names must stay inside the model's directory.
fn checked_location<'a>(tensor: &str, location: &'a str) -> Result<&'a Path> {
    let p = Path::new(location);
    let escapes = p.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if location.is_empty() || escapes {
        return Err(Error::ExternalData {
            tensor: tensor.into(),
            reason: format!("location '{}' must be a relative path inside the model directory", location),
        });
    }
    Ok(p)
}

/// Temporary files not yet renamed into place. Removed on drop.
#[derive(Default)]
struct Staged(Vec<PathBuf>);

impl Staged {
    fn add(&mut self, tmp: PathBuf) -> PathBuf {
        self.0.push(tmp.clone());
        tmp
    }

    fn commit(&mut self, tmp: &Path, dest: &Path) -> Result<()> {
        fs::rename(tmp, dest).map_err(|e| Error::io(dest, e))?;
        self.0.retain(|p| p != tmp);
        Ok(())
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        for tmp in self.0.iter().filter(|p| p.exists()) {
            match fs::remove_file(tmp) {
                Ok(()) => debug!("removed stale {}", tmp.display()),
                Err(e) => warn!("could not remove {}: {}", tmp.display(), e),
            }
        }
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::proto::tensor_proto::DataType;
    use crate::onnx::proto::GraphProto;

    fn model_with(sizes: &[usize]) -> ModelProto {
        let initializer = sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| TensorProto {
                name: format!("t{}", i),
                data_type: DataType::Float as i32,
                dims: vec![n as i64],
                raw_data: (0..n).flat_map(|v| (v as f32).to_le_bytes()).collect(),
                ..Default::default()
            })
            .collect();
        ModelProto {
            ir_version: 8,
            graph: Some(GraphProto { name: "g".into(), initializer, ..Default::default() }),
            ..Default::default()
        }
    }

    #[test]
    fn external_round_trip_restores_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        let original = model_with(&[4, 512, 300]);

        let summary = save_model(original.clone(), &path, &SaveOptions::external("m.onnx.data")).unwrap();
        // 4 floats = 16 bytes stays inline
        assert_eq!(summary.external_tensors, 2);
        assert_eq!(summary.external_bytes, (512 + 300) * 4);
        assert!(dir.path().join("m.onnx.data").exists());
        assert!(!dir.path().join("m.onnx.tmp").exists());

        let reloaded = load_model(&path).unwrap();
        let g = reloaded.graph.unwrap();
        for (a, b) in g.initializer.iter().zip(&original.graph.unwrap().initializer) {
            assert_eq!(a.raw_data, b.raw_data);
            assert!(a.external_data.is_empty());
        }
    }

    #[test]
    fn resave_truncates_stale_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        let opts = SaveOptions::external("m.onnx.data");

        save_model(model_with(&[1024]), &path, &opts).unwrap();
        let model = load_model(&path).unwrap();
        save_model(model, &path, &opts).unwrap();

        let len = fs::metadata(dir.path().join("m.onnx.data")).unwrap().len();
        assert_eq!(len, 4096);
    }

    #[test]
    fn inline_save_has_no_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        let summary = save_model(model_with(&[2048]), &path, &SaveOptions::default()).unwrap();
        assert!(summary.data_path.is_none());
        let reloaded = load_model(&path).unwrap();
        assert_eq!(reloaded.graph.unwrap().initializer[0].raw_data.len(), 8192);
    }

    #[test]
    fn truncated_sidecar_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        save_model(model_with(&[1024]), &path, &SaveOptions::external("w.bin")).unwrap();
        fs::write(dir.path().join("w.bin"), [0u8; 10]).unwrap();

        let err = load_model(&path).unwrap_err();
        assert!(matches!(err, Error::ExternalData { .. }), "{err}");
    }

    #[test]
    fn failed_save_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        // A directory in the way of the model's temporary makes the write fail
        fs::create_dir(dir.path().join("m.onnx.tmp")).unwrap();

        let err = save_model(model_with(&[1024]), &path, &SaveOptions::external("m.onnx.data")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }), "{err}");
        assert!(!dir.path().join("m.onnx.data.tmp").exists());
        assert!(!dir.path().join("m.onnx.data").exists());
        assert!(!path.exists());
    }

    #[test]
    fn escaping_location_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.onnx");
        let err = save_model(model_with(&[1024]), &path, &SaveOptions::external("../w.bin")).unwrap_err();
        assert!(matches!(err, Error::ExternalData { .. }));
    }
}
