// texconv.rs - Block compression through an external tool
//
// The compressor writes `<out_dir>/<stem>.dds`; the caller moves that file
// to its final convention-based name.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::{Error, Result};

pub trait Compressor {
    /// Compress `input` into `out_dir`, limiting both dimensions to `cap`.
    fn compress(&self, input: &Path, out_dir: &Path, cap: u32) -> Result<()>;
}

/// DirectXTex `texconv` command-line tool.
#[derive(Clone, Debug)]
pub struct Texconv {
    pub exe: PathBuf,
    /// DXGI format name, e.g. `BC5_UNORM`.
    pub format: String,
}

impl Texconv {
    pub fn new(exe: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self { exe: exe.into(), format: format.into() }
    }

    pub fn args(&self, input: &Path, out_dir: &Path, cap: u32) -> Vec<OsString> {
        let cap = cap.to_string();
        vec![
            "-f".into(),
            self.format.clone().into(),
            // overwrite existing output
            "-y".into(),
            "-w".into(),
            cap.clone().into(),
            "-h".into(),
            cap.into(),
            "-o".into(),
            out_dir.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }
}

impl Compressor for Texconv {
    fn compress(&self, input: &Path, out_dir: &Path, cap: u32) -> Result<()> {
        let args = self.args(input, out_dir, cap);
        debug!("running {} {:?}", self.exe.display(), args);

        let status = Command::new(&self.exe)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::io(&self.exe, e))?;

        if !status.success() {
            return Err(Error::CompressorFailed {
                tool: self.exe.display().to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relocated {
    pub from: PathBuf,
    /// Found under the intermediate's stem rather than the expected name.
    pub fallback: bool,
}

/// Move the compressor's output to `final_path`, replacing any old file.
/// Looks for `<out_dir>/<expected>` first, then `<out_dir>/<stem>.dds`.
pub fn relocate_output(out_dir: &Path, expected: &str, intermediate: &Path, final_path: &Path) -> Result<Relocated> {
    let primary = out_dir.join(expected);
    let stem = intermediate.file_stem().unwrap_or_default().to_string_lossy();
    let alt = out_dir.join(format!("{}.dds", stem));

    let (from, fallback) = if primary.is_file() {
        (primary, false)
    } else if alt.is_file() {
        (alt, true)
    } else {
        let mut tried = vec![primary];
        if alt != tried[0] {
            tried.push(alt);
        }
        return Err(Error::MissingOutput { tried });
    };

    if final_path.exists() {
        fs::remove_file(final_path).map_err(|e| Error::io(final_path, e))?;
    }
    fs::rename(&from, final_path).map_err(|e| Error::io(&from, e))?;
    Ok(Relocated { from, fallback })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texconv_arguments() {
        let t = Texconv::new("./texconv.exe", "BC5_UNORM");
        let args = t.args(Path::new("temp_normal.tif"), Path::new("out"), 2048);
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-f", "BC5_UNORM", "-y", "-w", "2048", "-h", "2048", "-o", "out", "temp_normal.tif"]
        );
    }

    #[test]
    fn missing_tool_is_an_error() {
        let t = Texconv::new("/nonexistent/texconv", "BC5_UNORM");
        let err = t.compress(Path::new("in.tif"), Path::new("."), 1024).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn relocate_prefers_expected_name_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        fs::write(out.join("tool_out.dds"), b"new").unwrap();
        fs::write(out.join("final.dds"), b"old").unwrap();

        let r = relocate_output(out, "tool_out.dds", Path::new("temp_normal.tif"), &out.join("final.dds")).unwrap();
        assert!(!r.fallback);
        assert_eq!(fs::read(out.join("final.dds")).unwrap(), b"new");
        assert!(!out.join("tool_out.dds").exists());
    }

    #[test]
    fn relocate_falls_back_to_stem() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path();
        fs::write(out.join("scratch.dds"), b"dds").unwrap();

        let r = relocate_output(out, "temp_normal.dds", Path::new("/tmp/scratch.tif"), &out.join("final.dds")).unwrap();
        assert!(r.fallback);
        assert!(out.join("final.dds").exists());
    }

    #[test]
    fn relocate_reports_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = relocate_output(dir.path(), "temp_normal.dds", Path::new("temp_normal.tif"), &dir.path().join("f.dds"))
            .unwrap_err();
        match err {
            Error::MissingOutput { tried } => assert_eq!(tried.len(), 1),
            other => panic!("unexpected {other}"),
        }
    }
}
