// config.rs - Job configuration
//
// Defaults reproduce the gallery normal-map job; a TOML file can override
// any subset of fields.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::texture::classify::{Category, default_categories, default_hero_patterns};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TextureJob {
    /// Where the source EXRs live.
    pub input_dir: PathBuf,
    /// Where the final DDS files go.
    pub output_dir: PathBuf,
    pub texconv: PathBuf,
    /// Compressed format passed to the tool.
    pub format: String,
    /// Source extension, compared case-insensitively.
    pub extension: String,
    /// Substring that marks a file as a normal map (case-sensitive).
    pub marker: String,
    /// Shared 16-bit intermediate, removed after the batch.
    pub intermediate: PathBuf,
    /// File name the tool is expected to produce inside `output_dir`.
    pub expected_output: String,
    pub hero_cap: u32,
    pub prop_cap: u32,
    pub hero_targets: Vec<String>,
    pub categories: Vec<Category>,
    pub fallback_target: String,
}

impl Default for TextureJob {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("assets/polyhaven/textures"),
            output_dir: PathBuf::from("assets/textures/rtshowcase"),
            texconv: PathBuf::from("./texconv.exe"),
            format: "BC5_UNORM".into(),
            extension: ".exr".into(),
            marker: "_nor_".into(),
            intermediate: PathBuf::from("temp_normal.tif"),
            expected_output: "temp_normal.dds".into(),
            hero_cap: 2048,
            prop_cap: 1024,
            hero_targets: default_hero_patterns(),
            categories: default_categories(),
            fallback_target: "unknown_normal".into(),
        }
    }
}

/// Parse a TOML file; missing fields take their defaults.
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    toml::from_str(&text).map_err(|source| Error::Config { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        fs::write(
            &path,
            r#"
            input_dir = "src_textures"
            prop_cap = 512

            [[categories]]
            pattern = "cobble"
            outputs = ["street_a", "street_b"]
            "#,
        )
        .unwrap();

        let job: TextureJob = load_toml(&path).unwrap();
        assert_eq!(job.input_dir, PathBuf::from("src_textures"));
        assert_eq!(job.prop_cap, 512);
        assert_eq!(job.hero_cap, 2048);
        assert_eq!(job.marker, "_nor_");
        assert_eq!(job.categories, vec![Category::new("cobble", &["street_a", "street_b"])]);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        fs::write(&path, "hero_cap = \"big\"").unwrap();
        assert!(matches!(load_toml::<TextureJob>(&path), Err(Error::Config { .. })));
    }
}
