// classify.rs - Map source filenames to output targets and size caps
//
// Categories are checked in order against the lowercased filename; the
// first substring hit decides the output names. Targets matching a hero
// pattern get the larger resolution cap.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Category {
    /// Substring looked for in the lowercased source filename.
    pub pattern: String,
    /// Output names (without extension); one source may feed several.
    pub outputs: Vec<String>,
}

impl Category {
    pub fn new(pattern: &str, outputs: &[&str]) -> Self {
        Self {
            pattern: pattern.to_string(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The gallery normal-map set.
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::new("wood_shutter", &["rt_gallery_floor_normal_bc5"]),
        Category::new("castle_brick", &["rt_gallery_leftwall_normal_bc5"]),
        Category::new("grey_plaster", &["rt_gallery_rightwall_normal_bc5"]),
        // Shared by the cylinder and the cube
        Category::new(
            "metal_plate",
            &["rt_gallery_cylinder_brushed_normal_bc5", "rt_gallery_cube_plastic_normal_bc5"],
        ),
    ]
}

pub fn default_hero_patterns() -> Vec<String> {
    ["*_floor_*", "*_leftwall_*", "*_rightwall_*"].iter().map(|s| s.to_string()).collect()
}

/// Output names for a source file. Unmatched files get `[fallback]`.
pub fn classify<'a>(categories: &'a [Category], filename: &str, fallback: &'a str) -> Vec<&'a str> {
    let lower = filename.to_lowercase();
    categories
        .iter()
        .find(|c| lower.contains(&c.pattern.to_lowercase()))
        .filter(|c| !c.outputs.is_empty())
        .map(|c| c.outputs.iter().map(String::as_str).collect::<Vec<_>>())
        .unwrap_or_else(|| vec![fallback])
}

pub fn resolution_cap(target: &str, hero_patterns: &[String], hero_cap: u32, prop_cap: u32) -> u32 {
    if hero_patterns.iter().any(|p| wildcard_match(p, target)) {
        hero_cap
    } else {
        prop_cap
    }
}

/// Glob match where `*` stands for any run of characters.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || text.len() < first.len() + last.len() || !text.ends_with(last) {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    true
}
