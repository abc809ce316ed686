//! [`ModelCatalog`] – the set of models a session can draw from.
//!
//! The catalog is an ordered, duplicate-free list of model identifiers
//! (asset file names such as `Set_1_orig_matte_0.glb`).  A [`FoilRule`]
//! partitions it into *regular* models, which may be shown during the
//! viewing phase, and *foils*, which are only ever used as recall
//! distractors.
//!
//! # Example
//!
//! ```rust
//! use turntable_runtime::catalog::{FoilRule, ModelCatalog};
//!
//! let catalog = ModelCatalog::new(["a.glb", "b_foil.glb", "c.glb"], FoilRule::default());
//! assert_eq!(catalog.regular(), vec!["a.glb", "c.glb"]);
//! assert_eq!(catalog.foils(), vec!["b_foil.glb"]);
//! assert_eq!(catalog.image_for("a.glb"), "a.png");
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use turntable_types::TurntableError;

/// File extensions recognised as loadable models.
const MODEL_EXTENSIONS: [&str; 2] = ["glb", "gltf"];

// ─────────────────────────────────────────────────────────────────────────────
// FoilRule
// ─────────────────────────────────────────────────────────────────────────────

/// Naming convention that marks a model as a foil: an identifier containing
/// any of the markers is a foil.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoilRule {
    markers: Vec<String>,
}

impl FoilRule {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
        }
    }

    pub fn is_foil(&self, model: &str) -> bool {
        self.markers.iter().any(|m| model.contains(m.as_str()))
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl Default for FoilRule {
    fn default() -> Self {
        Self::new(["_foil"])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ModelCatalog
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable, ordered set of model identifiers.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<String>,
    rule: FoilRule,
}

impl ModelCatalog {
    /// Build a catalog from a list.  Later duplicates are dropped; the first
    /// occurrence keeps its position.
    pub fn new<I, S>(models: I, rule: FoilRule) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let models = models
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| seen.insert(m.clone()))
            .collect();
        Self { models, rule }
    }

    /// Scan `dir` for `.glb` / `.gltf` files, sorted by file name.
    ///
    /// # Errors
    ///
    /// Returns [`TurntableError::Storage`] when the directory cannot be read.
    pub fn from_dir(dir: impl AsRef<Path>, rule: FoilRule) -> Result<Self, TurntableError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| TurntableError::Storage(format!("cannot read {}: {e}", dir.display())))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TurntableError::Storage(e.to_string()))?;
            let path = entry.path();
            let is_model = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| MODEL_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)));
            if !is_model || !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        let catalog = Self::new(names, rule);
        info!(
            dir = %dir.display(),
            regular = catalog.regular().len(),
            foils = catalog.foils().len(),
            "scanned model catalog"
        );
        Ok(catalog)
    }

    /// Every identifier, in catalog order.
    pub fn all(&self) -> &[String] {
        &self.models
    }

    /// Identifiers eligible for the viewing sequence.
    pub fn regular(&self) -> Vec<&str> {
        self.models
            .iter()
            .map(String::as_str)
            .filter(|m| !self.rule.is_foil(m))
            .collect()
    }

    /// Identifiers reserved for recall distractors.
    pub fn foils(&self) -> Vec<&str> {
        self.models
            .iter()
            .map(String::as_str)
            .filter(|m| self.rule.is_foil(m))
            .collect()
    }

    pub fn is_foil(&self, model: &str) -> bool {
        self.rule.is_foil(model)
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Recall image shown for `model`: the identifier with its extension
    /// replaced by `.png`.
    pub fn image_for(&self, model: &str) -> String {
        let stem = match model.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => model,
        };
        format!("{stem}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_by_marker() {
        let catalog = ModelCatalog::new(
            ["Set_1_orig_matte_0.glb", "Set_1_foil.glb", "Set_2_orig_matte_0.glb"],
            FoilRule::default(),
        );
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.regular(), vec!["Set_1_orig_matte_0.glb", "Set_2_orig_matte_0.glb"]);
        assert_eq!(catalog.foils(), vec!["Set_1_foil.glb"]);
        assert!(catalog.is_foil("Set_1_foil.glb"));
    }

    #[test]
    fn custom_markers() {
        let rule = FoilRule::new(["_lure", "decoy_"]);
        let catalog = ModelCatalog::new(["a_lure.glb", "decoy_b.glb", "c.glb"], rule);
        assert_eq!(catalog.foils().len(), 2);
        assert_eq!(catalog.regular(), vec!["c.glb"]);
    }

    #[test]
    fn empty_markers_are_ignored() {
        let rule = FoilRule::new(["", "_foil"]);
        assert_eq!(rule.markers(), &["_foil".to_string()]);
        assert!(!rule.is_foil("a.glb"));
    }

    #[test]
    fn duplicates_are_dropped() {
        let catalog = ModelCatalog::new(["a.glb", "b.glb", "a.glb"], FoilRule::default());
        assert_eq!(catalog.all(), &["a.glb".to_string(), "b.glb".to_string()]);
        assert!(catalog.contains("b.glb"));
    }

    #[test]
    fn image_reference_swaps_extension() {
        let catalog = ModelCatalog::new(Vec::<String>::new(), FoilRule::default());
        assert!(catalog.is_empty());
        assert_eq!(catalog.image_for("Set_1_orig_matte_0.glb"), "Set_1_orig_matte_0.png");
        assert_eq!(catalog.image_for("model.v2.gltf"), "model.v2.png");
        assert_eq!(catalog.image_for("noext"), "noext.png");
    }

    #[test]
    fn from_dir_scans_model_files() {
        let dir = tempfile::tempdir().expect("tmp dir");
        for name in ["b.glb", "a.gltf", "c_foil.GLB", "notes.txt", "d.png"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.glb")).unwrap();

        let catalog = ModelCatalog::from_dir(dir.path(), FoilRule::default()).unwrap();
        assert_eq!(catalog.regular(), vec!["a.gltf", "b.glb"]);
        assert_eq!(catalog.foils(), vec!["c_foil.GLB"]);
    }

    #[test]
    fn from_dir_reports_missing_directory() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = ModelCatalog::from_dir(dir.path().join("missing"), FoilRule::default()).unwrap_err();
        assert!(matches!(err, TurntableError::Storage(_)));
    }
}
