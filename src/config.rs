//! Analysis configuration loaded from YAML.

use crate::data::FactorLevelSpecs;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_permutations() -> usize {
    9999
}

fn default_seed() -> u64 {
    42
}

fn default_id_column() -> String {
    "id".to_string()
}

/// One study's analysis configuration: the design formula, the shared
/// fixed-level factor declarations, and the permutation settings.
///
/// Declared once per study and reused across every subset analysis, so
/// factor encodings stay comparable between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Design formula, e.g. `source/(cage*experiment*run)*day`.
    pub formula: String,
    /// Fixed level declarations for every factor column used.
    pub factors: FactorLevelSpecs,
    /// Optional blocking column for restricted permutation.
    #[serde(default)]
    pub strata: Option<String>,
    /// Optional column to split into per-level subset analyses.
    #[serde(default)]
    pub subset_by: Option<String>,
    #[serde(default = "default_permutations")]
    pub permutations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Name of the metadata id column.
    #[serde(default = "default_id_column")]
    pub id_column: String,
}

impl AnalysisConfig {
    /// Load from a YAML file.
    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Serialize for provenance alongside result tables.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
