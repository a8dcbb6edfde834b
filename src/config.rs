use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level nowcast configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NowcastToml {
    /// Data and output locations.
    #[serde(default)]
    pub io: IoToml,

    /// Targets and factor layout.
    #[serde(default)]
    pub model: ModelToml,

    /// EM estimation settings.
    #[serde(default)]
    pub em: EmToml,

    /// Standardization settings.
    #[serde(default)]
    pub standardize: StandardizeToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoToml {
    #[serde(default = "default_data_dir")]
    pub data: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,
}

impl Default for IoToml {
    fn default() -> Self {
        Self {
            data: default_data_dir(),
            output: default_output_dir(),
            compression: default_compression(),
            row_group_size: default_row_group_size(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_compression() -> String {
    "snappy".to_string()
}
fn default_row_group_size() -> usize {
    100_000
}

/// Model layout. Unset fields keep the library defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelToml {
    pub targets: Option<Vec<String>>,
    /// First month of the estimation sample (`YYYY-MM`), or `"full"`.
    pub sample_start: Option<String>,
    pub refit: Option<String>,
    pub multiplicities: Option<BTreeMap<String, usize>>,
    pub default_factors: Option<usize>,
    pub factor_order: Option<usize>,
    /// `"sum"`, `"average"` or `"mariano_murasawa"`.
    pub aggregation: Option<String>,
    pub idiosyncratic_ar1: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmToml {
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
    pub min_obs_variance: Option<f64>,
    pub min_observations: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardizeToml {
    pub min_observations: Option<usize>,
    pub policy: Option<String>,
}

/// Reads and parses a TOML configuration file.
pub fn load(path: &Path) -> Result<NowcastToml> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&text).context("failed to parse TOML config")
}
