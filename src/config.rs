//! Run configuration.
//!
//! The plain-text format has one `key = value` pair per line, `#` starts a comment:
//!
//! ```text
//! meta_file_path = data/metadata.csv
//! file_path = data/measurements.csv
//! output_path = results
//! column = condition
//! conditions = ctrl,drug1
//! ```
//!
//! A blank `conditions` compares every condition found in the column. JSON files
//! holding a serialized [`RunConfig`] are accepted as well.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};
use crate::projection::ProjectionOptions;
use crate::results::RunKey;
use crate::testing::{DEFAULT_ALPHA, TTestType, TestSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub meta_file_path: Option<PathBuf>,
    pub file_path: Option<PathBuf>,
    pub output_path: PathBuf,
    /// Metadata column holding the condition labels.
    pub column: String,
    /// Accepted conditions; empty means all.
    pub conditions: Vec<String>,
    /// Metadata column used as PLS-DA target when it differs from `column`.
    pub label_column: Option<String>,
    /// Delimiter of `.csv` inputs.
    pub delimiter: char,
    pub alpha: f64,
    pub t_test: TTestType,
    /// Test summed family intensities instead of single variables.
    pub aggregate_families: bool,
    pub projection: bool,
    pub n_components: usize,
    pub test_fraction: f64,
    pub top_n: usize,
    pub seed: Option<u64>,
    pub threads: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            meta_file_path: None,
            file_path: None,
            output_path: PathBuf::from("results"),
            column: "condition".to_string(),
            conditions: Vec::new(),
            label_column: None,
            delimiter: ';',
            alpha: DEFAULT_ALPHA,
            t_test: TTestType::Welch,
            aggregate_families: false,
            projection: true,
            n_components: 2,
            test_fraction: 0.2,
            top_n: 20,
            seed: Some(42),
            threads: None,
        }
    }
}

fn invalid(line: usize, key: &str, value: &str, expected: &str) -> StatError {
    StatError::InvalidParameter(format!(
        "line {}: '{}' for '{}' is not {}",
        line, value, key, expected
    ))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

impl RunConfig {
    /// Parse the `key = value` format on top of the defaults. Keys are
    /// case-insensitive; empty values keep the default; unknown keys are ignored
    /// with a warning.
    pub fn from_key_value(text: &str) -> Result<Self> {
        let mut config = RunConfig::default();
        for (no, line) in text.lines().enumerate() {
            let line_no = no + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                StatError::InvalidParameter(format!(
                    "line {}: expected 'key = value', got '{}'",
                    line_no, line
                ))
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            config.set(line_no, &key, value)?;
        }
        Ok(config)
    }

    fn set(&mut self, line: usize, key: &str, value: &str) -> Result<()> {
        match key {
            "meta_file_path" | "metadata" => self.meta_file_path = Some(PathBuf::from(value)),
            "file_path" | "measurements" => self.file_path = Some(PathBuf::from(value)),
            "output_path" | "output" => self.output_path = PathBuf::from(value),
            "column" => self.column = value.to_string(),
            "conditions" => {
                self.conditions = value
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "label_column" => self.label_column = Some(value.to_string()),
            "delimiter" => {
                self.delimiter = match value {
                    "\\t" | "tab" => '\t',
                    v if v.chars().count() == 1 => v.chars().next().unwrap_or(';'),
                    v => return Err(invalid(line, key, v, "a single character")),
                }
            }
            "alpha" => {
                self.alpha = value
                    .parse()
                    .map_err(|_| invalid(line, key, value, "a number"))?
            }
            "t_test" => self.t_test = value.parse()?,
            "aggregate_families" | "families" => {
                self.aggregate_families =
                    parse_bool(value).ok_or_else(|| invalid(line, key, value, "a boolean"))?
            }
            "projection" | "pls_da" => {
                self.projection =
                    parse_bool(value).ok_or_else(|| invalid(line, key, value, "a boolean"))?
            }
            "n_components" => {
                self.n_components = value
                    .parse()
                    .map_err(|_| invalid(line, key, value, "a positive integer"))?
            }
            "test_fraction" => {
                self.test_fraction = value
                    .parse()
                    .map_err(|_| invalid(line, key, value, "a number"))?
            }
            "top_n" => {
                self.top_n = value
                    .parse()
                    .map_err(|_| invalid(line, key, value, "a positive integer"))?
            }
            "seed" => {
                self.seed = match value.to_ascii_lowercase().as_str() {
                    "none" | "random" => None,
                    v => Some(
                        v.parse()
                            .map_err(|_| invalid(line, key, value, "an unsigned integer"))?,
                    ),
                }
            }
            "threads" => {
                self.threads = Some(
                    value
                        .parse()
                        .map_err(|_| invalid(line, key, value, "a positive integer"))?,
                )
            }
            other => warn!("Ignoring unknown config key '{}' (line {})", other, line),
        }
        Ok(())
    }

    /// Load a config file; `.json` is read as serialized [`RunConfig`], anything
    /// else as `key = value` lines.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config = if is_json {
            serde_json::from_str(&text)
                .with_context(|| format!("parsing JSON config {}", path.display()))?
        } else {
            RunConfig::from_key_value(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(StatError::InvalidParameter(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(StatError::InvalidParameter(format!(
                "test_fraction must lie in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.n_components == 0 {
            return Err(StatError::InvalidParameter(
                "n_components must be at least 1".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(StatError::InvalidParameter(
                "top_n must be at least 1".to_string(),
            ));
        }
        if self.threads == Some(0) {
            return Err(StatError::InvalidParameter(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.column.trim().is_empty() {
            return Err(StatError::InvalidParameter(
                "condition column must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn test_settings(&self) -> TestSettings {
        TestSettings {
            alpha: self.alpha,
            normality_alpha: self.alpha,
            family_alpha: self.alpha,
            t_test_type: self.t_test,
        }
    }

    pub fn projection_options(&self) -> Option<ProjectionOptions> {
        self.projection.then(|| ProjectionOptions {
            n_components: self.n_components,
            test_fraction: self.test_fraction,
            seed: self.seed,
            top_n: self.top_n,
        })
    }

    pub fn run_key(&self, accepted_conditions: &[String]) -> RunKey {
        RunKey {
            condition_column: self.column.clone(),
            accepted_conditions: accepted_conditions.to_vec(),
        }
    }
}
