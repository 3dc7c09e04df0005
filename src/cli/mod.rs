//! Command-line interface for statchill

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use log::{info, warn};

use crate::config::RunConfig;
use crate::data::{SampleTable, align, sanitize_name};
use crate::io::{self, SourceFormat};
use crate::pipeline::{self, RunOptions};
use crate::results::RunResults;
use crate::testing::TTestType;
use crate::testing::correction::TukeyHsd;

/// Name of the effective configuration written next to the results.
pub const RUN_CONFIG_FILE: &str = "run_config.json";

#[derive(Parser, Debug)]
#[command(name = "statchill")]
#[command(version)]
#[command(about = "Statistical comparison of metabolomics measurements across conditions")]
#[command(after_long_help = "\
Examples:
  # Compare two treatments against the control
  statchill -m metadata.csv -d measurements.csv --column treatment \\
    --conditions ctrl,drug1 -o results

  # Same run from a config file, tests only
  statchill --config run.cfg --no-projection")]
pub struct Cli {
    /// Config file (`key = value` lines or JSON); flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sample metadata table
    #[arg(short, long, value_name = "FILE")]
    pub metadata: Option<PathBuf>,

    /// Measurement table (samples x variables)
    #[arg(short = 'd', long = "data", value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Metadata column holding the condition labels
    #[arg(short, long)]
    pub column: Option<String>,

    /// Conditions to compare (comma separated, default: all)
    #[arg(long, value_delimiter = ',')]
    pub conditions: Vec<String>,

    /// Metadata column used as PLS-DA target
    #[arg(long, value_name = "COLUMN")]
    pub label_column: Option<String>,

    /// Significance level
    #[arg(long)]
    pub alpha: Option<f64>,

    /// t-test variant: welch or student
    #[arg(long = "t-test", value_name = "TYPE")]
    pub t_test: Option<TTestType>,

    /// Number of PLS components
    #[arg(long)]
    pub components: Option<usize>,

    /// Fraction of samples held out for evaluation
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Seed of the train/test split
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of top-ranked features to report
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Delimiter of `.csv` inputs
    #[arg(long)]
    pub delimiter: Option<char>,

    /// Skip the PLS-DA stage
    #[arg(long)]
    pub no_projection: bool,

    /// Test summed variable families instead of single variables
    #[arg(long)]
    pub families: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Effective configuration: the config file (or defaults) with flags applied on top.
    pub fn into_config(self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };

        if let Some(v) = self.metadata {
            config.meta_file_path = Some(v);
        }
        if let Some(v) = self.data {
            config.file_path = Some(v);
        }
        if let Some(v) = self.output {
            config.output_path = v;
        }
        if let Some(v) = self.column {
            config.column = v;
        }
        if !self.conditions.is_empty() {
            config.conditions = self
                .conditions
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(v) = self.label_column {
            config.label_column = Some(v);
        }
        if let Some(v) = self.alpha {
            config.alpha = v;
        }
        if let Some(v) = self.t_test {
            config.t_test = v;
        }
        if let Some(v) = self.components {
            config.n_components = v;
        }
        if let Some(v) = self.test_fraction {
            config.test_fraction = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(v) = self.top_n {
            config.top_n = v;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
        if let Some(v) = self.delimiter {
            config.delimiter = v;
        }
        if self.no_projection {
            config.projection = false;
        }
        if self.families {
            config.aggregate_families = true;
        }

        config.validate()?;
        Ok(config)
    }
}

fn source_format(path: &std::path::Path, delimiter: char) -> anyhow::Result<SourceFormat> {
    let format = SourceFormat::from_path(path)?;
    if !delimiter.is_ascii() {
        bail!("delimiter '{}' is not a single-byte character", delimiter);
    }
    // `.tsv` keeps its tab
    Ok(match format {
        SourceFormat::DelimitedText { delimiter: b'\t' } => format,
        other => other.with_delimiter(delimiter as u8),
    })
}

fn prepare(table: SampleTable, families: bool) -> anyhow::Result<SampleTable> {
    if families {
        Ok(table
            .aggregate_families()
            .context("summing variables per family")?)
    } else {
        Ok(table)
    }
}

/// Load the inputs named by `config`, run the analysis and write every result
/// table to `config.output_path`.
pub fn execute(config: &RunConfig) -> anyhow::Result<RunResults> {
    config.validate()?;
    let meta_path = config
        .meta_file_path
        .as_deref()
        .context("no metadata file given (--metadata or meta_file_path)")?;
    let data_path = config
        .file_path
        .as_deref()
        .context("no measurement file given (--data or file_path)")?;

    let metadata = io::read_metadata(meta_path, source_format(meta_path, config.delimiter)?)
        .with_context(|| format!("reading metadata {}", meta_path.display()))?;
    let measurements = io::read_measurements(data_path, source_format(data_path, config.delimiter)?)
        .with_context(|| format!("reading measurements {}", data_path.display()))?;

    let table = align(&measurements, &metadata, &config.column, &config.conditions)
        .with_context(|| format!("aligning samples on column '{}'", config.column))?;
    let table = prepare(table, config.aggregate_families)?;

    // A separate target column is projected over all of its values.
    let projection_table = match &config.label_column {
        Some(label) if config.projection && sanitize_name(label) != sanitize_name(&config.column) => {
            let labelled = align(&measurements, &metadata, label, &[])
                .with_context(|| format!("aligning samples on label column '{}'", label))?;
            Some(prepare(labelled, config.aggregate_families)?)
        }
        Some(_) if !config.projection => {
            warn!("label_column is set but the projection is disabled");
            None
        }
        _ => None,
    };

    let options = RunOptions {
        tests: config.test_settings(),
        projection: config.projection_options(),
    };
    let key = config.run_key(table.conditions());
    let results = pipeline::run(key, &table, projection_table.as_ref(), &options, &TukeyHsd)?;

    let written = io::write_results(&config.output_path, &results)
        .with_context(|| format!("writing results to {}", config.output_path.display()))?;
    let config_path = config.output_path.join(RUN_CONFIG_FILE);
    let writer = BufWriter::new(
        File::create(&config_path)
            .with_context(|| format!("creating {}", config_path.display()))?,
    );
    serde_json::to_writer_pretty(writer, config)?;

    for path in &written {
        info!("  {}", path.display());
    }
    Ok(results)
}
