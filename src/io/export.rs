//! Writers for the result tables of a run.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::error::Result;
use crate::results::RunResults;

pub const TEST_RESULTS_FILE: &str = "test_results.csv";
pub const POSTHOC_RESULTS_FILE: &str = "posthoc_results.csv";
pub const CONDITION_SUMMARY_FILE: &str = "condition_summary.csv";
pub const TOP_FEATURES_FILE: &str = "top_features.csv";
pub const LATENT_SCORES_FILE: &str = "latent_scores.csv";
pub const CLASSIFIER_METRICS_FILE: &str = "classifier_metrics.json";

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every table of `results` into `dir` (created if needed) and return the
/// written paths. Post-hoc and projection files are only written when the run
/// produced them.
pub fn write_results(dir: &Path, results: &RunResults) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join(TEST_RESULTS_FILE);
    write_rows(&path, &results.result_rows())?;
    written.push(path);

    let path = dir.join(CONDITION_SUMMARY_FILE);
    write_rows(&path, &results.summaries)?;
    written.push(path);

    let posthoc = results.posthoc_rows();
    if !posthoc.is_empty() {
        let path = dir.join(POSTHOC_RESULTS_FILE);
        write_rows(&path, &posthoc)?;
        written.push(path);
    }

    if let Some(projection) = &results.projection {
        let path = dir.join(TOP_FEATURES_FILE);
        write_rows(&path, &results.feature_rows())?;
        written.push(path);

        let path = dir.join(LATENT_SCORES_FILE);
        write_rows(&path, &projection.scores)?;
        written.push(path);

        let path = dir.join(CLASSIFIER_METRICS_FILE);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &projection.metrics)?;
        written.push(path);
    }

    info!("Wrote {} result file(s) to {}", written.len(), dir.display());
    Ok(written)
}
