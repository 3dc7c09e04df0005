use log::{debug, info, warn};
use ndarray::Array2;

use crate::data::table::{sanitize_name, MeasurementTable, Metadata, SampleTable};
use crate::error::{Result, StatError};

/// Join `metadata[condition_column]` onto the measurement rows and keep only the
/// samples whose label is in `accepted_conditions`.
///
/// The join is a left join from the measurement table: every measurement row is
/// considered, rows without metadata simply carry no label and are filtered out.
/// An empty `accepted_conditions` means "every distinct value of the column".
///
/// # Errors
///
/// * `Schema` when `condition_column` is not a metadata column.
/// * `EmptyResult` when an accepted condition (given or taken from metadata) matches
///   no measured sample, or fewer than two conditions are accepted.
pub fn align(
    measurements: &MeasurementTable,
    metadata: &Metadata,
    condition_column: &str,
    accepted_conditions: &[String],
) -> Result<SampleTable> {
    let column = sanitize_name(condition_column);
    let observed = metadata.distinct_values(&column).ok_or_else(|| {
        StatError::Schema(format!(
            "column '{}' not found in metadata (available: {})",
            column,
            metadata.columns().join(", ")
        ))
    })?;

    let requested: Vec<String> = if accepted_conditions.is_empty() {
        info!("No conditions given, comparing all {} conditions of '{}'", observed.len(), column);
        observed
    } else {
        let mut requested: Vec<String> = Vec::with_capacity(accepted_conditions.len());
        for cond in accepted_conditions.iter().map(|c| c.trim().to_string()) {
            if !cond.is_empty() && !requested.contains(&cond) {
                requested.push(cond);
            }
        }
        requested
    };
    if requested.is_empty() {
        return Err(StatError::EmptyResult(format!(
            "no condition values available in column '{}'",
            column
        )));
    }

    let mut kept_rows = Vec::new();
    let mut labels = Vec::new();
    let mut unmatched = 0usize;
    for (row, sample) in measurements.sample_ids().iter().enumerate() {
        match metadata.value(sample, &column) {
            Some(label) if requested.iter().any(|c| c == label) => {
                kept_rows.push(row);
                labels.push(label.to_string());
            }
            Some(_) => {}
            None => unmatched += 1,
        }
    }
    if unmatched > 0 {
        warn!(
            "{} measurement sample(s) have no '{}' label in metadata and were left out",
            unmatched, column
        );
    }

    let missing: Vec<&str> = requested
        .iter()
        .filter(|cond| !labels.iter().any(|l| l == *cond))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(StatError::EmptyResult(format!(
            "condition(s) {} of '{}' matched no measured sample",
            missing.join(", "),
            column
        )));
    }
    let conditions = requested;
    if conditions.len() < 2 {
        return Err(StatError::EmptyResult(format!(
            "'{}' selects {} condition(s); at least 2 are required",
            column,
            conditions.len()
        )));
    }

    let n_vars = measurements.n_variables();
    let source = measurements.values();
    let mut values = Array2::from_elem((kept_rows.len(), n_vars), f64::NAN);
    for (dst, &src) in kept_rows.iter().enumerate() {
        values.row_mut(dst).assign(&source.row(src));
    }
    let sample_ids = kept_rows
        .iter()
        .map(|&r| measurements.sample_ids()[r].clone())
        .collect();

    debug!(
        "Aligned {} of {} samples across conditions {:?}",
        kept_rows.len(),
        measurements.n_samples(),
        conditions
    );

    SampleTable::new(
        sample_ids,
        measurements.variables().to_vec(),
        values,
        labels,
        conditions,
    )
}
