//! Delimited-text readers for the measurement and metadata tables.

use std::path::Path;

use log::{debug, info};
use ndarray::Array2;

use super::SourceFormat;
use crate::data::{MeasurementTable, Metadata, Variable, sanitize_name};
use crate::error::{Result, StatError};

/// Header row plus string cells, every row padded to the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn is_missing(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "" | "na" | "nan" | "n/a" | "null"
    )
}

/// Numeric cell; anything unparseable counts as missing (`NaN`), and so do `inf`
/// spellings, which are not concentrations. A decimal comma is accepted when the
/// file is not comma-delimited.
fn parse_value(cell: &str, delimiter: u8) -> f64 {
    let cell = cell.trim();
    if is_missing(cell) {
        return f64::NAN;
    }
    cell.parse::<f64>()
        .or_else(|e| {
            if delimiter != b',' && cell.contains(',') {
                cell.replace(',', ".").parse::<f64>()
            } else {
                Err(e)
            }
        })
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(f64::NAN)
}

fn delimiter_of(path: &Path, format: SourceFormat) -> Result<u8> {
    match format {
        SourceFormat::DelimitedText { delimiter } => Ok(delimiter),
        SourceFormat::Excel => Err(StatError::UnsupportedFormat(format!(
            "{}: Excel workbooks are not read directly, export the sheet as ';'-delimited CSV",
            path.display()
        ))),
    }
}

/// Read a delimited file into a [`RawTable`].
///
/// # Errors
///
/// `UnsupportedFormat` for Excel workbooks, `EmptyResult` for a file without header.
pub fn read_table(path: &Path, format: SourceFormat) -> Result<RawTable> {
    let delimiter = delimiter_of(path, format)?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(StatError::EmptyResult(format!(
            "{} has no header row",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|c| c.is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }
    debug!(
        "Read {} rows x {} columns from {}",
        rows.len(),
        headers.len(),
        path.display()
    );

    Ok(RawTable { headers, rows })
}

/// Read the wide measurement table: first column sample ids, one column per
/// variable. A first data row whose id cell is `family` assigns variable families.
pub fn read_measurements(path: &Path, format: SourceFormat) -> Result<MeasurementTable> {
    let delimiter = delimiter_of(path, format)?;
    measurements_from_raw(read_table(path, format)?, delimiter)
}

fn measurements_from_raw(raw: RawTable, delimiter: u8) -> Result<MeasurementTable> {
    if raw.headers.len() < 2 {
        return Err(StatError::Schema(
            "measurement table needs a sample column and at least one variable".to_string(),
        ));
    }

    let mut rows = raw.rows.into_iter().peekable();
    let families: Option<Vec<String>> = match rows.peek() {
        Some(first) if sanitize_name(&first[0]) == "family" => rows.next().map(|r| r[1..].to_vec()),
        _ => None,
    };

    let variables: Vec<Variable> = raw.headers[1..]
        .iter()
        .enumerate()
        .map(|(j, name)| match &families {
            Some(f) => Variable::with_family(name, &f[j]),
            None => Variable::new(name),
        })
        .collect();

    let mut sample_ids = Vec::new();
    let mut values = Vec::new();
    for row in rows {
        sample_ids.push(row[0].clone());
        values.extend(row[1..].iter().map(|cell| parse_value(cell, delimiter)));
    }
    if sample_ids.is_empty() {
        return Err(StatError::EmptyResult(
            "measurement table has no samples".to_string(),
        ));
    }

    let matrix = Array2::from_shape_vec((sample_ids.len(), variables.len()), values)
        .map_err(|e| StatError::Schema(format!("measurement table shape: {}", e)))?;
    info!(
        "Loaded {} samples x {} variables",
        matrix.nrows(),
        matrix.ncols()
    );
    MeasurementTable::new(sample_ids, variables, matrix)
}

/// Read sample metadata: a `sample` / `sample_id` column plus categorical columns.
pub fn read_metadata(path: &Path, format: SourceFormat) -> Result<Metadata> {
    metadata_from_raw(read_table(path, format)?)
}

fn metadata_from_raw(raw: RawTable) -> Result<Metadata> {
    let headers: Vec<String> = raw.headers.iter().map(|h| sanitize_name(h)).collect();
    let id_col = headers
        .iter()
        .position(|h| h == "sample" || h == "sample_id")
        .ok_or_else(|| {
            StatError::Schema(format!(
                "metadata has no 'sample' or 'sample_id' column (found: {})",
                headers.join(", ")
            ))
        })?;

    let sample_ids: Vec<String> = raw.rows.iter().map(|r| r[id_col].clone()).collect();
    let mut metadata = Metadata::new(sample_ids)?;
    for (col, name) in headers.iter().enumerate() {
        if col == id_col {
            continue;
        }
        let values = raw
            .rows
            .iter()
            .map(|r| {
                let cell = r[col].trim();
                (!is_missing(cell)).then(|| cell.to_string())
            })
            .collect();
        metadata.add_column(name, values)?;
    }
    Ok(metadata)
}
