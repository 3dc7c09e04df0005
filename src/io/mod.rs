//! Reading measurement and metadata tables, writing run results.

mod export;
mod tables;

use std::path::Path;

use crate::error::{Result, StatError};

pub use export::{
    CLASSIFIER_METRICS_FILE, CONDITION_SUMMARY_FILE, LATENT_SCORES_FILE, POSTHOC_RESULTS_FILE,
    TEST_RESULTS_FILE, TOP_FEATURES_FILE, write_results,
};
pub use tables::{RawTable, read_measurements, read_metadata, read_table};

/// Delimiter of the tool's `.csv` files.
pub const DEFAULT_DELIMITER: u8 = b';';

/// How a tabular input file is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText { delimiter: u8 },
    /// `.xlsx` / `.xls` workbooks. Recognised so they can be rejected with a clear
    /// message; export the sheet to delimited text instead.
    Excel,
}

impl SourceFormat {
    /// Pick the format from the file extension: `.csv` and `.txt` use `;`,
    /// `.tsv` uses a tab.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "csv" | "txt" => Ok(SourceFormat::DelimitedText {
                delimiter: DEFAULT_DELIMITER,
            }),
            "tsv" => Ok(SourceFormat::DelimitedText { delimiter: b'\t' }),
            "xlsx" | "xls" => Ok(SourceFormat::Excel),
            other => Err(StatError::UnsupportedFormat(format!(
                "{}: unknown extension '.{}'",
                path.display(),
                other
            ))),
        }
    }

    /// Same format family with another delimiter; Excel stays Excel.
    pub fn with_delimiter(self, delimiter: u8) -> Self {
        match self {
            SourceFormat::DelimitedText { .. } => SourceFormat::DelimitedText { delimiter },
            SourceFormat::Excel => SourceFormat::Excel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            SourceFormat::from_path(Path::new("data/Thermo.CSV")).unwrap(),
            SourceFormat::DelimitedText { delimiter: b';' }
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("meta.tsv")).unwrap(),
            SourceFormat::DelimitedText { delimiter: b'\t' }
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("meta.xlsx")).unwrap(),
            SourceFormat::Excel
        );
        assert!(matches!(
            SourceFormat::from_path(Path::new("meta.parquet")),
            Err(StatError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_with_delimiter() {
        let csv = SourceFormat::DelimitedText { delimiter: b';' };
        assert_eq!(
            csv.with_delimiter(b','),
            SourceFormat::DelimitedText { delimiter: b',' }
        );
        assert_eq!(SourceFormat::Excel.with_delimiter(b','), SourceFormat::Excel);
    }
}
