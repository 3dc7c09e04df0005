//! One analysis run: the per-variable test loop and the PLS-DA fit, run side by
//! side on the rayon pool and merged into [`RunResults`].

use log::{info, warn};
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::data::SampleTable;
use crate::error::Result;
use crate::projection::{ProjectionOptions, fit_evaluate};
use crate::results::{ProjectionReport, RunKey, RunResults, condition_summaries};
use crate::testing::correction::PostHocCorrector;
use crate::testing::inference::compare_variable;
use crate::testing::{TestSettings, VariableOutcome};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub tests: TestSettings,
    /// `None` skips the PLS-DA stage.
    pub projection: Option<ProjectionOptions>,
}

/// Test every variable of `table` in parallel. Outcomes keep the table's
/// variable order; a variable-scoped failure does not stop the others.
pub fn test_variables(
    table: &SampleTable,
    settings: &TestSettings,
    corrector: &dyn PostHocCorrector,
) -> Result<Vec<VariableOutcome>> {
    (0..table.n_variables())
        .into_par_iter()
        .map(|idx| compare_variable(table, idx, settings, corrector))
        .collect()
}

/// Project the samples of `table` with PLS-DA on their condition labels.
pub fn project(table: &SampleTable, options: &ProjectionOptions) -> Result<ProjectionReport> {
    let variables: Vec<String> = table.variables().iter().map(|v| v.name.clone()).collect();
    let output = fit_evaluate(table.values().view(), table.labels(), &variables, options)?;
    Ok(ProjectionReport::new(&output, table))
}

/// Run the statistical tests on `table` and, when enabled, PLS-DA on
/// `projection_table` (defaults to `table`).
///
/// Only an empty projection matrix aborts the run. Any other PLS-DA failure is
/// logged and kept in [`RunResults::projection_error`] next to the test outcomes.
pub fn run(
    key: RunKey,
    table: &SampleTable,
    projection_table: Option<&SampleTable>,
    options: &RunOptions,
    corrector: &dyn PostHocCorrector,
) -> Result<RunResults> {
    info!(
        "Run {}: {} samples, {} variables, {} conditions",
        key,
        table.n_samples(),
        table.n_variables(),
        table.conditions().len()
    );

    let projection_table = projection_table.unwrap_or(table);
    let (outcomes, projection) = rayon::join(
        || test_variables(table, &options.tests, corrector),
        || {
            options
                .projection
                .as_ref()
                .map(|opts| project(projection_table, opts))
                .transpose()
        },
    );
    let outcomes = outcomes?;
    let (projection, projection_error) = match projection {
        Ok(report) => (report, None),
        Err(e) if projection_table.n_samples() == 0 || projection_table.n_variables() == 0 => {
            return Err(e);
        }
        Err(e) => {
            warn!("PLS-DA skipped: {}", e);
            (None, Some(e.to_string()))
        }
    };

    let mut results = RunResults::assemble(key, outcomes, condition_summaries(table), projection)?;
    results.projection_error = projection_error;
    info!(
        "{} of {} variables significant, {} could not be tested",
        results.n_significant(),
        results.outcomes.len(),
        results.n_failed()
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Variable;
    use crate::testing::correction::TukeyHsd;
    use crate::error::StatError;
    use ndarray::Array2;

    fn key() -> RunKey {
        RunKey {
            condition_column: "treatment".to_string(),
            accepted_conditions: vec!["ctrl".to_string(), "drug1".to_string()],
        }
    }

    fn projected() -> RunOptions {
        RunOptions {
            tests: TestSettings::default(),
            projection: Some(ProjectionOptions {
                seed: Some(42),
                ..Default::default()
            }),
        }
    }

    /// 3 ctrl and 2 drug1 samples, separated on both variables.
    fn small_table() -> SampleTable {
        let values = ndarray::array![
            [1.0, 4.0],
            [1.3, 4.4],
            [0.8, 3.7],
            [3.1, 8.2],
            [3.4, 7.9]
        ];
        SampleTable::new(
            (0..5).map(|i| format!("s{}", i)).collect(),
            vec![Variable::new("alanine"), Variable::new("lactate")],
            values,
            ["ctrl", "ctrl", "ctrl", "drug1", "drug1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            vec!["ctrl".to_string(), "drug1".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_outcomes_keep_variable_order() {
        let n = 12;
        let values = Array2::from_shape_fn((n, 5), |(i, j)| {
            let shift = if i < 6 { 0.0 } else { j as f64 };
            (i % 4) as f64 + j as f64 * 0.5 + shift
        });
        let labels: Vec<String> = (0..n)
            .map(|i| if i < 6 { "ctrl" } else { "drug1" }.to_string())
            .collect();
        let table = SampleTable::new(
            (0..n).map(|i| format!("s{}", i)).collect(),
            (0..5).map(|j| Variable::new(&format!("m{}", j))).collect(),
            values,
            labels,
            vec!["ctrl".to_string(), "drug1".to_string()],
        )
        .unwrap();

        let outcomes = test_variables(&table, &TestSettings::default(), &TukeyHsd).unwrap();
        let names: Vec<&str> = outcomes.iter().map(|o| o.variable()).collect();
        assert_eq!(names, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_five_samples_hold_out_one() {
        let results = run(key(), &small_table(), None, &projected(), &TukeyHsd).unwrap();
        assert_eq!(results.outcomes.len(), 2);
        assert!(results.projection_error.is_none());
        let projection = results.projection.as_ref().unwrap();
        assert_eq!(projection.metrics.n_test, 1);
        assert_eq!(projection.metrics.n_train, 4);
    }

    #[test]
    fn test_failed_projection_keeps_test_outcomes() {
        let table = small_table();
        // a constant feature leaves PLS nothing to fit, whatever the split
        let flat = SampleTable::new(
            table.sample_ids().to_vec(),
            vec![Variable::new("flat")],
            Array2::from_elem((5, 1), 2.0),
            table.labels().to_vec(),
            table.conditions().to_vec(),
        )
        .unwrap();

        let results = run(key(), &table, Some(&flat), &projected(), &TukeyHsd).unwrap();
        assert!(results.projection.is_none());
        assert!(results.projection_error.as_deref().unwrap().contains("no variance"));
        assert_eq!(results.outcomes.len(), 2);
        assert!(results.outcomes.iter().all(|o| o.outcome().is_some()));
        assert_eq!(results.result_rows().len(), 2);
    }

    #[test]
    fn test_empty_projection_matrix_aborts_the_run() {
        let table = small_table();
        let empty = SampleTable::new(
            Vec::new(),
            table.variables().to_vec(),
            Array2::zeros((0, 2)),
            Vec::new(),
            table.conditions().to_vec(),
        )
        .unwrap();

        let err = run(key(), &table, Some(&empty), &projected(), &TukeyHsd).unwrap_err();
        assert!(matches!(err, StatError::InsufficientData(_)));
    }
}
