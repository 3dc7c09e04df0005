//! Run results: per-variable outcomes, post-hoc comparisons and projection output
//! merged under the run's identity, plus their flattened export rows.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::data::{MissingValuePolicy, SampleTable};
use crate::error::Result;
use crate::projection::{ClassifierMetrics, FeatureRanking, ProjectionOutput};
use crate::testing::correction::benjamini_hochberg_correction;
use crate::testing::effect::describe;
use crate::testing::{PostHocOutcome, VariableOutcome};

/// Identity of a run: the condition column and the accepted condition set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RunKey {
    pub condition_column: String,
    pub accepted_conditions: Vec<String>,
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}=[{}]",
            self.condition_column,
            self.accepted_conditions.join(",")
        )
    }
}

/// One line of the per-variable results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub variable: String,
    /// Compared conditions joined with `" vs "`.
    pub groups: String,
    pub test: String,
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    /// Benjamini-Hochberg adjusted across the tested variables of the run.
    pub p_adj: Option<f64>,
    pub significant: bool,
    /// Observations per condition joined with `;`.
    pub group_sizes: String,
    pub log2_fold_change: Option<f64>,
    pub cohens_d: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostHocRow {
    pub variable: String,
    pub group1: String,
    pub group2: String,
    pub mean_diff: f64,
    pub p_adj: f64,
    pub lower: f64,
    pub upper: f64,
    pub reject: bool,
}

impl From<&PostHocOutcome> for PostHocRow {
    fn from(o: &PostHocOutcome) -> Self {
        PostHocRow {
            variable: o.variable.clone(),
            group1: o.group1.clone(),
            group2: o.group2.clone(),
            mean_diff: o.mean_diff,
            p_adj: o.p_adj,
            lower: o.lower,
            upper: o.upper,
            reject: o.reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub rank: usize,
    pub variable: String,
    pub loading: f64,
}

/// Mean and standard deviation of one variable within one condition, missing
/// values left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummaryRow {
    pub variable: String,
    pub condition: String,
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
}

/// Latent coordinates of one sample in the PLS-DA space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub sample: String,
    pub condition: String,
    pub split: String,
    pub component_1: f64,
    pub component_2: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectionReport {
    pub metrics: ClassifierMetrics,
    pub ranking: FeatureRanking,
    pub scores: Vec<ScoreRow>,
}

impl ProjectionReport {
    /// Attach sample identities from `table` (the table the model was fitted on)
    /// to the latent coordinates of both splits.
    pub fn new(output: &ProjectionOutput, table: &SampleTable) -> Self {
        let mut scores = Vec::with_capacity(table.n_samples());
        let splits = [
            ("train", &output.split.train, &output.train_scores),
            ("test", &output.split.test, &output.test_scores),
        ];
        for (split, rows, coords) in splits {
            for (k, &row) in rows.iter().enumerate() {
                scores.push(ScoreRow {
                    sample: table.sample_ids()[row].clone(),
                    condition: table.labels()[row].clone(),
                    split: split.to_string(),
                    component_1: coords[[k, 0]],
                    component_2: (coords.ncols() > 1).then(|| coords[[k, 1]]),
                });
            }
        }
        ProjectionReport {
            metrics: output.metrics.clone(),
            ranking: output.ranking.clone(),
            scores,
        }
    }
}

/// Everything one run produced, immutable once assembled.
#[derive(Debug, Clone)]
pub struct RunResults {
    pub key: RunKey,
    pub outcomes: Vec<VariableOutcome>,
    /// Aligned with `outcomes`; `None` for variables that could not be tested.
    pub adjusted_p_values: Vec<Option<f64>>,
    pub summaries: Vec<ConditionSummaryRow>,
    pub projection: Option<ProjectionReport>,
    /// Why PLS-DA produced no report although it was requested.
    pub projection_error: Option<String>,
}

impl RunResults {
    /// Merge the collected outcomes and attach Benjamini-Hochberg adjusted
    /// p-values computed over every successfully tested variable.
    pub fn assemble(
        key: RunKey,
        outcomes: Vec<VariableOutcome>,
        summaries: Vec<ConditionSummaryRow>,
        projection: Option<ProjectionReport>,
    ) -> Result<Self> {
        let tested: Vec<(usize, f64)> = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.outcome().map(|t| (i, t.p_value)))
            .filter(|(_, p)| p.is_finite())
            .collect();

        let mut adjusted_p_values = vec![None; outcomes.len()];
        if !tested.is_empty() {
            let raw: Vec<f64> = tested.iter().map(|&(_, p)| p).collect();
            let adjusted = benjamini_hochberg_correction(&raw)?;
            for ((i, _), p_adj) in tested.iter().zip(adjusted) {
                adjusted_p_values[*i] = Some(p_adj);
            }
        }
        debug!(
            "Assembled {} outcomes for {} ({} tested)",
            outcomes.len(),
            key,
            tested.len()
        );

        Ok(RunResults {
            key,
            outcomes,
            adjusted_p_values,
            summaries,
            projection,
            projection_error: None,
        })
    }

    pub fn n_significant(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(VariableOutcome::outcome)
            .filter(|o| o.significant)
            .count()
    }

    pub fn n_failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome().is_none())
            .count()
    }

    pub fn result_rows(&self) -> Vec<ResultRow> {
        self.outcomes
            .iter()
            .zip(self.adjusted_p_values.iter())
            .map(|(outcome, &p_adj)| match outcome {
                VariableOutcome::Tested { outcome, .. } => ResultRow {
                    variable: outcome.variable.clone(),
                    groups: outcome.groups.join(" vs "),
                    test: outcome.kind.label().to_string(),
                    statistic: Some(outcome.statistic),
                    p_value: Some(outcome.p_value),
                    p_adj,
                    significant: outcome.significant,
                    group_sizes: outcome
                        .group_sizes
                        .iter()
                        .map(|n| n.to_string())
                        .collect::<Vec<_>>()
                        .join(";"),
                    log2_fold_change: outcome.effect.map(|e| e.log2_fold_change),
                    cohens_d: outcome.effect.map(|e| e.cohens_d),
                    error: None,
                },
                VariableOutcome::Failed { variable, error } => ResultRow {
                    variable: variable.clone(),
                    groups: self.key.accepted_conditions.join(" vs "),
                    test: String::new(),
                    statistic: None,
                    p_value: None,
                    p_adj: None,
                    significant: false,
                    group_sizes: String::new(),
                    log2_fold_change: None,
                    cohens_d: None,
                    error: Some(error.clone()),
                },
            })
            .collect()
    }

    pub fn posthoc_rows(&self) -> Vec<PostHocRow> {
        self.outcomes
            .iter()
            .flat_map(|o| match o {
                VariableOutcome::Tested { posthoc, .. } => posthoc.as_slice(),
                VariableOutcome::Failed { .. } => &[],
            })
            .map(PostHocRow::from)
            .collect()
    }

    pub fn feature_rows(&self) -> Vec<FeatureRow> {
        self.projection
            .as_ref()
            .map(|p| {
                p.ranking
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(i, e)| FeatureRow {
                        rank: i + 1,
                        variable: e.variable.clone(),
                        loading: e.loading,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Per-condition descriptive statistics of every variable of `table`.
pub fn condition_summaries(table: &SampleTable) -> Vec<ConditionSummaryRow> {
    let mut rows = Vec::with_capacity(table.n_variables() * table.conditions().len());
    for (idx, variable) in table.variables().iter().enumerate() {
        for (condition, values) in table.group_values(idx, MissingValuePolicy::Drop) {
            let summary = describe(&values);
            rows.push(ConditionSummaryRow {
                variable: variable.name.clone(),
                condition,
                n: summary.n,
                mean: summary.mean,
                std_dev: summary.std_dev,
            });
        }
    }
    rows
}
