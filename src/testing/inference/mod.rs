//! Test selection: which hypothesis test a variable gets, and running it.
//!
//! Two conditions go through the pairwise regime (normality diagnostics, then a
//! t-test or a Mann-Whitney U test); three or more go through a one-way ANOVA
//! followed by a post-hoc correction when the ANOVA rejects.

use log::{debug, warn};

use crate::data::{MissingValuePolicy, SampleTable};
use crate::error::{Result, StatError};
use crate::testing::correction::PostHocCorrector;
use crate::testing::effect::effect_sizes;
use crate::testing::normality::is_approximately_normal;
use crate::testing::{
    Alternative, Comparison, TestKind, TestOutcome, TestSettings, VariableOutcome,
};

pub mod nonparametric;
pub mod parametric;

/// Compare two groups of one variable.
///
/// Missing values are dropped per group. When both groups look normal the
/// configured t-test is used, otherwise the two-sided Mann-Whitney U test.
pub fn compare_two(
    variable: &str,
    group1: &(String, Vec<f64>),
    group2: &(String, Vec<f64>),
    settings: &TestSettings,
) -> Result<TestOutcome> {
    let x = MissingValuePolicy::Drop.apply(group1.1.iter().copied());
    let y = MissingValuePolicy::Drop.apply(group2.1.iter().copied());

    for (name, values) in [(&group1.0, &x), (&group2.0, &y)] {
        if values.is_empty() {
            return Err(StatError::degenerate(
                variable,
                format!("condition '{}' has no observed values", name),
            ));
        }
    }

    let normality = vec![
        is_approximately_normal(&x, settings.normality_alpha),
        is_approximately_normal(&y, settings.normality_alpha),
    ];

    let (kind, result) = if normality.iter().all(|&n| n) {
        let kind = TestKind::TTest(settings.t_test_type);
        (kind, parametric::t_test(&x, &y, settings.t_test_type))
    } else {
        (
            TestKind::MannWhitney,
            nonparametric::mann_whitney(&x, &y, Alternative::TwoSided),
        )
    };
    debug!(
        "{}: {} between '{}' (n={}) and '{}' (n={}), p={:.4e}",
        variable,
        kind,
        group1.0,
        x.len(),
        group2.0,
        y.len(),
        result.p_value
    );

    Ok(TestOutcome {
        variable: variable.to_string(),
        groups: vec![group1.0.clone(), group2.0.clone()],
        kind,
        statistic: result.statistic,
        p_value: result.p_value,
        significant: result.is_significant(settings.alpha),
        group_sizes: vec![x.len(), y.len()],
        normality,
        effect: Some(effect_sizes(&x, &y)),
    })
}

/// One-way ANOVA across three or more groups of one variable.
///
/// Missing values are zero-filled. Every group needs at least two observations.
pub fn compare_many(
    variable: &str,
    groups: &[(String, Vec<f64>)],
    settings: &TestSettings,
) -> Result<TestOutcome> {
    let filled: Vec<Vec<f64>> = groups
        .iter()
        .map(|(_, values)| MissingValuePolicy::ZeroFill.apply(values.iter().copied()))
        .collect();

    if let Some(((name, _), values)) = groups.iter().zip(filled.iter()).find(|(_, v)| v.len() < 2) {
        return Err(StatError::degenerate(
            variable,
            format!(
                "condition '{}' has {} observation(s), at least 2 are required",
                name,
                values.len()
            ),
        ));
    }

    let slices: Vec<&[f64]> = filled.iter().map(|v| v.as_slice()).collect();
    let result = parametric::one_way_anova(&slices);
    debug!(
        "{}: ANOVA over {} conditions, F={:.4}, p={:.4e}",
        variable,
        groups.len(),
        result.statistic,
        result.p_value
    );

    Ok(TestOutcome {
        variable: variable.to_string(),
        groups: groups.iter().map(|(name, _)| name.clone()).collect(),
        kind: TestKind::Anova,
        statistic: result.statistic,
        p_value: result.p_value,
        significant: result.is_significant(settings.alpha),
        group_sizes: filled.iter().map(|v| v.len()).collect(),
        normality: Vec::new(),
        effect: None,
    })
}

/// Test variable `var_idx` of `table` under the regime its condition count selects.
///
/// Errors scoped to the variable become [`VariableOutcome::Failed`]; anything else
/// is returned as an error and aborts the run. `corrector` only runs when the
/// many-group test rejects.
pub fn compare_variable(
    table: &SampleTable,
    var_idx: usize,
    settings: &TestSettings,
    corrector: &dyn PostHocCorrector,
) -> Result<VariableOutcome> {
    let variable = table.variables()[var_idx].name.as_str();
    let comparison = Comparison::for_group_count(table.conditions().len())?;

    let tested = match comparison {
        Comparison::Pairwise => {
            let groups = table.group_values(var_idx, MissingValuePolicy::Drop);
            compare_two(variable, &groups[0], &groups[1], settings).map(|outcome| (outcome, Vec::new()))
        }
        Comparison::ManyGroup => {
            let groups = table.group_values(var_idx, MissingValuePolicy::ZeroFill);
            compare_many(variable, &groups, settings).and_then(|outcome| {
                let posthoc = if outcome.p_value < settings.alpha {
                    corrector.posthoc(variable, &groups, settings.family_alpha)?
                } else {
                    Vec::new()
                };
                Ok((outcome, posthoc))
            })
        }
    };

    match tested {
        Ok((outcome, posthoc)) => Ok(VariableOutcome::Tested { outcome, posthoc }),
        Err(e) if e.is_variable_scoped() => {
            warn!("Skipping variable '{}': {}", variable, e);
            Ok(VariableOutcome::Failed {
                variable: variable.to_string(),
                error: e.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}
