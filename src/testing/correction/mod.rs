//! Multiple testing corrections: Tukey's HSD across the conditions of one variable,
//! and Benjamini-Hochberg across the variables of a run.

use std::cmp::Ordering;

use crate::error::{Result, StatError};
use crate::testing::PostHocOutcome;
use crate::testing::effect::mean;

pub mod studentized_range;

/// Post-hoc pairwise comparison applied after a rejecting many-group test.
///
/// The per-variable loop calls this from worker threads, hence `Sync`.
pub trait PostHocCorrector: Sync {
    fn posthoc(
        &self,
        variable: &str,
        groups: &[(String, Vec<f64>)],
        family_alpha: f64,
    ) -> Result<Vec<PostHocOutcome>>;
}

/// Tukey-Kramer honestly significant difference test.
#[derive(Debug, Clone, Copy, Default)]
pub struct TukeyHsd;

impl PostHocCorrector for TukeyHsd {
    fn posthoc(
        &self,
        variable: &str,
        groups: &[(String, Vec<f64>)],
        family_alpha: f64,
    ) -> Result<Vec<PostHocOutcome>> {
        tukey_hsd(variable, groups, family_alpha)
    }
}

/// Tukey-Kramer HSD over every pair `(i, j)`, `i < j`, in the order of `groups`.
///
/// `mean_diff` is `mean_j - mean_i`. The mean square error is pooled over all
/// groups, so every pair shares the `N - k` error degrees of freedom.
pub fn tukey_hsd(
    variable: &str,
    groups: &[(String, Vec<f64>)],
    family_alpha: f64,
) -> Result<Vec<PostHocOutcome>> {
    if !(family_alpha > 0.0 && family_alpha < 1.0) {
        return Err(StatError::InvalidParameter(format!(
            "family alpha must lie in (0, 1), got {}",
            family_alpha
        )));
    }
    let k = groups.len();
    if k < 2 {
        return Err(StatError::degenerate(variable, "post-hoc comparison needs at least 2 groups"));
    }
    if let Some((name, _)) = groups.iter().find(|(_, values)| values.is_empty()) {
        return Err(StatError::degenerate(variable, format!("group '{}' is empty", name)));
    }

    let n_total: usize = groups.iter().map(|(_, g)| g.len()).sum();
    if n_total <= k {
        return Err(StatError::degenerate(
            variable,
            "no degrees of freedom left for the error variance",
        ));
    }

    let means: Vec<f64> = groups.iter().map(|(_, g)| mean(g.as_slice())).collect();
    let ss_within: f64 = groups
        .iter()
        .zip(means.iter())
        .map(|((_, g), m)| g.iter().map(|x| (x - m).powi(2)).sum::<f64>())
        .sum();
    let df_error = (n_total - k) as f64;
    let mse = ss_within / df_error;
    let n_means = k as f64;
    let q_crit = studentized_range::qtukey(1.0 - family_alpha, n_means, df_error);

    let mut outcomes = Vec::with_capacity(k * (k - 1) / 2);
    for i in 0..k {
        for j in (i + 1)..k {
            let (name_i, gi) = &groups[i];
            let (name_j, gj) = &groups[j];
            let mean_diff = means[j] - means[i];
            let se = (mse / 2.0 * (1.0 / gi.len() as f64 + 1.0 / gj.len() as f64)).sqrt();

            let p_adj = if se > 0.0 {
                let q = mean_diff.abs() / se;
                (1.0 - studentized_range::ptukey(q, n_means, df_error)).clamp(0.0, 1.0)
            } else if mean_diff != 0.0 {
                0.0
            } else {
                1.0
            };

            outcomes.push(PostHocOutcome {
                variable: variable.to_string(),
                group1: name_i.clone(),
                group2: name_j.clone(),
                mean_diff,
                p_adj,
                lower: mean_diff - q_crit * se,
                upper: mean_diff + q_crit * se,
                reject: p_adj < family_alpha,
            });
        }
    }

    Ok(outcomes)
}

/// Apply Benjamini-Hochberg (BH) procedure for controlling false discovery rate
///
/// The BH procedure controls the false discovery rate (FDR), which is the expected
/// proportion of false positives among all rejected null hypotheses.
///
/// # Arguments
/// * `p_values` - A slice of p-values to adjust
///
/// # Returns
/// * `Result<Vec<f64>>` - Vector of adjusted p-values, in input order
pub fn benjamini_hochberg_correction(p_values: &[f64]) -> Result<Vec<f64>> {
    let n = p_values.len();
    if n == 0 {
        return Err(StatError::InvalidParameter("Empty p-value array".to_string()));
    }

    // Validate p-values
    for (i, &p) in p_values.iter().enumerate() {
        if !(0.0..=1.0).contains(&p) {
            return Err(StatError::InvalidParameter(format!(
                "Invalid p-value at index {}: {}",
                i, p
            )));
        }
    }

    let mut indexed_p_values: Vec<(usize, f64)> =
        p_values.iter().enumerate().map(|(i, &p)| (i, p)).collect();
    indexed_p_values.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let mut adjusted_p_values = vec![0.0; n];
    let mut current_min = 1.0;

    // Process from largest to smallest p-value
    for i in (0..n).rev() {
        let (orig_idx, p_val) = indexed_p_values[i];
        let rank = i + 1;

        let adjustment = (p_val * n as f64 / rank as f64).min(1.0);
        current_min = adjustment.min(current_min);
        adjusted_p_values[orig_idx] = current_min;
    }

    Ok(adjusted_p_values)
}
