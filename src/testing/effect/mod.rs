use num_traits::{Float, FromPrimitive};
use serde::Serialize;

/// Descriptive statistics of one group's measurement vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroupSummary {
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator), `NaN` below two observations.
    pub std_dev: f64,
}

/// Effect sizes reported next to a two-group test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectSizes {
    /// `log2((mean2 + pc) / (mean1 + pc))`
    pub log2_fold_change: f64,
    /// `(mean2 - mean1) / pooled_sd`
    pub cohens_d: f64,
}

/// Pseudo count added to both means before taking the fold change ratio.
pub const FOLD_CHANGE_PSEUDO_COUNT: f64 = 1e-9;

pub fn mean<T>(values: &[T]) -> T
where
    T: Float + FromPrimitive,
{
    match T::from_usize(values.len()) {
        Some(n) if !values.is_empty() => values.iter().fold(T::zero(), |acc, &x| acc + x) / n,
        _ => T::nan(),
    }
}

/// Sample variance with an `n - 1` denominator.
pub fn variance<T>(values: &[T]) -> T
where
    T: Float + FromPrimitive,
{
    let n = values.len();
    let Some(dof) = T::from_usize(n.saturating_sub(1)).filter(|_| n >= 2) else {
        return T::nan();
    };
    let m = mean(values);
    values
        .iter()
        .fold(T::zero(), |acc, &x| acc + (x - m) * (x - m))
        / dof
}

pub fn describe(values: &[f64]) -> GroupSummary {
    GroupSummary {
        n: values.len(),
        mean: mean(values),
        std_dev: variance(values).sqrt(),
    }
}

/// Calculate log2 fold change of group 2 over group 1
pub fn log2_fold_change(group1: &[f64], group2: &[f64], pseudo_count: f64) -> f64 {
    let mean1 = mean(group1) + pseudo_count;
    let mean2 = mean(group2) + pseudo_count;
    (mean2 / mean1).log2()
}

/// Calculate Cohen's d effect size
///
/// Returns `NaN` when either group has fewer than 2 observations or the pooled
/// standard deviation is zero.
pub fn cohens_d(group1: &[f64], group2: &[f64]) -> f64 {
    if group1.len() < 2 || group2.len() < 2 {
        return f64::NAN;
    }

    let n1 = group1.len() as f64;
    let n2 = group2.len() as f64;
    let pooled_sd =
        ((n1 - 1.0) * variance(group1) + (n2 - 1.0) * variance(group2)).sqrt() / (n1 + n2 - 2.0).sqrt();
    if pooled_sd == 0.0 {
        return f64::NAN;
    }

    (mean(group2) - mean(group1)) / pooled_sd
}

pub fn effect_sizes(group1: &[f64], group2: &[f64]) -> EffectSizes {
    EffectSizes {
        log2_fold_change: log2_fold_change(group1, group2, FOLD_CHANGE_PSEUDO_COUNT),
        cohens_d: cohens_d(group1, group2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_log2_fold_change() {
        let low = [2.0, 2.2, 1.8];
        let high = [8.0, 7.5, 8.5];
        assert_abs_diff_eq!(log2_fold_change(&low, &high, 0.01), 2.0, epsilon = 0.1);
        assert_abs_diff_eq!(log2_fold_change(&high, &high, 0.01), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cohens_d() {
        let g1 = [2.0, 2.2, 1.8];
        let g2 = [8.0, 7.5, 8.5];
        let d = cohens_d(&g1, &g2);
        assert!(d > 10.0, "expected a very large effect, got {}", d);
        assert!(cohens_d(&[1.0], &g2).is_nan());
        assert!(cohens_d(&[1.0, 1.0], &[1.0, 1.0]).is_nan());
    }

    #[test]
    fn test_mean_and_variance_f32() {
        let v: [f32; 4] = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(mean(&v), 2.5f32, epsilon = 1e-6);
        assert_abs_diff_eq!(variance(&v), 5.0f32 / 3.0, epsilon = 1e-6);
        assert!(mean::<f64>(&[]).is_nan());
    }

    #[test]
    fn test_describe() {
        let s = describe(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.n, 4);
        assert_abs_diff_eq!(s.mean, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.std_dev, 1.2909944487, epsilon = 1e-9);
        assert!(describe(&[7.0]).std_dev.is_nan());
    }
}
