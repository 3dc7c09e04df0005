//! Parametric tests: two-sample t-tests and the one-way ANOVA F-test.
//!
//! Both work on dense measurement vectors that already went through the
//! missing-value policy of their comparison regime.

use crate::testing::{TTestType, TestResult};
use single_utilities::traits::FloatOps;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

/// Perform a t-test comparing two samples.
///
/// This function performs either Student's t-test (assuming equal variances) or
/// Welch's t-test (allowing unequal variances) on two samples. The test is
/// two-sided.
///
/// # Arguments
///
/// * `x` - First sample
/// * `y` - Second sample
/// * `test_type` - Type of t-test to perform
///
/// # Returns
///
/// `TestResult` containing the t-statistic and p-value. Samples with fewer than
/// two observations give `t = 0, p = 1`.
pub fn t_test<T>(x: &[T], y: &[T], test_type: TTestType) -> TestResult<f64>
where
    T: FloatOps,
{
    let nx = x.len();
    let ny = y.len();

    if nx < 2 || ny < 2 {
        return TestResult::new(0.0, 1.0);
    }

    let mut sum_x = 0.0;
    let mut sum_sq_x = 0.0;
    for val in x.iter().filter_map(|v| v.to_f64()) {
        sum_x += val;
        sum_sq_x += val * val;
    }

    let mut sum_y = 0.0;
    let mut sum_sq_y = 0.0;
    for val in y.iter().filter_map(|v| v.to_f64()) {
        sum_y += val;
        sum_sq_y += val * val;
    }

    t_test_from_sums(
        sum_x,
        sum_sq_x,
        nx as f64,
        sum_y,
        sum_sq_y,
        ny as f64,
        test_type,
    )
}

/// Perform a t-test using precomputed summary statistics.
///
/// # Arguments
///
/// * `sum1`, `sum_sq1`, `n1` - Sum, sum of squares, and count for group 1
/// * `sum2`, `sum_sq2`, `n2` - Sum, sum of squares, and count for group 2
/// * `test_type` - Type of t-test to perform (Student's or Welch's)
pub fn t_test_from_sums(
    sum1: f64,
    sum_sq1: f64,
    n1: f64,
    sum2: f64,
    sum_sq2: f64,
    n2: f64,
    test_type: TTestType,
) -> TestResult<f64> {
    if n1 < 2.0 || n2 < 2.0 {
        return TestResult::new(0.0, 1.0);
    }

    let mean1 = sum1 / n1;
    let mean2 = sum2 / n2;

    // Computational formula; clamp tiny negative values from cancellation.
    let var1 = ((sum_sq1 - sum1 * sum1 / n1) / (n1 - 1.0)).max(0.0);
    let var2 = ((sum_sq2 - sum2 * sum2 / n2) / (n2 - 1.0)).max(0.0);

    let mean_diff = mean1 - mean2;

    let (t_stat, df) = match test_type {
        TTestType::Student => {
            let pooled_var = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / (n1 + n2 - 2.0);
            let std_err = (pooled_var * (1.0 / n1 + 1.0 / n2)).sqrt();
            (mean_diff / std_err, n1 + n2 - 2.0)
        }
        TTestType::Welch => {
            let term1 = var1 / n1;
            let term2 = var2 / n2;
            let combined_var = term1 + term2;
            let t = mean_diff / combined_var.sqrt();

            // Welch-Satterthwaite equation for degrees of freedom
            let df = combined_var * combined_var
                / (term1 * term1 / (n1 - 1.0) + term2 * term2 / (n2 - 1.0));
            (t, df)
        }
    };

    let p_value = t_test_p_value(t_stat, df);
    TestResult::new(t_stat, p_value)
        .with_degrees_of_freedom(df)
        .with_metadata("mean_diff", mean_diff)
}

#[inline]
fn t_test_p_value(t_stat: f64, df: f64) -> f64 {
    // 0/0 from two constant, equal samples
    if !t_stat.is_finite() {
        return if t_stat.is_infinite() { 0.0 } else { 1.0 };
    }

    if df <= 0.0 || !df.is_finite() {
        return 1.0;
    }

    match StudentsT::new(0.0, 1.0, df) {
        Ok(t_dist) => (2.0 * t_dist.sf(t_stat.abs())).min(1.0),
        Err(_) => 1.0,
    }
}

/// One-way ANOVA F-test across `groups`.
///
/// The result carries `ss_between`, `ss_within`, `ms_within` and `df_within` as
/// metadata; the post-hoc comparison reuses the within-group mean square.
///
/// A zero within-group variance gives `F = inf, p = 0` when the group means differ
/// and `F = NaN, p = 1` when every value is identical.
pub fn one_way_anova(groups: &[&[f64]]) -> TestResult<f64> {
    let k = groups.len();
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if k < 2 || n_total <= k {
        return TestResult::new(f64::NAN, 1.0);
    }

    let grand_mean = groups.iter().flat_map(|g| g.iter()).sum::<f64>() / n_total as f64;

    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for group in groups {
        if group.is_empty() {
            continue;
        }
        let m = group.iter().sum::<f64>() / group.len() as f64;
        ss_between += group.len() as f64 * (m - grand_mean).powi(2);
        ss_within += group.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }

    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;
    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;

    let (f_stat, p_value) = if ms_within > 0.0 {
        let f = ms_between / ms_within;
        let p = match FisherSnedecor::new(df_between, df_within) {
            Ok(dist) => dist.sf(f),
            Err(_) => 1.0,
        };
        (f, p)
    } else if ss_between > 0.0 {
        (f64::INFINITY, 0.0)
    } else {
        (f64::NAN, 1.0)
    };

    TestResult::new(f_stat, p_value.clamp(0.0, 1.0))
        .with_degrees_of_freedom(df_between)
        .with_metadata("df_within", df_within)
        .with_metadata("ss_between", ss_between)
        .with_metadata("ss_within", ss_within)
        .with_metadata("ms_within", ms_within)
}
