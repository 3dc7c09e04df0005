use serde::{Deserialize, Serialize};
use single_utilities::traits::FloatOps;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StatError};
use crate::testing::effect::EffectSizes;

pub mod correction;
pub mod effect;
pub mod inference;
pub mod normality;

/// Significance threshold used for every per-variable verdict.
pub const DEFAULT_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestKind {
    TTest(TTestType),
    MannWhitney,
    Anova,
}

impl TestKind {
    /// Short name used in exported tables.
    pub fn label(&self) -> &'static str {
        match self {
            TestKind::TTest(_) => "t-test",
            TestKind::MannWhitney => "Mann-Whitney",
            TestKind::Anova => "ANOVA",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::TTest(t) => write!(f, "t-test ({})", t),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TTestType {
    Student, // Equal variance
    #[default]
    Welch, // Unequal variance
}

impl fmt::Display for TTestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TTestType::Student => f.write_str("student"),
            TTestType::Welch => f.write_str("welch"),
        }
    }
}

impl std::str::FromStr for TTestType {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "student" | "pooled" => Ok(TTestType::Student),
            "welch" | "unpooled" => Ok(TTestType::Welch),
            other => Err(StatError::InvalidParameter(format!(
                "unknown t-test type '{}' (expected 'student' or 'welch')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Alternative {
    TwoSided,
    Less,
    Greater,
}

/// Which regime a variable is tested under, decided by the number of accepted
/// conditions of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Exactly two groups: t-test or Mann-Whitney depending on normality.
    Pairwise,
    /// Three or more groups: one-way ANOVA, Tukey HSD when it rejects.
    ManyGroup,
}

impl Comparison {
    pub fn for_group_count(n_groups: usize) -> Result<Self> {
        match n_groups {
            0 | 1 => Err(StatError::EmptyResult(format!(
                "a comparison needs at least 2 groups, got {}",
                n_groups
            ))),
            2 => Ok(Comparison::Pairwise),
            _ => Ok(Comparison::ManyGroup),
        }
    }
}

/// Knobs of the per-variable test loop.
#[derive(Debug, Clone, Copy)]
pub struct TestSettings {
    /// Threshold of the per-variable significance verdict.
    pub alpha: f64,
    /// Threshold of the Shapiro-Wilk normality verdict.
    pub normality_alpha: f64,
    /// Family-wise error level of the post-hoc comparisons.
    pub family_alpha: f64,
    pub t_test_type: TTestType,
}

impl Default for TestSettings {
    fn default() -> Self {
        TestSettings {
            alpha: DEFAULT_ALPHA,
            normality_alpha: DEFAULT_ALPHA,
            family_alpha: DEFAULT_ALPHA,
            t_test_type: TTestType::Welch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestResult<T> {
    /// The test statistic value (e.g., t-statistic, U statistic)
    pub statistic: T,
    /// The p-value of the test
    pub p_value: T,
    /// Degrees of freedom (for parametric inference)
    pub degrees_of_freedom: Option<T>,
    /// Additional test-specific information
    pub metadata: HashMap<String, T>,
}

impl<T> TestResult<T>
where
    T: FloatOps,
{
    /// Create a new test result with minimal information
    pub fn new(statistic: T, p_value: T) -> Self {
        TestResult {
            statistic,
            p_value,
            degrees_of_freedom: None,
            metadata: HashMap::new(),
        }
    }

    /// Add degrees of freedom to the result
    pub fn with_degrees_of_freedom(mut self, df: T) -> Self {
        self.degrees_of_freedom = Some(df);
        self
    }

    /// Add additional metadata
    pub fn with_metadata(mut self, key: &str, value: T) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Check if the result is statistically significant at the given threshold
    pub fn is_significant(&self, alpha: T) -> bool {
        self.p_value < alpha
    }
}

/// Outcome of testing one variable. Created once per variable per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub variable: String,
    /// Conditions compared, in reporting order.
    pub groups: Vec<String>,
    pub kind: TestKind,
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    /// Observations per group after the missing-value policy was applied.
    pub group_sizes: Vec<usize>,
    /// Normality verdict per group (two-group regime only).
    pub normality: Vec<bool>,
    pub effect: Option<EffectSizes>,
}

/// Tukey HSD result for one pair of conditions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostHocOutcome {
    pub variable: String,
    pub group1: String,
    pub group2: String,
    /// `mean(group2) - mean(group1)`
    pub mean_diff: f64,
    pub p_adj: f64,
    pub lower: f64,
    pub upper: f64,
    pub reject: bool,
}

/// What the per-variable loop produced for one variable. A variable whose test is
/// undefined is kept as `Failed` so the caller sees it instead of losing it.
#[derive(Debug, Clone)]
pub enum VariableOutcome {
    Tested {
        outcome: TestOutcome,
        posthoc: Vec<PostHocOutcome>,
    },
    Failed {
        variable: String,
        error: String,
    },
}

impl VariableOutcome {
    pub fn variable(&self) -> &str {
        match self {
            VariableOutcome::Tested { outcome, .. } => &outcome.variable,
            VariableOutcome::Failed { variable, .. } => variable,
        }
    }

    pub fn outcome(&self) -> Option<&TestOutcome> {
        match self {
            VariableOutcome::Tested { outcome, .. } => Some(outcome),
            VariableOutcome::Failed { .. } => None,
        }
    }
}
