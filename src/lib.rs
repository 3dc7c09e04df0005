//! # statchill
//!
//! Statistical comparison of metabolomics measurements across experimental conditions.
//!
//! A run joins a wide measurement table (samples x variables) with sample metadata,
//! keeps the samples of the requested conditions and then, for every variable,
//! selects and runs a suitable test: a t-test or Mann-Whitney U for two conditions,
//! one-way ANOVA with Tukey HSD post-hoc comparisons for three or more. Alongside
//! the tests, a PLS-DA model separates the conditions and ranks variables by their
//! first-component loading.
//!
//! ## Core Features
//!
//! - **Test selection**: Shapiro-Wilk normality check decides between Welch/Student t and Mann-Whitney U
//! - **Multi-group comparisons**: one-way ANOVA, Tukey HSD through the [`testing::correction::PostHocCorrector`] seam
//! - **Multiple testing correction**: Benjamini-Hochberg over the per-variable p-values
//! - **PLS-DA**: seeded train/test split, accuracy, confusion matrix, ROC/AUC, feature ranking
//!
//! ## Module Organization
//!
//! - **[`data`]**: measurement and metadata tables, alignment on a condition column
//! - **[`testing`]**: statistical tests, effect sizes and corrections
//! - **[`projection`]**: PLS-DA model and its evaluation
//! - **[`pipeline`]**: one analysis run over all variables
//! - **[`results`]**: result rows and run summaries
//! - **[`io`]**: table readers and result writers
//! - **[`config`]** / **[`cli`]**: run configuration and the command-line front end

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod projection;
pub mod results;
pub mod testing;

pub use error::{Result, StatError};
