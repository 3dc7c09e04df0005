//! Supervised projection (PLS-DA): fit a PLS model on encoded condition labels,
//! evaluate it on a held-out split and rank the variables by their loadings.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};

pub mod encoder;
pub mod metrics;
pub mod pls;
pub mod scaler;
pub mod split;

pub use encoder::LabelEncoder;
pub use metrics::RocPoint;
pub use pls::PlsRegression;
pub use scaler::StandardScaler;
pub use split::{TrainTestSplit, train_test_split};

/// Decision threshold between neighbouring class codes.
const CLASS_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionOptions {
    pub n_components: usize,
    pub test_fraction: f64,
    /// `None` draws a seed from the clock; the run is then not reproducible.
    pub seed: Option<u64>,
    pub top_n: usize,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        ProjectionOptions {
            n_components: 2,
            test_fraction: 0.2,
            seed: None,
            top_n: 20,
        }
    }
}

/// Held-out evaluation of the fitted classifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierMetrics {
    /// Class names in code order.
    pub classes: Vec<String>,
    pub accuracy: f64,
    pub confusion_matrix: Vec<Vec<usize>>,
    /// Two-class problems only.
    pub roc: Option<Vec<RocPoint>>,
    pub auc: Option<f64>,
    pub n_train: usize,
    pub n_test: usize,
    pub n_components: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureLoading {
    pub variable: String,
    pub loading: f64,
}

/// Variables ordered by decreasing absolute first-component loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRanking {
    pub entries: Vec<FeatureLoading>,
}

impl FeatureRanking {
    /// Stable on ties, so equal loadings keep their column order.
    pub fn from_loadings(variables: &[String], loadings: &[f64], top_n: usize) -> Self {
        let mut entries: Vec<FeatureLoading> = variables
            .iter()
            .zip(loadings.iter())
            .map(|(variable, &loading)| FeatureLoading {
                variable: variable.clone(),
                loading,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.loading
                .abs()
                .partial_cmp(&a.loading.abs())
                .unwrap_or(Ordering::Equal)
        });
        entries.truncate(top_n);
        FeatureRanking { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fitted PLS-DA model together with the encoder and scaler it was trained with.
/// New data always goes through the stored scaler; nothing is refitted.
#[derive(Debug, Clone)]
pub struct ProjectionModel {
    encoder: LabelEncoder,
    scaler: StandardScaler,
    pls: PlsRegression,
}

impl ProjectionModel {
    pub fn classes(&self) -> &[String] {
        self.encoder.classes()
    }

    pub fn n_components(&self) -> usize {
        self.pls.n_components()
    }

    /// First-component X loadings, one per feature.
    pub fn first_loadings(&self) -> Array1<f64> {
        self.pls.x_loadings().column(0).to_owned()
    }

    /// Latent coordinates of raw (unscaled) rows.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let scaled = self.scaler.transform(fill_missing(x).view())?;
        self.pls.transform(scaled.view())
    }

    /// Continuous class-code predictions of raw rows.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let scaled = self.scaler.transform(fill_missing(x).view())?;
        self.pls.predict(scaled.view())
    }

    pub fn predict_codes(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let predictions = self.predict(x)?;
        Ok(predictions
            .iter()
            .map(|&y| class_code(y, self.encoder.n_classes()))
            .collect())
    }

    pub fn predict_labels(&self, x: ArrayView2<f64>) -> Result<Vec<String>> {
        Ok(self
            .predict_codes(x)?
            .into_iter()
            .filter_map(|code| self.encoder.inverse_transform(code).map(str::to_string))
            .collect())
    }
}

/// Everything one PLS-DA fit produces.
#[derive(Debug, Clone)]
pub struct ProjectionOutput {
    pub model: ProjectionModel,
    pub metrics: ClassifierMetrics,
    pub ranking: FeatureRanking,
    /// Row indices of the input matrix in each split.
    pub split: TrainTestSplit,
    pub train_scores: Array2<f64>,
    pub test_scores: Array2<f64>,
    pub test_predictions: Vec<f64>,
}

/// Number of class codes `c` with `prediction > c + 0.5`, i.e. the nearest code
/// clamped to `0..n_classes`.
pub fn class_code(prediction: f64, n_classes: usize) -> usize {
    (0..n_classes.saturating_sub(1))
        .filter(|&c| prediction > c as f64 + CLASS_THRESHOLD)
        .count()
}

fn fill_missing(x: ArrayView2<f64>) -> Array2<f64> {
    x.mapv(|v| if v.is_finite() { v } else { 0.0 })
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Fit PLS-DA on `features` (samples x variables) against `labels` and evaluate it.
///
/// Missing values are zero-filled. Labels are encoded in sorted order, the split
/// is shuffled with the seed, the scaler only sees the training rows, and
/// `n_components` is capped at `min(n_train - 1, n_features)`.
///
/// # Errors
///
/// `InsufficientData` for an empty matrix, fewer than two classes, a split without
/// a held-out sample or with fewer than two training samples, or a training
/// response without variance.
pub fn fit_evaluate(
    features: ArrayView2<f64>,
    labels: &[String],
    variables: &[String],
    options: &ProjectionOptions,
) -> Result<ProjectionOutput> {
    let (n_samples, n_features) = features.dim();
    if n_samples == 0 || n_features == 0 {
        return Err(StatError::InsufficientData(format!(
            "feature matrix is {}x{}",
            n_samples, n_features
        )));
    }
    if labels.len() != n_samples || variables.len() != n_features {
        return Err(StatError::InvalidParameter(format!(
            "{} labels and {} variable names for a {}x{} feature matrix",
            labels.len(),
            variables.len(),
            n_samples,
            n_features
        )));
    }
    if options.n_components == 0 || options.top_n == 0 {
        return Err(StatError::InvalidParameter(
            "n_components and top_n must be at least 1".to_string(),
        ));
    }

    let encoder = LabelEncoder::fit(labels);
    if encoder.n_classes() < 2 {
        return Err(StatError::InsufficientData(format!(
            "PLS-DA needs at least 2 classes, got {}",
            encoder.n_classes()
        )));
    }
    let codes = encoder.transform(labels)?;

    let seed = match options.seed {
        Some(seed) => seed,
        None => {
            let seed = clock_seed();
            warn!("No seed given for the PLS-DA split, using {} (run is not reproducible)", seed);
            seed
        }
    };
    let split = train_test_split(n_samples, options.test_fraction, seed)?;

    let x = fill_missing(features);
    let x_train = x.select(Axis(0), &split.train);
    let x_test = x.select(Axis(0), &split.test);
    let y_train: Array1<f64> = split.train.iter().map(|&i| codes[i] as f64).collect();
    let y_test: Vec<usize> = split.test.iter().map(|&i| codes[i]).collect();

    let max_components = (split.train.len() - 1).min(n_features);
    let n_components = if options.n_components > max_components {
        warn!(
            "Requested {} PLS components, only {} are supported by the training data",
            options.n_components, max_components
        );
        max_components
    } else {
        options.n_components
    };

    let scaler = StandardScaler::fit(x_train.view())?;
    let train_scaled = scaler.transform(x_train.view())?;
    let pls = PlsRegression::fit(train_scaled.view(), y_train.view(), n_components)?;
    debug!(
        "PLS-DA fitted with {} component(s) on {} training samples",
        pls.n_components(),
        split.train.len()
    );

    let model = ProjectionModel {
        encoder,
        scaler,
        pls,
    };

    let train_scores = model.pls.transform(train_scaled.view())?;
    let test_scores = model.transform(x_test.view())?;
    let test_predictions = model.pls.predict_scores(test_scores.view()).to_vec();
    let n_classes = model.encoder.n_classes();
    let predicted: Vec<usize> = test_predictions
        .iter()
        .map(|&y| class_code(y, n_classes))
        .collect();

    let (roc, auc) = if n_classes == 2 {
        let positives: Vec<bool> = y_test.iter().map(|&c| c == 1).collect();
        match metrics::roc_curve(&test_predictions, &positives) {
            Some(points) => {
                let area = metrics::auc(&points);
                (Some(points), Some(area))
            }
            None => {
                warn!("Test split holds a single class, ROC/AUC not available");
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let metrics = ClassifierMetrics {
        classes: model.encoder.classes().to_vec(),
        accuracy: metrics::accuracy(&y_test, &predicted),
        confusion_matrix: metrics::confusion_matrix(&y_test, &predicted, n_classes),
        roc,
        auc,
        n_train: split.train.len(),
        n_test: split.test.len(),
        n_components: model.n_components(),
        seed,
    };
    info!(
        "PLS-DA accuracy {:.3} on {} held-out samples",
        metrics.accuracy, metrics.n_test
    );

    let loadings = model.first_loadings();
    let ranking = FeatureRanking::from_loadings(variables, loadings.as_slice().unwrap_or(&[]), options.top_n);

    Ok(ProjectionOutput {
        model,
        metrics,
        ranking,
        split,
        train_scores,
        test_scores,
        test_predictions,
    })
}
