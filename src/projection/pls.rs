//! Single-response partial least squares by NIPALS.
//!
//! With one response column NIPALS needs no inner iteration: each component's
//! weight vector is the normalised covariance `X'y` of the current residuals.
//! Both `X` and `y` are deflated in regression mode after every component.

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, StatError};

/// Residual norms below this end the extraction early.
const NORM_EPS: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct PlsRegression {
    /// `n_features x n_components`
    x_weights: Array2<f64>,
    /// `n_features x n_components`
    x_loadings: Array2<f64>,
    y_loadings: Array1<f64>,
    y_mean: f64,
}

fn outer(t: &Array1<f64>, p: &Array1<f64>) -> Array2<f64> {
    t.view()
        .insert_axis(Axis(1))
        .dot(&p.view().insert_axis(Axis(0)))
}

fn stack_columns(columns: &[Array1<f64>], n_rows: usize) -> Array2<f64> {
    Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| columns[j][i])
}

impl PlsRegression {
    /// Fit up to `n_components` latent components of the already scaled `x` on `y`.
    ///
    /// Fewer components are kept when the residual covariance vanishes first.
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, n_components: usize) -> Result<Self> {
        let (n, p) = x.dim();
        if n != y.len() {
            return Err(StatError::InvalidParameter(format!(
                "{} rows in X but {} responses",
                n,
                y.len()
            )));
        }
        if n == 0 || p == 0 || n_components == 0 {
            return Err(StatError::InsufficientData(
                "PLS needs at least one sample, one feature and one component".to_string(),
            ));
        }

        let y_mean = y.sum() / n as f64;
        let mut x_res = x.to_owned();
        let mut y_res = y.mapv(|v| v - y_mean);

        let mut weights = Vec::with_capacity(n_components);
        let mut loadings = Vec::with_capacity(n_components);
        let mut y_loadings = Vec::with_capacity(n_components);

        for comp in 0..n_components {
            let mut w = x_res.t().dot(&y_res);
            let norm = w.dot(&w).sqrt();
            if norm < NORM_EPS {
                debug!("PLS stopped after {} component(s): no covariance left", comp);
                break;
            }
            w /= norm;

            let t = x_res.dot(&w);
            let tt = t.dot(&t);
            if tt < NORM_EPS {
                debug!("PLS stopped after {} component(s): degenerate scores", comp);
                break;
            }
            let p_vec = x_res.t().dot(&t) / tt;
            let q = y_res.dot(&t) / tt;

            x_res -= &outer(&t, &p_vec);
            y_res.scaled_add(-q, &t);

            weights.push(w);
            loadings.push(p_vec);
            y_loadings.push(q);
        }

        if weights.is_empty() {
            return Err(StatError::InsufficientData(
                "the response has no variance in the training data".to_string(),
            ));
        }

        Ok(PlsRegression {
            x_weights: stack_columns(&weights, p),
            x_loadings: stack_columns(&loadings, p),
            y_loadings: Array1::from(y_loadings),
            y_mean,
        })
    }

    pub fn n_components(&self) -> usize {
        self.y_loadings.len()
    }

    pub fn x_weights(&self) -> ArrayView2<'_, f64> {
        self.x_weights.view()
    }

    pub fn x_loadings(&self) -> ArrayView2<'_, f64> {
        self.x_loadings.view()
    }

    /// Latent scores of scaled rows, deflated with the fitted loadings.
    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.x_weights.nrows() {
            return Err(StatError::InvalidParameter(format!(
                "model was fitted on {} features, got {}",
                self.x_weights.nrows(),
                x.ncols()
            )));
        }
        let mut x_res = x.to_owned();
        let mut scores = Array2::zeros((x.nrows(), self.n_components()));
        for k in 0..self.n_components() {
            let t = x_res.dot(&self.x_weights.column(k));
            x_res -= &outer(&t, &self.x_loadings.column(k).to_owned());
            scores.column_mut(k).assign(&t);
        }
        Ok(scores)
    }

    pub fn predict_scores(&self, scores: ArrayView2<f64>) -> Array1<f64> {
        scores.dot(&self.y_loadings) + self.y_mean
    }

    /// Continuous response prediction for scaled rows.
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let scores = self.transform(x)?;
        Ok(self.predict_scores(scores.view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_single_component_direction() {
        // y only depends on the first column
        let x = array![[-1.5, 0.2], [-0.5, -0.2], [0.5, 0.2], [1.5, -0.2]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let model = PlsRegression::fit(x.view(), y.view(), 1).unwrap();
        let w = model.x_weights();
        assert!(w[[0, 0]].abs() > 0.99);
        assert_eq!(model.n_components(), 1);
    }

    #[test]
    fn test_full_rank_reproduces_least_squares() {
        // With as many components as features PLS1 equals OLS on centered data.
        let x = array![[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let y = array![2.0, -1.0, -2.0, 1.0];
        let model = PlsRegression::fit(x.view(), y.view(), 2).unwrap();
        let pred = model.predict(x.view()).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_transform_matches_training_scores() {
        let x = array![[1.0, 2.0, 0.5], [2.0, 1.0, 0.1], [3.0, 4.0, 0.7], [4.0, 3.0, 0.2]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let model = PlsRegression::fit(x.view(), y.view(), 2).unwrap();
        let scores = model.transform(x.view()).unwrap();
        assert_eq!(scores.dim(), (4, 2));
        // first-component scores are X w1
        let t1 = x.dot(&model.x_weights().column(0));
        for (a, b) in scores.column(0).iter().zip(t1.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constant_response_is_rejected() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![1.0, 1.0, 1.0];
        assert!(matches!(
            PlsRegression::fit(x.view(), y.view(), 1),
            Err(StatError::InsufficientData(_))
        ));
    }
}
