use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{Result, StatError};

/// Column-wise standardisation to zero mean and unit population variance.
///
/// Columns without variance keep a scale of 1 so they map to zero instead of `NaN`.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(StatError::InsufficientData(
                "cannot fit a scaler on an empty matrix".to_string(),
            ));
        }
        let mean = x.mean_axis(Axis(0)).ok_or_else(|| {
            StatError::InsufficientData("cannot fit a scaler on an empty matrix".to_string())
        })?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(StandardScaler { mean, scale })
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(StatError::InvalidParameter(format!(
                "scaler was fitted on {} features, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        Ok((&x - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}
