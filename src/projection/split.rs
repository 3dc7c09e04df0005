use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, StatError};

/// Row indices of the training and the held-out split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_samples` with a ChaCha8 stream seeded from `seed` and hold out the
/// first `ceil(test_fraction * n_samples)` indices.
///
/// At least one sample is held out and at least two are left for training.
pub fn train_test_split(n_samples: usize, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(StatError::InvalidParameter(format!(
            "test fraction must lie in (0, 1), got {}",
            test_fraction
        )));
    }

    let n_test = (test_fraction * n_samples as f64).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_test < 1 || n_train < 2 {
        return Err(StatError::InsufficientData(format!(
            "{} samples give a {}/{} train/test split, need at least 2 training and 1 test sample",
            n_samples, n_train, n_test
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}
