use ndarray::Array2;
use ndarray_rand::{
    rand::{rngs::StdRng, SeedableRng},
    rand_distr::Normal,
    RandomExt,
};

use crate::error::{Error, Result};

/// Additive zero-mean gaussian noise, applied only while training
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GaussianNoise {
    stddev: f32,
    size: usize,
}

impl GaussianNoise {
    pub(crate) fn new(stddev: f32, size: usize) -> Result<Self> {
        if !(stddev.is_finite() && stddev >= 0.) {
            return Err(Error::Config(format!(
                "Gaussian noise stddev must be finite and non-negative, got {stddev}"
            )));
        }
        Ok(Self { stddev, size })
    }

    pub(crate) fn stddev(&self) -> f32 {
        self.stddev
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// The sampler is seeded from the global `fastrand` state, so reseeding
    /// that reproduces the noise too
    pub(crate) fn forward_train(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        let normal = Normal::new(0., self.stddev)
            .map_err(|e| Error::Config(format!("Gaussian noise: {e}")))?;
        let mut rng = StdRng::seed_from_u64(fastrand::u64(..));
        Ok(input + &Array2::random_using(input.dim(), normal, &mut rng))
    }
}
