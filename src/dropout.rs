use ndarray::Array2;

use crate::error::{Error, Result};

/// Inverted dropout: in training each unit is zeroed with probability `rate`
/// and survivors are scaled by `1/(1-rate)`. Inference passes values through.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Dropout {
    rate: f32,
    size: usize,
}

impl Dropout {
    pub(crate) fn new(rate: f32, size: usize) -> Result<Self> {
        if !(rate > 0. && rate < 1.) {
            return Err(Error::Config(format!(
                "Dropout rate must be in range (0,1), got {rate}"
            )));
        }
        Ok(Self { rate, size })
    }

    pub(crate) fn rate(&self) -> f32 {
        self.rate
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// A fresh mask for a batch of `rows`
    pub(crate) fn mask(&self, rows: usize) -> Array2<f32> {
        let keep = 1. / (1. - self.rate); //scale up to keep expected value the same
        Array2::from_shape_fn((rows, self.size), |_| {
            if fastrand::f32() < self.rate {
                0.
            } else {
                keep
            }
        })
    }
}
