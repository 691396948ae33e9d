use std::fmt::{Display, Formatter};

use ndarray::{Array1, Array2, Axis};

use crate::activation::sigmoid;

/// Probabilities are clipped to this before taking logs
const EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    ///Mean Squared Error,
    /// defined as `0.5*(y_true - y_pred)^2`,
    /// with the derivative being `(y_pred - y_true)`.
    MSE,
    ///Will apply Softmax, then compute multi-class cross-entropy
    /// with the derivative wrt to logits being `y_pred - y_true`
    SoftmaxAndCrossEntropy,
    ///Will apply Sigmoid, then compute binary cross-entropy
    /// with the derivative wrt to logits being `y_pred - y_true`
    BinaryCrossEntropy,
}

impl Loss {
    /// Converts the network's raw output (logits) into predictions
    pub fn output(&self, logits: &Array2<f32>) -> Array2<f32> {
        match self {
            Loss::MSE => logits.clone(),
            Loss::SoftmaxAndCrossEntropy => softmax(logits),
            Loss::BinaryCrossEntropy => logits.mapv(sigmoid),
        }
    }

    /// Loss for each row of a batch
    pub fn errors(&self, outputs: &Array2<f32>, targets: &Array2<f32>) -> Array1<f32> {
        let rows = outputs.rows().into_iter().zip(targets.rows());
        match self {
            Loss::MSE => rows
                .map(|(o, t)| {
                    o.iter()
                        .zip(t.iter())
                        .map(|(a, b)| 0.5 * (a - b).powi(2))
                        .sum::<f32>()
                })
                .collect(),
            Loss::SoftmaxAndCrossEntropy => rows
                .map(|(o, t)| {
                    -o.iter()
                        .zip(t.iter())
                        .map(|(p, y)| y * p.clamp(EPSILON, 1.).ln())
                        .sum::<f32>()
                })
                .collect(),
            Loss::BinaryCrossEntropy => rows
                .map(|(o, t)| {
                    -o.iter()
                        .zip(t.iter())
                        .map(|(p, y)| {
                            let p = p.clamp(EPSILON, 1. - EPSILON);
                            y * p.ln() + (1. - y) * (1. - p).ln()
                        })
                        .sum::<f32>()
                })
                .collect(),
        }
    }

    /// calc gradient wrt logits for each example
    pub fn gradient(&self, outputs: &Array2<f32>, targets: &Array2<f32>) -> Array2<f32> {
        // softmax + cross-entropy and sigmoid + bce both reduce to output - target,
        // the same as the textbook mse derivative
        outputs - targets
    }
}

/// Row-wise softmax, shifted by the row max for stability
pub fn softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

impl Display for Loss {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Loss::MSE => write!(f, "Mean Squared Error"),
            Loss::SoftmaxAndCrossEntropy => write!(f, "Softmax and Cross-Entropy"),
            Loss::BinaryCrossEntropy => write!(f, "Binary Cross-Entropy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn softmax_rows_sum_to_one() {
        let logits = arr2(&[[1.0f32, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        let out = softmax(&logits);
        for row in out.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        for &p in out.row(1).iter() {
            assert!((p - 1. / 3.).abs() < 1e-6);
        }
    }

    #[test]
    fn cross_entropy_of_uniform_is_ln_k() {
        let outputs = Loss::SoftmaxAndCrossEntropy.output(&Array2::zeros((1, 3)));
        let targets = arr2(&[[0.0f32, 1.0, 0.0]]);
        let errs = Loss::SoftmaxAndCrossEntropy.errors(&outputs, &targets);
        assert!((errs[0] - 3f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn cross_entropy_clips_zero_probability() {
        let outputs = arr2(&[[1.0f32, 0.0]]);
        let targets = arr2(&[[0.0f32, 1.0]]);
        let errs = Loss::SoftmaxAndCrossEntropy.errors(&outputs, &targets);
        assert!(errs[0].is_finite());
        assert!((errs[0] - (-(EPSILON.ln()))).abs() < 1e-3);
    }

    #[test]
    fn mse_and_bce_values() {
        let outputs = arr2(&[[0.0f32]]);
        let targets = arr2(&[[1.0f32]]);
        assert!((Loss::MSE.errors(&outputs, &targets)[0] - 0.5).abs() < 1e-6);

        let outputs = Loss::BinaryCrossEntropy.output(&arr2(&[[0.0f32]]));
        let errs = Loss::BinaryCrossEntropy.errors(&outputs, &targets);
        assert!((errs[0] - 2f32.ln()).abs() < 1e-6);
        assert_eq!(
            Loss::BinaryCrossEntropy.gradient(&outputs, &targets),
            arr2(&[[-0.5]])
        );
    }
}
