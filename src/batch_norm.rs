use ndarray::{Array1, Array2, Axis};

const MOMENTUM: f32 = 0.99;
const EPSILON: f32 = 0.001;

/// Per-feature batch normalisation.
///
/// Training normalises with the batch statistics and folds them into the moving
/// mean and variance; inference normalises with the moving statistics.
/// `gamma` and `beta` are learned and kept as `1 x features` matrices so the
/// optimizer treats them like any other parameter.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BatchNorm {
    pub(crate) gamma: Array2<f32>,
    pub(crate) beta: Array2<f32>,
    pub(crate) moving_mean: Array2<f32>,
    pub(crate) moving_var: Array2<f32>,
}

/// What backward needs from a training forward pass
#[derive(Clone, Debug)]
pub(crate) struct BatchNormCache {
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
}

impl BatchNorm {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            gamma: Array2::ones((1, size)),
            beta: Array2::zeros((1, size)),
            moving_mean: Array2::zeros((1, size)),
            moving_var: Array2::ones((1, size)),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.gamma.ncols()
    }

    pub(crate) fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        let inv_std = self.moving_var.mapv(|v| 1. / (v + EPSILON).sqrt());
        (input - &self.moving_mean) * &inv_std * &self.gamma + &self.beta
    }

    pub(crate) fn forward_train(&mut self, input: &Array2<f32>) -> (Array2<f32>, BatchNormCache) {
        let features = input.ncols();
        let mean = input
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(features));
        let var = input.var_axis(Axis(0), 0.);
        let inv_std = var.mapv(|v| 1. / (v + EPSILON).sqrt());

        let normalized = (input - &mean) * &inv_std;
        let output = &normalized * &self.gamma + &self.beta;

        self.moving_mean =
            &self.moving_mean * MOMENTUM + &mean.insert_axis(Axis(0)) * (1. - MOMENTUM);
        self.moving_var = &self.moving_var * MOMENTUM + &var.insert_axis(Axis(0)) * (1. - MOMENTUM);

        (
            output,
            BatchNormCache {
                normalized,
                inv_std,
            },
        )
    }

    /// Returns the input gradient and the `[gamma, beta]` gradients
    pub(crate) fn backward(
        &self,
        cache: BatchNormCache,
        grad: Array2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        let n = grad.nrows() as f32;
        let BatchNormCache {
            normalized,
            inv_std,
        } = cache;

        let dgamma = (&grad * &normalized).sum_axis(Axis(0)).insert_axis(Axis(0));
        let dbeta = grad.sum_axis(Axis(0)).insert_axis(Axis(0));

        // dx = inv_std/N * (N*dxhat - sum(dxhat) - xhat*sum(dxhat*xhat))
        let dxhat = &grad * &self.gamma;
        let sum_dxhat = dxhat.sum_axis(Axis(0));
        let sum_dxhat_xhat = (&dxhat * &normalized).sum_axis(Axis(0));
        let input_grad =
            (dxhat * n - &sum_dxhat - &normalized * &sum_dxhat_xhat) * &(inv_std / n);

        (input_grad, vec![dgamma, dbeta])
    }

    pub(crate) fn params(&self) -> Vec<&Array2<f32>> {
        vec![&self.gamma, &self.beta]
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        vec![&mut self.gamma, &mut self.beta]
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;

    #[test]
    fn training_output_is_standardised() {
        let mut bn = BatchNorm::new(2);
        let input = arr2(&[[1.0f32, 10.0], [3.0, 20.0], [5.0, 30.0]]);
        let (out, _) = bn.forward_train(&input);
        for col in out.columns() {
            assert!(col.mean().unwrap().abs() < 1e-5);
            let var = col.var(0.);
            assert!((var - 1.0).abs() < 0.01, "variance {var}");
        }
    }

    #[test]
    fn moving_stats_follow_batches() {
        let mut bn = BatchNorm::new(1);
        let input = arr2(&[[2.0f32], [4.0]]);
        bn.forward_train(&input);
        assert!((bn.moving_mean[[0, 0]] - 0.03).abs() < 1e-6);
        assert!((bn.moving_var[[0, 0]] - (0.99 + 0.01)).abs() < 1e-6);
    }

    #[test]
    fn inference_uses_moving_stats() {
        let bn = BatchNorm::new(2);
        let input = arr2(&[[1.0f32, -1.0]]);
        let out = bn.forward(&input);
        let scale = 1. / (1f32 + EPSILON).sqrt();
        assert!((out[[0, 0]] - scale).abs() < 1e-6);
        assert!((out[[0, 1]] + scale).abs() < 1e-6);
    }

    #[test]
    fn input_gradient_sums_to_zero() {
        // shifting every input of a feature by a constant does not change the output
        let mut bn = BatchNorm::new(2);
        let input = arr2(&[[1.0f32, 0.5], [2.0, -0.5], [4.0, 1.5]]);
        let (_, cache) = bn.forward_train(&input);
        let grad = arr2(&[[0.3f32, -0.2], [0.1, 0.4], [-0.7, 0.05]]);
        let (dx, param_grads) = bn.backward(cache, grad.clone());
        for col in dx.columns() {
            assert!(col.sum().abs() < 1e-5);
        }
        assert_eq!(param_grads[1], grad.sum_axis(Axis(0)).insert_axis(Axis(0)));
    }
}
