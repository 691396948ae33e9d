use std::fmt::Display;

use ndarray::Array2;

const ADAM_EPSILON: f32 = 1e-7;

//used for selection
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Optimizer {
    /// Plain gradient descent
    Sgd,
    Momentum { beta: f32 },
    Adam { beta1: f32, beta2: f32 },
}

impl Optimizer {
    pub fn adam() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
        }
    }
}

impl Display for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Optimizer::Sgd => write!(f, "SGD"),
            Optimizer::Momentum { beta } => write!(f, "Momentum({beta})"),
            Optimizer::Adam { beta1, beta2 } => write!(f, "Adam({beta1},{beta2})"),
        }
    }
}

/// Per-parameter optimizer memory.
/// Parameters are addressed by position, so gradients must always arrive in the
/// same order as the parameters this state was created from.
#[derive(Clone, Debug)]
pub(crate) struct OptimizerState {
    optimizer: Optimizer,
    velocity1: Vec<Array2<f32>>,
    velocity2: Vec<Array2<f32>>,
    step: i32,
}

impl OptimizerState {
    pub(crate) fn new(optimizer: Optimizer, params: &[&Array2<f32>]) -> Self {
        let zeros = || -> Vec<Array2<f32>> {
            params.iter().map(|p| Array2::zeros(p.dim())).collect()
        };
        let (velocity1, velocity2) = match optimizer {
            Optimizer::Sgd => (vec![], vec![]),
            Optimizer::Momentum { .. } => (zeros(), vec![]),
            Optimizer::Adam { .. } => (zeros(), zeros()),
        };
        Self {
            optimizer,
            velocity1,
            velocity2,
            step: 0,
        }
    }

    pub(crate) fn optimizer(&self) -> Optimizer {
        self.optimizer
    }

    ///Turns gradients into the update to add to each parameter
    ///e.g. for Sgd, it returns `-learning_rate*gradient`
    pub(crate) fn calc_update(
        &mut self,
        mut gradients: Vec<Array2<f32>>,
        learning_rate: f32,
    ) -> Vec<Array2<f32>> {
        self.step += 1;
        let step = self.step;
        for (l, gradient) in gradients.iter_mut().enumerate() {
            match self.optimizer {
                Optimizer::Sgd => {
                    gradient.mapv_inplace(|a| a * -learning_rate);
                }
                Optimizer::Momentum { beta } => {
                    self.velocity1[l] = &self.velocity1[l] * beta + &*gradient * -learning_rate;
                    gradient.assign(&self.velocity1[l]);
                }
                Optimizer::Adam { beta1, beta2 } => {
                    self.velocity1[l] = &self.velocity1[l] * beta1 + &*gradient * (1.0 - beta1);
                    self.velocity2[l] =
                        &self.velocity2[l] * beta2 + &gradient.mapv(|x| x.powi(2)) * (1.0 - beta2);

                    // bias-corrected moment estimates
                    let m = &self.velocity1[l] / (1.0 - beta1.powi(step));
                    let v = &self.velocity2[l] / (1.0 - beta2.powi(step));

                    *gradient = m / (v.mapv(f32::sqrt) + ADAM_EPSILON) * -learning_rate;
                }
            }
        }
        gradients
    }
}
