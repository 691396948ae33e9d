use std::fmt::Display;

use ndarray::Array2;

/// Kernel penalty added to the loss of a dense layer
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Regularization {
    None,
    L1(f32),
    L2(f32),
    L1L2(f32, f32),
}

impl Regularization {
    ///Uses default of 0.01
    pub fn l2() -> Regularization {
        Regularization::L2(0.01)
    }

    fn factors(&self) -> (f32, f32) {
        match *self {
            Regularization::None => (0., 0.),
            Regularization::L1(l1) => (l1, 0.),
            Regularization::L2(l2) => (0., l2),
            Regularization::L1L2(l1, l2) => (l1, l2),
        }
    }

    /// `l1 * sum(|w|) + l2 * sum(w^2)`
    pub fn penalty(&self, weights: &Array2<f32>) -> f32 {
        let (l1, l2) = self.factors();
        let mut total = 0.;
        if l1 != 0. {
            total += l1 * weights.iter().map(|w| w.abs()).sum::<f32>();
        }
        if l2 != 0. {
            total += l2 * weights.iter().map(|w| w * w).sum::<f32>();
        }
        total
    }

    /// Adds the penalty gradient `l1 * sign(w) + 2 * l2 * w` onto `gradient`
    pub fn add_gradient(&self, weights: &Array2<f32>, gradient: &mut Array2<f32>) {
        let (l1, l2) = self.factors();
        if l1 == 0. && l2 == 0. {
            return;
        }
        gradient.zip_mut_with(weights, |g, &w| {
            let sign = if w > 0. {
                1.
            } else if w < 0. {
                -1.
            } else {
                0.
            };
            *g += l1 * sign + 2. * l2 * w;
        });
    }
}

impl Display for Regularization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Regularization::None => write!(f, "None"),
            Regularization::L1(v) => write!(f, "L1:{v}"),
            Regularization::L2(v) => write!(f, "L2:{v}"),
            Regularization::L1L2(v1, v2) => write!(f, "L1L2:{v1},{v2}"),
        }
    }
}
