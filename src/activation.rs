use std::fmt::Display;

use ndarray::{Array2, Zip};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Relu,    // max(0,val)
    Sigmoid, // 0 to 1
    Linear,  // val
    Tanh,    //-1 to 1
    Swish,   //x * sigmoid(x)
}

pub fn activate(val: f32, ltype: Activation) -> f32 {
    match ltype {
        Activation::Relu => val.max(0.),
        Activation::Sigmoid => sigmoid(val),
        Activation::Linear => val,
        Activation::Tanh => val.tanh(),
        Activation::Swish => val * sigmoid(val),
    }
}

/// `value` is the pre-activation, `activated_value` is the activated value
pub fn activate_der(value: f32, activated_value: f32, ltype: Activation) -> f32 {
    match ltype {
        Activation::Relu => {
            if activated_value > 0. {
                1.
            } else {
                0.
            }
        }
        Activation::Sigmoid => activated_value * (1. - activated_value),
        Activation::Linear => 1.,
        Activation::Tanh => 1. - activated_value * activated_value,
        Activation::Swish => {
            let s = sigmoid(value);
            s + value * s * (1. - s)
        }
    }
}

pub(crate) fn sigmoid(val: f32) -> f32 {
    1. / (1. + (-val).exp())
}

impl Activation {
    /// Applies the activation to every element of a batch
    pub fn apply(self, z: &Array2<f32>) -> Array2<f32> {
        z.mapv(|v| activate(v, self))
    }

    /// Elementwise dA/dZ for a batch, given pre-activations and activations
    pub fn derivative(self, z: &Array2<f32>, a: &Array2<f32>) -> Array2<f32> {
        Zip::from(z)
            .and(a)
            .map_collect(|&z, &a| activate_der(z, a, self))
    }
}

impl Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Linear => "linear",
            Activation::Tanh => "tanh",
            Activation::Swish => "swish",
        };
        write!(f, "{name}")
    }
}
