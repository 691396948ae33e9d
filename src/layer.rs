use std::fmt::Display;

use ndarray::{Array2, Axis};

use crate::{
    activation::Activation,
    batch_norm::{BatchNorm, BatchNormCache},
    dropout::Dropout,
    error::{Error, Result},
    initialization::{calc_initialization, Initialization},
    noise::GaussianNoise,
    regularization::Regularization,
};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Dense {
    pub(crate) weights: Array2<f32>, //  2D matrix e.g. [inputs x outputs]
    pub(crate) bias: Array2<f32>,    // [1 x outputs]
    pub(crate) initialization: Initialization,
    pub(crate) activation: Activation,
    pub(crate) regularization: Regularization,
}

impl Dense {
    pub(crate) fn new(
        inputs: usize,
        outputs: usize,
        initialization: Initialization,
        activation: Activation,
        regularization: Regularization,
    ) -> Self {
        let mut s = Self {
            weights: Array2::zeros((inputs, outputs)),
            bias: Array2::zeros((1, outputs)),
            initialization,
            activation,
            regularization,
        };
        s.reinitialize();
        s
    }

    pub(crate) fn reinitialize(&mut self) {
        let (inputs, outputs) = self.weights.dim();
        self.weights
            .mapv_inplace(|_| calc_initialization(self.initialization, inputs, outputs));
        self.bias.fill(0.);
    }

    fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        let z = input.dot(&self.weights) + &self.bias;
        self.activation.apply(&z)
    }

    fn backward(
        &self,
        input: Array2<f32>,
        z: Array2<f32>,
        a: Array2<f32>,
        grad: Array2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        //dE/dZ = dE/dA * dA/dZ
        let dz = grad * self.activation.derivative(&z, &a);
        //dZ/dW = input
        let mut weight_grad = input.t().dot(&dz);
        self.regularization.add_gradient(&self.weights, &mut weight_grad);
        let bias_grad = dz.sum_axis(Axis(0)).insert_axis(Axis(0));
        //dZ/dinput = W, passed down to the previous layer
        let input_grad = dz.dot(&self.weights.t());
        (input_grad, vec![weight_grad, bias_grad])
    }
}

impl Display for Dense {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Dense {}x{} activation:{} initialization:{} regularization:{}",
            self.weights.nrows(),
            self.weights.ncols(),
            self.activation,
            self.initialization,
            self.regularization,
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DenseBuilder {
    pub(crate) size: usize,
    pub(crate) initialization: Initialization,
    pub(crate) activation: Activation,
    pub(crate) regularization: Regularization,
}

pub fn dense(size: usize) -> DenseBuilder {
    DenseBuilder {
        size,
        initialization: Initialization::Xavier,
        activation: Activation::Sigmoid,
        regularization: Regularization::None,
    }
}

impl DenseBuilder {
    pub fn initializer(mut self, init_type: Initialization) -> Self {
        self.initialization = init_type;
        self
    }
    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }
    pub fn regularization(mut self, reg: Regularization) -> Self {
        self.regularization = reg;
        self
    }
}

/// Declarative description of one layer; turned into a [`Layer`] once the
/// width of the layer feeding it is known.
#[derive(Clone, Debug, PartialEq)]
pub enum LayerBuilder {
    Dense(DenseBuilder),
    /// Rate in range (0,1), a good starting point is 0.2
    Dropout(f32),
    BatchNorm,
    /// Standard deviation of the noise added while training
    GaussianNoise(f32),
}

pub fn dropout(rate: f32) -> LayerBuilder {
    LayerBuilder::Dropout(rate)
}

pub fn batch_norm() -> LayerBuilder {
    LayerBuilder::BatchNorm
}

pub fn gaussian_noise(stddev: f32) -> LayerBuilder {
    LayerBuilder::GaussianNoise(stddev)
}

impl From<DenseBuilder> for LayerBuilder {
    fn from(builder: DenseBuilder) -> Self {
        LayerBuilder::Dense(builder)
    }
}

impl From<usize> for LayerBuilder {
    fn from(size: usize) -> Self {
        LayerBuilder::Dense(dense(size))
    }
}

impl LayerBuilder {
    /// Width of this layer's output when fed `input` values
    pub fn output_size(&self, input: usize) -> usize {
        match self {
            LayerBuilder::Dense(d) => d.size,
            _ => input,
        }
    }

    //we need input size to build
    pub(crate) fn build(&self, input: usize) -> Result<Layer> {
        if input == 0 {
            return Err(Error::Shape("layer input width must be positive".into()));
        }
        let layer = match self {
            LayerBuilder::Dense(d) => {
                if d.size == 0 {
                    return Err(Error::Config(
                        "dense layer must have at least one unit".into(),
                    ));
                }
                Layer::Dense(Dense::new(
                    input,
                    d.size,
                    d.initialization,
                    d.activation,
                    d.regularization,
                ))
            }
            LayerBuilder::Dropout(rate) => Layer::Dropout(Dropout::new(*rate, input)?),
            LayerBuilder::BatchNorm => Layer::BatchNorm(BatchNorm::new(input)),
            LayerBuilder::GaussianNoise(stddev) => {
                Layer::GaussianNoise(GaussianNoise::new(*stddev, input)?)
            }
        };
        Ok(layer)
    }
}

/// Kind and output width of a built layer, used to compare architectures
#[derive(Clone, Debug, PartialEq)]
pub struct LayerShape {
    pub kind: &'static str,
    pub inputs: usize,
    pub outputs: usize,
}

impl Display for LayerShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({}->{})", self.kind, self.inputs, self.outputs)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Layer {
    Dense(Dense),
    Dropout(Dropout),
    BatchNorm(BatchNorm),
    GaussianNoise(GaussianNoise),
}

/// Values a training forward pass keeps for the backward pass
pub(crate) enum Cache {
    Dense {
        input: Array2<f32>,
        z: Array2<f32>,
        a: Array2<f32>,
    },
    Dropout {
        mask: Array2<f32>,
    },
    BatchNorm(BatchNormCache),
    Noise,
}

impl Layer {
    pub(crate) fn shape(&self) -> LayerShape {
        let (kind, inputs, outputs) = match self {
            Layer::Dense(d) => ("Dense", d.weights.nrows(), d.weights.ncols()),
            Layer::Dropout(d) => ("Dropout", d.size(), d.size()),
            Layer::BatchNorm(b) => ("BatchNorm", b.size(), b.size()),
            Layer::GaussianNoise(g) => ("GaussianNoise", g.size(), g.size()),
        };
        LayerShape {
            kind,
            inputs,
            outputs,
        }
    }

    pub(crate) fn output_size(&self) -> usize {
        self.shape().outputs
    }

    /// Inference pass: no dropout, no noise, batch norm uses moving statistics
    pub(crate) fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        match self {
            Layer::Dense(d) => d.forward(input),
            Layer::Dropout(_) | Layer::GaussianNoise(_) => input.clone(),
            Layer::BatchNorm(b) => b.forward(input),
        }
    }

    pub(crate) fn forward_train(&mut self, input: Array2<f32>) -> Result<(Array2<f32>, Cache)> {
        let step = match self {
            Layer::Dense(d) => {
                let z = input.dot(&d.weights) + &d.bias;
                let a = d.activation.apply(&z);
                (a.clone(), Cache::Dense { input, z, a })
            }
            Layer::Dropout(d) => {
                let mask = d.mask(input.nrows());
                (input * &mask, Cache::Dropout { mask })
            }
            Layer::BatchNorm(b) => {
                let (out, cache) = b.forward_train(&input);
                (out, Cache::BatchNorm(cache))
            }
            Layer::GaussianNoise(g) => (g.forward_train(&input)?, Cache::Noise),
        };
        Ok(step)
    }

    /// Takes dE/d(output), returns dE/d(input) and the gradients of this layer's
    /// parameters in the same order as [`Layer::params`]
    pub(crate) fn backward(
        &self,
        cache: Cache,
        grad: Array2<f32>,
    ) -> (Array2<f32>, Vec<Array2<f32>>) {
        match (self, cache) {
            (Layer::Dense(d), Cache::Dense { input, z, a }) => d.backward(input, z, a, grad),
            (Layer::Dropout(_), Cache::Dropout { mask }) => (grad * &mask, vec![]),
            (Layer::BatchNorm(b), Cache::BatchNorm(cache)) => b.backward(cache, grad),
            (Layer::GaussianNoise(_), Cache::Noise) => (grad, vec![]),
            _ => unreachable!("cache was produced by a different layer"),
        }
    }

    pub(crate) fn penalty(&self) -> f32 {
        match self {
            Layer::Dense(d) => d.regularization.penalty(&d.weights),
            _ => 0.,
        }
    }

    pub(crate) fn params(&self) -> Vec<&Array2<f32>> {
        match self {
            Layer::Dense(d) => vec![&d.weights, &d.bias],
            Layer::BatchNorm(b) => b.params(),
            _ => vec![],
        }
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Array2<f32>> {
        match self {
            Layer::Dense(d) => vec![&mut d.weights, &mut d.bias],
            Layer::BatchNorm(b) => b.params_mut(),
            _ => vec![],
        }
    }

    /// Parameters plus non-trainable state (batch norm moving statistics)
    pub(crate) fn state(&self) -> Vec<&Array2<f32>> {
        match self {
            Layer::BatchNorm(b) => vec![&b.gamma, &b.beta, &b.moving_mean, &b.moving_var],
            _ => self.params(),
        }
    }

    pub(crate) fn state_mut(&mut self) -> Vec<&mut Array2<f32>> {
        match self {
            Layer::BatchNorm(b) => vec![
                &mut b.gamma,
                &mut b.beta,
                &mut b.moving_mean,
                &mut b.moving_var,
            ],
            _ => self.params_mut(),
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Dense(d) => write!(f, "{d}"),
            Layer::Dropout(d) => write!(f, "Dropout rate:{}", d.rate()),
            Layer::BatchNorm(b) => write!(f, "BatchNorm features:{}", b.size()),
            Layer::GaussianNoise(g) => write!(f, "GaussianNoise stddev:{}", g.stddev()),
        }
    }
}
