use crate::{
    activation::Activation,
    error::Result,
    layer::{dense, gaussian_noise, LayerBuilder},
    loss::Loss,
    mnist,
    nn::NN,
};

pub const DEFAULT_DEPTH: usize = 11;
pub const DEFAULT_WIDTH: usize = 512;

/// Hidden layers of a classifier
#[derive(Clone, Debug, PartialEq)]
pub enum LayerSpec {
    /// `depth` relu dense layers of `width` units each
    Default { depth: usize, width: usize },
    /// These layers in this order
    Explicit(Vec<LayerBuilder>),
}

impl Default for LayerSpec {
    fn default() -> Self {
        LayerSpec::Default {
            depth: DEFAULT_DEPTH,
            width: DEFAULT_WIDTH,
        }
    }
}

impl LayerSpec {
    pub fn layers(&self) -> Vec<LayerBuilder> {
        match self {
            LayerSpec::Default { depth, width } => (0..*depth)
                .map(|_| dense(*width).activation(Activation::Relu).into())
                .collect(),
            LayerSpec::Explicit(layers) => layers.clone(),
        }
    }
}

/// Recipe for a classifier: flattened input, hidden layers, a linear output
/// layer of one unit per class, softmax applied by the loss.
///
/// Building twice gives two independent models with the same architecture.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelBuilder {
    pub input: usize,
    pub spec: LayerSpec,
    pub classes: usize,
    /// Gaussian noise added to the logits while training
    pub output_noise: Option<f32>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new(LayerSpec::default())
    }
}

impl ModelBuilder {
    /// Sized for 28x28 images and ten classes
    pub fn new(spec: LayerSpec) -> Self {
        Self {
            input: mnist::IMAGE_SIZE,
            spec,
            classes: mnist::CLASSES,
            output_noise: None,
        }
    }

    pub fn explicit<L: Into<LayerBuilder>>(layers: impl IntoIterator<Item = L>) -> Self {
        Self::new(LayerSpec::Explicit(
            layers.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn with_input(mut self, input: usize) -> Self {
        self.input = input;
        self
    }

    pub fn with_classes(mut self, classes: usize) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_output_noise(mut self, stddev: f32) -> Self {
        self.output_noise = Some(stddev);
        self
    }

    pub fn build(&self) -> Result<NN> {
        let mut nn = NN::new_input(self.input).with_loss(Loss::SoftmaxAndCrossEntropy);
        for layer in self.spec.layers() {
            nn = nn.layer(layer);
        }
        nn = nn.layer(dense(self.classes).activation(Activation::Linear));
        if let Some(stddev) = self.output_noise {
            nn = nn.layer(gaussian_noise(stddev));
        }
        nn.build()
    }
}
