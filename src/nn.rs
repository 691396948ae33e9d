use std::fmt::Display;

use ndarray::{Array2, Axis};

use crate::{
    callback::{Callback, Control},
    dataset::Partition,
    error::{Error, Result},
    history::{EpochLogs, History},
    layer::{Cache, Layer, LayerBuilder, LayerShape},
    loss::Loss,
    metric,
    optimizer::{Optimizer, OptimizerState},
};

/// Rows forwarded at once by `evaluate`
const EVAL_BATCH: usize = 1024;
/// Reported until `compile` sets the real rate
const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// Options shared by every epoch of one `fit` call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    /// Seeds the per-epoch shuffle of the training rows
    pub seed: u64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            seed: 1,
        }
    }
}

/// Loss (including regularization penalties) and accuracy on a partition
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: f32,
}

/// A feed-forward stack of layers trained by mini-batch gradient descent.
///
/// The last layer's output is treated as logits: the loss turns it into
/// predictions, e.g. softmax for [`Loss::SoftmaxAndCrossEntropy`].
///
///```rust
///    use overfit::prelude::*;
///    use ndarray::array;
///
///    fastrand::seed(1);
///    let mut nn = NN::new_input(2)
///        .layer(dense(8).activation(Activation::Relu))
///        .layer(dense(2).activation(Activation::Linear))
///        .with_loss(Loss::SoftmaxAndCrossEntropy)
///        .build()
///        .unwrap();
///    nn.compile(Optimizer::adam(), Loss::SoftmaxAndCrossEntropy, 0.01).unwrap();
///
///    let data = Partition::new(
///        array![[0., 0.], [0., 1.], [1., 0.], [1., 1.]],
///        array![[1., 0.], [1., 0.], [0., 1.], [0., 1.]],
///    )
///    .unwrap();
///    let options = FitOptions { epochs: 3, batch_size: 2, seed: 1 };
///    let history = nn.fit(&data, &data, &options, &mut []).unwrap();
///    assert_eq!(history.epochs(), 3);
///```
#[derive(Clone, Debug)]
pub struct NN {
    input_size: usize,
    layers: Vec<Layer>,
    loss: Loss,
    learning_rate: f32,
    optimizer: Option<OptimizerState>,
}

/// Collects layer descriptions; widths are resolved in [`NNBuilder::build`]
#[derive(Clone, Debug)]
pub struct NNBuilder {
    input_size: usize,
    layers: Vec<LayerBuilder>,
    loss: Loss,
}

impl NNBuilder {
    /// Appends a layer, a plain number is a dense layer of that width
    pub fn layer(mut self, layer: impl Into<LayerBuilder>) -> Self {
        self.layers.push(layer.into());
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn build(self) -> Result<NN> {
        if self.layers.is_empty() {
            return Err(Error::Config("network needs at least one layer".into()));
        }
        let mut width = self.input_size;
        let mut layers = Vec::with_capacity(self.layers.len());
        for builder in &self.layers {
            let layer = builder.build(width)?;
            width = layer.output_size();
            layers.push(layer);
        }

        Ok(NN {
            input_size: self.input_size,
            layers,
            loss: self.loss,
            learning_rate: DEFAULT_LEARNING_RATE,
            optimizer: None,
        })
    }
}

impl NN {
    /// Starts a network taking `input_size` values per sample
    pub fn new_input(input_size: usize) -> NNBuilder {
        NNBuilder {
            input_size,
            layers: vec![],
            loss: Loss::SoftmaxAndCrossEntropy,
        }
    }

    /// Sets optimizer, loss and learning rate, and resets the optimizer state
    pub fn compile(
        &mut self,
        optimizer: Optimizer,
        loss: Loss,
        learning_rate: f32,
    ) -> Result<()> {
        if !(learning_rate.is_finite() && learning_rate > 0.) {
            return Err(Error::Config(format!(
                "learning rate must be positive, got {learning_rate}"
            )));
        }
        self.loss = loss;
        self.learning_rate = learning_rate;
        self.optimizer = Some(OptimizerState::new(optimizer, &self.params()));
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.optimizer.is_some()
    }

    pub fn optimizer(&self) -> Option<Optimizer> {
        self.optimizer.as_ref().map(OptimizerState::optimizer)
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn output_size(&self) -> usize {
        self.layers
            .last()
            .map(Layer::output_size)
            .unwrap_or(self.input_size)
    }

    /// Trains for `options.epochs` epochs unless a callback stops it.
    ///
    /// Every epoch shuffles the training rows, takes one optimizer step per
    /// mini-batch, then evaluates on `validation`. Training loss and accuracy
    /// are averaged over the epoch's batches, weighted by batch size, and are
    /// measured with dropout and noise active.
    pub fn fit(
        &mut self,
        train: &Partition,
        validation: &Partition,
        options: &FitOptions,
        callbacks: &mut [&mut dyn Callback],
    ) -> Result<History> {
        if self.optimizer.is_none() {
            return Err(Error::Config("model must be compiled before fit".into()));
        }
        if options.epochs == 0 || options.batch_size == 0 {
            return Err(Error::Config(format!(
                "epochs and batch size must be positive, got {} and {}",
                options.epochs, options.batch_size
            )));
        }
        self.check_partition("training", train)?;
        self.check_partition("validation", validation)?;

        let rows = train.len();
        let mut rng = fastrand::Rng::with_seed(options.seed);
        let mut indices = (0..rows).collect::<Vec<usize>>();
        let mut history = History::default();

        for callback in callbacks.iter_mut() {
            callback.on_train_begin(self);
        }

        for epoch in 1..=options.epochs {
            rng.shuffle(&mut indices);
            let mut loss_sum = 0.;
            let mut correct = 0;
            for batch in indices.chunks(options.batch_size) {
                let inputs = train.inputs().select(Axis(0), batch);
                let targets = train.targets().select(Axis(0), batch);
                let (loss, hits) = self.train_batch(inputs, &targets)?;
                if !loss.is_finite() {
                    return Err(Error::Diverged { epoch, loss });
                }
                loss_sum += loss * batch.len() as f32;
                correct += hits;
            }

            let val = self.evaluate(validation)?;
            if !val.loss.is_finite() {
                return Err(Error::Diverged {
                    epoch,
                    loss: val.loss,
                });
            }
            let logs = EpochLogs {
                epoch,
                loss: loss_sum / rows as f32,
                accuracy: correct as f32 / rows as f32,
                val_loss: val.loss,
                val_accuracy: val.accuracy,
            };
            history.push(&logs);

            let mut stop = false;
            for callback in callbacks.iter_mut() {
                stop |= callback.on_epoch_end(&logs, self) == Control::Stop;
            }
            if stop {
                break;
            }
        }

        for callback in callbacks.iter_mut() {
            callback.on_train_end(self)?;
        }
        Ok(history)
    }

    /// One optimizer step, returns the batch loss and number of correct rows
    pub(crate) fn train_batch(
        &mut self,
        inputs: Array2<f32>,
        targets: &Array2<f32>,
    ) -> Result<(f32, usize)> {
        let (outputs, loss, gradients) = self.forward_backward(inputs, targets)?;
        let correct = metric::correct_count(&outputs, targets);

        let learning_rate = self.learning_rate;
        let state = self
            .optimizer
            .as_mut()
            .ok_or_else(|| Error::Config("model must be compiled before training".into()))?;
        let updates = state.calc_update(gradients, learning_rate);
        for (param, update) in self
            .layers
            .iter_mut()
            .flat_map(|layer| layer.params_mut())
            .zip(updates)
        {
            *param += &update;
        }
        Ok((loss, correct))
    }

    /// Batch loss and the gradient of every parameter, in [`NN::params`] order
    #[cfg(test)]
    pub(crate) fn gradients(
        &mut self,
        inputs: Array2<f32>,
        targets: &Array2<f32>,
    ) -> Result<(f32, Vec<Array2<f32>>)> {
        let (_, loss, gradients) = self.forward_backward(inputs, targets)?;
        Ok((loss, gradients))
    }

    fn forward_backward(
        &mut self,
        inputs: Array2<f32>,
        targets: &Array2<f32>,
    ) -> Result<(Array2<f32>, f32, Vec<Array2<f32>>)> {
        let batch = inputs.nrows() as f32;

        let mut caches: Vec<Cache> = Vec::with_capacity(self.layers.len());
        let mut values = inputs;
        for layer in &mut self.layers {
            let (out, cache) = layer.forward_train(values)?;
            caches.push(cache);
            values = out;
        }

        let outputs = self.loss.output(&values);
        let loss = self
            .loss
            .errors(&outputs, targets)
            .mean()
            .unwrap_or_default()
            + self.penalty();

        //the loss is a mean over the batch, so is its gradient
        let mut grad = self.loss.gradient(&outputs, targets) / batch;
        let mut layer_gradients = Vec::with_capacity(self.layers.len());
        for (layer, cache) in self.layers.iter().zip(caches).rev() {
            let (input_grad, param_grads) = layer.backward(cache, grad);
            grad = input_grad;
            layer_gradients.push(param_grads);
        }
        let gradients = layer_gradients.into_iter().rev().flatten().collect();

        Ok((outputs, loss, gradients))
    }

    /// Inference-mode loss and accuracy, no parameters change
    pub fn evaluate(&self, partition: &Partition) -> Result<Evaluation> {
        self.check_partition("evaluation", partition)?;

        let mut loss_sum = 0.;
        let mut correct = 0;
        for (inputs, targets) in partition
            .inputs()
            .axis_chunks_iter(Axis(0), EVAL_BATCH)
            .zip(partition.targets().axis_chunks_iter(Axis(0), EVAL_BATCH))
        {
            let targets = targets.to_owned();
            let outputs = self.loss.output(&self.forward(inputs.to_owned()));
            loss_sum += self.loss.errors(&outputs, &targets).sum();
            correct += metric::correct_count(&outputs, &targets);
        }

        let rows = partition.len() as f32;
        Ok(Evaluation {
            loss: loss_sum / rows + self.penalty(),
            accuracy: correct as f32 / rows,
        })
    }

    /// Predictions for each row of `inputs`, e.g. class probabilities
    pub fn predict(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size {
            return Err(Error::Shape(format!(
                "expected {} input columns, got {}",
                self.input_size,
                inputs.ncols()
            )));
        }
        Ok(self.loss.output(&self.forward(inputs.clone())))
    }

    fn forward(&self, inputs: Array2<f32>) -> Array2<f32> {
        self.layers
            .iter()
            .fold(inputs, |values, layer| layer.forward(&values))
    }

    fn check_partition(&self, name: &str, partition: &Partition) -> Result<()> {
        if partition.is_empty() {
            return Err(Error::Data(format!("{name} partition is empty")));
        }
        if partition.inputs().ncols() != self.input_size {
            return Err(Error::Shape(format!(
                "{name} inputs have {} columns, model expects {}",
                partition.inputs().ncols(),
                self.input_size
            )));
        }
        if partition.targets().ncols() != self.output_size() {
            return Err(Error::Shape(format!(
                "{name} targets have {} columns, model outputs {}",
                partition.targets().ncols(),
                self.output_size()
            )));
        }
        Ok(())
    }

    /// Regularization penalty summed over all layers
    pub fn penalty(&self) -> f32 {
        self.layers.iter().map(Layer::penalty).sum()
    }

    fn params(&self) -> Vec<&Array2<f32>> {
        self.layers.iter().flat_map(Layer::params).collect()
    }

    /// Architecture summary, one entry per layer
    pub fn shape(&self) -> Vec<LayerShape> {
        self.layers.iter().map(Layer::shape).collect()
    }

    /// Number of trainable values
    pub fn parameter_count(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    ///Returns a copy of every parameter and batch norm statistic, in layer order
    pub fn weights(&self) -> Vec<Array2<f32>> {
        self.layers
            .iter()
            .flat_map(Layer::state)
            .cloned()
            .collect()
    }

    ///Sets everything `weights` returned, shapes must match
    pub fn set_weights(&mut self, weights: Vec<Array2<f32>>) -> Result<()> {
        let mut state = self
            .layers
            .iter_mut()
            .flat_map(|layer| layer.state_mut())
            .collect::<Vec<_>>();
        if state.len() != weights.len() {
            return Err(Error::Shape(format!(
                "expected {} weight matrices, got {}",
                state.len(),
                weights.len()
            )));
        }
        if let Some((i, (current, new))) = state
            .iter()
            .zip(&weights)
            .enumerate()
            .find(|(_, (current, new))| current.dim() != new.dim())
        {
            return Err(Error::Shape(format!(
                "weight matrix {i} is {:?}, got {:?}",
                current.dim(),
                new.dim()
            )));
        }
        for (current, new) in state.iter_mut().zip(weights) {
            **current = new;
        }
        Ok(())
    }
}

impl Display for NN {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "input: {}", self.input_size)?;
        for layer in &self.layers {
            writeln!(f, "{layer}")?;
        }
        write!(f, "loss: {} learning rate: {}", self.loss, self.learning_rate)?;
        if let Some(optimizer) = self.optimizer() {
            write!(f, " optimizer: {optimizer}")?;
        }
        write!(f, " parameters: {}", self.parameter_count())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr2;

    use super::*;
    use crate::{
        activation::Activation,
        initialization::Initialization,
        layer::{batch_norm, dense, dropout, gaussian_noise},
        regularization::Regularization,
    };

    fn xor() -> Partition {
        Partition::new(
            arr2(&[[0., 0.], [0., 1.], [1., 0.], [1., 1.]]),
            arr2(&[[1., 0.], [0., 1.], [0., 1.], [1., 0.]]),
        )
        .unwrap()
    }

    fn small() -> NN {
        NN::new_input(2)
            .layer(dense(8).activation(Activation::Tanh))
            .layer(dense(2).activation(Activation::Linear))
            .build()
            .unwrap()
    }

    #[test]
    fn test_shape() {
        let nn = NN::new_input(784)
            .layer(dense(512))
            .layer(dropout(0.5))
            .layer(batch_norm())
            .layer(gaussian_noise(0.1))
            .layer(10)
            .build()
            .unwrap();
        let widths = nn.shape().iter().map(|s| s.outputs).collect::<Vec<_>>();
        assert_eq!(widths, vec![512, 512, 512, 512, 10]);
        assert_eq!(nn.shape()[1].kind, "Dropout");
        assert_eq!(nn.output_size(), 10);
        assert_eq!(nn.parameter_count(), 784 * 512 + 512 + 2 * 512 + 512 * 10 + 10);
    }

    #[test]
    fn empty_network_is_rejected() {
        assert!(matches!(NN::new_input(3).build(), Err(Error::Config(_))));
    }

    #[test]
    fn fit_requires_compile() {
        let mut nn = small();
        let data = xor();
        let result = nn.fit(&data, &data, &FitOptions::default(), &mut []);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn fit_checks_shapes() {
        let mut nn = small();
        nn.compile(Optimizer::adam(), Loss::SoftmaxAndCrossEntropy, 0.01)
            .unwrap();
        let wrong = Partition::new(Array2::zeros((2, 3)), Array2::zeros((2, 2))).unwrap();
        let result = nn.fit(&wrong, &xor(), &FitOptions::default(), &mut []);
        assert!(matches!(result, Err(Error::Shape(_))));

        let empty = Partition::new(Array2::zeros((0, 2)), Array2::zeros((0, 2))).unwrap();
        assert!(matches!(nn.evaluate(&empty), Err(Error::Data(_))));
    }

    #[test]
    fn compile_rejects_bad_learning_rate() {
        let mut nn = small();
        let result = nn.compile(Optimizer::adam(), Loss::SoftmaxAndCrossEntropy, 0.);
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(!nn.is_compiled());
    }

    #[test]
    fn xor_adam() {
        fastrand::seed(1);
        let mut nn = small();
        nn.compile(Optimizer::adam(), Loss::SoftmaxAndCrossEntropy, 0.05)
            .unwrap();
        let data = xor();
        let options = FitOptions {
            epochs: 300,
            batch_size: 4,
            seed: 1,
        };
        let history = nn.fit(&data, &data, &options, &mut []).unwrap();
        assert_eq!(history.epochs(), 300);
        assert!(history.loss[299] < history.loss[0]);
        assert_eq!(nn.evaluate(&data).unwrap().accuracy, 1.);
    }

    #[test]
    fn evaluate_does_not_train() {
        fastrand::seed(2);
        let mut nn = small();
        nn.compile(Optimizer::adam(), Loss::SoftmaxAndCrossEntropy, 0.01)
            .unwrap();
        let before = nn.weights();
        let first = nn.evaluate(&xor()).unwrap();
        let second = nn.evaluate(&xor()).unwrap();
        assert_eq!(first, second);
        assert_eq!(nn.weights(), before);
    }

    #[test]
    fn evaluate_includes_penalty() {
        let nn = NN::new_input(2)
            .layer(
                dense(2)
                    .activation(Activation::Linear)
                    .initializer(Initialization::Fixed(0.))
                    .regularization(Regularization::L2(0.1)),
            )
            .build()
            .unwrap();
        // zero weights give uniform predictions and no penalty
        let eval = nn.evaluate(&xor()).unwrap();
        assert!((eval.loss - 2f32.ln()).abs() < 1e-6);

        let mut nn = nn;
        let weights = nn.weights().iter().map(|w| w.mapv(|_| 1.)).collect();
        nn.set_weights(weights).unwrap();
        // equal logits again, penalty 0.1 * 4 weights
        let eval = nn.evaluate(&xor()).unwrap();
        assert!((eval.loss - (2f32.ln() + 0.4)).abs() < 1e-5);
    }

    #[test]
    fn get_set_weights() {
        fastrand::seed(3);
        let mut nn = NN::new_input(3)
            .layer(dense(4))
            .layer(batch_norm())
            .layer(dense(2))
            .build()
            .unwrap();
        let input = arr2(&[[1., 2., 3.]]);
        let before = nn.predict(&input).unwrap();
        let weights = nn.weights();
        // dense w+b, batch norm gamma beta mean var, dense w+b
        assert_eq!(weights.len(), 8);
        nn.set_weights(weights.clone()).unwrap();
        assert_eq!(nn.predict(&input).unwrap(), before);

        let mut short = weights.clone();
        short.pop();
        assert!(matches!(nn.set_weights(short), Err(Error::Shape(_))));
        let mut wrong = weights;
        wrong[0] = Array2::zeros((1, 1));
        assert!(matches!(nn.set_weights(wrong), Err(Error::Shape(_))));
    }

    #[test]
    fn divergence_is_reported() {
        let mut nn = NN::new_input(1)
            .layer(
                dense(1)
                    .activation(Activation::Linear)
                    .initializer(Initialization::Fixed(1.)),
            )
            .with_loss(Loss::MSE)
            .build()
            .unwrap();
        nn.compile(Optimizer::Sgd, Loss::MSE, 10.).unwrap();
        let data = Partition::new(arr2(&[[100.], [-50.]]), arr2(&[[1.], [0.]])).unwrap();
        let options = FitOptions {
            epochs: 50,
            batch_size: 1,
            seed: 1,
        };
        let result = nn.fit(&data, &data, &options, &mut []);
        assert!(matches!(result, Err(Error::Diverged { .. })));
    }

    #[test]
    fn gradients_match_finite_differences() {
        fastrand::seed(4);
        let nn = NN::new_input(3)
            .layer(
                dense(4)
                    .activation(Activation::Tanh)
                    .regularization(Regularization::L2(0.01)),
            )
            .layer(batch_norm())
            .layer(dense(2).activation(Activation::Linear))
            .build()
            .unwrap();
        let inputs = arr2(&[
            [0.5, -1.0, 0.25],
            [1.5, 0.3, -0.7],
            [-0.2, 0.8, 1.1],
            [0.9, -0.4, 0.6],
        ]);
        let targets = arr2(&[[1., 0.], [0., 1.], [0., 1.], [1., 0.]]);
        let (_, analytic) = nn.clone().gradients(inputs.clone(), &targets).unwrap();

        let eps = 5e-3;
        let loss_with = |param: usize, idx: (usize, usize), delta: f32| {
            let mut nn = nn.clone();
            if let Some(p) = nn
                .layers
                .iter_mut()
                .flat_map(|layer| layer.params_mut())
                .nth(param)
            {
                p[idx] += delta;
            }
            nn.gradients(inputs.clone(), &targets).unwrap().0
        };

        for (param, grad) in analytic.iter().enumerate() {
            for (idx, &expected) in grad.indexed_iter() {
                let numeric =
                    (loss_with(param, idx, eps) - loss_with(param, idx, -eps)) / (2. * eps);
                assert!(
                    (numeric - expected).abs() < 2e-3 + 0.02 * expected.abs(),
                    "param {param} {idx:?}: numeric {numeric} analytic {expected}"
                );
            }
        }
    }
}
