use std::time::{Duration, Instant};

use crate::{
    callback::{Callback, EarlyStopping, ProgressLogger},
    config::ExperimentConfig,
    dataset::Dataset,
    error::{Error, Result},
    history::History,
    loss::Loss,
    nn::{Evaluation, FitOptions, NN},
    optimizer::Optimizer,
};

/// Summary of one variant's training run
#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub name: String,
    /// Training accuracy of the last epoch
    pub train_accuracy: f32,
    /// Validation accuracy of the last epoch
    pub val_accuracy: f32,
    /// `train_accuracy - val_accuracy`
    pub overfitting_gap: f32,
    pub test_accuracy: f32,
    pub test_loss: f32,
    /// Wall clock time of `fit` alone
    pub training_time: Duration,
    /// 1-based epoch with the lowest validation loss
    pub best_epoch: usize,
    pub history: History,
}

impl RunResult {
    pub fn new(
        name: impl Into<String>,
        history: History,
        test: Evaluation,
        training_time: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let (Some(train_accuracy), Some(val_accuracy), Some(best_epoch)) = (
            history.final_accuracy(),
            history.final_val_accuracy(),
            history.best_epoch(),
        ) else {
            return Err(Error::Data(format!("{name} recorded no usable epochs")));
        };
        Ok(Self {
            name,
            train_accuracy,
            val_accuracy,
            overfitting_gap: train_accuracy - val_accuracy,
            test_accuracy: test.accuracy,
            test_loss: test.loss,
            training_time,
            best_epoch,
            history,
        })
    }

    pub fn epochs(&self) -> usize {
        self.history.epochs()
    }
}

/// Compiles `model` with Adam and categorical cross-entropy, fits it on the
/// training partition while validating every epoch, then evaluates it once on
/// the test partition.
///
/// With `early_stopping` the run halts once validation loss has not improved
/// for `config.patience` epochs, and rolls back to the best epoch only if
/// `config.restore_best_weights` is set.
pub fn train_and_evaluate(
    mut model: NN,
    name: &str,
    dataset: &Dataset,
    config: &ExperimentConfig,
    early_stopping: bool,
) -> Result<RunResult> {
    model.compile(
        Optimizer::adam(),
        Loss::SoftmaxAndCrossEntropy,
        config.learning_rate,
    )?;
    let options = FitOptions {
        epochs: config.epochs,
        batch_size: config.batch_size,
        seed: config.shuffle_seed,
    };

    let mut progress = ProgressLogger::new(name, config.epochs);
    let mut stopping = EarlyStopping::new(config.patience, config.restore_best_weights)
        .with_min_delta(config.min_delta);
    let mut callbacks: Vec<&mut dyn Callback> = vec![&mut progress];
    if early_stopping {
        callbacks.push(&mut stopping);
    }

    log::info!(
        "training {name}: {} layers, {} parameters",
        model.shape().len(),
        model.parameter_count()
    );
    let start = Instant::now();
    let history = model.fit(
        dataset.train(),
        dataset.validation(),
        &options,
        &mut callbacks,
    )?;
    let training_time = start.elapsed();

    let test = model.evaluate(dataset.test())?;
    let result = RunResult::new(name, history, test, training_time)?;
    log::info!(
        "{name} finished in {:.2}s after {} epochs: test accuracy {:.4}",
        result.training_time.as_secs_f32(),
        result.epochs(),
        result.test_accuracy
    );
    Ok(result)
}
