use ndarray::Array2;

use crate::{error::Result, history::EpochLogs, nn::NN};

/// Returned from [`Callback::on_epoch_end`] to keep training or halt it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// Hooks run by `NN::fit`
pub trait Callback {
    fn on_train_begin(&mut self, _model: &NN) {}

    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &NN) -> Control;

    fn on_train_end(&mut self, _model: &mut NN) -> Result<()> {
        Ok(())
    }
}

/// Quantity watched by [`EarlyStopping`], lower is better
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Monitor {
    #[default]
    ValLoss,
    Loss,
}

impl Monitor {
    fn value(&self, logs: &EpochLogs) -> f32 {
        match self {
            Monitor::ValLoss => logs.val_loss,
            Monitor::Loss => logs.loss,
        }
    }
}

/// Stops training once the monitored loss has not improved by more than
/// `min_delta` for `patience` consecutive epochs.
///
/// With `restore_best_weights` the model gets the state of its best epoch back
/// once it has been stopped. A run that uses up its epochs keeps its last
/// weights.
///
/// ```rust
///   use overfit::callback::{EarlyStopping, Monitor};
///   let stopping = EarlyStopping::new(3, true)
///       .with_min_delta(0.001)
///       .with_monitor(Monitor::ValLoss);
///   assert_eq!(stopping.stopped_epoch(), None);
/// ```
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
    min_delta: f32,
    restore_best_weights: bool,
    wait: usize,
    best: f32,
    best_epoch: Option<usize>,
    best_weights: Option<Vec<Array2<f32>>>,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(patience: usize, restore_best_weights: bool) -> Self {
        Self {
            monitor: Monitor::default(),
            patience,
            min_delta: 0.,
            restore_best_weights,
            wait: 0,
            best: f32::INFINITY,
            best_epoch: None,
            best_weights: None,
            stopped_epoch: None,
        }
    }

    pub fn with_min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta.abs();
        self
    }

    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn restore_best_weights(&self) -> bool {
        self.restore_best_weights
    }

    /// Epoch on which training was halted, `None` if it ran to the end
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

impl Callback for EarlyStopping {
    fn on_train_begin(&mut self, _model: &NN) {
        self.wait = 0;
        self.best = f32::INFINITY;
        self.best_epoch = None;
        self.best_weights = None;
        self.stopped_epoch = None;
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &NN) -> Control {
        let current = self.monitor.value(logs);
        // NaN never counts as an improvement
        if current < self.best - self.min_delta {
            self.best = current;
            self.best_epoch = Some(logs.epoch);
            self.wait = 0;
            if self.restore_best_weights {
                self.best_weights = Some(model.weights());
            }
            return Control::Continue;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch = Some(logs.epoch);
            log::warn!(
                "early stopping at epoch {}, best epoch {:?} with {:?} {}",
                logs.epoch,
                self.best_epoch,
                self.monitor,
                self.best
            );
            return Control::Stop;
        }
        Control::Continue
    }

    fn on_train_end(&mut self, model: &mut NN) -> Result<()> {
        let best_weights = self.best_weights.take();
        if self.stopped_epoch.is_none() {
            return Ok(());
        }
        if let Some(weights) = best_weights {
            log::info!(
                "restoring weights from epoch {}",
                self.best_epoch.unwrap_or_default()
            );
            model.set_weights(weights)?;
        }
        Ok(())
    }
}

/// Logs every epoch's metrics at info level
#[derive(Clone, Debug)]
pub struct ProgressLogger {
    name: String,
    epochs: usize,
}

impl ProgressLogger {
    pub fn new(name: impl Into<String>, epochs: usize) -> Self {
        Self {
            name: name.into(),
            epochs,
        }
    }
}

impl Callback for ProgressLogger {
    fn on_epoch_end(&mut self, logs: &EpochLogs, _model: &NN) -> Control {
        log::info!(
            "{} epoch {}/{} loss:{:.4} acc:{:.4} val_loss:{:.4} val_acc:{:.4}",
            self.name,
            logs.epoch,
            self.epochs,
            logs.loss,
            logs.accuracy,
            logs.val_loss,
            logs.val_accuracy
        );
        Control::Continue
    }
}
