//! Compares regularization techniques on dense MNIST classifiers.
//!
//! A small ndarray network library (layers, losses, optimizers, callbacks)
//! plus a harness that trains one model per [`experiment::Variant`] on the
//! same data splits and folds the runs into a [`report::Report`].

pub mod activation;
mod batch_norm;
pub mod builder;
pub mod callback;
pub mod config;
pub mod dataset;
mod dropout;
pub mod error;
pub mod experiment;
pub mod history;
pub mod initialization;
pub mod layer;
pub mod loss;
pub mod metric;
pub mod mnist;
pub mod nn;
mod noise;
pub mod optimizer;
pub mod regularization;
pub mod report;
pub mod trainer;


pub mod prelude {
    pub use crate::activation::Activation;
    pub use crate::builder::{LayerSpec, ModelBuilder};
    pub use crate::callback::{Callback, Control, EarlyStopping, Monitor, ProgressLogger};
    pub use crate::config::{ExperimentConfig, FailurePolicy};
    pub use crate::dataset::{one_hot, Dataset, Partition};
    pub use crate::error::{Error, Result};
    pub use crate::history::{EpochLogs, History};
    pub use crate::initialization::Initialization;
    pub use crate::layer::{batch_norm, dense, dropout, gaussian_noise, LayerBuilder};
    pub use crate::loss::Loss;
    pub use crate::nn::{Evaluation, FitOptions, NN};
    pub use crate::optimizer::Optimizer;
    pub use crate::regularization::Regularization;
    pub use crate::report::Report;
    pub use crate::trainer::{train_and_evaluate, RunResult};
}
