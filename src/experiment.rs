use crate::{
    activation::Activation,
    builder::ModelBuilder,
    config::{ExperimentConfig, FailurePolicy},
    dataset::Dataset,
    error::{Error, Result},
    layer::{batch_norm, dense, dropout, gaussian_noise, LayerBuilder},
    mnist::Mnist,
    regularization::Regularization,
    report::Report,
    trainer::{train_and_evaluate, RunResult},
};

/// One model configuration in the comparison
#[derive(Clone, Debug, PartialEq)]
pub struct Variant {
    pub name: String,
    pub model: ModelBuilder,
    pub early_stopping: bool,
}

impl Variant {
    pub fn new(name: impl Into<String>, model: ModelBuilder) -> Self {
        Self {
            name: name.into(),
            model,
            early_stopping: false,
        }
    }

    pub fn with_early_stopping(mut self) -> Self {
        self.early_stopping = true;
        self
    }
}

fn relu(units: usize) -> LayerBuilder {
    dense(units).activation(Activation::Relu).into()
}

/// The baseline followed by one variant per regularization technique
pub fn standard_variants() -> Vec<Variant> {
    let l2 = |units: usize| -> LayerBuilder {
        dense(units)
            .activation(Activation::Relu)
            .regularization(Regularization::l2())
            .into()
    };
    vec![
        Variant::new("Base Line", ModelBuilder::default()),
        Variant::new("L2", ModelBuilder::explicit([l2(512), l2(256), l2(128)])),
        Variant::new(
            "Dropout",
            ModelBuilder::explicit([
                relu(512),
                dropout(0.5),
                relu(256),
                dropout(0.5),
                relu(128),
            ]),
        ),
        Variant::new(
            "Batch Norm",
            ModelBuilder::explicit([
                relu(512),
                batch_norm(),
                relu(256),
                batch_norm(),
                relu(128),
            ]),
        ),
        Variant::new(
            "Early Stopping",
            ModelBuilder::explicit([relu(512), relu(256), relu(128)]),
        )
        .with_early_stopping(),
        Variant::new(
            "Noise - Input Layer",
            ModelBuilder::explicit([gaussian_noise(0.1), relu(512), relu(256), relu(128)]),
        ),
        Variant::new(
            "Noise - Hidden Layer",
            ModelBuilder::explicit([
                gaussian_noise(0.1),
                relu(512),
                gaussian_noise(0.1),
                relu(256),
                gaussian_noise(0.1),
                relu(128),
            ]),
        ),
        Variant::new(
            "Noise - Output Layer",
            ModelBuilder::explicit([relu(512), relu(256), relu(128)]).with_output_noise(0.1),
        ),
    ]
}

/// Keeps the variants named in `names` (case-insensitive), in their original
/// order. An empty list keeps everything.
pub fn select_variants(variants: Vec<Variant>, names: &[String]) -> Result<Vec<Variant>> {
    if names.is_empty() {
        return Ok(variants);
    }
    if let Some(unknown) = names
        .iter()
        .find(|n| !variants.iter().any(|v| v.name.eq_ignore_ascii_case(n)))
    {
        let known = variants
            .iter()
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(Error::Config(format!(
            "unknown variant '{unknown}', expected one of: {known}"
        )));
    }
    Ok(variants
        .into_iter()
        .filter(|v| names.iter().any(|n| v.name.eq_ignore_ascii_case(n)))
        .collect())
}

/// Splits the standard training set into train and validation per `config`
pub fn prepare(mnist: Mnist, config: &ExperimentConfig) -> Result<Dataset> {
    let (inputs, targets) = mnist.train.into_parts();
    let (test_inputs, test_targets) = mnist.test.into_parts();
    let mut builder = Dataset::builder()
        .add_data(inputs, targets)
        .add_test_data(test_inputs, test_targets)
        .allocate_to_validation(config.validation_split)
        .seed(config.split_seed);
    if let Some(limit) = config.train_limit {
        builder = builder.limit(limit);
    }
    builder.build()
}

/// Builds and trains one variant from a fixed seed, so results do not depend
/// on which variants ran before it
pub fn run_variant(
    dataset: &Dataset,
    config: &ExperimentConfig,
    variant: &Variant,
) -> Result<RunResult> {
    fastrand::seed(config.shuffle_seed);
    let model = variant.model.build()?;
    train_and_evaluate(
        model,
        &variant.name,
        dataset,
        config,
        variant.early_stopping,
    )
}

/// Runs every variant in order and folds the results into a report.
///
/// With [`FailurePolicy::Abort`] the first failure is returned and no later
/// variant runs; with [`FailurePolicy::Skip`] a failed variant is logged and
/// left out of the report.
pub fn run(dataset: &Dataset, config: &ExperimentConfig, variants: &[Variant]) -> Result<Report> {
    variants
        .iter()
        .filter_map(|variant| match run_variant(dataset, config, variant) {
            Ok(result) => Some(Ok(result)),
            Err(e) => match config.on_failure {
                FailurePolicy::Abort => Some(Err(e)),
                FailurePolicy::Skip => {
                    log::warn!("skipping {}: {e}", variant.name);
                    None
                }
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_variant_names_in_order() {
        let names = standard_variants()
            .into_iter()
            .map(|v| v.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "Base Line",
                "L2",
                "Dropout",
                "Batch Norm",
                "Early Stopping",
                "Noise - Input Layer",
                "Noise - Hidden Layer",
                "Noise - Output Layer"
            ]
        );
    }

    #[test]
    fn only_early_stopping_variant_stops_early() {
        let flagged = standard_variants()
            .into_iter()
            .filter(|v| v.early_stopping)
            .map(|v| v.name)
            .collect::<Vec<_>>();
        assert_eq!(flagged, ["Early Stopping"]);
    }

    #[test]
    fn variant_architectures() {
        let kinds = |name: &str| {
            let variant = standard_variants()
                .into_iter()
                .find(|v| v.name == name)
                .unwrap();
            variant
                .model
                .build()
                .unwrap()
                .shape()
                .iter()
                .map(|s| s.kind)
                .collect::<Vec<_>>()
        };
        assert_eq!(kinds("L2"), ["Dense", "Dense", "Dense", "Dense"]);
        assert_eq!(
            kinds("Dropout"),
            ["Dense", "Dropout", "Dense", "Dropout", "Dense", "Dense"]
        );
        assert_eq!(
            kinds("Noise - Hidden Layer"),
            [
                "GaussianNoise",
                "Dense",
                "GaussianNoise",
                "Dense",
                "GaussianNoise",
                "Dense",
                "Dense"
            ]
        );
        assert_eq!(kinds("Noise - Output Layer").last(), Some(&"GaussianNoise"));
        assert_eq!(kinds("Base Line").len(), 12);
    }

    #[test]
    fn select_by_name() {
        let selected =
            select_variants(standard_variants(), &["dropout".into(), "Base Line".into()]).unwrap();
        let names = selected.iter().map(|v| v.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["Base Line", "Dropout"]);

        assert_eq!(select_variants(standard_variants(), &[]).unwrap().len(), 8);
        let result = select_variants(standard_variants(), &["Weight Decay".into()]);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
