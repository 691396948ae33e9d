use ndarray::{concatenate, Array2, Axis};

use crate::error::{Error, Result};

/// Default seed for the train/validation split
pub const SPLIT_SEED: u64 = 42;

/// Inputs and one-hot targets, one row per sample
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    inputs: Array2<f32>,
    targets: Array2<f32>,
}

impl Partition {
    pub fn new(inputs: Array2<f32>, targets: Array2<f32>) -> Result<Self> {
        if inputs.nrows() != targets.nrows() {
            return Err(Error::Shape(format!(
                "{} input rows but {} target rows",
                inputs.nrows(),
                targets.nrows()
            )));
        }
        Ok(Self { inputs, targets })
    }

    pub fn inputs(&self) -> &Array2<f32> {
        &self.inputs
    }

    pub fn targets(&self) -> &Array2<f32> {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.inputs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn input_size(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn target_size(&self) -> usize {
        self.targets.ncols()
    }

    pub fn into_parts(self) -> (Array2<f32>, Array2<f32>) {
        (self.inputs, self.targets)
    }

    /// Rows at `indices`, in that order
    pub(crate) fn select(&self, indices: &[usize]) -> Partition {
        Partition {
            inputs: self.inputs.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
        }
    }
}

/// Train, validation and test partitions.
/// Built once, then only handed out by reference so no run can alter
/// what another run sees.
///
/// ```rust
///   use overfit::dataset::{one_hot, Dataset};
///   use ndarray::Array2;
///   let inputs = Array2::from_shape_fn((20, 3), |(r, c)| (r + c) as f32);
///   let labels = (0..20).map(|i| i % 2).collect::<Vec<usize>>();
///   let set = Dataset::builder()
///       .add_data(inputs.clone(), one_hot(&labels, 2).unwrap())
///       .add_test_data(inputs, one_hot(&labels, 2).unwrap())
///       .allocate_to_validation(0.1)
///       .seed(42)
///       .build()
///       .unwrap();
///   assert_eq!(set.validation().len(), 2);
///   assert_eq!(set.train().len(), 18);
/// ```
#[derive(Clone, Debug)]
pub struct Dataset {
    train: Partition,
    validation: Partition,
    test: Partition,
}

impl Dataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::new()
    }

    /// Uses already split partitions as they are, their widths must agree
    pub fn from_partitions(
        train: Partition,
        validation: Partition,
        test: Partition,
    ) -> Result<Self> {
        let partitions = [("train", &train), ("validation", &validation), ("test", &test)];
        for (name, partition) in partitions {
            if partition.is_empty() {
                return Err(Error::Data(format!("{name} partition is empty")));
            }
            if partition.input_size() != train.input_size()
                || partition.target_size() != train.target_size()
            {
                return Err(Error::Shape(format!(
                    "{name} rows are {}->{} but train rows are {}->{}",
                    partition.input_size(),
                    partition.target_size(),
                    train.input_size(),
                    train.target_size()
                )));
            }
        }
        Ok(Self {
            train,
            validation,
            test,
        })
    }

    pub fn train(&self) -> &Partition {
        &self.train
    }

    pub fn validation(&self) -> &Partition {
        &self.validation
    }

    pub fn test(&self) -> &Partition {
        &self.test
    }

    pub fn input_size(&self) -> usize {
        self.train.input_size()
    }

    pub fn target_size(&self) -> usize {
        self.train.target_size()
    }
}

/// One-hot encodes class indices, every label must be below `classes`
pub fn one_hot<T: Copy + Into<usize>>(labels: &[T], classes: usize) -> Result<Array2<f32>> {
    let mut targets = Array2::zeros((labels.len(), classes));
    for (row, &label) in labels.iter().enumerate() {
        let label: usize = label.into();
        if label >= classes {
            return Err(Error::Data(format!(
                "label {label} at row {row} is outside {classes} classes"
            )));
        }
        targets[[row, label]] = 1.;
    }
    Ok(targets)
}

pub struct DatasetBuilder {
    data: Vec<(Array2<f32>, Array2<f32>)>,
    test_data: Vec<(Array2<f32>, Array2<f32>)>,
    validation_ratio: f64,
    seed: u64,
    limit: Option<usize>,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self {
            data: vec![],
            test_data: vec![],
            validation_ratio: 0.1,
            seed: SPLIT_SEED,
            limit: None,
        }
    }
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows to split into training and validation, may be called repeatedly
    pub fn add_data(mut self, inputs: Array2<f32>, targets: Array2<f32>) -> Self {
        self.data.push((inputs, targets));
        self
    }

    /// Held-out rows, never trained or validated on
    pub fn add_test_data(mut self, inputs: Array2<f32>, targets: Array2<f32>) -> Self {
        self.test_data.push((inputs, targets));
        self
    }

    /// Allocates a ratio of the data to validation, rounding up
    /// <br>e.g. `allocate_to_validation(0.1)` of 60000 rows is 6000 rows
    pub fn allocate_to_validation(mut self, ratio: f64) -> Self {
        self.validation_ratio = ratio;
        self
    }

    /// Which rows land in validation depends only on this seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Keeps only the first `rows` of the data before splitting
    pub fn limit(mut self, rows: usize) -> Self {
        self.limit = Some(rows);
        self
    }

    pub fn build(self) -> Result<Dataset> {
        if !(self.validation_ratio > 0. && self.validation_ratio < 1.) {
            return Err(Error::Config(format!(
                "validation ratio must be in (0,1), got {}",
                self.validation_ratio
            )));
        }

        let mut data = stack("training", self.data)?;
        let test = stack("test", self.test_data)?;
        if let Some(limit) = self.limit {
            let rows = (0..limit.min(data.len())).collect::<Vec<_>>();
            data = data.select(&rows);
        }
        if data.input_size() != test.input_size() || data.target_size() != test.target_size() {
            return Err(Error::Shape(format!(
                "training rows are {}->{} but test rows are {}->{}",
                data.input_size(),
                data.target_size(),
                test.input_size(),
                test.target_size()
            )));
        }

        let rows = data.len();
        let validation_rows = (rows as f64 * self.validation_ratio).ceil() as usize;
        if validation_rows >= rows {
            return Err(Error::Data(format!(
                "{rows} rows are too few to hold out {validation_rows} for validation"
            )));
        }

        let mut indices = (0..rows).collect::<Vec<_>>();
        fastrand::Rng::with_seed(self.seed).shuffle(&mut indices);
        let (validation_indices, train_indices) = indices.split_at(validation_rows);

        let dataset = Dataset {
            train: data.select(train_indices),
            validation: data.select(validation_indices),
            test,
        };
        log::info!(
            "dataset: train {} validation {} test {} rows, {} inputs, {} classes",
            dataset.train.len(),
            dataset.validation.len(),
            dataset.test.len(),
            dataset.input_size(),
            dataset.target_size()
        );
        Ok(dataset)
    }
}

/// Joins every added block into one partition
fn stack(name: &str, blocks: Vec<(Array2<f32>, Array2<f32>)>) -> Result<Partition> {
    if blocks.is_empty() {
        return Err(Error::Data(format!("no {name} data added")));
    }
    let inputs = blocks.iter().map(|(i, _)| i.view()).collect::<Vec<_>>();
    let targets = blocks.iter().map(|(_, t)| t.view()).collect::<Vec<_>>();
    let inputs = concatenate(Axis(0), &inputs)
        .map_err(|e| Error::Shape(format!("{name} inputs: {e}")))?;
    let targets = concatenate(Axis(0), &targets)
        .map_err(|e| Error::Shape(format!("{name} targets: {e}")))?;
    let partition = Partition::new(inputs, targets)?;
    if partition.is_empty() {
        return Err(Error::Data(format!("{name} data has no rows")));
    }
    Ok(partition)
}
