use ndarray::Array2;

/// Index of the largest value, first one on ties
pub fn max_index<'a>(values: impl IntoIterator<Item = &'a f32>) -> usize {
    values
        .into_iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

/// True when prediction and target peak at the same index
pub fn max_index_equal<'a>(
    prediction: impl IntoIterator<Item = &'a f32>,
    target: impl IntoIterator<Item = &'a f32>,
) -> bool {
    max_index(prediction) == max_index(target)
}

/// Rows whose predicted class matches the one-hot target
pub fn correct_count(outputs: &Array2<f32>, targets: &Array2<f32>) -> usize {
    outputs
        .rows()
        .into_iter()
        .zip(targets.rows())
        .filter(|(o, t)| max_index_equal(o.iter(), t.iter()))
        .count()
}
