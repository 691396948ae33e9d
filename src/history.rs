/// Metrics reported at the end of one epoch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochLogs {
    /// 1-based
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Per-epoch trajectories recorded by `NN::fit`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    pub loss: Vec<f32>,
    pub accuracy: Vec<f32>,
    pub val_loss: Vec<f32>,
    pub val_accuracy: Vec<f32>,
}

impl History {
    pub(crate) fn push(&mut self, logs: &EpochLogs) {
        self.loss.push(logs.loss);
        self.accuracy.push(logs.accuracy);
        self.val_loss.push(logs.val_loss);
        self.val_accuracy.push(logs.val_accuracy);
    }

    /// Number of epochs actually run
    pub fn epochs(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    pub fn final_accuracy(&self) -> Option<f32> {
        self.accuracy.last().copied()
    }

    pub fn final_val_accuracy(&self) -> Option<f32> {
        self.val_accuracy.last().copied()
    }

    /// 1-based epoch with the lowest validation loss, first one on ties
    pub fn best_epoch(&self) -> Option<usize> {
        self.val_loss
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
                _ if v.is_nan() => best,
                Some((_, b)) if v >= b => best,
                _ => Some((i, v)),
            })
            .map(|(i, _)| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(val_loss: &[f32]) -> History {
        let mut h = History::default();
        for (i, &v) in val_loss.iter().enumerate() {
            h.push(&EpochLogs {
                epoch: i + 1,
                loss: 1.,
                accuracy: 0.5,
                val_loss: v,
                val_accuracy: 0.4,
            });
        }
        h
    }

    #[test]
    fn best_epoch_is_one_based_argmin() {
        assert_eq!(history(&[0.9, 0.5, 0.7, 0.6]).best_epoch(), Some(2));
        assert_eq!(history(&[0.1]).best_epoch(), Some(1));
        assert_eq!(history(&[]).best_epoch(), None);
    }

    #[test]
    fn best_epoch_takes_first_on_ties() {
        assert_eq!(history(&[0.5, 0.3, 0.3, 0.4]).best_epoch(), Some(2));
    }

    #[test]
    fn best_epoch_skips_nan() {
        assert_eq!(history(&[f32::NAN, 0.3, 0.4]).best_epoch(), Some(2));
    }

    #[test]
    fn finals() {
        let h = history(&[0.9, 0.8]);
        assert_eq!(h.epochs(), 2);
        assert_eq!(h.final_accuracy(), Some(0.5));
        assert_eq!(h.final_val_accuracy(), Some(0.4));
        assert!(History::default().final_accuracy().is_none());
    }
}
