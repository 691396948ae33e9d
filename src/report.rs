use std::fmt::Display;

use crate::trainer::RunResult;

const HEADERS: [&str; 8] = [
    "Name",
    "Train Acc (%)",
    "Val Acc (%)",
    "Overfitting Gap (%)",
    "Test Acc (%)",
    "Training Time (sec)",
    "Best Epoch",
    "Epochs",
];

/// Results in the order the variants ran, duplicates kept
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Report {
    results: Vec<RunResult>,
}

impl FromIterator<RunResult> for Report {
    fn from_iter<I: IntoIterator<Item = RunResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl Report {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter()
    }

    /// First result with this name
    pub fn get(&self, name: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.name == name)
    }

    fn cells(result: &RunResult) -> [String; 8] {
        [
            result.name.clone(),
            format!("{:.2}", result.train_accuracy * 100.),
            format!("{:.2}", result.val_accuracy * 100.),
            format!("{:.3}", result.overfitting_gap * 100.),
            format!("{:.2}", result.test_accuracy * 100.),
            format!("{:.4}", result.training_time.as_secs_f64()),
            result.best_epoch.to_string(),
            result.epochs().to_string(),
        ]
    }
}

impl<'a> IntoIterator for &'a Report {
    type Item = &'a RunResult;
    type IntoIter = std::slice::Iter<'a, RunResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Plain text table, one row per result
impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rows = self.results.iter().map(Self::cells).collect::<Vec<_>>();
        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.len());
            }
        }

        let line = |f: &mut std::fmt::Formatter<'_>, cells: &[&str]| -> std::fmt::Result {
            for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                // name left, numbers right
                if i == 0 {
                    write!(f, "{cell:<width$}")?;
                } else {
                    write!(f, "{cell:>width$}")?;
                }
            }
            writeln!(f)
        };

        line(f, &HEADERS)?;
        let rule = widths.map(|w| "-".repeat(w));
        line(f, &rule.each_ref().map(String::as_str))?;
        for row in &rows {
            line(f, &row.each_ref().map(String::as_str))?;
        }
        Ok(())
    }
}
