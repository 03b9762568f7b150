//! Confusion matrix and per-class sensitivity / positive predictive value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::labels::{ClassLabel, NUM_CLASSES};

/// Counts indexed `[true class][predicted class]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: [[u64; NUM_CLASSES]; NUM_CLASSES],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts(counts: [[u64; NUM_CLASSES]; NUM_CLASSES]) -> Self {
        Self { counts }
    }

    pub fn record(&mut self, truth: ClassLabel, predicted: ClassLabel) {
        self.counts[truth.index()][predicted.index()] += 1;
    }

    pub fn counts(&self) -> &[[u64; NUM_CLASSES]; NUM_CLASSES] {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }

    pub fn row_sum(&self, class: usize) -> u64 {
        self.counts[class].iter().sum()
    }

    pub fn column_sum(&self, class: usize) -> u64 {
        self.counts.iter().map(|row| row[class]).sum()
    }

    /// Recall per class: diagonal over row sum, 0 for an empty row.
    pub fn sensitivity(&self) -> [f64; NUM_CLASSES] {
        std::array::from_fn(|i| ratio(self.counts[i][i], self.row_sum(i)))
    }

    /// Precision per class: diagonal over column sum, 0 for an empty column.
    pub fn ppv(&self) -> [f64; NUM_CLASSES] {
        std::array::from_fn(|i| ratio(self.counts[i][i], self.column_sum(i)))
    }

    pub fn accuracy(&self) -> f64 {
        let correct = (0..NUM_CLASSES).map(|i| self.counts[i][i]).sum();
        ratio(correct, self.total())
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .max()
            .unwrap_or(1);

        for (i, row) in self.counts.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>width$}")).collect();
            let open = if i == 0 { "[[" } else { " [" };
            let close = if i + 1 == NUM_CLASSES { "]]" } else { "]\n" };
            write!(f, "{open}{}{close}", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Result of one evaluation pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub matrix: ConfusionMatrix,
    pub sensitivity: [f64; NUM_CLASSES],
    pub ppv: [f64; NUM_CLASSES],
}

impl From<ConfusionMatrix> for EvalReport {
    fn from(matrix: ConfusionMatrix) -> Self {
        Self {
            sensitivity: matrix.sensitivity(),
            ppv: matrix.ppv(),
            matrix,
        }
    }
}

fn metric_line(f: &mut fmt::Formatter<'_>, title: &str, values: &[f64; NUM_CLASSES]) -> fmt::Result {
    let parts: Vec<String> = ClassLabel::ALL
        .iter()
        .zip(values)
        .map(|(class, value)| format!("{}: {:.3}", class.display_name(), value))
        .collect();
    write!(f, "{} {}", title, parts.join(", "))
}

impl fmt::Display for EvalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.matrix)?;
        metric_line(f, "Sens", &self.sensitivity)?;
        writeln!(f)?;
        metric_line(f, "PPV", &self.ppv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClassLabel::*;

    #[test]
    fn test_one_pneumonia_missed() {
        let mut matrix = ConfusionMatrix::new();
        for _ in 0..3 {
            matrix.record(Normal, Normal);
        }
        matrix.record(Pneumonia, Normal);

        assert_eq!(matrix.counts(), &[[3, 0, 0], [1, 0, 0], [0, 0, 0]]);
        assert_eq!(matrix.sensitivity(), [1.0, 0.0, 0.0]);
        assert_eq!(matrix.ppv(), [0.75, 0.0, 0.0]);
        assert_eq!(matrix.total(), 4);
    }

    #[test]
    fn test_empty_matrix_is_all_zero() {
        let report = EvalReport::from(ConfusionMatrix::new());
        assert_eq!(report.sensitivity, [0.0; 3]);
        assert_eq!(report.ppv, [0.0; 3]);
        assert_eq!(report.matrix.accuracy(), 0.0);
    }

    #[test]
    fn test_metrics_bounded() {
        let matrix = ConfusionMatrix::from_counts([[5, 2, 0], [1, 7, 3], [0, 4, 9]]);
        for v in matrix.sensitivity().into_iter().chain(matrix.ppv()) {
            assert!((0.0..=1.0).contains(&v));
        }
        assert_eq!(matrix.row_sum(1), 11);
        assert_eq!(matrix.column_sum(1), 13);
    }

    #[test]
    fn test_report_format() {
        let matrix = ConfusionMatrix::from_counts([[3, 0, 0], [1, 0, 0], [0, 0, 12]]);
        let text = EvalReport::from(matrix).to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "[[ 3  0  0]");
        assert_eq!(lines[1], " [ 1  0  0]");
        assert_eq!(lines[2], " [ 0  0 12]]");
        assert_eq!(lines[3], "Sens Normal: 1.000, Pneumonia: 0.000, COVID-19: 1.000");
        assert_eq!(lines[4], "PPV Normal: 0.750, Pneumonia: 0.000, COVID-19: 1.000");
    }
}
