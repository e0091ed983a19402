//! 混同行列とクラスごとの適合率・再現率・F1

use std::fmt;

use super::ForestError;

/// `matrix[true_class][predicted_class]` の件数を持つ混同行列
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
}

/// クラスごとの指標
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(
        true_labels: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, ForestError> {
        if true_labels.is_empty() {
            return Err(ForestError::EmptyDataset);
        }
        if true_labels.len() != predicted.len() {
            return Err(ForestError::LengthMismatch {
                features: predicted.len(),
                labels: true_labels.len(),
            });
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (&t, &p) in true_labels.iter().zip(predicted) {
            for id in [t, p] {
                if id >= n_classes {
                    return Err(ForestError::UnknownClassId { id, n_classes });
                }
            }
            matrix[t][p] += 1;
        }
        Ok(Self { matrix })
    }

    pub fn n_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes()).map(|i| self.matrix[i][i]).sum();
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// クラスごとの指標。分母が0のものは0.0とする。
    pub fn class_metrics(&self, class_names: &[String]) -> Vec<ClassMetrics> {
        let n = self.n_classes();
        (0..n)
            .map(|c| {
                let tp = self.matrix[c][c];
                let predicted: usize = (0..n).map(|i| self.matrix[i][c]).sum();
                let support: usize = self.matrix[c].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    name: class_names.get(c).cloned().unwrap_or_else(|| c.to_string()),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// 正解率
pub fn accuracy_score(true_labels: &[usize], predicted: &[usize]) -> f64 {
    let correct = true_labels
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t == p)
        .count();
    ratio(correct, true_labels.len())
}

/// 分類レポート（クラス別・マクロ平均・重み付き平均）
#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn new(matrix: &ConfusionMatrix, class_names: &[String]) -> Self {
        let classes = matrix.class_metrics(class_names);
        let ones = vec![1.0; classes.len()];
        let supports: Vec<f64> = classes.iter().map(|m| m.support as f64).collect();
        let macro_avg = average("macro avg", &classes, &ones);
        let weighted_avg = average("weighted avg", &classes, &supports);

        Self {
            accuracy: matrix.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
        }
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|m| m.name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for m in &self.classes {
            write_row(f, m, width)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, &self.macro_avg, width)?;
        write_row(f, &self.weighted_avg, width)
    }
}

/// 重み付き平均（重みの合計が0なら0.0）
fn average(name: &str, classes: &[ClassMetrics], weights: &[f64]) -> ClassMetrics {
    let den: f64 = weights.iter().sum();
    let mean = |value: fn(&ClassMetrics) -> f64| {
        if den == 0.0 {
            0.0
        } else {
            classes.iter().zip(weights).map(|(m, w)| value(m) * w).sum::<f64>() / den
        }
    };
    ClassMetrics {
        name: name.to_string(),
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1: mean(|m| m.f1),
        support: classes.iter().map(|m| m.support).sum(),
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, m: &ClassMetrics, width: usize) -> fmt::Result {
    writeln!(
        f,
        "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        m.name, m.precision, m.recall, m.f1, m.support
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    #[test]
    fn binary_metrics_match_hand_computation() {
        // true:  a a a b b
        // pred:  a a b b a
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0, 1, 1], &[0, 0, 1, 1, 0], 2).unwrap();
        assert_eq!(cm.as_rows(), &[vec![2, 1], vec![1, 1]]);
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);

        let metrics = cm.class_metrics(&names());
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics[1].precision - 0.5).abs() < 1e-12);
        assert!((metrics[1].recall - 0.5).abs() < 1e-12);
        assert_eq!(metrics[0].support, 3);
        assert_eq!(metrics[1].name, "b");
    }

    #[test]
    fn report_averages() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 0, 1, 1], &[0, 0, 1, 1, 0], 2).unwrap();
        let report = ClassificationReport::new(&cm, &names());
        let expected_macro = (2.0 / 3.0 + 0.5) / 2.0;
        let expected_weighted = (2.0 / 3.0 * 3.0 + 0.5 * 2.0) / 5.0;
        assert!((report.macro_avg.f1 - expected_macro).abs() < 1e-12);
        assert!((report.weighted_avg.f1 - expected_weighted).abs() < 1e-12);
        assert_eq!(report.weighted_avg.support, 5);

        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("0.60"));
    }

    #[test]
    fn class_never_predicted_has_zero_precision() {
        let cm = ConfusionMatrix::from_labels(&[0, 1], &[0, 0], 2).unwrap();
        let metrics = cm.class_metrics(&names());
        assert_eq!(metrics[1].precision, 0.0);
        assert_eq!(metrics[1].f1, 0.0);
    }

    #[test]
    fn accuracy_score_counts_matches() {
        assert!((accuracy_score(&[0, 1, 2, 2], &[0, 1, 1, 2]) - 0.75).abs() < 1e-12);
        assert_eq!(accuracy_score(&[], &[]), 0.0);
    }

    #[test]
    fn out_of_range_class_is_rejected() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 3], &[0, 0], 2),
            Err(ForestError::UnknownClassId { id: 3, .. })
        ));
    }
}
