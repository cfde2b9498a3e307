//! Binary classification metrics, class 1 being the positive class.

use ndarray::Array1;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Counts indexed `[actual][predicted]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix(pub [[u64; 2]; 2]);

impl ConfusionMatrix {
    pub fn from_labels(actual: &Array1<usize>, predicted: &Array1<usize>) -> Self {
        let mut counts = [[0u64; 2]; 2];
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            if a < 2 && p < 2 {
                counts[a][p] += 1;
            }
        }
        Self(counts)
    }

    pub fn true_negatives(&self) -> u64 {
        self.0[0][0]
    }

    pub fn false_positives(&self) -> u64 {
        self.0[0][1]
    }

    pub fn false_negatives(&self) -> u64 {
        self.0[1][0]
    }

    pub fn true_positives(&self) -> u64 {
        self.0[1][1]
    }

    pub fn total(&self) -> u64 {
        self.0.iter().flatten().sum()
    }

    pub fn max_count(&self) -> u64 {
        self.0.iter().flatten().copied().max().unwrap_or(0)
    }

    /// Precision, recall, F1 and support of one class.
    pub fn class_scores(&self, class: usize) -> ClassScores {
        let tp = self.0[class][class];
        let predicted: u64 = (0..2).map(|actual| self.0[actual][class]).sum();
        let support: u64 = self.0[class].iter().sum();
        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassScores {
            precision,
            recall,
            f1,
            support,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1: f64,
    pub support: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
}

impl ClassificationMetrics {
    pub fn compute(actual: &Array1<usize>, predicted: &Array1<usize>) -> Self {
        let confusion = ConfusionMatrix::from_labels(actual, predicted);
        let positive = confusion.class_scores(1);
        Self {
            accuracy: ratio(
                confusion.true_positives() + confusion.true_negatives(),
                confusion.total(),
            ),
            precision: positive.precision,
            recall: positive.recall,
            f1: positive.f1,
            confusion,
        }
    }
}

/// Fraction of matching labels.
pub fn accuracy(actual: &Array1<usize>, predicted: &Array1<usize>) -> f64 {
    let hits = actual
        .iter()
        .zip(predicted.iter())
        .filter(|(a, p)| a == p)
        .count();
    ratio(hits as u64, actual.len() as u64)
}

/// Per-class scores plus accuracy, macro and support-weighted averages,
/// keyed the way common ML tooling reports them.
pub fn classification_report(confusion: &ConfusionMatrix) -> Value {
    let scores = [confusion.class_scores(0), confusion.class_scores(1)];
    let total = confusion.total();
    let mut report = Map::new();
    for (class, s) in scores.iter().enumerate() {
        report.insert(class.to_string(), json!(s));
    }

    let mean = |f: fn(&ClassScores) -> f64| scores.iter().map(f).sum::<f64>() / 2.0;
    let weighted = |f: fn(&ClassScores) -> f64| {
        if total == 0 {
            return 0.0;
        }
        scores.iter().map(|s| f(s) * s.support as f64).sum::<f64>() / total as f64
    };
    report.insert(
        "accuracy".into(),
        json!(ratio(
            confusion.true_positives() + confusion.true_negatives(),
            total
        )),
    );
    report.insert(
        "macro avg".into(),
        json!({
            "precision": mean(|s| s.precision),
            "recall": mean(|s| s.recall),
            "f1-score": mean(|s| s.f1),
            "support": total,
        }),
    );
    report.insert(
        "weighted avg".into(),
        json!({
            "precision": weighted(|s| s.precision),
            "recall": weighted(|s| s.recall),
            "f1-score": weighted(|s| s.f1),
            "support": total,
        }),
    );
    Value::Object(report)
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn metrics_from_known_counts() {
        // tn=3 fp=1 fn=2 tp=4
        let actual = array![0, 0, 0, 0, 1, 1, 1, 1, 1, 1];
        let predicted = array![0, 0, 0, 1, 0, 0, 1, 1, 1, 1];
        let m = ClassificationMetrics::compute(&actual, &predicted);

        assert_eq!(m.confusion, ConfusionMatrix([[3, 1], [2, 4]]));
        assert_eq!(m.accuracy, 0.7);
        assert_eq!(m.precision, 0.8);
        assert!((m.recall - 4.0 / 6.0).abs() < 1e-12);
        let expected_f1 = 2.0 * 0.8 * (4.0 / 6.0) / (0.8 + 4.0 / 6.0);
        assert!((m.f1 - expected_f1).abs() < 1e-12);
        assert_eq!(accuracy(&actual, &predicted), 0.7);
    }

    #[test]
    fn no_positive_predictions_score_zero() {
        let actual = array![1, 1, 0];
        let predicted = array![0, 0, 0];
        let m = ClassificationMetrics::compute(&actual, &predicted);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
    }

    #[test]
    fn report_has_per_class_and_average_entries() {
        let report = classification_report(&ConfusionMatrix([[3, 1], [2, 4]]));
        assert_eq!(report["0"]["support"], 4);
        assert_eq!(report["1"]["precision"], 0.8);
        assert_eq!(report["accuracy"], 0.7);
        assert_eq!(report["macro avg"]["support"], 10);
        let weighted_recall = report["weighted avg"]["recall"].as_f64().unwrap();
        assert!((weighted_recall - 0.7).abs() < 1e-12);
    }
}
