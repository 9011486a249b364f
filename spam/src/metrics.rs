// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for the spam classifier
//!
//! Implements:
//! - Per-class precision, recall, F1 and support
//! - Accuracy with macro and support-weighted averages
//! - Confusion matrix over arbitrary labels
//! - ROC and precision-recall curves for the positive class
//! - AUC-ROC by the trapezoidal rule
//!
//! Target names are sorted lexicographically and the second one is the
//! positive class, so with `ham`/`spam` the curves describe `spam`.

use crate::pipeline::ProbabilityMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Counts indexed by `[true][predicted]` in label order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Pairs whose true or predicted label is outside `labels` are ignored.
    pub fn from_predictions(y_true: &[String], y_pred: &[String], labels: &[String]) -> Self {
        let index = |l: &String| labels.iter().position(|x| x == l);
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        for (t, p) in y_true.iter().zip(y_pred) {
            if let (Some(i), Some(j)) = (index(t), index(p)) {
                counts[i][j] += 1;
            }
        }
        Self {
            labels: labels.to_vec(),
            counts,
        }
    }

    pub fn get(&self, actual: &str, predicted: &str) -> Option<usize> {
        let i = self.labels.iter().position(|l| l == actual)?;
        let j = self.labels.iter().position(|l| l == predicted)?;
        Some(self.counts[i][j])
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Decreasing; the first entry exceeds every score
    pub thresholds: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecisionRecallCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    /// Increasing; one shorter than `precision` and `recall`
    pub thresholds: Vec<f64>,
}

/// Complete evaluation of one set of predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub labels: Vec<String>,
    pub positive_label: String,
    pub per_class: BTreeMap<String, ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion_matrix: ConfusionMatrix,
    pub roc_curve: RocCurve,
    pub pr_curve: PrecisionRecallCurve,
    pub roc_auc: f64,
}

impl MetricsReport {
    /// Build a report from true labels, predicted labels and class probabilities.
    ///
    /// Target names may come in any order; they are sorted and the matrix
    /// columns are matched to them by class name, so the positive class is
    /// always the second sorted label.
    ///
    /// Panics if the inputs disagree in length, fewer than two target names are
    /// given, or the probability matrix classes differ from the target names.
    pub fn from_predictions(
        y_true: &[String],
        y_pred: &[String],
        probabilities: &ProbabilityMatrix,
        target_names: &[String],
    ) -> Self {
        assert_eq!(y_true.len(), y_pred.len(), "Prediction and ground truth lengths must match");
        assert_eq!(
            y_true.len(),
            probabilities.n_rows(),
            "Probability rows and ground truth lengths must match"
        );
        assert!(target_names.len() >= 2, "At least two target names are required");
        assert_eq!(
            probabilities.n_columns(),
            target_names.len(),
            "Probability columns must match target names"
        );

        let mut labels = target_names.to_vec();
        labels.sort();
        let mut columns = probabilities.classes().to_vec();
        columns.sort();
        assert_eq!(columns, labels, "Probability classes must match target names");
        // Column order follows the sorted labels from here on
        let probabilities = probabilities.aligned_to(&labels);

        let confusion_matrix = ConfusionMatrix::from_predictions(y_true, y_pred, &labels);
        let per_class: BTreeMap<String, ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), class_metrics(&confusion_matrix, i, y_true, label)))
            .collect();

        let total_support: usize = per_class.values().map(|m| m.support).sum();
        let macro_avg = average(per_class.values(), |_| 1.0, total_support);
        let weighted_avg = average(per_class.values(), |m| m.support as f64, total_support);
        let accuracy = ratio(confusion_matrix.correct(), y_true.len());

        let positive_label = labels[1].clone();
        let truth: Vec<bool> = y_true.iter().map(|t| *t == positive_label).collect();
        let scores = probabilities.column(1);
        let curve = binary_clf_curve(&truth, &scores);
        let roc_curve = roc_curve(&curve);
        let pr_curve = precision_recall_curve(&curve);
        let roc_auc = roc_auc(&roc_curve, &truth);

        Self {
            labels,
            positive_label,
            per_class,
            accuracy,
            macro_avg,
            weighted_avg,
            confusion_matrix,
            roc_curve,
            pr_curve,
            roc_auc,
        }
    }

    pub fn class(&self, label: &str) -> Option<&ClassMetrics> {
        self.per_class.get(label)
    }

    pub fn total_support(&self) -> usize {
        self.per_class.values().map(|m| m.support).sum()
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str("Classification Report\n");
        output.push_str("=====================\n");
        output.push_str(&format!(
            "{:<14} {:>10} {:>10} {:>10} {:>10}\n",
            "", "precision", "recall", "f1-score", "support"
        ));
        for (label, m) in &self.per_class {
            output.push_str(&format_row(label, m));
        }
        output.push('\n');
        output.push_str(&format!(
            "{:<14} {:>10} {:>10} {:>10.4} {:>10}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_support()
        ));
        output.push_str(&format_row("macro avg", &self.macro_avg));
        output.push_str(&format_row("weighted avg", &self.weighted_avg));

        output.push_str(&format!(
            "\nAUC-ROC ({}):    {:.4}\n",
            self.positive_label, self.roc_auc
        ));

        output.push_str("\nConfusion Matrix (rows = actual, columns = predicted):\n");
        output.push_str(&format!("{:<14}", ""));
        for label in &self.confusion_matrix.labels {
            output.push_str(&format!(" {:>10}", label));
        }
        output.push('\n');
        for (label, row) in self.confusion_matrix.labels.iter().zip(&self.confusion_matrix.counts) {
            output.push_str(&format!("{:<14}", label));
            for count in row {
                output.push_str(&format!(" {:>10}", count));
            }
            output.push('\n');
        }

        output
    }
}

fn format_row(label: &str, m: &ClassMetrics) -> String {
    format!(
        "{:<14} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
        label, m.precision, m.recall, m.f1_score, m.support
    )
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

fn f1(precision: f64, recall: f64) -> f64 {
    let denom = precision + recall;
    if denom == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / denom
}

fn class_metrics(cm: &ConfusionMatrix, i: usize, y_true: &[String], label: &str) -> ClassMetrics {
    let tp = cm.counts[i][i];
    let predicted: usize = cm.counts.iter().map(|row| row[i]).sum();
    // Support counts every true occurrence, even if the prediction fell outside the labels
    let support = y_true.iter().filter(|t| *t == label).count();

    let precision = ratio(tp, predicted);
    let recall = ratio(tp, support);
    ClassMetrics {
        precision,
        recall,
        f1_score: f1(precision, recall),
        support,
    }
}

fn average<'a>(
    metrics: impl Iterator<Item = &'a ClassMetrics> + Clone,
    weight: impl Fn(&ClassMetrics) -> f64,
    total_support: usize,
) -> ClassMetrics {
    let total_weight: f64 = metrics.clone().map(&weight).sum();
    if total_weight == 0.0 {
        return ClassMetrics {
            support: total_support,
            ..ClassMetrics::default()
        };
    }
    let mean = |f: fn(&ClassMetrics) -> f64| {
        metrics.clone().map(|m| weight(m) * f(m)).sum::<f64>() / total_weight
    };
    ClassMetrics {
        precision: mean(|m| m.precision),
        recall: mean(|m| m.recall),
        f1_score: mean(|m| m.f1_score),
        support: total_support,
    }
}

/// Cumulative true and false positives at each distinct score, highest first
struct ClfCurve {
    tps: Vec<f64>,
    fps: Vec<f64>,
    thresholds: Vec<f64>,
}

fn binary_clf_curve(truth: &[bool], scores: &[f64]) -> ClfCurve {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut curve = ClfCurve {
        tps: Vec::new(),
        fps: Vec::new(),
        thresholds: Vec::new(),
    };
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &i) in order.iter().enumerate() {
        if truth[i] {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        // Emit at the last index of each run of equal scores
        let run_ends = order.get(pos + 1).map_or(true, |&next| scores[next] != scores[i]);
        if run_ends {
            curve.tps.push(tp);
            curve.fps.push(fp);
            curve.thresholds.push(scores[i]);
        }
    }
    curve
}

fn roc_curve(curve: &ClfCurve) -> RocCurve {
    let n = curve.tps.len();

    // Drop points collinear with their neighbours
    let keep: Vec<usize> = if n > 2 {
        (0..n)
            .filter(|&i| {
                i == 0
                    || i == n - 1
                    || curve.fps[i + 1] - 2.0 * curve.fps[i] + curve.fps[i - 1] != 0.0
                    || curve.tps[i + 1] - 2.0 * curve.tps[i] + curve.tps[i - 1] != 0.0
            })
            .collect()
    } else {
        (0..n).collect()
    };

    let mut fps = vec![0.0];
    let mut tps = vec![0.0];
    let mut thresholds = vec![curve.thresholds.first().map_or(1.0, |t| t + 1.0)];
    for &i in &keep {
        fps.push(curve.fps[i]);
        tps.push(curve.tps[i]);
        thresholds.push(curve.thresholds[i]);
    }

    let neg = fps.last().copied().unwrap_or(0.0);
    let pos = tps.last().copied().unwrap_or(0.0);
    if neg <= 0.0 {
        tracing::warn!("No negative samples in y_true, false positive rate is undefined");
    }
    if pos <= 0.0 {
        tracing::warn!("No positive samples in y_true, true positive rate is undefined");
    }
    let rate = |v: f64, total: f64| if total > 0.0 { v / total } else { 0.0 };

    RocCurve {
        fpr: fps.iter().map(|&v| rate(v, neg)).collect(),
        tpr: tps.iter().map(|&v| rate(v, pos)).collect(),
        thresholds,
    }
}

fn precision_recall_curve(curve: &ClfCurve) -> PrecisionRecallCurve {
    let total_pos = curve.tps.last().copied().unwrap_or(0.0);

    let mut precision: Vec<f64> = curve
        .tps
        .iter()
        .zip(&curve.fps)
        .map(|(&tp, &fp)| if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 })
        .rev()
        .collect();
    let mut recall: Vec<f64> = curve
        .tps
        .iter()
        .map(|&tp| if total_pos > 0.0 { tp / total_pos } else { 1.0 })
        .rev()
        .collect();
    let thresholds: Vec<f64> = curve.thresholds.iter().rev().copied().collect();

    precision.push(1.0);
    recall.push(0.0);
    PrecisionRecallCurve {
        precision,
        recall,
        thresholds,
    }
}

/// Trapezoidal area under the ROC points; 0.5 when only one class is present.
fn roc_auc(curve: &RocCurve, truth: &[bool]) -> f64 {
    let positives = truth.iter().filter(|&&t| t).count();
    if positives == 0 || positives == truth.len() {
        tracing::warn!("Only one class present in y_true, ROC AUC is undefined; reporting 0.5");
        return 0.5;
    }
    curve
        .fpr
        .windows(2)
        .zip(curve.tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}
