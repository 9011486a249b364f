// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset overviews and evaluation reports
//!
//! Reports carry everything a front end needs to draw the usual charts (label
//! distribution, confusion matrix, ROC and precision-recall curves) and can be
//! saved as JSON or rendered as Markdown.

use crate::cache::Fingerprint;
use crate::classifier::SpamClassifier;
use crate::config::AppConfig;
use crate::datasets::{Dataset, Record};
use crate::error::{ClassifierError, Result};
use crate::metrics::MetricsReport;
use crate::pipeline::{Estimator, Predictor};
use crate::workbench::{SessionOrigin, TrainedSession};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Shape and head of a dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOverview {
    pub rows: usize,
    pub columns: Vec<String>,
    pub label_distribution: BTreeMap<String, usize>,
    pub preview: Vec<Record>,
}

impl DatasetOverview {
    pub fn from_dataset(dataset: &Dataset, preview_rows: usize) -> Self {
        Self {
            rows: dataset.len(),
            columns: vec![dataset.label_column().to_string(), dataset.text_column().to_string()],
            label_distribution: dataset.label_distribution(),
            preview: dataset.head(preview_rows).to_vec(),
        }
    }

    /// Format as a human-readable string
    pub fn format(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Rows: {}, columns: {:?}\n\n", self.rows, self.columns));

        for record in &self.preview {
            output.push_str(&format!("{:<8} {}\n", record.label, truncate(&record.text, 70)));
        }

        output.push_str("\nLabel distribution:\n");
        for (label, count) in &self.label_distribution {
            let share = if self.rows > 0 { *count as f64 / self.rows as f64 } else { 0.0 };
            output.push_str(&format!("  {:<8} {:>8} ({:.1}%)\n", label, count, share * 100.0));
        }
        output
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub estimator: String,
    pub classes: Vec<String>,
    pub n_features: usize,
    pub trained_at: Option<DateTime<Utc>>,
    pub origin: Option<SessionOrigin>,
}

/// Metrics for one model on one dataset, with provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub version: String,
    pub config_fingerprint: Fingerprint,
    pub dataset: DatasetOverview,
    pub model: ModelInfo,
    pub metrics: MetricsReport,
}

impl EvaluationReport {
    pub fn new<E: Estimator>(
        config: &AppConfig,
        dataset: &Dataset,
        classifier: &SpamClassifier<E>,
        metrics: MetricsReport,
        origin: Option<SessionOrigin>,
    ) -> Result<Self> {
        let model = classifier.model().ok_or(ClassifierError::ModelNotReady)?;
        Ok(Self {
            generated_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_fingerprint: Fingerprint::of_config(config),
            dataset: DatasetOverview::from_dataset(dataset, 10),
            model: ModelInfo {
                estimator: classifier.estimator().name().to_string(),
                classes: model.classes().to_vec(),
                n_features: model.n_features(),
                trained_at: classifier.trained_at(),
                origin,
            },
            metrics,
        })
    }

    pub fn from_session(config: &AppConfig, dataset: &Dataset, session: &TrainedSession) -> Result<Self> {
        Self::new(
            config,
            dataset,
            &session.classifier,
            session.report.clone(),
            Some(session.origin),
        )
    }

    /// Save the report as pretty-printed JSON
    pub fn save_json(&self, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(output_path, json)?;
        tracing::info!("Report saved to: {}", output_path.display());
        Ok(())
    }

    /// Render as a Markdown document
    pub fn to_markdown(&self) -> String {
        let mut report = String::new();

        report.push_str("# Spam Classifier Evaluation Report\n\n");
        report.push_str(&format!("**Generated:** {}\n\n", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", self.version));
        report.push_str(&format!("**Config:** `{}`\n\n", self.config_fingerprint.short()));

        report.push_str("## Dataset\n\n");
        report.push_str(&format!("- **Rows:** {}\n", self.dataset.rows));
        report.push_str(&format!("- **Columns:** {}\n", self.dataset.columns.join(", ")));
        for (label, count) in &self.dataset.label_distribution {
            report.push_str(&format!("- **{}:** {}\n", label, count));
        }
        report.push('\n');

        report.push_str("## Model\n\n");
        report.push_str(&format!("- **Estimator:** {}\n", self.model.estimator));
        report.push_str(&format!("- **Classes:** {}\n", self.model.classes.join(", ")));
        report.push_str(&format!("- **Features:** {}\n", self.model.n_features));
        if let Some(trained_at) = self.model.trained_at {
            report.push_str(&format!("- **Trained:** {}\n", trained_at.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        let basis = match self.model.origin {
            Some(SessionOrigin::Trained) => "held-out test split",
            Some(SessionOrigin::Loaded) | None => "full dataset",
        };
        report.push_str(&format!("- **Evaluated on:** {}\n\n", basis));

        report.push_str("## Metrics\n\n");
        report.push_str("| Label | Precision | Recall | F1 Score | Support |\n");
        report.push_str("|-------|-----------|--------|----------|---------|\n");
        for (label, m) in &self.metrics.per_class {
            report.push_str(&format!(
                "| {} | {:.4} | {:.4} | {:.4} | {} |\n",
                label, m.precision, m.recall, m.f1_score, m.support
            ));
        }
        report.push_str(&format!(
            "\n**Accuracy:** {:.4} | **ROC AUC ({}):** {:.4}\n\n",
            self.metrics.accuracy, self.metrics.positive_label, self.metrics.roc_auc
        ));

        report.push_str("### Confusion Matrix\n\n");
        report.push_str("| Actual \\ Predicted |");
        for label in &self.metrics.confusion_matrix.labels {
            report.push_str(&format!(" {} |", label));
        }
        report.push('\n');
        report.push_str("|---|");
        for _ in &self.metrics.confusion_matrix.labels {
            report.push_str("---|");
        }
        report.push('\n');
        for (label, row) in self
            .metrics
            .confusion_matrix
            .labels
            .iter()
            .zip(&self.metrics.confusion_matrix.counts)
        {
            report.push_str(&format!("| {} |", label));
            for count in row {
                report.push_str(&format!(" {} |", count));
            }
            report.push('\n');
        }

        report.push_str("\n### Curves\n\n");
        report.push_str(&format!(
            "- ROC curve: {} points\n- Precision-recall curve: {} points\n\n",
            self.metrics.roc_curve.fpr.len(),
            self.metrics.pr_curve.precision.len()
        ));
        report.push_str("Full curve coordinates are in the JSON report.\n\n");

        report.push_str("---\n\n");
        report.push_str("*TF-IDF + logistic regression, for teaching purposes only.*\n");

        report
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::sample_dataset;

    #[test]
    fn test_overview() {
        let overview = DatasetOverview::from_dataset(&sample_dataset(), 3);

        assert_eq!(overview.rows, 8);
        assert_eq!(overview.columns, vec!["label", "text"]);
        assert_eq!(overview.preview.len(), 3);
        assert_eq!(overview.label_distribution.get("spam"), Some(&4));
        assert!(overview.format().contains("Label distribution"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_report_json_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            model_path: dir.path().join("model.json"),
            test_size: 0.25,
            ..AppConfig::default()
        }
        .into_shared()
        .unwrap();
        let dataset = sample_dataset();
        let mut classifier = SpamClassifier::new(config.clone());
        classifier.train(&dataset).unwrap();
        let metrics = classifier.evaluate(&dataset).unwrap();

        let report = EvaluationReport::new(&config, &dataset, &classifier, metrics, None).unwrap();
        assert_eq!(report.model.classes, vec!["ham", "spam"]);
        assert!(report.model.n_features > 0);

        let path = dir.path().join("out/report.json");
        report.save_json(&path).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["metrics"]["positive_label"], "spam");
        assert!(saved["metrics"]["roc_curve"]["fpr"].is_array());

        let markdown = report.to_markdown();
        assert!(markdown.contains("# Spam Classifier Evaluation Report"));
        assert!(markdown.contains("| ham |"));
        assert!(markdown.contains("full dataset"));
    }

    #[test]
    fn test_untrained_classifier_rejected() {
        let classifier = SpamClassifier::new(AppConfig::default().into_shared().unwrap());
        let dataset = sample_dataset();
        let y = dataset.labels();
        let probs = crate::pipeline::ProbabilityMatrix::new(
            dataset.class_labels(),
            y.iter().map(|_| vec![0.5, 0.5]).collect(),
        );
        let metrics = MetricsReport::from_predictions(&y, &y, &probs, &dataset.class_labels());

        let result = EvaluationReport::new(&AppConfig::default(), &dataset, &classifier, metrics, None);
        assert!(matches!(result, Err(ClassifierError::ModelNotReady)));
    }
}
