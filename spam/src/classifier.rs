// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Spam classifier lifecycle
//!
//! A [`SpamClassifier`] starts untrained and becomes ready after a successful
//! [`train`](SpamClassifier::train) or [`load`](SpamClassifier::load). Both
//! replace the held pipeline wholesale and only on success; every other
//! operation reads it. Saved models are versioned JSON artifacts.

use crate::cache::Fingerprint;
use crate::config::{AppConfig, ResolvedConfig};
use crate::datasets::{write_atomically, Dataset};
use crate::error::{ClassifierError, Result};
use crate::metrics::MetricsReport;
use crate::pipeline::{Estimator, Predictor, ProbabilityMatrix, TfidfLogisticRegression};
use crate::split::stratified_split;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Artifact layout version; bump when the serialized model changes shape
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Labels and class probabilities for a batch of texts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predictions {
    pub labels: Vec<String>,
    pub probabilities: ProbabilityMatrix,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Probability of the second class (`spam` for `ham`/`spam`) per text
    pub fn positive_probabilities(&self) -> Vec<f64> {
        if self.probabilities.n_columns() < 2 {
            return vec![0.0; self.probabilities.n_rows()];
        }
        self.probabilities.column(1)
    }
}

#[derive(Serialize, Deserialize)]
struct ModelArtifact<M> {
    format_version: u32,
    crate_version: String,
    estimator: String,
    trained_at: Option<DateTime<Utc>>,
    config_fingerprint: Fingerprint,
    model: M,
}

#[derive(Deserialize)]
struct ArtifactHeader {
    format_version: u32,
}

pub struct SpamClassifier<E: Estimator = TfidfLogisticRegression> {
    config: Arc<ResolvedConfig>,
    estimator: E,
    pipeline: Option<E::Model>,
    trained_at: Option<DateTime<Utc>>,
}

impl SpamClassifier<TfidfLogisticRegression> {
    /// Classifier using the TF-IDF + logistic regression pipeline sized by `config`.
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        let estimator = TfidfLogisticRegression::from_config(&config);
        Self::with_estimator(config, estimator)
    }
}

impl<E: Estimator> SpamClassifier<E> {
    pub fn with_estimator(config: Arc<ResolvedConfig>, estimator: E) -> Self {
        Self {
            config,
            estimator,
            pipeline: None,
            trained_at: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn is_trained(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Class labels of the held pipeline
    pub fn classes(&self) -> Option<&[String]> {
        self.pipeline.as_ref().map(|p| p.classes())
    }

    pub fn model(&self) -> Option<&E::Model> {
        self.pipeline.as_ref()
    }

    /// When the held pipeline was fitted, if known
    pub fn trained_at(&self) -> Option<DateTime<Utc>> {
        self.trained_at
    }

    fn ready(&self) -> Result<&E::Model> {
        self.pipeline.as_ref().ok_or(ClassifierError::ModelNotReady)
    }

    /// Fit a fresh pipeline on a stratified train split and score it on the
    /// held-out rows.
    pub fn train(&mut self, dataset: &Dataset) -> Result<MetricsReport> {
        let target_names = dataset.class_labels();
        if target_names.len() < 2 {
            return Err(ClassifierError::NotEnoughData(format!(
                "training needs at least 2 labels, dataset has {}",
                target_names.len()
            )));
        }

        let labels = dataset.labels();
        let split = stratified_split(&labels, self.config.test_size, self.config.random_state)?;
        let train = dataset.select(&split.train);
        let test = dataset.select(&split.test);
        tracing::info!(
            "Training {} on {} rows, holding out {}",
            self.estimator.name(),
            train.len(),
            test.len()
        );

        let model = self.estimator.fit(&train.texts(), &train.labels())?;

        let probabilities = model.predict_proba(&test.texts());
        let y_pred = probabilities.argmax_labels();
        let report = MetricsReport::from_predictions(
            &test.labels(),
            &y_pred,
            &probabilities.aligned_to(&target_names),
            &target_names,
        );
        tracing::info!("Held-out accuracy {:.4}, ROC AUC {:.4}", report.accuracy, report.roc_auc);

        self.pipeline = Some(model);
        self.trained_at = Some(Utc::now());
        Ok(report)
    }

    pub fn predict(&self, texts: &[String]) -> Result<Predictions> {
        let model = self.ready()?;
        let probabilities = model.predict_proba(texts);
        Ok(Predictions {
            labels: probabilities.argmax_labels(),
            probabilities,
        })
    }

    /// Write the pipeline to `path`, or to the configured model path.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let model = self.ready()?;
        let target = path.map_or_else(|| self.config.model_path.clone(), Path::to_path_buf);

        let artifact = ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            estimator: self.estimator.name().to_string(),
            trained_at: self.trained_at,
            config_fingerprint: Fingerprint::of_config(&self.config),
            model,
        };
        let bytes = serde_json::to_vec(&artifact).map_err(std::io::Error::from)?;
        write_atomically(&target, &bytes)?;

        tracing::info!("Model saved to {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }

    /// Replace the pipeline with the artifact at `path`, or at the configured
    /// model path. On error the held pipeline is unchanged.
    pub fn load(&mut self, path: Option<&Path>) -> Result<PathBuf> {
        let target = path.map_or_else(|| self.config.model_path.clone(), Path::to_path_buf);
        let corrupt = |reason: String| ClassifierError::ArtifactCorrupt {
            path: target.clone(),
            reason,
        };

        let bytes = match std::fs::read(&target) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClassifierError::ArtifactNotFound(target.clone()));
            }
            Err(e) => return Err(corrupt(e.to_string())),
        };

        let header: ArtifactHeader =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} is not supported (expected {})",
                header.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        let artifact: ModelArtifact<E::Model> =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if artifact.config_fingerprint != Fingerprint::of_config(&self.config) {
            tracing::warn!(
                "Model at {} was trained under a different configuration",
                target.display()
            );
        }

        tracing::info!(
            "Loaded {} model from {} (crate {})",
            artifact.estimator,
            target.display(),
            artifact.crate_version
        );
        self.pipeline = Some(artifact.model);
        self.trained_at = artifact.trained_at;
        Ok(target)
    }

    /// Score the held pipeline on every row of `dataset`, without splitting.
    pub fn evaluate(&self, dataset: &Dataset) -> Result<MetricsReport> {
        let model = self.ready()?;
        let target_names = dataset.class_labels();
        if target_names.len() < 2 {
            return Err(ClassifierError::NotEnoughData(format!(
                "evaluation needs at least 2 labels, dataset has {}",
                target_names.len()
            )));
        }

        let probabilities = model.predict_proba(&dataset.texts());
        let y_pred = probabilities.argmax_labels();
        Ok(MetricsReport::from_predictions(
            &dataset.labels(),
            &y_pred,
            &probabilities.aligned_to(&target_names),
            &target_names,
        ))
    }
}
