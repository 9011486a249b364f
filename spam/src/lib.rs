// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Spam email classifier
//!
//! This crate provides:
//! - Dataset fetching, caching and parsing for labeled SMS/email CSVs
//! - A TF-IDF vectorizer and L2-regularized logistic regression (L-BFGS)
//! - Train / predict / save / load / evaluate with seeded stratified splits
//! - Evaluation metrics (per-class P/R/F1, confusion matrix, ROC and PR curves, AUC)
//! - Session caching, batch CSV inference and JSON/Markdown reports

pub mod batch;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod datasets;
pub mod error;
pub mod logistic;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod split;
pub mod vectorizer;
pub mod workbench;

pub use batch::{read_inference_csv, run_batch_prediction, write_predictions, BatchPrediction, InferenceTable};
pub use cache::{ExplicitCache, Fingerprint};
pub use classifier::{Predictions, SpamClassifier};
pub use config::{AppConfig, ConfigOverrides, ResolvedConfig};
pub use datasets::{Dataset, DatasetLoader, Record};
pub use error::{ClassifierError, Result};
pub use metrics::{ClassMetrics, ConfusionMatrix, MetricsReport};
pub use pipeline::{Estimator, Predictor, ProbabilityMatrix, TfidfLogisticRegression};
pub use report::{DatasetOverview, EvaluationReport};
pub use workbench::{SessionOrigin, TrainedSession, Workbench};
