// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Text classification pipelines
//!
//! An [`Estimator`] holds hyperparameters and fits a [`Predictor`], the immutable
//! fitted state mapping raw text to a probability distribution over a fixed,
//! lexicographically ordered set of class labels. [`TfidfLogisticRegression`]
//! is the stock implementation: a TF-IDF vectorizer feeding a logistic
//! regression.

use crate::config::AppConfig;
use crate::error::{ClassifierError, Result};
use crate::logistic::{LogisticModel, LogisticRegression};
use crate::vectorizer::TfidfVectorizer;
use serde::{de, de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Hyperparameters that can be fitted into a [`Predictor`]
pub trait Estimator {
    type Model: Predictor + Serialize + DeserializeOwned;

    /// Fit on parallel `texts` and `labels`.
    fn fit(&self, texts: &[String], labels: &[String]) -> Result<Self::Model>;

    fn name(&self) -> &str;
}

/// Fitted pipeline state
pub trait Predictor {
    /// Class labels in column order of [`Predictor::predict_proba`]
    fn classes(&self) -> &[String];

    fn predict_proba(&self, texts: &[String]) -> ProbabilityMatrix;

    /// Width of the learned feature space
    fn n_features(&self) -> usize;

    /// Most probable label per text
    fn predict(&self, texts: &[String]) -> Vec<String> {
        self.predict_proba(texts).argmax_labels()
    }
}

/// One row per input, one column per class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityMatrix {
    classes: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl<'de> Deserialize<'de> for ProbabilityMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Fields {
            classes: Vec<String>,
            rows: Vec<Vec<f64>>,
        }

        let Fields { classes, rows } = Fields::deserialize(deserializer)?;
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != classes.len()) {
            return Err(de::Error::custom(format!(
                "probability row {} has {} entries for {} classes",
                i,
                row.len(),
                classes.len()
            )));
        }
        Ok(Self { classes, rows })
    }
}

impl ProbabilityMatrix {
    /// Panics if any row length differs from the class count.
    pub fn new(classes: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        assert!(
            rows.iter().all(|r| r.len() == classes.len()),
            "every probability row must have one entry per class"
        );
        Self { classes, rows }
    }

    pub fn empty(classes: Vec<String>) -> Self {
        Self { classes, rows: Vec::new() }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of column `idx` across all rows
    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[idx]).collect()
    }

    /// Reorder columns to `classes`; classes the model never saw get probability 0.
    pub fn aligned_to(&self, classes: &[String]) -> Self {
        let mapping: Vec<Option<usize>> = classes
            .iter()
            .map(|c| self.classes.iter().position(|own| own == c))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| mapping.iter().map(|m| m.map_or(0.0, |i| row[i])).collect())
            .collect();
        Self {
            classes: classes.to_vec(),
            rows,
        }
    }

    /// Label of the largest probability per row, ties to the earlier class
    pub fn argmax_labels(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                let mut best = 0;
                for (i, &p) in row.iter().enumerate().skip(1) {
                    if p > row[best] {
                        best = i;
                    }
                }
                self.classes[best].clone()
            })
            .collect()
    }
}

/// TF-IDF (unigrams and bigrams, English stop words) into logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfLogisticRegression {
    pub max_features: usize,
    pub ngram_range: (usize, usize),
    pub regression: LogisticRegression,
}

impl Default for TfidfLogisticRegression {
    fn default() -> Self {
        Self {
            max_features: 10_000,
            ngram_range: (1, 2),
            regression: LogisticRegression::default(),
        }
    }
}

impl TfidfLogisticRegression {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_features: config.max_features,
            ngram_range: (1, 2),
            regression: LogisticRegression::new(1.0, config.max_iter),
        }
    }
}

impl Estimator for TfidfLogisticRegression {
    type Model = TfidfLogisticModel;

    fn fit(&self, texts: &[String], labels: &[String]) -> Result<TfidfLogisticModel> {
        if texts.len() != labels.len() {
            return Err(ClassifierError::InvalidInput(format!(
                "{} texts but {} labels",
                texts.len(),
                labels.len()
            )));
        }

        let classes: Vec<String> = labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if classes.len() < 2 {
            return Err(ClassifierError::NotEnoughData(format!(
                "training needs at least 2 classes, found {}",
                classes.len()
            )));
        }

        let index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        // Every label is a key: `classes` was collected from `labels`
        let targets: Vec<usize> = labels.iter().map(|l| index[l.as_str()]).collect();

        let mut vectorizer = TfidfVectorizer::new(self.max_features, self.ngram_range);
        let features = vectorizer.fit_transform(texts)?;

        tracing::info!(
            "Fitting {} on {} texts, {} features, {} classes",
            self.name(),
            texts.len(),
            vectorizer.n_features(),
            classes.len()
        );
        let regression = self
            .regression
            .fit(&features, vectorizer.n_features(), &targets, classes.len())?;

        Ok(TfidfLogisticModel {
            vectorizer,
            classes,
            regression,
        })
    }

    fn name(&self) -> &str {
        "TF-IDF + Logistic Regression"
    }
}

/// Fitted TF-IDF vectorizer and regression weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfLogisticModel {
    vectorizer: TfidfVectorizer,
    classes: Vec<String>,
    regression: LogisticModel,
}

impl TfidfLogisticModel {
    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn regression(&self) -> &LogisticModel {
        &self.regression
    }
}

impl Predictor for TfidfLogisticModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict_proba(&self, texts: &[String]) -> ProbabilityMatrix {
        let features = self.vectorizer.transform(texts);
        ProbabilityMatrix::new(self.classes.clone(), self.regression.predict_proba(&features))
    }

    fn n_features(&self) -> usize {
        self.vectorizer.n_features()
    }
}
