// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Application configuration
//!
//! One immutable [`AppConfig`] is built at startup and resolved into a
//! [`ResolvedConfig`] (validated, absolute paths). Components only accept the
//! resolved form, shared through an `Arc`, so no I/O runs against relative or
//! unchecked paths.

use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_DATA_URL: &str = "https://raw.githubusercontent.com/PacktPublishing/\
Hands-On-Artificial-Intelligence-for-Cybersecurity/master/chapter3/datasets/spam.csv";

/// Settings shared by the loader, classifier and workbench
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote location of the raw dataset
    pub data_url: String,
    /// Local cache of the raw dataset bytes
    pub local_data_path: PathBuf,
    /// Serialized model artifact
    pub model_path: PathBuf,
    pub label_column: String,
    pub text_column: String,
    /// Seed for the train/test split and any other randomness
    pub random_state: u64,
    /// Fraction of records held out for testing, in (0, 1)
    pub test_size: f64,
    /// Vocabulary cap of the TF-IDF vectorizer
    pub max_features: usize,
    /// Iteration cap of the logistic regression solver
    pub max_iter: usize,
    pub cache_dir: PathBuf,
    /// Lifetime of workbench cache entries, 0 disables expiry
    pub cache_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_url: DEFAULT_DATA_URL.to_string(),
            local_data_path: PathBuf::from("datasets/sms_spam_no_header.csv"),
            model_path: PathBuf::from("models/spam_classifier.json"),
            label_column: "label".to_string(),
            text_column: "text".to_string(),
            random_state: 42,
            test_size: 0.2,
            max_features: 10_000,
            max_iter: 200,
            cache_dir: PathBuf::from(".cache"),
            cache_ttl_secs: 3600,
        }
    }
}

/// Optional overrides applied on top of [`AppConfig::default`]
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_url: Option<String>,
    pub local_data_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub random_state: Option<u64>,
    pub test_size: Option<f64>,
    pub max_features: Option<usize>,
}

/// An [`AppConfig`] that passed validation and holds only absolute paths.
///
/// Built by [`AppConfig::resolve`]; read-only through `Deref`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig(AppConfig);

impl Deref for ResolvedConfig {
    type Target = AppConfig;

    fn deref(&self) -> &AppConfig {
        &self.0
    }
}

impl ResolvedConfig {
    pub fn into_inner(self) -> AppConfig {
        self.0
    }
}

impl AppConfig {
    /// Build a resolved, validated configuration from defaults plus overrides.
    pub fn from_overrides(overrides: ConfigOverrides) -> Result<Arc<ResolvedConfig>> {
        let base = Self::default();
        let config = Self {
            data_url: overrides.data_url.unwrap_or(base.data_url),
            local_data_path: overrides.local_data_path.unwrap_or(base.local_data_path),
            model_path: overrides.model_path.unwrap_or(base.model_path),
            random_state: overrides.random_state.unwrap_or(base.random_state),
            test_size: overrides.test_size.unwrap_or(base.test_size),
            max_features: overrides.max_features.unwrap_or(base.max_features),
            ..base
        };
        config.into_shared()
    }

    /// Validate and make every path absolute against the current directory.
    pub fn resolve(self) -> Result<ResolvedConfig> {
        self.validate()?;
        let cwd = std::env::current_dir()?;
        Ok(ResolvedConfig(Self {
            local_data_path: absolutize(&cwd, &self.local_data_path),
            model_path: absolutize(&cwd, &self.model_path),
            cache_dir: absolutize(&cwd, &self.cache_dir),
            ..self
        }))
    }

    /// [`resolve`](Self::resolve) and wrap for sharing between components.
    pub fn into_shared(self) -> Result<Arc<ResolvedConfig>> {
        self.resolve().map(Arc::new)
    }

    fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ClassifierError::InvalidConfig(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.max_features == 0 {
            return Err(ClassifierError::InvalidConfig("max_features must be positive".to_string()));
        }
        if self.max_iter == 0 {
            return Err(ClassifierError::InvalidConfig("max_iter must be positive".to_string()));
        }
        if self.label_column.is_empty() || self.text_column.is_empty() {
            return Err(ClassifierError::InvalidConfig("column names must not be empty".to_string()));
        }
        if self.label_column == self.text_column {
            return Err(ClassifierError::InvalidConfig(format!(
                "label and text columns must differ, both are '{}'",
                self.label_column
            )));
        }
        Ok(())
    }

    /// Create the parent directories of the data and model paths plus the cache dir.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.local_data_path.parent(),
            self.model_path.parent(),
            Some(self.cache_dir.as_path()),
        ]
        .into_iter()
        .flatten()
        {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
