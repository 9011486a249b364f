// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for the spam classifier.
//!
//! Every fallible library operation returns [`Result<T>`]. Nothing is retried or
//! recovered internally; callers decide policy (for example the
//! [`Workbench`](crate::workbench::Workbench) retrains when a saved model is
//! missing).

use std::path::PathBuf;
use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`ClassifierError`].
pub type Result<T> = std::result::Result<T, ClassifierError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClassifierError {
    /// No local copy of the dataset and the remote fetch failed.
    #[error("dataset unavailable from {url}: {reason}")]
    DatasetUnavailable { url: String, reason: String },

    /// Too few examples (or classes) to train or score.
    #[error("not enough data: {0}")]
    NotEnoughData(String),

    /// predict / evaluate / save called before train or load.
    #[error("model is not trained or loaded")]
    ModelNotReady,

    #[error("model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("model artifact {} is unreadable or incompatible: {reason}", .path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed user-supplied input, such as an uploaded CSV with no columns.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ClassifierError {
    /// True for the two artifact failures a caller may answer by retraining.
    pub fn is_missing_artifact(&self) -> bool {
        matches!(
            self,
            ClassifierError::ArtifactNotFound(_) | ClassifierError::ArtifactCorrupt { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_classification() {
        assert!(ClassifierError::ArtifactNotFound(PathBuf::from("m.json")).is_missing_artifact());
        assert!(ClassifierError::ArtifactCorrupt {
            path: PathBuf::from("m.json"),
            reason: "bad".to_string(),
        }
        .is_missing_artifact());
        assert!(!ClassifierError::ModelNotReady.is_missing_artifact());
    }

    #[test]
    fn test_error_messages() {
        let err = ClassifierError::DatasetUnavailable {
            url: "http://example.invalid/spam.csv".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("example.invalid"));
        assert_eq!(ClassifierError::ModelNotReady.to_string(), "model is not trained or loaded");
    }
}
