// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Interactive session state
//!
//! The workbench keeps the parsed dataset and a ready classifier between
//! requests. Datasets are cached by config and file content (with the
//! configured TTL); sessions by config and dataset content. Without a retrain
//! request a session comes from the cache, else from the saved model evaluated
//! on the full dataset, else from fresh training when no usable model is saved.

use crate::cache::{ExplicitCache, Fingerprint};
use crate::classifier::SpamClassifier;
use crate::config::{AppConfig, ResolvedConfig};
use crate::datasets::{Dataset, DatasetLoader};
use crate::error::Result;
use crate::metrics::MetricsReport;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a session's classifier came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionOrigin {
    /// Fitted in this process and saved
    Trained,
    /// Read from the saved artifact
    Loaded,
}

/// Ready classifier plus the report shown next to it
pub struct TrainedSession {
    pub classifier: SpamClassifier,
    /// Held-out report when trained, full-dataset report when loaded
    pub report: MetricsReport,
    pub origin: SessionOrigin,
}

pub struct Workbench {
    config: Arc<ResolvedConfig>,
    loader: DatasetLoader,
    datasets: ExplicitCache<Arc<Dataset>>,
    /// Latest dataset key per source file
    dataset_keys: HashMap<PathBuf, Fingerprint>,
    sessions: ExplicitCache<Arc<TrainedSession>>,
}

impl Workbench {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        Self {
            loader: DatasetLoader::new(config.clone()),
            datasets: ExplicitCache::with_ttl_secs(config.cache_ttl_secs),
            dataset_keys: HashMap::new(),
            sessions: ExplicitCache::new(None),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Parsed dataset from `source`, or from the local copy when `None`.
    ///
    /// A source whose content changed replaces its earlier cache entry.
    pub fn dataset(&mut self, source: Option<&Path>) -> Result<Arc<Dataset>> {
        let bytes = self.loader.read_source(source)?;
        let key = Fingerprint::combine(&[
            &Fingerprint::of_config(&self.config),
            &Fingerprint::of_bytes(&bytes),
        ]);

        let origin = source.map_or_else(|| self.config.local_data_path.clone(), Path::to_path_buf);
        if let Some(previous) = self.dataset_keys.insert(origin, key.clone()) {
            if previous != key && self.datasets.invalidate(&previous) {
                tracing::debug!("Dropped superseded dataset {}", previous.short());
            }
        }

        if let Some(dataset) = self.datasets.get(&key) {
            tracing::debug!("Dataset cache hit {}", key.short());
            return Ok(dataset);
        }

        let dataset = Arc::new(self.loader.parse(&bytes)?);
        self.datasets.insert(key, dataset.clone());
        Ok(dataset)
    }

    /// Ready classifier for `dataset`; `retrain` discards every cached session
    /// and fits a new model.
    pub fn session(&mut self, dataset: &Dataset, retrain: bool) -> Result<Arc<TrainedSession>> {
        let key = Fingerprint::combine(&[
            &Fingerprint::of_config(&self.config),
            &Fingerprint::of_dataset(dataset),
        ]);

        if retrain {
            tracing::info!("Retraining requested, dropping {} cached session(s)", self.sessions.len());
            self.sessions.clear();
            return self.train_and_cache(key, dataset);
        }

        if let Some(session) = self.sessions.get(&key) {
            tracing::debug!("Session cache hit {}", key.short());
            return Ok(session);
        }

        let mut classifier = SpamClassifier::new(self.config.clone());
        match classifier.load(None) {
            Ok(path) => {
                let report = classifier.evaluate(dataset)?;
                tracing::info!("Using saved model {}", path.display());
                let session = Arc::new(TrainedSession {
                    classifier,
                    report,
                    origin: SessionOrigin::Loaded,
                });
                self.sessions.insert(key, session.clone());
                Ok(session)
            }
            Err(e) if e.is_missing_artifact() => {
                tracing::warn!("No usable saved model ({}), training a new one", e);
                self.train_and_cache(key, dataset)
            }
            Err(e) => Err(e),
        }
    }

    fn train_and_cache(&mut self, key: Fingerprint, dataset: &Dataset) -> Result<Arc<TrainedSession>> {
        let mut classifier = SpamClassifier::new(self.config.clone());
        let report = classifier.train(dataset)?;
        classifier.save(None)?;

        let session = Arc::new(TrainedSession {
            classifier,
            report,
            origin: SessionOrigin::Trained,
        });
        self.sessions.insert(key, session.clone());
        Ok(session)
    }

    /// Forget every cached dataset and session.
    pub fn invalidate(&mut self) {
        self.datasets.clear();
        self.dataset_keys.clear();
        self.sessions.clear();
    }

    pub fn cached_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn cached_datasets(&self) -> usize {
        self.datasets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "label,text\n\
ham,\"Hi there, let's catch up tomorrow.\"\n\
spam,WIN a brand new car by clicking here!!!\n\
ham,Reminder: project meeting at 2pm.\n\
spam,Exclusive offer!!! Limited time deal.\n\
ham,Lunch plans for next week?\n\
spam,Get rich quick by subscribing now!!!\n\
ham,Team standup moved to 10am.\n\
spam,Mega discount newsletter just for you.\n";

    fn workbench_in(dir: &Path) -> Workbench {
        let config = AppConfig {
            model_path: dir.join("model.json"),
            local_data_path: dir.join("data.csv"),
            test_size: 0.25,
            ..AppConfig::default()
        };
        Workbench::new(config.into_shared().unwrap())
    }

    #[test]
    fn test_dataset_cached_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, SAMPLE_CSV).unwrap();
        let mut workbench = workbench_in(dir.path());

        let first = workbench.dataset(Some(&path)).unwrap();
        let second = workbench.dataset(Some(&path)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 8);

        std::fs::write(&path, format!("{}ham,One more row\n", SAMPLE_CSV)).unwrap();
        let third = workbench.dataset(Some(&path)).unwrap();
        assert_eq!(third.len(), 9);
        assert_eq!(workbench.cached_datasets(), 1);
    }

    #[test]
    fn test_session_trains_then_reuses_then_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, SAMPLE_CSV).unwrap();
        let mut workbench = workbench_in(dir.path());
        let dataset = workbench.dataset(Some(&path)).unwrap();

        let trained = workbench.session(&dataset, false).unwrap();
        assert_eq!(trained.origin, SessionOrigin::Trained);
        assert!(dir.path().join("model.json").exists());

        let cached = workbench.session(&dataset, false).unwrap();
        assert!(Arc::ptr_eq(&trained, &cached));

        workbench.invalidate();
        let loaded = workbench.session(&dataset, false).unwrap();
        assert_eq!(loaded.origin, SessionOrigin::Loaded);
        assert_eq!(loaded.report.total_support(), dataset.len());
    }

    #[test]
    fn test_retrain_replaces_cached_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, SAMPLE_CSV).unwrap();
        let mut workbench = workbench_in(dir.path());
        let dataset = workbench.dataset(Some(&path)).unwrap();

        let first = workbench.session(&dataset, false).unwrap();
        let retrained = workbench.session(&dataset, true).unwrap();

        assert!(!Arc::ptr_eq(&first, &retrained));
        assert_eq!(retrained.origin, SessionOrigin::Trained);
        assert_eq!(workbench.cached_sessions(), 1);
    }

    #[test]
    fn test_corrupt_model_triggers_training() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, SAMPLE_CSV).unwrap();
        std::fs::write(dir.path().join("model.json"), b"{ broken").unwrap();
        let mut workbench = workbench_in(dir.path());
        let dataset = workbench.dataset(Some(&path)).unwrap();

        let session = workbench.session(&dataset, false).unwrap();
        assert_eq!(session.origin, SessionOrigin::Trained);
    }
}
