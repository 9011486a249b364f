// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Content fingerprints and an explicit, TTL-bounded cache
//!
//! Entries are keyed by a SHA-256 [`Fingerprint`] of whatever they were built
//! from, so a changed config or dataset simply misses. Nothing is evicted
//! behind the caller's back except on expiry.

use crate::config::AppConfig;
use crate::datasets::Dataset;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Lowercase hex SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Digest of every setting that changes what gets loaded or trained
    pub fn of_config(config: &AppConfig) -> Self {
        let mut hasher = Sha256::new();
        for field in [
            config.data_url.clone(),
            config.local_data_path.to_string_lossy().into_owned(),
            config.model_path.to_string_lossy().into_owned(),
            config.label_column.clone(),
            config.text_column.clone(),
            config.random_state.to_string(),
            config.test_size.to_string(),
            config.max_features.to_string(),
            config.max_iter.to_string(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn of_dataset(dataset: &Dataset) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(dataset.label_column().as_bytes());
        hasher.update([0u8]);
        hasher.update(dataset.text_column().as_bytes());
        hasher.update([0u8]);
        for record in dataset.records() {
            hasher.update(record.label.as_bytes());
            hasher.update([0u8]);
            hasher.update(record.text.as_bytes());
            hasher.update([1u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Order-sensitive digest of several fingerprints
    pub fn combine(parts: &[&Fingerprint]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.0.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for logs
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint-keyed cache with optional time-to-live
#[derive(Debug)]
pub struct ExplicitCache<V> {
    ttl: Option<Duration>,
    entries: HashMap<Fingerprint, (Instant, V)>,
}

impl<V: Clone> ExplicitCache<V> {
    /// `None` keeps entries until invalidated.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Build from a TTL in seconds where 0 disables expiry.
    pub fn with_ttl_secs(secs: u64) -> Self {
        Self::new((secs > 0).then(|| Duration::from_secs(secs)))
    }

    /// Cached value for `key`, dropping it first if it has expired.
    pub fn get(&mut self, key: &Fingerprint) -> Option<V> {
        let expired = match (self.entries.get(key), self.ttl) {
            (None, _) => return None,
            (Some((stored, _)), Some(ttl)) => stored.elapsed() >= ttl,
            (Some(_), None) => false,
        };
        if expired {
            tracing::debug!("Cache entry {} expired", key.short());
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|(_, v)| v.clone())
    }

    /// Store `value`, sweeping out every expired entry first.
    pub fn insert(&mut self, key: Fingerprint, value: V) {
        self.purge_expired();
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.entries.len();
        self.entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!("Purged {} expired cache entries", removed);
        }
        removed
    }

    /// Remove one entry, returning whether it was present.
    pub fn invalidate(&mut self, key: &Fingerprint) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
