// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset fetching, caching and parsing
//!
//! The raw dataset is a two-column (label, text) CSV in a single-byte encoding.
//! It is downloaded once to the configured local path and parsed from there.

use crate::config::{AppConfig, ResolvedConfig};
use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One labeled message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub label: String,
    pub text: String,
}

impl Record {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Ordered collection of labeled messages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    label_column: String,
    text_column: String,
    records: Vec<Record>,
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Fields {
            label_column: String,
            text_column: String,
            records: Vec<Record>,
        }

        let fields = Fields::deserialize(deserializer)?;
        Ok(Self::new(fields.label_column, fields.text_column, fields.records))
    }
}

impl Dataset {
    /// Build a dataset, dropping records whose label or text is empty.
    pub fn new(label_column: impl Into<String>, text_column: impl Into<String>, records: Vec<Record>) -> Self {
        let records = records
            .into_iter()
            .filter(|r| !r.label.is_empty() && !r.text.is_empty())
            .collect();
        Self {
            label_column: label_column.into(),
            text_column: text_column.into(),
            records,
        }
    }

    pub fn label_column(&self) -> &str {
        &self.label_column
    }

    pub fn text_column(&self) -> &str {
        &self.text_column
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.records.iter().map(|r| r.label.clone()).collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.records.iter().map(|r| r.text.clone()).collect()
    }

    /// Distinct labels in lexicographic order
    pub fn class_labels(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.label.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Record count per label
    pub fn label_distribution(&self) -> BTreeMap<String, usize> {
        let mut dist = BTreeMap::new();
        for record in &self.records {
            *dist.entry(record.label.clone()).or_insert(0) += 1;
        }
        dist
    }

    /// First `n` records
    pub fn head(&self, n: usize) -> &[Record] {
        &self.records[..n.min(self.records.len())]
    }

    /// New dataset holding the records at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            label_column: self.label_column.clone(),
            text_column: self.text_column.clone(),
            records: indices.iter().map(|&i| self.records[i].clone()).collect(),
        }
    }
}

/// Loads the labeled dataset, fetching it on first use
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    config: Arc<ResolvedConfig>,
}

impl DatasetLoader {
    pub fn new(config: Arc<ResolvedConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Make sure the dataset exists at the configured local path, downloading it
    /// once if absent.
    pub fn ensure_local_copy(&self) -> Result<PathBuf> {
        let target = self.config.local_data_path.clone();
        if !target.exists() {
            tracing::info!("No local dataset at {}, fetching", target.display());
            self.config.ensure_directories()?;
            let bytes = fetch_remote(&self.config.data_url)?;
            write_atomically(&target, &bytes)?;
            tracing::info!("Dataset cached at {} ({} bytes)", target.display(), bytes.len());
        }
        Ok(target)
    }

    /// Read the raw bytes of `source`, or of the local copy when `source` is `None`.
    pub fn read_source(&self, source: Option<&Path>) -> Result<Vec<u8>> {
        let path = match source {
            Some(path) => path.to_path_buf(),
            None => self.ensure_local_copy()?,
        };
        tracing::debug!("Reading dataset from {}", path.display());
        Ok(std::fs::read(&path)?)
    }

    pub fn load(&self, source: Option<&Path>) -> Result<Dataset> {
        let bytes = self.read_source(source)?;
        self.parse(&bytes)
    }

    /// Parse raw dataset bytes.
    ///
    /// When the first row names both configured columns it is a header and the
    /// columns are picked by name. Otherwise the whole file is data and the
    /// first two columns are taken as label and text by position. A file whose
    /// header uses other names is therefore read as data, header row included.
    pub fn parse(&self, bytes: &[u8]) -> Result<Dataset> {
        let text = decode_latin1(bytes);
        let rows = read_rows(&text)?;
        let label_column = &self.config.label_column;
        let text_column = &self.config.text_column;

        let named = rows.first().and_then(|header| {
            let label_idx = header.iter().position(|f| f == label_column)?;
            let text_idx = header.iter().position(|f| f == text_column)?;
            (header.len() >= 2).then_some((label_idx, text_idx))
        });

        let (label_idx, text_idx, data) = match named {
            Some((label_idx, text_idx)) => (label_idx, text_idx, &rows[1..]),
            None => {
                tracing::debug!("Expected columns not found, assigning columns by position");
                (0, 1, &rows[..])
            }
        };

        let total = data.len();
        let records: Vec<Record> = data
            .iter()
            .filter_map(|row| {
                let label = row.get(label_idx).filter(|v| !v.is_empty())?;
                let text = row.get(text_idx).filter(|v| !v.is_empty())?;
                Some(Record::new(label, text))
            })
            .collect();

        if records.len() < total {
            tracing::warn!("Dropped {} rows with missing label or text", total - records.len());
        }
        tracing::info!("Dataset parsed: {} records", records.len());

        Ok(Dataset::new(label_column.clone(), text_column.clone(), records))
    }
}

/// Decode bytes as latin-1: each byte becomes the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Read every CSV row, tolerating ragged rows.
pub(crate) fn read_rows(text: &str) -> Result<Vec<csv::StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Single GET of `url`; transport errors and non-success statuses become
/// [`ClassifierError::DatasetUnavailable`].
pub fn fetch_remote(url: &str) -> Result<Vec<u8>> {
    let unavailable = |reason: String| ClassifierError::DatasetUnavailable {
        url: url.to_string(),
        reason,
    };

    tracing::info!("Downloading dataset from: {}", url);
    let response = reqwest::blocking::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| unavailable(e.to_string()))?
        .get(url)
        .send()
        .map_err(|e| unavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(unavailable(format!("status {}", response.status())));
    }

    let bytes = response.bytes().map_err(|e| unavailable(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Write `bytes` to a sibling temp file and rename it over `path`.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp = path.with_file_name(tmp_name);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn sample_dataset() -> Dataset {
    let rows = [
        ("ham", "Hi there, let's catch up tomorrow."),
        ("spam", "WIN a brand new car by clicking here!!!"),
        ("ham", "Reminder: project meeting at 2pm."),
        ("spam", "Exclusive offer!!! Limited time deal."),
        ("ham", "Lunch plans for next week?"),
        ("spam", "Get rich quick by subscribing now!!!"),
        ("ham", "Team standup moved to 10am."),
        ("spam", "Mega discount newsletter just for you."),
    ];
    Dataset::new(
        "label",
        "text",
        rows.iter().map(|(l, t)| Record::new(*l, *t)).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> DatasetLoader {
        DatasetLoader::new(AppConfig::default().into_shared().unwrap())
    }

    #[test]
    fn test_headerless_two_columns() {
        let csv = b"ham,Are we still on for lunch?\nspam,\"Free entry, win cash now\"\nham,See you soon\n";
        let dataset = loader().parse(csv).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.records()[0], Record::new("ham", "Are we still on for lunch?"));
        assert_eq!(dataset.records()[1].text, "Free entry, win cash now");
        assert_eq!(dataset.label_column(), "label");
    }

    #[test]
    fn test_named_columns_in_any_order() {
        let csv = b"id,text,label\n1,hello there,ham\n2,cheap pills,spam\n";
        let dataset = loader().parse(csv).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.records()[1], Record::new("spam", "cheap pills"));
    }

    #[test]
    fn test_foreign_header_is_kept_as_data() {
        // v1/v2 headers do not match the configured names
        let csv = b"v1,v2,,,\nham,Ok lar...,,,\nspam,Free msg,,,\n";
        let dataset = loader().parse(csv).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.records()[0], Record::new("v1", "v2"));
    }

    #[test]
    fn test_missing_values_dropped() {
        let csv = b"ham,fine\nspam,\n,orphan text\nham\nspam,win\n";
        let dataset = loader().parse(csv).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.labels(), vec!["ham", "spam"]);
    }

    #[test]
    fn test_latin1_decoding() {
        let csv = b"ham,caf\xe9 at 5\n";
        let dataset = loader().parse(csv).unwrap();
        assert_eq!(dataset.records()[0].text, "caf\u{e9} at 5");
    }

    #[test]
    fn test_distribution_and_labels() {
        let dataset = sample_dataset();
        let dist = dataset.label_distribution();

        assert_eq!(dist.get("ham"), Some(&4));
        assert_eq!(dist.get("spam"), Some(&4));
        assert_eq!(dataset.class_labels(), vec!["ham", "spam"]);
        assert_eq!(dataset.head(3).len(), 3);
        assert_eq!(dataset.head(100).len(), 8);
    }

    #[test]
    fn test_select_preserves_order() {
        let dataset = sample_dataset();
        let subset = dataset.select(&[3, 0]);
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.records()[0], dataset.records()[3]);
        assert_eq!(subset.records()[1], dataset.records()[0]);
    }

    #[test]
    fn test_deserialize_drops_empty_records() {
        let json = r#"{
            "label_column": "label",
            "text_column": "text",
            "records": [
                {"label": "ham", "text": "see you"},
                {"label": "", "text": "orphan text"},
                {"label": "spam", "text": ""}
            ]
        }"#;
        let dataset: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.records()[0], Record::new("ham", "see you"));

        let round_trip: Dataset = serde_json::from_str(&serde_json::to_string(&sample_dataset()).unwrap()).unwrap();
        assert_eq!(round_trip, sample_dataset());
    }
}
