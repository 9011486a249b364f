// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Batch inference over uploaded CSV files

use crate::classifier::SpamClassifier;
use crate::datasets::{decode_latin1, read_rows};
use crate::error::{ClassifierError, Result};
use crate::pipeline::Estimator;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Uploaded rows with named columns, one of which holds the text
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    text_index: usize,
}

impl InferenceTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn text_column(&self) -> &str {
        &self.columns[self.text_index]
    }

    pub fn texts(&self) -> Vec<String> {
        self.rows.iter().map(|r| r[self.text_index].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read an uploaded CSV for inference.
///
/// A header naming `text_column` is used as is. Otherwise every row is data
/// and columns are named by position: the last one becomes `text_column`, the
/// first `label`, the rest `col_{i}`. A single column is therefore the text.
/// Short rows are padded with empty values.
pub fn read_inference_csv(bytes: &[u8], text_column: &str) -> Result<InferenceTable> {
    let rows = read_rows(&decode_latin1(bytes))?;
    let Some(header) = rows.first() else {
        return Err(ClassifierError::InvalidInput("CSV file has no columns".to_string()));
    };

    let (columns, data) = match header.iter().position(|f| f == text_column) {
        Some(_) => (header.iter().map(str::to_string).collect::<Vec<_>>(), &rows[1..]),
        None => {
            let count = header.len();
            tracing::info!("No '{}' header, naming {} column(s) by position", text_column, count);
            let names: Vec<String> = (0..count)
                .map(|idx| {
                    if idx == count - 1 {
                        text_column.to_string()
                    } else if idx == 0 {
                        "label".to_string()
                    } else {
                        format!("col_{}", idx)
                    }
                })
                .collect();
            (names, &rows[..])
        }
    };

    let text_index = columns
        .iter()
        .position(|c| c == text_column)
        .ok_or_else(|| ClassifierError::InvalidInput(format!("CSV needs a '{}' column", text_column)))?;

    let width = columns.len();
    let rows = data
        .iter()
        .map(|record| {
            let mut row: Vec<String> = record.iter().take(width).map(str::to_string).collect();
            row.resize(width, String::new());
            row
        })
        .collect();

    Ok(InferenceTable {
        columns,
        rows,
        text_index,
    })
}

/// One scored row of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub text: String,
    pub label: String,
    pub spam_probability: f64,
}

pub fn run_batch_prediction<E: Estimator>(
    classifier: &SpamClassifier<E>,
    table: &InferenceTable,
) -> Result<Vec<BatchPrediction>> {
    let texts = table.texts();
    let predictions = classifier.predict(&texts)?;
    let spam = predictions.positive_probabilities();

    tracing::info!("Scored {} rows", texts.len());
    Ok(texts
        .into_iter()
        .zip(predictions.labels)
        .zip(spam)
        .map(|((text, label), spam_probability)| BatchPrediction {
            text,
            label,
            spam_probability,
        })
        .collect())
}

/// Write predictions as CSV with a `text,label,spam_probability` header.
pub fn write_predictions<W: Write>(predictions: &[BatchPrediction], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for prediction in predictions {
        csv_writer.serialize(prediction)?;
    }
    csv_writer.flush()?;
    Ok(())
}
