// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Spam classifier CLI
//!
//! Usage:
//!   spam-classifier train --data datasets/spam.csv --model models/spam.json
//!   spam-classifier predict "WIN a free cruise, reply now"
//!   spam-classifier batch inbox.csv --output scored.csv
//!   spam-classifier report --retrain --format both

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spam_classifier::{
    read_inference_csv, run_batch_prediction, write_predictions, AppConfig, ConfigOverrides, DatasetLoader,
    DatasetOverview, EvaluationReport, ResolvedConfig, SpamClassifier, Workbench,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spam-classifier")]
#[command(about = "Train and run a TF-IDF + logistic regression spam classifier")]
#[command(version)]
struct Cli {
    /// Remote CSV fetched when no local copy exists
    #[arg(long, global = true, env = "SPAM_DATA_URL")]
    data_url: Option<String>,

    /// Local dataset path (downloaded here when absent)
    #[arg(short, long, global = true, env = "SPAM_DATA_PATH")]
    data: Option<PathBuf>,

    /// Model artifact path
    #[arg(short, long, global = true, env = "SPAM_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Random seed for the train/test split
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on the dataset, save the model and print held-out metrics
    Train,
    /// Classify a single message
    Predict {
        text: String,
    },
    /// Score the saved model on the whole dataset
    Evaluate,
    /// Classify every row of a CSV file
    Batch {
        input: PathBuf,

        /// Output CSV (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show dataset size, head and label distribution
    Preview {
        #[arg(short, long, default_value_t = 10)]
        rows: usize,
    },
    /// Build an evaluation report, reusing the saved model unless retraining
    Report {
        #[arg(long)]
        retrain: bool,

        /// Output directory for reports
        #[arg(short, long, default_value = "reports")]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value_t = ReportFormat::Both)]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
    Both,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_overrides(ConfigOverrides {
        data_url: cli.data_url,
        local_data_path: cli.data,
        model_path: cli.model,
        random_state: cli.seed,
        ..Default::default()
    })
    .context("Invalid configuration")?;
    tracing::debug!("Configuration: {:?}", config);

    match cli.command {
        Command::Train => train(config),
        Command::Predict { text } => predict(config, text),
        Command::Evaluate => evaluate(config),
        Command::Batch { input, output } => batch(config, input, output),
        Command::Preview { rows } => preview(config, rows),
        Command::Report {
            retrain,
            output,
            format,
        } => report(config, retrain, output, format),
    }
}

fn train(config: Arc<ResolvedConfig>) -> Result<()> {
    let dataset = DatasetLoader::new(config.clone())
        .load(None)
        .context("Failed to load dataset")?;

    let mut classifier = SpamClassifier::new(config);
    let report = classifier.train(&dataset).context("Training failed")?;
    let saved = classifier.save(None).context("Failed to save model")?;

    println!("Model saved to: {}", saved.display());
    println!("=== Metrics ===");
    for label in &report.labels {
        if let Some(m) = report.class(label) {
            println!(
                "{}: Precision={:.3}, Recall={:.3}, F1={:.3}",
                label, m.precision, m.recall, m.f1_score
            );
        }
    }
    println!("ROC AUC: {:.3}", report.roc_auc);
    Ok(())
}

fn predict(config: Arc<ResolvedConfig>, text: String) -> Result<()> {
    let mut classifier = SpamClassifier::new(config);
    classifier.load(None).context("Failed to load model")?;

    let predictions = classifier.predict(&[text])?;
    let label = predictions.labels.first().map(String::as_str).unwrap_or_default();
    let spam = predictions.positive_probabilities().first().copied().unwrap_or_default();
    println!("Prediction: {}, spam probability: {:.3}", label, spam);
    Ok(())
}

fn evaluate(config: Arc<ResolvedConfig>) -> Result<()> {
    let dataset = DatasetLoader::new(config.clone())
        .load(None)
        .context("Failed to load dataset")?;

    let mut classifier = SpamClassifier::new(config);
    classifier.load(None).context("Failed to load model")?;
    let report = classifier.evaluate(&dataset).context("Evaluation failed")?;

    println!("\n{}", "=".repeat(70));
    println!("EVALUATION ON {} ROWS", dataset.len());
    println!("{}", "=".repeat(70));
    println!("{}", report.format());
    Ok(())
}

fn batch(config: Arc<ResolvedConfig>, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let bytes = std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let table = read_inference_csv(&bytes, &config.text_column)
        .with_context(|| format!("Failed to parse {} as CSV", input.display()))?;

    let mut classifier = SpamClassifier::new(config);
    classifier.load(None).context("Failed to load model")?;
    let predictions = run_batch_prediction(&classifier, &table)?;

    match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_predictions(&predictions, file)?;
            println!("Predictions for {} rows written to: {}", predictions.len(), path.display());
        }
        None => write_predictions(&predictions, std::io::stdout().lock())?,
    }
    Ok(())
}

fn preview(config: Arc<ResolvedConfig>, rows: usize) -> Result<()> {
    let dataset = DatasetLoader::new(config)
        .load(None)
        .context("Failed to load dataset")?;
    print!("{}", DatasetOverview::from_dataset(&dataset, rows).format());
    Ok(())
}

fn report(config: Arc<ResolvedConfig>, retrain: bool, output: PathBuf, format: ReportFormat) -> Result<()> {
    let mut workbench = Workbench::new(config.clone());
    let dataset = workbench.dataset(None).context("Failed to load dataset")?;
    let session = workbench
        .session(&dataset, retrain)
        .context("Failed to prepare classifier")?;
    let report = EvaluationReport::from_session(&config, &dataset, &session)?;

    println!("\n{}", "=".repeat(70));
    println!("EVALUATION SUMMARY ({:?} model)", session.origin);
    println!("{}", "=".repeat(70));
    println!("{}", report.metrics.format());

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    if matches!(format, ReportFormat::Json | ReportFormat::Both) {
        let json_path = output.join(format!("spam_report_{}.json", timestamp));
        report.save_json(&json_path)?;
        println!("JSON report saved to: {}", json_path.display());
    }

    if matches!(format, ReportFormat::Markdown | ReportFormat::Both) {
        let md_path = output.join(format!("spam_report_{}.md", timestamp));
        std::fs::write(&md_path, report.to_markdown())?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    Ok(())
}
