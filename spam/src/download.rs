// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Dataset download utility
//!
//! Fetches the labeled spam CSV once into the configured local path so later
//! runs work offline.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use spam_classifier::datasets::{fetch_remote, write_atomically};
use spam_classifier::{AppConfig, ConfigOverrides, DatasetLoader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fetch-dataset")]
#[command(about = "Download the spam dataset")]
#[command(version)]
struct Args {
    /// Dataset URL
    #[arg(long, env = "SPAM_DATA_URL")]
    url: Option<String>,

    /// Output file (defaults to the configured local dataset path)
    #[arg(short, long, env = "SPAM_DATA_PATH")]
    output: Option<PathBuf>,

    /// Force re-download even if the file exists
    #[arg(short, long)]
    force: bool,
}

fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn download(url: &str, target: &Path) -> Result<usize> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    pb.set_message(format!("Downloading {}", url));
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = fetch_remote(url).and_then(|bytes| {
        write_atomically(target, &bytes)?;
        Ok(bytes.len())
    });

    match &result {
        Ok(len) => pb.finish_with_message(format!("Downloaded {} bytes", len)),
        Err(_) => pb.abandon_with_message("Download failed"),
    }
    Ok(result?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Dataset Download Utility");
    tracing::info!("========================");

    let config = AppConfig::from_overrides(ConfigOverrides {
        data_url: args.url,
        local_data_path: args.output,
        ..Default::default()
    })
    .context("Invalid configuration")?;
    let target = config.local_data_path.clone();

    if target.exists() && !args.force {
        tracing::info!("Dataset already exists: {}", target.display());
        tracing::info!("Use --force to re-download");
    } else {
        config.ensure_directories()?;
        let len = download(&config.data_url, &target)
            .with_context(|| format!("Failed to download {}", config.data_url))?;
        tracing::info!("Wrote {} bytes to {}", len, target.display());
    }

    let checksum = sha256_file(&target)?;
    let dataset = DatasetLoader::new(config)
        .load(Some(&target))
        .context("Downloaded file is not a readable dataset")?;

    println!("\n{}", "=".repeat(60));
    println!("Dataset Ready");
    println!("{}", "=".repeat(60));
    println!("Path:    {}", target.display());
    println!("SHA-256: {}", checksum);
    println!("Rows:    {}", dataset.len());
    for (label, count) in dataset.label_distribution() {
        println!("  {:<8} {}", label, count);
    }

    Ok(())
}
