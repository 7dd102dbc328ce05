//! Ingest command: feed a file of raw signal records through the engine.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use trendbase_engine::ingest::validate_records;
use trendbase_engine::TrendEngine;

/// Parse a JSON array, or newline-delimited JSON objects.
///
/// An unparsable NDJSON line becomes `null` so that it is rejected at its
/// index instead of aborting the whole file.
pub(crate) fn parse_records(contents: &str) -> anyhow::Result<Vec<Value>> {
    let trimmed = contents.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("input is not a valid JSON array");
    }

    Ok(trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).unwrap_or_else(|e| {
                tracing::warn!(index, error = %e, "unparsable NDJSON line");
                Value::Null
            })
        })
        .collect())
}

async fn read_records(path: &Path) -> anyhow::Result<Vec<Value>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_records(&contents)
}

pub(crate) async fn run_dry(path: &Path) -> anyhow::Result<()> {
    let records = read_records(path).await?;
    let total = records.len();
    let (accepted, rejected) = validate_records(records);

    println!(
        "dry-run: {total} records, {} valid, {} rejected",
        accepted.len(),
        rejected.len()
    );
    for rejection in &rejected {
        println!("  record {}: {}", rejection.index, rejection.reason);
    }
    Ok(())
}

pub(crate) async fn run(engine: &TrendEngine, path: &Path) -> anyhow::Result<()> {
    let records = read_records(path).await?;
    let report = engine.ingest(records, Utc::now()).await;

    println!(
        "ingested {} records: {} created, {} attached, {} duplicates merged, {} rejected, {} failed",
        report.accepted,
        report.created,
        report.attached,
        report.merged_duplicates,
        report.rejected.len(),
        report.failed.len()
    );
    for rejection in &report.rejected {
        println!("  rejected {}: {}", rejection.index, rejection.reason);
    }
    for failure in &report.failed {
        println!(
            "  failed {} ({}): {}",
            failure.index, failure.code, failure.message
        );
    }

    if !report.failed.is_empty() {
        anyhow::bail!("{} record(s) could not be persisted", report.failed.len());
    }
    Ok(())
}
