//! CSV import driver.
//!
//! Each file holds one measurement per line as
//! `value,longitude,latitude,timestamp`. A leading header row is skipped,
//! as are blank lines and `#` comments. The file name (without directory)
//! is the ledger key, so re-running an import skips files already loaded.

use anyhow::{bail, Context, Result};
use std::path::Path;

use emissions_core::cache::ResponseCache;
use emissions_core::models::{ImportBatch, NewPoint};
use emissions_core::service::QueryService;
use emissions_core::store::Store;
use emissions_core::Error;

use crate::params::parse_datetime;

/// What happened to one file.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported { inserted: u64 },
    Skipped,
}

/// Ledger key for a path.
pub fn source_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Not a file path: {}", path.display()))
}

/// Parses CSV text into points. Line numbers in errors are 1-based.
pub fn parse_csv(content: &str) -> Result<Vec<NewPoint>> {
    let mut points = Vec::new();
    let mut seen_data = false;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if !seen_data && fields.first().is_some_and(|f| f.parse::<f64>().is_err()) {
            seen_data = true;
            continue;
        }
        seen_data = true;

        if fields.len() != 4 {
            bail!("line {}: expected 4 columns, found {}", line_no, fields.len());
        }
        let number = |idx: usize, name: &str| -> Result<f64> {
            fields[idx]
                .parse::<f64>()
                .with_context(|| format!("line {}: invalid {} '{}'", line_no, name, fields[idx]))
        };
        let timestamp = parse_datetime("timestamp", fields[3])
            .with_context(|| format!("line {}", line_no))?;
        points.push(NewPoint::new(
            number(0, "value")?,
            number(1, "longitude")?,
            number(2, "latitude")?,
            timestamp,
        ));
    }
    Ok(points)
}

pub fn read_csv(path: &Path) -> Result<ImportBatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let points = parse_csv(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(ImportBatch::new(source_name(path)?, points))
}

/// Imports one file through the service so the cache is invalidated.
pub async fn import_file<S, C>(service: &QueryService<S, C>, path: &Path) -> Result<ImportOutcome>
where
    S: Store,
    C: ResponseCache,
{
    let source = source_name(path)?;
    if service.store().has_imported(&source).await? {
        tracing::info!(source = %source, "already imported, skipping");
        return Ok(ImportOutcome::Skipped);
    }

    let batch = read_csv(path)?;
    match service.ingest(&batch).await {
        Ok(report) => Ok(ImportOutcome::Imported {
            inserted: report.inserted,
        }),
        // Lost a race with a concurrent import of the same file
        Err(Error::DuplicateImport(_)) => Ok(ImportOutcome::Skipped),
        Err(e) => Err(e).with_context(|| format!("Failed to import {}", path.display())),
    }
}

/// Runs `emissions import`: every file is attempted, failures are reported
/// at the end.
pub async fn run_import<S, C>(service: &QueryService<S, C>, paths: &[std::path::PathBuf]) -> Result<()>
where
    S: Store,
    C: ResponseCache,
{
    let mut failed = 0;
    for path in paths {
        match import_file(service, path).await {
            Ok(ImportOutcome::Imported { inserted }) => {
                println!("imported {} ({} points)", path.display(), inserted);
            }
            Ok(ImportOutcome::Skipped) => {
                println!("skipped {} (already imported)", path.display());
            }
            Err(e) => {
                eprintln!("error: {:#}", e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} file(s) failed to import", failed, paths.len());
    }
    Ok(())
}
