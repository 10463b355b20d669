use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::client::RowRecord;
use crate::error::{Error, Result};
use crate::fetch::FetchResult;

const METRIC_COLUMNS: &[&str] = &["clicks", "impressions", "ctr", "position"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Tsv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" => Ok(ExportFormat::Tsv),
            "json" => Ok(ExportFormat::Json),
            other => Err(Error::InvalidQuery(format!(
                "unsupported export type {:?}, use csv, tsv or json",
                other
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Column names for a report grouped by `dimensions`.
pub fn header(dimensions: &[String]) -> Vec<String> {
    dimensions
        .iter()
        .cloned()
        .chain(METRIC_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

fn record(dimensions: &[String], row: &RowRecord) -> Vec<String> {
    let mut record: Vec<String> = (0..dimensions.len())
        .map(|i| row.keys.get(i).cloned().unwrap_or_default())
        .collect();
    record.push(row.clicks.to_string());
    record.push(row.impressions.to_string());
    record.push(row.ctr.to_string());
    record.push(row.position.to_string());
    record
}

#[derive(Serialize)]
struct JsonReport<'a> {
    rows: &'a [RowRecord],
}

/// Writes the merged result. Empty results are refused so no empty file is
/// left behind.
pub fn write_report(
    path: &Path,
    format: ExportFormat,
    dimensions: &[String],
    result: &FetchResult,
) -> Result<()> {
    if result.is_empty() {
        return Err(Error::EmptyResult);
    }

    match format {
        ExportFormat::Csv => write_delimited(path, b',', dimensions, result)?,
        ExportFormat::Tsv => write_delimited(path, b'\t', dimensions, result)?,
        ExportFormat::Json => {
            let file = std::fs::File::create(path)?;
            serde_json::to_writer_pretty(
                std::io::BufWriter::new(file),
                &JsonReport {
                    rows: result.rows(),
                },
            )?;
        }
    }

    tracing::info!(path = %path.display(), rows = result.len(), %format, "report written");
    Ok(())
}

fn write_delimited(
    path: &Path,
    delimiter: u8,
    dimensions: &[String],
    result: &FetchResult,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)?;

    writer.write_record(header(dimensions))?;
    for row in result.rows() {
        writer.write_record(record(dimensions, row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a flat listing (sites, sitemaps, traffic); CSV/TSV columns follow
/// the field names.
pub fn write_listing<T: Serialize>(path: &Path, format: ExportFormat, items: &[T]) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let file = std::fs::File::create(path)?;
            serde_json::to_writer_pretty(std::io::BufWriter::new(file), items)?;
        }
        ExportFormat::Csv | ExportFormat::Tsv => {
            let delimiter = if format == ExportFormat::Tsv { b'\t' } else { b',' };
            let mut writer = csv::WriterBuilder::new()
                .delimiter(delimiter)
                .from_path(path)?;
            for item in items {
                writer.serialize(item)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// `https://www.example.com/blog` -> `www-example-com-blog`
pub fn clean_url(url: Option<&str>) -> String {
    let Some(url) = url else {
        return "query".to_string();
    };

    let mut cleaned = url.to_lowercase();
    for (from, to) in [
        ("https", ""),
        ("http", ""),
        (":", ""),
        ("sc-domain", ""),
        ("//", ""),
        ("/", "-"),
        (".", "-"),
        (",", "-"),
    ] {
        cleaned = cleaned.replace(from, to);
    }
    while cleaned.contains("--") {
        cleaned = cleaned.replace("--", "-");
    }

    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "query".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Fresh output path in `dir` named after the site, command and time.
pub fn output_path(
    dir: &Path,
    url: Option<&str>,
    command: &str,
    format: ExportFormat,
    now: DateTime<Local>,
) -> PathBuf {
    let site = clean_url(url);
    let stamp = now.format("%d-%B-%Y-%H-%M");
    let ext = format.extension();

    let path = dir.join(format!("{}-{}-{}.{}", site, command, stamp, ext));
    if !path.exists() {
        return path;
    }

    (1..)
        .map(|n| dir.join(format!("{}-{}-report-{}-{}.{}", site, command, n, stamp, ext)))
        .find(|p| !p.exists())
        .unwrap_or(path)
}
