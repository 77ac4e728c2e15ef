// Leak classification and the CSV artifacts of a run.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use embargo_common::EmbargoCheckResult;

const HEADERS: [&str; 5] = [
    "file",
    "embargo_dates",
    "embargo_active",
    "has_bitstream_links",
    "download_results",
];

/// Split results into (leaks, clean). Input order is kept on both sides.
pub fn classify(
    results: &[EmbargoCheckResult],
) -> (Vec<&EmbargoCheckResult>, Vec<&EmbargoCheckResult>) {
    results.iter().partition(|r| r.is_leak())
}

#[derive(Serialize)]
struct CsvRow<'a> {
    file: &'a str,
    embargo_dates: String,
    embargo_active: bool,
    has_bitstream_links: bool,
    download_results: String,
}

impl<'a> CsvRow<'a> {
    fn from_result(result: &'a EmbargoCheckResult) -> Result<Self> {
        Ok(Self {
            file: result.file_label(),
            embargo_dates: result.joined_dates(),
            embargo_active: result.embargo_active,
            has_bitstream_links: result.has_download_links,
            download_results: serde_json::to_string(&result.probes)
                .context("Failed to serialize probe outcomes")?,
        })
    }
}

/// Write results as CSV. The header row is always written, so an empty
/// leak report is still a valid file.
pub fn write_results<'a, W: Write>(
    writer: W,
    results: impl IntoIterator<Item = &'a EmbargoCheckResult>,
) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv.write_record(HEADERS)?;
    for result in results {
        csv.serialize(CsvRow::from_result(result)?)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_results_csv<'a>(
    path: &Path,
    results: impl IntoIterator<Item = &'a EmbargoCheckResult>,
) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_results(file, results).with_context(|| format!("Failed to write {}", path.display()))
}
