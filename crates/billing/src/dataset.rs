//! Uploaded billing data: validation, parsing, and the active dataset.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use posbill_core::{BillingError, BillingResult};

/// One usable row of the uploaded CSV, already column-mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub integrator: String,
    pub vendor_code: String,
    pub branch_name: String,
    pub entity_id: String,
}

/// The parsed billing data for one period.
///
/// Owned exclusively by the `BatchTracker`; replaced wholesale on every
/// successful upload (no merge semantics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    filename: String,
    records: Vec<BillingRecord>,
    ingested_at: DateTime<Utc>,
}

impl Dataset {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn records(&self) -> &[BillingRecord] {
        &self.records
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }

    /// Distinct integrator names, in stable sorted order.
    pub fn integrators(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.integrator.as_str()).collect()
    }

    /// Rows belonging to one integrator, in upload order.
    pub fn records_for(&self, integrator: &str) -> Vec<&BillingRecord> {
        self.records
            .iter()
            .filter(|r| r.integrator == integrator)
            .collect()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            filename: self.filename.clone(),
            row_count: self.row_count(),
            integrator_count: self.integrators().len(),
            ingested_at: self.ingested_at,
        }
    }
}

/// Human-readable ingest outcome returned to the caller for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub filename: String,
    pub row_count: usize,
    pub integrator_count: usize,
    pub ingested_at: DateTime<Utc>,
}

const INTEGRATOR_COLUMN: &str = "Integration Name";
const VENDOR_COLUMN: &str = "vendor_code";
const BRANCH_COLUMN: &str = "Branch Name";
const ENTITY_COLUMN: &str = "Entity ID";

/// Validate and parse an uploaded file into a [`Dataset`].
///
/// Rejects anything that does not identify as CSV (name or content), and
/// uploads with no usable rows. Rows with a blank integrator name are dropped.
pub fn ingest(filename: &str, bytes: &[u8], now: DateTime<Utc>) -> BillingResult<Dataset> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(BillingError::invalid_format("no file selected"));
    }
    if !trimmed.to_ascii_lowercase().ends_with(".csv") {
        return Err(BillingError::invalid_format("file must be a CSV"));
    }
    if bytes.is_empty() {
        return Err(BillingError::invalid_format("uploaded file is empty"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| BillingError::invalid_format(format!("unreadable CSV header: {e}")))?
        .clone();

    let col = |name: &str| -> Option<usize> {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    };

    let integrator_col = col(INTEGRATOR_COLUMN);
    let vendor_col = col(VENDOR_COLUMN);
    let branch_col = col(BRANCH_COLUMN);
    let entity_col = col(ENTITY_COLUMN);

    let field = |record: &csv::StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| record.get(i))
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| BillingError::invalid_format(format!("malformed CSV row: {e}")))?;
        let integrator = field(&row, integrator_col);
        if integrator.is_empty() {
            continue;
        }
        records.push(BillingRecord {
            integrator,
            vendor_code: field(&row, vendor_col),
            branch_name: field(&row, branch_col),
            entity_id: field(&row, entity_col),
        });
    }

    if records.is_empty() {
        return Err(BillingError::invalid_format(
            "no usable rows (every row is missing an integrator name)",
        ));
    }

    tracing::info!(
        filename = trimmed,
        rows = records.len(),
        "dataset ingested"
    );

    Ok(Dataset {
        filename: trimmed.to_string(),
        records,
        ingested_at: now,
    })
}

#[cfg(test)]
pub(crate) fn sample_csv() -> &'static str {
    "Entity ID,vendor_code,Branch Name,Integration Name\n\
     TB_AE,V1,Downtown,Grubtech\n\
     TB_AE,V2,Marina,Grubtech\n\
     TB_KW,V3,City Center,Limetray\n\
     TB_QA,V4,West Bay,Urban Piper\n\
     TB_QA,V5,Pearl,\n"
}
