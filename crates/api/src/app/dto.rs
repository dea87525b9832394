//! Request DTOs and JSON mapping helpers.

use serde::Deserialize;

use posbill_billing::{BatchStats, DatasetSummary};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub month: String,
    pub year: u16,
    /// Operator confirmation for this exact period; defaults to false so an
    /// unconfirmed call can never trigger generation.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub recipient: String,
    #[serde(default)]
    pub filenames: Vec<String>,
}

pub fn upload_message(summary: &DatasetSummary) -> String {
    format!(
        "CSV file uploaded successfully: {} ({} rows, {} integrators)",
        summary.filename, summary.row_count, summary.integrator_count
    )
}

pub fn stats_to_json(stats: BatchStats) -> serde_json::Value {
    serde_json::json!({
        "state": stats.state,
        "total_invoices": stats.total_invoices,
        "total_size": format!("{:.2} MB", stats.total_size_bytes as f64 / (1024.0 * 1024.0)),
        "last_generated": stats.last_generated.map(|t| t.to_rfc3339()),
    })
}
