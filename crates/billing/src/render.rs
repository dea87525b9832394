//! Invoice document rendering seam.
//!
//! The PDF layout engine is an external collaborator: the core only needs one
//! rendered document per integrator, or a failure. [`MinimalPdfRenderer`] is
//! the built-in implementation used by the default wiring and tests; a richer
//! layout engine plugs in behind the same trait.

use thiserror::Error;

use posbill_core::BillingPeriod;

use crate::dataset::BillingRecord;

/// Failure reported by a rendering collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("render failed: {0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Renders one invoice document for one integrator.
pub trait InvoiceRenderer: Send + Sync {
    fn render(
        &self,
        integrator: &str,
        records: &[&BillingRecord],
        period: BillingPeriod,
    ) -> Result<Vec<u8>, RenderError>;
}

/// Built-in renderer: a single-page PDF listing the billed branches.
///
/// Deliberately layout-free; it exists so the system is usable end to end
/// without an external layout engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinimalPdfRenderer;

impl InvoiceRenderer for MinimalPdfRenderer {
    fn render(
        &self,
        integrator: &str,
        records: &[&BillingRecord],
        period: BillingPeriod,
    ) -> Result<Vec<u8>, RenderError> {
        if records.is_empty() {
            return Err(RenderError::new(format!(
                "no billing records for {integrator}"
            )));
        }

        let mut lines = vec![
            "MONTHLY INTEGRATION INVOICE".to_string(),
            format!("Integrator: {integrator}"),
            format!("Billing Period: {period}"),
            format!("Branches: {}", records.len()),
            String::new(),
        ];
        for record in records {
            lines.push(format!(
                "{}  {}  {}",
                record.vendor_code, record.branch_name, record.entity_id
            ));
        }

        Ok(build_pdf(&lines))
    }
}

/// Assemble a one-page PDF with the given text lines.
fn build_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 11 Tf\n72 740 Td\n14 TL\n");
    for line in lines {
        let escaped = line
            .replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)");
        content.push_str(&format!("({escaped}) Tj\nT*\n"));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_start = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_start
    ));

    out.into_bytes()
}
