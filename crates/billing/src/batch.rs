//! Generated invoice artifacts and the batch that groups them.

use chrono::{DateTime, Utc};

use posbill_core::BillingPeriod;

/// One generated invoice document.
///
/// Identified downstream solely by `filename`; immutable once created and
/// superseded (never merged) by the next full generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceArtifact {
    filename: String,
    integrator: String,
    generated_at: DateTime<Utc>,
    bytes: Vec<u8>,
}

impl InvoiceArtifact {
    pub fn new(
        integrator: impl Into<String>,
        period: BillingPeriod,
        generated_at: DateTime<Utc>,
        bytes: Vec<u8>,
    ) -> Self {
        let integrator = integrator.into();
        let filename = artifact_filename(&integrator, period);
        Self {
            filename,
            integrator,
            generated_at,
            bytes,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn integrator(&self) -> &str {
        &self.integrator
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Stable artifact filename: `<Integrator_Name>_<year>_<Month>.pdf`.
pub fn artifact_filename(integrator: &str, period: BillingPeriod) -> String {
    format!(
        "{}_{}_{}.pdf",
        integrator.replace(' ', "_"),
        period.year,
        period.month
    )
}

/// The complete set of artifacts produced by one generation run.
///
/// At most one batch is "current" at a time; the tracker decides currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    period: BillingPeriod,
    artifacts: Vec<InvoiceArtifact>,
    generated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(
        period: BillingPeriod,
        artifacts: Vec<InvoiceArtifact>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            period,
            artifacts,
            generated_at,
        }
    }

    pub fn period(&self) -> BillingPeriod {
        self.period
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn artifacts(&self) -> &[InvoiceArtifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn artifact(&self, filename: &str) -> Option<&InvoiceArtifact> {
        self.artifacts.iter().find(|a| a.filename() == filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.artifact(filename).is_some()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.artifacts.iter().map(|a| a.filename())
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posbill_core::Month;

    fn period() -> BillingPeriod {
        BillingPeriod::new(Month::October, 2025).unwrap()
    }

    #[test]
    fn artifact_filename_replaces_spaces() {
        assert_eq!(
            artifact_filename("Urban Piper", period()),
            "Urban_Piper_2025_October.pdf"
        );
    }

    #[test]
    fn batch_lookup_by_filename() {
        let now = Utc::now();
        let a = InvoiceArtifact::new("Grubtech", period(), now, vec![1, 2, 3]);
        let b = InvoiceArtifact::new("Limetray", period(), now, vec![4, 5]);
        let batch = Batch::new(period(), vec![a, b], now);

        assert_eq!(batch.len(), 2);
        assert!(batch.contains("Grubtech_2025_October.pdf"));
        assert!(!batch.contains("Deliverect_2025_October.pdf"));
        assert_eq!(batch.total_size_bytes(), 5);
        assert_eq!(
            batch
                .artifact("Limetray_2025_October.pdf")
                .unwrap()
                .integrator(),
            "Limetray"
        );
    }
}
