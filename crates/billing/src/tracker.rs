//! The batch state tracker: lifecycle orchestration and operation guards.
//!
//! Owns every piece of mutable billing state — active dataset, current batch,
//! staleness, selection — and is handed explicitly to anything that reads or
//! mutates it. Lifecycle: `Empty → Loaded → Generated`, cycling indefinitely
//! as the operator repeats the workflow for successive periods.

use chrono::{DateTime, Utc};
use serde::Serialize;

use posbill_core::{BillingError, BillingPeriod, BillingResult};

use crate::batch::{Batch, InvoiceArtifact};
use crate::dataset::{self, BillingRecord, Dataset, DatasetSummary};
use crate::dispatch::{self, OutboundEmail};
use crate::render::InvoiceRenderer;
use crate::selection::SelectionSet;

/// Observable lifecycle state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    /// No dataset uploaded yet.
    Empty,
    /// Dataset present; no batch, or the batch predates the dataset.
    Loaded,
    /// Current batch is valid and fresh; distribution is allowed.
    Generated,
}

/// Best-effort status snapshot for the polling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub state: BatchState,
    pub total_invoices: usize,
    pub total_size_bytes: u64,
    pub last_generated: Option<DateTime<Utc>>,
}

/// Orchestrator for the invoice batch lifecycle.
#[derive(Debug, Default)]
pub struct BatchTracker {
    dataset: Option<Dataset>,
    batch: Option<Batch>,
    /// Set when an upload supersedes the batch; cleared by regeneration.
    batch_stale: bool,
    selection: SelectionSet,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> BatchState {
        match (&self.dataset, &self.batch) {
            (None, _) => BatchState::Empty,
            (Some(_), Some(_)) if !self.batch_stale => BatchState::Generated,
            (Some(_), _) => BatchState::Loaded,
        }
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// The batch distribution operates on, if fresh.
    fn current_batch(&self) -> BillingResult<&Batch> {
        match (&self.batch, self.batch_stale) {
            (Some(batch), false) => Ok(batch),
            _ => Err(BillingError::NoBatch),
        }
    }

    // ---- ingestion ----

    /// Validate an upload and atomically replace the active dataset.
    ///
    /// Success supersedes any current batch: the prior batch is marked stale
    /// and distribution stays disallowed until regeneration. Failure leaves
    /// every field untouched.
    pub fn ingest(
        &mut self,
        filename: &str,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> BillingResult<DatasetSummary> {
        let dataset = dataset::ingest(filename, bytes, now)?;
        let summary = dataset.summary();

        self.dataset = Some(dataset);
        if self.batch.is_some() {
            tracing::info!("new dataset supersedes current batch; regeneration required");
            self.batch_stale = true;
        }
        Ok(summary)
    }

    // ---- generation ----

    /// Check the generation preconditions and snapshot the work to do:
    /// one `(integrator, records)` entry per distinct integrator.
    ///
    /// `confirmed` is the operator-confirmation precondition: the calling
    /// layer must have affirmed intent for this exact period. The snapshot
    /// owns its rows so rendering can run without holding the tracker.
    pub fn generation_plan(
        &self,
        confirmed: bool,
    ) -> BillingResult<Vec<(String, Vec<BillingRecord>)>> {
        if !confirmed {
            return Err(BillingError::ConfirmationRequired);
        }
        let dataset = self.dataset.as_ref().ok_or(BillingError::NoDataset)?;
        Ok(dataset
            .integrators()
            .into_iter()
            .map(|integrator| {
                let records = dataset
                    .records_for(integrator)
                    .into_iter()
                    .cloned()
                    .collect();
                (integrator.to_string(), records)
            })
            .collect())
    }

    /// Install a rendered batch as current: clears staleness and resets the
    /// selection, since none of the old filenames resolve anymore.
    pub fn install_batch(&mut self, batch: Batch) {
        tracing::info!(period = %batch.period(), count = batch.len(), "batch generated");
        self.batch = Some(batch);
        self.batch_stale = false;
        self.selection.clear();
    }

    /// Generate one artifact per distinct integrator in the dataset.
    ///
    /// Any renderer failure discards the whole run and keeps the previous
    /// batch current. Composes [`Self::generation_plan`], [`render_batch`]
    /// and [`Self::install_batch`]; callers that need the render off-thread
    /// use the pieces directly.
    pub fn generate(
        &mut self,
        period: BillingPeriod,
        confirmed: bool,
        renderer: &dyn InvoiceRenderer,
        now: DateTime<Utc>,
    ) -> BillingResult<&Batch> {
        let plan = self.generation_plan(confirmed)?;
        let batch = render_batch(renderer, &plan, period, now)?;
        self.install_batch(batch);
        self.current_batch()
    }

    // ---- selection ----

    /// Select a filename for distribution. No-op unless it resolves into the
    /// current fresh batch — the contract must not crash on a stale name.
    pub fn select(&mut self, filename: &str) {
        let in_batch = self
            .current_batch()
            .map(|b| b.contains(filename))
            .unwrap_or(false);
        if in_batch {
            self.selection.insert(filename);
        }
    }

    pub fn deselect(&mut self, filename: &str) {
        self.selection.remove(filename);
    }

    pub fn select_all(&mut self) {
        let filenames: Vec<String> = match self.current_batch() {
            Ok(batch) => batch.filenames().map(str::to_string).collect(),
            Err(_) => return,
        };
        for filename in filenames {
            self.selection.insert(filename);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    // ---- distribution ----

    /// ZIP archive of every current-batch artifact.
    pub fn download_all(&self) -> BillingResult<Vec<u8>> {
        dispatch::archive_batch(self.current_batch()?)
    }

    /// Resolve one artifact for preview or single download.
    pub fn artifact(&self, filename: &str) -> BillingResult<&InvoiceArtifact> {
        self.current_batch()?
            .artifact(filename)
            .ok_or_else(|| BillingError::unknown_artifact(filename))
    }

    /// Validate an email request and assemble the outbound message.
    ///
    /// Pure validation + assembly; the transport call and the post-success
    /// selection reset happen in the calling layer so a failed send leaves the
    /// selection intact for retry.
    pub fn prepare_email(
        &self,
        recipient: &str,
        filenames: &[String],
    ) -> BillingResult<OutboundEmail> {
        dispatch::validate_recipient(recipient)?;
        if filenames.is_empty() {
            return Err(BillingError::EmptySelection);
        }
        let batch = self.current_batch()?;

        let mut attachments = Vec::with_capacity(filenames.len());
        for filename in filenames {
            let artifact = batch
                .artifact(filename)
                .ok_or_else(|| BillingError::unknown_artifact(filename))?;
            attachments.push((artifact.filename().to_string(), artifact.bytes().to_vec()));
        }

        let period = batch.period();
        Ok(OutboundEmail {
            recipient: recipient.trim().to_string(),
            subject: format!("POS Integration Invoices - {period}"),
            body: format!(
                "Please find attached the POS integration invoices for {period}.\n\n\
                 Total invoices: {}\n",
                attachments.len()
            ),
            attachments,
        })
    }

    /// Record a successful dispatch: the selection resets unconditionally.
    pub fn confirm_dispatch(&mut self) {
        self.selection.clear();
    }

    // ---- observation ----

    pub fn stats(&self) -> BatchStats {
        // Best-effort: a stale batch still counts toward totals, mirroring
        // what is sitting in the invoices folder.
        let (total_invoices, total_size_bytes) = match &self.batch {
            Some(batch) => (batch.len(), batch.total_size_bytes()),
            None => (0, 0),
        };
        BatchStats {
            state: self.state(),
            total_invoices,
            total_size_bytes,
            last_generated: self.batch.as_ref().map(|b| b.generated_at()),
        }
    }
}

/// Render every planned integrator into a [`Batch`].
///
/// All-or-nothing: any failure discards the artifacts rendered so far and
/// reports both sides in `PartialGeneration`.
pub fn render_batch(
    renderer: &dyn InvoiceRenderer,
    plan: &[(String, Vec<BillingRecord>)],
    period: BillingPeriod,
    now: DateTime<Utc>,
) -> BillingResult<Batch> {
    let mut artifacts = Vec::with_capacity(plan.len());
    let mut failed = Vec::new();
    for (integrator, records) in plan {
        let refs: Vec<&BillingRecord> = records.iter().collect();
        match renderer.render(integrator, &refs, period) {
            Ok(bytes) => {
                artifacts.push(InvoiceArtifact::new(integrator.as_str(), period, now, bytes));
            }
            Err(e) => {
                tracing::warn!(integrator, error = %e, "invoice render failed");
                failed.push((integrator.clone(), e.0));
            }
        }
    }

    if !failed.is_empty() {
        let succeeded = artifacts
            .into_iter()
            .map(|a| a.integrator().to_string())
            .collect();
        return Err(BillingError::PartialGeneration { succeeded, failed });
    }
    Ok(Batch::new(period, artifacts, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::sample_csv;
    use crate::render::{MinimalPdfRenderer, RenderError};
    use posbill_core::Month;

    fn period(month: Month) -> BillingPeriod {
        BillingPeriod::new(month, 2025).unwrap()
    }

    fn loaded_tracker() -> BatchTracker {
        let mut tracker = BatchTracker::new();
        tracker
            .ingest("billing_oct.csv", sample_csv().as_bytes(), Utc::now())
            .unwrap();
        tracker
    }

    fn generated_tracker() -> BatchTracker {
        let mut tracker = loaded_tracker();
        tracker
            .generate(period(Month::October), true, &MinimalPdfRenderer, Utc::now())
            .unwrap();
        tracker
    }

    /// Renderer that fails for one named integrator.
    struct FailFor(&'static str);

    impl InvoiceRenderer for FailFor {
        fn render(
            &self,
            integrator: &str,
            records: &[&crate::dataset::BillingRecord],
            period: BillingPeriod,
        ) -> Result<Vec<u8>, RenderError> {
            if integrator == self.0 {
                Err(RenderError::new("layout engine crashed"))
            } else {
                MinimalPdfRenderer.render(integrator, records, period)
            }
        }
    }

    #[test]
    fn starts_empty_and_ingest_moves_to_loaded() {
        let mut tracker = BatchTracker::new();
        assert_eq!(tracker.state(), BatchState::Empty);

        let summary = tracker
            .ingest("billing_oct.csv", sample_csv().as_bytes(), Utc::now())
            .unwrap();
        assert_eq!(tracker.state(), BatchState::Loaded);
        assert_eq!(summary.integrator_count, 3);
    }

    #[test]
    fn failed_ingest_leaves_state_unchanged() {
        let mut tracker = BatchTracker::new();
        assert!(tracker.ingest("data.txt", b"x", Utc::now()).is_err());
        assert_eq!(tracker.state(), BatchState::Empty);

        let mut tracker = generated_tracker();
        assert!(tracker.ingest("data.txt", b"x", Utc::now()).is_err());
        assert_eq!(tracker.state(), BatchState::Generated);
    }

    #[test]
    fn generate_without_dataset_fails_no_dataset() {
        let mut tracker = BatchTracker::new();
        let err = tracker
            .generate(period(Month::October), true, &MinimalPdfRenderer, Utc::now())
            .unwrap_err();
        assert_eq!(err, BillingError::NoDataset);
        assert_eq!(tracker.state(), BatchState::Empty);
    }

    #[test]
    fn generate_without_confirmation_is_blocked() {
        let mut tracker = loaded_tracker();
        let err = tracker
            .generate(period(Month::October), false, &MinimalPdfRenderer, Utc::now())
            .unwrap_err();
        assert_eq!(err, BillingError::ConfirmationRequired);
        assert_eq!(tracker.state(), BatchState::Loaded);
    }

    #[test]
    fn generate_yields_one_artifact_per_integrator() {
        let tracker = generated_tracker();
        assert_eq!(tracker.state(), BatchState::Generated);

        let stats = tracker.stats();
        assert_eq!(stats.total_invoices, 3);

        // Artifact per distinct integrator in the sample dataset.
        assert!(tracker.artifact("Grubtech_2025_October.pdf").is_ok());
        assert!(tracker.artifact("Limetray_2025_October.pdf").is_ok());
        assert!(tracker.artifact("Urban_Piper_2025_October.pdf").is_ok());
    }

    #[test]
    fn partial_failure_discards_run_and_keeps_prior_batch() {
        let mut tracker = generated_tracker();
        tracker.select("Grubtech_2025_October.pdf");

        let err = tracker
            .generate(period(Month::November), true, &FailFor("Limetray"), Utc::now())
            .unwrap_err();
        match err {
            BillingError::PartialGeneration { succeeded, failed } => {
                assert_eq!(
                    succeeded,
                    vec!["Grubtech".to_string(), "Urban Piper".to_string()]
                );
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, "Limetray");
            }
            other => panic!("expected PartialGeneration, got {other:?}"),
        }

        // Previous batch still current and distributable; selection intact.
        assert_eq!(tracker.state(), BatchState::Generated);
        assert!(tracker.artifact("Grubtech_2025_October.pdf").is_ok());
        assert!(tracker.selection().contains("Grubtech_2025_October.pdf"));
    }

    #[test]
    fn regeneration_replaces_batch_and_clears_selection() {
        let mut tracker = generated_tracker();
        tracker.select_all();
        assert_eq!(tracker.selection().len(), 3);

        tracker
            .generate(period(Month::November), true, &MinimalPdfRenderer, Utc::now())
            .unwrap();
        assert_eq!(tracker.state(), BatchState::Generated);
        assert!(tracker.selection().is_empty());

        // Old filenames no longer resolve.
        assert_eq!(
            tracker.artifact("Grubtech_2025_October.pdf").unwrap_err(),
            BillingError::unknown_artifact("Grubtech_2025_October.pdf")
        );
        assert!(tracker.artifact("Grubtech_2025_November.pdf").is_ok());
    }

    #[test]
    fn ingest_marks_batch_stale_and_blocks_distribution() {
        let mut tracker = generated_tracker();
        tracker
            .ingest("billing_nov.csv", sample_csv().as_bytes(), Utc::now())
            .unwrap();

        assert_eq!(tracker.state(), BatchState::Loaded);
        assert_eq!(tracker.download_all().unwrap_err(), BillingError::NoBatch);
        assert_eq!(
            tracker.artifact("Grubtech_2025_October.pdf").unwrap_err(),
            BillingError::NoBatch
        );
        assert_eq!(
            tracker
                .prepare_email("ops@example.com", &["Grubtech_2025_October.pdf".to_string()])
                .unwrap_err(),
            BillingError::NoBatch
        );
    }

    #[test]
    fn selection_is_a_noop_outside_generated() {
        let mut tracker = loaded_tracker();
        tracker.select("anything.pdf");
        tracker.select_all();
        assert!(tracker.selection().is_empty());
    }

    #[test]
    fn selecting_unknown_filename_is_a_noop() {
        let mut tracker = generated_tracker();
        tracker.select("not_in_batch.pdf");
        assert!(tracker.selection().is_empty());

        tracker.select("Grubtech_2025_October.pdf");
        tracker.deselect("not_in_batch.pdf");
        assert_eq!(tracker.selection().len(), 1);
    }

    #[test]
    fn distribution_fails_no_batch_in_empty_and_loaded() {
        for tracker in [BatchTracker::new(), loaded_tracker()] {
            assert_eq!(tracker.download_all().unwrap_err(), BillingError::NoBatch);
            assert_eq!(tracker.artifact("x.pdf").unwrap_err(), BillingError::NoBatch);
        }
    }

    #[test]
    fn email_empty_selection_fails_before_batch_guard() {
        // EmptySelection wins over NoBatch in every state.
        let tracker = BatchTracker::new();
        assert_eq!(
            tracker.prepare_email("ops@example.com", &[]).unwrap_err(),
            BillingError::EmptySelection
        );

        let tracker = generated_tracker();
        assert_eq!(
            tracker.prepare_email("ops@example.com", &[]).unwrap_err(),
            BillingError::EmptySelection
        );
    }

    #[test]
    fn email_rejects_malformed_recipient_first() {
        let tracker = generated_tracker();
        let err = tracker.prepare_email("not-an-address", &[]).unwrap_err();
        assert!(matches!(err, BillingError::InvalidRecipient(_)));
    }

    #[test]
    fn email_rejects_unknown_artifact() {
        let tracker = generated_tracker();
        let err = tracker
            .prepare_email(
                "ops@example.com",
                &["Deliverect_2025_October.pdf".to_string()],
            )
            .unwrap_err();
        assert_eq!(err, BillingError::unknown_artifact("Deliverect_2025_October.pdf"));
    }

    #[test]
    fn prepared_email_carries_period_and_attachments() {
        let tracker = generated_tracker();
        let email = tracker
            .prepare_email(
                "ops@example.com",
                &[
                    "Grubtech_2025_October.pdf".to_string(),
                    "Limetray_2025_October.pdf".to_string(),
                ],
            )
            .unwrap();

        assert_eq!(email.recipient, "ops@example.com");
        assert!(email.subject.contains("October 2025"));
        assert!(email.body.contains("Total invoices: 2"));
        assert_eq!(email.attachments.len(), 2);
    }

    #[test]
    fn confirm_dispatch_clears_selection() {
        let mut tracker = generated_tracker();
        tracker.select_all();
        assert!(!tracker.selection().is_empty());
        tracker.confirm_dispatch();
        assert!(tracker.selection().is_empty());
    }

    #[test]
    fn full_lifecycle_scenario() {
        // upload billing_oct.csv (3 integrators) -> Loaded
        let mut tracker = BatchTracker::new();
        tracker
            .ingest("billing_oct.csv", sample_csv().as_bytes(), Utc::now())
            .unwrap();
        assert_eq!(tracker.state(), BatchState::Loaded);

        // generate for (October, 2025) -> 3 artifacts, Generated
        let batch = tracker
            .generate(period(Month::October), true, &MinimalPdfRenderer, Utc::now())
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(tracker.state(), BatchState::Generated);

        // select 2 of 3, email -> success clears selection
        tracker.select("Grubtech_2025_October.pdf");
        tracker.select("Limetray_2025_October.pdf");
        let email = tracker
            .prepare_email("ops@example.com", &tracker.selection().to_vec())
            .unwrap();
        assert_eq!(email.attachments.len(), 2);
        tracker.confirm_dispatch();
        assert!(tracker.selection().is_empty());

        // preview the 3rd artifact
        let artifact = tracker.artifact("Urban_Piper_2025_October.pdf").unwrap();
        assert!(artifact.bytes().starts_with(b"%PDF"));

        // upload billing_nov.csv -> Loaded; download-all now fails NoBatch
        tracker
            .ingest("billing_nov.csv", sample_csv().as_bytes(), Utc::now())
            .unwrap();
        assert_eq!(tracker.state(), BatchState::Loaded);
        assert_eq!(tracker.download_all().unwrap_err(), BillingError::NoBatch);
    }

    #[test]
    fn stats_report_current_batch_totals() {
        let tracker = BatchTracker::new();
        let stats = tracker.stats();
        assert_eq!(stats.state, BatchState::Empty);
        assert_eq!(stats.total_invoices, 0);
        assert!(stats.last_generated.is_none());

        let tracker = generated_tracker();
        let stats = tracker.stats();
        assert_eq!(stats.state, BatchState::Generated);
        assert_eq!(stats.total_invoices, 3);
        assert!(stats.total_size_bytes > 0);
        assert!(stats.last_generated.is_some());
    }
}
