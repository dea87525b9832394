//! `posbill-billing` — the invoice batch lifecycle domain.
//!
//! The [`tracker::BatchTracker`] owns all mutable billing state (active
//! dataset, current batch, selection) and guards which operations are valid in
//! which lifecycle state. Rendering and email transport are external
//! collaborators behind the [`render::InvoiceRenderer`] and
//! [`dispatch::Mailer`] seams.

pub mod batch;
pub mod dataset;
pub mod dispatch;
pub mod render;
pub mod selection;
pub mod tracker;

pub use batch::{Batch, InvoiceArtifact};
pub use dataset::{BillingRecord, Dataset, DatasetSummary};
pub use dispatch::{DispatchReport, Mailer, MailerError, OutboundEmail, RecordingMailer};
pub use render::{InvoiceRenderer, MinimalPdfRenderer, RenderError};
pub use selection::SelectionSet;
pub use tracker::{render_batch, BatchState, BatchStats, BatchTracker};
