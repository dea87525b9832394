//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type BillingResult<T> = Result<T, BillingError>;

/// Domain-level error.
///
/// Every variant is recoverable by the operator (fix the input and retry);
/// none is fatal to the process. Validation variants are raised before any
/// external call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Uploaded content is not identifiable/parsable as CSV.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// Generation requested with no successful upload on record.
    #[error("no dataset loaded; upload a CSV first")]
    NoDataset,

    /// Distribution requested with no fresh batch to distribute.
    #[error("no generated batch; generate invoices first")]
    NoBatch,

    /// Some integrators rendered and some failed; the run is discarded.
    #[error("partial generation failure: {} succeeded, {} failed", succeeded.len(), failed.len())]
    PartialGeneration {
        succeeded: Vec<String>,
        /// Integrator name paired with the renderer's failure message.
        failed: Vec<(String, String)>,
    },

    /// Email dispatch requested with nothing selected.
    #[error("no invoices selected")]
    EmptySelection,

    /// A filename does not resolve into the current batch.
    #[error("unknown invoice: {0}")]
    UnknownArtifact(String),

    /// Recipient address is syntactically malformed.
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),

    /// Generation invoked without the operator having confirmed intent.
    #[error("generation requires operator confirmation")]
    ConfirmationRequired,

    /// Another operator-triggered operation is still in flight.
    #[error("another operation is in progress")]
    Busy,

    /// Transport/delivery failure reported by the email collaborator.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// A long-running operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,
}

impl BillingError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn unknown_artifact(filename: impl Into<String>) -> Self {
        Self::UnknownArtifact(filename.into())
    }

    pub fn invalid_recipient(addr: impl Into<String>) -> Self {
        Self::InvalidRecipient(addr.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }
}
