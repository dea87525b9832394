//! Distribution: bulk-download archives and the email transport seam.

use std::io::{Cursor, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use posbill_core::{BillingError, BillingResult};

use crate::batch::Batch;

/// Failure reported by an email transport collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct MailerError(pub String);

impl MailerError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A fully assembled message handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Attachment filename paired with document bytes.
    pub attachments: Vec<(String, Vec<u8>)>,
}

/// Per-dispatch outcome returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub recipient: String,
    pub sent: usize,
}

/// Email transport seam. The core never learns how delivery works, only
/// whether it succeeded.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailerError>;
}

/// In-memory transport for development and tests: records every message.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("mailer lock poisoned").clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), MailerError> {
        tracing::info!(
            recipient = email.recipient,
            attachments = email.attachments.len(),
            "recording outbound email"
        );
        self.sent.lock().expect("mailer lock poisoned").push(email);
        Ok(())
    }
}

/// Syntactic recipient validation; no network involved.
///
/// Intentionally shallow: one `@`, non-empty local part, dotted domain, no
/// whitespace. Anything smarter belongs to the transport.
pub fn validate_recipient(addr: &str) -> BillingResult<()> {
    let addr = addr.trim();
    let reject = || BillingError::invalid_recipient(addr);

    if addr.is_empty() || addr.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(reject());
    }
    let (local, domain) = addr.split_once('@').ok_or_else(reject)?;
    if local.is_empty() || domain.contains('@') {
        return Err(reject());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(reject)?;
    if host.is_empty() || tld.is_empty() {
        return Err(reject());
    }
    Ok(())
}

/// Archive filename for a bulk download: `invoices_<YYYYMMDD>.zip`.
pub fn archive_filename(now: DateTime<Utc>) -> String {
    format!("invoices_{}.zip", now.format("%Y%m%d"))
}

/// Build an in-memory ZIP archive of every artifact in the batch.
pub fn archive_batch(batch: &Batch) -> BillingResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for artifact in batch.artifacts() {
        writer
            .start_file(artifact.filename(), options)
            .map_err(|e| BillingError::dispatch(format!("archive error: {e}")))?;
        writer
            .write_all(artifact.bytes())
            .map_err(|e| BillingError::dispatch(format!("archive error: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| BillingError::dispatch(format!("archive error: {e}")))?;
    Ok(cursor.into_inner())
}
