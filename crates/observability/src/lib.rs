//! `posbill-observability` — process-wide logging/tracing setup.

pub mod tracing;

pub use crate::tracing::init;
