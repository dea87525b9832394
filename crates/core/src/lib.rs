//! `posbill-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod period;

pub use error::{BillingError, BillingResult};
pub use period::{BillingPeriod, Month};
