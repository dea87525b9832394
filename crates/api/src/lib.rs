//! `posbill-api` — HTTP surface for the POS billing dashboard backend.

pub mod app;
