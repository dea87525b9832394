//! HTTP API application wiring (Axum router + service wiring).
//!
//! Folder layout:
//! - `services.rs`: service state (tracker behind a single-flight guard,
//!   renderer/mailer collaborators, stats poller)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request DTOs and JSON mapping helpers
//! - `errors.rs`: the uniform `{success, ...}` response envelope

use std::sync::Arc;

use axum::{Extension, Router};

use posbill_billing::{Mailer, MinimalPdfRenderer, RecordingMailer};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppConfig, AppServices};

/// Build the full HTTP router with default wiring (public entrypoint used by
/// `main.rs`). The built-in renderer and a recording mail transport are used;
/// a deployment wires real collaborators through [`build_app_with`].
pub fn build_app() -> Router {
    build_app_with(
        AppConfig::from_env(),
        Arc::new(MinimalPdfRenderer),
        Arc::new(RecordingMailer::new()),
    )
}

/// Build the router with explicit collaborators (tests inject their own).
pub fn build_app_with(
    config: AppConfig,
    renderer: Arc<dyn posbill_billing::InvoiceRenderer>,
    mailer: Arc<dyn Mailer>,
) -> Router {
    let services = Arc::new(AppServices::new(config, renderer, mailer));
    services::spawn_stats_poller(services.clone());
    if services.config().auto_generate {
        services::spawn_generation_scheduler(services.clone());
    }

    routes::router().layer(Extension(services))
}
