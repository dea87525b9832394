use axum::{
    routing::{get, post},
    Router,
};

pub mod invoices;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/api/stats", get(system::stats))
        .route("/upload-csv", post(invoices::upload_csv))
        .route("/generate", post(invoices::generate))
        .route("/download-all", get(invoices::download_all))
        .route("/download/:filename", get(invoices::download_one))
        .route("/preview/:filename", get(invoices::preview))
        .route("/email", post(invoices::email))
}
