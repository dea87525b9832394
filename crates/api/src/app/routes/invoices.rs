use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use posbill_core::{BillingPeriod, Month};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn upload_csv(
    Extension(services): Extension<Arc<AppServices>>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let mut file: Option<(String, Vec<u8>)> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return errors::failure(
                    StatusCode::BAD_REQUEST,
                    format!("unreadable multipart body: {e}"),
                )
            }
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => file = Some((filename, bytes.to_vec())),
            Err(e) => {
                return errors::failure(
                    StatusCode::BAD_REQUEST,
                    format!("failed to read upload: {e}"),
                )
            }
        }
    }

    let Some((filename, bytes)) = file else {
        return errors::failure(StatusCode::BAD_REQUEST, "no file provided");
    };

    match services.upload(&filename, &bytes).await {
        Ok(summary) => errors::success(dto::upload_message(&summary)),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn generate(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::GenerateRequest>,
) -> axum::response::Response {
    let month: Month = match body.month.parse() {
        Ok(m) => m,
        Err(e) => return errors::billing_error_to_response(e),
    };
    let period = match BillingPeriod::new(month, body.year) {
        Ok(p) => p,
        Err(e) => return errors::billing_error_to_response(e),
    };

    match services.generate(period, body.confirm).await {
        Ok(count) => errors::success_with(
            format!("Generated {count} invoices for {period}"),
            serde_json::json!({ "count": count }),
        ),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn download_all(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.download_all().await {
        Ok((archive_name, bytes)) => (
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{archive_name}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn download_one(
    Extension(services): Extension<Arc<AppServices>>,
    Path(filename): Path<String>,
) -> axum::response::Response {
    artifact_response(&services, &filename, true).await
}

pub async fn preview(
    Extension(services): Extension<Arc<AppServices>>,
    Path(filename): Path<String>,
) -> axum::response::Response {
    artifact_response(&services, &filename, false).await
}

async fn artifact_response(
    services: &AppServices,
    filename: &str,
    as_attachment: bool,
) -> axum::response::Response {
    match services.artifact(filename).await {
        Ok((name, bytes)) => {
            let disposition = if as_attachment {
                format!("attachment; filename=\"{name}\"")
            } else {
                "inline".to_string()
            };
            (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => errors::billing_error_to_response(e),
    }
}

pub async fn email(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::EmailRequest>,
) -> axum::response::Response {
    match services.email(&body.recipient, &body.filenames).await {
        Ok(report) => errors::success(format!(
            "Sent {} invoice(s) to {}",
            report.sent, report.recipient
        )),
        Err(e) => errors::billing_error_to_response(e),
    }
}
