//! The uniform response envelope: `{success:true, message}` on success,
//! `{success:false, error}` with a non-2xx status on failure.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use posbill_core::BillingError;

pub fn success(message: impl Into<String>) -> axum::response::Response {
    success_with(message, json!({}))
}

/// Success envelope with extra top-level fields merged in.
pub fn success_with(
    message: impl Into<String>,
    extra: serde_json::Value,
) -> axum::response::Response {
    let mut body = json!({
        "success": true,
        "message": message.into(),
    });
    if let (Some(body_map), serde_json::Value::Object(extra_map)) = (body.as_object_mut(), extra) {
        body_map.extend(extra_map);
    }
    (StatusCode::OK, axum::Json(body)).into_response()
}

pub fn failure(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": error.into(),
        })),
    )
        .into_response()
}

pub fn billing_error_to_response(err: BillingError) -> axum::response::Response {
    let status = match &err {
        BillingError::InvalidFormat(_)
        | BillingError::NoDataset
        | BillingError::EmptySelection
        | BillingError::InvalidRecipient(_)
        | BillingError::ConfirmationRequired => StatusCode::BAD_REQUEST,
        BillingError::NoBatch | BillingError::UnknownArtifact(_) => StatusCode::NOT_FOUND,
        BillingError::Busy => StatusCode::CONFLICT,
        BillingError::PartialGeneration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        BillingError::Dispatch(_) => StatusCode::BAD_GATEWAY,
        BillingError::Timeout => StatusCode::GATEWAY_TIMEOUT,
    };

    // Partial failures carry the per-integrator detail the operator needs to
    // retry.
    let message = match &err {
        BillingError::PartialGeneration { failed, .. } => {
            let names: Vec<&str> = failed.iter().map(|(name, _)| name.as_str()).collect();
            format!("{err} (failed: {})", names.join(", "))
        }
        _ => err.to_string(),
    };

    failure(status, message)
}
