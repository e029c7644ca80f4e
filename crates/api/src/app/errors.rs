use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use marquee_core::DomainError;
use marquee_infra::StoreError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
    }
}

/// Local store failures are the only errors a read endpoint surfaces.
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    tracing::error!(error = %err, "local store failure");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
}

pub fn not_found(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_client_errors() {
        let resp = domain_error_to_response(DomainError::validation("title must not be blank"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = domain_error_to_response(DomainError::invalid_id("abc"));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
