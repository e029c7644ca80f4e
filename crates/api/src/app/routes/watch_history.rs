use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use marquee_core::VisitorId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/api/watch", post(record_watch))
        .route("/api/history/:visitor_id", get(history))
}

pub async fn record_watch(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RecordWatchRequest>,
) -> axum::response::Response {
    let new = match body.into_new() {
        Ok(n) => n,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.record_watch(new).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Watch records for one visitor, newest first, joined with catalog data.
pub async fn history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(visitor_id): Path<String>,
) -> axum::response::Response {
    let visitor = match VisitorId::parse(visitor_id) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.watch_history.history(&visitor).await {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
