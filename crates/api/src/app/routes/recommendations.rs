use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use marquee_core::ContentId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/api/recommendations", get(recommendations))
        .route("/api/recommendations/:content_id", get(recommendation_for))
        .route("/api/content-views", get(content_views))
}

pub async fn recommendations(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.recommendations.recommendations().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn recommendation_for(
    Extension(services): Extension<Arc<AppServices>>,
    Path(content_id): Path<String>,
) -> axum::response::Response {
    let id: ContentId = match content_id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.recommendations.recommendation_for(id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => errors::not_found(format!("no view for content {id}")),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Raw projected rows, for inspecting propagation lag.
pub async fn content_views(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.recommendations.content_views().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
