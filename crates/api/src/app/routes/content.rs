use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use marquee_core::ContentId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_content).post(create_content))
        .route("/:id", get(get_content))
}

pub async fn create_content(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateContentRequest>,
) -> axum::response::Response {
    let new = match body.into_new() {
        Ok(n) => n,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.create_content(new).await {
        Ok(content) => (StatusCode::CREATED, Json(content)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_content(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ContentId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.contents.get(id).await {
        Ok(Some(content)) => Json(content).into_response(),
        Ok(None) => errors::not_found(format!("content {id} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_content(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.contents.list().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
