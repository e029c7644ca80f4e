use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, RawQuery},
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
        .route("/", get(list_entries).post(create_entry))
        .route("/batch", get(batch))
        .route("/:id", get(get_entry))
}

pub async fn create_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateCatalogEntryRequest>,
) -> axum::response::Response {
    let new = match body.into_new() {
        Ok(n) => n,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.create_catalog_entry(new).await {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ContentId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.get(id).await {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => errors::not_found(format!("catalog entry {id} not found")),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_entries(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.catalog.list().await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `GET /api/catalog/batch?ids=1,2` (unknown ids are omitted).
pub async fn batch(
    Extension(services): Extension<Arc<AppServices>>,
    RawQuery(query): RawQuery,
) -> axum::response::Response {
    let ids: BTreeSet<ContentId> = match dto::parse_batch_ids(query.as_deref()) {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => return errors::domain_error_to_response(e),
    };
    if ids.is_empty() {
        return Json(Vec::<marquee_core::CatalogEntry>::new()).into_response();
    }

    match services.catalog.find_by_ids(&ids).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
