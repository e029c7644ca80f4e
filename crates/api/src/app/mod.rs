//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, bus, publisher, workers and aggregation services
//! - `routes/`: HTTP routes + handlers (one file per service area)
//! - `dto.rs`: request DTOs and query parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// A built application: the router plus the services behind it.
pub struct App {
    pub router: Router,
    pub services: Arc<AppServices>,
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<App> {
    let services = Arc::new(services::build_services(config).await?);

    let router = Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router(config.service))
        .layer(ServiceBuilder::new().layer(Extension(services.clone())));

    Ok(App { router, services })
}
