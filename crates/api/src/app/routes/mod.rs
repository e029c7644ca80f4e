use axum::Router;

use crate::config::ServiceRole;

pub mod catalog;
pub mod content;
pub mod recommendations;
pub mod system;
pub mod watch_history;

/// Router for the API areas hosted by `role`.
pub fn router(role: ServiceRole) -> Router {
    let mut router = Router::new();
    if role.hosts(ServiceRole::Content) {
        router = router.nest("/api/content", content::router());
    }
    if role.hosts(ServiceRole::Catalog) {
        router = router.nest("/api/catalog", catalog::router());
    }
    if role.hosts(ServiceRole::WatchHistory) {
        router = router.merge(watch_history::router());
    }
    if role.hosts(ServiceRole::Recommendation) {
        router = router.merge(recommendations::router());
    }
    router
}
