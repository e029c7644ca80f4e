use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Router, routing::get};
use marquee_api::app::AppServices;
use marquee_api::config::{AppConfig, PublishMode};
use reqwest::StatusCode;
use serde_json::{Value, json};

struct TestServer {
    base_url: String,
    services: Option<Arc<AppServices>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Spawn the all-in-one app on an ephemeral port.
    ///
    /// Collaborator URLs default to the server itself, as in a single-process deployment.
    async fn spawn(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let mut config = AppConfig::default();
        config.catalog_service_url = base_url.clone();
        config.content_service_url = base_url.clone();
        config.enrichment_timeout = Duration::from_secs(1);
        configure(&mut config);

        let app = marquee_api::app::build_app(&config).await.unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app.router).await.unwrap();
        });

        Self {
            base_url,
            services: Some(app.services),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(services) = self.services.take() {
            services.shutdown();
        }
    }
}

/// Catalog stand-in that counts batch requests and knows no ids.
async fn spawn_counting_catalog() -> (String, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/api/catalog/batch",
        get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                axum::Json(json!([]))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits, handle)
}

async fn post_json(client: &reqwest::Client, url: String, body: Value) -> reqwest::Response {
    client.post(url).json(&body).send().await.unwrap()
}

async fn get_json(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

async fn content_views_eventually(client: &reqwest::Client, srv: &TestServer, count: usize) -> Vec<Value> {
    // Propagation is asynchronous: poll until the projection catches up.
    for _ in 0..200 {
        let (_, body) = get_json(client, srv.url("/api/content-views")).await;
        if let Some(items) = body.as_array() {
            if items.len() >= count {
                return items.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("content views did not reach {count} rows within timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_is_up() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, srv.url("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn created_content_is_projected_into_content_views() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    let res = post_json(
        &client,
        srv.url("/api/content"),
        json!({"title": "Inception", "type": "MOVIE"}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["id"], 1);
    assert_eq!(created["type"], "MOVIE");

    let views = content_views_eventually(&client, &srv, 1).await;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["contentId"], 1);
    assert_eq!(views[0]["contentTitle"], "Inception");
    assert_eq!(views[0]["contentType"], "MOVIE");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recommendations_without_views_is_an_empty_list() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, srv.url("/api/recommendations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recommendations_join_catalog_fields() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    post_json(
        &client,
        srv.url("/api/catalog"),
        json!({"title": "Inception", "type": "MOVIE", "durationMinutes": 148, "genre": "Sci-Fi"}),
    )
    .await;
    post_json(
        &client,
        srv.url("/api/content"),
        json!({"title": "Inception", "type": "MOVIE"}),
    )
    .await;
    post_json(
        &client,
        srv.url("/api/content"),
        json!({"title": "Dark", "type": "SERIES"}),
    )
    .await;
    content_views_eventually(&client, &srv, 2).await;

    let (status, body) = get_json(&client, srv.url("/api/recommendations")).await;
    assert_eq!(status, StatusCode::OK);
    let recs = body.as_array().unwrap();
    assert_eq!(recs.len(), 2);

    let inception = recs.iter().find(|r| r["contentId"] == 1).unwrap();
    assert_eq!(inception["title"], "Inception");
    assert_eq!(inception["genre"], "Sci-Fi");
    assert_eq!(inception["durationMinutes"], 148);

    // Catalog has no entry 2: fields present and null, row still returned.
    let dark = recs.iter().find(|r| r["contentId"] == 2).unwrap();
    assert_eq!(dark["title"], "Dark");
    assert!(dark.get("genre").unwrap().is_null());
    assert!(dark.get("contentPublishedAt").unwrap().is_null());

    let (status, detail) = get_json(&client, srv.url("/api/recommendations/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(detail["contentCreatedAt"].is_string());

    let (status, body) = get_json(&client, srv.url("/api/recommendations/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn history_keeps_rows_whose_content_is_unknown_upstream() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    post_json(
        &client,
        srv.url("/api/catalog"),
        json!({"title": "Inception", "type": "MOVIE", "durationMinutes": 148, "genre": "Sci-Fi"}),
    )
    .await;
    for (content_id, secs) in [(1, 120), (999, 30)] {
        let res = post_json(
            &client,
            srv.url("/api/watch"),
            json!({"visitorId": "v-1", "contentId": content_id, "watchedSeconds": secs}),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let (status, body) = get_json(&client, srv.url("/api/history/v-1")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);

    let unresolved = rows.iter().find(|r| r["contentId"] == 999).unwrap();
    assert_eq!(unresolved["watchedSeconds"], 30);
    assert_eq!(unresolved["visitorId"], "v-1");
    for field in ["contentTitle", "contentType", "genre"] {
        assert!(unresolved.get(field).unwrap().is_null(), "{field} should be null");
    }

    let resolved = rows.iter().find(|r| r["contentId"] == 1).unwrap();
    assert_eq!(resolved["contentTitle"], "Inception");
    assert_eq!(resolved["genre"], "Sci-Fi");

    let (_, empty) = get_json(&client, srv.url("/api/history/nobody")).await;
    assert_eq!(empty, json!([]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn enrichment_uses_one_batch_call_per_request() {
    let (catalog_url, hits, catalog) = spawn_counting_catalog().await;
    let srv = TestServer::spawn(|c| c.catalog_service_url = catalog_url).await;
    let client = reqwest::Client::new();

    for title in ["A", "B", "C", "D"] {
        post_json(&client, srv.url("/api/content"), json!({"title": title, "type": "SHOW"})).await;
    }
    content_views_eventually(&client, &srv, 4).await;

    let (status, body) = get_json(&client, srv.url("/api/recommendations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 4);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    catalog.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_catalog_degrades_to_nulls() {
    let srv = TestServer::spawn(|c| c.catalog_service_url = "http://127.0.0.1:9".to_string()).await;
    let client = reqwest::Client::new();

    post_json(&client, srv.url("/api/content"), json!({"title": "Inception", "type": "MOVIE"})).await;
    content_views_eventually(&client, &srv, 1).await;
    post_json(
        &client,
        srv.url("/api/watch"),
        json!({"visitorId": "v-1", "contentId": 1, "watchedSeconds": 60}),
    )
    .await;

    let (status, recs) = get_json(&client, srv.url("/api/recommendations")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recs[0]["title"], "Inception");
    assert!(recs[0]["genre"].is_null());

    let (status, history) = get_json(&client, srv.url("/api/history/v-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert!(history[0]["contentTitle"].is_null());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn outbox_mode_propagates_content() {
    let srv = TestServer::spawn(|c| {
        c.publish_mode = PublishMode::Outbox;
        c.outbox.poll_interval = Duration::from_millis(20);
    })
    .await;
    let client = reqwest::Client::new();

    let res = post_json(&client, srv.url("/api/content"), json!({"title": "Dune", "type": "MOVIE"})).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let views = content_views_eventually(&client, &srv, 1).await;
    assert_eq!(views[0]["contentTitle"], "Dune");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn catalog_batch_endpoint_omits_unknown_ids() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    for title in ["Inception", "Dark"] {
        post_json(&client, srv.url("/api/catalog"), json!({"title": title, "type": "MOVIE"})).await;
    }

    let (status, body) = get_json(&client, srv.url("/api/catalog/batch?ids=1,2,42")).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);

    let (_, repeated) = get_json(&client, srv.url("/api/catalog/batch?ids=2&ids=2")).await;
    assert_eq!(repeated.as_array().unwrap().len(), 1);

    let (status, _) = get_json(&client, srv.url("/api/catalog/batch?ids=x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&client, srv.url("/api/catalog/42")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_writes_are_rejected() {
    let srv = TestServer::spawn(|_| {}).await;
    let client = reqwest::Client::new();

    let res = post_json(&client, srv.url("/api/content"), json!({"title": " ", "type": "MOVIE"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = post_json(&client, srv.url("/api/content"), json!({"title": "X", "type": "PODCAST"})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = post_json(
        &client,
        srv.url("/api/watch"),
        json!({"visitorId": "v-1", "contentId": 1, "watchedSeconds": -5}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&client, srv.url("/api/content/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn catalog_only_process_does_not_host_other_routes() {
    let srv = TestServer::spawn(|c| c.service = marquee_api::config::ServiceRole::Catalog).await;
    let client = reqwest::Client::new();

    let (status, _) = get_json(&client, srv.url("/api/catalog")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_json(&client, srv.url("/api/recommendations")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
