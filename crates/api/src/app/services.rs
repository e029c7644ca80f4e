use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::runtime::Handle;

use marquee_core::{CatalogEntry, Content, NewCatalogEntry, NewContent, NewWatchRecord, WatchRecord};
use marquee_events::CONTENT_EVENTS_TOPIC;
use marquee_infra::aggregation::{RecommendationService, WatchHistoryService};
use marquee_infra::clients::{HttpCatalogClient, HttpClientConfig, HttpContentClient};
use marquee_infra::event_bus::SharedBus;
use marquee_infra::outbox::{InMemoryOutboxStore, OutboxDispatcher, OutboxStore};
use marquee_infra::projections::ContentViewProjection;
use marquee_infra::publisher::EventPublisher;
use marquee_infra::read_model::{ContentViewStore, InMemoryContentViewStore, PostgresContentViewStore};
use marquee_infra::repository::{
    CatalogRepository, ContentRepository, InMemoryCatalogRepository, InMemoryContentRepository,
    InMemoryWatchRecordRepository, WatchRecordRepository,
};
use marquee_infra::workers::{ProjectionWorker, WorkerHandle};
use marquee_infra::StoreError;

#[cfg(feature = "redis")]
use marquee_infra::event_bus::RedisStreamsEventBus;

use crate::config::{AppConfig, BusBackend, PublishMode, ServiceRole};

/// Everything the handlers need, built once at startup.
pub struct AppServices {
    pub role: ServiceRole,
    pub bus: SharedBus,
    pub contents: Arc<dyn ContentRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub watch_records: Arc<dyn WatchRecordRepository>,
    pub views: Arc<dyn ContentViewStore>,
    pub watch_history: WatchHistoryService,
    pub recommendations: RecommendationService,
    publisher: EventPublisher,
    outbox: Option<Arc<dyn OutboxStore>>,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl AppServices {
    /// Commit new content, then hand its event to the configured publish path.
    pub async fn create_content(&self, new: NewContent) -> Result<Content, StoreError> {
        match &self.outbox {
            Some(outbox) => self.contents.insert_with_outbox(new, outbox.as_ref()).await,
            None => {
                let content = self.contents.insert(new).await?;
                self.publisher.publish(&content);
                Ok(content)
            }
        }
    }

    pub async fn create_catalog_entry(&self, new: NewCatalogEntry) -> Result<CatalogEntry, StoreError> {
        self.catalog.insert(new).await
    }

    pub async fn record_watch(&self, new: NewWatchRecord) -> Result<WatchRecord, StoreError> {
        match &self.outbox {
            Some(outbox) => self.watch_records.insert_with_outbox(new, outbox.as_ref()).await,
            None => {
                let record = self.watch_records.insert(new).await?;
                self.publisher.publish(&record);
                Ok(record)
            }
        }
    }

    /// Stop background workers (projection consumer, outbox dispatcher).
    pub fn shutdown(&self) {
        let handles: Vec<WorkerHandle> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(_) => return,
        };
        for h in handles {
            h.shutdown();
        }
    }
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let bus = build_bus(config)?;
    let views = build_view_store(config).await?;

    let catalog_client = HttpCatalogClient::new(HttpClientConfig::new(&config.catalog_service_url))
        .context("catalog client")?;
    let content_client = HttpContentClient::new(HttpClientConfig::new(&config.content_service_url))
        .context("content client")?;

    let watch_records: Arc<dyn WatchRecordRepository> = Arc::new(InMemoryWatchRecordRepository::new());
    let catalog_client = Arc::new(catalog_client);

    let mut workers = Vec::new();

    let outbox: Option<Arc<dyn OutboxStore>> = match config.publish_mode {
        PublishMode::Direct => None,
        PublishMode::Outbox => {
            let store: Arc<dyn OutboxStore> = Arc::new(InMemoryOutboxStore::new());
            let dispatcher = OutboxDispatcher::new(store.clone(), bus.clone(), config.outbox.clone());
            workers.push(dispatcher.spawn().context("spawn outbox dispatcher")?);
            Some(store)
        }
    };

    if config.service.hosts(ServiceRole::Recommendation) {
        let projection = Arc::new(ContentViewProjection::new(views.clone()));
        workers.push(
            ProjectionWorker::spawn(bus.clone(), CONTENT_EVENTS_TOPIC, projection, Handle::current())
                .context("spawn content-views projection worker")?,
        );
    }

    tracing::info!(
        service = config.service.as_str(),
        bus = bus.backend(),
        publish_mode = ?config.publish_mode,
        catalog = %config.catalog_service_url,
        content = %config.content_service_url,
        "services wired"
    );

    let publisher = EventPublisher::new(bus.clone()).context("spawn event publisher")?;

    Ok(AppServices {
        role: config.service,
        publisher,
        bus,
        contents: Arc::new(InMemoryContentRepository::new()),
        catalog: Arc::new(InMemoryCatalogRepository::new()),
        watch_records: watch_records.clone(),
        views: views.clone(),
        watch_history: WatchHistoryService::new(
            watch_records,
            catalog_client.clone(),
            config.enrichment_timeout,
        ),
        recommendations: RecommendationService::new(
            views,
            catalog_client,
            Arc::new(content_client),
            config.enrichment_timeout,
        ),
        outbox,
        workers: Mutex::new(workers),
    })
}

fn build_bus(config: &AppConfig) -> anyhow::Result<SharedBus> {
    match config.event_bus {
        BusBackend::Memory => Ok(SharedBus::in_memory()),
        BusBackend::Redis => {
            #[cfg(feature = "redis")]
            {
                let url = config
                    .redis_url
                    .as_deref()
                    .context("EVENT_BUS=redis requires REDIS_URL")?;
                let bus = RedisStreamsEventBus::new(url).context("connect to redis")?;
                return Ok(SharedBus::Redis(Arc::new(bus)));
            }
            #[cfg(not(feature = "redis"))]
            {
                tracing::warn!("EVENT_BUS=redis but redis feature not enabled, falling back to in-memory");
                return Ok(SharedBus::in_memory());
            }
        }
    }
}

async fn build_view_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ContentViewStore>> {
    match config.database_url.as_deref() {
        Some(url) if config.service.hosts(ServiceRole::Recommendation) => {
            let store = PostgresContentViewStore::connect(url)
                .await
                .context("connect to postgres")?;
            store.ensure_schema().await.context("apply content_views schema")?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(InMemoryContentViewStore::new())),
    }
}
