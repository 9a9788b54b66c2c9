use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use catalog_service::publisher::EventPublisher;
use catalog_service::store::{CatalogStore, PgCatalogStore};
use catalog_service::{build_router, AppState, CatalogConfig, CatalogService, IngestPipeline, ReservationService};
use common_observability::CatalogMetrics;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CatalogConfig::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(config.tx_timeout)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.context("failed to run migrations")?;
    }

    let store: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool).with_statement_timeout(config.tx_timeout));
    let metrics = Arc::new(CatalogMetrics::new());
    let reservations = ReservationService::new(store.clone())
        .with_timeout(config.tx_timeout)
        .with_metrics(metrics.clone());
    let catalog = CatalogService::new(store).with_timeout(config.tx_timeout);

    #[cfg(feature = "kafka")]
    let publisher: Arc<dyn EventPublisher> = Arc::new(catalog_service::publisher::KafkaEventPublisher::new(
        catalog_service::consumer::build_producer(&config)?,
        config.created_topic.clone(),
    ));
    #[cfg(not(feature = "kafka"))]
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(catalog_service::publisher::NoopPublisher::new(config.created_topic.clone()));

    let pipeline = IngestPipeline::new(catalog.clone(), reservations.clone(), publisher, config.ingest())
        .with_metrics(metrics.clone());
    #[cfg(feature = "kafka")]
    catalog_service::consumer::spawn_workers(&config, pipeline)?;
    #[cfg(not(feature = "kafka"))]
    {
        tracing::warn!("built without the kafka feature; inbound topics are not consumed");
        drop(pipeline);
    }

    let app = build_router(AppState { reservations, catalog, metrics });

    let addr: SocketAddr = config.listen_addr().parse().context("HOST/PORT do not form a socket address")?;
    info!(%addr, atomic_create = config.atomic_create, "starting catalog-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
