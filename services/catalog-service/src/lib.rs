pub mod app;
pub mod catalog;
pub mod config;
#[cfg(feature = "kafka")]
pub mod consumer;
pub mod error;
pub mod events;
pub mod ingest;
pub mod ledger;
pub mod model;
pub mod product_handlers;
pub mod publisher;
pub mod reservation;
pub mod store;
pub mod variant_handlers;

pub use app::{build_router, AppState};
pub use catalog::CatalogService;
pub use config::CatalogConfig;
pub use error::{CatalogError, CatalogResult, Entity};
pub use ingest::{IngestConfig, IngestPipeline, InboundTopic, RetryPolicy};
pub use reservation::ReservationService;
