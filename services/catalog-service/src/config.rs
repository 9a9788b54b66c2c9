use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::ingest::{IngestConfig, RetryPolicy};

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub kafka_bootstrap: String,
    pub kafka_group_id: String,
    pub product_topic: String,
    pub variant_topic: String,
    pub created_topic: String,
    pub tx_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub atomic_create: bool,
    pub run_migrations: bool,
}

fn flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8082);
        let kafka_bootstrap = env::var("KAFKA_BOOTSTRAP").unwrap_or_else(|_| "localhost:9092".to_string());
        let kafka_group_id = env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "catalog-service".to_string());
        let product_topic = env::var("CATALOG_PRODUCT_TOPIC").unwrap_or_else(|_| "product.events".to_string());
        let variant_topic =
            env::var("CATALOG_VARIANT_TOPIC").unwrap_or_else(|_| "product-variant.events".to_string());
        let created_topic = env::var("CATALOG_CREATED_TOPIC").unwrap_or_else(|_| "product.created".to_string());
        let tx_timeout_ms = env::var("CATALOG_TX_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(5000);
        let retry_max_attempts = env::var("CATALOG_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let retry_base_delay_ms = env::var("CATALOG_RETRY_BASE_DELAY_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(200);

        Ok(Self {
            database_url,
            host,
            port,
            kafka_bootstrap,
            kafka_group_id,
            product_topic,
            variant_topic,
            created_topic,
            tx_timeout: Duration::from_millis(tx_timeout_ms.max(100)),
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay: Duration::from_millis(retry_base_delay_ms),
            atomic_create: flag("CATALOG_ATOMIC_CREATE", true),
            run_migrations: flag("CATALOG_RUN_MIGRATIONS", true),
        })
    }

    pub fn ingest(&self) -> IngestConfig {
        IngestConfig {
            atomic_create: self.atomic_create,
            retry: RetryPolicy { max_attempts: self.retry_max_attempts, base_delay: self.retry_base_delay },
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env is process-global; keep every assertion that touches it in this one test.
    #[test]
    fn defaults_and_floors() {
        env::set_var("DATABASE_URL", "postgres://localhost/catalog");
        env::set_var("CATALOG_TX_TIMEOUT_MS", "5");
        env::set_var("CATALOG_RETRY_MAX_ATTEMPTS", "0");
        env::set_var("CATALOG_ATOMIC_CREATE", "false");
        env::remove_var("PORT");
        env::remove_var("HOST");

        let cfg = CatalogConfig::from_env().unwrap();
        assert_eq!(cfg.port, 8082);
        assert_eq!(cfg.tx_timeout, Duration::from_millis(100));
        assert_eq!(cfg.retry_max_attempts, 1);
        assert!(!cfg.atomic_create);
        assert!(cfg.run_migrations);
        assert_eq!(cfg.created_topic, "product.created");
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8082");

        env::remove_var("DATABASE_URL");
        assert!(CatalogConfig::from_env().is_err());
        env::remove_var("CATALOG_TX_TIMEOUT_MS");
        env::remove_var("CATALOG_RETRY_MAX_ATTEMPTS");
        env::remove_var("CATALOG_ATOMIC_CREATE");
    }
}
