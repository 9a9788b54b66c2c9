//! Outbound producer seam. Delivery is at-least-once; a failed send means the downstream did
//! not receive the update.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker unavailable: {0}")]
    Transient(String),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    fn topic(&self) -> &str;

    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Drops every message. Used when the binary runs without a broker.
pub struct NoopPublisher {
    topic: String,
}

impl NoopPublisher {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into() }
    }
}

#[async_trait]
impl EventPublisher for NoopPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        tracing::debug!(topic = %self.topic, key, bytes = payload.len(), "publish skipped (no broker)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Keeps everything it is given; can be told to fail the next sends.
#[derive(Default)]
pub struct CapturingPublisher {
    records: Mutex<Vec<PublishedRecord>>,
    failures_left: Mutex<u32>,
}

impl CapturingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_next(&self, n: u32) {
        *self.failures_left.lock().await = n;
    }

    pub async fn records(&self) -> Vec<PublishedRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for CapturingPublisher {
    fn topic(&self) -> &str {
        "captured"
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        {
            let mut left = self.failures_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err(PublishError::Transient("injected publish failure".into()));
            }
        }
        self.records.lock().await.push(PublishedRecord { key: key.to_string(), payload: payload.to_vec() });
        Ok(())
    }
}

#[cfg(feature = "kafka")]
pub use kafka::KafkaEventPublisher;

#[cfg(feature = "kafka")]
mod kafka {
    use std::time::Duration;

    use async_trait::async_trait;
    use rdkafka::producer::{FutureProducer, FutureRecord};

    use super::{EventPublisher, PublishError};

    pub struct KafkaEventPublisher {
        producer: FutureProducer,
        topic: String,
        queue_timeout: Duration,
    }

    impl KafkaEventPublisher {
        pub fn new(producer: FutureProducer, topic: impl Into<String>) -> Self {
            Self { producer, topic: topic.into(), queue_timeout: Duration::from_secs(0) }
        }
    }

    #[async_trait]
    impl EventPublisher for KafkaEventPublisher {
        fn topic(&self) -> &str {
            &self.topic
        }

        async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
            self.producer
                .send(FutureRecord::to(&self.topic).payload(payload).key(key), self.queue_timeout)
                .await
                .map(|_| ())
                .map_err(|(err, _msg)| PublishError::Transient(err.to_string()))
        }
    }
}
