//! Inbound catalog event pipeline: decode, dispatch by action and apply.
//!
//! Decode failures and unknown actions are terminal and never retried. Store errors marked
//! retryable are retried with exponential backoff; everything else is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use common_observability::CatalogMetrics;
use tracing::{error, info, warn};

use crate::catalog::CatalogService;
use crate::error::{CatalogError, CatalogResult};
use crate::events::{
    MediaStoredPayload, ProductCommand, ProductCreatePayload, ProductCreatedEvent, VariantCommand, VariantEnvelope,
};
use crate::model::{NewVariant, ProductId, VariantId};
use crate::publisher::EventPublisher;
use crate::reservation::ReservationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(200) }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based): base, 2*base, 4*base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Product and variants in one transaction. When false, the product is committed first and
    /// each variant separately; a failing variant leaves the earlier rows in place.
    pub atomic_create: bool,
    pub retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { atomic_create: true, retry: RetryPolicy::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    Product,
    Variant,
}

impl InboundTopic {
    pub fn label(&self) -> &'static str {
        match self {
            InboundTopic::Product => "product",
            InboundTopic::Variant => "variant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedEvent {
    ProductCreated { product_id: ProductId, variant_ids: Vec<VariantId> },
    MediaUpdated { product_id: ProductId },
    VariantCreated { product_id: ProductId, variant_id: VariantId },
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub attempts: u32,
    pub result: CatalogResult<AppliedEvent>,
}

impl IngestOutcome {
    pub fn is_applied(&self) -> bool {
        self.result.is_ok()
    }
}

enum InboundCommand {
    Product(ProductCommand),
    Variant(VariantCommand),
}

impl InboundCommand {
    fn decode(topic: InboundTopic, raw: &[u8]) -> CatalogResult<Self> {
        match topic {
            InboundTopic::Product => ProductCommand::decode(raw).map(InboundCommand::Product),
            InboundTopic::Variant => VariantCommand::decode(raw).map(InboundCommand::Variant),
        }
    }

    fn action(&self) -> &'static str {
        match self {
            InboundCommand::Product(cmd) => cmd.action().as_str(),
            InboundCommand::Variant(cmd) => cmd.action().as_str(),
        }
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    catalog: CatalogService,
    reservations: ReservationService,
    publisher: Arc<dyn EventPublisher>,
    config: IngestConfig,
    metrics: Option<Arc<CatalogMetrics>>,
}

impl IngestPipeline {
    pub fn new(
        catalog: CatalogService,
        reservations: ReservationService,
        publisher: Arc<dyn EventPublisher>,
        config: IngestConfig,
    ) -> Self {
        Self { catalog, reservations, publisher, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<CatalogMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Single attempt at a product-topic message.
    pub async fn handle_product_message(&self, raw: &[u8]) -> CatalogResult<AppliedEvent> {
        self.apply(&InboundCommand::Product(ProductCommand::decode(raw)?)).await
    }

    /// Single attempt at a variant-topic message.
    pub async fn handle_variant_message(&self, raw: &[u8]) -> CatalogResult<AppliedEvent> {
        self.apply(&InboundCommand::Variant(VariantCommand::decode(raw)?)).await
    }

    /// Worker entry point: decode once, then apply with retries on retryable errors.
    pub async fn process(&self, topic: InboundTopic, raw: &[u8]) -> IngestOutcome {
        let _timer = self.metrics.as_ref().map(|m| m.ingest_duration_seconds.start_timer());
        let command = match InboundCommand::decode(topic, raw) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(topic = topic.label(), reason = err.kind(), error = %err, "dropping undecodable event");
                self.record(topic, "undecoded", "rejected");
                return IngestOutcome { attempts: 1, result: Err(err) };
            }
        };
        let action = command.action();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.apply(&command).await {
                Ok(applied) => {
                    info!(topic = topic.label(), action, attempt, ?applied, "event applied");
                    self.record(topic, action, "applied");
                    return IngestOutcome { attempts: attempt, result: Ok(applied) };
                }
                Err(err) if err.is_retryable() && attempt < self.config.retry.max_attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(topic = topic.label(), action, attempt, ?delay, error = %err, "transient failure, retrying");
                    if let Some(m) = &self.metrics {
                        m.event_retries_total.inc();
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    let outcome = if err.is_retryable() || matches!(err, CatalogError::PublishFailed(_)) {
                        error!(topic = topic.label(), action, attempt, reason = err.kind(), error = %err, "event failed");
                        "failed"
                    } else {
                        warn!(topic = topic.label(), action, reason = err.kind(), error = %err, "event rejected");
                        "rejected"
                    };
                    self.record(topic, action, outcome);
                    return IngestOutcome { attempts: attempt, result: Err(err) };
                }
            }
        }
    }

    fn record(&self, topic: InboundTopic, action: &str, outcome: &str) {
        if let Some(m) = &self.metrics {
            m.record_event(topic.label(), action, outcome);
        }
    }

    async fn apply(&self, command: &InboundCommand) -> CatalogResult<AppliedEvent> {
        match command {
            InboundCommand::Product(ProductCommand::Create(payload)) => self.create_product(payload).await,
            InboundCommand::Product(ProductCommand::MediaStored(payload)) => self.store_media(payload).await,
            InboundCommand::Variant(VariantCommand::Create(envelope)) => self.create_variant(envelope).await,
        }
    }

    async fn create_product(&self, payload: &ProductCreatePayload) -> CatalogResult<AppliedEvent> {
        let new_product = payload.new_product();
        let drafts: Vec<NewVariant> = payload.variants.iter().cloned().map(|v| v.into_new_variant()).collect();

        let (product, variants) = if self.config.atomic_create {
            self.catalog.create_product_with_variants(&new_product, drafts).await?
        } else {
            let product = self.catalog.create_product(&new_product).await?;
            let mut variants = Vec::with_capacity(drafts.len());
            for draft in drafts {
                variants.push(self.reservations.create_initial_variant(&product, draft).await?);
            }
            (product, variants)
        };

        let event = ProductCreatedEvent::new(&product, payload, &variants);
        self.publish_created(&event).await?;
        Ok(AppliedEvent::ProductCreated {
            product_id: product.id,
            variant_ids: variants.iter().map(|v| v.id).collect(),
        })
    }

    async fn store_media(&self, payload: &MediaStoredPayload) -> CatalogResult<AppliedEvent> {
        self.catalog
            .update_media(payload.product_id, &payload.image_urls, &payload.video_urls)
            .await?;
        Ok(AppliedEvent::MediaUpdated { product_id: payload.product_id })
    }

    async fn create_variant(&self, envelope: &VariantEnvelope) -> CatalogResult<AppliedEvent> {
        let draft = envelope.product_variant.clone().into_new_variant();
        let created = self.reservations.create_variant(envelope.product_id, draft).await?;
        info!(product_id = envelope.product_id, variant_id = created.id, user_id = ?envelope.user_id, "variant created from event");
        Ok(AppliedEvent::VariantCreated { product_id: envelope.product_id, variant_id: created.id })
    }

    /// Rows are already committed here, so a failed publish is retried in place and never
    /// bubbles up as a retryable error that would re-run the create.
    async fn publish_created(&self, event: &ProductCreatedEvent) -> CatalogResult<()> {
        let payload = event.to_bytes()?;
        let key = event.partition_key();
        let max = self.config.retry.max_attempts.max(1);
        let mut last_err = String::new();
        for attempt in 1..=max {
            match self.publisher.publish(&key, &payload).await {
                Ok(()) => {
                    info!(topic = self.publisher.topic(), product_id = event.product_id, variants = event.variants.len(), "product.created published");
                    return Ok(());
                }
                Err(err) => {
                    warn!(topic = self.publisher.topic(), product_id = event.product_id, attempt, error = %err, "publish failed");
                    last_err = err.to_string();
                    if attempt < max {
                        tokio::time::sleep(self.config.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        if let Some(m) = &self.metrics {
            m.publish_failures_total.inc();
        }
        error!(product_id = event.product_id, error = %last_err, "giving up on product.created; rows stay committed");
        Err(CatalogError::PublishFailed(last_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy { max_attempts: 5, base_delay: Duration::from_millis(100) };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn backoff_shift_is_capped() {
        let policy = RetryPolicy { max_attempts: 100, base_delay: Duration::from_millis(1) };
        assert_eq!(policy.delay_for(50), Duration::from_millis(1 << 16));
    }
}
