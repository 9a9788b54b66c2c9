//! Kafka worker loops: one consumer per inbound topic, messages handled in arrival order.

use anyhow::Context;
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::FutureProducer;
use rdkafka::{ClientConfig, Message};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::CatalogConfig;
use crate::ingest::{InboundTopic, IngestPipeline};

pub fn build_producer(config: &CatalogConfig) -> anyhow::Result<FutureProducer> {
    ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_bootstrap)
        .set("message.timeout.ms", "5000")
        .create()
        .context("failed to create kafka producer")
}

fn build_consumer(config: &CatalogConfig, topic: &str) -> anyhow::Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &config.kafka_bootstrap)
        .set("group.id", &config.kafka_group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .context("failed to create kafka consumer")?;
    consumer
        .subscribe(&[topic])
        .with_context(|| format!("failed to subscribe to {topic}"))?;
    Ok(consumer)
}

/// Start the product and variant workers. Each runs until the process exits.
pub fn spawn_workers(config: &CatalogConfig, pipeline: IngestPipeline) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let topics = [
        (config.product_topic.clone(), InboundTopic::Product),
        (config.variant_topic.clone(), InboundTopic::Variant),
    ];
    let mut handles = Vec::with_capacity(topics.len());
    for (name, kind) in topics {
        let consumer = build_consumer(config, &name)?;
        let pipeline = pipeline.clone();
        info!(topic = %name, kind = kind.label(), "starting catalog consumer");
        handles.push(tokio::spawn(async move {
            let mut stream = consumer.stream();
            while let Some(message) = stream.next().await {
                match message {
                    Ok(m) => {
                        let Some(payload) = m.payload() else {
                            debug!(topic = %name, offset = m.offset(), "skipping empty message");
                            continue;
                        };
                        let outcome = pipeline.process(kind, payload).await;
                        debug!(topic = %name, partition = m.partition(), offset = m.offset(), attempts = outcome.attempts, applied = outcome.is_applied(), "message handled");
                    }
                    Err(err) => error!(?err, topic = %name, "Kafka error"),
                }
            }
        }));
    }
    Ok(handles)
}
