use std::time::Duration;

use async_trait::async_trait;
use envconfig::Envconfig;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::{error, info};

use crate::event::CartEvent;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("transient publish failure")]
    Retryable,
    #[error("event rejected by the bus")]
    NonRetryable,
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "kafka:9092")]
    pub kafka_hosts: String,
    #[envconfig(default = "carts_events")]
    pub kafka_topic: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

impl From<&KafkaConfig> for ClientConfig {
    fn from(config: &KafkaConfig) -> Self {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };
        client_config
    }
}

/// Where cart events go once the poller decides to publish them.
#[async_trait]
pub trait CartEventSink: Send + Sync {
    async fn send(&self, event: CartEvent) -> Result<(), SinkError>;
}

/// Logs events instead of publishing them, for local runs.
pub struct PrintSink;

#[async_trait]
impl CartEventSink for PrintSink {
    async fn send(&self, event: CartEvent) -> Result<(), SinkError> {
        info!(cart_id = event.cart_id, "cart event: {:?}", event);
        metrics::counter!("carts_events_published_total").increment(1);
        Ok(())
    }
}

#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaSink {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<KafkaSink> {
        info!(
            "connecting to Kafka brokers at {}...",
            config.kafka_hosts
        );
        let producer: FutureProducer = ClientConfig::from(config).create()?;

        // Ping the cluster so a broken broker config fails at startup
        producer
            .client()
            .fetch_metadata(Some(&config.kafka_topic), Timeout::After(Duration::new(10, 0)))?;
        info!("connected to Kafka brokers");

        Ok(KafkaSink {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl CartEventSink for KafkaSink {
    async fn send(&self, event: CartEvent) -> Result<(), SinkError> {
        let payload = serde_json::to_string(&event)?;
        let key = event.key();

        let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);

        match self.producer.send(record, Timeout::Never).await {
            Ok(_) => {
                metrics::counter!("carts_events_published_total").increment(1);
                Ok(())
            }
            Err((e, _)) => {
                metrics::counter!("carts_events_publish_failures_total").increment(1);
                error!(cart_id = event.cart_id, "failed to produce cart event: {}", e);
                match e.rdkafka_error_code() {
                    Some(RDKafkaErrorCode::MessageSizeTooLarge) => Err(SinkError::NonRetryable),
                    _ => Err(SinkError::Retryable),
                }
            }
        }
    }
}
