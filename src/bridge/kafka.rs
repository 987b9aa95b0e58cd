//! Kafka implementation of [`EventBridge`]
//!
//! Broker list and client id come from the runner configuration; TLS and
//! SASL material is read from the environment:
//! - `KAFKA_USERNAME` / `KAFKA_PASSWORD`: SASL PLAIN over TLS
//! - `KAFKA_CLIENT_CERT` / `KAFKA_CLIENT_KEY` / `KAFKA_CLIENT_CERT_PASSPHRASE`:
//!   client certificate (PEM)

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::events::{EventBridge, EventSubscription};
use super::BridgeError;
use crate::workflow::runner_config::KafkaConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct KafkaBridge {
    brokers: Vec<String>,
    client: ClientConfig,
}

fn messaging_error(error: rdkafka::error::KafkaError) -> BridgeError {
    BridgeError::MessagingError(error.to_string())
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl KafkaBridge {
    pub fn new(config: &KafkaConfig) -> Self {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", config.brokers.join(","))
            .set("client.id", &config.client_id);

        let cert = env("KAFKA_CLIENT_CERT");
        let sasl = env("KAFKA_USERNAME").zip(env("KAFKA_PASSWORD"));

        if let Some((username, password)) = sasl {
            client
                .set("security.protocol", "sasl_ssl")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", username)
                .set("sasl.password", password);
        } else if cert.is_some() {
            client.set("security.protocol", "ssl");
        }

        if let Some(cert) = cert {
            client.set("ssl.certificate.pem", cert);
            if let Some(key) = env("KAFKA_CLIENT_KEY") {
                client.set("ssl.key.pem", key);
            }
            if let Some(passphrase) = env("KAFKA_CLIENT_CERT_PASSPHRASE") {
                client.set("ssl.key.password", passphrase);
            }
        }

        Self {
            brokers: config.brokers.clone(),
            client,
        }
    }

    fn client(&self) -> Result<ClientConfig, BridgeError> {
        if self.brokers.is_empty() {
            return Err(BridgeError::ConfigError(
                "kafka.brokers is empty".to_string(),
            ));
        }
        Ok(self.client.clone())
    }
}

#[async_trait]
impl EventBridge for KafkaBridge {
    async fn publish(&self, topic: &str, event: &Value) -> Result<(), BridgeError> {
        let producer: FutureProducer = self.client()?.create().map_err(messaging_error)?;
        let payload = serde_json::to_string(event)?;

        producer
            .send(
                FutureRecord::<(), _>::to(topic).payload(&payload),
                Timeout::After(SEND_TIMEOUT),
            )
            .await
            .map_err(|(e, _)| messaging_error(e))?;

        info!("Event sent to topic {}", topic);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn EventSubscription>, BridgeError> {
        let consumer: StreamConsumer = self
            .client()?
            .set("group.id", group_id)
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "5000")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(messaging_error)?;

        consumer.subscribe(&[topic]).map_err(messaging_error)?;
        debug!("Subscribed to {} as {}", topic, group_id);

        Ok(Box::new(KafkaSubscription { consumer }))
    }
}

struct KafkaSubscription {
    consumer: StreamConsumer,
}

#[async_trait]
impl EventSubscription for KafkaSubscription {
    async fn next_event(&mut self) -> Result<Option<Value>, BridgeError> {
        let message = self.consumer.recv().await.map_err(messaging_error)?;
        let payload = message.payload().unwrap_or_default();
        serde_json::from_slice(payload).map(Some).map_err(|e| {
            BridgeError::MessagingError(format!(
                "undecodable message on {}: {}",
                message.topic(),
                e
            ))
        })
    }

    async fn close(self: Box<Self>) -> Result<(), BridgeError> {
        self.consumer.unsubscribe();
        Ok(())
    }
}
