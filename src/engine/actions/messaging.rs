//! Messaging family: publish/subscribe events
//!
//! Actions:
//! - `send_event` - publish `event` as one JSON message to `topic`
//! - `read_event` - join `group_id` on `topic` and return the first message
//!   whose dotted paths equal every entry of `event`. An empty or missing
//!   `event` accepts the first message. Gives up after the configured read
//!   timeout.
//!
//! ```yaml
//! - action: read_event
//!   topic: orders.created
//!   event:
//!     order.id: "<<order_id>>"
//!     order.status: NEW
//! ```

use futures::{future, pin_mut, stream, TryStreamExt};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::bridge::{BridgeError, EventBridge, EventSubscription};
use crate::engine::error::ExecutorError;
use crate::workflow::runner_config::KafkaConfig;
use crate::workflow::{ActionError, OperationFamily, Step};

pub struct MessagingHandler<'a> {
    events: &'a dyn EventBridge,
    config: &'a KafkaConfig,
    topic: Option<String>,
    event: Option<Value>,
    group_id: String,
}

impl<'a> MessagingHandler<'a> {
    pub fn new(step: &Step, events: &'a dyn EventBridge, config: &'a KafkaConfig) -> Self {
        Self {
            events,
            config,
            topic: step.get_str("topic"),
            event: step.get("event").cloned(),
            group_id: step
                .get_str("group_id")
                .unwrap_or_else(|| config.default_group_id.clone()),
        }
    }

    pub async fn invoke(&self, verb: &str) -> Result<Value, ExecutorError> {
        match verb {
            "send_event" => self.send_event().await,
            "read_event" => self.read_event().await,
            other => Err(ActionError::UnsupportedVerb {
                family: OperationFamily::Messaging,
                verb: other.to_string(),
            }
            .into()),
        }
    }

    fn topic(&self) -> Result<&str, ExecutorError> {
        self.topic
            .as_deref()
            .ok_or_else(|| ExecutorError::MissingParameter("topic".to_string()))
    }

    async fn send_event(&self) -> Result<Value, ExecutorError> {
        let topic = self.topic()?;
        let event = self.event.clone().unwrap_or(Value::Null);

        self.events.publish(topic, &event).await?;
        info!("Event sent to topic {}", topic);
        Ok(Value::Null)
    }

    async fn read_event(&self) -> Result<Value, ExecutorError> {
        let topic = self.topic()?;
        let filter = match &self.event {
            Some(Value::Object(filter)) => filter.clone(),
            _ => Map::new(),
        };
        let read_timeout = Duration::from_secs(self.config.read_timeout_secs);

        let mut subscription = self.events.subscribe(topic, &self.group_id).await?;
        info!("Subscribed to {} as {}", topic, self.group_id);

        let outcome =
            tokio::time::timeout(read_timeout, next_match(subscription.as_mut(), &filter)).await;

        if let Err(e) = subscription.close().await {
            warn!("Failed to close subscription to {}: {}", topic, e);
        }

        match outcome {
            Ok(Ok(Some(event))) => Ok(event),
            Ok(Ok(None)) => Err(BridgeError::MessagingError(format!(
                "Subscription to {} ended before a matching message arrived",
                topic
            ))
            .into()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ExecutorError::Timeout(format!(
                "Timeout waiting for message on {}",
                topic
            ))),
        }
    }
}

/// Consume messages until one passes the filter
async fn next_match(
    subscription: &mut dyn EventSubscription,
    filter: &Map<String, Value>,
) -> Result<Option<Value>, BridgeError> {
    let events = stream::try_unfold(subscription, |subscription| async move {
        let event = subscription.next_event().await?;
        Ok::<_, BridgeError>(event.map(|event| (event, subscription)))
    });
    let matching = events.try_filter(|event| future::ready(matches_filter(event, filter)));
    pin_mut!(matching);

    matching.try_next().await
}

/// Whether every `dotted.path -> value` entry holds for `event`
pub fn matches_filter(event: &Value, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(path, expected)| dotted(event, path) == Some(expected))
}

fn dotted<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(value, |current, part| match current {
        Value::Object(fields) => fields.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
