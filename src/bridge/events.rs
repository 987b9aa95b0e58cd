//! Publish/subscribe messaging

use async_trait::async_trait;
use serde_json::Value;

use super::BridgeError;

#[async_trait]
pub trait EventBridge: Send + Sync {
    /// Publish one JSON message to a topic
    async fn publish(&self, topic: &str, event: &Value) -> Result<(), BridgeError>;

    /// Join `group_id` and start consuming `topic`
    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn EventSubscription>, BridgeError>;
}

/// A live consumer. Callers must `close` it on every path.
#[async_trait]
pub trait EventSubscription: Send {
    /// Next decoded message; `None` once the stream has ended
    async fn next_event(&mut self) -> Result<Option<Value>, BridgeError>;

    async fn close(self: Box<Self>) -> Result<(), BridgeError>;
}

/// Stand-in used when the crate is built without the `kafka` feature
#[derive(Debug, Clone, Copy, Default)]
pub struct EventsNotEnabled;

fn not_enabled() -> BridgeError {
    BridgeError::ConfigError("messaging requires the `kafka` feature".to_string())
}

#[async_trait]
impl EventBridge for EventsNotEnabled {
    async fn publish(&self, _: &str, _: &Value) -> Result<(), BridgeError> {
        Err(not_enabled())
    }

    async fn subscribe(&self, _: &str, _: &str) -> Result<Box<dyn EventSubscription>, BridgeError> {
        Err(not_enabled())
    }
}
