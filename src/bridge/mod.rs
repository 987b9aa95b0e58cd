//! Bridge modules for external service communication
//!
//! Handlers never talk to a backend directly; they go through one of these
//! collaborators, each behind a trait so tests can substitute fakes:
//! - `web`: HTTP requests via reqwest
//! - `sql`: one-shot MySQL statements via sqlx
//! - `secrets`: secret documents keyed by name and access role
//! - `credentials`: which cloud credentials a call should use
//! - `cloud`: object storage, batch jobs, functions, queues and queries
//! - `events`: publish/subscribe messaging
//! - `aws` (feature `aws`): AWS SDK implementation of `cloud` and `secrets`
//! - `kafka` (feature `kafka`): rdkafka implementation of `events`

use std::sync::Arc;

use crate::workflow::RunnerConfig;

pub mod cloud;
pub mod credentials;
pub mod events;
pub mod secrets;
pub mod sql;
pub mod web;

#[cfg(feature = "aws")]
pub mod aws;
#[cfg(feature = "kafka")]
pub mod kafka;

pub use cloud::{BatchJob, CloudBridge, CloudNotEnabled, QueryRequest, QueryState};
pub use credentials::CredentialSource;
pub use events::{EventBridge, EventSubscription, EventsNotEnabled};
pub use secrets::{SecretBridge, StaticSecrets};
pub use sql::{ConnectionSettings, MySqlBridge, SqlBridge, WriteSummary};
pub use web::{WebBridge, WebResponse};

/// Common error type for bridge operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to start client: {0}")]
    StartupFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Cloud error: {0}")]
    CloudError(String),

    #[error("Messaging error: {0}")]
    MessagingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl BridgeError {
    /// Whether trying the same call again could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BridgeError::ConfigError(_) | BridgeError::UnsupportedAction(_)
        )
    }
}

/// Every collaborator a handler may need, shared by all steps of a run
#[derive(Clone)]
pub struct Backends {
    pub config: Arc<RunnerConfig>,
    pub web: Arc<WebBridge>,
    pub sql: Arc<dyn SqlBridge>,
    pub secrets: Arc<dyn SecretBridge>,
    pub cloud: Arc<dyn CloudBridge>,
    pub events: Arc<dyn EventBridge>,
}

impl Backends {
    /// Build the default collaborators for a configuration. Cloud and
    /// messaging calls fail with a configuration error unless the `aws` and
    /// `kafka` features are compiled in.
    pub fn from_config(config: RunnerConfig) -> Result<Self, BridgeError> {
        let web = Arc::new(WebBridge::new(&config.http)?);
        let sql: Arc<dyn SqlBridge> = Arc::new(MySqlBridge::new(&config.database));

        #[cfg(feature = "aws")]
        let (secrets, cloud): (Arc<dyn SecretBridge>, Arc<dyn CloudBridge>) = {
            let aws = Arc::new(aws::AwsBridge::new(&config.aws));
            (aws.clone(), aws)
        };

        #[cfg(not(feature = "aws"))]
        let (secrets, cloud): (Arc<dyn SecretBridge>, Arc<dyn CloudBridge>) = (
            Arc::new(StaticSecrets::new(config.database.secrets.clone())),
            Arc::new(CloudNotEnabled),
        );

        #[cfg(feature = "kafka")]
        let events: Arc<dyn EventBridge> = Arc::new(kafka::KafkaBridge::new(&config.kafka));

        #[cfg(not(feature = "kafka"))]
        let events: Arc<dyn EventBridge> = Arc::new(EventsNotEnabled);

        Ok(Self {
            config: Arc::new(config),
            web,
            sql,
            secrets,
            cloud,
            events,
        })
    }

    pub fn with_sql(mut self, sql: Arc<dyn SqlBridge>) -> Self {
        self.sql = sql;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretBridge>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_cloud(mut self, cloud: Arc<dyn CloudBridge>) -> Self {
        self.cloud = cloud;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventBridge>) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("config", &self.config)
            .field("web", &self.web)
            .finish_non_exhaustive()
    }
}
