//! Runner configuration
//!
//! Backend settings for the operation handlers, loaded from a YAML file.
//! Every field has a default, so an empty file (or none at all) is valid:
//!
//! ```yaml
//! http:
//!   timeout_secs: 30
//!
//! database:
//!   default_secret: test/urf-db-credentials
//!   secrets:
//!     local/db:
//!       username: root
//!       password: secret
//!
//! aws:
//!   region: us-west-2
//!   profile: default
//!
//! kafka:
//!   brokers: ["localhost:9092"]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub aws: AwsConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub athena: AthenaConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub kafka: KafkaConfig,
}

impl RunnerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|error| ConfigError::Yaml {
            file: path.display().to_string(),
            error,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Database
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Secret looked up when a step names none
    #[serde(default = "default_secret_name")]
    pub default_secret: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Statement timeout for `select` and `count`
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Statement timeout for `insert`, `update` and `deletedb`
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Secret documents served locally, keyed by secret name
    #[serde(default)]
    pub secrets: HashMap<String, Map<String, Value>>,
}

fn default_secret_name() -> String {
    "test/urf-db-credentials".to_string()
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_read_timeout() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            default_secret: default_secret_name(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            secrets: HashMap::new(),
        }
    }
}

// ============================================================================
// AWS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Named profile used outside CI
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Environment variable that is `true` when running in CI
    #[serde(default = "default_ci_env")]
    pub ci_env: String,

    /// Environment variable holding the account that owns the assumed roles
    #[serde(default = "default_account_env")]
    pub account_env: String,

    /// Environment variable substituted for `{group}` in `cross_role`
    #[serde(default = "default_group_env")]
    pub group_env: String,

    /// Role assumed first in CI
    #[serde(default = "default_cross_role")]
    pub cross_role: String,
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_ci_env() -> String {
    "GITLAB_CI".to_string()
}

fn default_account_env() -> String {
    "AWS_ACCOUNT_NONPROD".to_string()
}

fn default_group_env() -> String {
    "GITLAB_GROUP".to_string()
}

fn default_cross_role() -> String {
    "gl-{group}-cross-role".to_string()
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            profile: default_profile(),
            ci_env: default_ci_env(),
            account_env: default_account_env(),
            group_env: default_group_env(),
            cross_role: default_cross_role(),
        }
    }
}

// ============================================================================
// Cloud polling
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_poll")]
    pub poll_interval_secs: u64,

    /// Polls before giving up when a step has no `waitTime`
    #[serde(default = "default_batch_wait")]
    pub default_wait: u64,
}

fn default_batch_poll() -> u64 {
    10
}

fn default_batch_wait() -> u64 {
    90
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_batch_poll(),
            default_wait: default_batch_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    #[serde(default = "default_athena_poll")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_athena_max_polls")]
    pub max_polls: u64,
}

fn default_athena_poll() -> u64 {
    1
}

fn default_athena_max_polls() -> u64 {
    1800
}

impl Default for AthenaConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_athena_poll(),
            max_polls: default_athena_max_polls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Long-poll wait for queue receives
    #[serde(default = "default_queue_wait")]
    pub wait_time_secs: u64,

    #[serde(default = "default_max_messages")]
    pub default_max_messages: u32,
}

fn default_queue_wait() -> u64 {
    20
}

fn default_max_messages() -> u32 {
    10
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wait_time_secs: default_queue_wait(),
            default_max_messages: default_max_messages(),
        }
    }
}

// ============================================================================
// Kafka
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default)]
    pub brokers: Vec<String>,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_group_id")]
    pub default_group_id: String,

    /// How long `read_event` waits for a matching message
    #[serde(default = "default_read_event_timeout")]
    pub read_timeout_secs: u64,
}

fn default_client_id() -> String {
    "automation-consumer".to_string()
}

fn default_group_id() -> String {
    "automation-consumer-group".to_string()
}

fn default_read_event_timeout() -> u64 {
    60
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            client_id: default_client_id(),
            default_group_id: default_group_id(),
            read_timeout_secs: default_read_event_timeout(),
        }
    }
}
