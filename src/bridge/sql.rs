//! Relational database bridge
//!
//! Every call opens its own connection, runs exactly one statement under a
//! timeout and closes the connection again, whether the statement succeeded,
//! failed or timed out. There is no pooling across steps.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlSslMode};
use sqlx::{Column, ConnectOptions, Connection, Row, ValueRef};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use super::BridgeError;
use crate::workflow::runner_config::DatabaseConfig;

const DEFAULT_PORT: u16 = 3306;

/// Where and as whom to connect
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl ConnectionSettings {
    /// `host` may carry a `:port` suffix
    pub fn new(host: &str, user: impl Into<String>, password: impl Into<String>) -> Self {
        let (host, port) = match host.rsplit_once(':') {
            Some((name, port)) => match port.parse() {
                Ok(port) => (name.to_string(), port),
                Err(_) => (host.to_string(), DEFAULT_PORT),
            },
            None => (host.to_string(), DEFAULT_PORT),
        };

        Self {
            host,
            port,
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Outcome of a data-modifying statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

#[async_trait]
pub trait SqlBridge: Send + Sync {
    /// Run a query and return its first row, if any
    async fn fetch_first(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<Option<Map<String, Value>>, BridgeError>;

    /// Run a data-modifying statement
    async fn execute(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<WriteSummary, BridgeError>;
}

/// MySQL over sqlx, TLS preferred but not required
#[derive(Debug, Clone)]
pub struct MySqlBridge {
    connect_timeout: Duration,
}

impl MySqlBridge {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    async fn connect(&self, settings: &ConnectionSettings) -> Result<MySqlConnection, BridgeError> {
        let options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .ssl_mode(MySqlSslMode::Preferred);

        debug!("Connecting to {}:{}", settings.host, settings.port);

        tokio::time::timeout(self.connect_timeout, options.connect())
            .await
            .map_err(|_| {
                BridgeError::Timeout(format!(
                    "connecting to {} after {}s",
                    settings.host,
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| BridgeError::DatabaseError(e.to_string()))
    }
}

async fn close(conn: MySqlConnection) {
    if let Err(e) = conn.close().await {
        warn!("Error closing database connection: {}", e);
    }
}

fn timed_out(timeout: Duration) -> BridgeError {
    BridgeError::Timeout(format!(
        "database statement exceeded {}s",
        timeout.as_secs()
    ))
}

#[async_trait]
impl SqlBridge for MySqlBridge {
    async fn fetch_first(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<Option<Map<String, Value>>, BridgeError> {
        let mut conn = self.connect(settings).await?;
        let outcome = tokio::time::timeout(timeout, sqlx::query(sql).fetch_optional(&mut conn)).await;
        close(conn).await;

        match outcome {
            Err(_) => Err(timed_out(timeout)),
            Ok(Err(e)) => Err(BridgeError::DatabaseError(e.to_string())),
            Ok(Ok(row)) => Ok(row.as_ref().map(row_to_json)),
        }
    }

    async fn execute(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<WriteSummary, BridgeError> {
        let mut conn = self.connect(settings).await?;
        let outcome = tokio::time::timeout(timeout, sqlx::query(sql).execute(&mut conn)).await;
        close(conn).await;

        match outcome {
            Err(_) => Err(timed_out(timeout)),
            Ok(Err(e)) => Err(BridgeError::DatabaseError(e.to_string())),
            Ok(Ok(done)) => Ok(WriteSummary {
                rows_affected: done.rows_affected(),
                last_insert_id: done.last_insert_id(),
            }),
        }
    }
}

fn row_to_json(row: &MySqlRow) -> Map<String, Value> {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                column_value(row, column.ordinal()),
            )
        })
        .collect()
}

/// Decode one column into the closest JSON shape; types with no direct
/// mapping (DECIMAL, JSON, blobs) fall back to their text form
fn column_value(row: &MySqlRow, index: usize) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }

    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(index) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Value::Bool(v);
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return Value::String(v.to_string());
    }
    if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(index) {
        return Value::String(v.to_string());
    }
    if let Ok(v) = row.try_get_unchecked::<String, _>(index) {
        return Value::String(v);
    }
    if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(index) {
        return Value::String(String::from_utf8_lossy(&v).into_owned());
    }
    Value::Null
}
