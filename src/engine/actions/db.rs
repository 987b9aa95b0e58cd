//! Database family: one SQL statement per call
//!
//! Actions:
//! - `select` - first row of `select {columns} from {table} where ...`
//! - `count` - `select count(*) as count ...`, first row
//! - `insert` - `column_names` / `column_values` as the inserted row
//! - `update` - `set_column_names` / `set_column_values`, filtered by
//!   `column_names` / `column_values`
//! - `deletedb` - delete the rows matching `column_names` / `column_values`
//!
//! Values are written into the statement exactly as given, so string
//! literals carry their own quotes:
//!
//! ```yaml
//! - action: select
//!   table_name: Users
//!   columns: id, email
//!   column_names: [email]
//!   column_values: ["'<<email>>'"]
//!   schema: accounts
//! ```
//!
//! Credentials come from the secret named by `secret_name` (default from
//! the runner configuration). With `schema`, the secret's
//! `test_{schema}_host` / `_user` / `_password` entries are used; without
//! it, `host_name` with the secret's `username` / `password`.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::bridge::{ConnectionSettings, SecretBridge, SqlBridge};
use crate::engine::error::ExecutorError;
use crate::workflow::runner_config::DatabaseConfig;
use crate::workflow::{ActionError, OperationFamily, Step};

pub struct DbHandler<'a> {
    sql: &'a dyn SqlBridge,
    secrets: &'a dyn SecretBridge,
    config: &'a DatabaseConfig,
    table: Option<String>,
    schema: Option<String>,
    columns: String,
    column_names: Vec<String>,
    column_values: Vec<String>,
    set_column_names: Vec<String>,
    set_column_values: Vec<String>,
    host_name: Option<String>,
    secret_name: Option<String>,
    access_role: Option<String>,
}

/// A value exactly as it appears in SQL text
fn sql_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_list(step: &Step, key: &str) -> Vec<String> {
    step.get_list(key).iter().map(sql_text).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl<'a> DbHandler<'a> {
    pub fn new(
        step: &Step,
        sql: &'a dyn SqlBridge,
        secrets: &'a dyn SecretBridge,
        config: &'a DatabaseConfig,
    ) -> Self {
        let columns = match step.get("columns") {
            Some(Value::Array(items)) => items.iter().map(sql_text).collect::<Vec<_>>().join(","),
            Some(other) => sql_text(other),
            None => "*".to_string(),
        };

        Self {
            sql,
            secrets,
            config,
            table: non_empty(step.get_str("table_name")).map(|t| t.to_lowercase()),
            schema: non_empty(step.get_str("schema")),
            columns,
            column_names: text_list(step, "column_names"),
            column_values: text_list(step, "column_values"),
            set_column_names: text_list(step, "set_column_names"),
            set_column_values: text_list(step, "set_column_values"),
            host_name: non_empty(step.get_str("host_name")),
            secret_name: non_empty(step.get_str("secret_name")),
            access_role: non_empty(step.get_str("access_role")),
        }
    }

    pub async fn invoke(&self, verb: &str) -> Result<Value, ExecutorError> {
        let statement = self.statement(verb)?;
        debug!("Executing query: {}", statement);

        let settings = self.connection().await?;
        let read_timeout = Duration::from_secs(self.config.read_timeout_secs);
        let write_timeout = Duration::from_secs(self.config.write_timeout_secs);

        match verb {
            "select" | "count" => Ok(self
                .sql
                .fetch_first(&settings, &statement, read_timeout)
                .await?
                .map(Value::Object)
                .unwrap_or(Value::Null)),
            _ => {
                let summary = self.sql.execute(&settings, &statement, write_timeout).await?;
                Ok(serde_json::to_value(summary)?)
            }
        }
    }

    /// The SQL text a verb will run
    pub fn statement(&self, verb: &str) -> Result<String, ExecutorError> {
        let table = self
            .table
            .as_deref()
            .ok_or_else(|| ExecutorError::MissingParameter("table_name".to_string()))?;

        let statement = match verb {
            "select" => format!(
                "select {} from {}{} order by 1 desc limit 1",
                self.columns,
                table,
                self.where_clause()?
            ),
            "count" => format!(
                "select count(*) as count from {}{} order by 1 desc limit 1",
                table,
                self.where_clause()?
            ),
            "insert" => {
                if self.column_names.len() != self.column_values.len() {
                    return Err(length_mismatch("column_names", "column_values"));
                }
                format!(
                    "insert into {} ({}) values ({})",
                    table,
                    self.column_names.join(","),
                    self.column_values.join(",")
                )
            }
            "update" => {
                let assignments = pairs(
                    &self.set_column_names,
                    &self.set_column_values,
                    "set_column_names",
                    "set_column_values",
                )?;
                if assignments.is_empty() {
                    return Err(ExecutorError::MissingParameter("set_column_names".to_string()));
                }
                format!(
                    "update {} set {}{}",
                    table,
                    assignments.join(" , "),
                    self.required_where_clause()?
                )
            }
            "deletedb" => format!("delete from {}{}", table, self.required_where_clause()?),
            other => {
                return Err(ActionError::UnsupportedVerb {
                    family: OperationFamily::Database,
                    verb: other.to_string(),
                }
                .into())
            }
        };

        Ok(statement)
    }

    fn conditions(&self) -> Result<Vec<String>, ExecutorError> {
        pairs(
            &self.column_names,
            &self.column_values,
            "column_names",
            "column_values",
        )
    }

    fn where_clause(&self) -> Result<String, ExecutorError> {
        let conditions = self.conditions()?;
        if conditions.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" where {}", conditions.join(" and ")))
        }
    }

    /// Updates and deletes never run without a filter
    fn required_where_clause(&self) -> Result<String, ExecutorError> {
        if self.column_names.is_empty() {
            return Err(ExecutorError::MissingParameter("column_names".to_string()));
        }
        self.where_clause()
    }

    async fn connection(&self) -> Result<ConnectionSettings, ExecutorError> {
        let secret_name = self
            .secret_name
            .as_deref()
            .unwrap_or(&self.config.default_secret);
        let secret = self
            .secrets
            .fetch_secret(secret_name, self.access_role.as_deref())
            .await?;

        let entry = |key: &str| -> Result<String, ExecutorError> {
            secret
                .get(key)
                .map(sql_text)
                .ok_or_else(|| {
                    ExecutorError::ConfigError(format!(
                        "secret '{}' has no '{}' entry",
                        secret_name, key
                    ))
                })
        };

        match &self.schema {
            Some(schema) => Ok(ConnectionSettings::new(
                &entry(&format!("test_{}_host", schema))?,
                entry(&format!("test_{}_user", schema))?,
                entry(&format!("test_{}_password", schema))?,
            )),
            None => {
                let host = self
                    .host_name
                    .as_deref()
                    .ok_or_else(|| ExecutorError::MissingParameter("host_name or schema".to_string()))?;
                Ok(ConnectionSettings::new(
                    host,
                    entry("username")?,
                    entry("password")?,
                ))
            }
        }
    }
}

fn length_mismatch(names: &str, values: &str) -> ExecutorError {
    ExecutorError::InvalidParameter(format!("{} and {} differ in length", names, values))
}

/// `name=value` pairs
fn pairs(
    names: &[String],
    values: &[String],
    names_key: &str,
    values_key: &str,
) -> Result<Vec<String>, ExecutorError> {
    if names.len() != values.len() {
        return Err(length_mismatch(names_key, values_key));
    }
    Ok(names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{}={}", name, value))
        .collect())
}
