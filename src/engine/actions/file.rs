//! File family: local text files
//!
//! Actions:
//! - `read` - the file's lines (split on `\n`, so a trailing newline
//!   yields a final empty line)
//! - `write` - replace the file with `write_data`; a list is joined with
//!   newlines, a missing value writes an empty file
//!
//! ```yaml
//! - action: write
//!   filename: /tmp/ids.txt
//!   write_data: ["<<first_id>>", "<<second_id>>"]
//! ```

use serde_json::Value;
use tracing::debug;

use crate::engine::error::ExecutorError;
use crate::workflow::{ActionError, OperationFamily, Step};

pub struct FileHandler {
    filename: Option<String>,
    write_data: Option<Value>,
}

impl FileHandler {
    pub fn new(step: &Step) -> Self {
        Self {
            filename: step.get_str("filename"),
            write_data: step.get("write_data").cloned(),
        }
    }

    pub async fn invoke(&self, verb: &str) -> Result<Value, ExecutorError> {
        match verb {
            "read" => self.read().await,
            "write" => self.write().await,
            other => Err(ActionError::UnsupportedVerb {
                family: OperationFamily::File,
                verb: other.to_string(),
            }
            .into()),
        }
    }

    fn path(&self) -> Result<&str, ExecutorError> {
        self.filename
            .as_deref()
            .ok_or_else(|| ExecutorError::MissingParameter("filename".to_string()))
    }

    async fn read(&self) -> Result<Value, ExecutorError> {
        let path = self.path()?;
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ExecutorError::Io {
                path: path.to_string(),
                source,
            })?;

        Ok(Value::Array(
            content.split('\n').map(Value::from).collect(),
        ))
    }

    async fn write(&self) -> Result<Value, ExecutorError> {
        let path = self.path()?;
        let content = self.content();
        debug!("Writing {} bytes to {}", content.len(), path);

        tokio::fs::write(path, content)
            .await
            .map_err(|source| ExecutorError::Io {
                path: path.to_string(),
                source,
            })?;

        Ok(Value::Null)
    }

    fn content(&self) -> String {
        match &self.write_data {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(Value::Array(lines)) => lines
                .iter()
                .map(|line| match line {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Some(other) => other.to_string(),
        }
    }
}
