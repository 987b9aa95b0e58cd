//! Cloud family: object storage, batch jobs, secrets, functions, queues and
//! analytics queries
//!
//! Actions:
//! - `s3upload` - put local `filename` into `first_bucket_name` under
//!   `key` + `filename`; returns `true`
//! - `s3download` - `bucket` / `key` as text, also written to `filename`
//!   when given
//! - `batch` - submit `job_name` to `job_queue` with `job_definition` (and
//!   optional `command`), then poll until it settles or `waitTime` polls
//!   pass; the final status must equal `status` (default `SUCCEEDED`)
//! - `secrets` - the secret document named by `secret_name`
//! - `calllambda` - invoke `function_name` with `payload`
//! - `sendsqs` / `receivesqs` - queue messages by `queue_name`
//! - `athena` - run `query`; with `wait`, poll for rows keyed by column
//!
//! Every action passes the step's `access_role` down so credentials can be
//! chained per call.

use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, warn};

use crate::bridge::{BatchJob, BridgeError, CloudBridge, QueryRequest, QueryState, SecretBridge};
use crate::engine::error::ExecutorError;
use crate::workflow::{ActionError, OperationFamily, RunnerConfig, Step};

const DEFAULT_JOB_STATUS: &str = "SUCCEEDED";
const DEFAULT_INVOCATION: &str = "RequestResponse";
const DEFAULT_DATABASE: &str = "default";

/// Job states that end the polling loop on their own
const SETTLED_STATES: &[&str] = &["SUCCEEDED", "FAILED"];
/// Still waiting for compute; cancelled when time runs out
const QUEUED_STATES: &[&str] = &["SUBMITTED", "PENDING", "RUNNABLE"];
/// Already running; terminated when time runs out
const RUNNING_STATES: &[&str] = &["STARTING", "STARTED", "RUNNING"];

pub struct CloudHandler<'a> {
    step: &'a Step,
    cloud: &'a dyn CloudBridge,
    secrets: &'a dyn SecretBridge,
    config: &'a RunnerConfig,
    access_role: Option<String>,
}

impl<'a> CloudHandler<'a> {
    pub fn new(
        step: &'a Step,
        cloud: &'a dyn CloudBridge,
        secrets: &'a dyn SecretBridge,
        config: &'a RunnerConfig,
    ) -> Self {
        Self {
            step,
            cloud,
            secrets,
            config,
            access_role: step.get_str("access_role").filter(|r| !r.is_empty()),
        }
    }

    pub async fn invoke(&self, verb: &str) -> Result<Value, ExecutorError> {
        match verb {
            "s3upload" => self.s3_upload().await,
            "s3download" => self.s3_download().await,
            "batch" => self.batch().await,
            "secrets" => self.secret().await,
            "calllambda" => self.call_function().await,
            "sendsqs" => self.send_queue().await,
            "receivesqs" => self.receive_queue().await,
            "athena" => self.query().await,
            other => Err(ActionError::UnsupportedVerb {
                family: OperationFamily::Cloud,
                verb: other.to_string(),
            }
            .into()),
        }
    }

    fn role(&self) -> Option<&str> {
        self.access_role.as_deref()
    }

    fn required(&self, key: &str) -> Result<String, ExecutorError> {
        self.step
            .get_str(key)
            .ok_or_else(|| ExecutorError::MissingParameter(key.to_string()))
    }

    // ========================================================================
    // Object storage
    // ========================================================================

    async fn s3_upload(&self) -> Result<Value, ExecutorError> {
        let filename = self.required("filename")?;
        let bucket = self.required("first_bucket_name")?;
        let key = format!("{}{}", self.step.get_str("key").unwrap_or_default(), filename);

        let body = tokio::fs::read(&filename)
            .await
            .map_err(|source| ExecutorError::Io {
                path: filename.clone(),
                source,
            })?;

        self.cloud.put_object(&bucket, &key, body, self.role()).await?;
        info!("Uploaded {} to s3://{}/{}", filename, bucket, key);
        Ok(Value::Bool(true))
    }

    async fn s3_download(&self) -> Result<Value, ExecutorError> {
        let bucket = self.required("bucket")?;
        let key = self.required("key")?;

        let text = self.cloud.get_object(&bucket, &key, self.role()).await?;
        info!("Downloaded s3://{}/{}", bucket, key);

        if let Some(filename) = self.step.get_str("filename") {
            tokio::fs::write(&filename, &text)
                .await
                .map_err(|source| ExecutorError::Io {
                    path: filename.clone(),
                    source,
                })?;
        }

        Ok(Value::String(text))
    }

    // ========================================================================
    // Batch jobs
    // ========================================================================

    async fn batch(&self) -> Result<Value, ExecutorError> {
        let job = BatchJob {
            name: self.required("job_name")?,
            queue: self.required("job_queue")?,
            definition: self.required("job_definition")?,
            command: match self.step.get("command") {
                Some(Value::Array(parts)) => Some(parts.iter().map(text).collect()),
                Some(other) => Some(vec![text(other)]),
                None => None,
            },
        };
        let max_polls = self
            .step
            .get_u64("waitTime")
            .unwrap_or(self.config.batch.default_wait);
        let expected = self
            .step
            .get_str("status")
            .unwrap_or_else(|| DEFAULT_JOB_STATUS.to_string());
        let interval = Duration::from_secs(self.config.batch.poll_interval_secs);

        let job_id = self.cloud.submit_job(&job, self.role()).await?;
        info!("Batch job submitted: {} with ID: {}", job.name, job_id);

        let mut polls = 0;
        loop {
            let status = self
                .cloud
                .job_status(&job_id, self.role())
                .await?
                .unwrap_or_default();
            info!("Job [{} - {}] {}", job.name, job_id, status);

            if SETTLED_STATES.contains(&status.as_str()) || polls > max_polls {
                self.stop_job(&job_id, &status).await;

                if status != expected {
                    return Err(BridgeError::CloudError(format!(
                        "Job {} status is not as expected. Current status is {}",
                        job_id, status
                    ))
                    .into());
                }
                return Ok(json!({ "job_id": job_id, "status": status }));
            }

            tokio::time::sleep(interval).await;
            polls += 1;
        }
    }

    /// Cancel or terminate a job left unfinished when polling gave up
    async fn stop_job(&self, job_id: &str, status: &str) {
        let outcome = if QUEUED_STATES.contains(&status) {
            self.cloud
                .cancel_job(job_id, "Cancelling job due to timeout", self.role())
                .await
        } else if RUNNING_STATES.contains(&status) {
            self.cloud
                .terminate_job(job_id, "Terminating job due to timeout", self.role())
                .await
        } else {
            return;
        };

        if let Err(e) = outcome {
            warn!("Failed to stop job {}: {}", job_id, e);
        }
    }

    // ========================================================================
    // Secrets, functions, queues
    // ========================================================================

    async fn secret(&self) -> Result<Value, ExecutorError> {
        let name = self.required("secret_name")?;
        let document = self.secrets.fetch_secret(&name, self.role()).await?;
        Ok(Value::Object(document))
    }

    async fn call_function(&self) -> Result<Value, ExecutorError> {
        let name = self.required("function_name")?;
        let invocation_type = self
            .step
            .get_str("invocation_type")
            .unwrap_or_else(|| DEFAULT_INVOCATION.to_string());
        let payload = self
            .step
            .get("payload")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let response = self
            .cloud
            .invoke_function(&name, &invocation_type, &payload, self.role())
            .await?;
        Ok(response)
    }

    async fn send_queue(&self) -> Result<Value, ExecutorError> {
        let queue = self.required("queue_name")?;
        let messages: Vec<String> = self.step.get_list("messages").iter().map(text).collect();

        self.cloud.send_messages(&queue, &messages, self.role()).await?;
        info!("Sent {} messages to queue {}", messages.len(), queue);
        Ok(Value::Null)
    }

    async fn receive_queue(&self) -> Result<Value, ExecutorError> {
        let queue = self.required("queue_name")?;
        let max_messages = self
            .step
            .get_u64("max_message_count")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(self.config.queue.default_max_messages);
        let wait = Duration::from_secs(self.config.queue.wait_time_secs);

        let bodies = self
            .cloud
            .receive_messages(&queue, max_messages, wait, self.role())
            .await?;
        info!("Received {} messages from queue {}", bodies.len(), queue);
        Ok(bodies.into_iter().map(Value::String).collect())
    }

    // ========================================================================
    // Analytics queries
    // ========================================================================

    async fn query(&self) -> Result<Value, ExecutorError> {
        let request = QueryRequest {
            query: self.required("query")?,
            database: self
                .step
                .get_str("database")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            output_location: format!("s3://{}", self.step.get_str("bucket").unwrap_or_default()),
        };

        let execution_id = self.cloud.start_query(&request, self.role()).await?;
        if !self.step.get_bool("wait") {
            info!("Not waiting for query {}", execution_id);
            return Ok(Value::String(execution_id));
        }

        let interval = Duration::from_secs(self.config.athena.poll_interval_secs);
        for _ in 0..self.config.athena.max_polls {
            match self.cloud.query_state(&execution_id, self.role()).await? {
                QueryState::Failed | QueryState::Cancelled => {
                    info!("Query {} did not succeed", execution_id);
                    return Ok(Value::Bool(false));
                }
                QueryState::Succeeded => {
                    let rows = self.cloud.query_rows(&execution_id, self.role()).await?;
                    return Ok(records(rows));
                }
                QueryState::Queued | QueryState::Running => {}
            }
            tokio::time::sleep(interval).await;
        }

        warn!("Query {} still running after {} polls", execution_id, self.config.athena.max_polls);
        Ok(Value::Bool(false))
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn a header row plus data rows into one mapping per data row
pub fn records(rows: Vec<Vec<Option<String>>>) -> Value {
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Value::Array(Vec::new());
    };

    rows.map(|row| {
        let record: Map<String, Value> = header
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = row
                    .get(i)
                    .cloned()
                    .flatten()
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                (column.clone().unwrap_or_default(), value)
            })
            .collect();
        Value::Object(record)
    })
    .collect()
}
