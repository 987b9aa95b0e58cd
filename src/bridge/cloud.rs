//! Cloud resource operations
//!
//! The cloud handler drives polling and shapes results; this trait only
//! covers the single service calls underneath. Every call takes the step's
//! optional access role so implementations can pick credentials per call.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::BridgeError;

/// A batch job submission
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub name: String,
    pub queue: String,
    pub definition: String,
    /// Container command override
    pub command: Option<Vec<String>>,
}

/// An analytics query submission
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub database: String,
    /// Result location, e.g. `s3://bucket/prefix`
    pub output_location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[async_trait]
pub trait CloudBridge: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError>;

    /// Object body as text
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError>;

    /// Returns the job id
    async fn submit_job(
        &self,
        job: &BatchJob,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError>;

    /// Current status name (`SUBMITTED`, `RUNNING`, `SUCCEEDED`, ...)
    async fn job_status(
        &self,
        job_id: &str,
        access_role: Option<&str>,
    ) -> Result<Option<String>, BridgeError>;

    async fn cancel_job(
        &self,
        job_id: &str,
        reason: &str,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError>;

    async fn terminate_job(
        &self,
        job_id: &str,
        reason: &str,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError>;

    /// Invoke a function; returns its decoded response payload, or null
    async fn invoke_function(
        &self,
        name: &str,
        invocation_type: &str,
        payload: &Value,
        access_role: Option<&str>,
    ) -> Result<Value, BridgeError>;

    async fn send_messages(
        &self,
        queue_name: &str,
        messages: &[String],
        access_role: Option<&str>,
    ) -> Result<(), BridgeError>;

    /// Message bodies received within one long poll
    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: u32,
        wait: Duration,
        access_role: Option<&str>,
    ) -> Result<Vec<String>, BridgeError>;

    /// Returns the query execution id
    async fn start_query(
        &self,
        request: &QueryRequest,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError>;

    async fn query_state(
        &self,
        execution_id: &str,
        access_role: Option<&str>,
    ) -> Result<QueryState, BridgeError>;

    /// Result rows, header row first
    async fn query_rows(
        &self,
        execution_id: &str,
        access_role: Option<&str>,
    ) -> Result<Vec<Vec<Option<String>>>, BridgeError>;
}

/// Stand-in used when the crate is built without the `aws` feature
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudNotEnabled;

fn not_enabled() -> BridgeError {
    BridgeError::ConfigError("cloud operations require the `aws` feature".to_string())
}

#[async_trait]
impl CloudBridge for CloudNotEnabled {
    async fn put_object(&self, _: &str, _: &str, _: Vec<u8>, _: Option<&str>) -> Result<(), BridgeError> {
        Err(not_enabled())
    }

    async fn get_object(&self, _: &str, _: &str, _: Option<&str>) -> Result<String, BridgeError> {
        Err(not_enabled())
    }

    async fn submit_job(&self, _: &BatchJob, _: Option<&str>) -> Result<String, BridgeError> {
        Err(not_enabled())
    }

    async fn job_status(&self, _: &str, _: Option<&str>) -> Result<Option<String>, BridgeError> {
        Err(not_enabled())
    }

    async fn cancel_job(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), BridgeError> {
        Err(not_enabled())
    }

    async fn terminate_job(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), BridgeError> {
        Err(not_enabled())
    }

    async fn invoke_function(
        &self,
        _: &str,
        _: &str,
        _: &Value,
        _: Option<&str>,
    ) -> Result<Value, BridgeError> {
        Err(not_enabled())
    }

    async fn send_messages(&self, _: &str, _: &[String], _: Option<&str>) -> Result<(), BridgeError> {
        Err(not_enabled())
    }

    async fn receive_messages(
        &self,
        _: &str,
        _: u32,
        _: Duration,
        _: Option<&str>,
    ) -> Result<Vec<String>, BridgeError> {
        Err(not_enabled())
    }

    async fn start_query(&self, _: &QueryRequest, _: Option<&str>) -> Result<String, BridgeError> {
        Err(not_enabled())
    }

    async fn query_state(&self, _: &str, _: Option<&str>) -> Result<QueryState, BridgeError> {
        Err(not_enabled())
    }

    async fn query_rows(
        &self,
        _: &str,
        _: Option<&str>,
    ) -> Result<Vec<Vec<Option<String>>>, BridgeError> {
        Err(not_enabled())
    }
}
