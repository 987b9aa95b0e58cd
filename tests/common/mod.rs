#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use testing_flows::bridge::{
    BatchJob, BridgeError, ConnectionSettings, QueryRequest, QueryState, StaticSecrets,
    WriteSummary,
};
use testing_flows::prelude::*;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_workflow(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write workflow file");
}

pub fn write_runner_config(dir: &Path, content: &str) {
    fs::write(dir.join("runner.yaml"), content).expect("Failed to write runner.yaml");
}

/// A flow whose only step writes `content` to `target`
pub fn file_workflow(name: &str, target: &Path, content: &str) -> String {
    format!(
        r#"
flow name: {}
steps:
  - step: 1
    step name: write marker
    action: write
    filename: "{}"
    write_data: "{}"
"#,
        name,
        target.display(),
        content
    )
}

/// A flow that reads a file that does not exist
pub fn failing_workflow(name: &str) -> String {
    format!(
        r#"
flow name: {}
steps:
  - step: 1
    action: read
    filename: /nonexistent/testing-flows/missing.txt
"#,
        name
    )
}

/// Default backends with the given fakes swapped in
pub fn backends() -> Backends {
    Backends::from_config(RunnerConfig::default()).expect("default backends")
}

pub fn executor_with(backends: Backends) -> Executor {
    Executor::with_backends(backends)
}

pub fn db_secret() -> StaticSecrets {
    let mut doc = Map::new();
    doc.insert("test_accounts_host".into(), "db.internal:3307".into());
    doc.insert("test_accounts_user".into(), "svc".into());
    doc.insert("test_accounts_password".into(), "hunter2".into());
    doc.insert("username".into(), "admin".into());
    doc.insert("password".into(), "pw".into());
    StaticSecrets::default().with_secret("test/urf-db-credentials", doc)
}

// ============================================================================
// SQL
// ============================================================================

#[derive(Default)]
pub struct RecordingSql {
    pub statements: Mutex<Vec<(ConnectionSettings, String, Duration)>>,
    rows: Mutex<VecDeque<Option<Map<String, Value>>>>,
    failures: Mutex<usize>,
}

impl RecordingSql {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the result of the next `fetch_first`
    pub fn push_row(&self, row: Option<Value>) {
        let row = row.and_then(|v| v.as_object().cloned());
        self.rows.lock().unwrap().push_back(row);
    }

    /// Fail the next `n` calls with a retryable database error
    pub fn fail_next(&self, n: usize) {
        *self.failures.lock().unwrap() = n;
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .map(|(_, sql, _)| sql.clone())
            .collect()
    }

    fn record(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<(), BridgeError> {
        self.statements
            .lock()
            .unwrap()
            .push((settings.clone(), sql.to_string(), timeout));

        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(BridgeError::DatabaseError("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SqlBridge for RecordingSql {
    async fn fetch_first(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<Option<Map<String, Value>>, BridgeError> {
        self.record(settings, sql, timeout)?;
        Ok(self.rows.lock().unwrap().pop_front().flatten())
    }

    async fn execute(
        &self,
        settings: &ConnectionSettings,
        sql: &str,
        timeout: Duration,
    ) -> Result<WriteSummary, BridgeError> {
        self.record(settings, sql, timeout)?;
        Ok(WriteSummary {
            rows_affected: 1,
            last_insert_id: 0,
        })
    }
}

// ============================================================================
// Cloud
// ============================================================================

#[derive(Default)]
pub struct FakeCloud {
    pub calls: Mutex<Vec<String>>,
    pub objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    pub sent: Mutex<Vec<(String, Vec<String>)>>,
    job_statuses: Mutex<VecDeque<String>>,
    query_states: Mutex<VecDeque<QueryState>>,
    pub query_rows: Mutex<Vec<Vec<Option<String>>>>,
    pub inbox: Mutex<Vec<String>>,
    pub function_response: Mutex<Value>,
    pub roles: Mutex<Vec<Option<String>>>,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Statuses returned by successive `job_status` calls; the last repeats
    pub fn job_statuses(&self, statuses: &[&str]) {
        *self.job_statuses.lock().unwrap() = statuses.iter().map(|s| s.to_string()).collect();
    }

    /// States returned by successive `query_state` calls; the last repeats
    pub fn query_states(&self, states: &[QueryState]) {
        *self.query_states.lock().unwrap() = states.iter().copied().collect();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, role: Option<&str>) {
        self.calls.lock().unwrap().push(call);
        self.roles.lock().unwrap().push(role.map(str::to_string));
    }
}

fn next_or_last<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl CloudBridge for FakeCloud {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        access_role: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.record(format!("put_object {} {}", bucket, key), access_role);
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        access_role: Option<&str>,
    ) -> Result<String, BridgeError> {
        self.record(format!("get_object {} {}", bucket, key), access_role);
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .ok_or_else(|| BridgeError::CloudError(format!("NoSuchKey: {}", key)))
    }

    async fn submit_job(&self, job: &BatchJob, access_role: Option<&str>) -> Result<String, BridgeError> {
        self.record(format!("submit_job {} {}", job.name, job.queue), access_role);
        Ok("job-1".to_string())
    }

    async fn job_status(&self, job_id: &str, access_role: Option<&str>) -> Result<Option<String>, BridgeError> {
        self.record(format!("job_status {}", job_id), access_role);
        Ok(next_or_last(&self.job_statuses))
    }

    async fn cancel_job(&self, job_id: &str, _: &str, access_role: Option<&str>) -> Result<(), BridgeError> {
        self.record(format!("cancel_job {}", job_id), access_role);
        Ok(())
    }

    async fn terminate_job(&self, job_id: &str, _: &str, access_role: Option<&str>) -> Result<(), BridgeError> {
        self.record(format!("terminate_job {}", job_id), access_role);
        Ok(())
    }

    async fn invoke_function(
        &self,
        name: &str,
        invocation_type: &str,
        payload: &Value,
        access_role: Option<&str>,
    ) -> Result<Value, BridgeError> {
        self.record(
            format!("invoke_function {} {} {}", name, invocation_type, payload),
            access_role,
        );
        Ok(self.function_response.lock().unwrap().clone())
    }

    async fn send_messages(
        &self,
        queue_name: &str,
        messages: &[String],
        access_role: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.record(format!("send_messages {}", queue_name), access_role);
        self.sent
            .lock()
            .unwrap()
            .push((queue_name.to_string(), messages.to_vec()));
        Ok(())
    }

    async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: u32,
        wait: Duration,
        access_role: Option<&str>,
    ) -> Result<Vec<String>, BridgeError> {
        self.record(
            format!("receive_messages {} {} {}", queue_name, max_messages, wait.as_secs()),
            access_role,
        );
        let inbox = self.inbox.lock().unwrap();
        Ok(inbox.iter().take(max_messages as usize).cloned().collect())
    }

    async fn start_query(&self, request: &QueryRequest, access_role: Option<&str>) -> Result<String, BridgeError> {
        self.record(
            format!("start_query {} {}", request.database, request.output_location),
            access_role,
        );
        Ok("query-1".to_string())
    }

    async fn query_state(&self, execution_id: &str, access_role: Option<&str>) -> Result<QueryState, BridgeError> {
        self.record(format!("query_state {}", execution_id), access_role);
        Ok(next_or_last(&self.query_states).unwrap_or(QueryState::Running))
    }

    async fn query_rows(
        &self,
        execution_id: &str,
        access_role: Option<&str>,
    ) -> Result<Vec<Vec<Option<String>>>, BridgeError> {
        self.record(format!("query_rows {}", execution_id), access_role);
        Ok(self.query_rows.lock().unwrap().clone())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Default)]
pub struct FakeEvents {
    pub published: Mutex<Vec<(String, Value)>>,
    pub subscriptions: Mutex<Vec<(String, String)>>,
    queued: Mutex<Vec<Result<Value, String>>>,
    pub closed: Arc<AtomicBool>,
}

impl FakeEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Messages the next subscription delivers, in order; after them the
    /// subscription waits forever
    pub fn queue(&self, events: Vec<Value>) {
        *self.queued.lock().unwrap() = events.into_iter().map(Ok).collect();
    }

    /// Deliver a message that cannot be decoded
    pub fn queue_garbage(&self) {
        self.queued
            .lock()
            .unwrap()
            .push(Err("expected value at line 1 column 1".into()));
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBridge for FakeEvents {
    async fn publish(&self, topic: &str, event: &Value) -> Result<(), BridgeError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group_id: &str,
    ) -> Result<Box<dyn EventSubscription>, BridgeError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((topic.to_string(), group_id.to_string()));
        let events = std::mem::take(&mut *self.queued.lock().unwrap());
        Ok(Box::new(FakeSubscription {
            events: events.into(),
            closed: self.closed.clone(),
        }))
    }
}

pub struct FakeSubscription {
    events: VecDeque<Result<Value, String>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl EventSubscription for FakeSubscription {
    async fn next_event(&mut self) -> Result<Option<Value>, BridgeError> {
        match self.events.pop_front() {
            Some(Ok(event)) => Ok(Some(event)),
            Some(Err(message)) => Err(BridgeError::MessagingError(message)),
            None => futures::future::pending().await,
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BridgeError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
