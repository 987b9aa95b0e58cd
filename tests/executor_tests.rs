mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testing_flows::engine::ExecutorError;
use testing_flows::prelude::*;

fn db_executor(sql: &Arc<RecordingSql>) -> Executor {
    executor_with(
        backends()
            .with_sql(sql.clone())
            .with_secrets(Arc::new(db_secret())),
    )
}

#[tokio::test]
async fn test_empty_flow_returns_resolved_store() {
    let executor = executor_with(backends());
    let yaml = r#"
flow name: seeds only
param_store:
  host: api.internal
  url: "https://<<host>>/v1"
  retries: 3
"#;

    let outcome = executor.run_yaml(yaml, None).await.unwrap();

    let store = outcome.params().unwrap();
    assert_eq!(store.get("url"), Some(&json!("https://api.internal/v1")));
    assert_eq!(store.get("retries"), Some(&json!(3)));
}

#[tokio::test]
async fn test_overrides_win_over_seed() {
    let executor = executor_with(backends());
    let yaml = r#"
param_store:
  env: dev
  label: "env-<<env>>"
"#;
    let mut overrides = ParamStore::new();
    overrides.insert("env", json!("qa"));

    let outcome = executor.run_yaml(yaml, Some(&overrides)).await.unwrap();

    let store = outcome.params().unwrap();
    assert_eq!(store.get("env"), Some(&json!("qa")));
    assert_eq!(store.get("label"), Some(&json!("env-qa")));
}

#[tokio::test]
async fn test_retry_until_success() {
    let sql = RecordingSql::new();
    sql.fail_next(2);
    sql.push_row(Some(json!({"id": 1})));

    let yaml = r#"
steps:
  - step: 1
    step name: lookup
    action: select
    table_name: users
    schema: accounts
    retry: 2
"#;
    let outcome = db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    assert!(!outcome.is_returned());
    assert_eq!(sql.sql().len(), 3);
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let sql = RecordingSql::new();
    sql.fail_next(5);

    let yaml = r#"
steps:
  - step: 1
    step name: lookup
    action: select
    table_name: users
    schema: accounts
    retry: 1
"#;
    let err = db_executor(&sql).run_yaml(yaml, None).await.unwrap_err();

    assert_eq!(sql.sql().len(), 2);
    assert!(err.to_string().starts_with("step 1 lookup failed"));
    assert!(matches!(err.root(), ExecutorError::BridgeError(_)));
}

#[tokio::test]
async fn test_zero_retry_runs_once() {
    let sql = RecordingSql::new();
    sql.fail_next(1);

    let yaml = r#"
steps:
  - action: count
    table_name: users
    schema: accounts
"#;
    assert!(db_executor(&sql).run_yaml(yaml, None).await.is_err());
    assert_eq!(sql.sql().len(), 1);
}

#[tokio::test]
async fn test_validation_shares_retry_budget() {
    let sql = RecordingSql::new();
    sql.fail_next(1);
    sql.push_row(Some(json!({"count": 0})));
    sql.push_row(Some(json!({"count": "2"})));

    let yaml = r#"
steps:
  - action: count
    table_name: orders
    schema: accounts
    retry: 2
    validate_response:
      count: 2
"#;
    db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    // one dispatch failure, one validation failure, one pass
    assert_eq!(sql.sql().len(), 3);
}

#[tokio::test]
async fn test_validation_failure_surfaces() {
    let sql = RecordingSql::new();
    sql.push_row(Some(json!({"status": "PENDING"})));
    sql.push_row(Some(json!({"status": "PENDING"})));

    let yaml = r#"
steps:
  - step: 4
    step name: check status
    action: select
    table_name: orders
    schema: accounts
    retry: 1
    validate_response:
      status: DONE
"#;
    let err = db_executor(&sql).run_yaml(yaml, None).await.unwrap_err();

    match err.root() {
        ExecutorError::ValidationFailed(mismatch) => {
            assert_eq!(mismatch.path, "status");
            assert_eq!(mismatch.actual, "PENDING");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(
        err.to_string(),
        "step 4 check status failed: Validation failed: Key: status Expected: DONE Actual: PENDING"
    );
}

#[tokio::test]
async fn test_null_validation_requires_missing_row() {
    let sql = RecordingSql::new();
    sql.push_row(None);

    let yaml = r#"
steps:
  - action: select
    table_name: users
    schema: accounts
    validate_response: null
"#;
    db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    let sql = RecordingSql::new();
    sql.push_row(Some(json!({"id": 1})));
    assert!(db_executor(&sql).run_yaml(yaml, None).await.is_err());
}

#[tokio::test]
async fn test_skipped_step_is_not_dispatched() {
    let sql = RecordingSql::new();

    let yaml = r#"
param_store:
  skip_cleanup: true
steps:
  - action: deletedb
    table_name: users
    schema: accounts
    column_names: [id]
    column_values: [1]
    skip_step: "<<skip_cleanup>>"
"#;
    db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    assert!(sql.sql().is_empty());
}

#[tokio::test]
async fn test_skipped_step_is_never_resolved() {
    let dir = create_test_dir();
    let marker = dir.path().join("after-skip.txt");

    let yaml = format!(
        r#"
param_store:
  name: alice
steps:
  - action: write
    skip_step: true
    write_data: "increment(name)"
    delay: "<<not_a_number>>"
  - action: write
    filename: "{}"
    write_data: "<<name>>"
"#,
        marker.display()
    );
    let outcome = executor_with(backends()).run_yaml(&yaml, None).await.unwrap();

    assert_eq!(outcome.params().unwrap().get("name"), Some(&json!("alice")));
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "alice");
}

#[tokio::test]
async fn test_step_name_and_flow_name_together() {
    let dir = create_test_dir();
    let marker = dir.path().join("labelled.txt");

    let yaml = format!(
        r#"
steps:
  - step: 1
    step name: write marker
    flow name: sub flow
    action: write
    filename: "{}"
    write_data: done
  - step: 2
    step name: read missing
    flow name: sub flow
    action: read
    filename: /nonexistent/testing-flows/missing.txt
"#,
        marker.display()
    );
    let err = executor_with(backends()).run_yaml(&yaml, None).await.unwrap_err();

    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "done");
    assert!(err.to_string().starts_with("step 2 read missing failed"));
    assert!(matches!(err.root(), ExecutorError::Io { .. }));
}

#[tokio::test]
async fn test_extracted_values_feed_later_steps() {
    let sql = RecordingSql::new();
    sql.push_row(Some(json!({"id": "42", "email": "a@example.com"})));

    let yaml = r#"
steps:
  - step: 1
    action: select
    table_name: users
    schema: accounts
    value_map:
      user_id: id|int
  - step: 2
    action: insert
    table_name: audit
    schema: accounts
    column_names: [user_id, next_id]
    column_values: ["<<user_id>>", "increment(user_id)"]
"#;
    let outcome = db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    assert_eq!(outcome.params().unwrap().get("user_id"), Some(&json!(42)));
    assert_eq!(
        sql.sql()[1],
        "insert into audit (user_id,next_id) values (42,43)"
    );
}

#[tokio::test]
async fn test_return_ends_flow_with_result() {
    let sql = RecordingSql::new();
    sql.push_row(Some(json!({"count": 7})));

    let yaml = r#"
steps:
  - action: count
    table_name: users
    schema: accounts
    return: true
  - action: deletedb
    table_name: users
    schema: accounts
    column_names: [id]
    column_values: [1]
"#;
    let outcome = db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    assert_eq!(outcome, FlowOutcome::Returned(json!({"count": 7})));
    assert_eq!(sql.sql().len(), 1);
}

#[tokio::test]
async fn test_unknown_action_fails_without_retry() {
    let executor = executor_with(backends());
    let yaml = r#"
steps:
  - step: 1
    step name: bogus
    action: teleport
    retry: 5
"#;
    let err = executor.run_yaml(yaml, None).await.unwrap_err();

    assert!(matches!(err.root(), ExecutorError::UnknownAction(_)));
    assert!(err.to_string().contains("step 1 bogus"));
}

#[tokio::test]
async fn test_missing_parameter_is_not_retried() {
    let sql = RecordingSql::new();
    let yaml = r#"
steps:
  - action: select
    schema: accounts
    retry: 3
"#;
    let err = db_executor(&sql).run_yaml(yaml, None).await.unwrap_err();

    assert!(matches!(err.root(), ExecutorError::MissingParameter(_)));
    assert!(sql.sql().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_post_step_delay() {
    let sql = RecordingSql::new();
    let start = tokio::time::Instant::now();

    let yaml = r#"
steps:
  - action: count
    table_name: users
    schema: accounts
    delay: "2.5"
"#;
    db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_between_attempts() {
    let sql = RecordingSql::new();
    sql.fail_next(2);
    let start = tokio::time::Instant::now();

    let yaml = r#"
steps:
  - action: count
    table_name: users
    schema: accounts
    retry: 2
    retry_delay: 3
"#;
    db_executor(&sql).run_yaml(yaml, None).await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6));
    assert!(elapsed < Duration::from_secs(7));
}

#[tokio::test]
async fn test_run_json() {
    let executor = executor_with(backends());
    let json = r#"{"flow name": "json flow", "param_store": {"a": 1}, "steps": []}"#;

    let outcome = executor.run_json(json, None).await.unwrap();

    assert_eq!(outcome.into_value(), json!({"a": 1}));
}

#[tokio::test]
async fn test_workflow_is_not_mutated() {
    let sql = RecordingSql::new();
    let workflow = WorkflowLoader::from_yaml(
        r#"
param_store:
  table: users
steps:
  - action: count
    table_name: "<<table>>"
    schema: accounts
"#,
    )
    .unwrap();

    db_executor(&sql).run(&workflow, None).await.unwrap();

    assert_eq!(workflow.steps[0].get("table_name"), Some(&json!("<<table>>")));
    assert_eq!(sql.sql()[0], "select count(*) as count from users order by 1 desc limit 1");
}
