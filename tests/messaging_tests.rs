mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testing_flows::bridge::BridgeError;
use testing_flows::engine::ExecutorError;
use testing_flows::prelude::*;

fn events_executor(events: &Arc<FakeEvents>) -> Executor {
    executor_with(backends().with_events(events.clone()))
}

#[tokio::test]
async fn test_send_event_publishes_resolved_body() {
    let events = FakeEvents::new();

    let yaml = r#"
param_store:
  order_id: A1
steps:
  - action: send_event
    topic: orders.created
    event:
      order:
        id: "<<order_id>>"
"#;
    events_executor(&events).run_yaml(yaml, None).await.unwrap();

    assert_eq!(
        events.published.lock().unwrap().as_slice(),
        &[("orders.created".to_string(), json!({"order": {"id": "A1"}}))]
    );
}

#[tokio::test]
async fn test_read_event_skips_non_matching() {
    let events = FakeEvents::new();
    events.queue(vec![
        json!({"order": {"id": "A0", "status": "NEW"}}),
        json!({"order": {"id": "A1", "status": "PAID"}}),
        json!({"order": {"id": "A1", "status": "NEW"}, "seq": 3}),
    ]);

    let yaml = r#"
steps:
  - action: read_event
    topic: orders.created
    group_id: flow-tests
    event:
      order.id: A1
      order.status: NEW
    value_map:
      seq: seq
"#;
    let outcome = events_executor(&events).run_yaml(yaml, None).await.unwrap();

    assert_eq!(outcome.params().unwrap().get("seq"), Some(&json!(3)));
    assert_eq!(
        events.subscriptions.lock().unwrap()[0],
        ("orders.created".to_string(), "flow-tests".to_string())
    );
    assert!(events.was_closed());
}

#[tokio::test]
async fn test_read_event_without_filter_takes_first() {
    let events = FakeEvents::new();
    events.queue(vec![json!({"n": 1}), json!({"n": 2})]);

    let yaml = r#"
steps:
  - action: read_event
    topic: ticks
    return: true
"#;
    let outcome = events_executor(&events).run_yaml(yaml, None).await.unwrap();

    assert_eq!(outcome.into_value(), json!({"n": 1}));
    assert_eq!(
        events.subscriptions.lock().unwrap()[0].1,
        "automation-consumer-group"
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_event_times_out_and_closes() {
    let events = FakeEvents::new();
    events.queue(vec![json!({"order": {"id": "other"}})]);
    let start = tokio::time::Instant::now();

    let yaml = r#"
steps:
  - action: read_event
    topic: orders.created
    event:
      order.id: A1
"#;
    let err = events_executor(&events).run_yaml(yaml, None).await.unwrap_err();

    assert!(matches!(err.root(), ExecutorError::Timeout(_)));
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert!(events.was_closed());
}

#[tokio::test]
async fn test_undecodable_message_fails_step() {
    let events = FakeEvents::new();
    events.queue_garbage();

    let yaml = r#"
steps:
  - action: read_event
    topic: orders.created
"#;
    let err = events_executor(&events).run_yaml(yaml, None).await.unwrap_err();

    assert!(matches!(
        err.root(),
        ExecutorError::BridgeError(BridgeError::MessagingError(_))
    ));
    assert!(events.was_closed());
}

#[tokio::test]
async fn test_messaging_disabled_by_default() {
    if cfg!(feature = "kafka") {
        return;
    }

    let yaml = r#"
steps:
  - action: send_event
    topic: t
    event: {a: 1}
"#;
    let err = executor_with(backends()).run_yaml(yaml, None).await.unwrap_err();

    assert!(matches!(
        err.root(),
        ExecutorError::BridgeError(BridgeError::ConfigError(_))
    ));
}
