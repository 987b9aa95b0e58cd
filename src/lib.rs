//! # Testing Flows
//!
//! A declarative workflow interpreter for integration test scenarios. A
//! flow is an ordered list of steps plus a parameter store; each step names
//! a verb that runs against one backend, and the engine handles retries,
//! response validation, value extraction and parameter passing the same
//! way for all of them.
//!
//! ## Features
//!
//! - **Operation families** - HTTP/GraphQL, MySQL, local files, AWS
//!   resources (feature `aws`) and Kafka events (feature `kafka`)
//! - **Placeholders** - `<<key>>` substitution from the parameter store,
//!   plus `increment(key)`
//! - **Retries** - one budget shared by dispatch and validation failures
//! - **Value maps** - `data/items[0]/id|int` paths copied into the store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use testing_flows::{Executor, FlowOutcome};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let flow = r#"
//! flow name: create user
//! param_store:
//!   base_url: http://localhost:8080
//! steps:
//!   - step: 1
//!     step name: create
//!     action: post
//!     end point: "<<base_url>>/users"
//!     body: { name: alice }
//!     status: 201
//!     value_map:
//!       user_id: id|int
//!   - step: 2
//!     step name: fetch
//!     action: get
//!     end point: "<<base_url>>/users/<<user_id>>"
//!     validate_response: { name: alice }
//! "#;
//!
//!     let executor = Executor::new()?;
//!     if let FlowOutcome::Completed(store) = executor.run_yaml(flow, None).await? {
//!         println!("user_id = {:?}", store.get("user_id"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod engine;
pub mod workflow;

// Re-export main types
pub use bridge::{Backends, BridgeError, WebBridge, WebResponse};
pub use engine::{Executor, ExecutorError, FlowOutcome, ValidationError};
pub use workflow::{
    LoadError, OperationFamily, ParamStore, ParsedAction, RunnerConfig, Step, ValueMap, Workflow,
    WorkflowLoader,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{
        Backends, CloudBridge, EventBridge, EventSubscription, SecretBridge, SqlBridge,
    };
    pub use crate::engine::{Executor, ExecutorError, FlowOutcome};
    pub use crate::workflow::{
        LoadError, ParamStore, RunnerConfig, Step, ValueMap, Workflow, WorkflowLoader,
    };
}
