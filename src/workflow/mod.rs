//! Workflow types and definitions
//!
//! This module contains the declarative side of a run:
//! - `step` - Workflow, Step, ValueMap
//! - `action` - OperationFamily and ParsedAction for routing a step's verb
//! - `context` - ParamStore for runtime state
//! - `expressions` - Placeholder resolution for `<<key>>` syntax
//! - `loader` - Load workflows from files and directories
//! - `runner_config` - Backend configuration

pub mod action;
pub mod context;
pub mod expressions;
pub mod loader;
pub mod runner_config;
pub mod step;

pub use action::{ActionError, OperationFamily, ParsedAction};
pub use context::ParamStore;
pub use expressions::{resolve as resolve_placeholders, resolve_step, ExpressionError};
pub use loader::{LoadError, WorkflowLoader};
pub use runner_config::{ConfigError, RunnerConfig};
pub use step::{RawStep, Seconds, Step, ValueMap, Workflow};
