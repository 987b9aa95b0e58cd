//! Workflow execution engine module
//!
//! This module contains:
//! - `executor` - The Flow Executor
//! - `actions` - Operation handlers, one per family
//! - `validator` - Response validation
//! - `extractor` - Value extraction into the parameter store
//! - `error` - Executor error types
//! - `result` - Run outcome

pub mod actions;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod result;
pub mod validator;

pub use actions::Handler;
pub use error::ExecutorError;
pub use executor::Executor;
pub use extractor::{extract, lookup};
pub use result::FlowOutcome;
pub use validator::{normalized, validate, ValidationError};
