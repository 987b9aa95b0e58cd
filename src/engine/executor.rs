//! Flow Executor - runs a workflow's steps in order
//!
//! For each step the executor:
//! 1. Skips it when `skip_step` resolves to true
//! 2. Resolves `<<key>>` placeholders against the live parameter store
//! 3. Routes the verb to its operation family
//! 4. Invokes the handler, validating the result, until an attempt passes
//!    or the retry budget is spent
//! 5. Copies `value_map` values into the store
//! 6. Ends the run early when `return` is set
//! 7. Sleeps for the post-step `delay`

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bridge::Backends;
use crate::engine::actions::Handler;
use crate::engine::error::ExecutorError;
use crate::engine::extractor::extract;
use crate::engine::result::FlowOutcome;
use crate::engine::validator::validate;
use crate::workflow::expressions::{resolve_store, skip_requested};
use crate::workflow::step::raw_label;
use crate::workflow::*;

/// The workflow interpreter
#[derive(Debug, Clone)]
pub struct Executor {
    backends: Backends,
}

impl Executor {
    /// Executor with the default backend configuration
    pub fn new() -> Result<Self, ExecutorError> {
        Self::with_config(RunnerConfig::default())
    }

    /// Executor whose backends are built from a runner configuration
    pub fn with_config(config: RunnerConfig) -> Result<Self, ExecutorError> {
        Ok(Self::with_backends(Backends::from_config(config)?))
    }

    /// Executor over explicit backends (for testing with fakes)
    pub fn with_backends(backends: Backends) -> Self {
        Self { backends }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Run a workflow from YAML text
    #[instrument(skip_all)]
    pub async fn run_yaml(
        &self,
        yaml: &str,
        overrides: Option<&ParamStore>,
    ) -> Result<FlowOutcome, ExecutorError> {
        let workflow: Workflow = serde_yaml::from_str(yaml)?;
        self.run(&workflow, overrides).await
    }

    /// Run a workflow from JSON text
    #[instrument(skip_all)]
    pub async fn run_json(
        &self,
        json: &str,
        overrides: Option<&ParamStore>,
    ) -> Result<FlowOutcome, ExecutorError> {
        let workflow: Workflow = serde_json::from_str(json)?;
        self.run(&workflow, overrides).await
    }

    /// Run a workflow. `overrides` win over the workflow's own
    /// `param_store`. The workflow itself is never modified.
    #[instrument(
        skip_all,
        fields(flow = %workflow.display_name(), run_id = %Uuid::new_v4())
    )]
    pub async fn run(
        &self,
        workflow: &Workflow,
        overrides: Option<&ParamStore>,
    ) -> Result<FlowOutcome, ExecutorError> {
        info!(
            "Starting flow: {} ({} steps)",
            workflow.display_name(),
            workflow.steps.len()
        );

        let seeded = ParamStore::seeded(&workflow.param_store, overrides);
        let mut store = resolve_store(&seeded)?;

        for (index, raw) in workflow.steps.iter().enumerate() {
            let skip = skip_requested(raw, &store)
                .map_err(|e| ExecutorError::from(e).in_step(raw_label(raw, index)))?;
            if skip {
                info!("Skipping {}", raw_label(raw, index));
                continue;
            }

            let step = resolve_step(raw, &store)
                .map_err(|e| ExecutorError::from(e).in_step(raw_label(raw, index)))?;
            let label = step.label(index);

            let action = ParsedAction::for_step(&step)
                .map_err(|e| ExecutorError::from(e).in_step(&label))?;
            info!("Running {} ({})", label, action);

            let result = match self.execute_step(&step, &action).await {
                Ok(result) => result,
                Err(e) => {
                    error!("{} failed: {}", label, e);
                    return Err(e.in_step(&label));
                }
            };

            if step.log {
                info!(
                    "{} result:\n{}",
                    label,
                    serde_json::to_string_pretty(&result)?
                );
            }

            if let Some(value_map) = &step.value_map {
                let written = extract(&result, value_map, &mut store);
                debug!("{} stored {} values", label, written);
            }

            if step.return_result {
                info!("{} returned; ending flow", label);
                return Ok(FlowOutcome::Returned(result));
            }

            if let Some(delay) = step.post_delay() {
                info!("Waiting {:?} after {}", delay, label);
                tokio::time::sleep(delay).await;
            }
        }

        info!("Flow completed: {}", workflow.display_name());
        Ok(FlowOutcome::Completed(store))
    }

    /// Invoke and validate a step, retrying failures of either kind from
    /// one shared budget of `retry + 1` attempts
    #[instrument(skip_all, fields(action = %action))]
    async fn execute_step(
        &self,
        step: &Step,
        action: &ParsedAction,
    ) -> Result<Value, ExecutorError> {
        let handler = Handler::build(action.family, step, &self.backends);
        let attempts = step.retry.saturating_add(1);
        let wait = step.retry_wait();

        let mut attempt = 1;
        loop {
            match attempt_once(&handler, &action.verb, step.validate_response.as_ref()).await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() || attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

async fn attempt_once(
    handler: &Handler<'_>,
    verb: &str,
    expected: Option<&Value>,
) -> Result<Value, ExecutorError> {
    let result = handler.invoke(verb).await?;
    if let Some(expected) = expected {
        validate(expected, &result)?;
    }
    Ok(result)
}
