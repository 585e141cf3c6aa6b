//! Pipeline building and execution.
//!
//! This module provides:
//! - Node declarations and the validating builder
//! - The DAG runner with per-node retries
//! - Schedules and DAG-level defaults

mod builder;
mod dag;
mod retry;
mod schedule;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use dag::{GraphExecutionResult, NodeReport, StateTransition, TaskGraph};
pub use retry::{
    RetryDecision, RetryPolicy, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MS,
};
pub use schedule::{DagDefaults, Schedule, MAX_INTERVAL};
pub use spec::TaskSpec;
