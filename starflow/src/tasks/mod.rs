//! Task trait and the pipeline's task types.
//!
//! Every node of the graph is a [`Task`]. The four loaders/checkers are
//! independent implementations; they share nothing but this trait and the
//! [`TaskContext`] they receive.

mod dimension;
mod fact;
mod marker;
mod quality;
mod script;
mod staging;

pub use dimension::{DimensionLoader, LoadMode};
pub use fact::FactLoader;
pub use marker::MarkerTask;
pub use quality::{QualityCheck, QualityChecker, QualityChecks};
pub use script::SqlTask;
pub use staging::{StagingConfig, StagingLoader};

use crate::context::TaskContext;
use crate::core::{TaskKind, TaskOutput};
use crate::errors::StarflowError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Warehouse connection id used when a task does not name one.
pub const DEFAULT_CONNECTION_ID: &str = "redshift";

/// Credential id used by staging loads when none is given.
pub const DEFAULT_CREDENTIALS_ID: &str = "aws_credentials";

/// Object-storage region used by staging loads when none is given.
pub const DEFAULT_REGION: &str = "us-west-2";

/// A unit of work in a pipeline graph.
#[async_trait]
pub trait Task: Send + Sync + Debug {
    /// Returns the task name.
    fn name(&self) -> &str;

    /// Returns the kind of work the task performs.
    fn kind(&self) -> TaskKind {
        TaskKind::Custom
    }

    /// Warehouse connection ids the task resolves when it runs.
    fn connection_ids(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Credential ids the task resolves when it runs.
    fn credential_ids(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Executes the task once.
    ///
    /// Retrying is the graph's job; implementations run their statements once
    /// and report the first error.
    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError>;
}

/// A closure-backed task, handy for custom steps and tests.
pub struct FnTask<F>
where
    F: Fn(&TaskContext) -> Result<TaskOutput, StarflowError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnTask<F>
where
    F: Fn(&TaskContext) -> Result<TaskOutput, StarflowError> + Send + Sync,
{
    /// Creates a new function-based task.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnTask<F>
where
    F: Fn(&TaskContext) -> Result<TaskOutput, StarflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn(&TaskContext) -> Result<TaskOutput, StarflowError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        (self.func)(ctx)
    }
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), StarflowError> {
    if value.trim().is_empty() {
        return Err(StarflowError::config(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Builds `INSERT INTO <table> <select>`.
pub(crate) fn insert_statement(table: &str, select_sql: &str) -> String {
    format!("INSERT INTO {table} {}", select_sql.trim())
}

/// Builds `DELETE FROM <table>`.
pub(crate) fn delete_statement(table: &str) -> String {
    format!("DELETE FROM {table}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineContext, RunIdentity};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_task() {
        let task = FnTask::new("custom", |ctx| {
            Ok(TaskOutput::ok_value("task", serde_json::json!(ctx.task_name())))
        });
        let ctx = TaskContext::new(Arc::new(PipelineContext::new(RunIdentity::new())), "custom", 1);

        assert_eq!(task.name(), "custom");
        assert_eq!(task.kind(), TaskKind::Custom);
        assert!(task.connection_ids().is_empty());
        assert!(task.credential_ids().is_empty());
        let output = task.execute(&ctx).await.unwrap();
        assert_eq!(output.get("task"), Some(&serde_json::json!("custom")));
    }

    #[test]
    fn test_statement_builders() {
        assert_eq!(
            insert_statement("users", "\n  SELECT DISTINCT userid FROM staging_events\n"),
            "INSERT INTO users SELECT DISTINCT userid FROM staging_events"
        );
        assert_eq!(delete_statement("users"), "DELETE FROM users");
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("table", "songs").is_ok());
        assert!(require_non_empty("table", "  ").is_err());
    }
}
