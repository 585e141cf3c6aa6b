//! Mock tasks for testing graphs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::context::TaskContext;
use crate::core::TaskOutput;
use crate::errors::{StarflowError, WarehouseError};
use crate::tasks::Task;

/// A task that always fails.
#[derive(Debug)]
pub struct FailingTask {
    name: String,
    error: String,
    retryable: bool,
}

impl FailingTask {
    /// Creates a task failing with a non-retryable configuration error.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            retryable: false,
        }
    }

    /// Creates a task failing with a retryable warehouse error.
    #[must_use]
    pub fn retryable(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            retryable: true,
        }
    }
}

#[async_trait]
impl Task for FailingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        if self.retryable {
            Err(WarehouseError::new(&self.error).into())
        } else {
            Err(StarflowError::config(&self.error))
        }
    }
}

/// A task that fails with a retryable error a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyTask {
    name: String,
    failures: u32,
    calls: AtomicU32,
}

impl FlakyTask {
    /// Creates a task that fails its first `failures` calls.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns the number of times the task was called.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FlakyTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(WarehouseError::new(format!("transient failure #{call}")).into());
        }
        Ok(TaskOutput::ok_value("attempt", serde_json::json!(ctx.attempt())))
    }
}

/// A task that takes time to execute.
#[derive(Debug)]
pub struct SlowTask {
    name: String,
    delay: Duration,
}

impl SlowTask {
    /// Creates a slow task with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(ms),
        }
    }
}

#[async_trait]
impl Task for SlowTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        tokio::time::sleep(self.delay).await;
        Ok(TaskOutput::ok_empty())
    }
}

/// A recorded execution.
#[derive(Debug, Clone)]
pub struct RecordedExecution {
    /// Task name from context.
    pub task_name: String,
    /// Attempt number from context.
    pub attempt: u32,
}

/// A task that records every call.
#[derive(Debug)]
pub struct RecordingTask {
    name: String,
    executions: Mutex<Vec<RecordedExecution>>,
}

impl RecordingTask {
    /// Creates a new recording task.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Returns all recorded executions.
    #[must_use]
    pub fn executions(&self) -> Vec<RecordedExecution> {
        self.executions.lock().clone()
    }

    /// Returns the number of executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.lock().len()
    }
}

#[async_trait]
impl Task for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        self.executions.lock().push(RecordedExecution {
            task_name: ctx.task_name().to_string(),
            attempt: ctx.attempt(),
        });
        Ok(TaskOutput::ok_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineContext, RunIdentity};
    use std::sync::Arc;

    fn test_context(name: &str) -> TaskContext {
        TaskContext::new(Arc::new(PipelineContext::new(RunIdentity::new())), name, 1)
    }

    #[tokio::test]
    async fn test_failing_task() {
        let ctx = test_context("fail");

        let err = FailingTask::new("fail", "bad").execute(&ctx).await.unwrap_err();
        assert!(!err.is_retryable());

        let err = FailingTask::retryable("fail", "reset").execute(&ctx).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_flaky_task() {
        let task = FlakyTask::new("flaky", 1);
        let ctx = test_context("flaky");

        assert!(task.execute(&ctx).await.is_err());
        assert!(task.execute(&ctx).await.is_ok());
        assert_eq!(task.call_count(), 2);
    }

    #[tokio::test]
    async fn test_slow_task() {
        let task = SlowTask::with_delay_ms("slow", 10);
        let start = std::time::Instant::now();
        assert!(task.execute(&test_context("slow")).await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_recording_task() {
        let task = RecordingTask::new("record");
        let ctx = test_context("record");

        task.execute(&ctx).await.unwrap();
        task.execute(&ctx).await.unwrap();

        assert_eq!(task.execution_count(), 2);
        assert_eq!(task.executions()[0].task_name, "record");
        assert_eq!(task.executions()[0].attempt, 1);
    }
}
