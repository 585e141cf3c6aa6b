//! Node declarations.

use super::RetryPolicy;
use crate::core::TaskKind;
use crate::errors::PipelineValidationError;
use crate::tasks::Task;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Declaration of a single node in a pipeline graph.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// The unique name of the node.
    pub name: String,
    /// The task implementation.
    pub task: Arc<dyn Task>,
    /// Names of the nodes that must succeed first.
    pub dependencies: BTreeSet<String>,
    /// Node-specific retry policy; the graph default applies when unset.
    pub retry_policy: Option<RetryPolicy>,
}

impl TaskSpec {
    /// Creates a node with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        Self {
            name: name.into(),
            task,
            dependencies: BTreeSet::new(),
            retry_policy: None,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets a node-specific retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Returns the task kind.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// Validates the node on its own.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name or a self dependency.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Task name cannot be empty"));
        }
        if self.dependencies.contains(&self.name) {
            return Err(PipelineValidationError::new(format!(
                "Task '{}' cannot depend on itself",
                self.name
            ))
            .with_tasks(vec![self.name.clone()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::MarkerTask;

    #[test]
    fn test_task_spec_creation() {
        let spec = TaskSpec::new("Stop_execution", Arc::new(MarkerTask::new("Stop_execution")))
            .with_dependencies(["Run_data_quality_checks"])
            .with_retry_policy(RetryPolicy::none());

        assert_eq!(spec.dependencies.len(), 1);
        assert_eq!(spec.kind(), TaskKind::Marker);
        assert_eq!(spec.retry_policy.map(|p| p.retries), Some(0));
    }

    #[test]
    fn test_self_dependency() {
        let spec = TaskSpec::new("a", Arc::new(MarkerTask::new("a"))).with_dependency("a");
        let err = spec.validate().unwrap_err();
        assert_eq!(err.tasks, vec!["a".to_string()]);
    }

    #[test]
    fn test_empty_name() {
        assert!(TaskSpec::new(" ", Arc::new(MarkerTask::new(" "))).validate().is_err());
    }
}
