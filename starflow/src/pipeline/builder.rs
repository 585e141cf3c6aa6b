//! Pipeline builder with validation.

use super::{RetryPolicy, TaskGraph, TaskSpec};
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use crate::tasks::Task;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated task graphs.
///
/// Nodes may be declared in any order; dependencies are resolved and checked
/// for cycles when [`PipelineBuilder::build`] is called.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The node declarations.
    tasks: HashMap<String, TaskSpec>,
    /// Insertion order for nodes.
    task_order: Vec<String>,
    /// Retry policy for nodes that don't declare one.
    default_retry: RetryPolicy,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: HashMap::new(),
            task_order: Vec::new(),
            default_retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy for nodes without their own.
    #[must_use]
    pub fn with_default_retry(mut self, policy: RetryPolicy) -> Self {
        self.default_retry = policy;
        self
    }

    /// Adds a node to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error for a duplicate name or a self dependency.
    pub fn task(
        mut self,
        name: impl Into<String>,
        task: Arc<dyn Task>,
        dependencies: &[&str],
    ) -> Result<Self, PipelineValidationError> {
        let spec = TaskSpec::new(name, task).with_dependencies(dependencies.iter().copied());
        self.add_task_spec(spec)?;
        Ok(self)
    }

    /// Adds a node declaration.
    ///
    /// # Errors
    ///
    /// Returns an error for a duplicate name or a self dependency.
    pub fn add_task_spec(&mut self, spec: TaskSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if self.tasks.contains_key(&spec.name) {
            return Err(PipelineValidationError::new(format!(
                "Task '{}' is declared more than once",
                spec.name
            ))
            .with_tasks(vec![spec.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("DAG-DUPLICATE", format!("Duplicate task id '{}'", spec.name))
                    .with_fix_hint("Give every task in the pipeline a unique id."),
            ));
        }

        self.task_order.push(spec.name.clone());
        self.tasks.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Adds an edge `upstream -> task` to an already declared node.
    ///
    /// # Errors
    ///
    /// Returns an error if `task` is not declared or the edge is a self loop.
    pub fn depends_on(mut self, task: &str, upstream: &str) -> Result<Self, PipelineValidationError> {
        let spec = self.tasks.get_mut(task).ok_or_else(|| {
            PipelineValidationError::new(format!("Cannot add dependency to unknown task '{task}'"))
                .with_tasks(vec![task.to_string()])
        })?;
        spec.dependencies.insert(upstream.to_string());
        spec.validate()?;
        Ok(self)
    }

    /// Validates the whole graph and builds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder has no nodes, a node depends on an
    /// undeclared node, or the dependencies form a cycle.
    pub fn build(self) -> Result<TaskGraph, PipelineValidationError> {
        if self.tasks.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no tasks").with_error_info(
                ContractErrorInfo::new("DAG-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one task to the pipeline before building."),
            ));
        }

        for name in &self.task_order {
            let spec = &self.tasks[name];
            if let Some(dep) = spec.dependencies.iter().find(|dep| !self.tasks.contains_key(*dep)) {
                return Err(PipelineValidationError::new(format!(
                    "Task '{}' depends on unknown task '{}'",
                    spec.name, dep
                ))
                .with_tasks(vec![spec.name.clone(), dep.clone()])
                .with_error_info(
                    ContractErrorInfo::new("DAG-MISSING-DEP", format!("Dependency '{dep}' not found"))
                        .with_fix_hint("Declare the upstream task or remove the edge."),
                ));
            }
        }

        self.detect_cycles()?;

        Ok(TaskGraph::new(self.name, self.tasks, self.task_order, self.default_retry))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Detects cycles in the dependency graph.
    fn detect_cycles(&self) -> Result<(), CycleDetectedError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for name in &self.task_order {
            if !visited.contains(name) {
                if let Some(cycle) = self.dfs_cycle(name, &mut visited, &mut rec_stack, &mut path) {
                    return Err(CycleDetectedError::new(cycle));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(spec) = self.tasks.get(node) {
            for dep in &spec.dependencies {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }
}
