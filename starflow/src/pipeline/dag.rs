//! TaskGraph DAG execution engine.
//!
//! Nodes start as soon as every predecessor has succeeded, so independent
//! branches run in parallel. A failed node blocks its transitive successors;
//! nodes already running elsewhere in the graph finish.

use super::{RetryDecision, RetryPolicy, TaskSpec};
use crate::context::{ExecutionContext, PipelineContext, TaskContext};
use crate::core::{TaskOutput, TaskState};
use crate::errors::StarflowError;
use crate::events::PipelineEvent;
use crate::observability::TaskTimer;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

/// What happened to one node during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeReport {
    /// Final state.
    pub state: TaskState,
    /// Attempts made (0 if the node never ran).
    pub attempts: u32,
    /// Output of the successful attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    /// Error of the last failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Category of that error (see [`StarflowError::category`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<String>,
    /// Wall time across all attempts in milliseconds.
    pub duration_ms: f64,
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    /// The node.
    pub task: String,
    /// Previous state.
    pub from: TaskState,
    /// New state.
    pub to: TaskState,
    /// When the change happened.
    pub at: DateTime<Utc>,
}

/// Result of executing a task graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExecutionResult {
    /// Per-node reports.
    pub nodes: HashMap<String, NodeReport>,
    /// Every state change, in the order it happened.
    pub timeline: Vec<StateTransition>,
    /// Total execution time in milliseconds.
    pub duration_ms: f64,
    /// Whether every node succeeded.
    pub success: bool,
    /// Error message if the run failed.
    pub error: Option<String>,
}

impl GraphExecutionResult {
    /// Returns the final state of a node.
    #[must_use]
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.nodes.get(task).map(|report| report.state)
    }

    /// Returns the output of a node that succeeded.
    #[must_use]
    pub fn output_of(&self, task: &str) -> Option<&TaskOutput> {
        self.nodes.get(task).and_then(|report| report.output.as_ref())
    }

    /// Returns the nodes that failed themselves (not upstream failures), sorted.
    #[must_use]
    pub fn failed_tasks(&self) -> Vec<String> {
        self.tasks_in(TaskState::Failed)
    }

    /// Returns the nodes in a given state, sorted.
    #[must_use]
    pub fn tasks_in(&self, state: TaskState) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, report)| report.state == state)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns the time a node entered `state`, if it did.
    #[must_use]
    pub fn entered_at(&self, task: &str, state: TaskState) -> Option<DateTime<Utc>> {
        self.timeline
            .iter()
            .find(|t| t.task == task && t.to == state)
            .map(|t| t.at)
    }

    /// Returns the position in the timeline at which a node entered `state`.
    #[must_use]
    pub fn transition_index(&self, task: &str, state: TaskState) -> Option<usize> {
        self.timeline.iter().position(|t| t.task == task && t.to == state)
    }
}

/// A directed acyclic graph of tasks for execution.
#[derive(Debug)]
pub struct TaskGraph {
    /// The pipeline name.
    name: String,
    /// Node declarations.
    tasks: HashMap<String, TaskSpec>,
    /// Execution order (topologically sorted).
    execution_order: Vec<String>,
    /// Downstream edges, in execution order.
    successors: HashMap<String, Vec<String>>,
    /// Retry policy for nodes without their own.
    default_retry: RetryPolicy,
}

type NodeFuture = BoxFuture<'static, (String, Result<NodeOutcome, tokio::task::JoinError>)>;

struct NodeOutcome {
    result: Result<TaskOutput, StarflowError>,
    attempts: u32,
    duration_ms: f64,
}

struct RunState {
    nodes: HashMap<String, NodeReport>,
    timeline: Vec<StateTransition>,
}

impl RunState {
    fn transition(&mut self, task: &str, to: TaskState) -> Result<(), StarflowError> {
        let report = self
            .nodes
            .get_mut(task)
            .ok_or_else(|| StarflowError::Internal(format!("Unknown task '{task}'")))?;
        let from = report.state;
        if !from.can_transition_to(to) {
            return Err(StarflowError::Internal(format!(
                "Illegal transition for '{task}': {from} -> {to}"
            )));
        }
        report.state = to;
        self.timeline.push(StateTransition {
            task: task.to_string(),
            from,
            to,
            at: Utc::now(),
        });
        Ok(())
    }

    fn state(&self, task: &str) -> TaskState {
        self.nodes.get(task).map(|r| r.state).unwrap_or_default()
    }
}

impl TaskGraph {
    /// Creates a new task graph. Use [`super::PipelineBuilder`] to get a
    /// validated one.
    #[must_use]
    pub fn new(
        name: String,
        tasks: HashMap<String, TaskSpec>,
        task_order: Vec<String>,
        default_retry: RetryPolicy,
    ) -> Self {
        let execution_order = topological_sort(&tasks, &task_order);

        let mut successors: HashMap<String, Vec<String>> =
            execution_order.iter().map(|n| (n.clone(), Vec::new())).collect();
        for name in &execution_order {
            if let Some(spec) = tasks.get(name) {
                for dep in &spec.dependencies {
                    if let Some(children) = successors.get_mut(dep) {
                        children.push(name.clone());
                    }
                }
            }
        }

        Self {
            name,
            tasks,
            execution_order,
            successors,
            default_retry,
        }
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

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns a node declaration.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.get(name)
    }

    /// Returns the direct successors of a node.
    #[must_use]
    pub fn successors(&self, name: &str) -> Vec<String> {
        self.successors.get(name).cloned().unwrap_or_default()
    }

    /// Returns the direct predecessors of a node, sorted.
    #[must_use]
    pub fn predecessors(&self, name: &str) -> Vec<String> {
        self.tasks
            .get(name)
            .map(|spec| spec.dependencies.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every `(upstream, downstream)` edge in execution order.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        self.execution_order
            .iter()
            .flat_map(|from| {
                self.successors(from)
                    .into_iter()
                    .map(move |to| (from.clone(), to))
            })
            .collect()
    }

    /// Returns every node reachable downstream of `name`.
    #[must_use]
    pub fn transitive_successors(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<String> = self.successors(name).into();
        let mut result = Vec::new();

        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(self.successors(&next));
                result.push(next);
            }
        }
        result
    }

    /// Returns the retry policy that applies to a node.
    #[must_use]
    pub fn retry_policy_for(&self, name: &str) -> &RetryPolicy {
        self.tasks
            .get(name)
            .and_then(|spec| spec.retry_policy.as_ref())
            .unwrap_or(&self.default_retry)
    }

    /// Resolves every connection and credential id the nodes name.
    ///
    /// Transient credential failures are logged and left to the node's
    /// retry loop.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error, such as an unregistered
    /// connection id or an unknown credential id.
    pub async fn preflight(&self, ctx: &PipelineContext) -> Result<(), StarflowError> {
        let mut connections = BTreeSet::new();
        let mut credentials = BTreeSet::new();
        for spec in self.execution_order.iter().filter_map(|name| self.tasks.get(name)) {
            connections.extend(spec.task.connection_ids().into_iter().map(String::from));
            credentials.extend(spec.task.credential_ids().into_iter().map(String::from));
        }

        for id in &connections {
            ctx.connections().get(id)?;
        }
        for id in &credentials {
            match ctx.credential_provider().credentials(id).await {
                Ok(_) => {}
                Err(err) if err.is_retryable() => {
                    warn!(credentials_id = %id, error = %err, "Credentials unavailable before run");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Executes the graph.
    ///
    /// Task failures are reported in the result, not as an error; `Err` is
    /// reserved for configuration defects found before any node starts and
    /// for defects of the runner itself.
    ///
    /// # Errors
    ///
    /// Returns a configuration error from [`TaskGraph::preflight`], or an
    /// internal error if a spawned node panics or the graph deadlocks.
    pub async fn execute(&self, ctx: Arc<PipelineContext>) -> Result<GraphExecutionResult, StarflowError> {
        if let Err(err) = self.preflight(&ctx).await {
            error!(pipeline = %self.name, error = %err, "Pipeline configuration rejected");
            ctx.emit(PipelineEvent::new("pipeline.failed").with_payload(json!({
                "pipeline": &self.name,
                "error": err.to_string(),
                "category": err.category(),
                "failed_tasks": Vec::<String>::new(),
                "cancelled": false,
            })));
            return Err(err);
        }

        let start = Instant::now();
        let mut state = RunState {
            nodes: self
                .execution_order
                .iter()
                .map(|n| (n.clone(), NodeReport::default()))
                .collect(),
            timeline: Vec::new(),
        };

        info!(pipeline = %self.name, run_id = %ctx.run_id(), tasks = self.tasks.len(), "Pipeline started");
        ctx.emit(PipelineEvent::new("pipeline.started").with_payload(json!({
            "pipeline": &self.name,
            "logical_date": ctx.logical_date().to_rfc3339(),
            "tasks": self.tasks.len(),
        })));

        // Number of unfinished predecessors per node
        let mut in_degree: HashMap<String, usize> = self
            .tasks
            .iter()
            .map(|(name, spec)| (name.clone(), spec.dependencies.len()))
            .collect();

        let mut active: FuturesUnordered<NodeFuture> = FuturesUnordered::new();
        let mut running: HashMap<String, AbortHandle> = HashMap::new();

        let roots: Vec<String> = self
            .execution_order
            .iter()
            .filter(|name| in_degree.get(*name) == Some(&0))
            .cloned()
            .collect();
        for name in roots {
            self.mark_ready(&ctx, &mut state, &name)?;
        }
        self.start_ready(&ctx, &mut state, &mut active, &mut running)?;

        while let Some((name, joined)) = active.next().await {
            running.remove(&name);
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(task = %name, error = %e, remaining = running.len(), "Task panicked, aborting run");
                    for handle in running.values() {
                        handle.abort();
                    }
                    while active.next().await.is_some() {}
                    return Err(StarflowError::Internal(format!("Task '{name}' panicked: {e}")));
                }
            };

            let report = state.nodes.entry(name.clone()).or_default();
            report.attempts = outcome.attempts;
            report.duration_ms = outcome.duration_ms;

            match outcome.result {
                Ok(output) => {
                    report.output = Some(output.clone());
                    state.transition(&name, TaskState::Succeeded)?;
                    info!(task = %name, attempts = outcome.attempts, duration_ms = outcome.duration_ms, "Task succeeded");
                    ctx.emit(
                        PipelineEvent::new("task.succeeded")
                            .with_task(&name)
                            .with_attempt(outcome.attempts)
                            .with_payload(json!({ "duration_ms": outcome.duration_ms, "output": output })),
                    );

                    for child in self.successors(&name) {
                        if let Some(count) = in_degree.get_mut(&child) {
                            *count = count.saturating_sub(1);
                            if *count == 0 && state.state(&child) == TaskState::Pending {
                                self.mark_ready(&ctx, &mut state, &child)?;
                            }
                        }
                    }
                }
                Err(err) => {
                    report.error = Some(err.to_string());
                    report.error_category = Some(err.category().to_string());
                    state.transition(&name, TaskState::Failed)?;
                    error!(task = %name, attempts = outcome.attempts, error = %err, "Task failed");
                    ctx.emit(
                        PipelineEvent::new("task.failed")
                            .with_task(&name)
                            .with_attempt(outcome.attempts)
                            .with_payload(json!({
                                "error": err.to_string(),
                                "category": err.category(),
                                "retryable": err.is_retryable(),
                            })),
                    );
                    self.block_downstream(&ctx, &mut state, &name)?;
                }
            }

            self.start_ready(&ctx, &mut state, &mut active, &mut running)?;
        }

        let cancelled = ctx.is_cancelled();
        let unfinished: Vec<String> = self
            .execution_order
            .iter()
            .filter(|name| !state.state(name).is_terminal())
            .cloned()
            .collect();
        if !cancelled && !unfinished.is_empty() {
            return Err(StarflowError::Internal(format!(
                "Deadlocked task graph; remaining tasks: {unfinished:?}"
            )));
        }

        let failed: Vec<String> = self
            .execution_order
            .iter()
            .filter(|name| state.state(name) == TaskState::Failed)
            .cloned()
            .collect();
        let success = failed.is_empty() && !cancelled;
        let error = if let Some(first) = failed.first() {
            Some(format!("Task '{first}' failed"))
        } else if cancelled {
            Some(format!(
                "Pipeline cancelled: {}",
                ctx.cancel_reason().unwrap_or_else(|| "no reason given".to_string())
            ))
        } else {
            None
        };

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if success {
            info!(pipeline = %self.name, duration_ms, "Pipeline completed");
            ctx.emit(PipelineEvent::new("pipeline.completed").with_payload(json!({
                "pipeline": &self.name,
                "duration_ms": duration_ms,
            })));
        } else {
            warn!(pipeline = %self.name, failed = ?failed, cancelled, "Pipeline failed");
            ctx.emit(PipelineEvent::new("pipeline.failed").with_payload(json!({
                "pipeline": &self.name,
                "duration_ms": duration_ms,
                "failed_tasks": failed,
                "cancelled": cancelled,
                "error": error,
            })));
        }

        Ok(GraphExecutionResult {
            nodes: state.nodes,
            timeline: state.timeline,
            duration_ms,
            success,
            error,
        })
    }

    fn mark_ready(&self, ctx: &PipelineContext, state: &mut RunState, name: &str) -> Result<(), StarflowError> {
        state.transition(name, TaskState::Ready)?;
        ctx.emit(PipelineEvent::new("task.ready").with_task(name));
        Ok(())
    }

    /// Starts every `Ready` node unless the run has been cancelled.
    fn start_ready(
        &self,
        ctx: &Arc<PipelineContext>,
        state: &mut RunState,
        active: &mut FuturesUnordered<NodeFuture>,
        running: &mut HashMap<String, AbortHandle>,
    ) -> Result<(), StarflowError> {
        if ctx.is_cancelled() {
            return Ok(());
        }
        let ready: Vec<String> = self
            .execution_order
            .iter()
            .filter(|name| state.state(name) == TaskState::Ready)
            .cloned()
            .collect();
        for name in ready {
            state.transition(&name, TaskState::Running)?;
            let (future, handle) = self.spawn_node(name.clone(), ctx.clone());
            running.insert(name, handle);
            active.push(future);
        }
        Ok(())
    }

    /// Marks every not-yet-started node downstream of `failed` as blocked.
    fn block_downstream(&self, ctx: &PipelineContext, state: &mut RunState, failed: &str) -> Result<(), StarflowError> {
        for name in self.transitive_successors(failed) {
            if state.state(&name) == TaskState::Pending {
                state.transition(&name, TaskState::UpstreamFailed)?;
                warn!(task = %name, upstream = %failed, "Task blocked by upstream failure");
                ctx.emit(
                    PipelineEvent::new("task.upstream_failed")
                        .with_task(&name)
                        .with_payload(json!({ "upstream": failed })),
                );
            }
        }
        Ok(())
    }

    /// Spawns a node with its retry loop.
    fn spawn_node(&self, name: String, ctx: Arc<PipelineContext>) -> (NodeFuture, AbortHandle) {
        let task = self.tasks.get(&name).map(|spec| spec.task.clone());
        let policy = self.retry_policy_for(&name).clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let timer = TaskTimer::start(&task_name);
            let Some(task) = task else {
                return NodeOutcome {
                    result: Err(StarflowError::Internal(format!("Unknown task '{task_name}'"))),
                    attempts: 0,
                    duration_ms: timer.finish(),
                };
            };

            let mut attempt = 1;
            loop {
                let task_ctx = TaskContext::new(ctx.clone(), &task_name, attempt);
                info!(task = %task_name, attempt, kind = %task.kind(), "Task started");
                task_ctx.emit(PipelineEvent::new("task.started").with_payload(json!({ "kind": task.kind() })));

                let err = match task.execute(&task_ctx).await {
                    Ok(output) => {
                        return NodeOutcome {
                            result: Ok(output),
                            attempts: attempt,
                            duration_ms: timer.finish(),
                        }
                    }
                    Err(err) => err,
                };

                match policy.decide(&err, attempt) {
                    RetryDecision::Retry(_) if ctx.is_cancelled() => {
                        let reason = ctx.cancel_reason().unwrap_or_else(|| "no reason given".to_string());
                        warn!(task = %task_name, attempt, error = %err, "Run cancelled, not retrying");
                        return NodeOutcome {
                            result: Err(StarflowError::Cancelled(format!("{reason} (last error: {err})"))),
                            attempts: attempt,
                            duration_ms: timer.finish(),
                        };
                    }
                    RetryDecision::Retry(delay) => {
                        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                        warn!(task = %task_name, attempt, delay_ms, error = %err, "Task failed, retrying");
                        task_ctx.emit(PipelineEvent::new("task.retrying").with_payload(json!({
                            "error": err.to_string(),
                            "delay_ms": delay_ms,
                            "next_attempt": attempt + 1,
                        })));
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    _ => {
                        return NodeOutcome {
                            result: Err(err),
                            attempts: attempt,
                            duration_ms: timer.finish(),
                        }
                    }
                }
            }
        });

        let abort = handle.abort_handle();
        (Box::pin(async move { (name, handle.await) }), abort)
    }
}

/// Performs topological sort on the task graph.
fn topological_sort(tasks: &HashMap<String, TaskSpec>, task_order: &[String]) -> Vec<String> {
    let mut result = Vec::new();
    let mut visited = HashSet::new();
    let mut temp_visited = HashSet::new();

    fn visit(
        node: &str,
        tasks: &HashMap<String, TaskSpec>,
        visited: &mut HashSet<String>,
        temp_visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(node) || temp_visited.contains(node) {
            return;
        }

        temp_visited.insert(node.to_string());

        if let Some(spec) = tasks.get(node) {
            for dep in &spec.dependencies {
                visit(dep, tasks, visited, temp_visited, result);
            }
        }

        temp_visited.remove(node);
        visited.insert(node.to_string());
        result.push(node.to_string());
    }

    // Visit in insertion order for determinism
    for name in task_order {
        visit(name, tasks, &mut visited, &mut temp_visited, &mut result);
    }

    result
}
