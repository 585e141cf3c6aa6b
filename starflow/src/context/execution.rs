//! Mutable execution contexts for pipeline and task execution.

use super::RunIdentity;
use crate::credentials::{CredentialProvider, EnvCredentialProvider};
use crate::errors::StarflowError;
use crate::events::{get_event_sink, EventSink, PipelineEvent};
use crate::warehouse::{ConnectionRegistry, Warehouse};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Behavior shared by pipeline and task contexts.
pub trait ExecutionContext: Send + Sync {
    /// Returns the run id.
    fn run_id(&self) -> Uuid;

    /// Returns the logical date of the run.
    fn logical_date(&self) -> DateTime<Utc>;

    /// Emits an event, filling in run (and task) identity.
    fn emit(&self, event: PipelineEvent);

    /// Checks if the run is cancelled.
    fn is_cancelled(&self) -> bool;
}

/// The context shared by every node of one pipeline run.
pub struct PipelineContext {
    identity: RunIdentity,
    connections: ConnectionRegistry,
    credentials: Arc<dyn CredentialProvider>,
    event_sink: Arc<dyn EventSink>,
    cancelled: AtomicBool,
    cancel_reason: RwLock<Option<String>>,
}

impl PipelineContext {
    /// Creates a pipeline context with no connections, environment
    /// credentials and the global event sink.
    #[must_use]
    pub fn new(identity: RunIdentity) -> Self {
        Self {
            identity,
            connections: ConnectionRegistry::new(),
            credentials: Arc::new(EnvCredentialProvider::new()),
            event_sink: get_event_sink(),
            cancelled: AtomicBool::new(false),
            cancel_reason: RwLock::new(None),
        }
    }

    /// Sets the connection registry.
    #[must_use]
    pub fn with_connections(mut self, connections: ConnectionRegistry) -> Self {
        self.connections = connections;
        self
    }

    /// Registers a single connection.
    #[must_use]
    pub fn with_connection(self, id: impl Into<String>, warehouse: Arc<dyn Warehouse>) -> Self {
        self.connections.register(id, warehouse);
        self
    }

    /// Sets the credential provider.
    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = provider;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the connection registry.
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Returns the credential provider.
    #[must_use]
    pub fn credential_provider(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    /// Marks the run as cancelled. Running statements are not interrupted;
    /// no further nodes are started.
    pub fn cancel(&self, reason: impl Into<String>) {
        *self.cancel_reason.write() = Some(reason.into());
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns the cancel reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.read().clone()
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("identity", &self.identity)
            .field("connections", &self.connections)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ExecutionContext for PipelineContext {
    fn run_id(&self) -> Uuid {
        self.identity.run_id
    }

    fn logical_date(&self) -> DateTime<Utc> {
        self.identity.logical_date
    }

    fn emit(&self, event: PipelineEvent) {
        self.event_sink.emit(&event.with_run_id(self.identity.run_id));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The context for a single attempt of a single node.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pipeline_ctx: Arc<PipelineContext>,
    task_name: String,
    attempt: u32,
}

impl TaskContext {
    /// Creates a task context.
    #[must_use]
    pub fn new(pipeline_ctx: Arc<PipelineContext>, task_name: impl Into<String>, attempt: u32) -> Self {
        Self {
            pipeline_ctx,
            task_name: task_name.into(),
            attempt,
        }
    }

    /// Returns the task name.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the pipeline context.
    #[must_use]
    pub fn pipeline_ctx(&self) -> &Arc<PipelineContext> {
        &self.pipeline_ctx
    }

    /// Resolves a warehouse connection by id.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for unknown ids.
    pub fn warehouse(&self, connection_id: &str) -> Result<Arc<dyn Warehouse>, StarflowError> {
        self.pipeline_ctx.connections.get(connection_id)
    }

    /// Resolves object-storage credentials by id.
    ///
    /// # Errors
    ///
    /// Returns a credential error if the provider cannot resolve `id`.
    pub async fn credentials(&self, credentials_id: &str) -> Result<crate::credentials::AwsCredentials, StarflowError> {
        self.pipeline_ctx.credentials.credentials(credentials_id).await
    }
}

impl ExecutionContext for TaskContext {
    fn run_id(&self) -> Uuid {
        self.pipeline_ctx.run_id()
    }

    fn logical_date(&self) -> DateTime<Utc> {
        self.pipeline_ctx.logical_date()
    }

    fn emit(&self, event: PipelineEvent) {
        self.pipeline_ctx
            .emit(event.with_task(&self.task_name).with_attempt(self.attempt));
    }

    fn is_cancelled(&self) -> bool {
        self.pipeline_ctx.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{AwsCredentials, StaticCredentialProvider};
    use crate::events::CollectingEventSink;
    use crate::warehouse::MockWarehouse;

    #[test]
    fn test_pipeline_context_cancellation() {
        let ctx = PipelineContext::new(RunIdentity::new());
        assert!(!ctx.is_cancelled());

        ctx.cancel("operator requested stop");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.cancel_reason(), Some("operator requested stop".to_string()));
    }

    #[test]
    fn test_task_context_enriches_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline_ctx = Arc::new(
            PipelineContext::new(RunIdentity::new()).with_event_sink(sink.clone()),
        );
        let task_ctx = TaskContext::new(pipeline_ctx.clone(), "Stage_events", 2);

        task_ctx.emit(PipelineEvent::new("task.started"));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].run_id, Some(pipeline_ctx.run_id()));
        assert_eq!(events[0].task.as_deref(), Some("Stage_events"));
        assert_eq!(events[0].attempt, Some(2));
    }

    #[tokio::test]
    async fn test_task_context_resolves_collaborators() {
        let pipeline_ctx = Arc::new(
            PipelineContext::new(RunIdentity::new())
                .with_connection("redshift", Arc::new(MockWarehouse::new()))
                .with_credentials(Arc::new(
                    StaticCredentialProvider::new()
                        .with("aws_credentials", AwsCredentials::new("k", "s")),
                )),
        );
        let task_ctx = TaskContext::new(pipeline_ctx, "Stage_songs", 1);

        assert!(task_ctx.warehouse("redshift").is_ok());
        assert!(task_ctx.warehouse("postgres").is_err());
        assert_eq!(task_ctx.credentials("aws_credentials").await.unwrap().access_key, "k");
    }
}
