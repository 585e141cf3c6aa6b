//! Start/end markers.

use super::Task;
use crate::context::TaskContext;
use crate::core::{TaskKind, TaskOutput};
use crate::errors::StarflowError;
use async_trait::async_trait;

/// A node with no side effects, used to anchor the start and end of a graph.
#[derive(Debug, Clone)]
pub struct MarkerTask {
    name: String,
}

impl MarkerTask {
    /// Creates a new marker.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Task for MarkerTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Marker
    }

    async fn execute(&self, _ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        Ok(TaskOutput::ok_empty())
    }
}
