//! Fixed SQL scripts, such as table creation.

use super::{require_non_empty, Task, DEFAULT_CONNECTION_ID};
use crate::context::TaskContext;
use crate::core::{TaskKind, TaskOutput};
use crate::errors::StarflowError;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// Runs a SQL script as a single warehouse call.
#[derive(Debug, Clone)]
pub struct SqlTask {
    name: String,
    script: String,
    connection_id: String,
}

impl SqlTask {
    /// Creates a script task on the default connection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty script.
    pub fn new(name: impl Into<String>, script: impl Into<String>) -> Result<Self, StarflowError> {
        let script = script.into();
        require_non_empty("SQL script", &script)?;
        Ok(Self {
            name: name.into(),
            script,
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
        })
    }

    /// Sets the warehouse connection id.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Returns the script.
    #[must_use]
    pub fn script(&self) -> &str {
        &self.script
    }
}

#[async_trait]
impl Task for SqlTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Sql
    }

    fn connection_ids(&self) -> Vec<&str> {
        vec![self.connection_id.as_str()]
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        let warehouse = ctx.warehouse(&self.connection_id)?;
        info!(task = %self.name, "Running SQL script");
        debug!(script = %self.script);
        let affected = warehouse.run(&self.script).await?;
        Ok(TaskOutput::ok_value("rows_affected", json!(affected)))
    }
}
