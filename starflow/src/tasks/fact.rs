//! Fact-table loads.

use super::{insert_statement, require_non_empty, Task, DEFAULT_CONNECTION_ID};
use crate::context::TaskContext;
use crate::core::{TaskKind, TaskOutput};
use crate::errors::StarflowError;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

/// Appends the rows of a select into a fact table.
///
/// Purely additive: re-running the same window inserts the rows again.
#[derive(Debug, Clone)]
pub struct FactLoader {
    name: String,
    table: String,
    select_sql: String,
    connection_id: String,
}

impl FactLoader {
    /// Creates a loader on the default connection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty table or select.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        select_sql: impl Into<String>,
    ) -> Result<Self, StarflowError> {
        let table = table.into();
        let select_sql = select_sql.into();
        require_non_empty("Fact table", &table)?;
        require_non_empty("Select statement", &select_sql)?;

        Ok(Self {
            name: name.into(),
            table,
            select_sql,
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
        })
    }

    /// Sets the warehouse connection id.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Returns the destination table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the `INSERT` statement this loader runs.
    #[must_use]
    pub fn statement(&self) -> String {
        insert_statement(&self.table, &self.select_sql)
    }
}

#[async_trait]
impl Task for FactLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Fact
    }

    fn connection_ids(&self) -> Vec<&str> {
        vec![self.connection_id.as_str()]
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        let warehouse = ctx.warehouse(&self.connection_id)?;

        info!(task = %self.name, table = %self.table, "Loading fact table");
        let statement = self.statement();
        debug!(statement = %statement, "Running INSERT");
        let inserted = warehouse.run(&statement).await?;

        info!(task = %self.name, table = %self.table, rows = inserted, "Fact load complete");
        Ok(TaskOutput::ok_value("rows_inserted", json!(inserted)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineContext, RunIdentity};
    use crate::warehouse::MockWarehouse;
    use std::sync::Arc;

    #[test]
    fn test_statement() {
        let loader = FactLoader::new("Load_songplays_fact_table", "songplays", "SELECT 1").unwrap();
        assert_eq!(loader.statement(), "INSERT INTO songplays SELECT 1");
        assert_eq!(loader.kind(), TaskKind::Fact);
    }

    #[test]
    fn test_rejects_empty_parameters() {
        assert!(FactLoader::new("f", "", "SELECT 1").is_err());
        assert!(FactLoader::new("f", "songplays", "   ").is_err());
    }

    #[tokio::test]
    async fn test_execute_issues_single_insert() {
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_run()
            .withf(|sql| sql == "INSERT INTO songplays SELECT 1")
            .times(1)
            .returning(|_| Ok(6820));
        let ctx = TaskContext::new(
            Arc::new(PipelineContext::new(RunIdentity::new()).with_connection("redshift", Arc::new(warehouse))),
            "Load_songplays_fact_table",
            1,
        );

        let loader = FactLoader::new("Load_songplays_fact_table", "songplays", "SELECT 1").unwrap();
        let output = loader.execute(&ctx).await.unwrap();
        assert_eq!(output.get_u64("rows_inserted"), Some(6820));
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let ctx = TaskContext::new(Arc::new(PipelineContext::new(RunIdentity::new())), "f", 1);
        let loader = FactLoader::new("f", "songplays", "SELECT 1")
            .unwrap()
            .with_connection_id("warehouse_b");

        let err = loader.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, StarflowError::Config(_)));
        assert!(!err.is_retryable());
    }
}
