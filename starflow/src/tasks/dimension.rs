//! Dimension-table loads.

use super::{delete_statement, insert_statement, require_non_empty, Task, DEFAULT_CONNECTION_ID};
use crate::context::TaskContext;
use crate::core::{TaskKind, TaskOutput};
use crate::errors::StarflowError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

/// How a dimension load treats existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert on top of the existing rows.
    Append,
    /// Delete every row, then insert.
    #[default]
    Replace,
}

impl LoadMode {
    /// Maps the `insert_mode` flag: `true` appends, `false` replaces.
    #[must_use]
    pub fn from_insert_mode(insert_mode: bool) -> Self {
        if insert_mode {
            Self::Append
        } else {
            Self::Replace
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::Replace => write!(f, "replace"),
        }
    }
}

/// Refreshes a dimension table from a select.
///
/// With `insert_mode == false` (the default) the table is emptied first, so
/// after a successful run it holds exactly the select's rows. With
/// `insert_mode == true` the rows are appended.
#[derive(Debug, Clone)]
pub struct DimensionLoader {
    name: String,
    table: String,
    select_sql: String,
    insert_mode: bool,
    connection_id: String,
}

impl DimensionLoader {
    /// Creates a replace-mode loader on the default connection.
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
        require_non_empty("Dimension table", &table)?;
        require_non_empty("Select statement", &select_sql)?;

        Ok(Self {
            name: name.into(),
            table,
            select_sql,
            insert_mode: false,
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
        })
    }

    /// Sets the `insert_mode` flag.
    #[must_use]
    pub fn with_insert_mode(mut self, insert_mode: bool) -> Self {
        self.insert_mode = insert_mode;
        self
    }

    /// Sets the load mode.
    #[must_use]
    pub fn with_mode(self, mode: LoadMode) -> Self {
        self.with_insert_mode(mode == LoadMode::Append)
    }

    /// Sets the warehouse connection id.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Returns the raw `insert_mode` flag.
    #[must_use]
    pub fn insert_mode(&self) -> bool {
        self.insert_mode
    }

    /// Returns the effective load mode.
    #[must_use]
    pub fn mode(&self) -> LoadMode {
        LoadMode::from_insert_mode(self.insert_mode)
    }

    /// Returns the destination table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the statements this loader runs, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        let insert = insert_statement(&self.table, &self.select_sql);
        match self.mode() {
            LoadMode::Append => vec![insert],
            LoadMode::Replace => vec![delete_statement(&self.table), insert],
        }
    }
}

#[async_trait]
impl Task for DimensionLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Dimension
    }

    fn connection_ids(&self) -> Vec<&str> {
        vec![self.connection_id.as_str()]
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        let warehouse = ctx.warehouse(&self.connection_id)?;
        let mode = self.mode();

        let mut deleted = 0;
        if mode == LoadMode::Replace {
            info!(task = %self.name, table = %self.table, "Deleting dimension table contents");
            deleted = warehouse.run(&delete_statement(&self.table)).await?;
        }

        info!(task = %self.name, table = %self.table, mode = %mode, "Loading dimension table");
        let statement = insert_statement(&self.table, &self.select_sql);
        debug!(statement = %statement, "Running INSERT");
        let inserted = warehouse.run(&statement).await?;

        Ok(TaskOutput::ok_value("rows_inserted", json!(inserted))
            .with_value("rows_deleted", json!(deleted))
            .add_metadata("mode", json!(mode.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PipelineContext, RunIdentity};
    use crate::errors::WarehouseError;
    use crate::warehouse::MockWarehouse;
    use mockall::Sequence;
    use std::sync::Arc;

    fn context(warehouse: MockWarehouse) -> TaskContext {
        TaskContext::new(
            Arc::new(PipelineContext::new(RunIdentity::new()).with_connection("redshift", Arc::new(warehouse))),
            "Load_user_dim_table",
            1,
        )
    }

    fn users_loader() -> DimensionLoader {
        DimensionLoader::new("Load_user_dim_table", "users", "SELECT DISTINCT userid FROM staging_events").unwrap()
    }

    #[test]
    fn test_insert_mode_mapping() {
        let loader = users_loader();
        assert!(!loader.insert_mode());
        assert_eq!(loader.mode(), LoadMode::Replace);

        let append = loader.clone().with_insert_mode(true);
        assert_eq!(append.mode(), LoadMode::Append);
        assert!(loader.with_mode(LoadMode::Append).insert_mode());
    }

    #[test]
    fn test_statements_per_mode() {
        let replace = users_loader();
        assert_eq!(
            replace.statements(),
            vec![
                "DELETE FROM users".to_string(),
                "INSERT INTO users SELECT DISTINCT userid FROM staging_events".to_string(),
            ]
        );
        assert_eq!(replace.with_mode(LoadMode::Append).statements().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_deletes_before_insert() {
        let mut warehouse = MockWarehouse::new();
        let mut seq = Sequence::new();
        warehouse
            .expect_run()
            .withf(|sql| sql == "DELETE FROM users")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(104));
        warehouse
            .expect_run()
            .withf(|sql| sql.starts_with("INSERT INTO users"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(96));

        let output = users_loader().execute(&context(warehouse)).await.unwrap();
        assert_eq!(output.get_u64("rows_inserted"), Some(96));
        assert_eq!(output.get_u64("rows_deleted"), Some(104));
        assert_eq!(output.metadata.get("mode"), Some(&json!("replace")));
    }

    #[tokio::test]
    async fn test_append_never_deletes() {
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_run()
            .withf(|sql| sql.starts_with("INSERT INTO users"))
            .times(1)
            .returning(|_| Ok(5));

        let output = users_loader()
            .with_insert_mode(true)
            .execute(&context(warehouse))
            .await
            .unwrap();
        assert_eq!(output.get_u64("rows_deleted"), Some(0));
    }

    #[tokio::test]
    async fn test_failed_delete_skips_insert() {
        let mut warehouse = MockWarehouse::new();
        warehouse
            .expect_run()
            .withf(|sql| sql.starts_with("DELETE"))
            .times(1)
            .returning(|_| Err(WarehouseError::new("relation \"users\" does not exist")));

        let err = users_loader().execute(&context(warehouse)).await.unwrap_err();
        assert!(matches!(err, StarflowError::Warehouse(_)));
    }
}
