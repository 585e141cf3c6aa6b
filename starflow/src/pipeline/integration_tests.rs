//! End-to-end runs of the reference pipeline against the in-process warehouse.

#[cfg(test)]
mod tests {
    use crate::core::TaskState;
    use crate::errors::StarflowError;
    use crate::pipeline::PipelineBuilder;
    use crate::sparkify::task_ids::*;
    use crate::sparkify::build_pipeline;
    use crate::tasks::{FnTask, MarkerTask};
    use crate::testing::{
        assert_output_value, assert_run_succeeded, assert_succeeded_before_ready, assert_task_state,
        assert_task_succeeded, SampleData, SparkifyFixture,
    };
    use crate::warehouse::ScalarValue;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reference_pipeline_loads_star_schema() {
        let fixture = SparkifyFixture::new();
        let result = fixture.run().await.unwrap();

        assert_run_succeeded(&result);
        assert_eq!(result.tasks_in(TaskState::Succeeded).len(), 11);

        let wh = &fixture.warehouse;
        assert_eq!(wh.row_count("staging_events"), Some(3));
        assert_eq!(wh.row_count("staging_songs"), Some(2));
        assert_eq!(wh.row_count("songplays"), Some(2));
        assert_eq!(wh.row_count("users"), Some(2));
        assert_eq!(wh.row_count("songs"), Some(1));
        assert_eq!(wh.row_count("artists"), Some(1));
        assert_eq!(wh.row_count("time"), Some(1));

        assert_output_value(&result, STAGE_EVENTS, "rows_loaded", &json!(3));
        assert_output_value(&result, LOAD_SONGPLAYS, "rows_inserted", &json!(2));
        assert_output_value(&result, QUALITY_CHECKS, "checks_passed", &json!(4));
    }

    #[tokio::test]
    async fn test_quality_checks_wait_for_every_dimension() {
        let fixture = SparkifyFixture::new();
        let result = fixture.run().await.unwrap();

        for dimension in DIMENSIONS {
            assert_succeeded_before_ready(&result, dimension, QUALITY_CHECKS);
        }
        assert_succeeded_before_ready(&result, STAGE_EVENTS, LOAD_SONGPLAYS);
        assert_succeeded_before_ready(&result, STAGE_SONGS, LOAD_SONGPLAYS);
        assert_succeeded_before_ready(&result, LOAD_SONGPLAYS, LOAD_USERS);
        assert_succeeded_before_ready(&result, QUALITY_CHECKS, STOP_EXECUTION);
    }

    #[tokio::test]
    async fn test_copy_statements_reach_the_warehouse_redacted() {
        let fixture = SparkifyFixture::new();
        fixture.run().await.unwrap();

        let copies = fixture.warehouse.statements_starting_with("COPY");
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|s| !s.contains("wJalrXUtnFEMI")));
        assert!(copies.iter().any(|s| s.contains("s3://udacity-dend/log_data")));
        assert!(copies.iter().any(|s| s.contains("FORMAT AS json 'auto'")));
    }

    #[tokio::test]
    async fn test_null_key_fails_the_run_without_retry() {
        let mut data = SampleData::default();
        data.users.push(vec![
            ScalarValue::Null,
            ScalarValue::Text("Ghost".to_string()),
            ScalarValue::Null,
            ScalarValue::Null,
            ScalarValue::Text("free".to_string()),
        ]);
        let fixture = SparkifyFixture::with_data(&data);
        let result = fixture.run().await.unwrap();

        assert!(!result.success);
        assert_eq!(result.failed_tasks(), vec![QUALITY_CHECKS.to_string()]);
        assert_task_state(&result, STOP_EXECUTION, TaskState::UpstreamFailed);

        let report = &result.nodes[QUALITY_CHECKS];
        assert_eq!(report.attempts, 1);
        assert_eq!(report.error_category.as_deref(), Some("quality"));
        let message = report.error.as_deref().unwrap();
        assert!(message.contains("users WHERE user_id IS NULL"));
        assert!(message.contains("returned 1, expected 0"));

        let types = fixture.sink.types_for_task(QUALITY_CHECKS);
        assert!(!types.iter().any(|t| t == "task.retrying"));
        assert!(types.iter().any(|t| t == "task.failed"));
        assert_eq!(fixture.sink.events_of_type("pipeline.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_prefix_loads_nothing_and_succeeds() {
        let mut fixture = SparkifyFixture::new();
        fixture.settings.events.s3_key = "log_data/2019".to_string();
        let result = fixture.run().await.unwrap();

        assert_run_succeeded(&result);
        assert_output_value(&result, STAGE_EVENTS, "rows_loaded", &json!(0));
        assert_eq!(fixture.warehouse.row_count("staging_events"), Some(0));
    }

    #[tokio::test]
    async fn test_key_prefix_is_rendered_from_logical_date() {
        let mut fixture = SparkifyFixture::new();
        fixture.settings.events.s3_key = "log_data/{year}/{month}".to_string();
        let result = fixture.run().await.unwrap();

        assert_run_succeeded(&result);
        assert_output_value(
            &result,
            STAGE_EVENTS,
            "source",
            &json!("s3://udacity-dend/log_data/2018/11"),
        );
        assert_eq!(fixture.warehouse.row_count("staging_events"), Some(3));
    }

    #[tokio::test]
    async fn test_zero_row_fact_select_leaves_table_unchanged() {
        let data = SampleData {
            songplays: Vec::new(),
            ..SampleData::default()
        };
        let fixture = SparkifyFixture::with_data(&data);
        let result = fixture.run().await.unwrap();

        assert_run_succeeded(&result);
        assert_output_value(&result, LOAD_SONGPLAYS, "rows_inserted", &json!(0));
        assert_eq!(fixture.warehouse.row_count("songplays"), Some(0));
    }

    #[tokio::test]
    async fn test_second_run_replaces_staging_and_dimensions_but_appends_facts() {
        let fixture = SparkifyFixture::new();
        assert_run_succeeded(&fixture.run().await.unwrap());
        let result = fixture.run().await.unwrap();
        assert_run_succeeded(&result);

        let wh = &fixture.warehouse;
        assert_eq!(wh.row_count("staging_events"), Some(3));
        assert_eq!(wh.row_count("staging_songs"), Some(2));
        assert_eq!(wh.row_count("songplays"), Some(4));
        assert_eq!(wh.row_count("users"), Some(2));
        assert_output_value(&result, STAGE_EVENTS, "rows_deleted", &json!(3));
        assert_output_value(&result, LOAD_USERS, "rows_deleted", &json!(2));
    }

    #[tokio::test]
    async fn test_append_mode_dimensions_accumulate() {
        let mut fixture = SparkifyFixture::new();
        fixture.settings.dimension_insert_mode = true;
        fixture.run().await.unwrap();
        let result = fixture.run().await.unwrap();

        assert_run_succeeded(&result);
        assert_eq!(fixture.warehouse.row_count("users"), Some(4));
        assert_eq!(fixture.warehouse.row_count("time"), Some(2));
        assert_eq!(fixture.warehouse.statements_starting_with("DELETE FROM users").len(), 0);
        assert_output_value(&result, LOAD_USERS, "rows_deleted", &json!(0));
    }

    #[tokio::test]
    async fn test_transient_copy_failure_is_retried() {
        let fixture = SparkifyFixture::new();
        fixture
            .warehouse
            .fail_times("COPY staging_songs", 2, "S3ServiceException: slow down");
        let result = fixture.run().await.unwrap();

        assert_run_succeeded(&result);
        assert_eq!(result.nodes[STAGE_SONGS].attempts, 3);
        assert_eq!(result.nodes[STAGE_EVENTS].attempts, 1);

        let retrying: Vec<_> = fixture
            .sink
            .events_of_type("task.retrying")
            .into_iter()
            .filter(|e| e.task.as_deref() == Some(STAGE_SONGS))
            .collect();
        assert_eq!(retrying.len(), 2);
        assert_eq!(fixture.warehouse.row_count("staging_songs"), Some(2));
    }

    #[tokio::test]
    async fn test_exhausted_copy_blocks_downstream() {
        let fixture = SparkifyFixture::new();
        fixture.warehouse.fail_on("COPY staging_events", "S3ServiceException: access denied");
        let result = fixture.run().await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Task 'Stage_events' failed"));
        assert_task_state(&result, STAGE_EVENTS, TaskState::Failed);
        assert_eq!(result.nodes[STAGE_EVENTS].attempts, 4);
        assert_eq!(result.nodes[STAGE_EVENTS].error_category.as_deref(), Some("warehouse"));

        // The sibling branch still finishes.
        assert_task_succeeded(&result, STAGE_SONGS);

        let blocked = result.tasks_in(TaskState::UpstreamFailed);
        assert_eq!(blocked.len(), 7);
        for task in [LOAD_SONGPLAYS, LOAD_USERS, LOAD_TIME, QUALITY_CHECKS, STOP_EXECUTION] {
            assert_task_state(&result, task, TaskState::UpstreamFailed);
        }
        assert_eq!(fixture.warehouse.row_count("songplays"), Some(0));
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_ddl() {
        let mut fixture = SparkifyFixture::new();
        fixture.settings.credentials_id = "other_credentials".to_string();
        let graph = build_pipeline(&fixture.settings).unwrap();
        fixture.settings.credentials_id = "aws_credentials".to_string();

        let err = graph.execute(fixture.context()).await.unwrap_err();
        assert!(matches!(err, StarflowError::Config(_)));
        assert!(err.to_string().contains("other_credentials"));
        assert!(fixture.warehouse.statements().is_empty());
        assert!(!fixture.warehouse.has_table("songplays"));
        assert!(fixture.sink.events_of_type("task.started").is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_connection_rejected_before_any_task() {
        let mut fixture = SparkifyFixture::new();
        fixture.settings.connection_id = "not_registered".to_string();
        let graph = build_pipeline(&fixture.settings).unwrap();
        fixture.settings.connection_id = "redshift".to_string();

        let err = graph.execute(fixture.context()).await.unwrap_err();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("not_registered"));
        assert!(fixture.sink.types_for_task(BEGIN_EXECUTION).is_empty());
        assert!(fixture.warehouse.statements().is_empty());
        assert_eq!(fixture.sink.events_of_type("pipeline.failed").len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_runs_nothing() {
        let fixture = SparkifyFixture::new();
        let graph = build_pipeline(&fixture.settings).unwrap();
        let ctx = fixture.context();
        ctx.cancel("maintenance window");

        let result = graph.execute(ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Pipeline cancelled: maintenance window"));
        assert_task_state(&result, BEGIN_EXECUTION, TaskState::Ready);
        assert!(fixture.warehouse.statements().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_stops_new_nodes() {
        let fixture = SparkifyFixture::new();
        let graph = PipelineBuilder::new("cancel")
            .task("first", Arc::new(MarkerTask::new("first")), &[])
            .unwrap()
            .task(
                "cancel",
                Arc::new(FnTask::new("cancel", |ctx| {
                    ctx.pipeline_ctx().cancel("operator");
                    Ok(crate::core::TaskOutput::ok_empty())
                })),
                &["first"],
            )
            .unwrap()
            .task("after", Arc::new(MarkerTask::new("after")), &["cancel"])
            .unwrap()
            .build()
            .unwrap();

        let result = graph.execute(fixture.context()).await.unwrap();
        assert_task_succeeded(&result, "cancel");
        assert_task_state(&result, "after", TaskState::Ready);
        assert_eq!(result.error.as_deref(), Some("Pipeline cancelled: operator"));
    }

    #[test]
    fn test_reference_graph_rejects_bad_settings() {
        let mut fixture = SparkifyFixture::new();
        fixture.settings.events.table = String::new();
        let err = build_pipeline(&fixture.settings).unwrap_err();
        assert!(matches!(err, StarflowError::Config(_)));
    }
}
