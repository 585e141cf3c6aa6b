//! The reference Sparkify pipeline.
//!
//! ```text
//! Begin_execution -> create_tables -> {Stage_events, Stage_songs}
//!   -> Load_songplays_fact_table
//!   -> {Load_user_dim_table, Load_song_dim_table, Load_artist_dim_table, Load_time_dim_table}
//!   -> Run_data_quality_checks -> Stop_execution
//! ```

use crate::config::PipelineSettings;
use crate::context::RunIdentity;
use crate::errors::StarflowError;
use crate::pipeline::{PipelineBuilder, TaskGraph};
use crate::sql;
use crate::tasks::{
    DimensionLoader, FactLoader, MarkerTask, QualityCheck, QualityChecker, QualityChecks, SqlTask, StagingLoader,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Task ids of the reference graph.
pub mod task_ids {
    #![allow(missing_docs)]

    pub const BEGIN_EXECUTION: &str = "Begin_execution";
    pub const CREATE_TABLES: &str = "create_tables";
    pub const STAGE_EVENTS: &str = "Stage_events";
    pub const STAGE_SONGS: &str = "Stage_songs";
    pub const LOAD_SONGPLAYS: &str = "Load_songplays_fact_table";
    pub const LOAD_USERS: &str = "Load_user_dim_table";
    pub const LOAD_SONGS: &str = "Load_song_dim_table";
    pub const LOAD_ARTISTS: &str = "Load_artist_dim_table";
    pub const LOAD_TIME: &str = "Load_time_dim_table";
    pub const QUALITY_CHECKS: &str = "Run_data_quality_checks";
    pub const STOP_EXECUTION: &str = "Stop_execution";

    /// The four dimension loads.
    pub const DIMENSIONS: [&str; 4] = [LOAD_USERS, LOAD_SONGS, LOAD_ARTISTS, LOAD_TIME];
}

/// The null-key checks run after every load: one per dimension, each
/// expecting zero rows with a null key.
#[must_use]
pub fn default_quality_checks() -> QualityChecks {
    let checks = sql::NULL_KEY_CHECKS
        .iter()
        .map(|(table, column)| QualityCheck::new(sql::null_count_query(table, column), 0))
        .collect();
    // The list above is non-empty and every query is non-empty.
    QualityChecks::new(checks).unwrap_or_else(|e| unreachable!("reference checks are valid: {e}"))
}

/// Builds the run identity for one schedule slot of the pipeline.
#[must_use]
pub fn run_identity(settings: &PipelineSettings, logical_date: DateTime<Utc>) -> RunIdentity {
    RunIdentity::for_logical_date(logical_date).with_dag_id(&settings.dag_id)
}

/// Plans the runs due at `now` from the DAG defaults.
///
/// Returns one identity per due schedule slot, oldest first. Without catchup
/// at most the latest slot is returned.
#[must_use]
pub fn plan_runs(settings: &PipelineSettings, last_run: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<RunIdentity> {
    let due = settings.defaults.due_logical_dates(last_run, now);
    tracing::debug!(dag_id = %settings.dag_id, due = due.len(), "Planned runs");
    due.into_iter().map(|slot| run_identity(settings, slot)).collect()
}

/// Declares the reference graph.
///
/// # Errors
///
/// Returns a configuration error if a task rejects its parameters, or a
/// validation error if the graph itself is malformed.
pub fn build_pipeline(settings: &PipelineSettings) -> Result<TaskGraph, StarflowError> {
    use task_ids::*;

    let conn = settings.connection_id.as_str();
    let dimension = |name: &str, table: &str, select: &str| -> Result<Arc<DimensionLoader>, StarflowError> {
        Ok(Arc::new(
            DimensionLoader::new(name, table, select)?
                .with_insert_mode(settings.dimension_insert_mode)
                .with_connection_id(conn),
        ))
    };

    let graph = PipelineBuilder::new(&settings.dag_id)
        .with_default_retry(settings.defaults.retry_policy())
        .task(BEGIN_EXECUTION, Arc::new(MarkerTask::new(BEGIN_EXECUTION)), &[])?
        .task(
            CREATE_TABLES,
            Arc::new(SqlTask::new(CREATE_TABLES, sql::CREATE_TABLES)?.with_connection_id(conn)),
            &[BEGIN_EXECUTION],
        )?
        .task(
            STAGE_EVENTS,
            Arc::new(StagingLoader::new(STAGE_EVENTS, settings.events_staging())?),
            &[CREATE_TABLES],
        )?
        .task(
            STAGE_SONGS,
            Arc::new(StagingLoader::new(STAGE_SONGS, settings.songs_staging())?),
            &[CREATE_TABLES],
        )?
        .task(
            LOAD_SONGPLAYS,
            Arc::new(FactLoader::new(LOAD_SONGPLAYS, "songplays", sql::SONGPLAY_TABLE_INSERT)?.with_connection_id(conn)),
            &[STAGE_EVENTS, STAGE_SONGS],
        )?
        .task(LOAD_USERS, dimension(LOAD_USERS, "users", sql::USER_TABLE_INSERT)?, &[LOAD_SONGPLAYS])?
        .task(LOAD_SONGS, dimension(LOAD_SONGS, "songs", sql::SONG_TABLE_INSERT)?, &[LOAD_SONGPLAYS])?
        .task(LOAD_ARTISTS, dimension(LOAD_ARTISTS, "artists", sql::ARTIST_TABLE_INSERT)?, &[LOAD_SONGPLAYS])?
        .task(LOAD_TIME, dimension(LOAD_TIME, "time", sql::TIME_TABLE_INSERT)?, &[LOAD_SONGPLAYS])?
        .task(
            QUALITY_CHECKS,
            Arc::new(QualityChecker::new(QUALITY_CHECKS, settings.quality_checks.clone()).with_connection_id(conn)),
            &DIMENSIONS,
        )?
        .task(STOP_EXECUTION, Arc::new(MarkerTask::new(STOP_EXECUTION)), &[QUALITY_CHECKS])?
        .build()?;

    tracing::debug!(dag_id = %settings.dag_id, tasks = graph.task_count(), "Declared reference pipeline");
    Ok(graph)
}
