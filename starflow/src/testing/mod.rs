//! Testing utilities for starflow pipelines.
//!
//! This module provides:
//! - An in-process warehouse
//! - Mock tasks
//! - Assertions over graph results
//! - A seeded fixture for the reference pipeline

mod assertions;
mod fixtures;
mod memory;
mod mocks;

pub use assertions::{
    assert_output_value, assert_run_succeeded, assert_succeeded_before_ready, assert_task_state,
    assert_task_succeeded,
};
pub use fixtures::{SampleData, SparkifyFixture, EVENTS_OBJECT, SONGS_OBJECT};
pub use memory::MemoryWarehouse;
pub use mocks::{FailingTask, FlakyTask, RecordedExecution, RecordingTask, SlowTask};
