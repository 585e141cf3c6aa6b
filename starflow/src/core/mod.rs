//! Core domain model types for starflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Task state and kind enums
//! - Task output type with factory methods

mod output;
mod status;

pub use output::TaskOutput;
pub use status::{TaskKind, TaskState};
