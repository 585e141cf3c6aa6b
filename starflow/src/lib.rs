//! # Starflow
//!
//! A batch ETL pipeline that loads the Sparkify song-play logs into a star
//! schema on a Postgres-compatible warehouse.
//!
//! Starflow provides:
//!
//! - **Loader tasks**: stage JSON from object storage, append facts, refresh dimensions
//! - **Data-quality checks**: scalar queries compared against expected values
//! - **Dependency graphs**: tasks run once every predecessor has succeeded, with retries
//! - **Event-driven observability**: every node transition is emitted to an event sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use starflow::prelude::*;
//!
//! let settings = PipelineSettings::from_path("pipeline.json")?;
//! let graph = starflow::sparkify::build_pipeline(&settings)?;
//!
//! let ctx = PipelineContext::new(starflow::sparkify::run_identity(&settings, Utc::now()))
//!     .with_connection(&settings.connection_id, warehouse);
//! let result = graph.execute(Arc::new(ctx)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod core;
pub mod credentials;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod sparkify;
pub mod sql;
pub mod storage;
pub mod tasks;
pub mod testing;
pub mod warehouse;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{PipelineSettings, SourceSettings};
    pub use crate::context::{ExecutionContext, PipelineContext, RunIdentity, TaskContext};
    pub use crate::core::{TaskKind, TaskOutput, TaskState};
    pub use crate::credentials::{
        AwsCredentials, CredentialProvider, EnvCredentialProvider, StaticCredentialProvider,
    };
    pub use crate::errors::{
        ContractErrorInfo, CycleDetectedError, PipelineValidationError, QualityCheckFailure,
        StarflowError, WarehouseError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::pipeline::{
        DagDefaults, GraphExecutionResult, PipelineBuilder, RetryPolicy, Schedule, TaskGraph, TaskSpec,
    };
    pub use crate::storage::{JsonFormat, S3Location};
    pub use crate::tasks::{
        DimensionLoader, FactLoader, LoadMode, MarkerTask, QualityCheck, QualityChecker, QualityChecks,
        SqlTask, StagingConfig, StagingLoader, Task,
    };
    pub use crate::warehouse::{ConnectionRegistry, Row, ScalarValue, Warehouse};
    pub use chrono::Utc;
    pub use std::sync::Arc;
}
