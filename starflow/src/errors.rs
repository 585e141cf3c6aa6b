//! Error types for the starflow pipeline.
//!
//! Failures fall into three families: declaration/configuration defects that
//! surface before anything runs, warehouse and credential failures that a
//! scheduler may retry, and data-quality failures that must never be retried.

use crate::warehouse::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for starflow operations.
#[derive(Debug, Error)]
pub enum StarflowError {
    /// The pipeline graph declaration is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A cycle was detected in the pipeline graph.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A configuration defect (malformed check list, unknown connection id, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A statement failed inside the warehouse, or the warehouse was unreachable.
    #[error("{0}")]
    Warehouse(#[from] WarehouseError),

    /// A credential provider failed transiently (for example an unreachable secrets service).
    #[error("Credential error: {0}")]
    Credential(String),

    /// A data-quality check returned an unexpected value.
    #[error("{0}")]
    QualityCheck(#[from] QualityCheckFailure),

    /// The run was cancelled before the task could start.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StarflowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a credential error.
    #[must_use]
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }

    /// Returns true if re-running the failed task could plausibly succeed.
    ///
    /// Warehouse and credential failures are transient from the pipeline's
    /// point of view. Quality failures are not: the same check against the
    /// same data fails identically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Warehouse(_) | Self::Credential(_))
    }

    /// Short machine-readable category, used in emitted events.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::CycleDetected(_) => "validation",
            Self::Config(_) => "config",
            Self::Warehouse(_) => "warehouse",
            Self::Credential(_) => "credential",
            Self::QualityCheck(_) => "quality",
            Self::Cancelled(_) => "cancelled",
            Self::Internal(_) => "internal",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

impl From<serde_json::Error> for StarflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A statement failure reported by a [`crate::warehouse::Warehouse`].
#[derive(Debug, Clone, Error)]
#[error("Warehouse error: {message}")]
pub struct WarehouseError {
    /// Human-readable description from the warehouse.
    pub message: String,
    /// The statement that failed, with credentials redacted.
    pub statement: Option<String>,
}

impl WarehouseError {
    /// Creates a warehouse error without statement context.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            statement: None,
        }
    }

    /// Attaches the failing statement. Credentials are redacted before storing.
    #[must_use]
    pub fn with_statement(mut self, statement: &str) -> Self {
        self.statement = Some(crate::observability::redact_credentials(statement));
        self
    }
}

/// A failed data-quality check.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error(
    "Data quality check #{index} failed: `{query}` returned {}, expected {expected}",
    describe_actual(.actual)
)]
pub struct QualityCheckFailure {
    /// Zero-based position of the check in its list.
    pub index: usize,
    /// The check query.
    pub query: String,
    /// The expected scalar.
    pub expected: ScalarValue,
    /// The scalar the warehouse returned, `None` when the query returned no rows.
    pub actual: Option<ScalarValue>,
}

fn describe_actual(actual: &Option<ScalarValue>) -> String {
    actual
        .as_ref()
        .map_or_else(|| "no rows".to_string(), ToString::to_string)
}

/// Metadata about a graph declaration error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "DAG-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The tasks involved in the error.
    pub tasks: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tasks: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the tasks involved.
    #[must_use]
    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of tasks forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "DAG-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the edges in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for PipelineValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            tasks: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}
