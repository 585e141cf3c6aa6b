//! Data-quality checks.

use super::{Task, DEFAULT_CONNECTION_ID};
use crate::context::TaskContext;
use crate::core::{TaskKind, TaskOutput};
use crate::errors::{QualityCheckFailure, StarflowError};
use crate::warehouse::ScalarValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

/// One check: a query whose first column of the first row must equal `expected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityCheck {
    /// The query to run.
    #[serde(alias = "sql_quality_check")]
    pub query: String,
    /// The value the query must return.
    #[serde(alias = "expected_result")]
    pub expected: ScalarValue,
}

impl QualityCheck {
    /// Creates a check.
    #[must_use]
    pub fn new(query: impl Into<String>, expected: impl Into<ScalarValue>) -> Self {
        Self {
            query: query.into(),
            expected: expected.into(),
        }
    }
}

/// An ordered, validated, immutable list of checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<QualityCheck>", into = "Vec<QualityCheck>")]
pub struct QualityChecks(Vec<QualityCheck>);

impl QualityChecks {
    /// Validates and wraps a list of checks.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty list or a check with an
    /// empty query.
    pub fn new(checks: Vec<QualityCheck>) -> Result<Self, StarflowError> {
        if checks.is_empty() {
            return Err(StarflowError::config("Quality check list cannot be empty"));
        }
        if let Some(index) = checks.iter().position(|check| check.query.trim().is_empty()) {
            return Err(StarflowError::config(format!(
                "Quality check #{index} has an empty query"
            )));
        }
        Ok(Self(checks))
    }

    /// Parses a JSON list of `{"query": ..., "expected": ...}` objects.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON, unknown fields or
    /// any problem [`QualityChecks::new`] rejects.
    pub fn from_json_str(json: &str) -> Result<Self, StarflowError> {
        let checks: Vec<QualityCheck> = serde_json::from_str(json)
            .map_err(|e| StarflowError::config(format!("Malformed quality check list: {e}")))?;
        Self::new(checks)
    }

    /// Iterates the checks in order.
    pub fn iter(&self) -> std::slice::Iter<'_, QualityCheck> {
        self.0.iter()
    }

    /// Returns the number of checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<QualityCheck>> for QualityChecks {
    type Error = StarflowError;

    fn try_from(checks: Vec<QualityCheck>) -> Result<Self, Self::Error> {
        Self::new(checks)
    }
}

impl From<QualityChecks> for Vec<QualityCheck> {
    fn from(checks: QualityChecks) -> Self {
        checks.0
    }
}

impl<'a> IntoIterator for &'a QualityChecks {
    type Item = &'a QualityCheck;
    type IntoIter = std::slice::Iter<'a, QualityCheck>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Runs each check in order and stops at the first mismatch.
#[derive(Debug, Clone)]
pub struct QualityChecker {
    name: String,
    checks: QualityChecks,
    connection_id: String,
}

impl QualityChecker {
    /// Creates a checker on the default connection.
    #[must_use]
    pub fn new(name: impl Into<String>, checks: QualityChecks) -> Self {
        Self {
            name: name.into(),
            checks,
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
        }
    }

    /// Sets the warehouse connection id.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Returns the checks.
    #[must_use]
    pub fn checks(&self) -> &QualityChecks {
        &self.checks
    }
}

#[async_trait]
impl Task for QualityChecker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Quality
    }

    fn connection_ids(&self) -> Vec<&str> {
        vec![self.connection_id.as_str()]
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        let warehouse = ctx.warehouse(&self.connection_id)?;

        for (index, check) in self.checks.iter().enumerate() {
            let rows = warehouse.get_records(&check.query).await?;
            let actual = rows.first().and_then(|row| row.first()).cloned();

            match &actual {
                Some(value) if value.matches(&check.expected) => {
                    info!(task = %self.name, index, query = %check.query, "Data quality check passed");
                }
                _ => {
                    let failure = QualityCheckFailure {
                        index,
                        query: check.query.clone(),
                        expected: check.expected.clone(),
                        actual,
                    };
                    error!(task = %self.name, index, query = %check.query, "{failure}");
                    return Err(failure.into());
                }
            }
        }

        info!(task = %self.name, checks = self.checks.len(), "All data quality checks passed");
        Ok(TaskOutput::ok_value("checks_passed", json!(self.checks.len())))
    }
}
