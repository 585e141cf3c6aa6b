//! Run identity for tracking pipeline executions.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunIdentity {
    /// The unique id of this run.
    pub run_id: Uuid,
    /// The DAG the run belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dag_id: Option<String>,
    /// The schedule slot the run processes. Key templates render from this.
    pub logical_date: DateTime<Utc>,
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl RunIdentity {
    /// Creates an identity for the current hour.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        let logical_date = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
        Self::for_logical_date(logical_date)
    }

    /// Creates an identity for an explicit schedule slot.
    #[must_use]
    pub fn for_logical_date(logical_date: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dag_id: None,
            logical_date,
        }
    }

    /// Sets the DAG id.
    #[must_use]
    pub fn with_dag_id(mut self, dag_id: impl Into<String>) -> Self {
        self.dag_id = Some(dag_id.into());
        self
    }

    /// Returns the logical date as `YYYY-MM-DD`.
    #[must_use]
    pub fn ds(&self) -> String {
        self.logical_date.format("%Y-%m-%d").to_string()
    }
}
