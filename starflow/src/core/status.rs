//! Task state and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A start/end marker with no side effects.
    Marker,
    /// A fixed SQL script (e.g. table creation).
    Sql,
    /// Bulk copy from object storage into a staging table.
    Staging,
    /// Append into the fact table.
    Fact,
    /// Refresh of a dimension table.
    Dimension,
    /// Post-load data-quality gate.
    Quality,
    /// Anything else.
    #[default]
    Custom,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marker => write!(f, "marker"),
            Self::Sql => write!(f, "sql"),
            Self::Staging => write!(f, "staging"),
            Self::Fact => write!(f, "fact"),
            Self::Dimension => write!(f, "dimension"),
            Self::Quality => write!(f, "quality"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// The lifecycle state of a node in one pipeline run.
///
/// `Pending → Ready → Running → Succeeded | Failed`. A node whose predecessor
/// failed moves straight from `Pending` to `UpstreamFailed` and never runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on predecessors.
    #[default]
    Pending,
    /// All predecessors succeeded; eligible to run.
    Ready,
    /// Currently executing (possibly on a retry attempt).
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error after exhausting retries.
    Failed,
    /// Blocked for the rest of the run by a failed predecessor.
    UpstreamFailed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::UpstreamFailed => write!(f, "upstream_failed"),
        }
    }
}

impl TaskState {
    /// Returns true if the state cannot change again within the run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::UpstreamFailed)
    }

    /// Returns true if the state indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the state indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::UpstreamFailed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Ready | Self::UpstreamFailed)
                | (Self::Ready, Self::Running)
                | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_display() {
        assert_eq!(TaskKind::Staging.to_string(), "staging");
        assert_eq!(TaskKind::Quality.to_string(), "quality");
        assert_eq!(TaskKind::default(), TaskKind::Custom);
    }

    #[test]
    fn test_task_state_display() {
        assert_eq!(TaskState::Succeeded.to_string(), "succeeded");
        assert_eq!(TaskState::UpstreamFailed.to_string(), "upstream_failed");
    }

    #[test]
    fn test_task_state_is_terminal() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::UpstreamFailed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Ready));
        assert!(TaskState::Pending.can_transition_to(TaskState::UpstreamFailed));
        assert!(TaskState::Ready.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Running));
        assert!(!TaskState::Succeeded.can_transition_to(TaskState::Running));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Ready));
    }

    #[test]
    fn test_task_state_serialize() {
        let json = serde_json::to_string(&TaskState::UpstreamFailed).unwrap();
        assert_eq!(json, r#""upstream_failed""#);

        let deserialized: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, TaskState::UpstreamFailed);
    }
}
