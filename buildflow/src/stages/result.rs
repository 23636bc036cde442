//! Stage lifecycle state and execution reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a stage is in its lifecycle.
///
/// `Created → PropertiesResolved → Executing → Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Constructed, nothing resolved yet.
    #[default]
    Created,
    /// Properties merged and frozen.
    PropertiesResolved,
    /// Stage body running.
    Executing,
    /// Stage body finished without error.
    Succeeded,
    /// Resolution or execution failed.
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::PropertiesResolved => write!(f, "properties_resolved"),
            Self::Executing => write!(f, "executing"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageState {
    /// Returns true if the state represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Outcome of one stage run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Stage name.
    pub name: String,
    /// Terminal state.
    pub state: StageState,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
    /// Error message if failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageReport {
    /// Creates a succeeded report ending now.
    #[must_use]
    pub fn succeeded(name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            state: StageState::Succeeded,
            started_at,
            ended_at: Utc::now(),
            error: None,
        }
    }

    /// Creates a failed report ending now.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state: StageState::Failed,
            started_at,
            ended_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == StageState::Succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_succeeded() {
        let report = StageReport::succeeded("clean", Utc::now());

        assert_eq!(report.name, "clean");
        assert!(report.is_success());
        assert!(report.error.is_none());
        assert!(report.duration_ms() >= 0.0);
    }

    #[test]
    fn test_report_failed() {
        let report = StageReport::failed("clean", Utc::now(), "Hook 'deletePath' failed");

        assert!(!report.is_success());
        assert_eq!(report.state, StageState::Failed);
        assert_eq!(report.error.as_deref(), Some("Hook 'deletePath' failed"));
    }

    #[test]
    fn test_state_display_and_terminal() {
        assert_eq!(StageState::PropertiesResolved.to_string(), "properties_resolved");
        assert!(StageState::Failed.is_terminal());
        assert!(StageState::Succeeded.is_terminal());
        assert!(!StageState::Executing.is_terminal());
        assert_eq!(StageState::default(), StageState::Created);
    }

    #[test]
    fn test_report_serialization_skips_empty_error() {
        let report = StageReport::succeeded("build", Utc::now());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["state"], "succeeded");
        assert!(json.get("error").is_none());
    }
}
