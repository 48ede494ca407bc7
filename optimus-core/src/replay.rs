//! Replay model
//!
//! A replay re-runs a job and selected downstream jobs over a historical
//! window. The record lives in the operation store; status transitions are
//! monotonic and never leave a terminal state.

use crate::job::JobId;
use crate::tenant::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Replay config key: set when the downstream walk was suppressed entirely
pub const CONFIG_IGNORE_DOWNSTREAM: &str = "IGNORE_DOWNSTREAM";

/// Wildcard entry allowing every downstream namespace
pub const ALL_NAMESPACES: &str = "*";

/// Unique identifier for a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplayId(pub Uuid);

impl ReplayId {
    /// Create a new random replay ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReplayId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ReplayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a replay record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStatus {
    /// Accepted and queued
    Created,
    /// Picked up by a worker
    InProgress,
    /// Scheduler state cleared, runs re-executing
    Replayed,
    /// Terminal: at least one node could not be cleared
    Failed,
    /// Terminal: every node cleared and re-run successfully
    Success,
}

impl ReplayStatus {
    /// Whether this status can never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReplayStatus::Failed | ReplayStatus::Success)
    }

    /// Whether a replay in this status still holds `(job, run)` claims that
    /// conflict with new acceptances
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ReplayStatus::Created | ReplayStatus::InProgress)
    }

    /// Whether `next` is a legal transition from this status.
    /// Transitions are monotonic; terminal states accept nothing.
    pub fn can_transition_to(&self, next: ReplayStatus) -> bool {
        use ReplayStatus::*;
        match (self, next) {
            (Created, InProgress) | (Created, Failed) => true,
            (InProgress, Replayed) | (InProgress, Failed) => true,
            (Replayed, Success) | (Replayed, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReplayStatus::Created => "created",
            ReplayStatus::InProgress => "in_progress",
            ReplayStatus::Replayed => "replayed",
            ReplayStatus::Failed => "failed",
            ReplayStatus::Success => "success",
        };
        write!(f, "{}", s)
    }
}

/// Terminal message attached to a replay record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayMessage {
    pub kind: String,
    pub message: String,
}

/// A replay record as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySpec {
    /// Unique identifier
    pub id: ReplayId,

    /// Root job being replayed
    pub job_id: JobId,

    /// Root job name, denormalized for status queries
    pub job_name: String,

    /// Window start date (inclusive)
    pub start_date: DateTime<Utc>,

    /// Window end date (inclusive)
    pub end_date: DateTime<Utc>,

    /// Current status
    pub status: ReplayStatus,

    /// Replay configuration, e.g. `IGNORE_DOWNSTREAM`
    #[serde(default)]
    pub config: HashMap<String, String>,

    /// Terminal message, set on failure or success
    pub message: Option<ReplayMessage>,

    /// `(job, run_time)` claims of this replay's execution tree, used by
    /// the conflict check while the replay is in flight
    #[serde(default)]
    pub claimed_runs: HashMap<String, Vec<DateTime<Utc>>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// A replay request as accepted by the engine
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    pub project_id: ProjectId,
    pub job_name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Downstream namespaces allowed in the walk; `["*"]` allows all,
    /// empty suppresses the downstream walk entirely
    pub allowed_downstream_namespaces: Vec<String>,
    /// Skip the conflict check against in-flight replays
    pub force: bool,
}

impl ReplayRequest {
    /// Derive the persisted replay config from the request
    pub fn replay_config(&self) -> HashMap<String, String> {
        let mut config = HashMap::new();
        let ignore = self.allowed_downstream_namespaces.is_empty();
        config.insert(CONFIG_IGNORE_DOWNSTREAM.to_string(), ignore.to_string());
        config
    }

    /// Whether the given namespace passes the downstream allow-list
    pub fn allows_namespace(&self, namespace_name: &str) -> bool {
        self.allowed_downstream_namespaces
            .iter()
            .any(|allowed| allowed == ALL_NAMESPACES || allowed == namespace_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_transitions_are_monotonic() {
        use ReplayStatus::*;
        assert!(Created.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Replayed));
        assert!(Replayed.can_transition_to(Success));
        assert!(Replayed.can_transition_to(Failed));

        // never back from terminal
        assert!(!Success.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(Created));
        assert!(!Success.can_transition_to(Failed));
    }

    #[test]
    fn test_in_flight_statuses() {
        assert!(ReplayStatus::Created.is_in_flight());
        assert!(ReplayStatus::InProgress.is_in_flight());
        assert!(!ReplayStatus::Replayed.is_in_flight());
        assert!(!ReplayStatus::Success.is_in_flight());
    }

    #[test]
    fn test_replay_config_marks_ignored_downstream() {
        let request = ReplayRequest {
            project_id: ProjectId::new(),
            job_name: "job-A".to_string(),
            start: Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 11, 28, 0, 0, 0).unwrap(),
            allowed_downstream_namespaces: vec![],
            force: false,
        };
        assert_eq!(
            request.replay_config().get(CONFIG_IGNORE_DOWNSTREAM),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn test_namespace_allow_list() {
        let mut request = ReplayRequest {
            project_id: ProjectId::new(),
            job_name: "job-A".to_string(),
            start: Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 11, 28, 0, 0, 0).unwrap(),
            allowed_downstream_namespaces: vec!["finance".to_string()],
            force: false,
        };
        assert!(request.allows_namespace("finance"));
        assert!(!request.allows_namespace("marketing"));

        request.allowed_downstream_namespaces = vec![ALL_NAMESPACES.to_string()];
        assert!(request.allows_namespace("marketing"));
    }
}
