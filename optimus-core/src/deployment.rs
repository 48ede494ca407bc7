//! Deployment model
//!
//! One record per desired-state submission. Progress details are written
//! incrementally while the deployment runs; the terminal status latches.

use crate::tenant::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(pub Uuid);

impl DeploymentId {
    /// Create a new random deployment ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeploymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Accepted, waiting for a deploy worker
    Pending,
    /// Being processed
    InProgress,
    /// Terminal: every job compiled and submitted
    Succeed,
    /// Terminal: at least one job failed, or the batch aborted
    Failed,
}

impl DeploymentStatus {
    /// Whether this status can never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Succeed | DeploymentStatus::Failed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Succeed => "succeed",
            DeploymentStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A single job failure inside a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployFailure {
    pub job_name: String,
    pub message: String,
}

/// Incrementally written deployment progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDetail {
    pub success_count: i32,
    #[serde(default)]
    pub failures: Vec<DeployFailure>,
}

impl DeploymentDetail {
    /// Number of jobs that failed
    pub fn failure_count(&self) -> i32 {
        self.failures.len() as i32
    }
}

/// A deployment record as persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique identifier, returned to the caller immediately
    pub id: DeploymentId,

    /// Project whose desired state is being applied
    pub project_id: ProjectId,

    /// Current status; terminal values latch
    pub status: DeploymentStatus,

    /// Incremental progress details
    #[serde(default)]
    pub details: DeploymentDetail,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// Create a fresh pending deployment for a project
    pub fn new(project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id: DeploymentId::new(),
            project_id,
            status: DeploymentStatus::Pending,
            details: DeploymentDetail::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record one job failure
    pub fn record_failure(&mut self, job_name: impl Into<String>, message: impl Into<String>) {
        self.details.failures.push(DeployFailure {
            job_name: job_name.into(),
            message: message.into(),
        });
        self.updated_at = Utc::now();
    }

    /// Record one successfully submitted job
    pub fn record_success(&mut self) {
        self.details.success_count += 1;
        self.updated_at = Utc::now();
    }

    /// Latch the terminal status from the recorded details
    pub fn finish(&mut self) {
        self.status = if self.details.failures.is_empty() {
            DeploymentStatus::Succeed
        } else {
            DeploymentStatus::Failed
        };
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deployment_is_pending() {
        let deployment = Deployment::new(ProjectId::new());
        assert_eq!(deployment.status, DeploymentStatus::Pending);
        assert_eq!(deployment.details.success_count, 0);
    }

    #[test]
    fn test_finish_latches_succeed_without_failures() {
        let mut deployment = Deployment::new(ProjectId::new());
        deployment.record_success();
        deployment.record_success();
        deployment.finish();
        assert_eq!(deployment.status, DeploymentStatus::Succeed);
        assert_eq!(deployment.details.success_count, 2);
    }

    #[test]
    fn test_finish_latches_failed_with_failures() {
        let mut deployment = Deployment::new(ProjectId::new());
        deployment.record_success();
        deployment.record_failure("job-B", "compile failed");
        deployment.finish();
        assert_eq!(deployment.status, DeploymentStatus::Failed);
        assert_eq!(deployment.details.failure_count(), 1);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(DeploymentStatus::Succeed.is_terminal());
        assert!(DeploymentStatus::Failed.is_terminal());
        assert!(!DeploymentStatus::Pending.is_terminal());
        assert!(!DeploymentStatus::InProgress.is_terminal());
    }
}
