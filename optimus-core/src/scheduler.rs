//! External scheduler contract
//!
//! The engines never talk to the scheduler directly; they use this trait to
//! compile specs into runtime artifacts, submit them per namespace, clear
//! historical runs during replay, and query run state.

use crate::job::JobSpec;
use crate::secret::SecretItem;
use crate::tenant::{Namespace, Project};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A compiled runtime artifact for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledJob {
    pub job_name: String,
    /// File name under the scheduler's DAG storage
    pub file_name: String,
    /// Rendered artifact contents
    pub contents: String,
}

/// State of one scheduled run as reported by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Success,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Success => "success",
            RunState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for RunState {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(RunState::Pending),
            "running" => Ok(RunState::Running),
            "success" => Ok(RunState::Success),
            "failed" => Ok(RunState::Failed),
            other => Err(crate::Error::invalid_argument(
                "unable to parse run state",
                other,
            )),
        }
    }
}

/// One scheduled run with its reported state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunStatus {
    pub scheduled_at: DateTime<Utc>,
    pub state: RunState,
}

/// The external scheduler (Airflow-class) as the engines see it
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Registry name of this scheduler, e.g. `airflow`
    fn name(&self) -> &str;

    /// Compile a job spec into a runtime artifact. The spec carries its
    /// resolved dependencies and priority weight at this point.
    async fn compile(
        &self,
        project: &Project,
        namespace: &Namespace,
        job: &JobSpec,
        secrets: &[SecretItem],
    ) -> crate::Result<CompiledJob>;

    /// Submit compiled artifacts for one namespace. Transactional per call:
    /// either the namespace's batch lands or the call fails.
    async fn submit(
        &self,
        project: &Project,
        namespace: &Namespace,
        artifacts: Vec<CompiledJob>,
    ) -> crate::Result<()>;

    /// Remove a job's artifact from the scheduler
    async fn remove(
        &self,
        project: &Project,
        namespace: &Namespace,
        job_name: &str,
    ) -> crate::Result<()>;

    /// Clear historical runs so the scheduler re-executes them
    async fn clear_runs(
        &self,
        project: &Project,
        job_name: &str,
        runs: &[DateTime<Utc>],
    ) -> crate::Result<()>;

    /// Report run states for a job over a window, newest batch first capped
    /// at `batch_size`
    async fn run_status(
        &self,
        project: &Project,
        job_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batch_size: usize,
    ) -> crate::Result<Vec<JobRunStatus>>;
}
