//! Database row models
//!
//! Frequently filtered fields get their own columns; the rest of each spec
//! rides along as JSON. Conversions to and from the domain types live here
//! so the repositories stay query-only.

use chrono::{DateTime, Utc};
use optimus_core::{
    BackupSpec, DependencyEdge, Deployment, DeploymentDetail, DeploymentId, DeploymentStatus,
    JobId, JobSpec, Namespace, NamespaceId, Project, ProjectId, ReplayId, ReplayMessage,
    ReplaySpec, ReplayStatus, ResourceSpec, Secret,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Project row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub name: String,
    pub config: sqlx::types::Json<std::collections::HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: ProjectId(row.id),
            name: row.name,
            config: row.config.0,
            created_at: row.created_at,
        }
    }
}

/// Namespace row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NamespaceRow {
    pub id: Uuid,
    pub name: String,
    pub project_id: Uuid,
    pub config: sqlx::types::Json<std::collections::HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
}

impl From<NamespaceRow> for Namespace {
    fn from(row: NamespaceRow) -> Self {
        Namespace {
            id: NamespaceId(row.id),
            name: row.name,
            project_id: ProjectId(row.project_id),
            config: row.config.0,
            created_at: row.created_at,
        }
    }
}

/// Secret row; the value is stored encrypted by the database role setup
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecretRow {
    pub name: String,
    pub value: String,
    pub project_id: Uuid,
    pub namespace_id: Option<Uuid>,
}

impl From<SecretRow> for Secret {
    fn from(row: SecretRow) -> Self {
        Secret {
            name: row.name,
            value: row.value,
            project_id: ProjectId(row.project_id),
            namespace_id: row.namespace_id.map(NamespaceId),
        }
    }
}

/// Job spec row; `destination` is the derived output URN, written by the
/// resolver after each pass
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub namespace_id: Uuid,
    pub name: String,
    pub version: i32,
    pub destination: Option<String>,
    pub spec: sqlx::types::Json<JobSpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    pub fn into_spec(self) -> JobSpec {
        let mut spec = self.spec.0;
        spec.id = JobId(self.id);
        spec
    }
}

/// Flat dependency edge row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobDependencyRow {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub from_job: String,
    pub to_ref: String,
    pub kind: String,
    pub scope: String,
}

impl JobDependencyRow {
    pub fn from_edge(project_id: ProjectId, job_id: JobId, edge: &DependencyEdge) -> Self {
        Self {
            job_id: job_id.0,
            project_id: project_id.0,
            from_job: edge.from.clone(),
            to_ref: edge.to.clone(),
            kind: serde_json::to_string(&edge.kind)
                .expect("edge kind serializes")
                .trim_matches('"')
                .to_string(),
            scope: serde_json::to_string(&edge.scope)
                .expect("edge scope serializes")
                .trim_matches('"')
                .to_string(),
        }
    }

    pub fn into_edge(self) -> optimus_core::Result<(JobId, DependencyEdge)> {
        let kind = serde_json::from_str(&format!("\"{}\"", self.kind)).map_err(|e| {
            optimus_core::Error::internal("unable to read dependency edge", e)
        })?;
        let scope = serde_json::from_str(&format!("\"{}\"", self.scope)).map_err(|e| {
            optimus_core::Error::internal("unable to read dependency edge", e)
        })?;
        Ok((
            JobId(self.job_id),
            DependencyEdge {
                from: self.from_job,
                to: self.to_ref,
                kind,
                scope,
            },
        ))
    }
}

/// Resource spec row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResourceRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub namespace_id: Uuid,
    pub datastore: String,
    pub name: String,
    pub urn: String,
    pub spec: sqlx::types::Json<ResourceSpec>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRow {
    pub fn into_spec(self) -> ResourceSpec {
        self.spec.0
    }
}

/// Replay record row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReplayRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub config: sqlx::types::Json<std::collections::HashMap<String, String>>,
    pub message: Option<sqlx::types::Json<ReplayMessage>>,
    pub claimed_runs:
        sqlx::types::Json<std::collections::HashMap<String, Vec<DateTime<Utc>>>>,
    pub created_at: DateTime<Utc>,
}

impl ReplayRow {
    pub fn from_spec(replay: &ReplaySpec) -> Self {
        Self {
            id: replay.id.0,
            job_id: replay.job_id.0,
            job_name: replay.job_name.clone(),
            start_date: replay.start_date,
            end_date: replay.end_date,
            status: replay.status.to_string(),
            config: sqlx::types::Json(replay.config.clone()),
            message: replay.message.clone().map(sqlx::types::Json),
            claimed_runs: sqlx::types::Json(replay.claimed_runs.clone()),
            created_at: replay.created_at,
        }
    }

    pub fn into_spec(self) -> optimus_core::Result<ReplaySpec> {
        Ok(ReplaySpec {
            id: ReplayId(self.id),
            job_id: JobId(self.job_id),
            job_name: self.job_name,
            start_date: self.start_date,
            end_date: self.end_date,
            status: parse_replay_status(&self.status)?,
            config: self.config.0,
            message: self.message.map(|m| m.0),
            claimed_runs: self.claimed_runs.0,
            created_at: self.created_at,
        })
    }
}

pub(crate) fn parse_replay_status(s: &str) -> optimus_core::Result<ReplayStatus> {
    match s {
        "created" => Ok(ReplayStatus::Created),
        "in_progress" => Ok(ReplayStatus::InProgress),
        "replayed" => Ok(ReplayStatus::Replayed),
        "failed" => Ok(ReplayStatus::Failed),
        "success" => Ok(ReplayStatus::Success),
        other => Err(optimus_core::Error::internal(
            "unable to read replay",
            format!("unknown status '{}'", other),
        )),
    }
}

/// Backup record row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BackupRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub datastore: String,
    pub resource_name: String,
    pub resource_urn: String,
    pub description: String,
    pub config: sqlx::types::Json<std::collections::HashMap<String, String>>,
    pub result: sqlx::types::Json<std::collections::HashMap<String, optimus_core::BackupDetail>>,
    pub created_at: DateTime<Utc>,
}

impl BackupRow {
    pub fn from_spec(backup: &BackupSpec) -> Self {
        Self {
            id: backup.id.0,
            project_id: backup.project_id.0,
            datastore: backup.datastore_ref.clone(),
            resource_name: backup.resource_name.clone(),
            resource_urn: backup.resource_urn.clone(),
            description: backup.description.clone(),
            config: sqlx::types::Json(backup.config.clone()),
            result: sqlx::types::Json(backup.result.clone()),
            created_at: backup.created_at,
        }
    }

    pub fn into_spec(self) -> BackupSpec {
        BackupSpec {
            id: optimus_core::BackupId(self.id),
            resource_urn: self.resource_urn,
            resource_name: self.resource_name,
            description: self.description,
            project_id: ProjectId(self.project_id),
            datastore_ref: self.datastore,
            config: self.config.0,
            result: self.result.0,
            created_at: self.created_at,
        }
    }
}

/// Deployment record row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeploymentRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub status: String,
    pub details: sqlx::types::Json<DeploymentDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRow {
    pub fn from_deployment(deployment: &Deployment) -> Self {
        Self {
            id: deployment.id.0,
            project_id: deployment.project_id.0,
            status: deployment.status.to_string(),
            details: sqlx::types::Json(deployment.details.clone()),
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        }
    }

    pub fn into_deployment(self) -> optimus_core::Result<Deployment> {
        Ok(Deployment {
            id: DeploymentId(self.id),
            project_id: ProjectId(self.project_id),
            status: parse_deployment_status(&self.status)?,
            details: self.details.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn parse_deployment_status(s: &str) -> optimus_core::Result<DeploymentStatus> {
    match s {
        "pending" => Ok(DeploymentStatus::Pending),
        "in_progress" => Ok(DeploymentStatus::InProgress),
        "succeed" => Ok(DeploymentStatus::Succeed),
        "failed" => Ok(DeploymentStatus::Failed),
        other => Err(optimus_core::Error::internal(
            "unable to read deployment",
            format!("unknown status '{}'", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimus_core::{EdgeKind, EdgeScope};

    #[test]
    fn test_edge_round_trip() {
        let edge = DependencyEdge {
            from: "job-B".to_string(),
            to: "job-A".to_string(),
            kind: EdgeKind::Inferred,
            scope: EdgeScope::InterNamespace,
        };
        let row = JobDependencyRow::from_edge(ProjectId::new(), JobId::new(), &edge);
        assert_eq!(row.kind, "inferred");
        assert_eq!(row.scope, "inter_namespace");

        let (_, parsed) = row.into_edge().unwrap();
        assert_eq!(parsed, edge);
    }

    #[test]
    fn test_replay_status_parse() {
        assert_eq!(
            parse_replay_status("in_progress").unwrap(),
            ReplayStatus::InProgress
        );
        assert!(parse_replay_status("paused").is_err());
    }

    #[test]
    fn test_deployment_status_round_trip() {
        for status in [
            DeploymentStatus::Pending,
            DeploymentStatus::InProgress,
            DeploymentStatus::Succeed,
            DeploymentStatus::Failed,
        ] {
            assert_eq!(parse_deployment_status(&status.to_string()).unwrap(), status);
        }
    }
}
