//! Store contracts
//!
//! Durable state is reachable only through these traits. Implementations
//! live outside the core (Postgres in production, in-memory in tests); the
//! engines hold a single [`Store`] handle that aggregates every repository.

use crate::backup::BackupSpec;
use crate::deployment::{Deployment, DeploymentId, DeploymentStatus};
use crate::job::{DependencyEdge, JobId, JobSpec};
use crate::replay::{ReplayId, ReplayMessage, ReplaySpec, ReplayStatus};
use crate::resource::ResourceSpec;
use crate::secret::Secret;
use crate::tenant::{Namespace, NamespaceId, Project, ProjectId};
use async_trait::async_trait;
use uuid::Uuid;

/// Project repository
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert or update a project by name
    async fn save_project(&self, project: &Project) -> crate::Result<()>;
    async fn get_project_by_id(&self, id: ProjectId) -> crate::Result<Project>;
    async fn get_project_by_name(&self, name: &str) -> crate::Result<Project>;
    async fn all_projects(&self) -> crate::Result<Vec<Project>>;
}

/// Namespace repository
#[async_trait]
pub trait NamespaceStore: Send + Sync {
    /// Insert or update a namespace by `(project_id, name)`
    async fn save_namespace(&self, namespace: &Namespace) -> crate::Result<()>;
    async fn get_namespace_by_id(&self, id: NamespaceId) -> crate::Result<Namespace>;
    async fn get_namespace(&self, project_id: ProjectId, name: &str) -> crate::Result<Namespace>;
    async fn namespaces_in_project(&self, project_id: ProjectId) -> crate::Result<Vec<Namespace>>;
}

/// Secret repository
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert a secret; `AlreadyExists` when the name is taken
    async fn save_secret(&self, secret: &Secret) -> crate::Result<()>;
    /// Update an existing secret; `NotFound` when absent
    async fn update_secret(&self, secret: &Secret) -> crate::Result<()>;
    async fn delete_secret(&self, project_id: ProjectId, name: &str) -> crate::Result<()>;
    /// Secrets visible to a project, namespace-scoped entries included
    async fn secrets_in_project(&self, project_id: ProjectId) -> crate::Result<Vec<Secret>>;
}

/// Result of a keep-only replacement of a namespace's jobs
#[derive(Debug, Clone, Default)]
pub struct NamespaceJobsReplacement {
    /// Desired specs as persisted; ids of pre-existing specs are preserved
    pub saved: Vec<JobSpec>,
    /// Previously owned specs absent from the desired set, now deleted
    pub deleted: Vec<JobSpec>,
}

/// Job spec repository
#[async_trait]
pub trait JobSpecStore: Send + Sync {
    /// Insert or update a spec by `(project_id, name)`; an update keeps the
    /// stored id
    async fn save_job(&self, project_id: ProjectId, job: &JobSpec) -> crate::Result<JobSpec>;
    /// Replace a namespace's jobs with the desired set in one transaction:
    /// upsert every desired spec, then delete specs the namespace owned that
    /// are absent from the set
    async fn replace_jobs_in_namespace(
        &self,
        project_id: ProjectId,
        namespace_id: NamespaceId,
        desired: &[JobSpec],
    ) -> crate::Result<NamespaceJobsReplacement>;
    async fn get_job_by_id(&self, id: JobId) -> crate::Result<JobSpec>;
    async fn get_job_by_name(&self, project_id: ProjectId, name: &str) -> crate::Result<JobSpec>;
    /// The job whose derived destination is the given URN
    async fn get_job_by_destination(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> crate::Result<JobSpec>;
    /// Record the derived destination URN for a job
    async fn set_job_destination(&self, id: JobId, urn: &str) -> crate::Result<()>;
    async fn jobs_in_project(&self, project_id: ProjectId) -> crate::Result<Vec<JobSpec>>;
    async fn jobs_in_namespace(&self, namespace_id: NamespaceId) -> crate::Result<Vec<JobSpec>>;
    /// Hard-delete a spec
    async fn delete_job(&self, id: JobId) -> crate::Result<()>;
}

/// Derived dependency edge repository, persisted flat per project
#[async_trait]
pub trait JobDependencyStore: Send + Sync {
    /// Replace all edges originating from one job
    async fn replace_job_dependencies(
        &self,
        project_id: ProjectId,
        job_id: JobId,
        edges: &[DependencyEdge],
    ) -> crate::Result<()>;
    /// All edges in a project, keyed by the depending job
    async fn dependencies_in_project(
        &self,
        project_id: ProjectId,
    ) -> crate::Result<Vec<(JobId, DependencyEdge)>>;
}

/// Resource spec repository
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Insert or update a resource by `(namespace_id, datastore, name)`
    async fn save_resource(&self, project_id: ProjectId, resource: &ResourceSpec)
        -> crate::Result<()>;
    async fn get_resource(
        &self,
        namespace_id: NamespaceId,
        datastore: &str,
        name: &str,
    ) -> crate::Result<ResourceSpec>;
    async fn get_resource_by_urn(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> crate::Result<ResourceSpec>;
    async fn resources_in_namespace(
        &self,
        namespace_id: NamespaceId,
    ) -> crate::Result<Vec<ResourceSpec>>;
}

/// Replay record repository
#[async_trait]
pub trait ReplayStore: Send + Sync {
    async fn save_replay(&self, replay: &ReplaySpec) -> crate::Result<()>;
    /// Transition a replay's status; illegal transitions are rejected with
    /// `FailedPrecondition`
    async fn update_replay_status(
        &self,
        id: ReplayId,
        status: ReplayStatus,
        message: Option<ReplayMessage>,
    ) -> crate::Result<()>;
    async fn get_replay_by_id(&self, id: ReplayId) -> crate::Result<ReplaySpec>;
    /// Replays for a project ordered by `created_at` descending
    async fn replays_in_project(&self, project_id: ProjectId) -> crate::Result<Vec<ReplaySpec>>;
    /// Replays currently in one of the given statuses, across projects
    async fn replays_by_statuses(
        &self,
        statuses: &[ReplayStatus],
    ) -> crate::Result<Vec<ReplaySpec>>;
}

/// Backup record repository
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn save_backup(&self, backup: &BackupSpec) -> crate::Result<()>;
    async fn get_backup_by_id(&self, id: Uuid) -> crate::Result<BackupSpec>;
    /// Backups for a project and datastore, newest first
    async fn backups_in_project(
        &self,
        project_id: ProjectId,
        datastore: &str,
    ) -> crate::Result<Vec<BackupSpec>>;
}

/// Deployment record repository
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn save_deployment(&self, deployment: &Deployment) -> crate::Result<()>;
    /// Overwrite an existing record; terminal statuses latch and further
    /// writes after a terminal status are rejected with `FailedPrecondition`
    async fn update_deployment(&self, deployment: &Deployment) -> crate::Result<()>;
    async fn get_deployment_by_id(&self, id: DeploymentId) -> crate::Result<Deployment>;
    async fn get_deployment_by_status_and_project(
        &self,
        status: DeploymentStatus,
        project_id: ProjectId,
    ) -> crate::Result<Option<Deployment>>;
}

/// Aggregate handle over every repository; engines hold `Arc<dyn Store>`.
pub trait Store:
    ProjectStore
    + NamespaceStore
    + SecretStore
    + JobSpecStore
    + JobDependencyStore
    + ResourceStore
    + ReplayStore
    + BackupStore
    + DeploymentStore
{
}

impl<T> Store for T where
    T: ProjectStore
        + NamespaceStore
        + SecretStore
        + JobSpecStore
        + JobDependencyStore
        + ResourceStore
        + ReplayStore
        + BackupStore
        + DeploymentStore
{
}
