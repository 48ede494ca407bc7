//! In-memory store
//!
//! Backs tests and embedded deployments. Short critical sections behind a
//! `parking_lot` lock; never held across an await point.

use async_trait::async_trait;
use optimus_core::store::{
    BackupStore, DeploymentStore, JobDependencyStore, JobSpecStore, NamespaceJobsReplacement,
    NamespaceStore, ProjectStore, ReplayStore, ResourceStore, SecretStore,
};
use optimus_core::{
    BackupSpec, DependencyEdge, Deployment, DeploymentId, DeploymentStatus, JobId, JobSpec,
    Namespace, NamespaceId, Project, ProjectId, ReplayId, ReplayMessage, ReplaySpec, ReplayStatus,
    ResourceSpec, Secret,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredJob {
    project_id: ProjectId,
    spec: JobSpec,
}

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, Project>,
    namespaces: HashMap<NamespaceId, Namespace>,
    secrets: HashMap<(ProjectId, String), Secret>,
    jobs: HashMap<JobId, StoredJob>,
    edges: HashMap<JobId, (ProjectId, Vec<DependencyEdge>)>,
    resources: HashMap<(ProjectId, String), ResourceSpec>,
    replays: HashMap<ReplayId, ReplaySpec>,
    backups: HashMap<Uuid, BackupSpec>,
    deployments: HashMap<DeploymentId, Deployment>,
}

/// In-memory implementation of every store trait
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn save_project(&self, project: &Project) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        // name is the upsert key; a rename of an id is rejected by lookup
        if let Some(existing) = inner.projects.values().find(|p| p.name == project.name) {
            let id = existing.id;
            inner.projects.insert(id, Project { id, ..project.clone() });
        } else {
            inner.projects.insert(project.id, project.clone());
        }
        Ok(())
    }

    async fn get_project_by_id(&self, id: ProjectId) -> optimus_core::Result<Project> {
        self.inner
            .read()
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("project not found", id))
    }

    async fn get_project_by_name(&self, name: &str) -> optimus_core::Result<Project> {
        self.inner
            .read()
            .projects
            .values()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("project not found", name))
    }

    async fn all_projects(&self) -> optimus_core::Result<Vec<Project>> {
        Ok(self.inner.read().projects.values().cloned().collect())
    }
}

#[async_trait]
impl NamespaceStore for InMemoryStore {
    async fn save_namespace(&self, namespace: &Namespace) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner
            .namespaces
            .values()
            .find(|n| n.project_id == namespace.project_id && n.name == namespace.name)
        {
            let id = existing.id;
            inner
                .namespaces
                .insert(id, Namespace { id, ..namespace.clone() });
        } else {
            inner.namespaces.insert(namespace.id, namespace.clone());
        }
        Ok(())
    }

    async fn get_namespace_by_id(&self, id: NamespaceId) -> optimus_core::Result<Namespace> {
        self.inner
            .read()
            .namespaces
            .get(&id)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("namespace not found", id))
    }

    async fn get_namespace(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> optimus_core::Result<Namespace> {
        self.inner
            .read()
            .namespaces
            .values()
            .find(|n| n.project_id == project_id && n.name == name)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("namespace not found", name))
    }

    async fn namespaces_in_project(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<Namespace>> {
        Ok(self
            .inner
            .read()
            .namespaces
            .values()
            .filter(|n| n.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SecretStore for InMemoryStore {
    async fn save_secret(&self, secret: &Secret) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        let key = (secret.project_id, secret.name.clone());
        if inner.secrets.contains_key(&key) {
            return Err(optimus_core::Error::already_exists(
                "unable to register secret",
                &secret.name,
            ));
        }
        inner.secrets.insert(key, secret.clone());
        Ok(())
    }

    async fn update_secret(&self, secret: &Secret) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        let key = (secret.project_id, secret.name.clone());
        if !inner.secrets.contains_key(&key) {
            return Err(optimus_core::Error::not_found(
                "secret not found",
                &secret.name,
            ));
        }
        inner.secrets.insert(key, secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, project_id: ProjectId, name: &str) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        inner
            .secrets
            .remove(&(project_id, name.to_string()))
            .map(|_| ())
            .ok_or_else(|| optimus_core::Error::not_found("secret not found", name))
    }

    async fn secrets_in_project(&self, project_id: ProjectId) -> optimus_core::Result<Vec<Secret>> {
        Ok(self
            .inner
            .read()
            .secrets
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect())
    }
}

impl Inner {
    fn upsert_job(&mut self, project_id: ProjectId, job: &JobSpec) -> JobSpec {
        let existing_id = self
            .jobs
            .values()
            .find(|j| j.project_id == project_id && j.spec.name == job.name)
            .map(|j| j.spec.id);

        let mut spec = job.clone();
        if let Some(id) = existing_id {
            spec.id = id;
        }
        // a previously derived destination survives an upsert that does not
        // carry one
        if spec.destination.is_none() {
            spec.destination = self
                .jobs
                .get(&spec.id)
                .and_then(|j| j.spec.destination.clone());
        }
        self.jobs.insert(
            spec.id,
            StoredJob {
                project_id,
                spec: spec.clone(),
            },
        );
        spec
    }
}

#[async_trait]
impl JobSpecStore for InMemoryStore {
    async fn save_job(&self, project_id: ProjectId, job: &JobSpec) -> optimus_core::Result<JobSpec> {
        Ok(self.inner.write().upsert_job(project_id, job))
    }

    async fn replace_jobs_in_namespace(
        &self,
        project_id: ProjectId,
        namespace_id: NamespaceId,
        desired: &[JobSpec],
    ) -> optimus_core::Result<NamespaceJobsReplacement> {
        let mut inner = self.inner.write();
        let mut replacement = NamespaceJobsReplacement::default();

        for job in desired {
            replacement.saved.push(inner.upsert_job(project_id, job));
        }

        let desired_names: Vec<&str> = desired.iter().map(|j| j.name.as_str()).collect();
        let to_delete: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|j| {
                j.project_id == project_id
                    && j.spec.namespace_id == namespace_id
                    && !desired_names.contains(&j.spec.name.as_str())
            })
            .map(|j| j.spec.id)
            .collect();
        for id in to_delete {
            if let Some(stored) = inner.jobs.remove(&id) {
                inner.edges.remove(&id);
                replacement.deleted.push(stored.spec);
            }
        }
        Ok(replacement)
    }

    async fn get_job_by_id(&self, id: JobId) -> optimus_core::Result<JobSpec> {
        self.inner
            .read()
            .jobs
            .get(&id)
            .map(|j| j.spec.clone())
            .ok_or_else(|| optimus_core::Error::not_found("job not found", id))
    }

    async fn get_job_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> optimus_core::Result<JobSpec> {
        self.inner
            .read()
            .jobs
            .values()
            .find(|j| j.project_id == project_id && j.spec.name == name)
            .map(|j| j.spec.clone())
            .ok_or_else(|| optimus_core::Error::not_found("job not found", name))
    }

    async fn get_job_by_destination(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> optimus_core::Result<JobSpec> {
        self.inner
            .read()
            .jobs
            .values()
            .find(|j| j.project_id == project_id && j.spec.destination.as_deref() == Some(urn))
            .map(|j| j.spec.clone())
            .ok_or_else(|| optimus_core::Error::not_found("job not found for destination", urn))
    }

    async fn set_job_destination(&self, id: JobId, urn: &str) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        let stored = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| optimus_core::Error::not_found("job not found", id))?;
        stored.spec.destination = Some(urn.to_string());
        Ok(())
    }

    async fn jobs_in_project(&self, project_id: ProjectId) -> optimus_core::Result<Vec<JobSpec>> {
        let mut jobs: Vec<JobSpec> = self
            .inner
            .read()
            .jobs
            .values()
            .filter(|j| j.project_id == project_id)
            .map(|j| j.spec.clone())
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn jobs_in_namespace(
        &self,
        namespace_id: NamespaceId,
    ) -> optimus_core::Result<Vec<JobSpec>> {
        let mut jobs: Vec<JobSpec> = self
            .inner
            .read()
            .jobs
            .values()
            .filter(|j| j.spec.namespace_id == namespace_id)
            .map(|j| j.spec.clone())
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn delete_job(&self, id: JobId) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        inner.edges.remove(&id);
        inner
            .jobs
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| optimus_core::Error::not_found("job not found", id))
    }
}

#[async_trait]
impl JobDependencyStore for InMemoryStore {
    async fn replace_job_dependencies(
        &self,
        project_id: ProjectId,
        job_id: JobId,
        edges: &[DependencyEdge],
    ) -> optimus_core::Result<()> {
        self.inner
            .write()
            .edges
            .insert(job_id, (project_id, edges.to_vec()));
        Ok(())
    }

    async fn dependencies_in_project(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<(JobId, DependencyEdge)>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for (job_id, (edge_project, edges)) in &inner.edges {
            if *edge_project == project_id {
                for edge in edges {
                    out.push((*job_id, edge.clone()));
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn save_resource(
        &self,
        project_id: ProjectId,
        resource: &ResourceSpec,
    ) -> optimus_core::Result<()> {
        let key = (
            project_id,
            format!("{}/{}/{}", resource.namespace_id, resource.datastore_ref, resource.name),
        );
        self.inner.write().resources.insert(key, resource.clone());
        Ok(())
    }

    async fn get_resource(
        &self,
        namespace_id: NamespaceId,
        datastore: &str,
        name: &str,
    ) -> optimus_core::Result<ResourceSpec> {
        self.inner
            .read()
            .resources
            .values()
            .find(|r| {
                r.namespace_id == namespace_id && r.datastore_ref == datastore && r.name == name
            })
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("resource not found", name))
    }

    async fn get_resource_by_urn(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> optimus_core::Result<ResourceSpec> {
        self.inner
            .read()
            .resources
            .iter()
            .find(|((pid, _), r)| *pid == project_id && r.urn == urn)
            .map(|(_, r)| r.clone())
            .ok_or_else(|| optimus_core::Error::not_found("resource not found", urn))
    }

    async fn resources_in_namespace(
        &self,
        namespace_id: NamespaceId,
    ) -> optimus_core::Result<Vec<ResourceSpec>> {
        Ok(self
            .inner
            .read()
            .resources
            .values()
            .filter(|r| r.namespace_id == namespace_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReplayStore for InMemoryStore {
    async fn save_replay(&self, replay: &ReplaySpec) -> optimus_core::Result<()> {
        self.inner.write().replays.insert(replay.id, replay.clone());
        Ok(())
    }

    async fn update_replay_status(
        &self,
        id: ReplayId,
        status: ReplayStatus,
        message: Option<ReplayMessage>,
    ) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        let replay = inner
            .replays
            .get_mut(&id)
            .ok_or_else(|| optimus_core::Error::not_found("replay not found", id))?;
        if !replay.status.can_transition_to(status) {
            return Err(optimus_core::Error::failed_precondition(
                "unable to update replay",
                format!("illegal transition {} -> {}", replay.status, status),
            ));
        }
        replay.status = status;
        if message.is_some() {
            replay.message = message;
        }
        Ok(())
    }

    async fn get_replay_by_id(&self, id: ReplayId) -> optimus_core::Result<ReplaySpec> {
        self.inner
            .read()
            .replays
            .get(&id)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("replay not found", id))
    }

    async fn replays_in_project(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<ReplaySpec>> {
        let inner = self.inner.read();
        let mut replays: Vec<ReplaySpec> = inner
            .replays
            .values()
            .filter(|r| {
                inner
                    .jobs
                    .get(&r.job_id)
                    .map(|j| j.project_id == project_id)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        replays.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(replays)
    }

    async fn replays_by_statuses(
        &self,
        statuses: &[ReplayStatus],
    ) -> optimus_core::Result<Vec<ReplaySpec>> {
        Ok(self
            .inner
            .read()
            .replays
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BackupStore for InMemoryStore {
    async fn save_backup(&self, backup: &BackupSpec) -> optimus_core::Result<()> {
        self.inner.write().backups.insert(backup.id.0, backup.clone());
        Ok(())
    }

    async fn get_backup_by_id(&self, id: Uuid) -> optimus_core::Result<BackupSpec> {
        self.inner
            .read()
            .backups
            .get(&id)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("backup not found", id))
    }

    async fn backups_in_project(
        &self,
        project_id: ProjectId,
        datastore: &str,
    ) -> optimus_core::Result<Vec<BackupSpec>> {
        let mut backups: Vec<BackupSpec> = self
            .inner
            .read()
            .backups
            .values()
            .filter(|b| b.project_id == project_id && b.datastore_ref == datastore)
            .cloned()
            .collect();
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }
}

#[async_trait]
impl DeploymentStore for InMemoryStore {
    async fn save_deployment(&self, deployment: &Deployment) -> optimus_core::Result<()> {
        self.inner
            .write()
            .deployments
            .insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> optimus_core::Result<()> {
        let mut inner = self.inner.write();
        let existing = inner
            .deployments
            .get(&deployment.id)
            .ok_or_else(|| optimus_core::Error::not_found("deployment not found", deployment.id))?;
        if existing.status.is_terminal() {
            return Err(optimus_core::Error::failed_precondition(
                "unable to update deployment",
                format!("deployment {} already {}", deployment.id, existing.status),
            ));
        }
        inner.deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn get_deployment_by_id(&self, id: DeploymentId) -> optimus_core::Result<Deployment> {
        self.inner
            .read()
            .deployments
            .get(&id)
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("deployment not found", id))
    }

    async fn get_deployment_by_status_and_project(
        &self,
        status: DeploymentStatus,
        project_id: ProjectId,
    ) -> optimus_core::Result<Option<Deployment>> {
        Ok(self
            .inner
            .read()
            .deployments
            .values()
            .find(|d| d.status == status && d.project_id == project_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimus_core::store::JobSpecStore as _;

    #[tokio::test]
    async fn test_job_upsert_preserves_id() {
        let store = InMemoryStore::new();
        let project_id = ProjectId::new();

        let first = JobSpec::builder("job-A").build();
        let saved = store.save_job(project_id, &first).await.unwrap();

        let second = JobSpec::builder("job-A").version(2).build();
        let resaved = store.save_job(project_id, &second).await.unwrap();

        assert_eq!(saved.id, resaved.id);
        assert_eq!(resaved.version, 2);
    }

    #[tokio::test]
    async fn test_replace_jobs_keep_only() {
        let store = InMemoryStore::new();
        let project_id = ProjectId::new();
        let namespace_id = NamespaceId::new();

        let a = JobSpec::builder("job-A").namespace_id(namespace_id).build();
        let b = JobSpec::builder("job-B").namespace_id(namespace_id).build();
        store
            .replace_jobs_in_namespace(project_id, namespace_id, &[a.clone(), b])
            .await
            .unwrap();

        // deploy again with only job-A: job-B is deleted
        let outcome = store
            .replace_jobs_in_namespace(project_id, namespace_id, &[a])
            .await
            .unwrap();
        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.deleted[0].name, "job-B");
        assert_eq!(store.jobs_in_project(project_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_desired_set_deletes_namespace_jobs() {
        let store = InMemoryStore::new();
        let project_id = ProjectId::new();
        let namespace_id = NamespaceId::new();

        let a = JobSpec::builder("job-A").namespace_id(namespace_id).build();
        store
            .replace_jobs_in_namespace(project_id, namespace_id, &[a])
            .await
            .unwrap();

        let outcome = store
            .replace_jobs_in_namespace(project_id, namespace_id, &[])
            .await
            .unwrap();
        assert_eq!(outcome.deleted.len(), 1);
        assert!(store.jobs_in_project(project_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_status_transition_guard() {
        use optimus_core::store::ReplayStore as _;
        let store = InMemoryStore::new();
        let replay = ReplaySpec {
            id: ReplayId::new(),
            job_id: JobId::new(),
            job_name: "job-A".to_string(),
            start_date: chrono::Utc::now(),
            end_date: chrono::Utc::now(),
            status: ReplayStatus::Created,
            config: Default::default(),
            message: None,
            claimed_runs: Default::default(),
            created_at: chrono::Utc::now(),
        };
        store.save_replay(&replay).await.unwrap();

        store
            .update_replay_status(replay.id, ReplayStatus::InProgress, None)
            .await
            .unwrap();

        // terminal states latch
        store
            .update_replay_status(replay.id, ReplayStatus::Failed, None)
            .await
            .unwrap();
        let result = store
            .update_replay_status(replay.id, ReplayStatus::InProgress, None)
            .await;
        assert!(matches!(
            result,
            Err(optimus_core::Error::FailedPrecondition(_))
        ));
    }

    #[tokio::test]
    async fn test_destination_lookup() {
        let store = InMemoryStore::new();
        let project_id = ProjectId::new();
        let job = store
            .save_job(project_id, &JobSpec::builder("job-A").build())
            .await
            .unwrap();
        store
            .set_job_destination(job.id, "bigquery://playground.events")
            .await
            .unwrap();

        let found = store
            .get_job_by_destination(project_id, "bigquery://playground.events")
            .await
            .unwrap();
        assert_eq!(found.name, "job-A");
    }
}
