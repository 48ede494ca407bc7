//! Job service facade
//!
//! The operations the transport layer delegates to: spec CRUD, read-only
//! checks, deploys, refreshes, and guarded deletes. Everything here speaks
//! the core error taxonomy; the transport maps kinds onto status codes.

use crate::deploy::{DeployManager, Deployer};
use crate::resolver::DependencyResolver;
use optimus_core::store::*;
use optimus_core::{
    Deployment, DeploymentId, Event, JobId, JobSpec, NamespaceId, ProgressSink, ProjectId,
    Scheduler,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Facade over the deployment engine and spec repositories
pub struct JobService {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    resolver: Arc<DependencyResolver>,
    deployer: Arc<Deployer>,
    deploy_manager: Arc<DeployManager>,
}

impl JobService {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        resolver: Arc<DependencyResolver>,
        deployer: Arc<Deployer>,
        deploy_manager: Arc<DeployManager>,
    ) -> Self {
        Self {
            store,
            scheduler,
            resolver,
            deployer,
            deploy_manager,
        }
    }

    /// Validate and persist a single spec outside a full deployment
    pub async fn create_job(
        &self,
        project_id: ProjectId,
        job: JobSpec,
    ) -> optimus_core::Result<JobSpec> {
        self.deployer.validate_spec(&job)?;
        self.store.save_job(project_id, &job).await
    }

    pub async fn get_job(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> optimus_core::Result<JobSpec> {
        self.store.get_job_by_name(project_id, name).await
    }

    /// The job writing to a destination URN, for destination-filtered reads
    pub async fn get_job_by_destination(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> optimus_core::Result<JobSpec> {
        self.store.get_job_by_destination(project_id, urn).await
    }

    pub async fn list_jobs(&self, namespace_id: NamespaceId) -> optimus_core::Result<Vec<JobSpec>> {
        self.store.jobs_in_namespace(namespace_id).await
    }

    /// Validate specs without persisting; safe to run concurrently with
    /// deploys since it only reads. Emits one check event per job.
    #[instrument(skip(self, jobs, sink), fields(jobs = jobs.len()))]
    pub async fn check(
        &self,
        project_id: ProjectId,
        jobs: &[JobSpec],
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<()> {
        let project = self.store.get_project_by_id(project_id).await?;
        for job in jobs {
            let mut outcome = self.deployer.validate_spec(job);
            if outcome.is_ok() {
                // exercising the plugin catches config errors validation
                // alone cannot see
                if let Err(e) = self.resolver.generate_for_job(&project, job).await {
                    outcome = Err(e);
                }
            }
            match outcome {
                Ok(()) => sink.notify(&Event::JobCheckPassed {
                    job_name: job.name.clone(),
                }),
                Err(e) => sink.notify(&Event::JobCheckFailed {
                    job_name: job.name.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        Ok(())
    }

    /// Submit a desired set for a namespace; returns the deployment id
    /// immediately while the work proceeds asynchronously
    pub async fn deploy(
        &self,
        project_id: ProjectId,
        namespace_id: NamespaceId,
        desired: Vec<JobSpec>,
    ) -> optimus_core::Result<DeploymentId> {
        self.deploy_manager
            .deploy(project_id, namespace_id, desired)
            .await
    }

    /// Current status and details of a deployment
    pub async fn get_deployment(&self, id: DeploymentId) -> optimus_core::Result<Deployment> {
        self.deploy_manager.get_status(id).await
    }

    /// Recompute dependencies and resubmit compiled artifacts without spec
    /// changes; runs to completion before returning
    pub async fn refresh(
        &self,
        project_id: ProjectId,
        namespace_names: Option<&[String]>,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<Deployment> {
        let project = self.store.get_project_by_id(project_id).await?;
        self.deployer.refresh(&project, namespace_names, sink).await
    }

    /// Delete a spec. Rejected while other jobs depend on it.
    #[instrument(skip(self, sink))]
    pub async fn delete_job(
        &self,
        project_id: ProjectId,
        name: &str,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<()> {
        let job = self.store.get_job_by_name(project_id, name).await?;
        if !job.dependents.is_empty() {
            return Err(optimus_core::Error::failed_precondition(
                "unable to delete job",
                format!(
                    "job has active dependents: {}",
                    job.dependents.join(", ")
                ),
            ));
        }
        let project = self.store.get_project_by_id(project_id).await?;
        let namespace = self.store.get_namespace_by_id(job.namespace_id).await?;
        self.store.delete_job(job.id).await?;
        self.scheduler
            .remove(&project, &namespace, &job.name)
            .await?;
        sink.notify(&Event::JobRemoteDelete {
            job_name: job.name.clone(),
        });
        info!(job = %job.name, "job deleted");
        Ok(())
    }

    /// Delete helper for transports holding only an id
    pub async fn delete_job_by_id(
        &self,
        project_id: ProjectId,
        id: JobId,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<()> {
        let job = self.store.get_job_by_id(id).await?;
        self.delete_job(project_id, &job.name, sink).await
    }
}
