//! Deployer: applies one namespace's desired job set
//!
//! Validates and persists the desired specs with keep-only semantics,
//! triggers whole-project dependency resolution, assigns priority weights,
//! compiles under bounded concurrency, and submits per namespace. Per-job
//! failures are recorded and the batch continues; only store or scheduler
//! outages abort the whole deployment.

use crate::concurrency::ConcurrencyLimiter;
use crate::priority::PriorityResolver;
use crate::resolver::DependencyResolver;
use optimus_core::store::*;
use optimus_core::{
    CompiledJob, Deployment, DeploymentId, Event, JobSpec, Namespace, PluginRegistry, Project,
    ProgressSink, Scheduler, SecretItem,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Default number of jobs compiling at once inside a deployment
pub const DEFAULT_COMPILE_CONCURRENCY: usize = 8;

/// Per-job failure ledger preserving first-failure-wins order
#[derive(Debug, Default)]
struct FailureLedger {
    entries: Vec<(String, String)>,
}

impl FailureLedger {
    fn record(&mut self, job_name: &str, message: impl Into<String>) {
        if self.entries.iter().any(|(name, _)| name == job_name) {
            return;
        }
        self.entries.push((job_name.to_string(), message.into()));
    }

    fn contains(&self, job_name: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == job_name)
    }
}

/// Applies desired job sets to the store and the scheduler
pub struct Deployer {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    resolver: Arc<DependencyResolver>,
    registry: PluginRegistry,
    priority: PriorityResolver,
    compile_limiter: ConcurrencyLimiter,
}

impl Deployer {
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        resolver: Arc<DependencyResolver>,
        registry: PluginRegistry,
    ) -> Self {
        Self {
            store,
            scheduler,
            resolver,
            registry,
            priority: PriorityResolver::new(),
            compile_limiter: ConcurrencyLimiter::new(DEFAULT_COMPILE_CONCURRENCY),
        }
    }

    pub fn with_compile_concurrency(mut self, max_concurrent: usize) -> Self {
        self.compile_limiter = ConcurrencyLimiter::new(max_concurrent);
        self
    }

    /// Process one deployment to its terminal status.
    #[instrument(skip(self, desired, sink), fields(deployment = %deployment_id, namespace = %namespace.name))]
    pub async fn process(
        &self,
        deployment_id: DeploymentId,
        project: &Project,
        namespace: &Namespace,
        desired: Vec<JobSpec>,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<Deployment> {
        let mut deployment = self.store.get_deployment_by_id(deployment_id).await?;
        deployment.status = optimus_core::DeploymentStatus::InProgress;
        deployment.updated_at = chrono::Utc::now();
        self.store.update_deployment(&deployment).await?;

        let mut failed = FailureLedger::default();
        let mut succeeded: Vec<String> = Vec::new();
        let requested: Vec<String> = desired.iter().map(|j| j.name.clone()).collect();

        // wire-shape validation: window, interval, dates, known plugin
        let mut valid: Vec<JobSpec> = Vec::new();
        for job in desired {
            if let Err(e) = self.validate_spec(&job) {
                failed.record(&job.name, e.to_string());
                continue;
            }
            valid.push(job);
        }

        // keep-only persistence inside one namespace transaction
        let replacement = self
            .store
            .replace_jobs_in_namespace(project.id, namespace.id, &valid)
            .await?;
        for deleted in &replacement.deleted {
            if let Err(e) = self
                .scheduler
                .remove(project, namespace, &deleted.name)
                .await
            {
                warn!(job = %deleted.name, error = %e, "failed to remove deleted job from scheduler");
            }
            sink.notify(&Event::JobRemoteDelete {
                job_name: deleted.name.clone(),
            });
        }

        // whole-project resolution keeps cross-namespace reverse edges fresh
        let outcome = self.resolver.resolve_project(project, sink).await?;
        for failure in &outcome.failures {
            if requested.contains(&failure.job_name) {
                failed.record(&failure.job_name, failure.reason.clone());
            }
        }
        if let Some(cycle_message) = &outcome.cycle_message {
            for member in &outcome.cycle_members {
                if requested.contains(member) {
                    failed.record(member, cycle_message.clone());
                }
            }
        }

        // priority weights over the cycle-free part of the project
        let mut resolved_jobs: Vec<JobSpec> = outcome
            .jobs
            .iter()
            .filter(|j| !outcome.cycle_members.contains(&j.name))
            .cloned()
            .collect();
        if let Err(e) = self.priority.resolve(&mut resolved_jobs, sink) {
            return Err(optimus_core::Error::internal(
                "unable to assign priorities",
                e,
            ));
        }

        // compile this namespace's requested jobs under the bounded limiter
        let secrets = self.visible_secrets(project).await?;
        let deployable: Vec<JobSpec> = resolved_jobs
            .into_iter()
            .filter(|j| {
                j.namespace_id == namespace.id
                    && requested.contains(&j.name)
                    && !failed.contains(&j.name)
            })
            .collect();

        let compiled = self
            .compile_batch(project, namespace, &deployable, &secrets)
            .await;
        let mut artifacts: Vec<CompiledJob> = Vec::new();
        let mut compiled_names: Vec<String> = Vec::new();
        for (job_name, result) in compiled {
            match result {
                Ok(artifact) => {
                    artifacts.push(artifact);
                    compiled_names.push(job_name);
                }
                Err(e) => {
                    sink.notify(&Event::JobUpload {
                        job_name: job_name.clone(),
                        success: false,
                        message: Some(e.to_string()),
                    });
                    failed.record(&job_name, e.to_string());
                }
            }
        }

        // one transactional submit per namespace
        if !artifacts.is_empty() {
            match self.scheduler.submit(project, namespace, artifacts).await {
                Ok(()) => {
                    for job_name in compiled_names {
                        sink.notify(&Event::JobUpload {
                            job_name: job_name.clone(),
                            success: true,
                            message: None,
                        });
                        succeeded.push(job_name);
                    }
                }
                Err(e) => {
                    for job_name in compiled_names {
                        sink.notify(&Event::JobUpload {
                            job_name: job_name.clone(),
                            success: false,
                            message: Some(e.to_string()),
                        });
                        failed.record(&job_name, e.to_string());
                    }
                }
            }
        }

        deployment.details.success_count = succeeded.len() as i32;
        deployment.details.failures = failed
            .entries
            .into_iter()
            .map(|(job_name, message)| optimus_core::DeployFailure { job_name, message })
            .collect();
        deployment.finish();
        self.store.update_deployment(&deployment).await?;
        let status = deployment.status.to_string();
        crate::metrics::DEPLOYMENTS_FINISHED_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();
        info!(
            deployment = %deployment.id,
            status = %deployment.status,
            success = deployment.details.success_count,
            failures = deployment.details.failure_count(),
            "deployment finished"
        );
        Ok(deployment)
    }

    /// Recompute dependencies and resubmit compiled artifacts for selected
    /// namespaces without changing stored specs. A pass that ends with only
    /// dependency-resolution failures still finishes `Failed`.
    #[instrument(skip(self, sink), fields(project = %project.name))]
    pub async fn refresh(
        &self,
        project: &Project,
        namespace_filter: Option<&[String]>,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<Deployment> {
        let mut deployment = Deployment::new(project.id);
        deployment.status = optimus_core::DeploymentStatus::InProgress;
        self.store.save_deployment(&deployment).await?;

        let mut failed = FailureLedger::default();
        let mut succeeded: Vec<String> = Vec::new();

        let outcome = self.resolver.resolve_project(project, sink).await?;
        for failure in &outcome.failures {
            failed.record(&failure.job_name, failure.reason.clone());
        }
        if let Some(cycle_message) = &outcome.cycle_message {
            for member in &outcome.cycle_members {
                failed.record(member, cycle_message.clone());
            }
        }

        let mut resolved_jobs: Vec<JobSpec> = outcome
            .jobs
            .iter()
            .filter(|j| !outcome.cycle_members.contains(&j.name))
            .cloned()
            .collect();
        if let Err(e) = self.priority.resolve(&mut resolved_jobs, sink) {
            return Err(optimus_core::Error::internal(
                "unable to assign priorities",
                e,
            ));
        }

        let secrets = self.visible_secrets(project).await?;
        for namespace in self.store.namespaces_in_project(project.id).await? {
            if let Some(filter) = namespace_filter {
                if !filter.contains(&namespace.name) {
                    continue;
                }
            }
            let batch: Vec<JobSpec> = resolved_jobs
                .iter()
                .filter(|j| j.namespace_id == namespace.id && !failed.contains(&j.name))
                .cloned()
                .collect();

            let compiled = self
                .compile_batch(project, &namespace, &batch, &secrets)
                .await;
            let mut artifacts = Vec::new();
            let mut compiled_names = Vec::new();
            for (job_name, result) in compiled {
                match result {
                    Ok(artifact) => {
                        artifacts.push(artifact);
                        compiled_names.push(job_name);
                    }
                    Err(e) => failed.record(&job_name, e.to_string()),
                }
            }
            if artifacts.is_empty() {
                continue;
            }
            match self.scheduler.submit(project, &namespace, artifacts).await {
                Ok(()) => {
                    for job_name in compiled_names {
                        sink.notify(&Event::JobUpload {
                            job_name: job_name.clone(),
                            success: true,
                            message: None,
                        });
                        succeeded.push(job_name);
                    }
                }
                Err(e) => {
                    for job_name in compiled_names {
                        failed.record(&job_name, e.to_string());
                    }
                }
            }
        }

        deployment.details.success_count = succeeded.len() as i32;
        deployment.details.failures = failed
            .entries
            .into_iter()
            .map(|(job_name, message)| optimus_core::DeployFailure { job_name, message })
            .collect();
        deployment.finish();
        self.store.update_deployment(&deployment).await?;
        Ok(deployment)
    }

    /// Validate a wire-adapted spec without persisting anything
    pub fn validate_spec(&self, job: &JobSpec) -> optimus_core::Result<()> {
        job.validate()?;
        self.registry.get_by_name(&job.task.plugin_ref)?;
        let mut hook_names = HashSet::new();
        for hook in &job.hooks {
            self.registry.get_by_name(&hook.plugin_ref)?;
            if !hook_names.insert(hook.plugin_ref.as_str()) {
                return Err(optimus_core::Error::invalid_argument(
                    "unable to validate job",
                    format!("duplicate hook {} on job {}", hook.plugin_ref, job.name),
                ));
            }
        }
        Ok(())
    }

    async fn compile_batch(
        &self,
        project: &Project,
        namespace: &Namespace,
        jobs: &[JobSpec],
        secrets: &[SecretItem],
    ) -> Vec<(String, optimus_core::Result<CompiledJob>)> {
        let futures = jobs.iter().map(|job| async move {
            let _permit = self.compile_limiter.acquire().await;
            let result = self
                .scheduler
                .compile(project, namespace, job, secrets)
                .await;
            (job.name.clone(), result)
        });
        futures::future::join_all(futures).await
    }

    async fn visible_secrets(&self, project: &Project) -> optimus_core::Result<Vec<SecretItem>> {
        Ok(self
            .store
            .secrets_in_project(project.id)
            .await?
            .into_iter()
            .map(|s| SecretItem {
                name: s.name,
                value: s.value,
            })
            .collect())
    }
}
