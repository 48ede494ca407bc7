//! Job deployment engine
//!
//! The manager accepts desired-state submissions, deduplicates queued
//! deployments per project, and hands work to deploy workers over a bounded
//! queue. The caller gets a deployment id immediately; progress and the
//! terminal status live in the operation store.

mod deployer;

pub use deployer::{Deployer, DEFAULT_COMPILE_CONCURRENCY};

use crate::ERR_REQUEST_QUEUE_FULL;
use optimus_core::store::*;
use optimus_core::{
    Deployment, DeploymentId, DeploymentStatus, JobSpec, NamespaceId, ProgressSink, ProjectId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Configuration for the deploy manager
#[derive(Debug, Clone)]
pub struct DeployManagerConfig {
    /// Number of deploy workers
    pub num_workers: usize,
    /// Queued deployments beyond the in-flight ones
    pub queue_capacity: usize,
    /// Hard deadline for one deployment
    pub worker_timeout: Duration,
}

impl Default for DeployManagerConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            queue_capacity: 10,
            worker_timeout: Duration::from_secs(30 * 60),
        }
    }
}

struct DeployRequest {
    deployment_id: DeploymentId,
    project_id: ProjectId,
    namespace_id: NamespaceId,
    desired: Vec<JobSpec>,
}

/// Accepts deployments and runs them asynchronously
pub struct DeployManager {
    store: Arc<dyn Store>,
    config: DeployManagerConfig,
    sender: mpsc::Sender<DeployRequest>,
}

impl DeployManager {
    /// Create the manager and spawn its workers
    pub fn new(
        store: Arc<dyn Store>,
        deployer: Arc<Deployer>,
        sink: Arc<dyn ProgressSink>,
        config: DeployManagerConfig,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<DeployRequest>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..config.num_workers.max(1) {
            let receiver = receiver.clone();
            let deployer = deployer.clone();
            let store = store.clone();
            let sink = sink.clone();
            let timeout = config.worker_timeout;
            tokio::spawn(async move {
                loop {
                    let request = { receiver.lock().await.recv().await };
                    let Some(request) = request else { break };
                    info!(worker = worker_id, deployment = %request.deployment_id, "deploy worker picked up request");
                    Self::run_one(&store, &deployer, sink.as_ref(), request, timeout).await;
                }
            });
        }

        Arc::new(Self {
            store,
            config,
            sender,
        })
    }

    /// Accept a desired-state submission and return its deployment id.
    /// A project with a deployment still waiting in the queue gets the
    /// queued deployment's id back instead of a second entry.
    #[instrument(skip(self, desired), fields(project = %project_id, jobs = desired.len()))]
    pub async fn deploy(
        &self,
        project_id: ProjectId,
        namespace_id: NamespaceId,
        desired: Vec<JobSpec>,
    ) -> optimus_core::Result<DeploymentId> {
        if let Some(existing) = self
            .store
            .get_deployment_by_status_and_project(DeploymentStatus::Pending, project_id)
            .await?
        {
            info!(deployment = %existing.id, "returning queued deployment for project");
            return Ok(existing.id);
        }

        let deployment = Deployment::new(project_id);
        self.store.save_deployment(&deployment).await?;

        let request = DeployRequest {
            deployment_id: deployment.id,
            project_id,
            namespace_id,
            desired,
        };
        if self.sender.try_send(request).is_err() {
            let mut failed = self.store.get_deployment_by_id(deployment.id).await?;
            failed.record_failure("", format!("{}: request queue is full", ERR_REQUEST_QUEUE_FULL));
            failed.finish();
            self.store.update_deployment(&failed).await?;
            return Err(optimus_core::Error::unavailable(
                "unable to accept deployment",
                format!("{}: request queue is full", ERR_REQUEST_QUEUE_FULL),
            ));
        }
        Ok(deployment.id)
    }

    /// Current status and details of a deployment
    pub async fn get_status(&self, id: DeploymentId) -> optimus_core::Result<Deployment> {
        self.store.get_deployment_by_id(id).await
    }

    /// Poll until the deployment reaches a terminal status
    pub async fn wait_for(
        &self,
        id: DeploymentId,
        timeout: Duration,
    ) -> optimus_core::Result<Deployment> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let deployment = self.store.get_deployment_by_id(id).await?;
            if deployment.status.is_terminal() {
                return Ok(deployment);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(optimus_core::Error::unavailable(
                    "unable to wait for deployment",
                    format!("deployment {} still {}", id, deployment.status),
                ));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// The configured queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    async fn run_one(
        store: &Arc<dyn Store>,
        deployer: &Deployer,
        sink: &dyn ProgressSink,
        request: DeployRequest,
        timeout: Duration,
    ) {
        let deployment_id = request.deployment_id;
        let result = tokio::time::timeout(timeout, async {
            let project = store.get_project_by_id(request.project_id).await?;
            let namespace = store.get_namespace_by_id(request.namespace_id).await?;
            deployer
                .process(deployment_id, &project, &namespace, request.desired, sink)
                .await
        })
        .await;

        let failure_message = match result {
            Ok(Ok(_)) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "context cancelled".to_string(),
        };
        error!(deployment = %deployment_id, error = %failure_message, "deployment aborted");
        if let Ok(mut deployment) = store.get_deployment_by_id(deployment_id).await {
            if !deployment.status.is_terminal() {
                deployment.record_failure("", failure_message);
                deployment.finish();
                if let Err(e) = store.update_deployment(&deployment).await {
                    error!(deployment = %deployment_id, error = %e, "failed to record aborted deployment");
                }
            }
        }
    }
}
