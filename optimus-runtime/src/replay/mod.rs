//! Replay engine
//!
//! Offers an asynchronous interface over a bounded request queue: accepted
//! replays are validated against in-flight conflicts under a project lock,
//! persisted `Created`, and handed to a fixed pool of workers. Status
//! queries rebuild the execution tree and annotate runs from the scheduler
//! at query time.

mod plan;
mod syncer;
mod validator;
mod worker;

pub use plan::{claimed_runs, ReplayPlan, ReplayPlanner};
pub use syncer::{ReplaySyncer, REPLAY_RUN_TIMEOUT};
pub use validator::ReplayValidator;
pub use worker::{ReplayWorker, REPLAY_MESSAGE_FAILED, REPLAY_MESSAGE_SUCCESS};

use crate::ERR_REQUEST_QUEUE_FULL;
use chrono::Duration as ChronoDuration;
use optimus_core::store::*;
use optimus_core::{
    Clock, JobSpec, NamespaceId, Project, ProjectId, ReplayId, ReplayMessage, ReplayRequest,
    ReplaySpec, ReplayStatus, RunState, Scheduler,
};
use optimus_lineage::{Run, TreeNode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, instrument};

/// Run instances fetched per status batch
const SCHEDULER_BATCH_SIZE: usize = 100;

/// Only replays younger than this window are listed
const REPLAY_LIST_WINDOW_DAYS: i64 = 90;

/// Configuration for the replay manager
#[derive(Debug, Clone)]
pub struct ReplayManagerConfig {
    /// Number of replay workers
    pub num_workers: usize,
    /// Capacity of the request FIFO
    pub queue_capacity: usize,
    /// Hard deadline for processing one replay
    pub worker_timeout: Duration,
    /// How long a replay may run before the syncer fails it
    pub run_timeout: Duration,
}

impl Default for ReplayManagerConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            queue_capacity: 100,
            worker_timeout: Duration::from_secs(10 * 60),
            run_timeout: Duration::from_secs(3 * 60 * 60),
        }
    }
}

/// Outcome of an accepted replay request
#[derive(Debug, Clone)]
pub struct ReplayAccepted {
    pub id: ReplayId,
    /// Downstream jobs excluded by the namespace allow-list
    pub ignored_jobs: Vec<String>,
}

/// Current state of a replay for status endpoints
#[derive(Debug, Clone)]
pub struct ReplayState {
    pub status: ReplayStatus,
    pub message: Option<ReplayMessage>,
    /// Execution tree with runs annotated from the scheduler at query time
    pub tree: TreeNode,
}

struct ReplayWork {
    replay_id: ReplayId,
    project: Project,
    tree: TreeNode,
}

/// Manager for replay operations: accept, dry-run, status, listing
pub struct ReplayManager {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    config: ReplayManagerConfig,
    validator: ReplayValidator,
    sender: mpsc::Sender<ReplayWork>,
    // per-project advisory locks so two acceptors cannot both pass the
    // conflict check
    project_locks: parking_lot::Mutex<HashMap<ProjectId, Arc<Mutex<()>>>>,
}

impl ReplayManager {
    /// Create the manager and spawn its worker pool
    pub fn new(
        store: Arc<dyn Store>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        config: ReplayManagerConfig,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<ReplayWork>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..config.num_workers.max(1) {
            let receiver = receiver.clone();
            let worker = ReplayWorker::new(store.clone(), scheduler.clone());
            let store = store.clone();
            let timeout = config.worker_timeout;
            tokio::spawn(async move {
                loop {
                    let work = { receiver.lock().await.recv().await };
                    let Some(work) = work else { break };
                    info!(worker = worker_id, replay = %work.replay_id, "worker picked up the request");
                    crate::metrics::REPLAY_WORKERS_BUSY.inc();
                    let result = tokio::time::timeout(
                        timeout,
                        worker.process(&work.project, work.replay_id, &work.tree),
                    )
                    .await;
                    crate::metrics::REPLAY_WORKERS_BUSY.dec();

                    let failure = match result {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e.to_string()),
                        Err(_) => Some("worker timeout".to_string()),
                    };
                    if let Some(message) = failure {
                        error!(replay = %work.replay_id, error = %message, "worker failed to process");
                        // best effort: the record may already be terminal
                        let _ = store
                            .update_replay_status(
                                work.replay_id,
                                ReplayStatus::Failed,
                                Some(ReplayMessage {
                                    kind: ReplayStatus::Failed.to_string(),
                                    message,
                                }),
                            )
                            .await;
                    }
                }
            });
        }

        Arc::new(Self {
            store,
            scheduler,
            clock,
            config,
            validator: ReplayValidator::new(),
            sender,
            project_locks: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Plan a replay without persisting or queueing anything
    pub async fn dry_run(&self, request: &ReplayRequest) -> optimus_core::Result<ReplayPlan> {
        let (jobs, namespace_names) = self.project_view(request.project_id).await?;
        let planner = ReplayPlanner::new(&jobs, &namespace_names);
        planner.build(request, self.clock.now())
    }

    /// Accept a replay: plan, conflict-check, persist `Created`, enqueue.
    #[instrument(skip(self), fields(project = %request.project_id, job = %request.job_name))]
    pub async fn accept(&self, request: &ReplayRequest) -> optimus_core::Result<ReplayAccepted> {
        let project = self.store.get_project_by_id(request.project_id).await?;
        let (jobs, namespace_names) = self.project_view(request.project_id).await?;
        let root_job = jobs
            .iter()
            .find(|j| j.name == request.job_name)
            .cloned()
            .ok_or_else(|| {
                optimus_core::Error::not_found("unable to accept replay", &request.job_name)
            })?;

        let planner = ReplayPlanner::new(&jobs, &namespace_names);
        let plan = planner.build(request, self.clock.now())?;

        // acceptance and conflict check are serialized per project
        let lock = self.project_lock(request.project_id);
        let _guard = lock.lock().await;

        let in_flight = self
            .store
            .replays_by_statuses(&[ReplayStatus::Created, ReplayStatus::InProgress])
            .await?;
        self.validator
            .validate(&in_flight, &plan.claimed_runs(), request.force)?;

        let replay = ReplaySpec {
            id: ReplayId::new(),
            job_id: root_job.id,
            job_name: root_job.name.clone(),
            start_date: request.start,
            end_date: request.end,
            status: ReplayStatus::Created,
            config: request.replay_config(),
            message: None,
            claimed_runs: plan.claimed_runs(),
            created_at: self.clock.now(),
        };
        self.store.save_replay(&replay).await?;

        let work = ReplayWork {
            replay_id: replay.id,
            project,
            tree: plan.execution_tree.clone(),
        };
        if self.sender.try_send(work).is_err() {
            crate::metrics::REPLAY_QUEUE_FULL_TOTAL.inc();
            self.store
                .update_replay_status(
                    replay.id,
                    ReplayStatus::Failed,
                    Some(ReplayMessage {
                        kind: ReplayStatus::Failed.to_string(),
                        message: format!("{}: request queue is full", ERR_REQUEST_QUEUE_FULL),
                    }),
                )
                .await?;
            return Err(optimus_core::Error::unavailable(
                "unable to accept replay",
                format!("{}: request queue is full", ERR_REQUEST_QUEUE_FULL),
            ));
        }
        crate::metrics::REPLAYS_ACCEPTED_TOTAL.inc();

        Ok(ReplayAccepted {
            id: replay.id,
            ignored_jobs: plan.ignored_jobs,
        })
    }

    /// Current status with the tree annotated from the scheduler
    pub async fn status(&self, replay_id: ReplayId) -> optimus_core::Result<ReplayState> {
        let replay = self.store.get_replay_by_id(replay_id).await?;
        let job = self.store.get_job_by_id(replay.job_id).await?;
        let namespace = self.store.get_namespace_by_id(job.namespace_id).await?;
        let project = self.store.get_project_by_id(namespace.project_id).await?;
        let jobs = self.store.jobs_in_project(project.id).await?;

        let mut tree = rebuild_tree(&replay, &job, &jobs);
        self.annotate_runs(&project, &replay, &mut tree).await?;
        Ok(ReplayState {
            status: replay.status,
            message: replay.message.clone(),
            tree,
        })
    }

    /// Replays for a project, newest first, limited to the recent window
    pub async fn list(&self, project_id: ProjectId) -> optimus_core::Result<Vec<ReplaySpec>> {
        let cutoff = self.clock.now() - ChronoDuration::days(REPLAY_LIST_WINDOW_DAYS);
        Ok(self
            .store
            .replays_in_project(project_id)
            .await?
            .into_iter()
            .filter(|r| r.created_at > cutoff)
            .collect())
    }

    /// Build the syncer sharing this manager's collaborators
    pub fn syncer(&self) -> ReplaySyncer {
        ReplaySyncer::new(self.store.clone(), self.scheduler.clone(), self.clock.clone())
    }

    /// The configured run timeout, for syncer schedules
    pub fn run_timeout(&self) -> Duration {
        self.config.run_timeout
    }

    async fn project_view(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<(Vec<JobSpec>, HashMap<NamespaceId, String>)> {
        let jobs = self.store.jobs_in_project(project_id).await?;
        let namespace_names = self
            .store
            .namespaces_in_project(project_id)
            .await?
            .into_iter()
            .map(|n| (n.id, n.name))
            .collect();
        Ok((jobs, namespace_names))
    }

    fn project_lock(&self, project_id: ProjectId) -> Arc<Mutex<()>> {
        self.project_locks
            .lock()
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn annotate_runs(
        &self,
        project: &Project,
        replay: &ReplaySpec,
        tree: &mut TreeNode,
    ) -> optimus_core::Result<()> {
        let batch_end =
            replay.end_date + ChronoDuration::days(1) - ChronoDuration::seconds(1);
        let mut states: HashMap<String, Vec<optimus_core::JobRunStatus>> = HashMap::new();
        for job_name in replay.claimed_runs.keys() {
            let statuses = self
                .scheduler
                .run_status(
                    project,
                    job_name,
                    replay.start_date,
                    batch_end,
                    SCHEDULER_BATCH_SIZE,
                )
                .await?;
            states.insert(job_name.clone(), statuses);
        }

        tree.visit_bfs_mut(|node| {
            let Some(statuses) = states.get(node.name()) else {
                return;
            };
            let annotated: Vec<Run> = node
                .runs
                .iter()
                .map(|run| {
                    let state: Option<RunState> = statuses
                        .iter()
                        .find(|s| s.scheduled_at == run.scheduled_at)
                        .map(|s| s.state);
                    Run {
                        scheduled_at: run.scheduled_at,
                        state,
                    }
                })
                .collect();
            node.runs = annotated.into_iter().collect();
        });
        Ok(())
    }
}

/// Rebuild the execution tree of a persisted replay from current specs,
/// restricted to the jobs the replay claimed.
fn rebuild_tree(replay: &ReplaySpec, root_job: &JobSpec, jobs: &[JobSpec]) -> TreeNode {
    let jobs_by_name: HashMap<&str, &JobSpec> =
        jobs.iter().map(|j| (j.name.as_str(), j)).collect();

    fn build(
        job: &JobSpec,
        replay: &ReplaySpec,
        jobs_by_name: &HashMap<&str, &JobSpec>,
        path: &mut std::collections::HashSet<String>,
    ) -> TreeNode {
        let mut node = TreeNode::new(job.clone());
        if let Some(runs) = replay.claimed_runs.get(&job.name) {
            for run in runs {
                node.add_run(Run::at(*run));
            }
        }
        path.insert(job.name.clone());
        for dependent_name in &job.dependents {
            if path.contains(dependent_name)
                || !replay.claimed_runs.contains_key(dependent_name)
            {
                continue;
            }
            if let Some(dependent) = jobs_by_name.get(dependent_name.as_str()) {
                node.add_dependent(build(dependent, replay, jobs_by_name, path));
            }
        }
        path.remove(&job.name);
        node
    }

    let mut path = std::collections::HashSet::new();
    build(root_job, replay, &jobs_by_name, &mut path)
}
