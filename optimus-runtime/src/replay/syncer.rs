//! Replay syncer
//!
//! Periodic reconciliation of non-terminal replays against the scheduler:
//! replays whose cleared runs all succeeded latch `Success`, a failed run
//! latches `Failed`, and anything running longer than the configured
//! timeout is failed as a long-running replay.

use chrono::Duration as ChronoDuration;
use optimus_core::store::*;
use optimus_core::{
    Clock, Project, ReplayMessage, ReplaySpec, ReplayStatus, RunState, Scheduler,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Failure message used when a replay outlives the run timeout
pub const REPLAY_RUN_TIMEOUT: &str = "long running replay timeout";

/// Run instances fetched per status batch
const SCHEDULER_BATCH_SIZE: usize = 100;

/// Reconciles in-flight replay records with scheduler run state
pub struct ReplaySyncer {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
}

impl ReplaySyncer {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            scheduler,
            clock,
        }
    }

    /// One reconciliation pass over every in-flight replay.
    #[instrument(skip(self))]
    pub async fn sync(&self, run_timeout: Duration) -> optimus_core::Result<()> {
        let replays = self
            .store
            .replays_by_statuses(&[
                ReplayStatus::Created,
                ReplayStatus::InProgress,
                ReplayStatus::Replayed,
            ])
            .await?;
        for replay in replays {
            let project = match self.project_of(&replay).await {
                Ok(project) => project,
                Err(e) => {
                    warn!(replay = %replay.id, error = %e, "unable to locate replay project");
                    continue;
                }
            };
            if let Err(e) = self.sync_one(&project, &replay, run_timeout).await {
                warn!(replay = %replay.id, error = %e, "replay sync failed");
            }
        }
        crate::metrics::REPLAYS_SYNCED_TOTAL.inc();
        Ok(())
    }

    async fn project_of(&self, replay: &ReplaySpec) -> optimus_core::Result<Project> {
        let job = self.store.get_job_by_id(replay.job_id).await?;
        let namespace = self.store.get_namespace_by_id(job.namespace_id).await?;
        self.store.get_project_by_id(namespace.project_id).await
    }

    async fn sync_one(
        &self,
        project: &Project,
        replay: &ReplaySpec,
        run_timeout: Duration,
    ) -> optimus_core::Result<()> {
        // only replays whose runs were already cleared can complete here;
        // queued or mid-clear replays are subject to the timeout alone
        if replay.status == ReplayStatus::Replayed {
            match self.observe_runs(project, replay).await? {
                Observation::AllSucceeded => {
                    info!(replay = %replay.id, "all replayed instances succeeded");
                    self.store
                        .update_replay_status(
                            replay.id,
                            ReplayStatus::Success,
                            Some(ReplayMessage {
                                kind: ReplayStatus::Success.to_string(),
                                message: super::worker::REPLAY_MESSAGE_SUCCESS.to_string(),
                            }),
                        )
                        .await?;
                    return Ok(());
                }
                Observation::SomeFailed => {
                    self.store
                        .update_replay_status(
                            replay.id,
                            ReplayStatus::Failed,
                            Some(ReplayMessage {
                                kind: ReplayStatus::Failed.to_string(),
                                message: super::worker::REPLAY_MESSAGE_FAILED.to_string(),
                            }),
                        )
                        .await?;
                    return Ok(());
                }
                Observation::StillRunning => {}
            }
        }

        let age = self.clock.now() - replay.created_at;
        if age > ChronoDuration::from_std(run_timeout).unwrap_or(ChronoDuration::MAX) {
            warn!(replay = %replay.id, "replay exceeded run timeout");
            self.store
                .update_replay_status(
                    replay.id,
                    ReplayStatus::Failed,
                    Some(ReplayMessage {
                        kind: ReplayStatus::Failed.to_string(),
                        message: REPLAY_RUN_TIMEOUT.to_string(),
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn observe_runs(
        &self,
        project: &Project,
        replay: &ReplaySpec,
    ) -> optimus_core::Result<Observation> {
        let batch_end = replay.end_date + ChronoDuration::days(1) - ChronoDuration::seconds(1);
        let mut all_succeeded = true;
        for (job_name, claimed) in &replay.claimed_runs {
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
            for run in claimed {
                match statuses.iter().find(|s| s.scheduled_at == *run) {
                    Some(status) if status.state == RunState::Failed => {
                        return Ok(Observation::SomeFailed)
                    }
                    Some(status) if status.state == RunState::Success => {}
                    _ => all_succeeded = false,
                }
            }
        }
        if all_succeeded {
            Ok(Observation::AllSucceeded)
        } else {
            Ok(Observation::StillRunning)
        }
    }
}

enum Observation {
    AllSucceeded,
    SomeFailed,
    StillRunning,
}
