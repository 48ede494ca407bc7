//! Replay worker
//!
//! Consumes accepted replay requests: walks the execution tree in BFS
//! order, clears scheduler state per node, and latches the terminal status.
//! Per-node failures are collected into the terminal message; the walk
//! continues past them.

use optimus_core::store::*;
use optimus_core::{Project, ReplayId, ReplayMessage, ReplayStatus, Scheduler};
use optimus_lineage::TreeNode;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Message attached when every node cleared and re-ran successfully
pub const REPLAY_MESSAGE_SUCCESS: &str = "all instances for this replay are successfully run";

/// Message kind used for per-node failure maps
pub const REPLAY_MESSAGE_FAILED: &str = "instance run failure found";

/// Processes one replay request end to end
pub struct ReplayWorker {
    store: Arc<dyn Store>,
    scheduler: Arc<dyn Scheduler>,
}

impl ReplayWorker {
    pub fn new(store: Arc<dyn Store>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { store, scheduler }
    }

    /// Clear every node's runs and latch the terminal status.
    #[instrument(skip(self, tree), fields(replay = %replay_id, project = %project.name))]
    pub async fn process(
        &self,
        project: &Project,
        replay_id: ReplayId,
        tree: &TreeNode,
    ) -> optimus_core::Result<()> {
        self.store
            .update_replay_status(replay_id, ReplayStatus::InProgress, None)
            .await?;

        let mut node_failures: Vec<(String, String)> = Vec::new();
        for node in tree.walk_bfs() {
            let runs: Vec<_> = node.runs.iter().map(|r| r.scheduled_at).collect();
            if runs.is_empty() {
                continue;
            }
            match self
                .scheduler
                .clear_runs(project, node.name(), &runs)
                .await
            {
                Ok(()) => {
                    info!(job = %node.name(), runs = runs.len(), "cleared scheduler runs");
                }
                Err(e) => {
                    warn!(job = %node.name(), error = %e, "failed to clear scheduler runs");
                    node_failures.push((node.name().to_string(), e.to_string()));
                }
            }
        }

        if node_failures.is_empty() {
            self.store
                .update_replay_status(replay_id, ReplayStatus::Replayed, None)
                .await?;
            self.store
                .update_replay_status(
                    replay_id,
                    ReplayStatus::Success,
                    Some(ReplayMessage {
                        kind: ReplayStatus::Success.to_string(),
                        message: REPLAY_MESSAGE_SUCCESS.to_string(),
                    }),
                )
                .await?;
        } else {
            let causes: Vec<String> = node_failures
                .iter()
                .map(|(job, cause)| format!("{}: {}", job, cause))
                .collect();
            self.store
                .update_replay_status(
                    replay_id,
                    ReplayStatus::Failed,
                    Some(ReplayMessage {
                        kind: REPLAY_MESSAGE_FAILED.to_string(),
                        message: causes.join("; "),
                    }),
                )
                .await?;
        }
        Ok(())
    }
}
