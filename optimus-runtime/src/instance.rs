//! Run-instance context
//!
//! The external scheduler calls back at execution time to fetch the
//! compiled context for one scheduled run: the `[dstart, dend)` window the
//! task reads, its ordered config, and its asset files.

use chrono::{DateTime, Utc};
use optimus_core::store::*;
use optimus_core::ProjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Context handed to a task instance at execution time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceContext {
    pub job_name: String,
    /// The scheduled instant driving the window
    pub scheduled_at: DateTime<Utc>,
    /// Window start, inclusive
    pub dstart: DateTime<Utc>,
    /// Window end, exclusive
    pub dend: DateTime<Utc>,
    /// Ordered task config as authored
    pub config: Vec<(String, String)>,
    /// Asset files shipped with the job
    pub assets: HashMap<String, String>,
}

/// Serves execution-time context to the scheduler callback
pub struct InstanceService {
    store: Arc<dyn Store>,
}

impl InstanceService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve the context for one `(job, scheduled_at)` instance
    #[instrument(skip(self), fields(job = %job_name))]
    pub async fn register_instance(
        &self,
        project_id: ProjectId,
        job_name: &str,
        scheduled_at: DateTime<Utc>,
    ) -> optimus_core::Result<InstanceContext> {
        let job = self.store.get_job_by_name(project_id, job_name).await?;
        let (dstart, dend) = job.task.window.range(scheduled_at)?;
        Ok(InstanceContext {
            job_name: job.name.clone(),
            scheduled_at,
            dstart,
            dend,
            config: job.task.config.clone(),
            assets: job.assets.clone(),
        })
    }

    /// The window range alone, for `GetWindow` lookups
    pub async fn get_window(
        &self,
        project_id: ProjectId,
        job_name: &str,
        scheduled_at: DateTime<Utc>,
    ) -> optimus_core::Result<(DateTime<Utc>, DateTime<Utc>)> {
        let job = self.store.get_job_by_name(project_id, job_name).await?;
        job.task.window.range(scheduled_at)
    }
}
