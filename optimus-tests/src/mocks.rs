//! Mock collaborators
//!
//! A scriptable scheduler that records every interaction and can be told
//! to fail compiles, submits or clears, gate clears behind a semaphore (to
//! keep workers deterministically busy), and report arbitrary run states.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimus_core::{
    CompiledJob, JobRunStatus, JobSpec, Namespace, Project, RunState, Scheduler, SecretItem,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Scriptable in-memory scheduler
#[derive(Default)]
pub struct MockScheduler {
    submitted: Mutex<Vec<(String, Vec<CompiledJob>)>>,
    cleared: Mutex<Vec<(String, Vec<DateTime<Utc>>)>>,
    removed: Mutex<Vec<String>>,
    fail_compile_for: Mutex<HashSet<String>>,
    fail_submit_for: Mutex<HashSet<String>>,
    fail_clear_for: Mutex<HashSet<String>>,
    run_states: Mutex<HashMap<(String, DateTime<Utc>), RunState>>,
    clear_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts submitted so far as `(namespace, batch)` pairs
    pub fn submitted(&self) -> Vec<(String, Vec<CompiledJob>)> {
        self.submitted.lock().clone()
    }

    /// Runs cleared so far as `(job, runs)` pairs, in call order
    pub fn cleared(&self) -> Vec<(String, Vec<DateTime<Utc>>)> {
        self.cleared.lock().clone()
    }

    /// Jobs removed from the scheduler so far
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().clone()
    }

    /// Make compilation fail for one job
    pub fn fail_compile(&self, job_name: &str) {
        self.fail_compile_for.lock().insert(job_name.to_string());
    }

    /// Make submission fail for one namespace
    pub fn fail_submit(&self, namespace_name: &str) {
        self.fail_submit_for.lock().insert(namespace_name.to_string());
    }

    /// Make clearing fail for one job
    pub fn fail_clear(&self, job_name: &str) {
        self.fail_clear_for.lock().insert(job_name.to_string());
    }

    /// Gate every `clear_runs` call behind the returned semaphore; workers
    /// stay busy until permits are added
    pub fn hold_clears(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.clear_gate.lock() = Some(gate.clone());
        gate
    }

    /// Report a specific state for one `(job, run)` pair; unknown pairs
    /// default to `Success`
    pub fn set_run_state(&self, job_name: &str, run: DateTime<Utc>, state: RunState) {
        self.run_states
            .lock()
            .insert((job_name.to_string(), run), state);
    }
}

#[async_trait]
impl Scheduler for MockScheduler {
    fn name(&self) -> &str {
        "mock"
    }

    async fn compile(
        &self,
        project: &Project,
        _namespace: &Namespace,
        job: &JobSpec,
        _secrets: &[SecretItem],
    ) -> optimus_core::Result<CompiledJob> {
        if self.fail_compile_for.lock().contains(&job.name) {
            return Err(optimus_core::Error::internal(
                "unable to compile job",
                format!("scripted compile failure for {}", job.name),
            ));
        }
        Ok(CompiledJob {
            job_name: job.name.clone(),
            file_name: format!("{}__{}.json", project.name, job.name),
            contents: serde_json::json!({
                "job": job.name,
                "priority_weight": job.task.priority,
            })
            .to_string(),
        })
    }

    async fn submit(
        &self,
        _project: &Project,
        namespace: &Namespace,
        artifacts: Vec<CompiledJob>,
    ) -> optimus_core::Result<()> {
        if self.fail_submit_for.lock().contains(&namespace.name) {
            return Err(optimus_core::Error::unavailable(
                "unable to submit jobs",
                format!("scripted submit failure for {}", namespace.name),
            ));
        }
        self.submitted.lock().push((namespace.name.clone(), artifacts));
        Ok(())
    }

    async fn remove(
        &self,
        _project: &Project,
        _namespace: &Namespace,
        job_name: &str,
    ) -> optimus_core::Result<()> {
        self.removed.lock().push(job_name.to_string());
        Ok(())
    }

    async fn clear_runs(
        &self,
        _project: &Project,
        job_name: &str,
        runs: &[DateTime<Utc>],
    ) -> optimus_core::Result<()> {
        let gate = self.clear_gate.lock().clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| optimus_core::Error::internal("mock scheduler", "gate closed"))?;
            permit.forget();
        }
        if self.fail_clear_for.lock().contains(job_name) {
            return Err(optimus_core::Error::unavailable(
                "unable to clear runs",
                format!("scripted clear failure for {}", job_name),
            ));
        }
        self.cleared
            .lock()
            .push((job_name.to_string(), runs.to_vec()));
        Ok(())
    }

    async fn run_status(
        &self,
        _project: &Project,
        job_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batch_size: usize,
    ) -> optimus_core::Result<Vec<JobRunStatus>> {
        let states = self.run_states.lock();
        let mut out: Vec<JobRunStatus> = states
            .iter()
            .filter(|((name, run), _)| name == job_name && *run >= start && *run <= end)
            .map(|((_, run), state)| JobRunStatus {
                scheduled_at: *run,
                state: *state,
            })
            .collect();
        // pairs never scripted read as succeeded reruns
        if out.is_empty() {
            for (name, runs) in self.cleared.lock().iter() {
                if name == job_name {
                    for run in runs {
                        if *run >= start && *run <= end {
                            out.push(JobRunStatus {
                                scheduled_at: *run,
                                state: RunState::Success,
                            });
                        }
                    }
                }
            }
        }
        out.sort_by_key(|s| s.scheduled_at);
        out.truncate(batch_size);
        Ok(out)
    }
}
