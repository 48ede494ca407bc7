//! Airflow scheduler shim
//!
//! Compiles job specs into runtime artifacts and drives the scheduler's
//! HTTP surface: batch submission per namespace, artifact removal, clearing
//! historical runs for replay, and run-state queries. The scheduler host
//! comes from the project config (`SCHEDULER_HOST`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimus_core::tenant::config_keys;
use optimus_core::{
    CompiledJob, JobRunStatus, JobSpec, Namespace, Project, RunState, Scheduler, SecretItem,
};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Configuration for the Airflow shim
#[derive(Debug, Clone)]
pub struct AirflowSchedulerConfig {
    /// Request timeout against the scheduler API
    pub request_timeout: std::time::Duration,
}

impl Default for AirflowSchedulerConfig {
    fn default() -> Self {
        Self {
            request_timeout: std::time::Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DagRunsResponse {
    dag_runs: Vec<DagRunEntry>,
}

#[derive(Debug, Deserialize)]
struct DagRunEntry {
    execution_date: DateTime<Utc>,
    state: String,
}

/// Scheduler adapter speaking the Airflow-class HTTP API
pub struct AirflowScheduler {
    client: reqwest::Client,
}

impl AirflowScheduler {
    pub fn new(config: AirflowSchedulerConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .expect("reqwest client construction"),
        }
    }

    fn host(&self, project: &Project) -> optimus_core::Result<String> {
        project
            .get_config(config_keys::SCHEDULER_HOST)
            .map(|h| h.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                optimus_core::Error::invalid_argument(
                    "unable to reach scheduler",
                    format!("project {} has no SCHEDULER_HOST configured", project.name),
                )
            })
    }

    fn dag_id(project: &Project, job_name: &str) -> String {
        format!("{}__{}", project.name, job_name)
    }

    fn parse_state(state: &str) -> RunState {
        match state {
            "success" => RunState::Success,
            "failed" => RunState::Failed,
            "running" => RunState::Running,
            _ => RunState::Pending,
        }
    }
}

impl Default for AirflowScheduler {
    fn default() -> Self {
        Self::new(AirflowSchedulerConfig::default())
    }
}

#[async_trait]
impl Scheduler for AirflowScheduler {
    fn name(&self) -> &str {
        "airflow"
    }

    /// Render the runtime artifact the scheduler-side agent materializes
    /// into a DAG. Secrets are referenced by name, never inlined.
    async fn compile(
        &self,
        project: &Project,
        namespace: &Namespace,
        job: &JobSpec,
        secrets: &[SecretItem],
    ) -> optimus_core::Result<CompiledJob> {
        job.validate()?;
        let secret_names: Vec<&str> = secrets.iter().map(|s| s.name.as_str()).collect();
        let contents = serde_json::json!({
            "dag_id": Self::dag_id(project, &job.name),
            "project": project.name,
            "namespace": namespace.name,
            "owner": job.owner,
            "schedule_interval": job.schedule.interval,
            "start_date": job.schedule.start_date.format("%Y-%m-%d").to_string(),
            "end_date": job.schedule.end_date.map(|d| d.format("%Y-%m-%d").to_string()),
            "catchup": job.behavior.catch_up,
            "depends_on_past": job.behavior.depends_on_past,
            "retries": job.behavior.retry.count,
            "retry_delay_secs": job.behavior.retry.delay_secs,
            "priority_weight": job.task.priority,
            "pool": job.metadata.airflow.pool,
            "queue": job.metadata.airflow.queue,
            "task": {
                "name": job.task.plugin_ref,
                "config": job.task.config,
                "window": {
                    "size": job.task.window.size,
                    "offset": job.task.window.offset,
                    "truncate_to": job.task.window.truncate_to,
                },
            },
            "hooks": job.hooks.iter().map(|h| &h.plugin_ref).collect::<Vec<_>>(),
            "upstream_jobs": job.dependencies.keys().collect::<Vec<_>>(),
            "http_sensors": job.external_dependencies.http,
            "assets": job.assets.keys().collect::<Vec<_>>(),
            "secret_names": secret_names,
        });
        let contents = serde_json::to_string_pretty(&contents)
            .map_err(|e| optimus_core::Error::internal("unable to compile job", e))?;
        debug!(job = %job.name, bytes = contents.len(), "compiled job artifact");
        Ok(CompiledJob {
            job_name: job.name.clone(),
            file_name: format!("{}.json", Self::dag_id(project, &job.name)),
            contents,
        })
    }

    #[instrument(skip(self, artifacts), fields(namespace = %namespace.name, count = artifacts.len()))]
    async fn submit(
        &self,
        project: &Project,
        namespace: &Namespace,
        artifacts: Vec<CompiledJob>,
    ) -> optimus_core::Result<()> {
        let host = self.host(project)?;
        let body = serde_json::json!({
            "project": project.name,
            "namespace": namespace.name,
            "dags": artifacts,
        });
        let response = self
            .client
            .put(format!("{}/api/v1/dags", host))
            .json(&body)
            .send()
            .await
            .map_err(|e| optimus_core::Error::unavailable("unable to reach scheduler", e))?;
        if !response.status().is_success() {
            return Err(optimus_core::Error::unavailable(
                "unable to submit jobs",
                format!("scheduler returned {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn remove(
        &self,
        project: &Project,
        _namespace: &Namespace,
        job_name: &str,
    ) -> optimus_core::Result<()> {
        let host = self.host(project)?;
        let response = self
            .client
            .delete(format!(
                "{}/api/v1/dags/{}",
                host,
                Self::dag_id(project, job_name)
            ))
            .send()
            .await
            .map_err(|e| optimus_core::Error::unavailable("unable to reach scheduler", e))?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(optimus_core::Error::unavailable(
                "unable to remove job",
                format!("scheduler returned {}", response.status()),
            ));
        }
        Ok(())
    }

    #[instrument(skip(self, runs), fields(job = %job_name, runs = runs.len()))]
    async fn clear_runs(
        &self,
        project: &Project,
        job_name: &str,
        runs: &[DateTime<Utc>],
    ) -> optimus_core::Result<()> {
        let host = self.host(project)?;
        let body = serde_json::json!({
            "execution_dates": runs,
        });
        let response = self
            .client
            .post(format!(
                "{}/api/v1/dags/{}/clearTaskInstances",
                host,
                Self::dag_id(project, job_name)
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| optimus_core::Error::unavailable("unable to reach scheduler", e))?;
        if !response.status().is_success() {
            return Err(optimus_core::Error::unavailable(
                "unable to clear runs",
                format!("scheduler returned {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn run_status(
        &self,
        project: &Project,
        job_name: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        batch_size: usize,
    ) -> optimus_core::Result<Vec<JobRunStatus>> {
        let host = self.host(project)?;
        let response = self
            .client
            .get(format!(
                "{}/api/v1/dags/{}/dagRuns",
                host,
                Self::dag_id(project, job_name)
            ))
            .query(&[
                ("execution_date_gte", start.to_rfc3339()),
                ("execution_date_lte", end.to_rfc3339()),
                ("limit", batch_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| optimus_core::Error::unavailable("unable to reach scheduler", e))?;
        if !response.status().is_success() {
            return Err(optimus_core::Error::unavailable(
                "unable to query run status",
                format!("scheduler returned {}", response.status()),
            ));
        }
        let parsed: DagRunsResponse = response
            .json()
            .await
            .map_err(|e| optimus_core::Error::internal("unable to parse run status", e))?;
        Ok(parsed
            .dag_runs
            .into_iter()
            .map(|entry| JobRunStatus {
                scheduled_at: entry.execution_date,
                state: Self::parse_state(&entry.state),
            })
            .collect())
    }
}
