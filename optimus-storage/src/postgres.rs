//! PostgreSQL store
//!
//! Runtime-checked queries against the logical layout in the service DDL:
//! `projects`, `namespaces`, `secrets`, `jobs`, `job_dependencies`,
//! `resources`, `replays`, `backups`, `deployments`. Namespace job batches
//! are replaced inside a single transaction so the URN→job index stays
//! internally consistent.

use crate::models::*;
use async_trait::async_trait;
use chrono::Utc;
use optimus_core::store::{
    BackupStore, DeploymentStore, JobDependencyStore, JobSpecStore, NamespaceJobsReplacement,
    NamespaceStore, ProjectStore, ReplayStore, ResourceStore, SecretStore,
};
use optimus_core::{
    BackupSpec, DependencyEdge, Deployment, DeploymentId, DeploymentStatus, JobId, JobSpec,
    Namespace, NamespaceId, Project, ProjectId, ReplayId, ReplayMessage, ReplaySpec, ReplayStatus,
    ResourceSpec, Secret,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Configuration for the PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            idle_timeout_secs: None,
        }
    }
}

/// PostgreSQL storage backend
pub struct PostgresStore {
    pool: PgPool,
}

fn db_err(scope: &str, e: sqlx::Error) -> optimus_core::Error {
    match e {
        sqlx::Error::RowNotFound => optimus_core::Error::not_found(scope, "row not found"),
        sqlx::Error::PoolTimedOut => {
            optimus_core::Error::unavailable(scope, "connection pool exhausted")
        }
        other => optimus_core::Error::internal(scope, other),
    }
}

impl PostgresStore {
    /// Connect with the default pool configuration
    pub async fn new(database_url: &str) -> crate::Result<Self> {
        Self::with_pool_config(database_url, PoolConfig::default()).await
    }

    /// Connect with an explicit pool configuration
    pub async fn with_pool_config(database_url: &str, config: PoolConfig) -> crate::Result<Self> {
        if config.max_connections == 0 || config.max_connections < config.min_connections {
            return Err(crate::Error::ValidationError(
                "max_connections must be >= min_connections and > 0".to_string(),
            ));
        }

        let mut opts = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.acquire_timeout_secs));
        if let Some(idle) = config.idle_timeout_secs {
            opts = opts.idle_timeout(std::time::Duration::from_secs(idle));
        }

        let pool = opts
            .connect(database_url)
            .await
            .map_err(|e| crate::Error::ConnectionFailed(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn upsert_job_tx(
        tx: &mut Transaction<'_, Postgres>,
        project_id: ProjectId,
        job: &JobSpec,
    ) -> Result<JobSpec, sqlx::Error> {
        let existing: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM jobs WHERE project_id = $1 AND name = $2")
                .bind(project_id.0)
                .bind(&job.name)
                .fetch_optional(&mut **tx)
                .await?;

        let mut spec = job.clone();
        if let Some((id,)) = existing {
            spec.id = JobId(id);
        }

        sqlx::query(
            r#"INSERT INTO jobs (id, project_id, namespace_id, name, version, destination, spec, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               ON CONFLICT (project_id, name) DO UPDATE
               SET namespace_id = EXCLUDED.namespace_id,
                   version = EXCLUDED.version,
                   destination = COALESCE(EXCLUDED.destination, jobs.destination),
                   spec = EXCLUDED.spec,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(spec.id.0)
        .bind(project_id.0)
        .bind(spec.namespace_id.0)
        .bind(&spec.name)
        .bind(spec.version)
        .bind(spec.destination.as_deref())
        .bind(sqlx::types::Json(&spec))
        .bind(Utc::now())
        .execute(&mut **tx)
        .await?;

        Ok(spec)
    }

    fn log_slow(scope: &str, start: Instant) {
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(scope = %scope, duration_ms = elapsed.as_millis() as u64, "slow database operation");
        }
    }
}

#[async_trait]
impl ProjectStore for PostgresStore {
    async fn save_project(&self, project: &Project) -> optimus_core::Result<()> {
        sqlx::query(
            r#"INSERT INTO projects (id, name, config, created_at)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (name) DO UPDATE SET config = EXCLUDED.config"#,
        )
        .bind(project.id.0)
        .bind(&project.name)
        .bind(sqlx::types::Json(&project.config))
        .bind(project.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save project", e))?;
        Ok(())
    }

    async fn get_project_by_id(&self, id: ProjectId) -> optimus_core::Result<Project> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get project", e))?;
        row.map(Into::into)
            .ok_or_else(|| optimus_core::Error::not_found("project not found", id))
    }

    async fn get_project_by_name(&self, name: &str) -> optimus_core::Result<Project> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get project", e))?;
        row.map(Into::into)
            .ok_or_else(|| optimus_core::Error::not_found("project not found", name))
    }

    async fn all_projects(&self) -> optimus_core::Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as("SELECT * FROM projects ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("unable to list projects", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl NamespaceStore for PostgresStore {
    async fn save_namespace(&self, namespace: &Namespace) -> optimus_core::Result<()> {
        sqlx::query(
            r#"INSERT INTO namespaces (id, name, project_id, config, created_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (project_id, name) DO UPDATE SET config = EXCLUDED.config"#,
        )
        .bind(namespace.id.0)
        .bind(&namespace.name)
        .bind(namespace.project_id.0)
        .bind(sqlx::types::Json(&namespace.config))
        .bind(namespace.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save namespace", e))?;
        Ok(())
    }

    async fn get_namespace_by_id(&self, id: NamespaceId) -> optimus_core::Result<Namespace> {
        let row: Option<NamespaceRow> = sqlx::query_as("SELECT * FROM namespaces WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get namespace", e))?;
        row.map(Into::into)
            .ok_or_else(|| optimus_core::Error::not_found("namespace not found", id))
    }

    async fn get_namespace(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> optimus_core::Result<Namespace> {
        let row: Option<NamespaceRow> =
            sqlx::query_as("SELECT * FROM namespaces WHERE project_id = $1 AND name = $2")
                .bind(project_id.0)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_err("unable to get namespace", e))?;
        row.map(Into::into)
            .ok_or_else(|| optimus_core::Error::not_found("namespace not found", name))
    }

    async fn namespaces_in_project(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<Namespace>> {
        let rows: Vec<NamespaceRow> =
            sqlx::query_as("SELECT * FROM namespaces WHERE project_id = $1 ORDER BY name")
                .bind(project_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list namespaces", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl SecretStore for PostgresStore {
    async fn save_secret(&self, secret: &Secret) -> optimus_core::Result<()> {
        let result = sqlx::query(
            r#"INSERT INTO secrets (project_id, namespace_id, name, value)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (project_id, name) DO NOTHING"#,
        )
        .bind(secret.project_id.0)
        .bind(secret.namespace_id.map(|n| n.0))
        .bind(&secret.name)
        .bind(&secret.value)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save secret", e))?;
        if result.rows_affected() == 0 {
            return Err(optimus_core::Error::already_exists(
                "unable to register secret",
                &secret.name,
            ));
        }
        Ok(())
    }

    async fn update_secret(&self, secret: &Secret) -> optimus_core::Result<()> {
        let result = sqlx::query(
            "UPDATE secrets SET value = $3, namespace_id = $4 WHERE project_id = $1 AND name = $2",
        )
        .bind(secret.project_id.0)
        .bind(&secret.name)
        .bind(&secret.value)
        .bind(secret.namespace_id.map(|n| n.0))
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to update secret", e))?;
        if result.rows_affected() == 0 {
            return Err(optimus_core::Error::not_found(
                "secret not found",
                &secret.name,
            ));
        }
        Ok(())
    }

    async fn delete_secret(&self, project_id: ProjectId, name: &str) -> optimus_core::Result<()> {
        let result = sqlx::query("DELETE FROM secrets WHERE project_id = $1 AND name = $2")
            .bind(project_id.0)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("unable to delete secret", e))?;
        if result.rows_affected() == 0 {
            return Err(optimus_core::Error::not_found("secret not found", name));
        }
        Ok(())
    }

    async fn secrets_in_project(&self, project_id: ProjectId) -> optimus_core::Result<Vec<Secret>> {
        let rows: Vec<SecretRow> =
            sqlx::query_as("SELECT * FROM secrets WHERE project_id = $1 ORDER BY name")
                .bind(project_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list secrets", e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl JobSpecStore for PostgresStore {
    async fn save_job(&self, project_id: ProjectId, job: &JobSpec) -> optimus_core::Result<JobSpec> {
        let start = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("unable to save job", e))?;
        let spec = Self::upsert_job_tx(&mut tx, project_id, job)
            .await
            .map_err(|e| db_err("unable to save job", e))?;
        tx.commit().await.map_err(|e| db_err("unable to save job", e))?;
        Self::log_slow("save_job", start);
        Ok(spec)
    }

    async fn replace_jobs_in_namespace(
        &self,
        project_id: ProjectId,
        namespace_id: NamespaceId,
        desired: &[JobSpec],
    ) -> optimus_core::Result<NamespaceJobsReplacement> {
        let scope = "unable to replace namespace jobs";
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(|e| db_err(scope, e))?;
        let mut replacement = NamespaceJobsReplacement::default();

        for job in desired {
            let spec = Self::upsert_job_tx(&mut tx, project_id, job)
                .await
                .map_err(|e| db_err(scope, e))?;
            replacement.saved.push(spec);
        }

        let desired_names: Vec<String> = desired.iter().map(|j| j.name.clone()).collect();
        let orphan_rows: Vec<JobRow> = sqlx::query_as(
            r#"SELECT * FROM jobs
               WHERE project_id = $1 AND namespace_id = $2 AND name <> ALL($3)"#,
        )
        .bind(project_id.0)
        .bind(namespace_id.0)
        .bind(&desired_names)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| db_err(scope, e))?;

        for row in orphan_rows {
            sqlx::query("DELETE FROM job_dependencies WHERE job_id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(scope, e))?;
            sqlx::query("DELETE FROM jobs WHERE id = $1")
                .bind(row.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err(scope, e))?;
            replacement.deleted.push(row.into_spec());
        }

        tx.commit().await.map_err(|e| db_err(scope, e))?;
        Self::log_slow("replace_jobs_in_namespace", start);
        Ok(replacement)
    }

    async fn get_job_by_id(&self, id: JobId) -> optimus_core::Result<JobSpec> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get job", e))?;
        row.map(JobRow::into_spec)
            .ok_or_else(|| optimus_core::Error::not_found("job not found", id))
    }

    async fn get_job_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> optimus_core::Result<JobSpec> {
        let row: Option<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE project_id = $1 AND name = $2")
                .bind(project_id.0)
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_err("unable to get job", e))?;
        row.map(JobRow::into_spec)
            .ok_or_else(|| optimus_core::Error::not_found("job not found", name))
    }

    async fn get_job_by_destination(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> optimus_core::Result<JobSpec> {
        let row: Option<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE project_id = $1 AND destination = $2")
                .bind(project_id.0)
                .bind(urn)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_err("unable to get job", e))?;
        row.map(JobRow::into_spec)
            .ok_or_else(|| optimus_core::Error::not_found("job not found for destination", urn))
    }

    async fn set_job_destination(&self, id: JobId, urn: &str) -> optimus_core::Result<()> {
        let result = sqlx::query(
            r#"UPDATE jobs
               SET destination = $2,
                   spec = jsonb_set(spec, '{destination}', to_jsonb($2::text))
               WHERE id = $1"#,
        )
        .bind(id.0)
        .bind(urn)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to set job destination", e))?;
        if result.rows_affected() == 0 {
            return Err(optimus_core::Error::not_found("job not found", id));
        }
        Ok(())
    }

    async fn jobs_in_project(&self, project_id: ProjectId) -> optimus_core::Result<Vec<JobSpec>> {
        let rows: Vec<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE project_id = $1 ORDER BY name")
                .bind(project_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list jobs", e))?;
        Ok(rows.into_iter().map(JobRow::into_spec).collect())
    }

    async fn jobs_in_namespace(
        &self,
        namespace_id: NamespaceId,
    ) -> optimus_core::Result<Vec<JobSpec>> {
        let rows: Vec<JobRow> =
            sqlx::query_as("SELECT * FROM jobs WHERE namespace_id = $1 ORDER BY name")
                .bind(namespace_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list jobs", e))?;
        Ok(rows.into_iter().map(JobRow::into_spec).collect())
    }

    async fn delete_job(&self, id: JobId) -> optimus_core::Result<()> {
        let scope = "unable to delete job";
        let mut tx = self.pool.begin().await.map_err(|e| db_err(scope, e))?;
        sqlx::query("DELETE FROM job_dependencies WHERE job_id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(scope, e))?;
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(scope, e))?;
        tx.commit().await.map_err(|e| db_err(scope, e))?;
        if result.rows_affected() == 0 {
            return Err(optimus_core::Error::not_found("job not found", id));
        }
        Ok(())
    }
}

#[async_trait]
impl JobDependencyStore for PostgresStore {
    async fn replace_job_dependencies(
        &self,
        project_id: ProjectId,
        job_id: JobId,
        edges: &[DependencyEdge],
    ) -> optimus_core::Result<()> {
        let scope = "unable to save job dependencies";
        let mut tx = self.pool.begin().await.map_err(|e| db_err(scope, e))?;
        sqlx::query("DELETE FROM job_dependencies WHERE job_id = $1")
            .bind(job_id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(scope, e))?;
        for edge in edges {
            let row = JobDependencyRow::from_edge(project_id, job_id, edge);
            sqlx::query(
                r#"INSERT INTO job_dependencies (job_id, project_id, from_job, to_ref, kind, scope)
                   VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(row.job_id)
            .bind(row.project_id)
            .bind(&row.from_job)
            .bind(&row.to_ref)
            .bind(&row.kind)
            .bind(&row.scope)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(scope, e))?;
        }
        tx.commit().await.map_err(|e| db_err(scope, e))?;
        Ok(())
    }

    async fn dependencies_in_project(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<(JobId, DependencyEdge)>> {
        let rows: Vec<JobDependencyRow> =
            sqlx::query_as("SELECT * FROM job_dependencies WHERE project_id = $1")
                .bind(project_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list job dependencies", e))?;
        rows.into_iter().map(JobDependencyRow::into_edge).collect()
    }
}

#[async_trait]
impl ResourceStore for PostgresStore {
    async fn save_resource(
        &self,
        project_id: ProjectId,
        resource: &ResourceSpec,
    ) -> optimus_core::Result<()> {
        sqlx::query(
            r#"INSERT INTO resources (id, project_id, namespace_id, datastore, name, urn, spec, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               ON CONFLICT (namespace_id, datastore, name) DO UPDATE
               SET urn = EXCLUDED.urn,
                   spec = EXCLUDED.spec,
                   updated_at = EXCLUDED.updated_at"#,
        )
        .bind(resource.id.0)
        .bind(project_id.0)
        .bind(resource.namespace_id.0)
        .bind(&resource.datastore_ref)
        .bind(&resource.name)
        .bind(&resource.urn)
        .bind(sqlx::types::Json(resource))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save resource", e))?;
        Ok(())
    }

    async fn get_resource(
        &self,
        namespace_id: NamespaceId,
        datastore: &str,
        name: &str,
    ) -> optimus_core::Result<ResourceSpec> {
        let row: Option<ResourceRow> = sqlx::query_as(
            "SELECT * FROM resources WHERE namespace_id = $1 AND datastore = $2 AND name = $3",
        )
        .bind(namespace_id.0)
        .bind(datastore)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("unable to get resource", e))?;
        row.map(ResourceRow::into_spec)
            .ok_or_else(|| optimus_core::Error::not_found("resource not found", name))
    }

    async fn get_resource_by_urn(
        &self,
        project_id: ProjectId,
        urn: &str,
    ) -> optimus_core::Result<ResourceSpec> {
        let row: Option<ResourceRow> =
            sqlx::query_as("SELECT * FROM resources WHERE project_id = $1 AND urn = $2")
                .bind(project_id.0)
                .bind(urn)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_err("unable to get resource", e))?;
        row.map(ResourceRow::into_spec)
            .ok_or_else(|| optimus_core::Error::not_found("resource not found", urn))
    }

    async fn resources_in_namespace(
        &self,
        namespace_id: NamespaceId,
    ) -> optimus_core::Result<Vec<ResourceSpec>> {
        let rows: Vec<ResourceRow> =
            sqlx::query_as("SELECT * FROM resources WHERE namespace_id = $1 ORDER BY name")
                .bind(namespace_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list resources", e))?;
        Ok(rows.into_iter().map(ResourceRow::into_spec).collect())
    }
}

#[async_trait]
impl ReplayStore for PostgresStore {
    async fn save_replay(&self, replay: &ReplaySpec) -> optimus_core::Result<()> {
        let row = ReplayRow::from_spec(replay);
        sqlx::query(
            r#"INSERT INTO replays (id, job_id, job_name, start_date, end_date, status, config, message, claimed_runs, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(row.id)
        .bind(row.job_id)
        .bind(&row.job_name)
        .bind(row.start_date)
        .bind(row.end_date)
        .bind(&row.status)
        .bind(&row.config)
        .bind(&row.message)
        .bind(&row.claimed_runs)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save replay", e))?;
        Ok(())
    }

    async fn update_replay_status(
        &self,
        id: ReplayId,
        status: ReplayStatus,
        message: Option<ReplayMessage>,
    ) -> optimus_core::Result<()> {
        let scope = "unable to update replay";
        let mut tx = self.pool.begin().await.map_err(|e| db_err(scope, e))?;
        let current: Option<(String,)> =
            sqlx::query_as("SELECT status FROM replays WHERE id = $1 FOR UPDATE")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_err(scope, e))?;
        let current = current
            .ok_or_else(|| optimus_core::Error::not_found("replay not found", id))?
            .0;
        let current = parse_replay_status(&current)?;
        if !current.can_transition_to(status) {
            return Err(optimus_core::Error::failed_precondition(
                scope,
                format!("illegal transition {} -> {}", current, status),
            ));
        }
        sqlx::query("UPDATE replays SET status = $2, message = COALESCE($3, message) WHERE id = $1")
            .bind(id.0)
            .bind(status.to_string())
            .bind(message.map(sqlx::types::Json))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err(scope, e))?;
        tx.commit().await.map_err(|e| db_err(scope, e))?;
        Ok(())
    }

    async fn get_replay_by_id(&self, id: ReplayId) -> optimus_core::Result<ReplaySpec> {
        let row: Option<ReplayRow> = sqlx::query_as("SELECT * FROM replays WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get replay", e))?;
        row.ok_or_else(|| optimus_core::Error::not_found("replay not found", id))?
            .into_spec()
    }

    async fn replays_in_project(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<ReplaySpec>> {
        let rows: Vec<ReplayRow> = sqlx::query_as(
            r#"SELECT r.* FROM replays r
               JOIN jobs j ON j.id = r.job_id
               WHERE j.project_id = $1
               ORDER BY r.created_at DESC"#,
        )
        .bind(project_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("unable to list replays", e))?;
        rows.into_iter().map(ReplayRow::into_spec).collect()
    }

    async fn replays_by_statuses(
        &self,
        statuses: &[ReplayStatus],
    ) -> optimus_core::Result<Vec<ReplaySpec>> {
        let status_strings: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let rows: Vec<ReplayRow> =
            sqlx::query_as("SELECT * FROM replays WHERE status = ANY($1) ORDER BY created_at")
                .bind(&status_strings)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_err("unable to list replays", e))?;
        rows.into_iter().map(ReplayRow::into_spec).collect()
    }
}

#[async_trait]
impl BackupStore for PostgresStore {
    async fn save_backup(&self, backup: &BackupSpec) -> optimus_core::Result<()> {
        let row = BackupRow::from_spec(backup);
        sqlx::query(
            r#"INSERT INTO backups (id, project_id, datastore, resource_name, resource_urn, description, config, result, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(&row.datastore)
        .bind(&row.resource_name)
        .bind(&row.resource_urn)
        .bind(&row.description)
        .bind(&row.config)
        .bind(&row.result)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save backup", e))?;
        Ok(())
    }

    async fn get_backup_by_id(&self, id: Uuid) -> optimus_core::Result<BackupSpec> {
        let row: Option<BackupRow> = sqlx::query_as("SELECT * FROM backups WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get backup", e))?;
        row.map(BackupRow::into_spec)
            .ok_or_else(|| optimus_core::Error::not_found("backup not found", id))
    }

    async fn backups_in_project(
        &self,
        project_id: ProjectId,
        datastore: &str,
    ) -> optimus_core::Result<Vec<BackupSpec>> {
        let rows: Vec<BackupRow> = sqlx::query_as(
            r#"SELECT * FROM backups
               WHERE project_id = $1 AND datastore = $2
               ORDER BY created_at DESC"#,
        )
        .bind(project_id.0)
        .bind(datastore)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("unable to list backups", e))?;
        Ok(rows.into_iter().map(BackupRow::into_spec).collect())
    }
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn save_deployment(&self, deployment: &Deployment) -> optimus_core::Result<()> {
        let row = DeploymentRow::from_deployment(deployment);
        sqlx::query(
            r#"INSERT INTO deployments (id, project_id, status, details, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(row.id)
        .bind(row.project_id)
        .bind(&row.status)
        .bind(&row.details)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("unable to save deployment", e))?;
        Ok(())
    }

    async fn update_deployment(&self, deployment: &Deployment) -> optimus_core::Result<()> {
        let scope = "unable to update deployment";
        let result = sqlx::query(
            r#"UPDATE deployments
               SET status = $2, details = $3, updated_at = $4
               WHERE id = $1 AND status NOT IN ('succeed', 'failed')"#,
        )
        .bind(deployment.id.0)
        .bind(deployment.status.to_string())
        .bind(sqlx::types::Json(&deployment.details))
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err(scope, e))?;
        if result.rows_affected() == 0 {
            return Err(optimus_core::Error::failed_precondition(
                scope,
                format!("deployment {} missing or already terminal", deployment.id),
            ));
        }
        Ok(())
    }

    async fn get_deployment_by_id(&self, id: DeploymentId) -> optimus_core::Result<Deployment> {
        let row: Option<DeploymentRow> = sqlx::query_as("SELECT * FROM deployments WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("unable to get deployment", e))?;
        row.ok_or_else(|| optimus_core::Error::not_found("deployment not found", id))?
            .into_deployment()
    }

    async fn get_deployment_by_status_and_project(
        &self,
        status: DeploymentStatus,
        project_id: ProjectId,
    ) -> optimus_core::Result<Option<Deployment>> {
        let row: Option<DeploymentRow> = sqlx::query_as(
            "SELECT * FROM deployments WHERE status = $1 AND project_id = $2 LIMIT 1",
        )
        .bind(status.to_string())
        .bind(project_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("unable to get deployment", e))?;
        row.map(DeploymentRow::into_deployment).transpose()
    }
}
