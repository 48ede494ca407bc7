//! Backup engine
//!
//! Walks job→resource destination edges downstream from a requested
//! resource, honoring the namespace allow-list and datastore-level ignore
//! rules, and snapshots every eligible resource. Records persist with their
//! config (TTL, ignore-downstream) and are immutable afterwards.

use optimus_core::store::*;
use optimus_core::{
    BackupId, BackupOutcome, BackupPlan, BackupRequest, BackupResourceRequest, BackupResult,
    BackupSpec, Clock, DatastoreRegistry, IgnoredResource, JobSpec, ResourceSpec,
};
use chrono::Duration as ChronoDuration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Only backups younger than this window are listed
const BACKUP_LIST_WINDOW_DAYS: i64 = 90;

const IGNORED_NOT_ALLOWED: &str = "namespace is not in allowed downstream namespaces";

/// One backup candidate: the producing job and the resource it writes
struct Candidate {
    resource: ResourceSpec,
    /// false for downstream resources pruned by the allow-list
    allowed: bool,
}

/// Plans and executes resource backups
pub struct BackupService {
    store: Arc<dyn Store>,
    datastores: DatastoreRegistry,
    clock: Arc<dyn Clock>,
}

impl BackupService {
    pub fn new(store: Arc<dyn Store>, datastores: DatastoreRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            datastores,
            clock,
        }
    }

    /// Plan a backup without touching any datastore state.
    #[instrument(skip(self), fields(resource = %request.resource_name))]
    pub async fn dry_run(&self, request: &BackupRequest) -> optimus_core::Result<BackupPlan> {
        let mut plan = BackupPlan::default();
        for candidate in self.collect_candidates(request).await? {
            if !candidate.allowed {
                plan.ignored.push(IgnoredResource {
                    urn: candidate.resource.urn.clone(),
                    reason: IGNORED_NOT_ALLOWED.to_string(),
                });
                continue;
            }
            let datastore = self.datastores.get_by_name(&candidate.resource.datastore_ref)?;
            match datastore
                .backup_plan(&candidate.resource, &request.config)
                .await?
            {
                BackupOutcome::Planned { .. } => plan.resources.push(candidate.resource.urn.clone()),
                BackupOutcome::Ignored { reason } => plan.ignored.push(IgnoredResource {
                    urn: candidate.resource.urn.clone(),
                    reason,
                }),
            }
        }
        Ok(plan)
    }

    /// Execute a backup and persist its record. Partial failures persist the
    /// partial result and surface a multi-error.
    #[instrument(skip(self), fields(resource = %request.resource_name))]
    pub async fn create(&self, request: &BackupRequest) -> optimus_core::Result<BackupResult> {
        let backup_id = BackupId::new();
        let backup_time = self.clock.now();
        let mut result = BackupResult {
            id: Some(backup_id),
            ..Default::default()
        };
        let mut details: HashMap<String, optimus_core::BackupDetail> = HashMap::new();
        let mut failures: Vec<String> = Vec::new();
        let mut root_urn = None;

        for candidate in self.collect_candidates(request).await? {
            if root_urn.is_none() {
                root_urn = Some(candidate.resource.urn.clone());
            }
            if !candidate.allowed {
                result.ignored.push(IgnoredResource {
                    urn: candidate.resource.urn.clone(),
                    reason: IGNORED_NOT_ALLOWED.to_string(),
                });
                continue;
            }
            let datastore = self.datastores.get_by_name(&candidate.resource.datastore_ref)?;
            match datastore
                .backup_plan(&candidate.resource, &request.config)
                .await?
            {
                BackupOutcome::Ignored { reason } => {
                    result.ignored.push(IgnoredResource {
                        urn: candidate.resource.urn.clone(),
                        reason,
                    });
                    continue;
                }
                BackupOutcome::Planned { .. } => {}
            }
            let source_urn = candidate.resource.urn.clone();
            match datastore
                .backup(BackupResourceRequest {
                    resource: candidate.resource,
                    backup_id,
                    config: request.config.clone(),
                    backup_time,
                })
                .await
            {
                Ok(response) => {
                    info!(source = %source_urn, target = %response.result_urn, "resource backed up");
                    result.resources.push(response.result_urn.clone());
                    details.insert(
                        source_urn,
                        optimus_core::BackupDetail {
                            urn: response.result_urn,
                            spec: response.result_spec,
                        },
                    );
                }
                Err(e) => {
                    warn!(source = %source_urn, error = %e, "resource backup failed");
                    failures.push(format!("{}: {}", source_urn, e));
                }
            }
        }

        let record = BackupSpec {
            id: backup_id,
            resource_urn: root_urn.unwrap_or_default(),
            resource_name: request.resource_name.clone(),
            description: request.description.clone(),
            project_id: request.project_id,
            datastore_ref: request.datastore_ref.clone(),
            config: request.config.clone(),
            result: details,
            created_at: backup_time,
        };
        self.store.save_backup(&record).await?;

        if !failures.is_empty() {
            return Err(optimus_core::Error::internal(
                "unable to backup all resources",
                format!(
                    "{} of {} targets failed: {}",
                    failures.len(),
                    failures.len() + result.resources.len(),
                    failures.join("; ")
                ),
            ));
        }
        Ok(result)
    }

    /// Read one backup record by its id string
    pub async fn get(&self, id: &str) -> optimus_core::Result<BackupSpec> {
        let uuid = Uuid::parse_str(id).map_err(|e| {
            optimus_core::Error::invalid_argument(
                "unable to get backup",
                format!("'{}' is not a valid backup id: {}", id, e),
            )
        })?;
        let backup = self.store.get_backup_by_id(uuid).await?;
        // a record missing its own root entry is corrupt
        backup.detail_for(&backup.resource_urn)?;
        Ok(backup)
    }

    /// Backups for a project and datastore, newest first, recent window only
    pub async fn list(
        &self,
        project_id: optimus_core::ProjectId,
        datastore: &str,
    ) -> optimus_core::Result<Vec<BackupSpec>> {
        let cutoff = self.clock.now() - ChronoDuration::days(BACKUP_LIST_WINDOW_DAYS);
        Ok(self
            .store
            .backups_in_project(project_id, datastore)
            .await?
            .into_iter()
            .filter(|b| b.created_at > cutoff)
            .collect())
    }

    /// The requested resource first, then every downstream resource reached
    /// through job destination edges, flagged by the allow-list.
    async fn collect_candidates(
        &self,
        request: &BackupRequest,
    ) -> optimus_core::Result<Vec<Candidate>> {
        let datastore = self.datastores.get_by_name(&request.datastore_ref)?;
        let root_resource = datastore
            .read(request.namespace_id, &request.resource_name)
            .await?;

        let producing_job = self
            .store
            .get_job_by_destination(request.project_id, &root_resource.urn)
            .await
            .map_err(|_| {
                optimus_core::Error::not_found(
                    "unable to plan backup",
                    format!("no job produces resource {}", root_resource.urn),
                )
            })?;

        let jobs = self.store.jobs_in_project(request.project_id).await?;
        let jobs_by_name: HashMap<&str, &JobSpec> =
            jobs.iter().map(|j| (j.name.as_str(), j)).collect();
        let namespace_names: HashMap<_, _> = self
            .store
            .namespaces_in_project(request.project_id)
            .await?
            .into_iter()
            .map(|n| (n.id, n.name))
            .collect();

        let mut candidates = vec![Candidate {
            resource: root_resource,
            allowed: true,
        }];

        // downstream walk over the dependents reverse index
        let mut queue: VecDeque<&JobSpec> = VecDeque::from([&producing_job]);
        let mut seen: HashSet<&str> = HashSet::from([producing_job.name.as_str()]);
        while let Some(job) = queue.pop_front() {
            for dependent_name in &job.dependents {
                let Some(&dependent) = jobs_by_name.get(dependent_name.as_str()) else {
                    continue;
                };
                if !seen.insert(dependent.name.as_str()) {
                    continue;
                }
                queue.push_back(dependent);

                let Some(destination) = dependent.destination.as_deref() else {
                    continue;
                };
                let Ok(resource) = self
                    .store
                    .get_resource_by_urn(request.project_id, destination)
                    .await
                else {
                    // job writes somewhere no resource spec covers
                    continue;
                };
                let allowed = namespace_names
                    .get(&dependent.namespace_id)
                    .map(|name| request.allows_namespace(name))
                    .unwrap_or(false);
                candidates.push(Candidate { resource, allowed });
            }
        }
        Ok(candidates)
    }
}
