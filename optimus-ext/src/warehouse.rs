//! Warehouse datastore controller
//!
//! Adapter for a table-warehouse datastore: derives URNs, stores resource
//! specs, and snapshots tables for the backup engine. Only concrete tables
//! support snapshots; views and external tables are reported as ignored so
//! backup plans can surface them.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use optimus_core::{
    BackupOutcome, BackupResourceRequest, BackupResponse, Datastorer, NamespaceId, ResourceSpec,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Resource type eligible for snapshots
const TYPE_TABLE: &str = "table";

/// Known but snapshot-ineligible resource types
const NON_BACKUP_TYPES: &[&str] = &["view", "external_table", "dataset"];

/// Default snapshot retention when the request carries no TTL
const DEFAULT_TTL_HOURS: i64 = 720;

/// Warehouse datastore adapter with in-process resource state
pub struct WarehouseDatastore {
    name: String,
    resources: RwLock<HashMap<(NamespaceId, String), ResourceSpec>>,
}

impl WarehouseDatastore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: RwLock::new(HashMap::new()),
        }
    }

    fn parse_ttl_hours(config: &HashMap<String, String>) -> i64 {
        config
            .get(optimus_core::backup::CONFIG_TTL)
            .and_then(|raw| raw.trim_end_matches('h').parse().ok())
            .unwrap_or(DEFAULT_TTL_HOURS)
    }
}

#[async_trait]
impl Datastorer for WarehouseDatastore {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_urn(&self, resource: &ResourceSpec) -> optimus_core::Result<String> {
        if resource.name.is_empty() {
            return Err(optimus_core::Error::invalid_argument(
                "unable to generate urn",
                "resource name cannot be empty",
            ));
        }
        Ok(format!("{}://{}", self.name, resource.name))
    }

    async fn create(&self, resource: &ResourceSpec) -> optimus_core::Result<()> {
        let mut stored = resource.clone();
        stored.urn = self.generate_urn(resource)?;
        debug!(resource = %stored.name, urn = %stored.urn, "stored resource spec");
        self.resources
            .write()
            .insert((resource.namespace_id, resource.name.clone()), stored);
        Ok(())
    }

    async fn read(
        &self,
        namespace_id: NamespaceId,
        name: &str,
    ) -> optimus_core::Result<ResourceSpec> {
        self.resources
            .read()
            .get(&(namespace_id, name.to_string()))
            .cloned()
            .ok_or_else(|| optimus_core::Error::not_found("resource not found", name))
    }

    async fn backup_plan(
        &self,
        resource: &ResourceSpec,
        _config: &HashMap<String, String>,
    ) -> optimus_core::Result<BackupOutcome> {
        if resource.resource_type == TYPE_TABLE {
            return Ok(BackupOutcome::Planned {
                target_urn: format!("{}_backup", resource.urn),
            });
        }
        let reason = if NON_BACKUP_TYPES.contains(&resource.resource_type.as_str()) {
            format!("unsupported resource type {}", resource.resource_type)
        } else {
            format!("unknown resource type {}", resource.resource_type)
        };
        Ok(BackupOutcome::Ignored { reason })
    }

    async fn backup(&self, request: BackupResourceRequest) -> optimus_core::Result<BackupResponse> {
        match self.backup_plan(&request.resource, &request.config).await? {
            BackupOutcome::Ignored { reason } => Err(optimus_core::Error::failed_precondition(
                "unable to backup resource",
                reason,
            )),
            BackupOutcome::Planned { .. } => {
                let result_urn = format!(
                    "{}_backup_{}",
                    request.resource.urn,
                    request.backup_time.format("%Y_%m_%d_%H_%M_%S")
                );
                let ttl_hours = Self::parse_ttl_hours(&request.config);
                let expires_at = request.backup_time + ChronoDuration::hours(ttl_hours);
                Ok(BackupResponse {
                    result_urn,
                    result_spec: serde_json::json!({
                        "backup_id": request.backup_id.to_string(),
                        "source": request.resource.urn,
                        "ttl_hours": ttl_hours,
                        "expires_at": expires_at.to_rfc3339(),
                    }),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use optimus_core::BackupId;

    fn table(name: &str, ns: NamespaceId) -> ResourceSpec {
        ResourceSpec::new(name, "table", "warehouse", ns)
    }

    #[tokio::test]
    async fn test_create_derives_urn_and_read_returns_it() {
        let datastore = WarehouseDatastore::new("warehouse");
        let ns = NamespaceId::new();
        datastore.create(&table("playground.events", ns)).await.unwrap();

        let stored = datastore.read(ns, "playground.events").await.unwrap();
        assert_eq!(stored.urn, "warehouse://playground.events");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let datastore = WarehouseDatastore::new("warehouse");
        let result = datastore.read(NamespaceId::new(), "ghost").await;
        assert!(matches!(result, Err(optimus_core::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_backup_plan_by_type() {
        let datastore = WarehouseDatastore::new("warehouse");
        let ns = NamespaceId::new();
        let table = table("playground.events", ns).with_urn("warehouse://playground.events");
        let view =
            ResourceSpec::new("playground.events_view", "view", "warehouse", ns)
                .with_urn("warehouse://playground.events_view");

        assert!(matches!(
            datastore.backup_plan(&table, &HashMap::new()).await.unwrap(),
            BackupOutcome::Planned { .. }
        ));
        match datastore.backup_plan(&view, &HashMap::new()).await.unwrap() {
            BackupOutcome::Ignored { reason } => {
                assert!(reason.contains("unsupported resource type view"))
            }
            other => panic!("expected ignored, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backup_produces_timestamped_snapshot() {
        let datastore = WarehouseDatastore::new("warehouse");
        let ns = NamespaceId::new();
        let resource = table("playground.events", ns).with_urn("warehouse://playground.events");

        let response = datastore
            .backup(BackupResourceRequest {
                resource,
                backup_id: BackupId::new(),
                config: HashMap::from([("TTL".to_string(), "24h".to_string())]),
                backup_time: Utc.with_ymd_and_hms(2020, 11, 11, 2, 0, 0).unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(
            response.result_urn,
            "warehouse://playground.events_backup_2020_11_11_02_00_00"
        );
        assert_eq!(response.result_spec["ttl_hours"], 24);
    }

    #[tokio::test]
    async fn test_backup_of_view_rejected() {
        let datastore = WarehouseDatastore::new("warehouse");
        let view = ResourceSpec::new("v", "view", "warehouse", NamespaceId::new())
            .with_urn("warehouse://v");
        let result = datastore
            .backup(BackupResourceRequest {
                resource: view,
                backup_id: BackupId::new(),
                config: HashMap::new(),
                backup_time: Utc::now(),
            })
            .await;
        assert!(matches!(
            result,
            Err(optimus_core::Error::FailedPrecondition(_))
        ));
    }
}
