//! Datastore registry
//!
//! A datastore adapter owns a family of resource types (tables, views,
//! datasets), derives URNs, and implements snapshots. The registry is
//! populated at process start and read-only afterwards.

use crate::backup::BackupId;
use crate::resource::ResourceSpec;
use crate::tenant::NamespaceId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Outcome of planning a backup for one resource
#[derive(Debug, Clone, PartialEq)]
pub enum BackupOutcome {
    /// The resource would be snapshotted to the given URN
    Planned { target_urn: String },
    /// The resource is skipped, e.g. unsupported type or policy opt-out
    Ignored { reason: String },
}

/// Request to snapshot one resource
#[derive(Debug, Clone)]
pub struct BackupResourceRequest {
    pub resource: ResourceSpec,
    pub backup_id: BackupId,
    pub config: HashMap<String, String>,
    pub backup_time: DateTime<Utc>,
}

/// Result of snapshotting one resource
#[derive(Debug, Clone)]
pub struct BackupResponse {
    /// URN of the produced snapshot
    pub result_urn: String,
    /// Datastore-specific detail of the snapshot
    pub result_spec: serde_json::Value,
}

/// A datastore adapter
#[async_trait]
pub trait Datastorer: Send + Sync {
    /// Registry name of this datastore, e.g. `bigquery`
    fn name(&self) -> &str;

    /// Derive the URN for a resource spec
    fn generate_urn(&self, resource: &ResourceSpec) -> crate::Result<String>;

    /// Create or update a resource in the underlying store
    async fn create(&self, resource: &ResourceSpec) -> crate::Result<()>;

    /// Read a resource owned by a namespace
    async fn read(&self, namespace_id: NamespaceId, name: &str) -> crate::Result<ResourceSpec>;

    /// Plan a snapshot for a resource without touching the store
    async fn backup_plan(
        &self,
        resource: &ResourceSpec,
        config: &HashMap<String, String>,
    ) -> crate::Result<BackupOutcome>;

    /// Snapshot a resource
    async fn backup(&self, request: BackupResourceRequest) -> crate::Result<BackupResponse>;
}

/// Registry of datastore adapters keyed by name
#[derive(Clone, Default)]
pub struct DatastoreRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn Datastorer>>>>,
}

impl DatastoreRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a datastore under its name
    pub fn register(&self, datastore: Arc<dyn Datastorer>) -> crate::Result<()> {
        let name = datastore.name().to_string();
        let mut inner = self.inner.write().expect("datastore registry lock poisoned");
        if inner.contains_key(&name) {
            return Err(crate::Error::already_exists(
                "unable to register datastore",
                name,
            ));
        }
        inner.insert(name, datastore);
        Ok(())
    }

    /// Look up a datastore by name
    pub fn get_by_name(&self, name: &str) -> crate::Result<Arc<dyn Datastorer>> {
        self.inner
            .read()
            .expect("datastore registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| crate::Error::not_found("datastore not found", name))
    }

    /// Read a resource through the named datastore
    pub async fn read(
        &self,
        datastore: &str,
        namespace_id: NamespaceId,
        name: &str,
    ) -> crate::Result<ResourceSpec> {
        self.get_by_name(datastore)?.read(namespace_id, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDatastore;

    #[async_trait]
    impl Datastorer for NullDatastore {
        fn name(&self) -> &str {
            "null"
        }

        fn generate_urn(&self, resource: &ResourceSpec) -> crate::Result<String> {
            Ok(format!("null://{}", resource.name))
        }

        async fn create(&self, _resource: &ResourceSpec) -> crate::Result<()> {
            Ok(())
        }

        async fn read(&self, _namespace_id: NamespaceId, name: &str) -> crate::Result<ResourceSpec> {
            Err(crate::Error::not_found("resource not found", name))
        }

        async fn backup_plan(
            &self,
            _resource: &ResourceSpec,
            _config: &HashMap<String, String>,
        ) -> crate::Result<BackupOutcome> {
            Ok(BackupOutcome::Ignored {
                reason: "unsupported type".to_string(),
            })
        }

        async fn backup(&self, _request: BackupResourceRequest) -> crate::Result<BackupResponse> {
            Err(crate::Error::failed_precondition(
                "unable to backup",
                "unsupported type",
            ))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = DatastoreRegistry::new();
        registry.register(Arc::new(NullDatastore)).unwrap();
        assert!(registry.get_by_name("null").is_ok());
        assert!(matches!(
            registry.get_by_name("bigquery"),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn test_urn_generation() {
        let datastore = NullDatastore;
        let resource = ResourceSpec::new("playground.events", "table", "null", NamespaceId::new());
        assert_eq!(
            datastore.generate_urn(&resource).unwrap(),
            "null://playground.events"
        );
    }
}
