//! Resource service
//!
//! Create/update flows derive the URN through the owning datastore, land
//! the spec in both the datastore and the operation store, and stream a
//! `ResourceUpdated` event per resource. Reads go through the datastore so
//! the caller sees what the warehouse sees.

use optimus_core::store::*;
use optimus_core::{
    DatastoreRegistry, Event, NamespaceId, ProgressSink, ProjectId, ResourceSpec,
};
use std::sync::Arc;
use tracing::instrument;

/// Facade over datastore-backed resource specifications
pub struct ResourceService {
    store: Arc<dyn Store>,
    datastores: DatastoreRegistry,
}

impl ResourceService {
    pub fn new(store: Arc<dyn Store>, datastores: DatastoreRegistry) -> Self {
        Self { store, datastores }
    }

    /// Create or update one resource spec
    #[instrument(skip(self, resource, sink), fields(resource = %resource.name))]
    pub async fn save(
        &self,
        project_id: ProjectId,
        mut resource: ResourceSpec,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<ResourceSpec> {
        let datastore = self.datastores.get_by_name(&resource.datastore_ref)?;
        resource.urn = datastore.generate_urn(&resource)?;

        let outcome = async {
            datastore.create(&resource).await?;
            self.store.save_resource(project_id, &resource).await
        }
        .await;

        match outcome {
            Ok(()) => {
                sink.notify(&Event::ResourceUpdated {
                    resource_name: resource.name.clone(),
                    success: true,
                    message: None,
                });
                Ok(resource)
            }
            Err(e) => {
                sink.notify(&Event::ResourceUpdated {
                    resource_name: resource.name.clone(),
                    success: false,
                    message: Some(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Batch variant used by spec deployment streams; per-resource failures
    /// are collected, the batch continues
    pub async fn save_all(
        &self,
        project_id: ProjectId,
        resources: Vec<ResourceSpec>,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<Vec<(String, optimus_core::Result<ResourceSpec>)>> {
        let mut results = Vec::with_capacity(resources.len());
        for resource in resources {
            let name = resource.name.clone();
            let result = self.save(project_id, resource, sink).await;
            results.push((name, result));
        }
        Ok(results)
    }

    /// Read a resource through its datastore
    pub async fn read(
        &self,
        datastore: &str,
        namespace_id: NamespaceId,
        name: &str,
    ) -> optimus_core::Result<ResourceSpec> {
        self.datastores.read(datastore, namespace_id, name).await
    }

    /// List resources registered under a namespace
    pub async fn list(&self, namespace_id: NamespaceId) -> optimus_core::Result<Vec<ResourceSpec>> {
        self.store.resources_in_namespace(namespace_id).await
    }
}
