//! Tenant service
//!
//! Registration flows for projects, namespaces and secrets. Config keys
//! normalize to upper case on ingress; secret values arrive base64-encoded
//! and are validated before they touch the store.

use optimus_core::store::*;
use optimus_core::{Namespace, NamespaceId, Project, ProjectId, Secret};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Facade over project, namespace and secret registration
pub struct TenantService {
    store: Arc<dyn Store>,
}

impl TenantService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Register or update a project by name
    #[instrument(skip(self, config))]
    pub async fn register_project(
        &self,
        name: &str,
        config: HashMap<String, String>,
    ) -> optimus_core::Result<Project> {
        if name.is_empty() {
            return Err(optimus_core::Error::invalid_argument(
                "unable to register project",
                "project name cannot be empty",
            ));
        }
        let project = Project::new(name).with_config(config);
        self.store.save_project(&project).await?;
        // the stored row wins on id when the name already existed
        let stored = self.store.get_project_by_name(name).await?;
        info!(project = %stored.name, "project registered");
        Ok(stored)
    }

    pub async fn get_project(&self, name: &str) -> optimus_core::Result<Project> {
        self.store.get_project_by_name(name).await
    }

    pub async fn list_projects(&self) -> optimus_core::Result<Vec<Project>> {
        self.store.all_projects().await
    }

    /// Register or update a namespace under a project
    #[instrument(skip(self, config))]
    pub async fn register_namespace(
        &self,
        project_id: ProjectId,
        name: &str,
        config: HashMap<String, String>,
    ) -> optimus_core::Result<Namespace> {
        if name.is_empty() {
            return Err(optimus_core::Error::invalid_argument(
                "unable to register namespace",
                "namespace name cannot be empty",
            ));
        }
        // the project must exist first
        self.store.get_project_by_id(project_id).await?;
        let namespace = Namespace::new(name, project_id).with_config(config);
        self.store.save_namespace(&namespace).await?;
        self.store.get_namespace(project_id, name).await
    }

    pub async fn list_namespaces(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<Namespace>> {
        self.store.namespaces_in_project(project_id).await
    }

    /// Register a new secret from its wire form; duplicate names are
    /// rejected with `AlreadyExists`
    #[instrument(skip(self, encoded_value))]
    pub async fn register_secret(
        &self,
        project_id: ProjectId,
        name: &str,
        encoded_value: &str,
        namespace_id: Option<NamespaceId>,
    ) -> optimus_core::Result<()> {
        let secret = Secret::from_wire(name, encoded_value, project_id, namespace_id)?;
        self.store.save_secret(&secret).await
    }

    /// Update an existing secret from its wire form
    #[instrument(skip(self, encoded_value))]
    pub async fn update_secret(
        &self,
        project_id: ProjectId,
        name: &str,
        encoded_value: &str,
        namespace_id: Option<NamespaceId>,
    ) -> optimus_core::Result<()> {
        let secret = Secret::from_wire(name, encoded_value, project_id, namespace_id)?;
        self.store.update_secret(&secret).await
    }

    /// Secret names visible in a project; values never leave the store
    pub async fn list_secret_names(
        &self,
        project_id: ProjectId,
    ) -> optimus_core::Result<Vec<String>> {
        Ok(self
            .store
            .secrets_in_project(project_id)
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    pub async fn delete_secret(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> optimus_core::Result<()> {
        self.store.delete_secret(project_id, name).await
    }
}
