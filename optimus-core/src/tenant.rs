//! Project and namespace definitions
//!
//! Projects partition the deployment surface; namespaces group jobs and
//! resources under a project. Config maps on both levels use upper-cased
//! string keys, normalized on ingress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    /// Create a new random project ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier for a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub Uuid);

impl NamespaceId {
    /// Create a new random namespace ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NamespaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A project is the unit of isolation for jobs, resources and secrets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: ProjectId,

    /// Human-readable name, unique across the deployment
    pub name: String,

    /// Project-level configuration, keys upper-cased on ingress
    pub config: HashMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            config: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the project config, normalizing keys to upper case
    pub fn with_config(mut self, config: HashMap<String, String>) -> Self {
        self.config = normalize_config(config);
        self
    }

    /// Look up a config value by its (upper-cased) key
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.config.get(&key.to_uppercase()).map(String::as_str)
    }
}

/// A namespace groups jobs and resources under a project.
/// Uniqueness: `(project_id, name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Namespace {
    /// Unique identifier
    pub id: NamespaceId,

    /// Human-readable name, unique within the project
    pub name: String,

    /// Owning project
    pub project_id: ProjectId,

    /// Namespace-level configuration, keys upper-cased on ingress
    pub config: HashMap<String, String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Namespace {
    /// Create a new namespace under the given project
    pub fn new(name: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            id: NamespaceId::new(),
            name: name.into(),
            project_id,
            config: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the namespace config, normalizing keys to upper case
    pub fn with_config(mut self, config: HashMap<String, String>) -> Self {
        self.config = normalize_config(config);
        self
    }

    /// Look up a config value by its (upper-cased) key
    pub fn get_config(&self, key: &str) -> Option<&str> {
        self.config.get(&key.to_uppercase()).map(String::as_str)
    }
}

/// Recognized project/namespace config keys
pub mod config_keys {
    /// Bucket used for compiled asset storage
    pub const BUCKET: &str = "BUCKET";
    /// Path within the bucket for compiled artifacts
    pub const STORAGE_PATH: &str = "STORAGE_PATH";
    /// Base URL of the external scheduler
    pub const SCHEDULER_HOST: &str = "SCHEDULER_HOST";
}

/// Upper-case all keys of a config map
pub fn normalize_config(config: HashMap<String, String>) -> HashMap<String, String> {
    config
        .into_iter()
        .map(|(k, v)| (k.to_uppercase(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_config_keys_upper_cased() {
        let mut config = HashMap::new();
        config.insert("scheduler_host".to_string(), "http://airflow:8080".to_string());
        let project = Project::new("sample-project").with_config(config);

        assert_eq!(
            project.get_config(config_keys::SCHEDULER_HOST),
            Some("http://airflow:8080")
        );
        assert!(project.config.contains_key("SCHEDULER_HOST"));
        assert!(!project.config.contains_key("scheduler_host"));
    }

    #[test]
    fn test_namespace_belongs_to_project() {
        let project = Project::new("sample-project");
        let namespace = Namespace::new("finance", project.id);

        assert_eq!(namespace.project_id, project.id);
        assert_eq!(namespace.name, "finance");
    }

    #[test]
    fn test_config_lookup_is_case_insensitive_on_query() {
        let mut config = HashMap::new();
        config.insert("BUCKET".to_string(), "gs://optimus".to_string());
        let namespace = Namespace::new("finance", ProjectId::new()).with_config(config);

        assert_eq!(namespace.get_config("bucket"), Some("gs://optimus"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut config = HashMap::new();
        config.insert("BUCKET".to_string(), "gs://optimus".to_string());
        let project = Project::new("sample-project").with_config(config);

        let json = serde_json::to_string(&project).unwrap();
        let deserialized: Project = serde_json::from_str(&json).unwrap();

        assert_eq!(project.id, deserialized.id);
        assert_eq!(project.config, deserialized.config);
    }
}
