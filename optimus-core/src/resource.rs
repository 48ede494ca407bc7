//! Resource specification model
//!
//! Resources are typed data artifacts (tables, datasets, views) persisted by
//! a datastore. The URN is derived by the datastore adapter, never authored.

use crate::tenant::NamespaceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a resource spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub Uuid);

impl ResourceId {
    /// Create a new random resource ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A resource specification.
/// Uniqueness: `(datastore, name)` within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Unique identifier
    pub id: ResourceId,

    /// Spec version, bumped on update
    pub version: i32,

    /// Resource name, e.g. `project.dataset.table`
    pub name: String,

    /// Resource type understood by the datastore, e.g. `table`, `view`
    pub resource_type: String,

    /// Name of the owning datastore in the registry
    pub datastore_ref: String,

    /// Globally unique identifier derived by the datastore
    pub urn: String,

    /// Asset files attached to the resource, keyed by filename
    #[serde(default)]
    pub assets: HashMap<String, String>,

    /// Labels for categorization
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Owning namespace
    pub namespace_id: NamespaceId,
}

impl ResourceSpec {
    pub fn new(
        name: impl Into<String>,
        resource_type: impl Into<String>,
        datastore_ref: impl Into<String>,
        namespace_id: NamespaceId,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            version: 1,
            name: name.into(),
            resource_type: resource_type.into(),
            datastore_ref: datastore_ref.into(),
            urn: String::new(),
            assets: HashMap::new(),
            labels: HashMap::new(),
            namespace_id,
        }
    }

    /// Set the derived URN
    pub fn with_urn(mut self, urn: impl Into<String>) -> Self {
        self.urn = urn.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_creation() {
        let resource = ResourceSpec::new(
            "playground.events",
            "table",
            "bigquery",
            NamespaceId::new(),
        )
        .with_urn("bigquery://playground.events");

        assert_eq!(resource.resource_type, "table");
        assert_eq!(resource.urn, "bigquery://playground.events");
        assert_eq!(resource.version, 1);
    }

    #[test]
    fn test_serialization_round_trip() {
        let resource = ResourceSpec::new("playground.events", "table", "bigquery", NamespaceId::new());
        let json = serde_json::to_string(&resource).unwrap();
        let deserialized: ResourceSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(resource, deserialized);
    }
}
