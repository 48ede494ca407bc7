//! Backup model
//!
//! A backup snapshots a resource and selected downstream resources. Records
//! are immutable once created; pruning happens externally per TTL.

use crate::tenant::{NamespaceId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Backup config key: retention period for the snapshot
pub const CONFIG_TTL: &str = "TTL";

/// Backup config key: whether downstream resources were skipped
pub const CONFIG_IGNORE_DOWNSTREAM: &str = "IGNORE_DOWNSTREAM";

/// Unique identifier for a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupId(pub Uuid);

impl BackupId {
    /// Create a new random backup ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackupId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BackupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Where one backed-up resource landed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDetail {
    /// URN of the produced snapshot
    pub urn: String,
    /// Datastore-specific detail of the snapshot
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// A backup record as persisted. `result` holds one entry per resource
/// actually backed up (source plus dependents), keyed by source URN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSpec {
    /// Unique identifier
    pub id: BackupId,

    /// URN of the resource the backup was requested for
    pub resource_urn: String,

    /// Resource name as requested
    pub resource_name: String,

    /// Human description of the backup
    #[serde(default)]
    pub description: String,

    /// Owning project
    pub project_id: ProjectId,

    /// Datastore owning the resource
    pub datastore_ref: String,

    /// Backup configuration: `TTL`, `IGNORE_DOWNSTREAM`, datastore extras
    #[serde(default)]
    pub config: HashMap<String, String>,

    /// Snapshot landing places keyed by source URN
    #[serde(default)]
    pub result: HashMap<String, BackupDetail>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl BackupSpec {
    /// Look up the snapshot detail for a source URN, failing the way status
    /// endpoints surface a corrupt record.
    pub fn detail_for(&self, source_urn: &str) -> crate::Result<&BackupDetail> {
        self.result.get(source_urn).ok_or_else(|| {
            crate::Error::internal(
                "unable to read backup",
                format!("URN {} not found in backup result", source_urn),
            )
        })
    }
}

/// A backup request
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub project_id: ProjectId,
    pub namespace_id: NamespaceId,
    pub resource_name: String,
    pub datastore_ref: String,
    pub description: String,
    /// Downstream namespaces allowed in the walk; `["*"]` allows all
    pub allowed_downstream_namespaces: Vec<String>,
    pub config: HashMap<String, String>,
}

impl BackupRequest {
    /// Whether the given namespace passes the downstream allow-list
    pub fn allows_namespace(&self, namespace_name: &str) -> bool {
        self.allowed_downstream_namespaces
            .iter()
            .any(|allowed| allowed == crate::replay::ALL_NAMESPACES || allowed == namespace_name)
    }
}

/// Result of a dry-run backup plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupPlan {
    /// URNs that would be backed up
    pub resources: Vec<String>,
    /// URNs skipped, with the reason
    pub ignored: Vec<IgnoredResource>,
}

/// A resource excluded from a backup plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoredResource {
    pub urn: String,
    pub reason: String,
}

/// Result of an executed backup
#[derive(Debug, Clone, Default)]
pub struct BackupResult {
    /// The persisted record id
    pub id: Option<BackupId>,
    /// URNs of produced snapshots
    pub resources: Vec<String>,
    /// URNs skipped, with the reason
    pub ignored: Vec<IgnoredResource>,
}
