//! # Optimus Core
//!
//! Domain model and core contracts for the Optimus workflow orchestrator:
//! tenants, job and resource specifications, window math, cron schedules,
//! the plugin and datastore registries, progress events, and the traits
//! through which the engines reach storage and the external scheduler.

pub mod backup;
pub mod clock;
pub mod datastore;
pub mod deployment;
pub mod job;
pub mod plugin;
pub mod progress;
pub mod replay;
pub mod resource;
pub mod schedule;
pub mod scheduler;
pub mod secret;
pub mod store;
pub mod tenant;
pub mod window;

pub use backup::{
    BackupDetail, BackupId, BackupPlan, BackupRequest, BackupResult, BackupSpec, IgnoredResource,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use datastore::{
    BackupOutcome, BackupResourceRequest, BackupResponse, DatastoreRegistry, Datastorer,
};
pub use deployment::{DeployFailure, Deployment, DeploymentDetail, DeploymentId, DeploymentStatus};
pub use job::{
    parse_wire_date, DependencyEdge, DependencyType, EdgeKind, EdgeScope, ExternalDependencies,
    HttpDependency, JobBehavior, JobId, JobMetadata, JobNotifier, JobRetry, JobSchedule, JobSpec,
    JobSpecBuilder, JobSpecDependency, JobSpecHook, JobTask, NotifyOn,
};
pub use plugin::{
    DependencyMod, GenerateDependenciesRequest, GeneratedDependencies, Plugin, PluginInfo,
    PluginRegistry, PluginType,
};
pub use progress::{BufferSink, ChainSink, Event, LogSink, ProgressSink};
pub use replay::{ReplayId, ReplayMessage, ReplayRequest, ReplaySpec, ReplayStatus, ALL_NAMESPACES};
pub use resource::{ResourceId, ResourceSpec};
pub use schedule::ScheduleInterval;
pub use scheduler::{CompiledJob, JobRunStatus, RunState, Scheduler};
pub use secret::{Secret, SecretItem, SYSTEM_DEFINED_SECRET_PREFIX};
pub use store::{
    BackupStore, DeploymentStore, JobDependencyStore, JobSpecStore, NamespaceJobsReplacement,
    NamespaceStore, ProjectStore, ReplayStore, ResourceStore, SecretStore, Store,
};
pub use tenant::{Namespace, NamespaceId, Project, ProjectId};
pub use window::Window;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a core error, mapped one-to-one onto RPC status codes
/// by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    AlreadyExists,
    FailedPrecondition,
    Unavailable,
    Internal,
}

/// Error type shared across the Optimus core.
///
/// Each variant carries a human-readable message prefixed with a short
/// operation context, e.g. `"unable to get namespace: finance"`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(scope: &str, detail: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{}: {}", scope, detail))
    }

    pub fn invalid_argument(scope: &str, detail: impl std::fmt::Display) -> Self {
        Error::InvalidArgument(format!("{}: {}", scope, detail))
    }

    pub fn already_exists(scope: &str, detail: impl std::fmt::Display) -> Self {
        Error::AlreadyExists(format!("{}: {}", scope, detail))
    }

    pub fn failed_precondition(scope: &str, detail: impl std::fmt::Display) -> Self {
        Error::FailedPrecondition(format!("{}: {}", scope, detail))
    }

    pub fn unavailable(scope: &str, detail: impl std::fmt::Display) -> Self {
        Error::Unavailable(format!("{}: {}", scope, detail))
    }

    pub fn internal(scope: &str, detail: impl std::fmt::Display) -> Self {
        Error::Internal(format!("{}: {}", scope, detail))
    }

    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}
