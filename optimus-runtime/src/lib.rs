//! # Optimus Runtime
//!
//! The three engines of the Optimus core: job deployment, replay, and
//! backup, together with the dependency resolver that feeds all of them.
//! Engines reach the outside world only through the `optimus-core` traits:
//! the store, the scheduler, the plugin and datastore registries, progress
//! sinks, and the clock.

pub mod backup;
pub mod concurrency;
pub mod deploy;
pub mod external;
pub mod instance;
pub mod metrics;
pub mod priority;
pub mod replay;
pub mod resolver;
pub mod resource;
pub mod service;
pub mod tenant;

pub use backup::BackupService;
pub use concurrency::ConcurrencyLimiter;
pub use deploy::{DeployManager, DeployManagerConfig, Deployer};
pub use external::HttpDependencyChecker;
pub use instance::{InstanceContext, InstanceService};
pub use priority::{PriorityResolver, MAX_PRIORITY_WEIGHT, MIN_PRIORITY_WEIGHT, PRIORITY_WEIGHT_GAP};
pub use replay::{
    ReplayAccepted, ReplayManager, ReplayManagerConfig, ReplayPlan, ReplayPlanner, ReplayState,
    ReplaySyncer, ReplayValidator, ReplayWorker,
};
pub use resolver::{DependencyResolver, ResolutionFailure, ResolutionOutcome};
pub use resource::ResourceService;
pub use service::JobService;
pub use tenant::TenantService;

// the runtime shares the core error taxonomy; engines add scope strings,
// the transport maps kinds onto status codes
pub use optimus_core::{Error, ErrorKind, Result};

/// Named error carried by queue-overflow rejections
pub const ERR_REQUEST_QUEUE_FULL: &str = "ErrRequestQueueFull";

/// Named error carried by replay conflict rejections
pub const ERR_CONFLICTED_JOB_RUN: &str = "ErrConflictedJobRun";
