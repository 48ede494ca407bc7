//! Job specification model
//!
//! A job is a scheduled transformation: a task plugin with an ordered config,
//! a read window, optional hooks, and dependencies on other jobs. Specs are
//! owned by a namespace and unique by name within a project.

use crate::tenant::NamespaceId;
use crate::window::Window;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Wire format for schedule and replay window dates
pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Unique identifier for a job spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Parse a `YYYY-MM-DD` wire date as midnight UTC
pub fn parse_wire_date(s: &str) -> crate::Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, WIRE_DATE_FORMAT).map_err(|e| {
        crate::Error::invalid_argument(
            "unable to parse date",
            format!("'{}' is not in YYYY-MM-DD form: {}", s, e),
        )
    })?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists");
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Scheduling rule for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSchedule {
    /// Cron interval, standard 5-field form
    pub interval: String,

    /// First scheduled date (inclusive)
    pub start_date: DateTime<Utc>,

    /// Optional last scheduled date
    pub end_date: Option<DateTime<Utc>>,
}

impl JobSchedule {
    pub fn new(interval: impl Into<String>, start_date: DateTime<Utc>) -> Self {
        Self {
            interval: interval.into(),
            start_date,
            end_date: None,
        }
    }
}

/// Retry rule applied by the scheduler on task failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRetry {
    pub count: u32,
    pub delay_secs: u32,
    pub exponential_backoff: bool,
}

/// Events a notifier can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOn {
    Failure,
    SlaMiss,
}

/// Notification channel subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNotifier {
    pub on: NotifyOn,
    pub channels: Vec<String>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// Behavioral flags for a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBehavior {
    pub depends_on_past: bool,
    pub catch_up: bool,
    #[serde(default)]
    pub retry: JobRetry,
    #[serde(default)]
    pub notify: Vec<JobNotifier>,
}

/// The transformation task of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    /// Name of the task plugin in the registry
    pub plugin_ref: String,

    /// Ordered task configuration, preserved as authored
    pub config: Vec<(String, String)>,

    /// Read window rule
    pub window: Window,

    /// Priority weight handed to the scheduler; derived, not authored
    #[serde(default)]
    pub priority: i32,
}

impl JobTask {
    pub fn new(plugin_ref: impl Into<String>) -> Self {
        Self {
            plugin_ref: plugin_ref.into(),
            config: Vec::new(),
            window: Window::default(),
            priority: 0,
        }
    }
}

/// A hook attached to a job, run before or after the task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpecHook {
    pub plugin_ref: String,
    pub config: Vec<(String, String)>,
}

/// Whether a static dependency points inside or outside the project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Intra,
    Inter,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Intra => write!(f, "intra"),
            DependencyType::Inter => write!(f, "inter"),
        }
    }
}

/// A dependency on another job, keyed by job name in the spec.
/// `inferred` marks entries added by the resolver; authored entries keep it
/// false so every resolver pass can rebuild from the static set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpecDependency {
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    #[serde(default)]
    pub inferred: bool,
}

/// An HTTP sensor dependency: an opaque edge evaluated by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpDependency {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Dependencies evaluated outside the job graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalDependencies {
    #[serde(default)]
    pub http: Vec<HttpDependency>,
}

/// Requested/limited compute for a job container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// Resource metadata attached to a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    #[serde(default)]
    pub request: ResourceConfig,
    #[serde(default)]
    pub limit: ResourceConfig,
}

/// Scheduler placement metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirflowMetadata {
    pub pool: Option<String>,
    pub queue: Option<String>,
}

/// Free-form metadata attached to a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default)]
    pub resource: ResourceMetadata,
    #[serde(default)]
    pub airflow: AirflowMetadata,
}

/// Kind of a derived dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Inferred,
    Static,
    Http,
}

/// Scope of a derived dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeScope {
    Intra,
    InterNamespace,
    InterProject,
}

/// A derived dependency edge, persisted flat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    /// Depending job name
    pub from: String,
    /// Upstream job name or resource URN (http edges keep the sensor name)
    pub to: String,
    pub kind: EdgeKind,
    pub scope: EdgeScope,
}

/// A job specification.
///
/// `dependencies` starts as the statically authored map and is enriched by
/// the dependency resolver with inferred upstreams; `dependents` is the
/// derived reverse index and is never authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique identifier
    pub id: JobId,

    /// Spec version, bumped on update
    pub version: i32,

    /// Job name, unique within the project
    pub name: String,

    /// Owner of the job (email or group)
    pub owner: String,

    /// Description of the job
    #[serde(default)]
    pub description: String,

    /// Labels for categorization
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Scheduling rule
    pub schedule: JobSchedule,

    /// Behavioral flags
    #[serde(default)]
    pub behavior: JobBehavior,

    /// The transformation task
    pub task: JobTask,

    /// Asset files shipped with the job, keyed by filename
    #[serde(default)]
    pub assets: HashMap<String, String>,

    /// Hooks attached to the job
    #[serde(default)]
    pub hooks: Vec<JobSpecHook>,

    /// Dependencies on other jobs, keyed by job name
    #[serde(default)]
    pub dependencies: HashMap<String, JobSpecDependency>,

    /// Dependencies evaluated outside the job graph
    #[serde(default)]
    pub external_dependencies: ExternalDependencies,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: JobMetadata,

    /// Owning namespace
    pub namespace_id: NamespaceId,

    /// URN this job writes to; derived by the resolver, never authored
    #[serde(default)]
    pub destination: Option<String>,

    /// Names of jobs depending on this one; derived by the resolver
    #[serde(default)]
    pub dependents: Vec<String>,
}

impl JobSpec {
    /// Create a builder for constructing a job spec with a fluent API
    pub fn builder(name: impl Into<String>) -> JobSpecBuilder {
        JobSpecBuilder::new(name)
    }

    /// Validate the spec shape: window, interval, and date ordering
    pub fn validate(&self) -> crate::Result<()> {
        crate::schedule::ScheduleInterval::parse(&self.schedule.interval)?;
        self.task.window.validate()?;
        if let Some(end) = self.schedule.end_date {
            if end < self.schedule.start_date {
                return Err(crate::Error::invalid_argument(
                    "unable to validate job",
                    format!(
                        "job {} has end_date before start_date",
                        self.name
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for constructing job specs with a fluent API
pub struct JobSpecBuilder {
    name: String,
    version: i32,
    owner: String,
    description: String,
    labels: HashMap<String, String>,
    schedule: JobSchedule,
    behavior: JobBehavior,
    task: JobTask,
    assets: HashMap<String, String>,
    hooks: Vec<JobSpecHook>,
    dependencies: HashMap<String, JobSpecDependency>,
    external_dependencies: ExternalDependencies,
    metadata: JobMetadata,
    namespace_id: NamespaceId,
}

impl JobSpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 1,
            owner: String::new(),
            description: String::new(),
            labels: HashMap::new(),
            schedule: JobSchedule::new(
                "0 2 * * *",
                Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            ),
            behavior: JobBehavior::default(),
            task: JobTask::new("noop"),
            assets: HashMap::new(),
            hooks: Vec::new(),
            dependencies: HashMap::new(),
            external_dependencies: ExternalDependencies::default(),
            metadata: JobMetadata::default(),
            namespace_id: NamespaceId::new(),
        }
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn schedule(mut self, interval: impl Into<String>, start_date: DateTime<Utc>) -> Self {
        self.schedule = JobSchedule::new(interval, start_date);
        self
    }

    pub fn end_date(mut self, end_date: DateTime<Utc>) -> Self {
        self.schedule.end_date = Some(end_date);
        self
    }

    pub fn behavior(mut self, behavior: JobBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn task(mut self, plugin_ref: impl Into<String>) -> Self {
        self.task.plugin_ref = plugin_ref.into();
        self
    }

    pub fn task_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.task.config.push((key.into(), value.into()));
        self
    }

    pub fn window(mut self, window: Window) -> Self {
        self.task.window = window;
        self
    }

    pub fn asset(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.assets.insert(name.into(), content.into());
        self
    }

    pub fn hook(mut self, hook: JobSpecHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn depends_on(mut self, job_name: impl Into<String>, dep_type: DependencyType) -> Self {
        self.dependencies.insert(
            job_name.into(),
            JobSpecDependency {
                dep_type,
                inferred: false,
            },
        );
        self
    }

    pub fn http_dependency(mut self, dep: HttpDependency) -> Self {
        self.external_dependencies.http.push(dep);
        self
    }

    pub fn metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn namespace_id(mut self, namespace_id: NamespaceId) -> Self {
        self.namespace_id = namespace_id;
        self
    }

    pub fn build(self) -> JobSpec {
        JobSpec {
            id: JobId::new(),
            version: self.version,
            name: self.name,
            owner: self.owner,
            description: self.description,
            labels: self.labels,
            schedule: self.schedule,
            behavior: self.behavior,
            task: self.task,
            assets: self.assets,
            hooks: self.hooks,
            dependencies: self.dependencies,
            external_dependencies: self.external_dependencies,
            metadata: self.metadata,
            namespace_id: self.namespace_id,
            destination: None,
            dependents: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wire_date() {
        let date = parse_wire_date("2020-11-25").unwrap();
        assert_eq!(date, Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_wire_date_rejects_timestamp() {
        assert!(parse_wire_date("2020-11-25T02:00:00Z").is_err());
        assert!(parse_wire_date("25-11-2020").is_err());
    }

    #[test]
    fn test_builder_basic() {
        let job = JobSpec::builder("job-A")
            .owner("data-team@example.com")
            .task("bq2bq")
            .task_config("SQL_TYPE", "STANDARD")
            .task_config("DATASET", "playground")
            .build();

        assert_eq!(job.name, "job-A");
        assert_eq!(job.task.plugin_ref, "bq2bq");
        // task config order is preserved as authored
        assert_eq!(job.task.config[0].0, "SQL_TYPE");
        assert_eq!(job.task.config[1].0, "DATASET");
        assert!(job.dependents.is_empty());
    }

    #[test]
    fn test_validate_accepts_well_formed_spec() {
        let job = JobSpec::builder("job-A")
            .schedule("0 2 * * *", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .build();
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_end_before_start() {
        let job = JobSpec::builder("job-A")
            .schedule("0 2 * * *", Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap())
            .end_date(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .build();
        assert!(matches!(
            job.validate(),
            Err(crate::Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_interval() {
        let job = JobSpec::builder("job-A")
            .schedule("whenever", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .build();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_serialization_round_trip_preserves_config_order() {
        let job = JobSpec::builder("job-A")
            .task("bq2bq")
            .task_config("B", "2")
            .task_config("A", "1")
            .depends_on("job-B", DependencyType::Intra)
            .build();

        let json = serde_json::to_string(&job).unwrap();
        let deserialized: JobSpec = serde_json::from_str(&json).unwrap();

        assert_eq!(job, deserialized);
        assert_eq!(deserialized.task.config[0], ("B".to_string(), "2".to_string()));
    }
}
