//! Dependency resolver
//!
//! Resolves every job of a project in one pass: plugin-inferred upstreams,
//! statically declared dependencies, and HTTP sensor edges. Populates each
//! spec's `dependencies`, `dependents` and `destination`, persists the flat
//! edge set, and runs cycle detection over the result. Non-fatal failures
//! are collected per job so the whole project can be analyzed at once.

use optimus_core::plugin::GenerateDependenciesRequest;
use optimus_core::store::*;
use optimus_core::{
    DependencyEdge, DependencyType, EdgeKind, EdgeScope, Event, JobSpec, JobSpecDependency,
    NamespaceId, PluginRegistry, Project, ProgressSink, SecretItem,
};
use optimus_lineage::MultiRootTree;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Separator of `project/job` references in static inter-project entries
const INTER_DEPENDENCY_SEPARATOR: char = '/';

const UNKNOWN_DEPENDENCY_MESSAGE: &str = "could not find registered destination";

/// One job's resolution failure
#[derive(Debug, Clone)]
pub struct ResolutionFailure {
    pub job_name: String,
    pub reason: String,
    /// Whether the failure is an unknown-dependency classification rather
    /// than a plugin or store error
    pub unknown_dependency: bool,
}

/// Result of a whole-project resolution pass
#[derive(Debug, Default)]
pub struct ResolutionOutcome {
    /// Every job of the project with dependencies, dependents and
    /// destination populated, as persisted
    pub jobs: Vec<JobSpec>,
    /// Per-job non-fatal failures
    pub failures: Vec<ResolutionFailure>,
    /// Formatted cycle message when the resolved graph is cyclic
    pub cycle_message: Option<String>,
    /// Names of every job on a cycle
    pub cycle_members: HashSet<String>,
}

impl ResolutionOutcome {
    /// Failures recorded against one job
    pub fn failures_for(&self, job_name: &str) -> Vec<&ResolutionFailure> {
        self.failures
            .iter()
            .filter(|f| f.job_name == job_name)
            .collect()
    }

    /// Whether a job resolved cleanly and sits on no cycle
    pub fn is_resolved(&self, job_name: &str) -> bool {
        !self.cycle_members.contains(job_name) && self.failures_for(job_name).is_empty()
    }
}

/// Resolves inter-job dependencies across a project
pub struct DependencyResolver {
    registry: PluginRegistry,
    store: Arc<dyn Store>,
}

impl DependencyResolver {
    pub fn new(registry: PluginRegistry, store: Arc<dyn Store>) -> Self {
        Self { registry, store }
    }

    /// Run the plugin's dependency generation for a single job without
    /// touching the store. Used by validation-only paths.
    pub async fn generate_for_job(
        &self,
        project: &Project,
        job: &JobSpec,
    ) -> optimus_core::Result<Option<optimus_core::GeneratedDependencies>> {
        let plugin = self.registry.get_by_name(&job.task.plugin_ref)?;
        let Some(dep_mod) = plugin.dependency_mod.as_ref() else {
            return Ok(None);
        };
        let secrets = self.visible_secrets(project).await?;
        let generated = dep_mod
            .generate_dependencies(GenerateDependenciesRequest {
                config: job.task.config.clone(),
                assets: job.assets.clone(),
                project_config: project.config.clone(),
                secrets,
            })
            .await?;
        Ok(Some(generated))
    }

    /// Resolve and persist the whole project.
    #[instrument(skip(self, sink), fields(project = %project.name))]
    pub async fn resolve_project(
        &self,
        project: &Project,
        sink: &dyn ProgressSink,
    ) -> optimus_core::Result<ResolutionOutcome> {
        let mut jobs = self.store.jobs_in_project(project.id).await?;
        let secrets = self.visible_secrets(project).await?;

        let mut outcome = ResolutionOutcome::default();

        // phase 1: plugin-derived destination and upstream URNs per job
        let mut destinations: HashMap<String, String> = HashMap::new();
        let mut inferred_upstreams: HashMap<String, Vec<String>> = HashMap::new();
        for job in &jobs {
            match self.generate(project, job, &secrets).await {
                Ok(Some(generated)) => {
                    destinations.insert(job.name.clone(), generated.destination_urn);
                    inferred_upstreams.insert(job.name.clone(), generated.upstream_urns);
                }
                Ok(None) => {}
                Err(e) => {
                    let reason = format!("unable to generate dependencies: {}", e);
                    sink.notify(&Event::JobDependencyResolutionFailed {
                        job_name: job.name.clone(),
                        reason: reason.clone(),
                    });
                    outcome.failures.push(ResolutionFailure {
                        job_name: job.name.clone(),
                        reason,
                        unknown_dependency: false,
                    });
                }
            }
        }

        let urn_index: HashMap<&str, &str> = destinations
            .iter()
            .map(|(job_name, urn)| (urn.as_str(), job_name.as_str()))
            .collect();
        let namespace_by_job: HashMap<String, NamespaceId> = jobs
            .iter()
            .map(|j| (j.name.clone(), j.namespace_id))
            .collect();
        let job_names: HashSet<String> = jobs.iter().map(|j| j.name.clone()).collect();

        // phase 2: classification and merge
        let mut edges_by_job: HashMap<String, Vec<DependencyEdge>> = HashMap::new();
        for job in &mut jobs {
            // rebuild from the authored set; inferred entries are re-derived
            job.dependencies.retain(|_, dep| !dep.inferred);
            let statics = job.dependencies.clone();
            let edges = edges_by_job.entry(job.name.clone()).or_default();

            for urn in inferred_upstreams.get(&job.name).cloned().unwrap_or_default() {
                if let Some(producer) = urn_index.get(urn.as_str()) {
                    if *producer == job.name {
                        // a job reading its own output is not an edge
                        continue;
                    }
                    let scope = if namespace_by_job.get(*producer) == Some(&job.namespace_id) {
                        EdgeScope::Intra
                    } else {
                        EdgeScope::InterNamespace
                    };
                    job.dependencies.insert(
                        producer.to_string(),
                        JobSpecDependency {
                            dep_type: DependencyType::Intra,
                            inferred: true,
                        },
                    );
                    edges.push(DependencyEdge {
                        from: job.name.clone(),
                        to: producer.to_string(),
                        kind: EdgeKind::Inferred,
                        scope,
                    });
                    continue;
                }

                match self.classify_foreign_urn(project, job, &urn, &statics).await? {
                    Some(edge) => edges.push(edge),
                    None => {
                        let reason = format!(
                            "{} '{}' during compiling dependencies for the provided job '{}'",
                            UNKNOWN_DEPENDENCY_MESSAGE, urn, job.name
                        );
                        warn!(job = %job.name, urn = %urn, "unknown dependency used");
                        sink.notify(&Event::JobSpecUnknownDependencyUsed {
                            job_name: job.name.clone(),
                            dependency: urn.clone(),
                        });
                        outcome.failures.push(ResolutionFailure {
                            job_name: job.name.clone(),
                            reason,
                            unknown_dependency: true,
                        });
                    }
                }
            }

            // statically declared dependencies
            for (dep_name, dep) in &statics {
                match dep.dep_type {
                    DependencyType::Intra => {
                        if !job_names.contains(dep_name) {
                            let reason = format!("unknown local dependency for job {}: {}", job.name, dep_name);
                            sink.notify(&Event::JobDependencyResolutionFailed {
                                job_name: job.name.clone(),
                                reason: reason.clone(),
                            });
                            outcome.failures.push(ResolutionFailure {
                                job_name: job.name.clone(),
                                reason,
                                unknown_dependency: false,
                            });
                            continue;
                        }
                        let scope = if namespace_by_job.get(dep_name) == Some(&job.namespace_id) {
                            EdgeScope::Intra
                        } else {
                            EdgeScope::InterNamespace
                        };
                        edges.push(DependencyEdge {
                            from: job.name.clone(),
                            to: dep_name.clone(),
                            kind: EdgeKind::Static,
                            scope,
                        });
                    }
                    DependencyType::Inter => {
                        match self.resolve_inter_project(dep_name).await {
                            Ok(()) => edges.push(DependencyEdge {
                                from: job.name.clone(),
                                to: dep_name.clone(),
                                kind: EdgeKind::Static,
                                scope: EdgeScope::InterProject,
                            }),
                            Err(reason) => {
                                sink.notify(&Event::JobDependencyResolutionFailed {
                                    job_name: job.name.clone(),
                                    reason: reason.clone(),
                                });
                                outcome.failures.push(ResolutionFailure {
                                    job_name: job.name.clone(),
                                    reason,
                                    unknown_dependency: false,
                                });
                            }
                        }
                    }
                }
            }

            // http sensors stay opaque: an edge, never a tree node
            for http in &job.external_dependencies.http {
                edges.push(DependencyEdge {
                    from: job.name.clone(),
                    to: http.name.clone(),
                    kind: EdgeKind::Http,
                    scope: EdgeScope::Intra,
                });
            }

            if let Some(urn) = destinations.get(&job.name) {
                job.destination = Some(urn.clone());
            }
        }

        // reverse index: dependents of J = every K whose dependencies name J
        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for job in &jobs {
            for dep_name in job.dependencies.keys() {
                if job_names.contains(dep_name) {
                    dependents
                        .entry(dep_name.clone())
                        .or_default()
                        .push(job.name.clone());
                }
            }
        }
        for job in &mut jobs {
            let mut names = dependents.remove(&job.name).unwrap_or_default();
            names.sort_unstable();
            names.dedup();
            job.dependents = names;
        }

        // cycle detection over intra-project job edges
        let mut forest = MultiRootTree::new();
        for job in &jobs {
            forest.add_node(job.name.as_str());
            for dep_name in job.dependencies.keys() {
                if job_names.contains(dep_name) {
                    forest.connect(dep_name, &job.name);
                }
            }
        }
        outcome.cycle_members = forest.nodes_on_cycles();
        if let Some(path) = forest.detect_cycle() {
            outcome.cycle_message = Some(format!("cycle: {}", path.join(" -> ")));
        }

        // persist specs, destinations and flat edges
        for job in &mut jobs {
            let saved = self.store.save_job(project.id, job).await?;
            job.id = saved.id;
            if let Some(urn) = destinations.get(&job.name) {
                self.store.set_job_destination(job.id, urn).await?;
            }
            let edges = edges_by_job.remove(&job.name).unwrap_or_default();
            self.store
                .replace_job_dependencies(project.id, job.id, &edges)
                .await?;

            if outcome.is_resolved(&job.name) {
                debug!(job = %job.name, "dependencies resolved");
                sink.notify(&Event::JobDependencyResolved {
                    job_name: job.name.clone(),
                });
            }
        }

        outcome.jobs = jobs;
        Ok(outcome)
    }

    async fn generate(
        &self,
        project: &Project,
        job: &JobSpec,
        secrets: &[SecretItem],
    ) -> optimus_core::Result<Option<optimus_core::GeneratedDependencies>> {
        let plugin = self.registry.get_by_name(&job.task.plugin_ref)?;
        let Some(dep_mod) = plugin.dependency_mod.as_ref() else {
            return Ok(None);
        };
        let generated = dep_mod
            .generate_dependencies(GenerateDependenciesRequest {
                config: job.task.config.clone(),
                assets: job.assets.clone(),
                project_config: project.config.clone(),
                secrets: secrets.to_vec(),
            })
            .await?;
        Ok(Some(generated))
    }

    /// A URN produced outside this project is legal only when the job
    /// declares the producer as an explicit static `inter` dependency.
    async fn classify_foreign_urn(
        &self,
        project: &Project,
        job: &JobSpec,
        urn: &str,
        statics: &HashMap<String, JobSpecDependency>,
    ) -> optimus_core::Result<Option<DependencyEdge>> {
        for other in self.store.all_projects().await? {
            if other.id == project.id {
                continue;
            }
            let Ok(producer) = self.store.get_job_by_destination(other.id, urn).await else {
                continue;
            };
            let reference = format!("{}{}{}", other.name, INTER_DEPENDENCY_SEPARATOR, producer.name);
            let declared = statics
                .get(&reference)
                .map(|d| d.dep_type == DependencyType::Inter)
                .unwrap_or(false);
            if declared {
                return Ok(Some(DependencyEdge {
                    from: job.name.clone(),
                    to: reference,
                    kind: EdgeKind::Inferred,
                    scope: EdgeScope::InterProject,
                }));
            }
            return Ok(None);
        }
        Ok(None)
    }

    /// Validate a static `project/job` reference against the store
    async fn resolve_inter_project(&self, reference: &str) -> Result<(), String> {
        let Some((project_name, job_name)) = reference.split_once(INTER_DEPENDENCY_SEPARATOR)
        else {
            return Err(format!(
                "unknown cross project dependency: '{}' is not in project/job form",
                reference
            ));
        };
        let project = self
            .store
            .get_project_by_name(project_name)
            .await
            .map_err(|_| format!("unknown cross project dependency: {}", reference))?;
        self.store
            .get_job_by_name(project.id, job_name)
            .await
            .map_err(|_| format!("unknown cross project dependency: {}", reference))?;
        Ok(())
    }

    async fn visible_secrets(&self, project: &Project) -> optimus_core::Result<Vec<SecretItem>> {
        Ok(self
            .store
            .secrets_in_project(project.id)
            .await?
            .into_iter()
            .map(|s| SecretItem {
                name: s.name,
                value: s.value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use optimus_core::plugin::{DependencyMod, GeneratedDependencies, Plugin, PluginInfo};
    use optimus_core::{BufferSink, DependencyType};
    use optimus_storage::InMemoryStore;

    /// Scripted dependency generator: destination and upstreams read from
    /// the job's task config
    struct ConfigDrivenMod;

    #[async_trait]
    impl DependencyMod for ConfigDrivenMod {
        async fn generate_dependencies(
            &self,
            request: GenerateDependenciesRequest,
        ) -> optimus_core::Result<GeneratedDependencies> {
            let mut out = GeneratedDependencies::default();
            for (key, value) in &request.config {
                match key.as_str() {
                    "DESTINATION" => out.destination_urn = value.clone(),
                    "UPSTREAM" => out
                        .upstream_urns
                        .extend(value.split(',').map(str::to_string)),
                    _ => {}
                }
            }
            Ok(out)
        }
    }

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry
            .register(
                Plugin::new(PluginInfo::task("bq2bq", "odpf/bq2bq:latest"))
                    .with_dependency_mod(Arc::new(ConfigDrivenMod)),
            )
            .unwrap();
        registry
    }

    async fn setup() -> (Arc<InMemoryStore>, Project, NamespaceId) {
        let store = Arc::new(InMemoryStore::new());
        let project = Project::new("sample-project");
        store.save_project(&project).await.unwrap();
        let namespace = optimus_core::Namespace::new("finance", project.id);
        store.save_namespace(&namespace).await.unwrap();
        (store, project, namespace.id)
    }

    fn job_producing(name: &str, ns: NamespaceId, destination: &str) -> JobSpec {
        JobSpec::builder(name)
            .task("bq2bq")
            .task_config("DESTINATION", destination)
            .namespace_id(ns)
            .build()
    }

    fn job_consuming(name: &str, ns: NamespaceId, destination: &str, upstream: &str) -> JobSpec {
        JobSpec::builder(name)
            .task("bq2bq")
            .task_config("DESTINATION", destination)
            .task_config("UPSTREAM", upstream)
            .namespace_id(ns)
            .build()
    }

    #[tokio::test]
    async fn test_inferred_dependency_populates_both_indexes() {
        let (store, project, ns) = setup().await;
        store
            .save_job(project.id, &job_producing("job-A", ns, "bq://a"))
            .await
            .unwrap();
        store
            .save_job(project.id, &job_consuming("job-B", ns, "bq://b", "bq://a"))
            .await
            .unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let sink = BufferSink::new();
        let outcome = resolver.resolve_project(&project, &sink).await.unwrap();

        assert!(outcome.failures.is_empty());
        let a = store.get_job_by_name(project.id, "job-A").await.unwrap();
        let b = store.get_job_by_name(project.id, "job-B").await.unwrap();
        assert_eq!(a.dependents, vec!["job-B".to_string()]);
        let dep = b.dependencies.get("job-A").unwrap();
        assert_eq!(dep.dep_type, DependencyType::Intra);
        assert!(dep.inferred);
        assert_eq!(a.destination.as_deref(), Some("bq://a"));

        let resolved_events = sink
            .events()
            .iter()
            .filter(|e| matches!(e, Event::JobDependencyResolved { .. }))
            .count();
        assert_eq!(resolved_events, 2);
    }

    #[tokio::test]
    async fn test_unknown_dependency_is_non_fatal() {
        let (store, project, ns) = setup().await;
        store
            .save_job(project.id, &job_producing("job-A", ns, "bq://a"))
            .await
            .unwrap();
        store
            .save_job(
                project.id,
                &job_consuming("job-B", ns, "bq://b", "bq://missing"),
            )
            .await
            .unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let sink = BufferSink::new();
        let outcome = resolver.resolve_project(&project, &sink).await.unwrap();

        // job-A still resolves; job-B carries an unknown-dependency failure
        assert!(outcome.is_resolved("job-A"));
        assert!(!outcome.is_resolved("job-B"));
        assert!(outcome.failures[0].unknown_dependency);
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::JobSpecUnknownDependencyUsed { .. })));
    }

    #[tokio::test]
    async fn test_static_dependency_merged() {
        let (store, project, ns) = setup().await;
        store
            .save_job(project.id, &job_producing("job-A", ns, "bq://a"))
            .await
            .unwrap();
        let b = JobSpec::builder("job-B")
            .task("bq2bq")
            .task_config("DESTINATION", "bq://b")
            .depends_on("job-A", DependencyType::Intra)
            .namespace_id(ns)
            .build();
        store.save_job(project.id, &b).await.unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        let a = store.get_job_by_name(project.id, "job-A").await.unwrap();
        assert_eq!(a.dependents, vec!["job-B".to_string()]);

        let edges = store.dependencies_in_project(project.id).await.unwrap();
        assert!(edges
            .iter()
            .any(|(_, e)| e.from == "job-B" && e.to == "job-A" && e.kind == EdgeKind::Static));
    }

    #[tokio::test]
    async fn test_missing_static_dependency_fails_job() {
        let (store, project, ns) = setup().await;
        let b = JobSpec::builder("job-B")
            .task("bq2bq")
            .task_config("DESTINATION", "bq://b")
            .depends_on("job-ghost", DependencyType::Intra)
            .namespace_id(ns)
            .build();
        store.save_job(project.id, &b).await.unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].reason.contains("unknown local dependency"));
    }

    #[tokio::test]
    async fn test_cycle_marks_all_members() {
        let (store, project, ns) = setup().await;
        store
            .save_job(project.id, &job_consuming("job-A", ns, "bq://a", "bq://b"))
            .await
            .unwrap();
        store
            .save_job(project.id, &job_consuming("job-B", ns, "bq://b", "bq://a"))
            .await
            .unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();

        assert!(outcome.cycle_members.contains("job-A"));
        assert!(outcome.cycle_members.contains("job-B"));
        let message = outcome.cycle_message.unwrap();
        assert!(message.starts_with("cycle: "));
        assert!(message.contains(" -> "));
    }

    #[tokio::test]
    async fn test_cross_namespace_dependency_allowed() {
        let (store, project, ns_finance) = setup().await;
        let marketing = optimus_core::Namespace::new("marketing", project.id);
        store.save_namespace(&marketing).await.unwrap();

        store
            .save_job(project.id, &job_producing("job-A", ns_finance, "bq://a"))
            .await
            .unwrap();
        store
            .save_job(
                project.id,
                &job_consuming("job-B", marketing.id, "bq://b", "bq://a"),
            )
            .await
            .unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();
        assert!(outcome.failures.is_empty());

        let edges = store.dependencies_in_project(project.id).await.unwrap();
        let edge = edges
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.from == "job-B")
            .unwrap();
        assert_eq!(edge.scope, EdgeScope::InterNamespace);
    }

    #[tokio::test]
    async fn test_undeclared_inter_project_urn_is_unknown() {
        let (store, project, ns) = setup().await;
        // another project produces bq://x
        let other = Project::new("other-project");
        store.save_project(&other).await.unwrap();
        let other_ns = optimus_core::Namespace::new("default", other.id);
        store.save_namespace(&other_ns).await.unwrap();
        let producer = store
            .save_job(other.id, &job_producing("job-X", other_ns.id, "bq://x"))
            .await
            .unwrap();
        store
            .set_job_destination(producer.id, "bq://x")
            .await
            .unwrap();

        store
            .save_job(project.id, &job_consuming("job-B", ns, "bq://b", "bq://x"))
            .await
            .unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();
        // not declared as a static inter dependency, so it is unknown
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].unknown_dependency);
    }

    #[tokio::test]
    async fn test_declared_inter_project_urn_resolves() {
        let (store, project, ns) = setup().await;
        let other = Project::new("other-project");
        store.save_project(&other).await.unwrap();
        let other_ns = optimus_core::Namespace::new("default", other.id);
        store.save_namespace(&other_ns).await.unwrap();
        let producer = store
            .save_job(other.id, &job_producing("job-X", other_ns.id, "bq://x"))
            .await
            .unwrap();
        store
            .set_job_destination(producer.id, "bq://x")
            .await
            .unwrap();

        let b = JobSpec::builder("job-B")
            .task("bq2bq")
            .task_config("DESTINATION", "bq://b")
            .task_config("UPSTREAM", "bq://x")
            .depends_on("other-project/job-X", DependencyType::Inter)
            .namespace_id(ns)
            .build();
        store.save_job(project.id, &b).await.unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();
        assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);

        let edges = store.dependencies_in_project(project.id).await.unwrap();
        assert!(edges
            .iter()
            .any(|(_, e)| e.scope == EdgeScope::InterProject && e.kind == EdgeKind::Inferred));
    }

    #[tokio::test]
    async fn test_http_dependencies_become_opaque_edges() {
        let (store, project, ns) = setup().await;
        let job = JobSpec::builder("job-A")
            .task("bq2bq")
            .task_config("DESTINATION", "bq://a")
            .http_dependency(optimus_core::HttpDependency {
                name: "external-sensor".to_string(),
                url: "https://example.com/ready".to_string(),
                params: Default::default(),
                headers: Default::default(),
            })
            .namespace_id(ns)
            .build();
        store.save_job(project.id, &job).await.unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();

        let edges = store.dependencies_in_project(project.id).await.unwrap();
        let edge = edges.iter().map(|(_, e)| e).find(|e| e.kind == EdgeKind::Http);
        assert_eq!(edge.unwrap().to, "external-sensor");

        // http edges never become dependents
        let job = store.get_job_by_name(project.id, "job-A").await.unwrap();
        assert!(job.dependents.is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let (store, project, ns) = setup().await;
        store
            .save_job(project.id, &job_producing("job-A", ns, "bq://a"))
            .await
            .unwrap();
        store
            .save_job(project.id, &job_consuming("job-B", ns, "bq://b", "bq://a"))
            .await
            .unwrap();

        let resolver = DependencyResolver::new(registry(), store.clone());
        resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();
        let outcome = resolver
            .resolve_project(&project, &BufferSink::new())
            .await
            .unwrap();

        assert!(outcome.failures.is_empty());
        let a = store.get_job_by_name(project.id, "job-A").await.unwrap();
        assert_eq!(a.dependents, vec!["job-B".to_string()]);
        let b = store.get_job_by_name(project.id, "job-B").await.unwrap();
        assert_eq!(b.dependencies.len(), 1);
    }
}
