//! Spec builders with scenario defaults
//!
//! Every fixture job runs daily at 02:00Z from 2020-01-01 on the `bq2bq`
//! task plugin, whose dependency mod reads `DESTINATION` and `UPSTREAM`
//! entries straight from the task config.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use optimus_core::plugin::{
    DependencyMod, GenerateDependenciesRequest, GeneratedDependencies, Plugin, PluginInfo,
};
use optimus_core::{JobSpecBuilder, NamespaceId, PluginRegistry};
use std::sync::Arc;

/// Dependency mod scripted through task config: `DESTINATION` sets the
/// output URN, `UPSTREAM` a comma-separated list of read URNs.
pub struct ConfigDrivenDependencyMod;

#[async_trait]
impl DependencyMod for ConfigDrivenDependencyMod {
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

/// Registry with the `bq2bq` task and a `predator` hook registered
pub fn test_registry() -> PluginRegistry {
    let registry = PluginRegistry::new();
    registry
        .register(
            Plugin::new(PluginInfo::task("bq2bq", "odpf/bq2bq:latest"))
                .with_dependency_mod(Arc::new(ConfigDrivenDependencyMod)),
        )
        .expect("register bq2bq");
    registry
        .register(Plugin::new(PluginInfo::hook(
            "predator",
            "odpf/predator:latest",
            "post",
        )))
        .expect("register predator");
    registry
}

/// A daily job on the `bq2bq` plugin writing to `destination`
pub fn daily_job(name: &str, namespace_id: NamespaceId, destination: &str) -> JobSpecBuilder {
    optimus_core::JobSpec::builder(name)
        .owner("data-team@example.com")
        .schedule(
            "0 2 * * *",
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        )
        .task("bq2bq")
        .task_config("DESTINATION", destination)
        .namespace_id(namespace_id)
}
