//! Wired-up engine harness
//!
//! One project with one namespace over the in-memory store, the mock
//! scheduler, a fixed clock, and every engine constructed the way the
//! server wires them. Tests drive the harness and assert on the store,
//! the scheduler records, and the progress sink.

use crate::builders::test_registry;
use crate::mocks::MockScheduler;
use chrono::{TimeZone, Utc};
use optimus_core::store::*;
use optimus_core::{
    BufferSink, Clock, DatastoreRegistry, FixedClock, Namespace, PluginRegistry, Project,
};
use optimus_ext::WarehouseDatastore;
use optimus_runtime::backup::BackupService;
use optimus_runtime::deploy::{DeployManager, DeployManagerConfig, Deployer};
use optimus_runtime::replay::{ReplayManager, ReplayManagerConfig};
use optimus_runtime::resolver::DependencyResolver;
use optimus_runtime::service::JobService;
use optimus_storage::InMemoryStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an end-to-end test needs, wired like production
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub scheduler: Arc<MockScheduler>,
    pub clock: Arc<FixedClock>,
    pub registry: PluginRegistry,
    pub datastores: DatastoreRegistry,
    pub warehouse: Arc<WarehouseDatastore>,
    pub resolver: Arc<DependencyResolver>,
    pub deployer: Arc<Deployer>,
    pub deploy_manager: Arc<DeployManager>,
    pub replay_manager: Arc<ReplayManager>,
    pub backup: BackupService,
    pub service: JobService,
    pub sink: Arc<BufferSink>,
    pub project: Project,
    pub namespace: Namespace,
}

impl Harness {
    /// Harness with default engine configuration; clock pinned to
    /// 2021-01-01T00:00:00Z so every 2020 fixture run is in the past
    pub async fn new() -> Self {
        Self::with_replay_config(ReplayManagerConfig::default()).await
    }

    /// Harness with a custom replay configuration (queue capacity, workers)
    pub async fn with_replay_config(replay_config: ReplayManagerConfig) -> Self {
        let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn Store> = store.clone();
        let scheduler = Arc::new(MockScheduler::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        ));
        let clock_dyn: Arc<dyn Clock> = clock.clone();

        let registry = test_registry();
        let warehouse = Arc::new(WarehouseDatastore::new("warehouse"));
        let datastores = DatastoreRegistry::new();
        datastores
            .register(warehouse.clone())
            .expect("register warehouse datastore");

        let project = Project::new("sample-project").with_config(HashMap::from([(
            "SCHEDULER_HOST".to_string(),
            "http://airflow:8080".to_string(),
        )]));
        let namespace = Namespace::new("finance", project.id);
        store_dyn.save_project(&project).await.expect("save project");
        store_dyn
            .save_namespace(&namespace)
            .await
            .expect("save namespace");

        let resolver = Arc::new(DependencyResolver::new(registry.clone(), store_dyn.clone()));
        let deployer = Arc::new(Deployer::new(
            store_dyn.clone(),
            scheduler.clone(),
            resolver.clone(),
            registry.clone(),
        ));
        let sink: Arc<BufferSink> = Arc::new(BufferSink::new());
        let deploy_manager = DeployManager::new(
            store_dyn.clone(),
            deployer.clone(),
            sink.clone(),
            DeployManagerConfig::default(),
        );
        let replay_manager = ReplayManager::new(
            store_dyn.clone(),
            scheduler.clone(),
            clock_dyn.clone(),
            replay_config,
        );
        let backup = BackupService::new(store_dyn.clone(), datastores.clone(), clock_dyn.clone());
        let service = JobService::new(
            store_dyn,
            scheduler.clone(),
            resolver.clone(),
            deployer.clone(),
            deploy_manager.clone(),
        );

        Self {
            store,
            scheduler,
            clock,
            registry,
            datastores,
            warehouse,
            resolver,
            deployer,
            deploy_manager,
            replay_manager,
            backup,
            service,
            sink,
            project,
            namespace,
        }
    }

    /// A second namespace under the harness project
    pub async fn add_namespace(&self, name: &str) -> Namespace {
        let namespace = Namespace::new(name, self.project.id);
        let store: Arc<dyn Store> = self.store.clone();
        store
            .save_namespace(&namespace)
            .await
            .expect("save namespace");
        namespace
    }
}
