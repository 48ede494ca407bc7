//! End-to-end backup scenarios

use optimus_core::store::*;
use optimus_core::{BackupRequest, Clock, Datastorer, NamespaceId, ResourceSpec};
use optimus_tests::builders::daily_job;
use optimus_tests::Harness;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn store(h: &Harness) -> Arc<dyn Store> {
    h.store.clone()
}

async fn register_resource(
    h: &Harness,
    namespace_id: NamespaceId,
    name: &str,
    resource_type: &str,
) -> ResourceSpec {
    let resource = ResourceSpec::new(name, resource_type, "warehouse", namespace_id);
    let urn = h.warehouse.generate_urn(&resource).unwrap();
    let resource = resource.with_urn(urn);
    h.warehouse.create(&resource).await.unwrap();
    store(h)
        .save_resource(h.project.id, &resource)
        .await
        .unwrap();
    resource
}

fn backup_request(h: &Harness, resource_name: &str) -> BackupRequest {
    BackupRequest {
        project_id: h.project.id,
        namespace_id: h.namespace.id,
        resource_name: resource_name.to_string(),
        datastore_ref: "warehouse".to_string(),
        description: "pre-migration snapshot".to_string(),
        allowed_downstream_namespaces: vec!["*".to_string()],
        config: HashMap::from([("TTL".to_string(), "720h".to_string())]),
    }
}

/// Root table with two dependents: one lands in a table, one in a view
async fn deploy_backup_fixture(h: &Harness) {
    register_resource(h, h.namespace.id, "playground.events", "table").await;
    register_resource(h, h.namespace.id, "playground.events_daily", "table").await;
    register_resource(h, h.namespace.id, "playground.events_view", "view").await;

    let a = daily_job("job-A", h.namespace.id, "warehouse://playground.events").build();
    let b = daily_job("job-B", h.namespace.id, "warehouse://playground.events_daily")
        .task_config("UPSTREAM", "warehouse://playground.events")
        .build();
    let c = daily_job("job-C", h.namespace.id, "warehouse://playground.events_view")
        .task_config("UPSTREAM", "warehouse://playground.events")
        .build();
    let id = h
        .service
        .deploy(h.project.id, h.namespace.id, vec![a, b, c])
        .await
        .unwrap();
    h.deploy_manager.wait_for(id, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_plan_with_partial_ignore() {
    let h = Harness::new().await;
    deploy_backup_fixture(&h).await;

    let plan = h
        .backup
        .dry_run(&backup_request(&h, "playground.events"))
        .await
        .unwrap();

    assert_eq!(
        plan.resources,
        vec![
            "warehouse://playground.events".to_string(),
            "warehouse://playground.events_daily".to_string(),
        ]
    );
    assert_eq!(plan.ignored.len(), 1);
    assert_eq!(plan.ignored[0].urn, "warehouse://playground.events_view");
    assert!(plan.ignored[0].reason.contains("unsupported resource type"));
}

#[tokio::test]
async fn test_create_persists_record_with_results() {
    let h = Harness::new().await;
    deploy_backup_fixture(&h).await;

    let result = h
        .backup
        .create(&backup_request(&h, "playground.events"))
        .await
        .unwrap();
    assert_eq!(result.resources.len(), 2);
    assert!(result
        .resources
        .iter()
        .all(|urn| urn.contains("_backup_")));

    let record = h
        .backup
        .get(&result.id.unwrap().to_string())
        .await
        .unwrap();
    assert_eq!(record.resource_urn, "warehouse://playground.events");
    assert_eq!(record.result.len(), 2);
    let detail = record
        .detail_for("warehouse://playground.events_daily")
        .unwrap();
    assert!(detail.urn.starts_with("warehouse://playground.events_daily_backup_"));
    assert_eq!(record.config.get("TTL"), Some(&"720h".to_string()));
}

#[tokio::test]
async fn test_downstream_namespace_policy() {
    let h = Harness::new().await;
    let marketing = h.add_namespace("marketing").await;

    register_resource(&h, h.namespace.id, "playground.events", "table").await;
    register_resource(&h, marketing.id, "marketing.events_daily", "table").await;

    let a = daily_job("job-A", h.namespace.id, "warehouse://playground.events").build();
    let b = daily_job("job-B", marketing.id, "warehouse://marketing.events_daily")
        .task_config("UPSTREAM", "warehouse://playground.events")
        .build();
    let id = h
        .service
        .deploy(h.project.id, h.namespace.id, vec![a])
        .await
        .unwrap();
    h.deploy_manager.wait_for(id, WAIT).await.unwrap();
    let id = h
        .service
        .deploy(h.project.id, marketing.id, vec![b])
        .await
        .unwrap();
    h.deploy_manager.wait_for(id, WAIT).await.unwrap();

    let mut request = backup_request(&h, "playground.events");
    request.allowed_downstream_namespaces = vec!["finance".to_string()];
    let plan = h.backup.dry_run(&request).await.unwrap();

    assert_eq!(plan.resources, vec!["warehouse://playground.events".to_string()]);
    assert_eq!(plan.ignored.len(), 1);
    assert!(plan.ignored[0].reason.contains("allowed downstream"));
}

#[tokio::test]
async fn test_resource_without_producing_job() {
    let h = Harness::new().await;
    register_resource(&h, h.namespace.id, "playground.orphan", "table").await;

    let err = h
        .backup
        .dry_run(&backup_request(&h, "playground.orphan"))
        .await
        .unwrap_err();
    assert!(matches!(err, optimus_core::Error::NotFound(_)));
    assert!(err.to_string().contains("no job produces"));
}

#[tokio::test]
async fn test_get_with_malformed_id() {
    let h = Harness::new().await;
    let err = h.backup.get("not-a-uuid").await.unwrap_err();
    assert!(matches!(err, optimus_core::Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_list_returns_newest_first() {
    let h = Harness::new().await;
    deploy_backup_fixture(&h).await;

    h.backup
        .create(&backup_request(&h, "playground.events"))
        .await
        .unwrap();
    h.clock.set(h.clock.now() + chrono::Duration::hours(1));
    let second = h
        .backup
        .create(&backup_request(&h, "playground.events"))
        .await
        .unwrap();

    let listed = h.backup.list(h.project.id, "warehouse").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(Some(listed[0].id), second.id);
}
