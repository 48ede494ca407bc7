//! End-to-end replay scenarios

use chrono::{DateTime, TimeZone, Utc};
use optimus_core::store::*;
use optimus_core::{Clock, ReplayId, ReplayRequest, ReplaySpec, ReplayStatus, RunState};
use optimus_runtime::replay::ReplayManagerConfig;
use optimus_runtime::{ERR_CONFLICTED_JOB_RUN, ERR_REQUEST_QUEUE_FULL};
use optimus_tests::builders::daily_job;
use optimus_tests::Harness;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn store(h: &Harness) -> Arc<dyn Store> {
    h.store.clone()
}

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn run_at(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 11, d, 2, 0, 0).unwrap()
}

fn request(h: &Harness, job: &str, start_day: u32, end_day: u32) -> ReplayRequest {
    ReplayRequest {
        project_id: h.project.id,
        job_name: job.to_string(),
        start: date(2020, 11, start_day),
        end: date(2020, 11, end_day),
        allowed_downstream_namespaces: vec!["*".to_string()],
        force: false,
    }
}

async fn deploy_chain(h: &Harness) {
    let a = daily_job("job-A", h.namespace.id, "warehouse://table-a").build();
    let b = daily_job("job-B", h.namespace.id, "warehouse://table-b")
        .task_config("UPSTREAM", "warehouse://table-a")
        .build();
    let id = h
        .service
        .deploy(h.project.id, h.namespace.id, vec![a, b])
        .await
        .unwrap();
    h.deploy_manager.wait_for(id, WAIT).await.unwrap();
}

async fn wait_replay_status(
    h: &Harness,
    id: ReplayId,
    wanted: ReplayStatus,
) -> ReplaySpec {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let replay = store(h).get_replay_by_id(id).await.unwrap();
        if replay.status == wanted {
            return replay;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "replay {} stuck in {}",
            id,
            replay.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_dry_run_expands_downstream_tree() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    let plan = h
        .replay_manager
        .dry_run(&request(&h, "job-A", 25, 28))
        .await
        .unwrap();

    let tree = &plan.execution_tree;
    assert_eq!(tree.name(), "job-A");
    assert_eq!(tree.dependents.len(), 1);
    assert_eq!(tree.dependents[0].name(), "job-B");
    assert!(plan.ignored_jobs.is_empty());

    for node in tree.walk_bfs() {
        let runs: Vec<_> = node.runs.iter().map(|r| r.scheduled_at).collect();
        assert_eq!(runs, vec![run_at(25), run_at(26), run_at(27), run_at(28)]);
    }

    // dry run persists nothing
    assert!(store(&h)
        .replays_in_project(h.project.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_replay_clears_runs_and_succeeds() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    let accepted = h
        .replay_manager
        .accept(&request(&h, "job-A", 25, 26))
        .await
        .unwrap();
    let replay = wait_replay_status(&h, accepted.id, ReplayStatus::Success).await;
    assert!(replay.message.unwrap().message.contains("successfully run"));

    // BFS order: the root clears before its dependent
    let cleared = h.scheduler.cleared();
    assert_eq!(cleared.len(), 2);
    assert_eq!(cleared[0].0, "job-A");
    assert_eq!(cleared[1].0, "job-B");
    assert_eq!(cleared[0].1, vec![run_at(25), run_at(26)]);

    // status annotates runs from the scheduler at query time
    let state = h.replay_manager.status(accepted.id).await.unwrap();
    assert_eq!(state.status, ReplayStatus::Success);
    for node in state.tree.walk_bfs() {
        for run in &node.runs {
            assert_eq!(run.state, Some(RunState::Success));
        }
    }
}

#[tokio::test]
async fn test_conflicting_replay_rejected() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    // keep the first replay in flight
    let gate = h.scheduler.hold_clears();
    let first = h
        .replay_manager
        .accept(&request(&h, "job-A", 25, 27))
        .await
        .unwrap();

    let err = h
        .replay_manager
        .accept(&request(&h, "job-A", 26, 28))
        .await
        .unwrap_err();
    assert!(matches!(err, optimus_core::Error::FailedPrecondition(_)));
    assert!(err.to_string().contains(ERR_CONFLICTED_JOB_RUN));

    // force skips the conflict check
    let mut forced = request(&h, "job-A", 26, 28);
    forced.force = true;
    h.replay_manager.accept(&forced).await.unwrap();

    gate.add_permits(1_000);
    wait_replay_status(&h, first.id, ReplayStatus::Success).await;
}

#[tokio::test]
async fn test_queue_overflow_rejected() {
    let h = Harness::with_replay_config(ReplayManagerConfig {
        num_workers: 1,
        queue_capacity: 1,
        ..ReplayManagerConfig::default()
    })
    .await;

    // three independent jobs so the requests cannot conflict
    let jobs: Vec<_> = ["job-A", "job-B", "job-C"]
        .iter()
        .map(|name| {
            daily_job(name, h.namespace.id, &format!("warehouse://{}", name)).build()
        })
        .collect();
    let id = h
        .service
        .deploy(h.project.id, h.namespace.id, jobs)
        .await
        .unwrap();
    h.deploy_manager.wait_for(id, WAIT).await.unwrap();

    // the single worker blocks on the first replay, the queue holds the
    // second, the third overflows
    let gate = h.scheduler.hold_clears();
    let first = h
        .replay_manager
        .accept(&request(&h, "job-A", 25, 25))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _second = h
        .replay_manager
        .accept(&request(&h, "job-B", 25, 25))
        .await
        .unwrap();

    let err = h
        .replay_manager
        .accept(&request(&h, "job-C", 25, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, optimus_core::Error::Unavailable(_)));
    assert!(err.to_string().contains(ERR_REQUEST_QUEUE_FULL));

    // the overflowed record latched Failed with the queue-full message
    let rejected = store(&h)
        .replays_in_project(h.project.id)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.job_name == "job-C")
        .unwrap();
    assert_eq!(rejected.status, ReplayStatus::Failed);
    assert!(rejected
        .message
        .unwrap()
        .message
        .contains(ERR_REQUEST_QUEUE_FULL));

    gate.add_permits(1_000);
    wait_replay_status(&h, first.id, ReplayStatus::Success).await;
}

#[tokio::test]
async fn test_per_node_clear_failure_fails_replay() {
    let h = Harness::new().await;
    deploy_chain(&h).await;
    h.scheduler.fail_clear("job-B");

    let accepted = h
        .replay_manager
        .accept(&request(&h, "job-A", 25, 25))
        .await
        .unwrap();
    let replay = wait_replay_status(&h, accepted.id, ReplayStatus::Failed).await;
    let message = replay.message.unwrap();
    assert!(message.message.contains("job-B"));
    // the root node still cleared before the failure was recorded
    assert!(h.scheduler.cleared().iter().any(|(job, _)| job == "job-A"));
}

#[tokio::test]
async fn test_unknown_job_not_found() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    let err = h
        .replay_manager
        .accept(&request(&h, "job-ghost", 25, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, optimus_core::Error::NotFound(_)));
}

#[tokio::test]
async fn test_reversed_window_invalid() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    let err = h
        .replay_manager
        .accept(&request(&h, "job-A", 28, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, optimus_core::Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_list_returns_newest_first() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    let first = h
        .replay_manager
        .accept(&request(&h, "job-A", 20, 20))
        .await
        .unwrap();
    wait_replay_status(&h, first.id, ReplayStatus::Success).await;

    h.clock.set(h.clock.now() + chrono::Duration::hours(1));
    let second = h
        .replay_manager
        .accept(&request(&h, "job-A", 25, 25))
        .await
        .unwrap();
    wait_replay_status(&h, second.id, ReplayStatus::Success).await;

    let listed = h.replay_manager.list(h.project.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);
}

#[tokio::test]
async fn test_syncer_times_out_stuck_replay() {
    let h = Harness::new().await;
    deploy_chain(&h).await;

    let gate = h.scheduler.hold_clears();
    let accepted = h
        .replay_manager
        .accept(&request(&h, "job-A", 25, 25))
        .await
        .unwrap();
    wait_replay_status(&h, accepted.id, ReplayStatus::InProgress).await;

    // a day passes with the worker still stuck
    h.clock.set(h.clock.now() + chrono::Duration::days(1));
    let syncer = h.replay_manager.syncer();
    syncer.sync(Duration::from_secs(3600)).await.unwrap();

    let replay = store(&h).get_replay_by_id(accepted.id).await.unwrap();
    assert_eq!(replay.status, ReplayStatus::Failed);
    assert!(replay.message.unwrap().message.contains("timeout"));

    gate.add_permits(1_000);
}

#[tokio::test]
async fn test_syncer_completes_replayed_record() {
    let h = Harness::new().await;
    deploy_chain(&h).await;
    let job = store(&h)
        .get_job_by_name(h.project.id, "job-A")
        .await
        .unwrap();

    // a replay that cleared its runs but whose process died before the
    // terminal latch
    let replay = ReplaySpec {
        id: ReplayId::new(),
        job_id: job.id,
        job_name: job.name.clone(),
        start_date: date(2020, 11, 25),
        end_date: date(2020, 11, 25),
        status: ReplayStatus::Created,
        config: HashMap::new(),
        message: None,
        claimed_runs: HashMap::from([(job.name.clone(), vec![run_at(25)])]),
        created_at: h.clock.now(),
    };
    store(&h).save_replay(&replay).await.unwrap();
    store(&h)
        .update_replay_status(replay.id, ReplayStatus::InProgress, None)
        .await
        .unwrap();
    store(&h)
        .update_replay_status(replay.id, ReplayStatus::Replayed, None)
        .await
        .unwrap();
    h.scheduler
        .set_run_state("job-A", run_at(25), RunState::Success);

    let syncer = h.replay_manager.syncer();
    syncer.sync(Duration::from_secs(3600)).await.unwrap();

    let synced = store(&h).get_replay_by_id(replay.id).await.unwrap();
    assert_eq!(synced.status, ReplayStatus::Success);
}

#[tokio::test]
async fn test_downstream_namespace_filter_reports_ignored() {
    let h = Harness::new().await;
    let marketing = h.add_namespace("marketing").await;

    let a = daily_job("job-A", h.namespace.id, "warehouse://table-a").build();
    let b = daily_job("job-B", marketing.id, "warehouse://table-b")
        .task_config("UPSTREAM", "warehouse://table-a")
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

    let mut req = request(&h, "job-A", 25, 25);
    req.allowed_downstream_namespaces = vec!["finance".to_string()];
    let plan = h.replay_manager.dry_run(&req).await.unwrap();

    assert_eq!(plan.execution_tree.count(), 1);
    assert_eq!(plan.ignored_jobs, vec!["job-B".to_string()]);
}
