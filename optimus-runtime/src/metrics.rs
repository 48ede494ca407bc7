//! Prometheus metrics for the Optimus engines

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};

lazy_static! {
    /// Total number of deployments finished, by terminal status
    ///
    /// Labels:
    /// - status: "succeed", "failed"
    pub static ref DEPLOYMENTS_FINISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "optimus_deployments_finished_total",
        "Total number of deployments finished",
        &["status"]
    )
    .expect("optimus_deployments_finished_total metric registration");

    /// Total number of replay requests accepted into the queue
    pub static ref REPLAYS_ACCEPTED_TOTAL: IntCounter = register_int_counter!(
        "optimus_replays_accepted_total",
        "Total number of replay requests accepted"
    )
    .expect("optimus_replays_accepted_total metric registration");

    /// Total number of replay requests rejected because the queue was full
    pub static ref REPLAY_QUEUE_FULL_TOTAL: IntCounter = register_int_counter!(
        "optimus_replay_queue_full_total",
        "Total number of replay requests rejected on queue overflow"
    )
    .expect("optimus_replay_queue_full_total metric registration");

    /// Number of replay workers currently processing a request
    pub static ref REPLAY_WORKERS_BUSY: IntGauge = register_int_gauge!(
        "optimus_replay_workers_busy",
        "Number of replay workers currently busy"
    )
    .expect("optimus_replay_workers_busy metric registration");

    /// Number of times the replay syncer finished a pass
    pub static ref REPLAYS_SYNCED_TOTAL: IntCounter = register_int_counter!(
        "optimus_replays_synced_total",
        "Number of times the replay syncer finished syncing"
    )
    .expect("optimus_replays_synced_total metric registration");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = DEPLOYMENTS_FINISHED_TOTAL.with_label_values(&["succeed"]);
        REPLAYS_ACCEPTED_TOTAL.inc();
        assert!(REPLAYS_ACCEPTED_TOTAL.get() >= 1);
    }
}
