//! Assertion helpers over progress events and deployment details

use optimus_core::{Deployment, Event};

/// Count events matching a predicate
pub fn count_events(events: &[Event], predicate: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}

/// Panic unless the deployment failed a specific job with a message
/// containing `needle`
pub fn assert_failure_contains(deployment: &Deployment, job_name: &str, needle: &str) {
    let failure = deployment
        .details
        .failures
        .iter()
        .find(|f| f.job_name == job_name)
        .unwrap_or_else(|| {
            panic!(
                "expected a failure for {}, got {:?}",
                job_name, deployment.details.failures
            )
        });
    assert!(
        failure.message.contains(needle),
        "failure message '{}' does not contain '{}'",
        failure.message,
        needle
    );
}

/// Panic unless `success_count + failures == total`
pub fn assert_details_balance(deployment: &Deployment, total: i32) {
    assert_eq!(
        deployment.details.success_count + deployment.details.failure_count(),
        total,
        "deployment details do not balance: {:?}",
        deployment.details
    );
}
