//! Replay conflict validation
//!
//! Two replays may not hold the same `(job, run_time)` claim at once. The
//! check runs under the project lock in the manager so two acceptors cannot
//! both pass it.

use crate::ERR_CONFLICTED_JOB_RUN;
use chrono::{DateTime, Utc};
use optimus_core::ReplaySpec;
use std::collections::HashMap;
use tracing::debug;

/// Validates a new plan's claims against in-flight replays
#[derive(Debug, Default)]
pub struct ReplayValidator;

impl ReplayValidator {
    pub fn new() -> Self {
        Self
    }

    /// Reject with `FailedPrecondition` when any in-flight replay claims a
    /// `(job, run_time)` pair the new plan wants. `force` skips the check.
    pub fn validate(
        &self,
        in_flight: &[ReplaySpec],
        new_claims: &HashMap<String, Vec<DateTime<Utc>>>,
        force: bool,
    ) -> optimus_core::Result<()> {
        if force {
            debug!("replay conflict check skipped by force");
            return Ok(());
        }
        for replay in in_flight {
            if !replay.status.is_in_flight() {
                continue;
            }
            for (job_name, runs) in &replay.claimed_runs {
                let Some(new_runs) = new_claims.get(job_name) else {
                    continue;
                };
                if let Some(run) = runs.iter().find(|t| new_runs.contains(t)) {
                    return Err(optimus_core::Error::failed_precondition(
                        "unable to accept replay",
                        format!(
                            "{}: conflicted job run found: job {} at {} held by replay {}",
                            ERR_CONFLICTED_JOB_RUN, job_name, run, replay.id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
