//! Priority resolver
//!
//! Assigns a scheduler priority weight to every job by walking the
//! multi-root dependency forest breadth-first: jobs nobody waits on the
//! least, jobs with long dependent chains the most. Roots receive the
//! maximum weight and each level down loses a fixed gap.

use optimus_core::{Event, JobSpec, ProgressSink};
use optimus_lineage::MultiRootTree;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::instrument;

/// Minimum weight any job receives; the scheduler default is also 1
pub const MIN_PRIORITY_WEIGHT: i32 = 1;

/// Weight assigned to root jobs
pub const MAX_PRIORITY_WEIGHT: i32 = 10_000;

/// Weight lost per dependency level
pub const PRIORITY_WEIGHT_GAP: i32 = 10;

/// Assigns priority weights over a resolved set of jobs
#[derive(Debug, Default)]
pub struct PriorityResolver;

impl PriorityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Mutate `task.priority` on every job. Dependencies must already be
    /// resolved; references leaving the set (inter-project) are skipped.
    #[instrument(skip_all, fields(jobs = jobs.len()))]
    pub fn resolve(
        &self,
        jobs: &mut [JobSpec],
        sink: &dyn ProgressSink,
    ) -> optimus_lineage::Result<()> {
        let names: HashSet<&str> = jobs.iter().map(|j| j.name.as_str()).collect();

        let mut forest = MultiRootTree::new();
        for job in jobs.iter() {
            forest.add_node(job.name.as_str());
            for dep_name in job.dependencies.keys() {
                if names.contains(dep_name.as_str()) {
                    forest.connect(dep_name, &job.name);
                }
            }
        }

        if let Some(path) = forest.detect_cycle() {
            return Err(optimus_lineage::Error::CycleDetected { path });
        }

        // BFS by level; a node reachable at several depths keeps the
        // deepest (smallest) weight
        let mut weights: HashMap<String, i32> = HashMap::new();
        let mut queue: VecDeque<(String, i32)> = forest
            .roots()
            .into_iter()
            .map(|root| (root.to_string(), MAX_PRIORITY_WEIGHT))
            .collect();
        while let Some((name, weight)) = queue.pop_front() {
            let known = weights.get(&name).copied();
            if known.map(|w| w <= weight).unwrap_or(false) {
                continue;
            }
            weights.insert(name.clone(), weight);
            let child_weight = (weight - PRIORITY_WEIGHT_GAP).max(MIN_PRIORITY_WEIGHT);
            for child in forest.dependents_of(&name) {
                queue.push_back((child.clone(), child_weight));
            }
        }

        for job in jobs.iter_mut() {
            job.task.priority = weights
                .get(&job.name)
                .copied()
                .unwrap_or(MAX_PRIORITY_WEIGHT);
        }
        sink.notify(&Event::JobPriorityWeightAssigned);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimus_core::{BufferSink, DependencyType, JobSpec};

    fn job(name: &str, deps: &[&str]) -> JobSpec {
        let mut builder = JobSpec::builder(name);
        for dep in deps {
            builder = builder.depends_on(*dep, DependencyType::Intra);
        }
        builder.build()
    }

    fn weight_of(jobs: &[JobSpec], name: &str) -> i32 {
        jobs.iter().find(|j| j.name == name).unwrap().task.priority
    }

    #[test]
    fn test_three_trees() {
        // dag1 <- dag2 <- dag3, dag4 alone, dag5 <- dag6
        let mut jobs = vec![
            job("dag1", &[]),
            job("dag2", &["dag1"]),
            job("dag3", &["dag2"]),
            job("dag4", &[]),
            job("dag5", &[]),
            job("dag6", &["dag5"]),
        ];
        PriorityResolver::new()
            .resolve(&mut jobs, &BufferSink::new())
            .unwrap();

        assert_eq!(weight_of(&jobs, "dag1"), MAX_PRIORITY_WEIGHT);
        assert_eq!(weight_of(&jobs, "dag4"), MAX_PRIORITY_WEIGHT);
        assert_eq!(weight_of(&jobs, "dag5"), MAX_PRIORITY_WEIGHT);
        assert_eq!(weight_of(&jobs, "dag2"), MAX_PRIORITY_WEIGHT - PRIORITY_WEIGHT_GAP);
        assert_eq!(weight_of(&jobs, "dag6"), MAX_PRIORITY_WEIGHT - PRIORITY_WEIGHT_GAP);
        assert_eq!(
            weight_of(&jobs, "dag3"),
            MAX_PRIORITY_WEIGHT - 2 * PRIORITY_WEIGHT_GAP
        );
    }

    #[test]
    fn test_diamond_takes_deepest_level() {
        // a -> b -> d, a -> d: d sits two levels down
        let mut jobs = vec![
            job("a", &[]),
            job("b", &["a"]),
            job("d", &["a", "b"]),
        ];
        PriorityResolver::new()
            .resolve(&mut jobs, &BufferSink::new())
            .unwrap();
        assert_eq!(
            weight_of(&jobs, "d"),
            MAX_PRIORITY_WEIGHT - 2 * PRIORITY_WEIGHT_GAP
        );
    }

    #[test]
    fn test_weight_floors_at_minimum() {
        let mut jobs: Vec<JobSpec> = Vec::new();
        jobs.push(job("job-0", &[]));
        for i in 1..1_200 {
            let parent = format!("job-{}", i - 1);
            jobs.push(job(&format!("job-{}", i), &[parent.as_str()]));
        }
        PriorityResolver::new()
            .resolve(&mut jobs, &BufferSink::new())
            .unwrap();
        assert_eq!(weight_of(&jobs, "job-1199"), MIN_PRIORITY_WEIGHT);
    }

    #[test]
    fn test_cycle_is_an_error() {
        let mut jobs = vec![job("a", &["b"]), job("b", &["a"])];
        let result = PriorityResolver::new().resolve(&mut jobs, &BufferSink::new());
        assert!(matches!(
            result,
            Err(optimus_lineage::Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_inter_project_reference_skipped() {
        let mut jobs = vec![job("a", &["other-project/job-x"])];
        PriorityResolver::new()
            .resolve(&mut jobs, &BufferSink::new())
            .unwrap();
        assert_eq!(weight_of(&jobs, "a"), MAX_PRIORITY_WEIGHT);
    }

    #[test]
    fn test_event_emitted() {
        let sink = BufferSink::new();
        let mut jobs = vec![job("a", &[])];
        PriorityResolver::new().resolve(&mut jobs, &sink).unwrap();
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::JobPriorityWeightAssigned)));
    }
}
