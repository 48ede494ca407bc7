//! Replay planning
//!
//! Expands a replay request into an execution tree: the root job with its
//! scheduled runs over the window, and every transitive dependent whose
//! namespace passes the allow-list. Runs beyond the current instant are
//! excluded; dependents pruned by the allow-list are reported as ignored.

use chrono::{DateTime, Utc};
use optimus_core::{JobSpec, NamespaceId, ReplayRequest, ScheduleInterval};
use optimus_lineage::{Run, TreeNode};
use std::collections::{HashMap, HashSet, VecDeque};

/// An expanded replay plan
#[derive(Debug, Clone)]
pub struct ReplayPlan {
    /// Root of the execution tree, runs attached per node
    pub execution_tree: TreeNode,
    /// Downstream jobs excluded by the namespace allow-list
    pub ignored_jobs: Vec<String>,
}

impl ReplayPlan {
    /// `(job, run_time)` claims of the whole tree
    pub fn claimed_runs(&self) -> HashMap<String, Vec<DateTime<Utc>>> {
        claimed_runs(&self.execution_tree)
    }
}

/// `(job, run_time)` claims of an execution tree
pub fn claimed_runs(tree: &TreeNode) -> HashMap<String, Vec<DateTime<Utc>>> {
    let mut claims: HashMap<String, Vec<DateTime<Utc>>> = HashMap::new();
    for node in tree.walk_bfs() {
        let runs = claims.entry(node.name().to_string()).or_default();
        for run in &node.runs {
            if !runs.contains(&run.scheduled_at) {
                runs.push(run.scheduled_at);
            }
        }
    }
    claims
}

/// Builds execution trees from resolved job specs
pub struct ReplayPlanner<'a> {
    jobs_by_name: HashMap<&'a str, &'a JobSpec>,
    namespace_names: &'a HashMap<NamespaceId, String>,
}

impl<'a> ReplayPlanner<'a> {
    pub fn new(
        jobs: &'a [JobSpec],
        namespace_names: &'a HashMap<NamespaceId, String>,
    ) -> Self {
        Self {
            jobs_by_name: jobs.iter().map(|j| (j.name.as_str(), j)).collect(),
            namespace_names,
        }
    }

    /// Expand the request into a plan. Fails `NotFound` when the root job
    /// is unknown and `InvalidArgument` on a reversed window.
    pub fn build(
        &self,
        request: &ReplayRequest,
        now: DateTime<Utc>,
    ) -> optimus_core::Result<ReplayPlan> {
        if request.end < request.start {
            return Err(optimus_core::Error::invalid_argument(
                "unable to plan replay",
                format!(
                    "replay end date {} is before start date {}",
                    request.end.format("%Y-%m-%d"),
                    request.start.format("%Y-%m-%d")
                ),
            ));
        }
        let root = self.jobs_by_name.get(request.job_name.as_str()).ok_or_else(|| {
            optimus_core::Error::not_found("unable to plan replay", &request.job_name)
        })?;

        let mut ignored_jobs = Vec::new();
        let mut path = HashSet::new();
        let execution_tree =
            self.build_node(root, request, now, &mut path, &mut ignored_jobs, true)?;
        ignored_jobs.sort_unstable();
        ignored_jobs.dedup();
        Ok(ReplayPlan {
            execution_tree,
            ignored_jobs,
        })
    }

    fn build_node(
        &self,
        job: &JobSpec,
        request: &ReplayRequest,
        now: DateTime<Utc>,
        path: &mut HashSet<String>,
        ignored_jobs: &mut Vec<String>,
        include_downstream: bool,
    ) -> optimus_core::Result<TreeNode> {
        let mut node = TreeNode::new(job.clone());
        for run in self.runs_for(job, request, now)? {
            node.add_run(Run::at(run));
        }

        if !include_downstream {
            return Ok(node);
        }

        path.insert(job.name.clone());
        for dependent_name in &job.dependents {
            if path.contains(dependent_name) {
                continue;
            }
            let Some(dependent) = self.jobs_by_name.get(dependent_name.as_str()) else {
                continue;
            };
            if self.is_allowed(dependent, request) {
                let child =
                    self.build_node(dependent, request, now, path, ignored_jobs, true)?;
                node.add_dependent(child);
            } else {
                self.collect_subtree(dependent, ignored_jobs);
            }
        }
        path.remove(&job.name);
        Ok(node)
    }

    /// Scheduled instants of `[start, end]` for one job, bounded by the
    /// job's own start date and the current instant
    fn runs_for(
        &self,
        job: &JobSpec,
        request: &ReplayRequest,
        now: DateTime<Utc>,
    ) -> optimus_core::Result<Vec<DateTime<Utc>>> {
        let interval = ScheduleInterval::parse(&job.schedule.interval)?;
        Ok(interval
            .runs_between_dates(request.start, request.end)
            .into_iter()
            .filter(|run| *run >= job.schedule.start_date && *run <= now)
            .collect())
    }

    fn is_allowed(&self, job: &JobSpec, request: &ReplayRequest) -> bool {
        let Some(namespace_name) = self.namespace_names.get(&job.namespace_id) else {
            return false;
        };
        request.allows_namespace(namespace_name)
    }

    /// Record a pruned dependent and everything below it as ignored
    fn collect_subtree(&self, job: &JobSpec, ignored_jobs: &mut Vec<String>) {
        let mut queue = VecDeque::from([job]);
        let mut seen: HashSet<&str> = HashSet::from([job.name.as_str()]);
        while let Some(current) = queue.pop_front() {
            ignored_jobs.push(current.name.clone());
            for dependent_name in &current.dependents {
                if let Some(&dependent) = self.jobs_by_name.get(dependent_name.as_str()) {
                    if seen.insert(dependent.name.as_str()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use optimus_core::{JobSpec, ProjectId};

    fn namespaces(entries: &[(NamespaceId, &str)]) -> HashMap<NamespaceId, String> {
        entries
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect()
    }

    fn request(job: &str, allowed: Vec<String>) -> ReplayRequest {
        ReplayRequest {
            project_id: ProjectId::new(),
            job_name: job.to_string(),
            start: Utc.with_ymd_and_hms(2020, 11, 25, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2020, 11, 28, 0, 0, 0).unwrap(),
            allowed_downstream_namespaces: allowed,
            force: false,
        }
    }

    fn daily_job(name: &str, ns: NamespaceId, dependents: &[&str]) -> JobSpec {
        let mut job = JobSpec::builder(name)
            .schedule("0 2 * * *", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .namespace_id(ns)
            .build();
        job.dependents = dependents.iter().map(|d| d.to_string()).collect();
        job
    }

    fn far_future() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_tree_with_downstream_runs() {
        let ns = NamespaceId::new();
        let jobs = vec![daily_job("job-A", ns, &["job-B"]), daily_job("job-B", ns, &[])];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let plan = planner
            .build(&request("job-A", vec!["*".to_string()]), far_future())
            .unwrap();

        let tree = &plan.execution_tree;
        assert_eq!(tree.name(), "job-A");
        assert_eq!(tree.dependents.len(), 1);
        assert_eq!(tree.dependents[0].name(), "job-B");
        assert!(plan.ignored_jobs.is_empty());

        // four daily runs at 02:00Z on each node
        for node in tree.walk_bfs() {
            let runs: Vec<_> = node.runs.iter().map(|r| r.scheduled_at).collect();
            assert_eq!(
                runs,
                vec![
                    Utc.with_ymd_and_hms(2020, 11, 25, 2, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2020, 11, 26, 2, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2020, 11, 27, 2, 0, 0).unwrap(),
                    Utc.with_ymd_and_hms(2020, 11, 28, 2, 0, 0).unwrap(),
                ]
            );
        }
    }

    #[test]
    fn test_unknown_job_not_found() {
        let ns = NamespaceId::new();
        let jobs = vec![daily_job("job-A", ns, &[])];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let result = planner.build(&request("job-missing", vec!["*".to_string()]), far_future());
        assert!(matches!(result, Err(optimus_core::Error::NotFound(_))));
    }

    #[test]
    fn test_reversed_window_invalid() {
        let ns = NamespaceId::new();
        let jobs = vec![daily_job("job-A", ns, &[])];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let mut req = request("job-A", vec!["*".to_string()]);
        std::mem::swap(&mut req.start, &mut req.end);
        let result = planner.build(&req, far_future());
        assert!(matches!(result, Err(optimus_core::Error::InvalidArgument(_))));
    }

    #[test]
    fn test_namespace_filter_prunes_and_reports() {
        let finance = NamespaceId::new();
        let marketing = NamespaceId::new();
        let jobs = vec![
            daily_job("job-A", finance, &["job-B", "job-C"]),
            daily_job("job-B", finance, &[]),
            daily_job("job-C", marketing, &["job-D"]),
            daily_job("job-D", marketing, &[]),
        ];
        let names = namespaces(&[(finance, "finance"), (marketing, "marketing")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let plan = planner
            .build(&request("job-A", vec!["finance".to_string()]), far_future())
            .unwrap();

        let included: Vec<_> = plan
            .execution_tree
            .walk_bfs()
            .iter()
            .map(|n| n.name().to_string())
            .collect();
        assert_eq!(included, vec!["job-A", "job-B"]);
        // the pruned branch is reported whole
        assert_eq!(plan.ignored_jobs, vec!["job-C", "job-D"]);
    }

    #[test]
    fn test_empty_allow_list_suppresses_downstream() {
        let ns = NamespaceId::new();
        let jobs = vec![daily_job("job-A", ns, &["job-B"]), daily_job("job-B", ns, &[])];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let plan = planner.build(&request("job-A", vec![]), far_future()).unwrap();
        // empty allow-list admits no namespace, so no dependents survive
        assert!(plan.execution_tree.dependents.is_empty());
        assert_eq!(plan.ignored_jobs, vec!["job-B"]);
    }

    #[test]
    fn test_runs_beyond_now_excluded() {
        let ns = NamespaceId::new();
        let jobs = vec![daily_job("job-A", ns, &[])];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        // clock stops after the 26th's run
        let now = Utc.with_ymd_and_hms(2020, 11, 26, 12, 0, 0).unwrap();
        let plan = planner
            .build(&request("job-A", vec!["*".to_string()]), now)
            .unwrap();
        let runs: Vec<_> = plan
            .execution_tree
            .runs
            .iter()
            .map(|r| r.scheduled_at)
            .collect();
        assert_eq!(
            runs,
            vec![
                Utc.with_ymd_and_hms(2020, 11, 25, 2, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 11, 26, 2, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_single_day_window_single_run() {
        let ns = NamespaceId::new();
        let jobs = vec![daily_job("job-A", ns, &[])];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let mut req = request("job-A", vec!["*".to_string()]);
        req.end = req.start;
        let plan = planner.build(&req, far_future()).unwrap();
        assert_eq!(plan.execution_tree.runs.len(), 1);
    }

    #[test]
    fn test_runs_before_job_start_date_excluded() {
        let ns = NamespaceId::new();
        let mut job = daily_job("job-A", ns, &[]);
        job.schedule.start_date = Utc.with_ymd_and_hms(2020, 11, 27, 0, 0, 0).unwrap();
        let jobs = vec![job];
        let names = namespaces(&[(ns, "finance")]);
        let planner = ReplayPlanner::new(&jobs, &names);

        let plan = planner
            .build(&request("job-A", vec!["*".to_string()]), far_future())
            .unwrap();
        assert_eq!(plan.execution_tree.runs.len(), 2);
    }
}
