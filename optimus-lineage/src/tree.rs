//! Dependency trees
//!
//! [`TreeNode`] is the owned, recursive tree handed out by the replay
//! planner: a job, its ordered set of scheduled runs, and its dependents.
//! [`MultiRootTree`] is a name-keyed forest used for cycle detection and
//! level walks; deep graphs are common, so every traversal here is
//! iterative.

use chrono::{DateTime, Utc};
use optimus_core::{JobSpec, RunState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// One scheduled run inside a tree node, optionally annotated with the
/// state the scheduler reported at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub scheduled_at: DateTime<Utc>,
    pub state: Option<RunState>,
}

impl Run {
    pub fn at(scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at,
            state: None,
        }
    }

    pub fn with_state(scheduled_at: DateTime<Utc>, state: RunState) -> Self {
        Self {
            scheduled_at,
            state: Some(state),
        }
    }

    fn identity_rank(&self) -> u8 {
        match self.state {
            None => 0,
            Some(RunState::Pending) => 1,
            Some(RunState::Running) => 2,
            Some(RunState::Success) => 3,
            Some(RunState::Failed) => 4,
        }
    }
}

// runs sort ascending by timestamp; ties break on run identity
impl Ord for Run {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.scheduled_at
            .cmp(&other.scheduled_at)
            .then(self.identity_rank().cmp(&other.identity_rank()))
    }
}

impl PartialOrd for Run {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A node of an owned dependency tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub job: JobSpec,
    pub runs: BTreeSet<Run>,
    pub dependents: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(job: JobSpec) -> Self {
        Self {
            job,
            runs: BTreeSet::new(),
            dependents: Vec::new(),
        }
    }

    /// Name of the job this node carries
    pub fn name(&self) -> &str {
        &self.job.name
    }

    /// Add a run, keeping the set ordered
    pub fn add_run(&mut self, run: Run) {
        self.runs.insert(run);
    }

    /// Add a dependent subtree; duplicates by job name are dropped
    pub fn add_dependent(&mut self, child: TreeNode) {
        if self.dependents.iter().any(|d| d.name() == child.name()) {
            return;
        }
        self.dependents.push(child);
    }

    /// All nodes in BFS order, root first
    pub fn walk_bfs(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(self);
        while let Some(node) = queue.pop_front() {
            out.push(node);
            for child in &node.dependents {
                queue.push_back(child);
            }
        }
        out
    }

    /// Mutable BFS visit over every node
    pub fn visit_bfs_mut<F: FnMut(&mut TreeNode)>(&mut self, mut f: F) {
        let mut queue: VecDeque<&mut TreeNode> = VecDeque::new();
        queue.push_back(self);
        while let Some(node) = queue.pop_front() {
            f(&mut *node);
            for child in &mut node.dependents {
                queue.push_back(child);
            }
        }
    }

    /// Total number of nodes in the subtree
    pub fn count(&self) -> usize {
        self.walk_bfs().len()
    }

    /// Render the tree with runs, one node per line, indented by depth
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<(&TreeNode, usize)> = vec![(self, 0)];
        while let Some((node, depth)) = stack.pop() {
            out.push_str(&"  ".repeat(depth));
            out.push_str(node.name());
            if !node.runs.is_empty() {
                let runs: Vec<String> = node
                    .runs
                    .iter()
                    .map(|r| match r.state {
                        Some(state) => format!("{} ({})", r.scheduled_at.format("%Y-%m-%dT%H:%M:%SZ"), state),
                        None => r.scheduled_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                    })
                    .collect();
                out.push_str(&format!(" [{}]", runs.join(", ")));
            }
            out.push('\n');
            for child in node.dependents.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }
}

/// DFS coloring for cycle detection
#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// A name-keyed forest of dependency edges. Multiple independent roots are
/// the norm: every job without an upstream in the set is a root.
#[derive(Debug, Default)]
pub struct MultiRootTree {
    dependents: HashMap<String, Vec<String>>,
    has_upstream: HashSet<String>,
}

impl MultiRootTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists
    pub fn add_node(&mut self, name: impl Into<String>) {
        self.dependents.entry(name.into()).or_default();
    }

    /// Record that `dependent` runs downstream of `upstream`
    pub fn connect(&mut self, upstream: &str, dependent: &str) {
        self.add_node(upstream);
        self.add_node(dependent);
        let children = self
            .dependents
            .get_mut(upstream)
            .expect("node inserted above");
        if !children.iter().any(|c| c == dependent) {
            children.push(dependent.to_string());
        }
        self.has_upstream.insert(dependent.to_string());
    }

    /// Direct dependents of a node
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All node names, sorted for deterministic walks
    pub fn nodes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.dependents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Nodes without any upstream in the forest
    pub fn roots(&self) -> Vec<&str> {
        self.nodes()
            .into_iter()
            .filter(|name| !self.has_upstream.contains(*name))
            .collect()
    }

    /// Detect a cycle, returning its path (`a -> b -> a` as
    /// `["a", "b", "a"]`). Iterative DFS with gray/black coloring so deep
    /// graphs cannot blow the stack.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut colors: HashMap<&str, Color> = self
            .dependents
            .keys()
            .map(|name| (name.as_str(), Color::White))
            .collect();

        for start in self.nodes() {
            if colors[start] != Color::White {
                continue;
            }

            // stack entries: (node, next child index), path mirrors the
            // gray chain
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            let mut path: Vec<&str> = vec![start];
            colors.insert(start, Color::Gray);

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let children = self.dependents_of(node);
                if frame.1 >= children.len() {
                    colors.insert(node, Color::Black);
                    stack.pop();
                    path.pop();
                    continue;
                }
                let child = children[frame.1].as_str();
                frame.1 += 1;

                match colors[child] {
                    Color::Gray => {
                        // found the back edge: slice the gray path from the
                        // first occurrence of child and close the loop
                        let cycle_start = path
                            .iter()
                            .position(|n| *n == child)
                            .expect("gray node is on the path");
                        let mut cycle: Vec<String> =
                            path[cycle_start..].iter().map(|s| s.to_string()).collect();
                        cycle.push(child.to_string());
                        return Some(cycle);
                    }
                    Color::White => {
                        colors.insert(child, Color::Gray);
                        stack.push((child, 0));
                        path.push(child);
                    }
                    Color::Black => {}
                }
            }
        }
        None
    }

    /// Names of every node on some cycle, empty when the forest is acyclic
    pub fn nodes_on_cycles(&self) -> HashSet<String> {
        let mut on_cycle = HashSet::new();
        // each detected cycle is removed from consideration by collecting
        // all members through repeated detection over a shrinking view
        let mut remaining = self.clone_edges();
        while let Some(cycle) = remaining.detect_cycle() {
            for name in &cycle {
                on_cycle.insert(name.clone());
            }
            for name in cycle {
                remaining.dependents.remove(&name);
                for children in remaining.dependents.values_mut() {
                    children.retain(|c| *c != name);
                }
            }
        }
        on_cycle
    }

    fn clone_edges(&self) -> MultiRootTree {
        MultiRootTree {
            dependents: self.dependents.clone(),
            has_upstream: self.has_upstream.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use optimus_core::JobSpec;

    fn job(name: &str) -> JobSpec {
        JobSpec::builder(name).build()
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 11, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_runs_stay_sorted() {
        let mut node = TreeNode::new(job("job-A"));
        node.add_run(Run::at(at(27, 2)));
        node.add_run(Run::at(at(25, 2)));
        node.add_run(Run::at(at(26, 2)));

        let times: Vec<_> = node.runs.iter().map(|r| r.scheduled_at).collect();
        assert_eq!(times, vec![at(25, 2), at(26, 2), at(27, 2)]);
    }

    #[test]
    fn test_duplicate_runs_deduped() {
        let mut node = TreeNode::new(job("job-A"));
        node.add_run(Run::at(at(25, 2)));
        node.add_run(Run::at(at(25, 2)));
        assert_eq!(node.runs.len(), 1);
    }

    #[test]
    fn test_dependents_deduped_by_name() {
        let mut node = TreeNode::new(job("job-A"));
        node.add_dependent(TreeNode::new(job("job-B")));
        node.add_dependent(TreeNode::new(job("job-B")));
        assert_eq!(node.dependents.len(), 1);
    }

    #[test]
    fn test_bfs_order() {
        let mut root = TreeNode::new(job("job-A"));
        let mut b = TreeNode::new(job("job-B"));
        b.add_dependent(TreeNode::new(job("job-D")));
        root.add_dependent(b);
        root.add_dependent(TreeNode::new(job("job-C")));

        let names: Vec<_> = root.walk_bfs().iter().map(|n| n.name().to_string()).collect();
        assert_eq!(names, vec!["job-A", "job-B", "job-C", "job-D"]);
    }

    #[test]
    fn test_render_indents_by_depth() {
        let mut root = TreeNode::new(job("job-A"));
        root.add_run(Run::at(at(25, 2)));
        root.add_dependent(TreeNode::new(job("job-B")));

        let rendered = root.render();
        assert!(rendered.starts_with("job-A [2020-11-25T02:00:00Z]\n"));
        assert!(rendered.contains("\n  job-B\n"));
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let mut forest = MultiRootTree::new();
        forest.connect("job-A", "job-B");
        forest.connect("job-B", "job-C");
        assert!(forest.detect_cycle().is_none());
        assert_eq!(forest.roots(), vec!["job-A"]);
    }

    #[test]
    fn test_two_node_cycle_path() {
        let mut forest = MultiRootTree::new();
        forest.connect("job-A", "job-B");
        forest.connect("job-B", "job-A");

        let cycle = forest.detect_cycle().unwrap();
        assert_eq!(cycle.len(), 3);
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.contains(&"job-A".to_string()));
        assert!(cycle.contains(&"job-B".to_string()));
    }

    #[test]
    fn test_self_cycle_detected() {
        let mut forest = MultiRootTree::new();
        forest.connect("job-A", "job-A");
        let cycle = forest.detect_cycle().unwrap();
        assert_eq!(cycle, vec!["job-A".to_string(), "job-A".to_string()]);
    }

    #[test]
    fn test_cycle_members_collected() {
        let mut forest = MultiRootTree::new();
        forest.connect("job-A", "job-B");
        forest.connect("job-B", "job-A");
        forest.connect("job-C", "job-D");

        let on_cycle = forest.nodes_on_cycles();
        assert!(on_cycle.contains("job-A"));
        assert!(on_cycle.contains("job-B"));
        assert!(!on_cycle.contains("job-C"));
        assert!(!on_cycle.contains("job-D"));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut forest = MultiRootTree::new();
        for i in 0..10_000 {
            forest.connect(&format!("job-{}", i), &format!("job-{}", i + 1));
        }
        assert!(forest.detect_cycle().is_none());
    }
}
