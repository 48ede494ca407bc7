//! Project dependency graph
//!
//! A petgraph-backed view over the resolved edges of one project, used for
//! upstream/downstream queries and whole-graph cycle checks. Rebuilt from
//! flat edges on every resolver pass; never mutated concurrently.

use optimus_core::EdgeKind;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Node payload: the job and the namespace it belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNode {
    pub job_name: String,
    pub namespace_name: String,
}

/// Edge payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeLabel {
    pub kind: EdgeKind,
}

/// Directed graph of job dependencies; edges point upstream → dependent
pub struct JobGraph {
    graph: DiGraph<JobNode, EdgeLabel>,
    by_name: HashMap<String, NodeIndex>,
}

impl JobGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add a job node; repeated adds of the same name are no-ops
    pub fn add_job(&mut self, job_name: &str, namespace_name: &str) -> NodeIndex {
        if let Some(&idx) = self.by_name.get(job_name) {
            return idx;
        }
        let idx = self.graph.add_node(JobNode {
            job_name: job_name.to_string(),
            namespace_name: namespace_name.to_string(),
        });
        self.by_name.insert(job_name.to_string(), idx);
        idx
    }

    /// Record that `dependent` consumes `upstream`'s output. Both nodes must
    /// already exist.
    pub fn add_edge(
        &mut self,
        upstream: &str,
        dependent: &str,
        kind: EdgeKind,
    ) -> crate::Result<()> {
        let from = *self
            .by_name
            .get(upstream)
            .ok_or_else(|| crate::Error::NodeNotFound(upstream.to_string()))?;
        let to = *self
            .by_name
            .get(dependent)
            .ok_or_else(|| crate::Error::NodeNotFound(dependent.to_string()))?;
        self.graph.update_edge(from, to, EdgeLabel { kind });
        Ok(())
    }

    /// The node payload for a job, if present
    pub fn get(&self, job_name: &str) -> Option<&JobNode> {
        self.by_name.get(job_name).map(|idx| &self.graph[*idx])
    }

    /// Direct upstreams of a job
    pub fn upstream_of(&self, job_name: &str) -> Vec<&JobNode> {
        self.neighbors(job_name, Direction::Incoming)
    }

    /// Direct dependents of a job
    pub fn downstream_of(&self, job_name: &str) -> Vec<&JobNode> {
        self.neighbors(job_name, Direction::Outgoing)
    }

    /// All transitive dependents of a job in BFS order, the job excluded
    pub fn transitive_downstream(&self, job_name: &str) -> Vec<&JobNode> {
        let Some(&start) = self.by_name.get(job_name) else {
            return Vec::new();
        };
        let mut seen: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue: VecDeque<NodeIndex> = VecDeque::from([start]);
        let mut out = Vec::new();
        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if seen.insert(next) {
                    out.push(&self.graph[next]);
                    queue.push_back(next);
                }
            }
        }
        out
    }

    /// Whether the graph has any cycle
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Total number of nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Total number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn neighbors(&self, job_name: &str, direction: Direction) -> Vec<&JobNode> {
        if let Some(&idx) = self.by_name.get(job_name) {
            self.graph
                .neighbors_directed(idx, direction)
                .map(|i| &self.graph[i])
                .collect()
        } else {
            Vec::new()
        }
    }
}

impl Default for JobGraph {
    fn default() -> Self {
        Self::new()
    }
}
