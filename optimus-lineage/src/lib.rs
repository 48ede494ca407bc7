//! # Optimus Lineage
//!
//! DAG library for the dependency structures Optimus maintains: owned
//! dependency trees with scheduled runs (replay plans), a multi-root forest
//! over job names (cycle detection, priority walks), and a petgraph-backed
//! project graph for upstream/downstream queries.

pub mod graph;
pub mod tree;

pub use graph::{EdgeLabel, JobGraph, JobNode};
pub use tree::{MultiRootTree, Run, TreeNode};

/// Result type for lineage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the DAG library
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("node not found: {0}")]
    NodeNotFound(String),
}
