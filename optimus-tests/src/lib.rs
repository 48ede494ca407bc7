//! # Optimus Tests
//!
//! Test support for the Optimus workspace: spec builders with scenario
//! defaults, mock collaborators, and a wired-up harness for end-to-end
//! tests.

pub mod assertions;
pub mod builders;
pub mod fixtures;
pub mod mocks;

pub use builders::{daily_job, test_registry, ConfigDrivenDependencyMod};
pub use fixtures::Harness;
pub use mocks::MockScheduler;
