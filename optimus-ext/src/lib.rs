//! # Optimus Ext
//!
//! Thin adapters between the Optimus core and the outside world: the
//! Airflow-class scheduler shim and datastore type controllers. The core
//! reaches these only through the `optimus-core` traits.

pub mod airflow;
pub mod warehouse;

pub use airflow::{AirflowScheduler, AirflowSchedulerConfig};
pub use warehouse::WarehouseDatastore;
