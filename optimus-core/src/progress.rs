//! Progress sink fabric
//!
//! Long-running operations stream typed events through a sink. A sink is an
//! in-process subscriber, a streaming writer, or a chain multiplexing many
//! sinks. Delivery is best-effort: sink errors are logged and never fail the
//! producer. Each concrete sink serializes delivery with its own mutex so
//! concurrent producers cannot interleave a single event's fields.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// A progress event emitted by an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job's compiled artifact was uploaded to the scheduler
    JobUpload {
        job_name: String,
        success: bool,
        message: Option<String>,
    },
    /// A job was removed from the scheduler
    JobRemoteDelete { job_name: String },
    /// A job passed validation
    JobCheckPassed { job_name: String },
    /// A job failed validation
    JobCheckFailed { job_name: String, reason: String },
    /// A job referenced a destination no known job produces
    JobSpecUnknownDependencyUsed { job_name: String, dependency: String },
    /// A job's dependencies resolved successfully
    JobDependencyResolved { job_name: String },
    /// A job's dependency resolution failed
    JobDependencyResolutionFailed { job_name: String, reason: String },
    /// Priority weights were assigned across the project
    JobPriorityWeightAssigned,
    /// A resource spec was created or updated in its datastore
    ResourceUpdated {
        resource_name: String,
        success: bool,
        message: Option<String>,
    },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::JobUpload {
                job_name, success, ..
            } => write!(f, "uploaded job {}, success: {}", job_name, success),
            Event::JobRemoteDelete { job_name } => {
                write!(f, "deleted job from scheduler: {}", job_name)
            }
            Event::JobCheckPassed { job_name } => write!(f, "check passed: {}", job_name),
            Event::JobCheckFailed { job_name, reason } => {
                write!(f, "check failed: {}: {}", job_name, reason)
            }
            Event::JobSpecUnknownDependencyUsed {
                job_name,
                dependency,
            } => write!(f, "unknown dependency {} used by {}", dependency, job_name),
            Event::JobDependencyResolved { job_name } => {
                write!(f, "dependencies resolved: {}", job_name)
            }
            Event::JobDependencyResolutionFailed { job_name, reason } => {
                write!(f, "dependency resolution failed: {}: {}", job_name, reason)
            }
            Event::JobPriorityWeightAssigned => write!(f, "priority weights assigned"),
            Event::ResourceUpdated {
                resource_name,
                success,
                ..
            } => write!(f, "updated resource {}, success: {}", resource_name, success),
        }
    }
}

/// A subscriber receiving typed progress events for one operation
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Sink that records events in memory; used by tests and status endpoints
#[derive(Default)]
pub struct BufferSink {
    events: Mutex<Vec<Event>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events observed so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("buffer sink lock poisoned").clone()
    }
}

impl ProgressSink for BufferSink {
    fn notify(&self, event: &Event) {
        self.events
            .lock()
            .expect("buffer sink lock poisoned")
            .push(event.clone());
    }
}

/// Sink that writes events to the process log
#[derive(Default)]
pub struct LogSink {
    // serializes delivery so one event's fields are not interleaved
    guard: Mutex<()>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for LogSink {
    fn notify(&self, event: &Event) {
        let _guard = self.guard.lock().expect("log sink lock poisoned");
        info!(event = %event, "progress");
    }
}

/// Sink multiplexing a list of sinks
#[derive(Default)]
pub struct ChainSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl ChainSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sinks.push(sink);
    }
}

impl ProgressSink for ChainSink {
    fn notify(&self, event: &Event) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sink_records_in_order() {
        let sink = BufferSink::new();
        sink.notify(&Event::JobCheckPassed {
            job_name: "job-A".to_string(),
        });
        sink.notify(&Event::JobUpload {
            job_name: "job-A".to_string(),
            success: true,
            message: None,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::JobCheckPassed { .. }));
        assert!(matches!(events[1], Event::JobUpload { .. }));
    }

    #[test]
    fn test_chain_fans_out() {
        let a = Arc::new(BufferSink::new());
        let b = Arc::new(BufferSink::new());
        let chain = ChainSink::new(vec![a.clone(), b.clone()]);

        chain.notify(&Event::JobPriorityWeightAssigned);

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }

    #[test]
    fn test_concurrent_producers_do_not_interleave() {
        use std::thread;

        let sink = Arc::new(BufferSink::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        sink.notify(&Event::JobDependencyResolved {
                            job_name: format!("job-{}", i),
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.events().len(), 800);
    }
}
