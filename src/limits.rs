//! Run-level resource limits.
//!
//! Mirrors the teacher's `ResourceLimits`: a small, `Default`-deriving
//! config struct with named constructors for the common presets, consulted
//! by the runner (`max_concurrent_tasks`, the two duration ceilings) and by
//! the value map / cache (`max_output_bytes`, a safety rail on values that
//! get digested for caching).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock ceiling for an entire run, enforced by the runner via
    /// `tokio::time::timeout` around the whole wave loop.
    pub max_workflow_duration: Duration,
    /// Wall-clock ceiling for a single task's `run` invocation.
    pub max_task_duration: Duration,
    /// Upper bound on tasks executing concurrently, enforced with a
    /// `tokio::sync::Semaphore`. `None` means unbounded (the runtime's
    /// worker count is the only cap).
    pub max_concurrent_tasks: Option<usize>,
    /// Upper bound, in bytes, on a value's canonical serialization before
    /// the cache refuses to digest it.
    pub max_output_bytes: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        RunLimits {
            max_workflow_duration: Duration::from_secs(300),
            max_task_duration: Duration::from_secs(60),
            max_concurrent_tasks: None,
            max_output_bytes: 16 * 1024 * 1024,
        }
    }
}

impl RunLimits {
    /// No ceilings at all; useful for embedding the engine in a caller that
    /// already enforces its own timeouts.
    pub fn unbounded() -> Self {
        RunLimits {
            max_workflow_duration: Duration::from_secs(u64::MAX / 2),
            max_task_duration: Duration::from_secs(u64::MAX / 2),
            max_concurrent_tasks: None,
            max_output_bytes: usize::MAX,
        }
    }

    /// Short ceilings suited to unit/integration tests so a hung task fails
    /// fast instead of stalling the test suite.
    pub fn for_tests() -> Self {
        RunLimits {
            max_workflow_duration: Duration::from_secs(10),
            max_task_duration: Duration::from_secs(5),
            max_concurrent_tasks: Some(8),
            max_output_bytes: 1024 * 1024,
        }
    }
}
