//! Run context: the bundle every task's `run` closure receives.
//!
//! Carries the pieces described in §5/§6: the shared result map, the
//! metadata channel, the run mode, the cancellation token, and (while a
//! task is executing) that task's own implementation id, used by the
//! [`crate::logging`] adapter to decorate log records.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::metadata::MetadataMap;
use crate::value_map::ValueMap;

/// Whether a run is evaluating form defaults/validation for editing, or
/// actually executing the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    DryRun,
    Run,
}

impl RunMode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, RunMode::DryRun)
    }
}

/// The caller-supplied input map keyed by form id, read by form-field tasks
/// while computing their converted value. Immutable for the duration of a
/// run.
#[derive(Debug, Clone, Default)]
pub struct InspectionRequest {
    values: Arc<ValueMap>,
}

impl InspectionRequest {
    pub fn new() -> Self {
        InspectionRequest {
            values: Arc::new(ValueMap::new()),
        }
    }

    pub fn with(self, field_id: impl Into<String>, raw: String) -> Self {
        self.values.set(field_id.into(), raw);
        self
    }

    pub fn get(&self, field_id: &str) -> Option<String> {
        self.values.get::<String>(field_id)
    }
}

/// Context shared by an entire run, created once by the runner and handed
/// (with a per-task overlay, see [`RunContext::for_task`]) to every task.
#[derive(Clone)]
pub struct RunContext {
    pub(crate) results: Arc<ValueMap>,
    pub(crate) shared: Arc<ValueMap>,
    pub(crate) metadata: Arc<MetadataMap>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) run_mode: RunMode,
    pub(crate) inspection_request: InspectionRequest,
    /// Implementation id of the task currently executing, if any. Set by
    /// the runner for the duration of one task invocation; absent at the
    /// base/root context.
    pub(crate) current_task: Option<Arc<str>>,
}

impl RunContext {
    pub fn new(
        results: Arc<ValueMap>,
        metadata: Arc<MetadataMap>,
        cancellation: CancellationToken,
        run_mode: RunMode,
        inspection_request: InspectionRequest,
    ) -> Self {
        RunContext {
            results,
            shared: Arc::new(ValueMap::new()),
            metadata,
            cancellation,
            run_mode,
            inspection_request,
            current_task: None,
        }
    }

    /// Derives a per-task context tagging `task_id`, used by the logging
    /// adapter and by form tasks to key their history slot.
    pub fn for_task(&self, task_id: Arc<str>) -> RunContext {
        RunContext {
            results: self.results.clone(),
            shared: self.shared.clone(),
            metadata: self.metadata.clone(),
            cancellation: self.cancellation.child_token(),
            run_mode: self.run_mode,
            inspection_request: self.inspection_request.clone(),
            current_task: Some(task_id),
        }
    }

    pub fn results(&self) -> &ValueMap {
        &self.results
    }

    /// Shared scratch state outside the result map. The engine never reads
    /// or writes it, only tasks that explicitly opt in (e.g. the form
    /// builder's per-field history).
    pub fn shared(&self) -> &ValueMap {
        &self.shared
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn inspection_request(&self) -> &InspectionRequest {
        &self.inspection_request
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The implementation id of the task currently running in this
    /// context, if any. `None` means "not inside a task" per the logging
    /// adapter's documented fallback.
    pub fn current_task(&self) -> Option<&str> {
        self.current_task.as_deref()
    }
}
