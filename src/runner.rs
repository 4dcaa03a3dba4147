//! Local runner: executes a [`crate::resolver::ResolvedSet`] with bounded
//! parallelism, honoring dependency order, first-error cancellation, and
//! progress reporting (§4.5).
//!
//! Grounded on the teacher's `runtime/runner.rs::run` loop: spawn a
//! `JoinSet` wave, drain it with `join_next`, recompute readiness, adapted
//! from "ready tasks" (recomputed each iteration by scanning the datastore)
//! to precomputed depth waves (the resolved set's topological order already
//! tells us which tasks can start together), and extended with real
//! cancellation wiring through `tokio_util::sync::CancellationToken`, which
//! the teacher's own `Cargo.toml` carries but never uses, and a
//! `tokio::sync::Semaphore` enforcing `RunLimits::max_concurrent_tasks`
//! across waves.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::context::{InspectionRequest, RunContext, RunMode};
use crate::error::{EngineError, Result};
use crate::limits::RunLimits;
use crate::metadata::MetadataMap;
use crate::resolver::{AnyTask, ResolvedSet};
use crate::value_map::ValueMap;

/// Runs a [`ResolvedSet`] to completion. Constructed once per run via
/// [`LocalRunner::new`]; `run` may be awaited only once per instance.
pub struct LocalRunner {
    resolved: ResolvedSet,
    limits: RunLimits,
    results: Arc<ValueMap>,
    metadata: Arc<MetadataMap>,
    cancellation: tokio_util::sync::CancellationToken,
    concurrency: Option<Arc<Semaphore>>,
    done: Arc<Notify>,
    outcome: tokio::sync::OnceCell<std::result::Result<(), EngineError>>,
}

impl LocalRunner {
    pub fn new(resolved: ResolvedSet) -> Self {
        Self::with_limits(resolved, RunLimits::default())
    }

    pub fn with_limits(resolved: ResolvedSet, limits: RunLimits) -> Self {
        let concurrency = limits.max_concurrent_tasks.map(|n| Arc::new(Semaphore::new(n)));
        LocalRunner {
            resolved,
            limits,
            results: Arc::new(ValueMap::new()),
            metadata: Arc::new(MetadataMap::new()),
            cancellation: tokio_util::sync::CancellationToken::new(),
            concurrency,
            done: Arc::new(Notify::new()),
            outcome: tokio::sync::OnceCell::new(),
        }
    }

    /// External cancellation handle: cancelling this token is observed by
    /// every in-flight task at its next cooperation point.
    pub fn cancellation_token(&self) -> tokio_util::sync::CancellationToken {
        self.cancellation.clone()
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// Executes the resolved set. `base_cancellation` is the caller's own
    /// context cancellation (§5): its child tokens are what every task
    /// ultimately observes, so cancelling it externally also cancels the
    /// run. `initial_values` seeds the result map before any task runs
    /// (used by the form builder to pre-populate upstream field state).
    #[instrument(skip_all, fields(tasks = self.resolved.order.len()))]
    pub async fn run(
        &self,
        base_cancellation: tokio_util::sync::CancellationToken,
        run_mode: RunMode,
        inspection_request: InspectionRequest,
    ) -> Result<()> {
        self.metadata.set_run_mode(run_mode);
        let cancellation = self.cancellation.clone();
        let _forward = {
            let cancellation = cancellation.clone();
            tokio::spawn(async move {
                base_cancellation.cancelled().await;
                cancellation.cancel();
            })
        };

        let base_ctx = RunContext::new(
            self.results.clone(),
            self.metadata.clone(),
            cancellation.clone(),
            run_mode,
            inspection_request,
        );

        let depths = self.resolved.depths();
        let mut by_depth: BTreeMap<usize, Vec<Arc<dyn AnyTask>>> = BTreeMap::new();
        for task in &self.resolved.order {
            let depth = depths.get(task.impl_id()).copied().unwrap_or(0);
            by_depth.entry(depth).or_default().push(task.clone());
        }

        let outcome = self.run_waves(base_ctx, by_depth).await;
        let _ = self.outcome.set(outcome.clone());
        self.done.notify_waiters();
        outcome
    }

    async fn run_waves(
        &self,
        base_ctx: RunContext,
        by_depth: BTreeMap<usize, Vec<Arc<dyn AnyTask>>>,
    ) -> Result<()> {
        for (depth, wave) in by_depth {
            if self.cancellation.is_cancelled() {
                return Err(EngineError::Cancelled { reason: None });
            }

            let timeout = tokio::time::timeout(
                self.limits.max_workflow_duration,
                self.run_wave(&base_ctx, depth, wave),
            )
            .await;

            match timeout {
                Ok(result) => result?,
                Err(_) => {
                    self.cancellation.cancel();
                    return Err(EngineError::Cancelled {
                        reason: Some("max_workflow_duration exceeded".to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    async fn run_wave(
        &self,
        base_ctx: &RunContext,
        depth: usize,
        wave: Vec<Arc<dyn AnyTask>>,
    ) -> Result<()> {
        let mut join_set = JoinSet::new();

        for task in wave {
            let ctx = base_ctx.for_task(Arc::from(task.impl_id()));
            let cancellation = self.cancellation.clone();
            let metadata = self.metadata.clone();
            let results = self.results.clone();
            let max_task_duration = self.limits.max_task_duration;
            let progress_reportable = task.progress_reportable();
            let impl_id: Arc<str> = Arc::from(task.impl_id());
            let reference_id = task.reference_id().to_string();
            let concurrency = self.concurrency.clone();

            join_set.spawn(execute_one(
                task,
                ctx,
                cancellation,
                metadata,
                results,
                max_task_duration,
                progress_reportable,
                impl_id,
                reference_id,
                concurrency,
            ));
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(depth, error = %err, "task failed, cancelling run");
                    self.cancellation.cancel();
                    first_error.get_or_insert(err);
                }
                Err(join_err) => {
                    self.cancellation.cancel();
                    let err = EngineError::Panicked {
                        task: "unknown".to_string(),
                        message: join_err.to_string(),
                    };
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        info!(depth, "wave complete");
        Ok(())
    }

    /// Blocks until the run has produced a completion event, per §4.5 step 4.
    pub async fn wait(&self) {
        if self.outcome.initialized() {
            return;
        }
        self.done.notified().await;
    }

    /// The final result map and the first captured error, if any.
    pub fn result(&self) -> (Arc<ValueMap>, Option<EngineError>) {
        let error = self.outcome.get().and_then(|r| r.clone().err());
        (self.results.clone(), error)
    }
}

/// Executes one task to completion under its permit, timeout, and progress
/// bookkeeping. A free function rather than a method: it is spawned onto
/// the `JoinSet` and must be `'static`, so it owns every argument instead
/// of borrowing `&self`. `#[instrument]`'s `task` field is what
/// [`crate::logging::TaskIdLayer`] reads to attribute every log line
/// emitted during the task's body to it, mirroring the teacher's
/// `TaskExecutor::execute`'s `#[instrument(fields(action_type = ...))]`.
#[instrument(
    skip(
        task,
        ctx,
        cancellation,
        metadata,
        results,
        concurrency,
        reference_id,
        max_task_duration,
        progress_reportable,
        impl_id
    ),
    fields(task = %impl_id)
)]
#[allow(clippy::too_many_arguments)]
async fn execute_one(
    task: Arc<dyn AnyTask>,
    ctx: RunContext,
    cancellation: tokio_util::sync::CancellationToken,
    metadata: Arc<MetadataMap>,
    results: Arc<ValueMap>,
    max_task_duration: std::time::Duration,
    progress_reportable: bool,
    impl_id: Arc<str>,
    reference_id: String,
    concurrency: Option<Arc<Semaphore>>,
) -> Result<()> {
    if cancellation.is_cancelled() {
        return Err(EngineError::Cancelled { reason: None });
    }

    let _permit = match &concurrency {
        Some(sem) => Some(
            sem.clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::other("concurrency semaphore closed unexpectedly"))?,
        ),
        None => None,
    };

    if progress_reportable {
        metadata.progress.acquire(impl_id.clone());
    }

    let outcome = tokio::time::timeout(max_task_duration, task.run_erased(ctx))
        .await
        .map_err(|_| EngineError::TaskFailure {
            task: impl_id.to_string(),
            message: "max_task_duration exceeded".to_string(),
        })
        .and_then(|inner| inner);

    if progress_reportable {
        metadata.progress.release(&impl_id);
    }

    match outcome {
        Ok(value) => {
            results.set_erased(reference_id, value);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Typed accessor matching §6's `getResult[T](runner, ref)`: returns the
/// value or `None`, never a value of another type (testable property 6).
pub fn get_result<T: Clone + Send + Sync + 'static>(
    runner: &LocalRunner,
    reference: &crate::id::Ref<T>,
) -> Option<T> {
    runner.results.get::<T>(reference.string())
}
