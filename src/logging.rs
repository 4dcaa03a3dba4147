//! Logging adapter (C10).
//!
//! The engine itself only emits `tracing` events; `runner.rs`'s wave loop
//! carries `#[instrument]` spans in the same style as the teacher's
//! `runtime/executor.rs` (`fields(action_type = ...)`, `fields(url = ...)`).
//! [`TaskIdLayer`] is new work layered on top: it tracks, per thread, which
//! task's span is currently entered, so [`current_task_id`] lets any code,
//! including a caller's own `fmt` layer, attribute a log line to the task
//! that produced it without every task body repeating `task = %impl_id` on
//! every event by hand.

use std::cell::RefCell;

use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// The span field name the runner tags with the running task's
/// implementation id (see `runner.rs`'s `for_task`/`#[instrument]` use).
/// Spans not carrying this field leave [`current_task_id`] unchanged, per
/// §6's "pass through undecorated when no task span is active" contract.
pub const TASK_FIELD: &str = "task";

thread_local! {
    static TASK_STACK: RefCell<Vec<(span::Id, String)>> = const { RefCell::new(Vec::new()) };
}

/// The implementation id of the innermost entered task span on the current
/// thread, if any.
pub fn current_task_id() -> Option<String> {
    TASK_STACK.with(|stack| stack.borrow().last().map(|(_, task)| task.clone()))
}

/// Installs the teacher's `fmt` + `EnvFilter` subscriber, with [`TaskIdLayer`]
/// layered underneath so task attribution is tracked alongside formatting.
/// Grounded on `main.rs`'s `tracing_subscriber::fmt().with_env_filter(...)`
/// setup.
pub fn init() {
    use tracing_subscriber::prelude::*;

    let _ = tracing_subscriber::registry()
        .with(TaskIdLayer)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Default)]
struct TaskIdVisitor {
    task: Option<String>,
}

impl Visit for TaskIdVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == TASK_FIELD {
            self.task.get_or_insert_with(|| format!("{value:?}").trim_matches('"').to_string());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == TASK_FIELD {
            self.task.get_or_insert_with(|| value.to_string());
        }
    }
}

/// Per-span storage for the extracted task id, stashed in the span's
/// extensions map, the standard `tracing_subscriber` pattern for
/// layer-private per-span state.
struct TaskId(String);

/// A [`Layer`] that maintains [`current_task_id`] as task spans (spans
/// carrying a `task` field, per [`TASK_FIELD`]) are entered and exited.
///
/// Tracks `on_enter`/`on_exit` rather than span creation/drop: a task's
/// `#[instrument]`-wrapped future is re-entered on every `poll`, and tokio
/// may resume that poll on a different worker thread than the one that
/// last polled it, so a thread-local stack must follow enter/exit, not
/// creation/close, to stay correct across that migration.
pub struct TaskIdLayer;

impl<S> Layer<S> for TaskIdLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = TaskIdVisitor::default();
        attrs.record(&mut visitor);
        if let Some(task) = visitor.task {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(TaskId(task));
            }
        }
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let Some(task_id) = span.extensions().get::<TaskId>().map(|t| t.0.clone()) else {
            return;
        };
        TASK_STACK.with(|stack| stack.borrow_mut().push((id.clone(), task_id)));
    }

    fn on_exit(&self, id: &span::Id, _ctx: Context<'_, S>) {
        TASK_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.last().is_some_and(|(entered, _)| entered == id) {
                stack.pop();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_task_span_means_no_current_task() {
        assert_eq!(current_task_id(), None);
    }

    #[test]
    fn task_span_sets_current_task_id_until_closed() {
        let subscriber = tracing_subscriber::registry().with_task_id_layer();
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(current_task_id(), None);
            {
                let span = tracing::info_span!("run_task", task = "gen#default");
                let _enter = span.enter();
                assert_eq!(current_task_id(), Some("gen#default".to_string()));
            }
            assert_eq!(current_task_id(), None);
        });
    }

    #[test]
    fn task_field_constant_matches_runner_instrumentation() {
        assert_eq!(TASK_FIELD, "task");
    }

    trait WithTaskIdLayer: Sized {
        fn with_task_id_layer(self) -> tracing_subscriber::layer::Layered<TaskIdLayer, Self>
        where
            Self: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>;
    }

    impl<T> WithTaskIdLayer for T {
        fn with_task_id_layer(self) -> tracing_subscriber::layer::Layered<TaskIdLayer, Self>
        where
            Self: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
        {
            use tracing_subscriber::Layer;
            TaskIdLayer.with_subscriber(self)
        }
    }
}
