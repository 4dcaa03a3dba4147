//! # Task Graph Engine
//!
//! A typed task DAG engine: describe a computation as a set of named, typed
//! [`task::Task`]s with declared data dependencies, [`resolver::resolve`]
//! them into an executable order, and run that order with
//! [`runner::LocalRunner`] for maximum legal parallelism while keeping
//! strongly-typed results between tasks.
//!
//! ## Modules
//!
//! - [`id`] - reference (`Ref<T>`) and implementation (`Impl<T>`) identifiers
//! - [`value_map`] - the heterogeneous, concurrency-safe value store
//! - [`task`] - immutable task descriptors and their label map
//! - [`resolver`] - task set selection and topological ordering
//! - [`runner`] - the local, wave-based parallel executor
//! - [`cache`] - single-flight result memoization keyed by dependency digest
//! - [`metadata`] - the progress/form-field/error channel shared by every task
//! - [`context`] - the run context handed to every task's `run` closure
//! - [`form`] - the form-field task builder layered on the engine
//! - [`logging`] - the task-id-aware `tracing` adapter
//! - [`error`] - the engine-wide error taxonomy (`ENGINE-0xx` codes)
//! - [`limits`] - run-level resource ceilings
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use taskgraph::context::{InspectionRequest, RunMode};
//! use taskgraph::id::{new_default_impl, new_ref};
//! use taskgraph::resolver::{resolve, TaskSet};
//! use taskgraph::runner::{get_result, LocalRunner};
//! use taskgraph::task::Task;
//!
//! # async fn run() -> taskgraph::error::Result<()> {
//! let mut tasks = TaskSet::new();
//! tasks.add(
//!     Task::builder(new_default_impl::<i64>("gen")?)
//!         .build(|_ctx| async { Ok(1i64) })?,
//! )?;
//! tasks.add(
//!     Task::builder(new_default_impl::<i64>("double")?)
//!         .depends_on(new_ref::<i64>("gen")?)
//!         .build(|ctx| async move { Ok(ctx.results().get::<i64>("gen").unwrap_or(0) * 2) })?,
//! )?;
//!
//! let resolved = resolve(&tasks, &TaskSet::new(), None)?;
//! let runner = LocalRunner::new(resolved);
//! runner
//!     .run(Default::default(), RunMode::Run, InspectionRequest::new())
//!     .await?;
//!
//! assert_eq!(get_result(&runner, &new_ref::<i64>("double")?), Some(2));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod context;
pub mod error;
pub mod form;
pub mod id;
pub mod limits;
pub mod logging;
pub mod metadata;
pub mod resolver;
pub mod runner;
pub mod task;
pub mod value_map;

pub use cache::{LruResultCache, ResultCache};
pub use context::{InspectionRequest, RunContext, RunMode};
pub use error::{EngineError, FixSuggestion, Result};
pub use form::FormFieldBuilder;
pub use id::{new_default_impl, new_impl, new_ref, Impl, Ref, UntypedRef};
pub use limits::RunLimits;
pub use metadata::{FieldDescriptor, FieldType, HintType, MetadataMap, MetadataSnapshot};
pub use resolver::{resolve, AnyTask, ResolvedSet, TaskSet};
pub use runner::{get_result, LocalRunner};
pub use task::{CacheDigest, Feature, LabelMap, Task};
