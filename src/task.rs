//! Task definitions.
//!
//! A [`Task<T>`] is an immutable descriptor: an implementation id, a list
//! of dependency references, a label map, and a `run` closure the engine
//! never introspects. Construction goes through [`TaskBuilder`], in the
//! same small-named-config-struct style as the teacher's `TaskConfig`.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RunContext;
use crate::error::EngineError;
use crate::id::{Impl, UntypedRef};

pub type RunFuture<T> = Pin<Box<dyn Future<Output = Result<T, EngineError>> + Send>>;
pub type RunFn<T> = Arc<dyn Fn(RunContext) -> RunFuture<T> + Send + Sync>;

/// A feature a task opts a workflow into, surfaced to the application layer
/// independent of the dependency graph itself.
#[derive(Debug, Clone)]
pub struct Feature {
    pub title: String,
    pub description: String,
    pub default_on: bool,
    pub applicable_inspection_types: Vec<String>,
}

/// Opaque, tagged attributes attached to a task. Constructed with
/// [`LabelMap::builder`] and consulted by the resolver (inspection-type
/// filtering) and the runner (progress-reportable, cacheable).
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    pub feature: Option<Feature>,
    pub inspection_types: BTreeSet<String>,
    pub progress_reportable: bool,
    pub cacheable: bool,
}

impl LabelMap {
    pub fn builder() -> LabelMapBuilder {
        LabelMapBuilder::default()
    }

    /// True if this task applies to `inspection_type`, per §4.4's filter
    /// rule 3: no inspection-type label means "applies to everything".
    pub fn matches_inspection_type(&self, inspection_type: Option<&str>) -> bool {
        match inspection_type {
            None => true,
            Some(ty) => self.inspection_types.is_empty() || self.inspection_types.contains(ty),
        }
    }
}

#[derive(Default)]
pub struct LabelMapBuilder {
    labels: LabelMap,
}

impl LabelMapBuilder {
    pub fn feature(mut self, feature: Feature) -> Self {
        self.labels.feature = Some(feature);
        self
    }

    pub fn inspection_type(mut self, ty: impl Into<String>) -> Self {
        self.labels.inspection_types.insert(ty.into());
        self
    }

    pub fn progress_reportable(mut self) -> Self {
        self.labels.progress_reportable = true;
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.labels.cacheable = true;
        self
    }

    pub fn build(self) -> LabelMap {
        self.labels
    }
}

/// Something that can contribute a content digest to a [`crate::cache`]
/// key. Implemented by task output types that want cheaper or more
/// meaningful digesting than the canonical-JSON fallback (see
/// `DESIGN.md`'s open-question decision for C6).
pub trait CacheDigest {
    fn digest(&self) -> Vec<u8>;
}

impl CacheDigest for String {
    fn digest(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl CacheDigest for i64 {
    fn digest(&self) -> Vec<u8> {
        self.to_le_bytes().to_vec()
    }
}

/// An immutable task: one implementation of one reference.
#[derive(Clone)]
pub struct Task<T> {
    pub id: Impl<T>,
    pub deps: Vec<UntypedRef>,
    pub labels: LabelMap,
    run: RunFn<T>,
}

impl<T> Task<T> {
    pub fn builder(id: Impl<T>) -> TaskBuilder<T> {
        TaskBuilder {
            id,
            deps: Vec::new(),
            labels: LabelMap::default(),
        }
    }

    pub async fn run(&self, ctx: RunContext) -> Result<T, EngineError> {
        (self.run)(ctx).await
    }

    pub fn is_cacheable(&self) -> bool {
        self.labels.cacheable
    }
}

/// Builds a [`Task<T>`]. Dependency duplicates are rejected at `build()`;
/// §3's invariant that `deps` contains no duplicates is enforced here
/// rather than deferred to the resolver.
pub struct TaskBuilder<T> {
    id: Impl<T>,
    deps: Vec<UntypedRef>,
    labels: LabelMap,
}

impl<T> TaskBuilder<T> {
    pub fn depends_on(mut self, dep: impl Into<UntypedRef>) -> Self {
        self.deps.push(dep.into());
        self
    }

    pub fn labels(mut self, labels: LabelMap) -> Self {
        self.labels = labels;
        self
    }

    pub fn build<F, Fut>(self, run: F) -> Result<Task<T>, EngineError>
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let mut seen = BTreeSet::new();
        for dep in &self.deps {
            if !seen.insert(dep.string().to_string()) {
                return Err(EngineError::other(format!(
                    "task '{}' declares duplicate dependency '{}'",
                    self.id, dep
                )));
            }
        }
        Ok(Task {
            id: self.id,
            deps: self.deps,
            labels: self.labels,
            run: Arc::new(move |ctx| Box::pin(run(ctx))),
        })
    }
}
