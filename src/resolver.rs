//! Task set and resolver.
//!
//! A [`TaskSet`] collects tasks, order-independently, into a multimap from
//! reference identifier to the tasks providing it. [`resolve`] selects
//! exactly one provider per referenced reference from `target ∪ pool`, then
//! orders the selection with Kahn's algorithm, the same two-pass shape as
//! the teacher's `tools/nika/src/binding/resolve.rs` (selection) feeding
//! `dag/flow.rs` (topological ordering), generalized from a single concrete
//! `Workflow` to an arbitrary collection of `Task<T>`s behind [`AnyTask`].

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::context::RunContext;
use crate::error::{EngineError, Result};
use crate::id::UntypedRef;
use crate::task::Task;

/// Stack-allocated successor list in the ordering pass's internal graph,
/// mirroring the teacher's `DepVec`: most tasks have very few dependents.
type DepVec = SmallVec<[usize; 4]>;

/// Type-erased view of a `Task<T>`, letting the resolver hold tasks of
/// heterogeneous output types in one collection. The resolver never touches
/// `T` directly; it only reads identifiers, dependencies, and labels.
///
/// `run_erased` is `async_trait`-boxed the same way the teacher's
/// `Provider::execute` is: an object-safe async trait method over `&self`,
/// no borrowed output, so the usual `async_trait` desugaring to
/// `Pin<Box<dyn Future + Send>>` applies without modification.
#[async_trait]
pub trait AnyTask: Send + Sync {
    fn impl_id(&self) -> &str;
    fn reference_id(&self) -> &str;
    fn deps(&self) -> &[UntypedRef];
    fn matches_inspection_type(&self, inspection_type: Option<&str>) -> bool;
    fn output_type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn progress_reportable(&self) -> bool;
    fn is_cacheable(&self) -> bool;

    /// Runs this task with its output boxed behind `Any`, letting the
    /// runner (which holds only `Arc<dyn AnyTask>`) drive execution without
    /// knowing the concrete output type. The result is unboxed back to `T`
    /// by [`crate::value_map::ValueMap::set_erased`]'s caller, which reads
    /// it again through the same `Arc<dyn Any + Send + Sync>` the producing
    /// `Ref<T>`'s consumers eventually downcast.
    async fn run_erased(&self, ctx: RunContext) -> Result<Arc<dyn Any + Send + Sync>>;
}

#[async_trait]
impl<T: Send + Sync + 'static> AnyTask for Task<T> {
    fn impl_id(&self) -> &str {
        self.id.string()
    }

    fn reference_id(&self) -> &str {
        self.id.r#ref().string()
    }

    fn deps(&self) -> &[UntypedRef] {
        &self.deps
    }

    fn matches_inspection_type(&self, inspection_type: Option<&str>) -> bool {
        self.labels.matches_inspection_type(inspection_type)
    }

    fn output_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn progress_reportable(&self) -> bool {
        self.labels.progress_reportable
    }

    fn is_cacheable(&self) -> bool {
        Task::is_cacheable(self)
    }

    async fn run_erased(&self, ctx: RunContext) -> Result<Arc<dyn Any + Send + Sync>> {
        let value = self.run(ctx).await?;
        Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>)
    }
}

/// A multimap from reference identifier to the tasks providing it, plus the
/// full list of tasks in insertion order (so ordering ties stay
/// deterministic, per §4.4).
#[derive(Default)]
pub struct TaskSet {
    tasks: Vec<Arc<dyn AnyTask>>,
    by_reference: FxHashMap<String, Vec<usize>>,
    by_impl: FxHashMap<String, usize>,
}

impl TaskSet {
    pub fn new() -> Self {
        TaskSet::default()
    }

    /// Adds a task, rejecting a duplicate implementation id.
    pub fn add<T: 'static + Send + Sync>(&mut self, task: Task<T>) -> Result<()> {
        self.add_any(Arc::new(task))
    }

    fn add_any(&mut self, task: Arc<dyn AnyTask>) -> Result<()> {
        let impl_id = task.impl_id().to_string();
        if self.by_impl.contains_key(&impl_id) {
            return Err(EngineError::DuplicateImpl(impl_id));
        }
        let index = self.tasks.len();
        self.by_impl.insert(impl_id, index);
        self.by_reference
            .entry(task.reference_id().to_string())
            .or_default()
            .push(index);
        self.tasks.push(task);
        Ok(())
    }

    pub fn tasks(&self) -> &[Arc<dyn AnyTask>] {
        &self.tasks
    }

    fn providers_of(&self, reference: &str) -> &[usize] {
        static EMPTY: &[usize] = &[];
        self.by_reference.get(reference).map_or(EMPTY, |v| v)
    }
}

/// A cycle-free, gap-free, totally ordered selection of tasks: every task's
/// `deps` point to tasks strictly earlier in [`ResolvedSet::order`].
///
/// `Clone` is cheap (an `Arc` bump per task) and intentional: per §3's
/// lifecycle notes, a resolved set outlives any one run and is reusable
/// across repeated [`crate::runner::LocalRunner`] instances.
#[derive(Clone)]
pub struct ResolvedSet {
    pub order: Vec<Arc<dyn AnyTask>>,
}

impl std::fmt::Debug for ResolvedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSet")
            .field("len", &self.order.len())
            .finish()
    }
}

impl ResolvedSet {
    /// Longest-path depth of every task, used by the runner to group tasks
    /// into execution waves (§4.5 step 2). Tasks sharing a depth have no
    /// path between them and may run concurrently.
    pub fn depths(&self) -> FxHashMap<String, usize> {
        let depth_of_reference: FxHashMap<&str, usize> = {
            let mut depths: FxHashMap<&str, usize> = FxHashMap::default();
            for task in &self.order {
                let depth = task
                    .deps()
                    .iter()
                    .map(|d| depths.get(d.string()).copied().unwrap_or(0))
                    .max()
                    .map(|d| d + 1)
                    .unwrap_or(0);
                depths.insert(task.reference_id(), depth);
            }
            depths
        };

        self.order
            .iter()
            .map(|t| (t.impl_id().to_string(), depth_of_reference[t.reference_id()]))
            .collect()
    }
}

/// Selects a minimal set of tasks from `target ∪ pool` such that every
/// reference used as a dependency is provided by exactly one selected task,
/// then totally orders them with Kahn's algorithm.
///
/// `inspection_type` filters candidates per §4.4 rule 3: a candidate with a
/// non-empty inspection-type label set is only eligible if it contains
/// `inspection_type`.
pub fn resolve(
    target: &TaskSet,
    pool: &TaskSet,
    inspection_type: Option<&str>,
) -> Result<ResolvedSet> {
    // Selection pass: separate from ordering, per the design notes. Every
    // target task is selected outright (rule 1); `by_reference_choice`
    // additionally tracks, per reference, which index was chosen so that
    // "target-already-selected wins" (the resolved open question) and the
    // "selected once" dedup below both work off reference identity.
    let universe: Vec<&Arc<dyn AnyTask>> = target
        .tasks()
        .iter()
        .chain(pool.tasks().iter())
        .collect();

    let mut selected_indices: FxHashSet<usize> = FxHashSet::default();
    let mut by_reference_choice: FxHashMap<String, usize> = FxHashMap::default();
    for task in target.tasks() {
        let index = index_of(&universe, task);
        selected_indices.insert(index);
        by_reference_choice
            .entry(task.reference_id().to_string())
            .or_insert(index);
    }

    let mut pending: VecDeque<String> = VecDeque::new();
    for task in target.tasks() {
        for dep in task.deps() {
            pending.push_back(dep.string().to_string());
        }
    }

    let mut type_checked: FxHashSet<String> = FxHashSet::default();

    while let Some(reference) = pending.pop_front() {
        if by_reference_choice.contains_key(&reference) {
            continue;
        }

        let mut candidates: Vec<&Arc<dyn AnyTask>> = target
            .providers_of(&reference)
            .iter()
            .map(|&i| &target.tasks()[i])
            .chain(pool.providers_of(&reference).iter().map(|&i| &pool.tasks()[i]))
            .filter(|t| t.matches_inspection_type(inspection_type))
            .collect();
        candidates.dedup_by_key(|t| t.impl_id().to_string());

        let chosen = match candidates.len() {
            0 => {
                return Err(EngineError::UnresolvedReference { reference });
            }
            1 => candidates[0],
            _ => {
                return Err(EngineError::AmbiguousReference {
                    reference,
                    count: candidates.len(),
                    candidates: candidates.iter().map(|t| t.impl_id().to_string()).collect(),
                });
            }
        };

        let index = index_of(&universe, chosen);
        selected_indices.insert(index);
        by_reference_choice.insert(reference.clone(), index);

        if type_checked.insert(reference.clone()) {
            check_dependent_types(&universe, &by_reference_choice, &reference)?;
        }

        for dep in chosen.deps() {
            pending.push_back(dep.string().to_string());
        }
    }

    let selected_tasks: Vec<&Arc<dyn AnyTask>> = {
        let mut indices: Vec<usize> = selected_indices.into_iter().collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| universe[i]).collect()
    };

    order_topologically(selected_tasks)
}

fn index_of(universe: &[&Arc<dyn AnyTask>], task: &Arc<dyn AnyTask>) -> usize {
    universe
        .iter()
        .position(|t| t.impl_id() == task.impl_id())
        .expect("task originates from target or pool, and is present in universe")
}

/// Consistency check from §4.4: every dependent of `reference` must have
/// declared the same output type as the chosen provider.
fn check_dependent_types(
    universe: &[&Arc<dyn AnyTask>],
    selected: &FxHashMap<String, usize>,
    reference: &str,
) -> Result<()> {
    let provider_index = *selected.get(reference).expect("just inserted");
    let provider = universe[provider_index];
    for task in universe {
        for dep in task.deps() {
            if dep.string() == reference && dep.type_name() != provider.output_type_name() {
                return Err(EngineError::TypeMismatch {
                    reference: reference.to_string(),
                    implementation: provider.impl_id().to_string(),
                    expected: dep.type_name(),
                    actual: provider.output_type_name(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm, ties broken by the stable index of each task in
/// `selected` (itself built in a deterministic scan order), so resolving the
/// same inputs twice yields an identical sequence (testable property 2).
fn order_topologically(selected: Vec<&Arc<dyn AnyTask>>) -> Result<ResolvedSet> {
    let by_reference: FxHashMap<&str, usize> = selected
        .iter()
        .enumerate()
        .map(|(i, t)| (t.reference_id(), i))
        .collect();

    let mut in_degree: Vec<usize> = vec![0; selected.len()];
    let mut dependents: Vec<DepVec> = vec![DepVec::new(); selected.len()];

    for (i, task) in selected.iter().enumerate() {
        let mut seen_refs: FxHashSet<&str> = FxHashSet::default();
        for dep in task.deps() {
            if !seen_refs.insert(dep.string()) {
                continue;
            }
            let Some(&producer) = by_reference.get(dep.string()) else {
                continue;
            };
            in_degree[i] += 1;
            dependents[producer].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..selected.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(selected.len());
    let mut visited = vec![false; selected.len()];

    while let Some(i) = ready.pop_front() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        order.push(selected[i].clone());
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.push_back(d);
            }
        }
    }

    if order.len() != selected.len() {
        let cycle = find_cycle(&selected, &by_reference);
        return Err(EngineError::Cycle(cycle));
    }

    Ok(ResolvedSet { order })
}

/// Reports the offending reference cycle by name, per §4.4's requirement
/// that a `Cycle` error names the cycle rather than just "a cycle exists".
/// Uses the teacher's three-color DFS from `dag/flow.rs::detect_cycles`.
fn find_cycle(selected: &[&Arc<dyn AnyTask>], by_reference: &FxHashMap<&str, usize>) -> String {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let n = selected.len();
    let mut colors = vec![Color::White; n];
    let mut stack: Vec<usize> = Vec::new();

    fn dfs(
        node: usize,
        selected: &[&Arc<dyn AnyTask>],
        by_reference: &FxHashMap<&str, usize>,
        colors: &mut [Color],
        stack: &mut Vec<usize>,
    ) -> Option<String> {
        colors[node] = Color::Gray;
        stack.push(node);

        for dep in selected[node].deps() {
            if let Some(&next) = by_reference.get(dep.string()) {
                match colors[next] {
                    Color::Gray => {
                        let start = stack.iter().position(|&x| x == next).unwrap_or(0);
                        let mut names: Vec<&str> =
                            stack[start..].iter().map(|&i| selected[i].reference_id()).collect();
                        names.push(selected[next].reference_id());
                        return Some(names.join(" → "));
                    }
                    Color::White => {
                        if let Some(cycle) = dfs(next, selected, by_reference, colors, stack) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        colors[node] = Color::Black;
        None
    }

    for i in 0..n {
        if colors[i] == Color::White {
            if let Some(cycle) = dfs(i, selected, by_reference, &mut colors, &mut stack) {
                return cycle;
            }
        }
    }
    "unknown cycle".to_string()
}
