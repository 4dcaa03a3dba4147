//! Benchmark: resolver selection + ordering
//!
//! Measures `TaskSet::add` and `resolve` across linear, diamond, and
//! parallel shapes, mirroring the teacher's `dag_validation` benchmark's
//! shape generators against `FlowGraph::from_workflow`.
//!
//! Run: cargo bench --bench resolve

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use taskgraph::id::{new_default_impl, new_ref};
use taskgraph::resolver::{resolve, TaskSet};
use taskgraph::task::Task;

fn int_task(id: String, deps: &[String]) -> Task<i64> {
    let mut builder = Task::builder(new_default_impl::<i64>(id).unwrap());
    for dep in deps {
        builder = builder.depends_on(new_ref::<i64>(dep).unwrap());
    }
    builder.build(|_ctx| async { Ok(0i64) }).unwrap()
}

fn linear_set(size: usize) -> TaskSet {
    let mut set = TaskSet::new();
    set.add(int_task("task_0".to_string(), &[])).unwrap();
    for i in 1..size {
        let dep = format!("task_{}", i - 1);
        set.add(int_task(format!("task_{i}"), &[dep])).unwrap();
    }
    set
}

fn diamond_set(width: usize) -> TaskSet {
    let mut set = TaskSet::new();
    set.add(int_task("source".to_string(), &[])).unwrap();
    for i in 0..width {
        set.add(int_task(format!("middle_{i}"), &["source".to_string()]))
            .unwrap();
    }
    let middles: Vec<String> = (0..width).map(|i| format!("middle_{i}")).collect();
    set.add(int_task("sink".to_string(), &middles)).unwrap();
    set
}

fn parallel_set(size: usize) -> TaskSet {
    let mut set = TaskSet::new();
    for i in 0..size {
        set.add(int_task(format!("task_{i}"), &[])).unwrap();
    }
    set
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [10, 50, 100, 250].iter() {
        let set = linear_set(*size);
        group.bench_with_input(BenchmarkId::new("linear", size), &set, |b, s| {
            b.iter(|| {
                let resolved = resolve(black_box(s), black_box(&TaskSet::new()), None);
                black_box(resolved)
            });
        });
    }

    for width in [10, 50, 100].iter() {
        let set = diamond_set(*width);
        group.bench_with_input(BenchmarkId::new("diamond", width), &set, |b, s| {
            b.iter(|| {
                let resolved = resolve(black_box(s), black_box(&TaskSet::new()), None);
                black_box(resolved)
            });
        });
    }

    for size in [10, 50, 100, 250].iter() {
        let set = parallel_set(*size);
        group.bench_with_input(BenchmarkId::new("parallel", size), &set, |b, s| {
            b.iter(|| {
                let resolved = resolve(black_box(s), black_box(&TaskSet::new()), None);
                black_box(resolved)
            });
        });
    }

    group.finish();
}

fn bench_depths(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolved_set_depths");

    for width in [10, 50, 100, 250].iter() {
        let set = diamond_set(*width);
        let resolved = resolve(&set, &TaskSet::new(), None).unwrap();
        group.bench_with_input(BenchmarkId::new("diamond", width), &resolved, |b, r| {
            b.iter(|| {
                let depths = r.depths();
                black_box(depths)
            });
        });
    }

    group.finish();
}

fn bench_task_set_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_set_add");

    group.bench_function("add_1000_independent", |b| {
        b.iter(|| {
            let mut set = TaskSet::new();
            for i in 0..1000 {
                set.add(int_task(format!("task_{i}"), &[])).unwrap();
            }
            black_box(set)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_depths, bench_task_set_add);
criterion_main!(benches);
