//! End-to-end scenario tests (S1-S8) against the public API surface.
//!
//! Each test drives the engine the way an external consumer would: build a
//! `TaskSet`, `resolve` it, run it with a `LocalRunner`, and read results
//! back with `get_result`. Unit-level coverage of these same scenarios
//! already lives alongside each module (`resolver.rs`, `runner.rs`,
//! `form.rs`, `cache.rs`); these tests instead exercise the full pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskgraph::context::{InspectionRequest, RunMode};
use taskgraph::error::EngineError;
use taskgraph::form::FormFieldBuilder;
use taskgraph::id::{new_default_impl, new_impl, new_ref};
use taskgraph::limits::RunLimits;
use taskgraph::metadata::HintType;
use taskgraph::resolver::{resolve, TaskSet};
use taskgraph::runner::{get_result, LocalRunner};
use taskgraph::task::{LabelMap, Task};

async fn drive(runner: &LocalRunner) -> taskgraph::error::Result<()> {
    runner
        .run(
            tokio_util::sync::CancellationToken::new(),
            RunMode::Run,
            InspectionRequest::new(),
        )
        .await
}

#[tokio::test]
async fn s1_double_one_dependency() {
    let mut set = TaskSet::new();
    set.add(
        Task::builder(new_default_impl::<i64>("gen").unwrap())
            .build(|_ctx| async { Ok(1i64) })
            .unwrap(),
    )
    .unwrap();
    set.add(
        Task::builder(new_default_impl::<i64>("double").unwrap())
            .depends_on(new_ref::<i64>("gen").unwrap())
            .build(|ctx| async move { Ok(ctx.results().get::<i64>("gen").unwrap_or(0) * 2) })
            .unwrap(),
    )
    .unwrap();

    let resolved = resolve(&set, &TaskSet::new(), None).unwrap();
    let runner = LocalRunner::with_limits(resolved, RunLimits::for_tests());
    drive(&runner).await.unwrap();

    assert_eq!(get_result(&runner, &new_ref::<i64>("double").unwrap()), Some(2));
}

#[tokio::test]
async fn s2_abstract_reference_resolves_unique_pool_candidate() {
    let mut target = TaskSet::new();
    target
        .add(
            Task::builder(new_default_impl::<i64>("parser").unwrap())
                .depends_on(new_ref::<i64>("log-input").unwrap())
                .build(|ctx| async move { Ok(ctx.results().get::<i64>("log-input").unwrap_or(0) + 1) })
                .unwrap(),
        )
        .unwrap();

    let mut pool = TaskSet::new();
    pool.add(
        Task::builder(new_default_impl::<i64>("log-input").unwrap())
            .build(|_ctx| async { Ok(10i64) })
            .unwrap(),
    )
    .unwrap();

    let resolved = resolve(&target, &pool, None).unwrap();
    let runner = LocalRunner::with_limits(resolved, RunLimits::for_tests());
    drive(&runner).await.unwrap();

    assert_eq!(get_result(&runner, &new_ref::<i64>("parser").unwrap()), Some(11));
}

#[tokio::test]
async fn s2_ambiguous_pool_candidates_is_an_error() {
    let mut target = TaskSet::new();
    target
        .add(
            Task::builder(new_default_impl::<i64>("parser").unwrap())
                .depends_on(new_ref::<i64>("log-input").unwrap())
                .build(|_ctx| async { Ok(0i64) })
                .unwrap(),
        )
        .unwrap();

    let mut pool = TaskSet::new();
    let reference = new_ref::<i64>("log-input").unwrap();
    pool.add(
        Task::builder(new_impl(reference.clone(), "cloud").unwrap())
            .build(|_ctx| async { Ok(1i64) })
            .unwrap(),
    )
    .unwrap();
    pool.add(
        Task::builder(new_impl(reference, "file").unwrap())
            .build(|_ctx| async { Ok(2i64) })
            .unwrap(),
    )
    .unwrap();

    let err = resolve(&target, &pool, None).unwrap_err();
    assert!(matches!(err, EngineError::AmbiguousReference { .. }));
}

#[tokio::test]
async fn s3_diamond_is_computed_correctly_under_parallel_execution() {
    let mut set = TaskSet::new();
    set.add(
        Task::builder(new_default_impl::<i64>("a").unwrap())
            .build(|_ctx| async { Ok(1i64) })
            .unwrap(),
    )
    .unwrap();
    set.add(
        Task::builder(new_default_impl::<i64>("b").unwrap())
            .depends_on(new_ref::<i64>("a").unwrap())
            .build(|ctx| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(ctx.results().get::<i64>("a").unwrap_or(0) + 10)
            })
            .unwrap(),
    )
    .unwrap();
    set.add(
        Task::builder(new_default_impl::<i64>("c").unwrap())
            .depends_on(new_ref::<i64>("a").unwrap())
            .build(|ctx| async move { Ok(ctx.results().get::<i64>("a").unwrap_or(0) + 100) })
            .unwrap(),
    )
    .unwrap();
    set.add(
        Task::builder(new_default_impl::<i64>("d").unwrap())
            .depends_on(new_ref::<i64>("b").unwrap())
            .depends_on(new_ref::<i64>("c").unwrap())
            .build(|ctx| async move {
                let b = ctx.results().get::<i64>("b").unwrap_or(0);
                let c = ctx.results().get::<i64>("c").unwrap_or(0);
                Ok(b + c)
            })
            .unwrap(),
    )
    .unwrap();

    let resolved = resolve(&set, &TaskSet::new(), None).unwrap();
    let runner = LocalRunner::with_limits(resolved, RunLimits::for_tests());
    drive(&runner).await.unwrap();

    assert_eq!(get_result(&runner, &new_ref::<i64>("d").unwrap()), Some(111));
}

#[tokio::test]
async fn s4_cycle_is_rejected_before_any_execution() {
    let mut set = TaskSet::new();
    set.add(
        Task::builder(new_default_impl::<i64>("x").unwrap())
            .depends_on(new_ref::<i64>("y").unwrap())
            .build(|_ctx| async { Ok(0i64) })
            .unwrap(),
    )
    .unwrap();
    set.add(
        Task::builder(new_default_impl::<i64>("y").unwrap())
            .depends_on(new_ref::<i64>("x").unwrap())
            .build(|_ctx| async { Ok(0i64) })
            .unwrap(),
    )
    .unwrap();

    let err = resolve(&set, &TaskSet::new(), None).unwrap_err();
    match err {
        EngineError::Cycle(path) => assert!(path.contains('x') && path.contains('y')),
        other => panic!("expected Cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn s5_cache_single_flight_across_concurrent_consumers() {
    use taskgraph::cache::ResultCache;

    let cache: Arc<ResultCache<i64>> = Arc::new(ResultCache::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute("expensive#default", b"same-deps".to_vec(), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(99i64)
                })
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 99);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s6_cache_invalidates_on_changed_dependency_digest() {
    use taskgraph::cache::ResultCache;

    let cache: ResultCache<i64> = ResultCache::new();
    let calls = AtomicUsize::new(0);

    let compute = |digest: &'static [u8]| {
        let calls_ref = &calls;
        cache.get_or_compute("derived#default", digest.to_vec(), move || async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            Ok(1i64)
        })
    };

    compute(b"v1").await.unwrap();
    compute(b"v1").await.unwrap();
    compute(b"v2").await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn s6b_task_closure_composes_cache_with_its_own_dependency_digest() {
    use taskgraph::cache::{concat_digests, digest_with, ResultCache};

    let calls = Arc::new(AtomicUsize::new(0));
    let cache: Arc<ResultCache<i64>> = Arc::new(ResultCache::new());

    let mut set = TaskSet::new();
    set.add(
        Task::builder(new_default_impl::<i64>("input").unwrap())
            .build(|_ctx| async { Ok(7i64) })
            .unwrap(),
    )
    .unwrap();
    set.add(
        Task::builder(new_default_impl::<i64>("expensive").unwrap())
            .depends_on(new_ref::<i64>("input").unwrap())
            .labels(LabelMap::builder().cacheable().build())
            .build({
                let calls = calls.clone();
                let cache = cache.clone();
                move |ctx| {
                    let calls = calls.clone();
                    let cache = cache.clone();
                    async move {
                        let input = ctx.results().get::<i64>("input").unwrap_or(0);
                        let digest = concat_digests(&[digest_with(&input)]);
                        cache
                            .get_or_compute("expensive#default", digest, || {
                                let calls = calls.clone();
                                async move {
                                    calls.fetch_add(1, Ordering::SeqCst);
                                    Ok(input * 10)
                                }
                            })
                            .await
                    }
                }
            })
            .unwrap(),
    )
    .unwrap();

    let resolved = resolve(&set, &TaskSet::new(), None).unwrap();
    for _ in 0..3 {
        let runner = LocalRunner::with_limits(resolved.clone(), RunLimits::for_tests());
        drive(&runner).await.unwrap();
        assert_eq!(
            get_result(&runner, &new_ref::<i64>("expensive").unwrap()),
            Some(70)
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s7_form_field_validator_and_converter_drive_hints() {
    let task = FormFieldBuilder::new(new_default_impl::<String>("duration").unwrap())
        .label("Duration")
        .default_value("1h".to_string())
        .validator_fn(|_ctx, raw| {
            if raw.starts_with('-') {
                Err("duration must be positive".to_string())
            } else {
                Ok(())
            }
        })
        .converter_fn(|_ctx, raw| raw.to_string())
        .hint_fn(|_ctx, _value| Some((HintType::Info, "parsed".to_string())))
        .build()
        .unwrap();

    let mut set = TaskSet::new();
    set.add(task).unwrap();

    let resolved = resolve(&set, &TaskSet::new(), None).unwrap();
    let runner = LocalRunner::with_limits(resolved, RunLimits::for_tests());
    runner
        .run(
            tokio_util::sync::CancellationToken::new(),
            RunMode::Run,
            InspectionRequest::new().with("duration", "15m".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(
        get_result(&runner, &new_ref::<String>("duration").unwrap()),
        Some("15m".to_string())
    );
    let snapshot = runner.metadata().snapshot();
    assert_eq!(snapshot.form.len(), 1);
    assert_eq!(snapshot.form[0].hint_type, HintType::Info);
}

#[tokio::test]
async fn s8_cancelling_the_base_token_stops_the_run() {
    let mut set = TaskSet::new();
    set.add(
        Task::builder(new_default_impl::<()>("forever").unwrap())
            .build(|ctx| async move {
                loop {
                    if ctx.is_cancelled() {
                        return Err(EngineError::Cancelled { reason: None });
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .unwrap(),
    )
    .unwrap();

    let resolved = resolve(&set, &TaskSet::new(), None).unwrap();
    let runner = LocalRunner::with_limits(resolved, RunLimits::for_tests());

    let base_cancel = tokio_util::sync::CancellationToken::new();
    let base_cancel_clone = base_cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        base_cancel_clone.cancel();
    });

    let outcome = runner
        .run(base_cancel, RunMode::Run, InspectionRequest::new())
        .await;
    assert!(outcome.is_err());
    assert_eq!(get_result(&runner, &new_ref::<()>("forever").unwrap()), None);
}

#[tokio::test]
async fn inspection_type_label_excludes_ineligible_implementations() {
    let mut target = TaskSet::new();
    target
        .add(
            Task::builder(new_default_impl::<i64>("parser").unwrap())
                .depends_on(new_ref::<i64>("log-input").unwrap())
                .build(|_ctx| async { Ok(0i64) })
                .unwrap(),
        )
        .unwrap();

    let mut pool = TaskSet::new();
    pool.add(
        Task::builder(new_default_impl::<i64>("log-input").unwrap())
            .labels(LabelMap::builder().inspection_type("kubernetes").build())
            .build(|_ctx| async { Ok(1i64) })
            .unwrap(),
    )
    .unwrap();

    assert!(resolve(&target, &pool, Some("docker")).is_err());
    assert!(resolve(&target, &pool, Some("kubernetes")).is_ok());
}
