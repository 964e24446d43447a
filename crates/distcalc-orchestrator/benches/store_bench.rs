// Criterion benchmarks for distcalc-orchestrator
//
// Run benchmarks with:
//   cargo bench -p distcalc-orchestrator

use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use distcalc_common::protocol::ReportStatus;
use distcalc_orchestrator::{Task, TaskStore};

fn bench_create(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("store_create");

    group.bench_function("simple_task", |b| {
        b.to_async(&rt).iter(|| async {
            let store = TaskStore::in_memory();
            store
                .create(Task::compile(1, black_box("(1+2)*(3+4)"), None).unwrap())
                .await
                .unwrap()
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("store_dispatch");

    for tasks in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("queued_tasks", tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| async move {
                let store = TaskStore::in_memory();
                for id in 0..tasks {
                    store
                        .create(Task::compile(id, "1+2", None).unwrap())
                        .await
                        .unwrap();
                }
                while store.dispatch(Instant::now()).await.unwrap().is_some() {}
            });
        });
    }

    group.finish();
}

fn bench_reduce_task(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("store_reduce");

    group.bench_function("pull_report_cycle", |b| {
        b.to_async(&rt).iter(|| async {
            let store = TaskStore::in_memory();
            store
                .create(Task::compile(1, "(1+2)*(3+4)-5/2+6*7", None).unwrap())
                .await
                .unwrap();
            while let Some(subtask) = store.dispatch(Instant::now()).await.unwrap() {
                let value = subtask.fragment.evaluate().unwrap();
                store
                    .apply_report(1, &subtask.fragment, ReportStatus::Finished, value)
                    .await
                    .unwrap();
            }
            store.task(1).await.unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_create, bench_dispatch, bench_reduce_task);
criterion_main!(benches);
