use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tenant_kv::domain::bucket;
use tenant_kv::{
    derive_key, BucketState, KeyComponent, MemoryStore, RateLimitPolicy, RateLimiter, SystemClock,
};
use tokio::runtime::Runtime;

/// Benchmark key derivation speed
fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");

    let simple: Vec<KeyComponent> = vec!["login".into()];
    let mixed: Vec<KeyComponent> = vec![
        "user".into(),
        12_345.into(),
        vec![0xde_u8, 0xad, 0xbe, 0xef].into(),
    ];
    let many: Vec<KeyComponent> = (0..20).map(|i| format!("component{}", i).into()).collect();

    group.bench_function("single_component", |b| {
        b.iter(|| derive_key(black_box("dataset-1"), black_box("ratelimit"), black_box(&simple)))
    });

    group.bench_function("mixed_components", |b| {
        b.iter(|| derive_key(black_box("dataset-1"), black_box("counter"), black_box(&mixed)))
    });

    group.bench_function("many_components", |b| {
        b.iter(|| derive_key(black_box("dataset-1"), black_box("counter"), black_box(&many)))
    });

    group.finish();
}

/// Benchmark the pure refill-and-take step
fn bench_bucket_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("bucket_apply");
    let policy = RateLimitPolicy::new(100, 1_000, 10).at(1_700_000_000_000);

    group.bench_function("fresh", |b| {
        b.iter(|| bucket::apply(black_box(None), black_box(&policy)))
    });

    let stale = BucketState {
        remaining: 3,
        next_refill_at: 1_600_000_000_000,
    };
    group.bench_function("long_idle_refill", |b| {
        b.iter(|| bucket::apply(black_box(Some(stale)), black_box(&policy)))
    });

    group.bench_function("decode_apply_encode", |b| {
        let record = stale.encode();
        b.iter(|| {
            let state = BucketState::decode(black_box(&record)).unwrap();
            let update = bucket::apply(Some(state), &policy);
            black_box(update.persist.map(|s| s.encode()))
        })
    });

    group.finish();
}

/// Benchmark rate limiting throughput against the in-memory store
fn bench_memory_store_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_store");
    let rt = Runtime::new().unwrap();

    for strict in [false, true] {
        group.throughput(Throughput::Elements(1000));

        group.bench_with_input(
            BenchmarkId::new("acquisitions", if strict { "strict" } else { "lenient" }),
            &strict,
            |b, &strict| {
                let clock = Arc::new(SystemClock::new());
                let store = Arc::new(MemoryStore::new(clock.clone()));
                let limiter = RateLimiter::new(store, clock);
                let key = derive_key("dataset-1", "ratelimit", &["bench".into()]).unwrap();
                let policy = RateLimitPolicy::new(1_000_000, 1_000, 1).strict(strict);

                b.iter(|| {
                    rt.block_on(async {
                        for _ in 0..1000 {
                            black_box(limiter.try_acquire_now(&key, &policy).await.unwrap());
                        }
                    })
                })
            },
        );
    }

    group.finish();
}

/// Benchmark multi-task concurrent throughput
fn bench_concurrent_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    let rt = Runtime::new().unwrap();

    for num_tasks in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_tasks as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("tasks", num_tasks),
            num_tasks,
            |b, &num_tasks| {
                b.iter(|| {
                    rt.block_on(async {
                        let clock = Arc::new(SystemClock::new());
                        let store = Arc::new(MemoryStore::new(clock.clone()));
                        let limiter = RateLimiter::new(store, clock);
                        let policy = RateLimitPolicy::new(100, 1_000, 1);

                        let mut handles = vec![];
                        for i in 0..num_tasks {
                            let limiter = limiter.clone();
                            handles.push(tokio::spawn(async move {
                                // Each task uses a different key to avoid contention
                                let key =
                                    derive_key("dataset-1", "ratelimit", &[i.into()]).unwrap();
                                for _ in 0..1000 {
                                    black_box(
                                        limiter.try_acquire_now(&key, &policy).await.unwrap(),
                                    );
                                }
                            }));
                        }

                        for handle in handles {
                            handle.await.unwrap();
                        }
                    })
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_key_derivation,
    bench_bucket_apply,
    bench_memory_store_throughput,
    bench_concurrent_throughput,
);
criterion_main!(benches);
