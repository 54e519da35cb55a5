use criterion::{Criterion, criterion_group, criterion_main};
use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};

fn acquire_release(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let pool = Pool::new(
        || async { Ok::<_, FactoryError>(vec![0u8; 4096]) },
        PoolConfiguration::new().with_max_pool_size(16),
    )
    .unwrap();
    runtime.block_on(pool.warmup(16)).unwrap();

    c.bench_function("acquire_drop", |b| {
        b.iter(|| runtime.block_on(async { drop(pool.acquire().await.unwrap()) }))
    });

    c.bench_function("lease_release", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let lease = pool.lease().await.unwrap();
                pool.release(lease).unwrap();
            })
        })
    });
}

criterion_group!(benches, acquire_release);
criterion_main!(benches);
