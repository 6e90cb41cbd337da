use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Engine, Options};
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn filled_engine() -> (tempfile::TempDir, Engine) {
    let dir = tempdir().unwrap();
    let db = Engine::open_with(
        dir.path(),
        Options::new().max_datafile_size(64 * 1024 * 1024),
    )
    .unwrap();
    for i in 0..N_KEYS {
        db.put(format!("key{i}").as_bytes(), &vec![b'x'; VALUE_SIZE])
            .unwrap();
    }
    (dir, db)
}

fn put_benchmark(c: &mut Criterion) {
    c.bench_function("engine_put_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let db = Engine::open_with(
                    dir.path(),
                    Options::new().max_datafile_size(64 * 1024 * 1024),
                )
                .unwrap();
                (dir, db)
            },
            |(_dir, db)| {
                for i in 0..N_KEYS {
                    db.put(format!("key{i}").as_bytes(), &vec![b'x'; VALUE_SIZE])
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn get_hit_benchmark(c: &mut Criterion) {
    c.bench_function("engine_get_hit_10k", |b| {
        b.iter_batched(
            filled_engine,
            |(_dir, db)| {
                for i in 0..N_KEYS {
                    let v = db.get(format!("key{i}").as_bytes()).unwrap();
                    assert_eq!(v.len(), VALUE_SIZE);
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn merge_benchmark(c: &mut Criterion) {
    c.bench_function("engine_merge_10k_half_dead", |b| {
        b.iter_batched(
            || {
                let (dir, db) = filled_engine();
                // overwrite half the keys so the merge has garbage to drop
                for i in (0..N_KEYS).step_by(2) {
                    db.put(format!("key{i}").as_bytes(), &vec![b'y'; VALUE_SIZE])
                        .unwrap();
                }
                (dir, db)
            },
            |(_dir, db)| {
                db.merge().unwrap();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, put_benchmark, get_hit_benchmark, merge_benchmark);
criterion_main!(benches);
