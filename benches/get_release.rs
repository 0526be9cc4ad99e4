use criterion::{Criterion, criterion_group, criterion_main};
use esox_connectionpool::{BoxError, Configuration, Connection, Pool};
use std::hint::black_box;
use std::time::Duration;

struct Noop;

impl Connection for Noop {
    fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

fn bench_get_release(c: &mut Criterion) {
    let pool = Pool::new(Configuration::new("bench", 16, "noop", |_| Ok(Noop)));
    pool.init().wait().unwrap();

    c.bench_function("get_release", |b| {
        b.iter(|| {
            let conn = pool.get(Duration::from_secs(1), false).unwrap();
            pool.release(black_box(conn));
        })
    });

    c.bench_function("try_get_drop", |b| {
        b.iter(|| black_box(pool.try_get()))
    });

    pool.close().wait().unwrap();
}

criterion_group!(benches, bench_get_release);
criterion_main!(benches);
