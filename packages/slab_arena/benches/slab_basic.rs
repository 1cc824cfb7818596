//! Basic benchmarks for the `slab_arena` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use new_zealand::nz;
use slab_arena::{Arena, SizeClass, Slab};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("slab_arena");

    group.bench_function("slab_allocate_release", |b| {
        let slab = Slab::new(nz!(64), nz!(1024)).expect("host allocator has memory");

        b.iter(|| {
            let block = slab.allocate().expect("pool starts each iteration empty");
            black_box(block);
            slab.release(block).expect("the block came from this pool");
        });
    });

    group.bench_function("arena_pool_hit", |b| {
        let arena = Arena::new(&[
            SizeClass::new(nz!(64), nz!(1024)),
            SizeClass::new(nz!(256), nz!(256)),
        ])
        .expect("the class table is ascending");

        b.iter(|| {
            let ptr = arena.allocate(nz!(48)).expect("class has free blocks");
            black_box(ptr);
            arena.release(ptr).expect("the pointer came from this arena");
        });
    });

    group.bench_function("arena_host_fallback", |b| {
        let arena = Arena::new(&[SizeClass::new(nz!(64), nz!(16))])
            .expect("the class table is ascending");

        b.iter(|| {
            let ptr = arena.allocate(nz!(4096)).expect("host allocator has memory");
            black_box(ptr);
            arena.release(ptr).expect("the pointer came from this arena");
        });
    });

    group.finish();
}
