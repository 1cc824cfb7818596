//! Basic usage of the `slab_arena` crate:
//!
//! * Building an arena from a size-class table.
//! * Routing requests to pools and the host fallback.
//! * Reading the per-pool statistics used to tune the table.

use new_zealand::nz;
use slab_arena::{Arena, SizeClass};

fn main() {
    // Sorted by increasing block size. Start with a guess; the statistics
    // below tell you how to adjust it.
    let arena = Arena::new(&[
        SizeClass::new(nz!(32), nz!(1024)),
        SizeClass::new(nz!(64), nz!(512)),
        SizeClass::new(nz!(128), nz!(256)),
        SizeClass::new(nz!(256), nz!(128)),
    ])
    .expect("the class table is ascending");

    // A burst of mixed-size requests.
    let mut live = Vec::new();
    for request in [24_usize, 47, 100, 250, 31, 4096, 64] {
        let size = request.try_into().expect("request sizes are nonzero");
        let ptr = arena.allocate(size).expect("host allocator has memory");
        live.push(ptr);
    }

    for (index, stats) in arena.stats().iter().enumerate() {
        println!(
            "class {index}: {} x {} bytes, allocated {}, missed {}, outstanding {}",
            stats.block_count,
            stats.block_size,
            stats.allocated,
            stats.missed,
            stats.outstanding(),
        );
    }

    for ptr in live {
        arena.release(ptr).expect("every pointer came from this arena");
    }

    arena
        .try_destroy()
        .expect("everything was released, so teardown succeeds");
    println!("arena destroyed cleanly");
}
