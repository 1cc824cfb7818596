//! Composing the arena with an allocation ledger: the ledger stands in as
//! the arena's fallback host, so every request the pools cannot serve is
//! tracked with its origin, size, and owning thread.

use alloc_ledger::Ledger;
use new_zealand::nz;
use slab_arena::{Arena, SizeClass};

fn main() {
    let ledger = Ledger::new();
    ledger.activate();

    let arena = Arena::with_host(
        &[
            SizeClass::new(nz!(64), nz!(16)),
            SizeClass::new(nz!(256), nz!(8)),
        ],
        &ledger,
    )
    .expect("the class table is ascending");

    // Pool hits never reach the ledger.
    let pooled = arena.allocate(nz!(48)).expect("class has free blocks");
    assert_eq!(ledger.totals().live, 0);

    // Oversized requests fall through to the tracked host.
    let hosted = arena.allocate(nz!(4096)).expect("host allocator has memory");
    assert_eq!(ledger.totals().live, 1);

    println!("fallback traffic after one oversized request:");
    ledger.print_to_stdout(true);

    arena.release(pooled).expect("the pointer came from this arena");
    arena.release(hosted).expect("the pointer came from this arena");

    assert_eq!(ledger.totals().live, 0);
    println!("all fallback allocations released");
}
