//! Basic usage of the `alloc_ledger` crate:
//!
//! * Activating tracking.
//! * Allocating, resizing, and releasing through the ledger.
//! * Streaming the usage report.

use alloc_ledger::Ledger;
use new_zealand::nz;

fn main() {
    let ledger = Ledger::new();
    ledger.activate();

    let first = ledger.allocate(nz!(100)).expect("host allocator has memory");
    let second = ledger.allocate(nz!(250)).expect("host allocator has memory");

    // SAFETY: `second` is live and not used again after the resize.
    let second = unsafe { ledger.resize(second, nz!(500)) }.expect("host allocator has memory");

    let totals = ledger.totals();
    println!(
        "current {} bytes, peak {} bytes, {} live allocations",
        totals.current, totals.peak, totals.live
    );

    // The verbose report lists every live allocation with its origin.
    let mut report = String::new();
    ledger
        .summary(true, &mut report)
        .expect("writing to a String cannot fail");
    println!("{report}");

    // SAFETY: each pointer is released exactly once.
    unsafe {
        ledger.release(first);
        ledger.release(second);
    }

    println!("after release: {:?}", ledger.totals());
}
