//! Integration tests exercising the ledger through the public API.

use std::sync::Arc;
use std::thread;

use alloc_ledger::{Ledger, current_thread_id};
use new_zealand::nz;

#[test]
fn the_canonical_lifecycle() {
    let ledger = Ledger::new();
    ledger.activate();

    let ptr = ledger.allocate(nz!(100)).expect("host allocator has memory");

    let totals = ledger.totals();
    assert_eq!(totals.current, 100);
    assert_eq!(totals.peak, 100);
    assert_eq!(totals.live, 1);

    // SAFETY: the pointer came from this ledger and is released once.
    unsafe { ledger.release(ptr) };

    let totals = ledger.totals();
    assert_eq!(totals.current, 0);
    assert_eq!(totals.peak, 100);
    assert_eq!(totals.live, 0);
}

#[test]
fn per_thread_ledgers_follow_their_threads() {
    let ledger = Arc::new(Ledger::new());
    ledger.activate();

    let worker_ledger = Arc::clone(&ledger);
    let (worker_id, worker_ptr) = thread::Builder::new()
        .name("worker".to_string())
        .spawn(move || {
            let ptr = worker_ledger
                .allocate(nz!(300))
                .expect("host allocator has memory");

            // Hand the pointer back as a bare (exposed) address so the main
            // thread can release it.
            (current_thread_id(), ptr.as_ptr().expose_provenance())
        })
        .expect("spawning a thread succeeds")
        .join()
        .expect("worker does not panic");

    // Global accounting saw the worker's allocation.
    assert_eq!(ledger.totals().current, 300);

    // The worker has exited, so its ledger is retired and reports zeros.
    let mut text = String::new();
    ledger
        .summary_for_thread(worker_id, None, false, &mut text)
        .unwrap();
    assert!(text.contains("'current-heap-usage': 0,"));

    // SAFETY: the address round-tripped unchanged; released exactly once.
    unsafe {
        ledger.release(
            std::ptr::NonNull::new(std::ptr::with_exposed_provenance_mut(worker_ptr))
                .expect("the worker's allocation was not null"),
        );
    }

    assert_eq!(ledger.totals().current, 0);
}

#[test]
fn live_thread_summary_shows_its_usage() {
    let ledger = Arc::new(Ledger::new());
    ledger.activate();

    let worker_ledger = Arc::clone(&ledger);
    let handle = thread::Builder::new()
        .name("auditor".to_string())
        .spawn(move || {
            let ptr = worker_ledger
                .allocate(nz!(500))
                .expect("host allocator has memory");

            let mut text = String::new();
            worker_ledger
                .summary_for_thread(current_thread_id(), None, true, &mut text)
                .unwrap();

            // The report names the thread and carries its usage.
            assert!(text.contains("'auditor'"));
            assert!(text.contains("'current-heap-usage': 500,"));
            assert!(text.contains("'maximum-heap-usage': 500,"));

            // SAFETY: released exactly once.
            unsafe { worker_ledger.release(ptr) };
        })
        .expect("spawning a thread succeeds");

    handle.join().expect("auditor does not panic");
}

#[test]
fn concurrent_traffic_balances_out() {
    let ledger = Arc::new(Ledger::new());
    ledger.activate();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for _ in 0..100 {
                    let ptr = ledger.allocate(nz!(64)).expect("host allocator has memory");
                    // SAFETY: released exactly once, by the allocating thread.
                    unsafe { ledger.release(ptr) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("workers do not panic");
    }

    let totals = ledger.totals();
    assert_eq!(totals.current, 0);
    assert_eq!(totals.live, 0);
    assert!(totals.peak >= 64, "at least one allocation was live at once");
}

#[test]
fn verbose_summary_lists_live_allocations_in_order() {
    let ledger = Ledger::new();
    ledger.activate();

    let first = ledger.allocate(nz!(10)).expect("host allocator has memory");
    let second = ledger.allocate(nz!(20)).expect("host allocator has memory");

    let mut text = String::new();
    ledger.summary(true, &mut text).unwrap();

    let first_at = text
        .find("'mem': [ ")
        .expect("verbose summary lists allocations");
    // Records appear in allocation order: the 10-byte record precedes the
    // 20-byte record.
    let tail = &text[first_at..];
    assert!(tail.contains(", 10 ]"));
    let second_at = tail.find(", 20 ]").expect("second record is listed");
    let first_size_at = tail.find(", 10 ]").expect("first record is listed");
    assert!(first_size_at < second_at);

    // SAFETY: each pointer is released exactly once.
    unsafe {
        ledger.release(first);
        ledger.release(second);
    }
}

#[test]
fn pass_through_while_inactive() {
    let ledger = Ledger::new();

    // Never activated: allocation works, accounting stays silent.
    let ptr = ledger.allocate(nz!(4096)).expect("host allocator has memory");

    // SAFETY: the allocation is valid for 4096 writable bytes.
    unsafe { ptr.as_ptr().write_bytes(0x5A, 4096) };

    assert_eq!(ledger.totals().current, 0);
    assert_eq!(ledger.totals().live, 0);

    // SAFETY: released exactly once.
    unsafe { ledger.release(ptr) };
}

#[test]
fn reset_clears_history_but_not_live_allocations() {
    let ledger = Ledger::new();
    ledger.activate();

    let survivor = ledger.allocate(nz!(128)).expect("host allocator has memory");

    ledger.reset();

    let totals = ledger.totals();
    assert_eq!(totals.current, 0);
    assert_eq!(totals.peak, 0);
    assert_eq!(totals.live, 0);

    // The pre-reset allocation is still releasable; the counters clamp at
    // zero rather than underflowing.
    // SAFETY: released exactly once.
    unsafe { ledger.release(survivor) };
    assert_eq!(ledger.totals().current, 0);
}
