use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::ERR_POISONED_LOCK;

/// Process-wide thread identifier assignment. Mirrors the approach of
/// `std::thread::ThreadId`: a shared counter handing out small ids, cached
/// in thread-local storage after first use. Identifier 0 is never assigned,
/// so it can never collide with a real thread in reports.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// This thread's assigned identifier, once any ledger has asked for it.
    static THREAD_ID: Cell<Option<u64>> = const { Cell::new(None) };

    /// This thread's per-ledger registrations. Dropped at thread end, which
    /// retires each registered ledger from its registry.
    static REGISTRATIONS: RefCell<Vec<Registration>> = const { RefCell::new(Vec::new()) };
}

/// The ledger-assigned identifier of the calling thread.
///
/// Identifiers are small sequential numbers assigned on a thread's first
/// contact with any ledger; they are never reused within a process.
#[must_use]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|cell| {
        if let Some(id) = cell.get() {
            return id;
        }

        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        cell.set(Some(id));
        id
    })
}

/// Current and peak allocated-byte counters for one thread.
///
/// Updates are lock-free so the hot accounting path never takes the
/// registry lock; the registry is only locked to add, retire, or look up
/// ledgers.
#[derive(Debug)]
pub(crate) struct ThreadLedger {
    pub(crate) thread_id: u64,

    /// The thread's name at registration time, when it had one.
    pub(crate) name: Option<String>,

    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ThreadLedger {
    fn new(thread_id: u64, name: Option<String>) -> Self {
        Self {
            thread_id,
            name,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Adds `size` bytes to the thread's usage, raising the peak if passed.
    pub(crate) fn credit(&self, size: usize) {
        // Relaxed suffices: only atomicity matters, not ordering against
        // other memory operations.
        let current = self
            .current
            .fetch_add(size, Ordering::Relaxed)
            .wrapping_add(size);

        raise_peak(&self.peak, current);
    }

    /// Removes `size` bytes from the thread's usage, clamping at zero - a
    /// thread releasing memory another thread allocated owes nothing.
    pub(crate) fn debit(&self, size: usize) {
        let mut observed = self.current.load(Ordering::Relaxed);

        loop {
            let next = observed.saturating_sub(size);

            match self.current.compare_exchange_weak(
                observed,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => observed = actual,
            }
        }
    }

    pub(crate) fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Zeroes both counters; the ledger stays registered.
    fn reset(&self) {
        self.current.store(0, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
    }
}

/// Monotonically raises `peak` to at least `candidate`.
pub(crate) fn raise_peak(peak: &AtomicUsize, candidate: usize) {
    let mut observed = peak.load(Ordering::Relaxed);

    while candidate > observed {
        match peak.compare_exchange_weak(observed, candidate, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => break,
            Err(actual) => observed = actual,
        }
    }
}

/// The set of live per-thread ledgers belonging to one tracking context.
///
/// Ledgers are added lazily on a thread's first tracked allocation and
/// retired by that thread's end-of-thread destructor, so the registry only
/// ever lists threads that are (or very recently were) alive.
#[derive(Debug, Default)]
pub(crate) struct ThreadRegistry {
    entries: Mutex<Vec<Arc<ThreadLedger>>>,
}

impl ThreadRegistry {
    /// Looks up the ledger of an arbitrary thread by identifier.
    pub(crate) fn find(&self, thread_id: u64) -> Option<Arc<ThreadLedger>> {
        self.entries
            .lock()
            .expect(ERR_POISONED_LOCK)
            .iter()
            .find(|ledger| ledger.thread_id == thread_id)
            .map(Arc::clone)
    }

    fn register(&self, thread_id: u64, name: Option<String>) -> Arc<ThreadLedger> {
        let ledger = Arc::new(ThreadLedger::new(thread_id, name));

        self.entries
            .lock()
            .expect(ERR_POISONED_LOCK)
            .push(Arc::clone(&ledger));

        ledger
    }

    /// Zeroes every registered thread's counters. Threads stay registered -
    /// only their history is discarded.
    pub(crate) fn reset_all(&self) {
        for ledger in self.entries.lock().expect(ERR_POISONED_LOCK).iter() {
            ledger.reset();
        }
    }

    fn retire(&self, ledger: &Arc<ThreadLedger>) {
        // Thread teardown must not panic; a poisoned registry just keeps
        // the stale entry.
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|entry| !Arc::ptr_eq(entry, ledger));
        }
    }
}

/// One thread's membership in one registry; dropping it (at thread end)
/// retires the thread's ledger.
#[derive(Debug)]
struct Registration {
    registry: Arc<ThreadRegistry>,
    ledger: Arc<ThreadLedger>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.retire(&self.ledger);
    }
}

/// Runs `operation` against the calling thread's ledger in `registry`,
/// registering the thread first if this is its first tracked allocation.
///
/// Degrades gracefully: when thread-local storage is no longer available
/// (the thread is tearing down), per-thread accounting is silently skipped
/// and the caller's global accounting stands alone.
pub(crate) fn with_thread_ledger(registry: &Arc<ThreadRegistry>, operation: impl FnOnce(&ThreadLedger)) {
    // A failed try_with means TLS is already torn down: skip silently.
    _ = REGISTRATIONS.try_with(|cell| {
        let mut registrations = cell.borrow_mut();

        let position = registrations
            .iter()
            .position(|registration| Arc::ptr_eq(&registration.registry, registry));

        let index = match position {
            Some(index) => index,
            None => {
                let ledger = registry.register(
                    current_thread_id(),
                    std::thread::current().name().map(str::to_owned),
                );

                registrations.push(Registration {
                    registry: Arc::clone(registry),
                    ledger,
                });

                // Just pushed, so the last slot is ours.
                registrations.len().wrapping_sub(1)
            }
        };

        if let Some(registration) = registrations.get(index) {
            operation(&registration.ledger);
        }
    });
}

/// Like [`with_thread_ledger`] but never registers: a thread that has no
/// ledger in `registry` is left untouched.
pub(crate) fn with_registered_ledger(
    registry: &Arc<ThreadRegistry>,
    operation: impl FnOnce(&ThreadLedger),
) {
    _ = REGISTRATIONS.try_with(|cell| {
        let registrations = cell.borrow();

        if let Some(registration) = registrations
            .iter()
            .find(|registration| Arc::ptr_eq(&registration.registry, registry))
        {
            operation(&registration.ledger);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_ids_are_stable_within_a_thread() {
        assert_eq!(current_thread_id(), current_thread_id());
    }

    #[test]
    fn thread_ids_differ_across_threads() {
        let here = current_thread_id();
        let there = std::thread::spawn(current_thread_id).join().unwrap();

        assert_ne!(here, there);
    }

    #[test]
    fn credit_raises_peak_and_debit_does_not_lower_it() {
        let ledger = ThreadLedger::new(1, None);

        ledger.credit(100);
        ledger.credit(50);
        assert_eq!(ledger.current(), 150);
        assert_eq!(ledger.peak(), 150);

        ledger.debit(120);
        assert_eq!(ledger.current(), 30);
        assert_eq!(ledger.peak(), 150);
    }

    #[test]
    fn debit_clamps_at_zero() {
        let ledger = ThreadLedger::new(1, None);

        ledger.credit(10);
        ledger.debit(100);

        assert_eq!(ledger.current(), 0);
    }

    #[test]
    fn registry_retires_ledgers_with_their_thread() {
        let registry = Arc::new(ThreadRegistry::default());

        let registry_for_thread = Arc::clone(&registry);
        let thread_id = std::thread::spawn(move || {
            with_thread_ledger(&registry_for_thread, |ledger| ledger.credit(64));
            current_thread_id()
        })
        .join()
        .unwrap();

        // The thread has exited, so its ledger is gone from the registry.
        assert!(registry.find(thread_id).is_none());
    }

    #[test]
    fn lookup_does_not_register() {
        let registry = Arc::new(ThreadRegistry::default());

        with_registered_ledger(&registry, |ledger| ledger.credit(1));

        assert!(registry.find(current_thread_id()).is_none());
    }
}
