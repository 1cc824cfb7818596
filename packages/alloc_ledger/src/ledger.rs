use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZero;
use std::panic::Location;
use std::process;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::record::{AllocationRecord, Liveness};
use crate::registry::{self, ThreadRegistry, raise_peak};
use crate::{ERR_POISONED_LOCK, report};

/// Alignment of every allocation the ledger serves through its sized entry
/// points. Matches the strictest fundamental alignment in common use.
const LEDGER_ALIGNMENT: usize = 16;

/// A snapshot of the ledger's global counters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct LedgerTotals {
    /// Bytes currently allocated through the ledger.
    pub current: usize,

    /// The highest value `current` has reached since the last reset.
    pub peak: usize,

    /// Number of live tracked allocations.
    pub live: usize,
}

/// The record side table: per-allocation accounting keyed by address.
///
/// Replaces the classic header-in-front-of-the-pointer trick - no pointer
/// arithmetic is needed to find an allocation's metadata, and a released
/// record can linger as a tombstone, which is what makes a double release
/// detectable at all.
#[derive(Debug, Default)]
struct RecordTable {
    /// Records in allocation order; the sequence number is append order, so
    /// iterating the map replays the allocation history.
    by_seq: BTreeMap<u64, AllocationRecord>,

    /// Latest record (live or tombstone) for each address.
    by_address: HashMap<usize, u64>,

    /// Layout of every live allocation. Tracked unconditionally - the host
    /// requires the layout back at release time, even for allocations made
    /// while tracking was inactive.
    layouts: HashMap<usize, Layout>,
}

impl RecordTable {
    /// Inserts a record, displacing any older record (usually a tombstone)
    /// that occupied the same address.
    fn insert_record(&mut self, seq: u64, record: AllocationRecord) {
        if let Some(displaced) = self.by_address.insert(record.address, seq) {
            self.by_seq.remove(&displaced);
        }

        self.by_seq.insert(seq, record);
    }

    /// Removes and returns the record at `address`, if one exists.
    fn take_record(&mut self, address: usize) -> Option<(u64, AllocationRecord)> {
        let seq = self.by_address.remove(&address)?;

        let record = self
            .by_seq
            .remove(&seq)
            .expect("address index always points at an existing record");

        Some((seq, record))
    }

    /// Live records in allocation order.
    fn live_records(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.by_seq
            .values()
            .filter(|record| record.liveness == Liveness::Live)
    }
}

/// An allocation-tracking context wrapping a host allocator.
///
/// See the [crate documentation](crate) for the full model. Constructed
/// once by the application, activated and deactivated explicitly, and torn
/// down by dropping it.
///
/// The ledger's own bookkeeping (record tables, thread registry) allocates
/// through the process's global allocator, never through itself or its
/// host, so a ledger must **not** be installed as `#[global_allocator]` -
/// it is an instrumentation layer for explicit allocation paths, such as an
/// arena's fallback host or a subsystem allocator.
pub struct Ledger<H: GlobalAlloc = System> {
    host: H,

    /// Whether accounting is in effect. When clear, the entry points pass
    /// straight through to the host (layout bookkeeping aside).
    active: AtomicBool,

    current: AtomicUsize,
    peak: AtomicUsize,
    live: AtomicUsize,

    /// Append-order stamp for records.
    next_seq: AtomicU64,

    records: Mutex<RecordTable>,

    /// Per-thread ledgers; shared with the thread-local registrations that
    /// retire entries at thread end.
    threads: Arc<ThreadRegistry>,
}

impl<H: GlobalAlloc> fmt::Debug for Ledger<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("host", &"<allocator>")
            .field("active", &self.active.load(Ordering::Relaxed))
            .field("totals", &self.totals())
            .finish_non_exhaustive()
    }
}

impl Ledger<System> {
    /// Creates a ledger over the system allocator, with tracking inactive.
    #[must_use]
    pub fn new() -> Self {
        Self::with_host(System)
    }
}

impl Default for Ledger<System> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: GlobalAlloc> Ledger<H> {
    /// Creates a ledger over a caller-supplied host allocator, with
    /// tracking inactive.
    pub fn with_host(host: H) -> Self {
        Self {
            host,
            active: AtomicBool::new(false),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            live: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            records: Mutex::new(RecordTable::default()),
            threads: Arc::new(ThreadRegistry::default()),
        }
    }

    /// Starts accounting. Counters and records collected before a previous
    /// [`deactivate()`](Self::deactivate) are kept; use
    /// [`reset()`](Self::reset) to start from a clean slate.
    pub fn activate(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    /// Stops accounting; allocation calls pass through untouched.
    ///
    /// Allocations released while tracking is inactive are not debited, so
    /// toggling is best done at quiescent points.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Whether accounting is currently in effect.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Clears the counters, the allocation records, and every thread
    /// ledger. Live allocations stay releasable - only the accounting
    /// history is discarded.
    pub fn reset(&self) {
        {
            let mut table = self.records.lock().expect(ERR_POISONED_LOCK);
            table.by_seq.clear();
            table.by_address.clear();
            // Layouts stay: live allocations still need them at release.
        }

        self.current.store(0, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
        self.live.store(0, Ordering::Relaxed);
        self.threads.reset_all();
    }

    /// A snapshot of the global counters.
    #[must_use]
    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            current: self.current.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
            live: self.live.load(Ordering::Relaxed),
        }
    }

    /// The unified tracking primitive every entry point funnels into.
    ///
    /// * `existing == None`, `new_size > 0` - fresh allocation.
    /// * `existing == Some`, `new_size == 0` - release; returns `None`.
    /// * both present - resize, preserving contents up to the smaller size.
    /// * neither - no-op returning `None`.
    ///
    /// Returns `None` on host allocation failure; a failed resize leaves
    /// the existing allocation valid and accounted.
    ///
    /// # Safety
    ///
    /// `existing`, when present, must have been returned by this ledger's
    /// sized entry points, must not have been released, and must not be
    /// used again after a release or resize. A pointer violating this is
    /// memory corruption: the process aborts with a diagnostic rather than
    /// continuing on an untrustworthy heap.
    #[track_caller]
    pub unsafe fn reconcile(
        &self,
        existing: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let origin = Location::caller();

        match (existing, NonZero::new(new_size)) {
            (None, None) => None,
            (None, Some(size)) => self.alloc_inner(Self::layout_for(size)?, false, origin),
            (Some(ptr), None) => {
                self.release_inner(ptr, origin);
                None
            }
            (Some(ptr), Some(size)) => {
                self.resize_inner(ptr, Self::layout_for(size)?, origin)
            }
        }
    }

    /// Allocates `size` bytes through the host, recording the allocation
    /// when tracking is active.
    ///
    /// Returns `None` on host allocation failure.
    #[track_caller]
    #[must_use]
    pub fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        self.alloc_inner(Self::layout_for(size)?, false, Location::caller())
    }

    /// Allocates `count * size` zero-filled bytes.
    ///
    /// Returns `None` on host allocation failure or if the total size
    /// overflows.
    #[track_caller]
    #[must_use]
    pub fn allocate_zeroed(&self, count: NonZero<usize>, size: NonZero<usize>) -> Option<NonNull<u8>> {
        let total = NonZero::new(count.get().checked_mul(size.get())?)?;

        self.alloc_inner(Self::layout_for(total)?, true, Location::caller())
    }

    /// Resizes an allocation, preserving contents up to the smaller of the
    /// old and new sizes.
    ///
    /// Returns `None` on host allocation failure, in which case the
    /// original allocation remains valid and accounted.
    ///
    /// # Safety
    ///
    /// Same contract as [`reconcile()`](Self::reconcile): the pointer must
    /// be a live allocation of this ledger and must not be used after a
    /// successful resize.
    #[track_caller]
    #[must_use]
    pub unsafe fn resize(&self, ptr: NonNull<u8>, new_size: NonZero<usize>) -> Option<NonNull<u8>> {
        let Some(new_layout) = Self::layout_for(new_size) else {
            return None;
        };

        self.resize_inner(ptr, new_layout, Location::caller())
    }

    /// Releases an allocation back to the host.
    ///
    /// # Safety
    ///
    /// Same contract as [`reconcile()`](Self::reconcile): the pointer must
    /// be a live allocation of this ledger. Releasing twice is detected and
    /// aborts the process.
    #[track_caller]
    pub unsafe fn release(&self, ptr: NonNull<u8>) {
        self.release_inner(ptr, Location::caller());
    }

    /// Streams the global usage report through `sink`.
    ///
    /// The report carries current and peak usage and the live-allocation
    /// count; with `verbose` it also lists every live allocation with its
    /// origin. The reporting path performs no allocation of its own.
    ///
    /// # Errors
    ///
    /// Propagates errors from the sink.
    pub fn summary(&self, verbose: bool, sink: &mut dyn fmt::Write) -> fmt::Result {
        let table = self.records.lock().expect(ERR_POISONED_LOCK);

        writeln!(sink, "{{")?;
        writeln!(
            sink,
            "\t'current-heap-usage': {},",
            self.current.load(Ordering::Relaxed)
        )?;
        writeln!(
            sink,
            "\t'max-heap-usage': {},",
            self.peak.load(Ordering::Relaxed)
        )?;

        if verbose && table.live_records().next().is_some() {
            writeln!(sink, "\t'allocations': [")?;

            for record in table.live_records() {
                report::write_record(sink, record, &self.threads)?;
            }

            writeln!(sink, "\t],")?;
        }

        writeln!(
            sink,
            "\t'live-allocations': {},",
            self.live.load(Ordering::Relaxed)
        )?;
        writeln!(sink, "}}")
    }

    /// Streams one thread's usage report through `sink`.
    ///
    /// `name` overrides the thread name in the report header; otherwise the
    /// name recorded at the thread's registration is used. A thread with no
    /// recorded activity reports zero usage - that is an answer, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Propagates errors from the sink.
    pub fn summary_for_thread(
        &self,
        thread_id: u64,
        name: Option<&str>,
        verbose: bool,
        sink: &mut dyn fmt::Write,
    ) -> fmt::Result {
        let table = self.records.lock().expect(ERR_POISONED_LOCK);
        let ledger = self.threads.find(thread_id);

        let resolved_name = name
            .or_else(|| ledger.as_ref().and_then(|ledger| ledger.name.as_deref()))
            .unwrap_or("?");

        writeln!(sink, "{{")?;
        writeln!(sink, "\t'thread': [ '{resolved_name}', {thread_id} ]")?;

        match ledger {
            Some(ledger) => {
                writeln!(sink, "\t'current-heap-usage': {},", ledger.current())?;
                writeln!(sink, "\t'maximum-heap-usage': {},", ledger.peak())?;

                if verbose && ledger.current() != 0 {
                    writeln!(sink, "\t'allocations': [")?;

                    for record in table
                        .live_records()
                        .filter(|record| record.thread_id == thread_id)
                    {
                        report::write_record(sink, record, &self.threads)?;
                    }

                    writeln!(sink, "\t],")?;
                }
            }
            None => {
                writeln!(sink, "\t'current-heap-usage': 0,")?;
                writeln!(sink, "\t'maximum-heap-usage': 0,")?;
            }
        }

        writeln!(sink, "}}")
    }

    /// Prints the global usage report to stdout.
    ///
    /// This is a convenience method equivalent to streaming
    /// [`summary()`](Self::summary) into stdout line by line.
    #[cfg_attr(test, mutants::skip)] // Too difficult to test stdout output reliably - manually tested.
    pub fn print_to_stdout(&self, verbose: bool) {
        let mut sink = StdoutSink;

        // Stdout writes do not fail in any way we could meaningfully handle.
        _ = self.summary(verbose, &mut sink);
    }

    fn layout_for(size: NonZero<usize>) -> Option<Layout> {
        Layout::from_size_align(size.get(), LEDGER_ALIGNMENT).ok()
    }

    fn credit_global(&self, size: usize) {
        // Relaxed suffices throughout: only atomicity matters here, not
        // ordering against other memory operations.
        let current = self
            .current
            .fetch_add(size, Ordering::Relaxed)
            .wrapping_add(size);

        raise_peak(&self.peak, current);
    }

    fn debit_global(&self, size: usize) {
        let mut observed = self.current.load(Ordering::Relaxed);

        loop {
            // Saturating: a reset may have zeroed the counter while the
            // allocation being released was still live.
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

    fn decrement_live(&self) {
        let mut observed = self.live.load(Ordering::Relaxed);

        loop {
            let next = observed.saturating_sub(1);

            match self.live.compare_exchange_weak(
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

    fn alloc_inner(
        &self,
        layout: Layout,
        zeroed: bool,
        origin: &'static Location<'static>,
    ) -> Option<NonNull<u8>> {
        // SAFETY: layout has nonzero size; every caller derives it from a
        // nonzero byte count.
        let raw = unsafe {
            if zeroed {
                self.host.alloc_zeroed(layout)
            } else {
                self.host.alloc(layout)
            }
        };

        let ptr = NonNull::new(raw)?;

        // Exposing the provenance keeps the bare-address side table an
        // honest description of pointers we may later reconstruct.
        let address = ptr.as_ptr().expose_provenance();
        let active = self.is_active();

        {
            let mut table = self.records.lock().expect(ERR_POISONED_LOCK);

            table.layouts.insert(address, layout);

            if active {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

                table.insert_record(
                    seq,
                    AllocationRecord {
                        address,
                        size: layout.size(),
                        origin,
                        thread_id: registry::current_thread_id(),
                        liveness: Liveness::Live,
                    },
                );
            }
        }

        if active {
            self.credit_global(layout.size());
            self.live.fetch_add(1, Ordering::Relaxed);

            registry::with_thread_ledger(&self.threads, |ledger| ledger.credit(layout.size()));
        }

        Some(ptr)
    }

    fn release_inner(&self, ptr: NonNull<u8>, origin: &'static Location<'static>) {
        let address = ptr.addr().get();
        let active = self.is_active();

        let mut debit = None;

        let layout = {
            let mut table = self.records.lock().expect(ERR_POISONED_LOCK);

            if let Some(&seq) = table.by_address.get(&address) {
                let record = table
                    .by_seq
                    .get_mut(&seq)
                    .expect("address index always points at an existing record");

                if record.liveness == Liveness::Released {
                    corruption_abort(origin, address, "double release detected");
                }

                if active {
                    record.liveness = Liveness::Released;
                    debit = Some(record.size);
                }
            }

            match table.layouts.remove(&address) {
                Some(layout) => layout,
                None => corruption_abort(origin, address, "pointer is unknown to this ledger"),
            }
        };

        if let Some(size) = debit {
            self.debit_global(size);
            self.decrement_live();

            // No registration is created here: a thread that only releases
            // has nothing to debit.
            registry::with_registered_ledger(&self.threads, |ledger| ledger.debit(size));
        }

        // SAFETY: the table entry proves this pointer came from self.host
        // with this layout and was not yet released.
        unsafe { self.host.dealloc(ptr.as_ptr(), layout) };
    }

    fn resize_inner(
        &self,
        ptr: NonNull<u8>,
        new_layout: Layout,
        origin: &'static Location<'static>,
    ) -> Option<NonNull<u8>> {
        let address = ptr.addr().get();
        let active = self.is_active();

        // Detach the allocation from the tables before calling the host, so
        // a concurrent allocation reusing the old address cannot collide
        // with stale entries. A failed resize restores everything below.
        let (old_layout, old_record) = {
            let mut table = self.records.lock().expect(ERR_POISONED_LOCK);

            if let Some(&seq) = table.by_address.get(&address) {
                let record = table
                    .by_seq
                    .get(&seq)
                    .expect("address index always points at an existing record");

                if record.liveness == Liveness::Released {
                    corruption_abort(origin, address, "resize of a released allocation");
                }
            }

            let old_layout = match table.layouts.remove(&address) {
                Some(layout) => layout,
                None => corruption_abort(origin, address, "pointer is unknown to this ledger"),
            };

            (old_layout, table.take_record(address))
        };

        // SAFETY: the table entry proves provenance and layout; the caller
        // guarantees exclusive ownership of the allocation.
        let raw = unsafe {
            self.host
                .realloc(ptr.as_ptr(), old_layout, new_layout.size())
        };

        let Some(new_ptr) = NonNull::new(raw) else {
            // The host left the original allocation intact; restore the
            // detached bookkeeping.
            let mut table = self.records.lock().expect(ERR_POISONED_LOCK);

            table.layouts.insert(address, old_layout);

            if let Some((seq, record)) = old_record {
                table.insert_record(seq, record);
            }

            return None;
        };

        let new_address = new_ptr.as_ptr().expose_provenance();

        {
            let mut table = self.records.lock().expect(ERR_POISONED_LOCK);

            table.layouts.insert(new_address, new_layout);

            if active {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

                table.insert_record(
                    seq,
                    AllocationRecord {
                        address: new_address,
                        size: new_layout.size(),
                        origin,
                        thread_id: registry::current_thread_id(),
                        liveness: Liveness::Live,
                    },
                );
            }
            // While inactive the old record (if any) is simply dropped: the
            // memory has moved, and a record pointing at the old address
            // would describe freed memory.
        }

        if active {
            let old_size = old_record.as_ref().map_or(0, |(_, record)| record.size);

            if old_record.is_some() {
                self.debit_global(old_size);
                self.decrement_live();
                registry::with_registered_ledger(&self.threads, |ledger| ledger.debit(old_size));
            }

            self.credit_global(new_layout.size());
            self.live.fetch_add(1, Ordering::Relaxed);
            registry::with_thread_ledger(&self.threads, |ledger| {
                ledger.credit(new_layout.size());
            });
        }

        Some(new_ptr)
    }
}

// SAFETY: All allocation operations delegate to the host allocator, which
// already implements GlobalAlloc correctly; the added accounting does not
// alter allocation behavior. The stored layout always equals the layout the
// caller passes back, as the GlobalAlloc contract requires.
unsafe impl<H: GlobalAlloc> GlobalAlloc for Ledger<H> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.alloc_inner(layout, false, Location::caller())
            .map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.alloc_inner(layout, true, Location::caller())
            .map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };

        // The layout is recovered from the side table, which stored the
        // true layout at allocation time.
        self.release_inner(ptr, Location::caller());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let Some(ptr) = NonNull::new(ptr) else {
            return std::ptr::null_mut();
        };

        // Per the GlobalAlloc contract the new block keeps the old
        // alignment.
        let Ok(new_layout) = Layout::from_size_align(new_size, layout.align()) else {
            return std::ptr::null_mut();
        };

        self.resize_inner(ptr, new_layout, Location::caller())
            .map_or(std::ptr::null_mut(), NonNull::as_ptr)
    }
}

// SAFETY: Delegates to the referenced ledger; GlobalAlloc methods take
// &self, so a shared reference is just as capable as the owned value. This
// impl is what lets a borrowed ledger serve as another component's host
// allocator while the owner keeps querying it.
unsafe impl<H: GlobalAlloc> GlobalAlloc for &Ledger<H> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarding the caller's contract unchanged.
        unsafe { (**self).alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        // SAFETY: forwarding the caller's contract unchanged.
        unsafe { (**self).alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // SAFETY: forwarding the caller's contract unchanged.
        unsafe { (**self).dealloc(ptr, layout) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // SAFETY: forwarding the caller's contract unchanged.
        unsafe { (**self).realloc(ptr, layout, new_size) }
    }
}

/// A `fmt::Write` sink forwarding to stdout.
struct StdoutSink;

impl fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        print!("{s}");
        Ok(())
    }
}

/// The heap can no longer be trusted; emit a diagnostic and terminate.
///
/// Deliberately not an error value: corruption must not be catchable and
/// ignorable by the embedding application.
#[cold]
fn corruption_abort(origin: &'static Location<'static>, address: usize, reason: &str) -> ! {
    eprintln!("memory corruption: {reason} (address {address:#x}, detected at {origin})");

    process::abort();
}

#[cfg(test)]
mod tests {
    use new_zealand::nz;

    use super::*;

    // The ledger is shared across threads behind its internal locks.
    static_assertions::assert_impl_all!(Ledger<System>: Send, Sync);

    fn active_ledger() -> Ledger<System> {
        let ledger = Ledger::new();
        ledger.activate();
        ledger
    }

    #[test]
    fn allocation_moves_the_counters() {
        let ledger = active_ledger();

        let ptr = ledger.allocate(nz!(100)).unwrap();

        let totals = ledger.totals();
        assert_eq!(totals.current, 100);
        assert_eq!(totals.peak, 100);
        assert_eq!(totals.live, 1);

        // SAFETY: the pointer came from this ledger and is released once.
        unsafe { ledger.release(ptr) };

        let totals = ledger.totals();
        assert_eq!(totals.current, 0);
        assert_eq!(totals.peak, 100, "peak is monotonic");
        assert_eq!(totals.live, 0);
    }

    #[test]
    fn inactive_ledger_accounts_nothing() {
        let ledger = Ledger::new();

        let ptr = ledger.allocate(nz!(64)).unwrap();

        assert_eq!(ledger.totals(), LedgerTotals {
            current: 0,
            peak: 0,
            live: 0,
        });

        // SAFETY: the pointer came from this ledger and is released once.
        unsafe { ledger.release(ptr) };

        assert_eq!(ledger.totals().current, 0);
    }

    #[test]
    fn deactivation_keeps_the_peak_until_reset() {
        let ledger = active_ledger();

        let ptr = ledger.allocate(nz!(256)).unwrap();
        // SAFETY: released exactly once.
        unsafe { ledger.release(ptr) };

        ledger.deactivate();
        assert_eq!(ledger.totals().peak, 256);

        ledger.reset();
        assert_eq!(ledger.totals().peak, 0);
    }

    #[test]
    fn resize_adjusts_by_the_delta() {
        let ledger = active_ledger();

        let ptr = ledger.allocate(nz!(100)).unwrap();

        // SAFETY: the pointer is live and not used after the resize.
        let ptr = unsafe { ledger.resize(ptr, nz!(300)) }.unwrap();

        let totals = ledger.totals();
        assert_eq!(totals.current, 300);
        assert_eq!(totals.peak, 300);
        assert_eq!(totals.live, 1, "a resize is not a new allocation");

        // SAFETY: the resized pointer is live and released once.
        let ptr = unsafe { ledger.resize(ptr, nz!(50)) }.unwrap();

        let totals = ledger.totals();
        assert_eq!(totals.current, 50);
        assert_eq!(totals.peak, 300);

        // SAFETY: released exactly once.
        unsafe { ledger.release(ptr) };
        assert_eq!(ledger.totals().live, 0);
    }

    #[test]
    fn resize_preserves_contents() {
        let ledger = active_ledger();

        let ptr = ledger.allocate(nz!(16)).unwrap();

        // SAFETY: the block is valid for 16 writable bytes.
        unsafe {
            for offset in 0..16 {
                ptr.add(offset).write(offset as u8);
            }
        }

        // SAFETY: the pointer is live and not used after the resize.
        let grown = unsafe { ledger.resize(ptr, nz!(64)) }.unwrap();

        // SAFETY: the first 16 bytes moved with the resize.
        unsafe {
            for offset in 0..16 {
                assert_eq!(grown.add(offset).read(), offset as u8);
            }
        }

        // SAFETY: released exactly once.
        unsafe { ledger.release(grown) };
    }

    #[test]
    fn reconcile_dispatches_all_four_shapes() {
        let ledger = active_ledger();

        // Neither pointer nor size: no-op.
        // SAFETY: no pointer is involved at all.
        assert!(unsafe { ledger.reconcile(None, 0) }.is_none());

        // Fresh allocation.
        // SAFETY: no existing pointer is involved.
        let ptr = unsafe { ledger.reconcile(None, 128) }.unwrap();
        assert_eq!(ledger.totals().current, 128);

        // Resize.
        // SAFETY: the pointer is live and not used after the resize.
        let ptr = unsafe { ledger.reconcile(Some(ptr), 512) }.unwrap();
        assert_eq!(ledger.totals().current, 512);

        // Release.
        // SAFETY: the pointer is live and released once.
        assert!(unsafe { ledger.reconcile(Some(ptr), 0) }.is_none());
        assert_eq!(ledger.totals().current, 0);
    }

    #[test]
    fn allocate_zeroed_returns_cleared_memory() {
        let ledger = active_ledger();

        let ptr = ledger.allocate_zeroed(nz!(4), nz!(32)).unwrap();

        // SAFETY: the allocation is 128 readable bytes, just zero-filled.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 128) };
        assert!(bytes.iter().all(|&byte| byte == 0));

        assert_eq!(ledger.totals().current, 128);

        // SAFETY: released exactly once.
        unsafe { ledger.release(ptr) };
    }

    #[test]
    fn allocate_zeroed_rejects_overflowing_products() {
        let ledger = active_ledger();

        assert!(ledger.allocate_zeroed(NonZero::<usize>::MAX, nz!(2)).is_none());
    }

    #[test]
    fn summary_streams_the_counters() {
        let ledger = active_ledger();

        let ptr = ledger.allocate(nz!(100)).unwrap();

        let mut text = String::new();
        ledger.summary(true, &mut text).unwrap();

        assert!(text.contains("'current-heap-usage': 100,"));
        assert!(text.contains("'max-heap-usage': 100,"));
        assert!(text.contains("'live-allocations': 1,"));
        // Verbose mode lists the allocation with its origin in this file.
        assert!(text.contains("ledger.rs"));

        // SAFETY: released exactly once.
        unsafe { ledger.release(ptr) };

        let mut text = String::new();
        ledger.summary(false, &mut text).unwrap();
        assert!(text.contains("'current-heap-usage': 0,"));
        assert!(text.contains("'live-allocations': 0,"));
    }

    #[test]
    fn quiet_thread_reports_zero_usage() {
        let ledger = active_ledger();

        let mut text = String::new();
        ledger
            .summary_for_thread(u64::MAX, Some("ghost"), true, &mut text)
            .unwrap();

        assert!(text.contains("'ghost'"));
        assert!(text.contains("'current-heap-usage': 0,"));
        assert!(text.contains("'maximum-heap-usage': 0,"));
    }

    #[test]
    fn own_thread_summary_reflects_usage() {
        let ledger = active_ledger();

        let ptr = ledger.allocate(nz!(200)).unwrap();

        let mut text = String::new();
        ledger
            .summary_for_thread(crate::current_thread_id(), None, false, &mut text)
            .unwrap();

        assert!(text.contains("'current-heap-usage': 200,"));

        // SAFETY: released exactly once.
        unsafe { ledger.release(ptr) };
    }

    #[test]
    fn global_alloc_surface_is_accounted() {
        let ledger = active_ledger();

        let layout = Layout::from_size_align(64, 8).unwrap();

        // SAFETY: layout has nonzero size.
        let raw = unsafe { ledger.alloc(layout) };
        assert!(!raw.is_null());
        assert_eq!(ledger.totals().current, 64);

        // SAFETY: allocated above with this exact layout.
        unsafe { ledger.dealloc(raw, layout) };
        assert_eq!(ledger.totals().current, 0);
    }
}
