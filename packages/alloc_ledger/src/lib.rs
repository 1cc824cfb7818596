//! Allocation tracking and reporting over any host allocator.
//!
//! [`Ledger`] wraps a host allocator ([`std::alloc::System`] by default, or
//! any [`std::alloc::GlobalAlloc`]) and attaches accounting to every
//! allocation that flows through it:
//!
//! * a per-allocation record - requested size, originating file and line,
//!   owning thread - kept while the allocation is live;
//! * global current/peak usage and live-allocation counters;
//! * per-thread usage ledgers, created lazily on a thread's first tracked
//!   allocation and retired when the thread ends;
//! * double-release detection: releasing an allocation twice is memory
//!   corruption, and the process aborts with a diagnostic instead of
//!   limping on with an untrustworthy heap.
//!
//! Tracking is toggled with [`Ledger::activate()`] and
//! [`Ledger::deactivate()`]; while inactive, allocation calls pass through
//! to the host without accounting. Peaks collected so far survive
//! deactivation until [`Ledger::reset()`].
//!
//! Reports stream through a caller-supplied [`std::fmt::Write`] sink - see
//! [`Ledger::summary()`] and [`Ledger::summary_for_thread()`] - without
//! allocating in the reporting path.
//!
//! # The unified primitive
//!
//! Every entry point funnels into [`Ledger::reconcile()`], which takes an
//! optional existing pointer and a new size: no pointer means a fresh
//! allocation, a zero size means release, both present means resize. The
//! convenience wrappers ([`allocate()`](Ledger::allocate),
//! [`resize()`](Ledger::resize), [`release()`](Ledger::release)) are thin
//! sugar over it.
//!
//! # Instrumenting other allocation paths
//!
//! `Ledger` implements [`GlobalAlloc`](std::alloc::GlobalAlloc) itself, so
//! it can slot in wherever a host allocator is expected - for example as
//! the fallback host of an arena dispatcher - and the traffic of that
//! consumer lands in the same accounting.
//!
//! # Examples
//!
//! ```rust
//! use alloc_ledger::Ledger;
//! use new_zealand::nz;
//!
//! let ledger = Ledger::new();
//! ledger.activate();
//!
//! let ptr = ledger.allocate(nz!(100)).expect("host allocator has memory");
//!
//! let totals = ledger.totals();
//! assert_eq!(totals.current, 100);
//! assert_eq!(totals.peak, 100);
//! assert_eq!(totals.live, 1);
//!
//! // SAFETY: the pointer came from this ledger and is released only once.
//! unsafe { ledger.release(ptr) };
//!
//! let totals = ledger.totals();
//! assert_eq!(totals.current, 0);
//! assert_eq!(totals.peak, 100);
//! assert_eq!(totals.live, 0);
//! ```

mod ledger;
mod record;
mod registry;
mod report;

pub use ledger::{Ledger, LedgerTotals};
pub use registry::current_thread_id;

pub(crate) const ERR_POISONED_LOCK: &str =
    "encountered poisoned lock - program validity cannot be guaranteed";
