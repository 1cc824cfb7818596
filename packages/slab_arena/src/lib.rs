//! Fixed-block slab pools with a size-class arena dispatcher.
//!
//! This crate provides two deterministic allocation primitives for
//! latency-sensitive or resource-constrained targets:
//!
//! * [`Slab`] - a pool of fixed-size, fixed-alignment memory blocks backed
//!   by caller-borrowed or self-acquired memory. A free/used bitmap tracks
//!   every block; allocation always hands out the lowest free block index,
//!   which keeps behavior reproducible run to run.
//! * [`Arena`] - an ordered collection of slabs keyed by ascending block
//!   size. A request is routed to the smallest adequate size class; when
//!   that class is exhausted or no class fits, the request transparently
//!   falls through to a host allocator. Callers cannot tell a pool hit from
//!   a fallback hit.
//!
//! A slab sticks allocation churn to its own pool memory, leaving large
//! contiguous ranges of the host heap intact. The per-pool statistics exist
//! to tune a size-class table: monitor [`SlabStats::missed`] to find
//! requests that had to fall back to the host, and `allocated - released`
//! to gauge pool occupancy, then grow or shrink the classes accordingly.
//!
//! # Exhaustion is not an error
//!
//! [`Slab::allocate()`] and [`Arena::allocate()`] return [`Option`]: an
//! exhausted pool is an expected operating condition, counted in the
//! `missed` statistic, not an error. Errors are reserved for contract
//! violations (bad geometry, foreign pointers, busy teardown).
//!
//! # Thread safety
//!
//! Both types synchronize internally with a blocking mutex, so shared
//! references can allocate and release from any thread. Lock acquisition
//! may block indefinitely; no timeout or priority-inheritance semantics
//! are provided.
//!
//! # Examples
//!
//! ```rust
//! use new_zealand::nz;
//! use slab_arena::{Arena, SizeClass};
//!
//! // Sorted by increasing block size.
//! let arena = Arena::new(&[
//!     SizeClass::new(nz!(64), nz!(32)),
//!     SizeClass::new(nz!(256), nz!(8)),
//! ])?;
//!
//! // 47 bytes fits the 64-byte class.
//! let ptr = arena.allocate(nz!(47)).expect("class has free blocks");
//! arena.release(ptr)?;
//!
//! // 4096 bytes fits no class and is served by the host allocator.
//! let big = arena.allocate(nz!(4096)).expect("host allocator has memory");
//! arena.release(big)?;
//! # Ok::<(), slab_arena::Error>(())
//! ```

mod arena;
mod bitmap;
mod builder;
mod drop_policy;
mod error;
mod slab;
mod stats;

pub use arena::{Arena, SizeClass};
pub use builder::SlabBuilder;
pub use drop_policy::DropPolicy;
pub use error::Error;
pub use slab::Slab;
pub use stats::SlabStats;

pub(crate) use error::Result;

pub(crate) const ERR_POISONED_LOCK: &str =
    "encountered poisoned lock - program validity cannot be guaranteed";
