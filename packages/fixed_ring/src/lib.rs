//! Fixed-capacity ring primitives for single-producer/single-consumer queues.
//!
//! This crate provides two layers over the same slot arithmetic:
//!
//! * [`RingIndex`] - pure head/tail/mask bookkeeping for a power-of-two
//!   circular sequence of logical slots. It owns no storage; `put()` and
//!   `get()` hand out physical slot indexes for the caller to use against
//!   whatever backing store they manage themselves.
//! * [`RingBuffer`] - the typed layer, pairing a [`RingIndex`] with a
//!   caller-borrowed storage slice and copying elements by value in and out
//!   of slots.
//!
//! The head and tail cursors increase monotonically and only the *masked*
//! slot wraps, so the full/empty distinction never needs a separate flag:
//! `tail - head` is always the exact number of occupied slots.
//!
//! # Capacity rules
//!
//! Capacity must be a nonzero power of two. This keeps the slot computation
//! a single AND (`position & mask`) and is validated at construction time;
//! see [`Error::ZeroCapacity`] and [`Error::CapacityNotPowerOfTwo`].
//!
//! # Thread safety
//!
//! Neither type performs any internal synchronization. Mutating operations
//! take `&mut self`, so concurrent use across threads requires external
//! synchronization supplied by the caller, matching the usual
//! single-producer/single-consumer arrangement with external fencing.
//!
//! # Examples
//!
//! ```rust
//! use fixed_ring::RingBuffer;
//!
//! let mut storage = [0_u32; 4];
//! let mut ring = RingBuffer::new(&mut storage)?;
//!
//! ring.put(11)?;
//! ring.put(22)?;
//!
//! assert_eq!(ring.available(), 2);
//! assert_eq!(ring.get()?, 11);
//! assert_eq!(ring.get()?, 22);
//! assert!(ring.is_empty());
//! # Ok::<(), fixed_ring::Error>(())
//! ```

mod buffer;
mod error;
mod index;

pub use buffer::RingBuffer;
pub use error::Error;
pub use index::RingIndex;

pub(crate) use error::Result;
