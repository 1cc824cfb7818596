use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::HashMap;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::{ERR_POISONED_LOCK, Error, Result, Slab, SlabStats};

/// Alignment of every arena block and every fallback allocation. Matches the
/// strictest fundamental alignment in common use, so any plain data fits.
const ARENA_ALIGNMENT: usize = 16;

/// One entry of an arena's size-class table: a pool of `block_count` blocks
/// serving requests of up to `block_size` bytes.
///
/// # Examples
///
/// ```rust
/// use new_zealand::nz;
/// use slab_arena::SizeClass;
///
/// let class = SizeClass::new(nz!(64), nz!(512));
/// assert_eq!(class.block_size.get(), 64);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct SizeClass {
    /// Largest request this class serves, in bytes.
    pub block_size: NonZero<usize>,

    /// Number of blocks in this class's pool.
    pub block_count: NonZero<usize>,
}

impl SizeClass {
    /// Creates a size class entry.
    #[must_use]
    pub fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Self {
        Self {
            block_size,
            block_count,
        }
    }
}

/// An ordered collection of [`Slab`] pools keyed by ascending block size,
/// routing each allocation to the smallest adequate pool or to a host
/// allocator when no pool can serve it.
///
/// # Routing policy
///
/// A request is served by the first class whose block size is at least the
/// requested size. When that specific class is exhausted the request does
/// **not** spill to a larger class - it falls straight through to the host
/// allocator, and the class's `missed` counter records the event. Requests
/// larger than every class go to the host directly. Callers cannot tell a
/// pool hit from a fallback hit; [`release()`](Self::release) works
/// identically for both.
///
/// This keeps pool occupancy predictable: a class either serves its own
/// size band or its statistics show it is undersized, which is the signal
/// for tuning the table. See [`stats()`](Self::stats).
///
/// # Host allocator
///
/// The fallback path uses any [`GlobalAlloc`] implementation -
/// [`System`] by default, or whatever [`with_host()`](Self::with_host)
/// received, including an instrumented wrapper that tracks the fallback
/// traffic.
///
/// # Examples
///
/// ```rust
/// use new_zealand::nz;
/// use slab_arena::{Arena, SizeClass};
///
/// let arena = Arena::new(&[
///     SizeClass::new(nz!(32), nz!(1024)),
///     SizeClass::new(nz!(64), nz!(512)),
///     SizeClass::new(nz!(128), nz!(256)),
/// ])?;
///
/// let ptr = arena.allocate(nz!(100)).expect("128-byte class has blocks");
/// arena.release(ptr)?;
/// # Ok::<(), slab_arena::Error>(())
/// ```
#[derive(Debug)]
pub struct Arena<H: GlobalAlloc = System> {
    /// Pools in ascending block-size order, one per size class.
    pools: Box<[Slab<'static>]>,

    /// Layouts of live fallback allocations, keyed by address. The host
    /// needs its layout back at release time, and knowing exactly which
    /// addresses we own lets a foreign pointer be rejected instead of being
    /// handed blindly to the host.
    fallback: Mutex<HashMap<usize, Layout>>,

    host: H,
}

impl Arena<System> {
    /// Creates an arena dispatching to one pool per size class, with the
    /// system allocator as the fallback host.
    ///
    /// The table must be sorted ascending (non-decreasing) by block size.
    ///
    /// # Errors
    ///
    /// * [`Error::NoClasses`] - the table is empty.
    /// * [`Error::UnsortedClasses`] - names the first entry smaller than
    ///   its predecessor.
    /// * [`Error::HostAllocationFailed`] - a pool could not acquire its
    ///   memory.
    pub fn new(classes: &[SizeClass]) -> Result<Self> {
        Self::with_host(classes, System)
    }
}

impl<H: GlobalAlloc> Arena<H> {
    /// Creates an arena with a caller-supplied fallback host allocator.
    ///
    /// # Errors
    ///
    /// See [`Arena::new()`].
    pub fn with_host(classes: &[SizeClass], host: H) -> Result<Self> {
        if classes.is_empty() {
            return Err(Error::NoClasses);
        }

        for (index, window) in classes.windows(2).enumerate() {
            let [previous, current] = window else {
                // windows(2) always yields two-element windows.
                continue;
            };

            if current.block_size < previous.block_size {
                return Err(Error::UnsortedClasses {
                    // The disordered entry is the second one in the window.
                    index: index.wrapping_add(1),
                });
            }
        }

        let alignment =
            NonZero::new(ARENA_ALIGNMENT).expect("the arena alignment constant is nonzero");

        let pools = classes
            .iter()
            .map(|class| {
                Slab::builder(class.block_size, class.block_count)
                    .alignment(alignment)
                    .build()
            })
            .collect::<Result<Box<[_]>>>()?;

        Ok(Self {
            pools,
            fallback: Mutex::new(HashMap::new()),
            host,
        })
    }

    /// Allocates `size` bytes from the smallest adequate size class, or
    /// from the host allocator when no class fits or the chosen class is
    /// exhausted.
    ///
    /// Returns `None` only when the host allocator itself fails. The
    /// returned pointer addresses at least `size` bytes of uninitialized
    /// memory, aligned to 16, valid until released.
    #[must_use]
    pub fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        for pool in &self.pools {
            if pool.block_size() < size.get() {
                continue;
            }

            match pool.allocate() {
                Some(ptr) => return Some(ptr),
                // The best-fitting class is exhausted; do not spill to a
                // larger class, go straight to the host.
                None => break,
            }
        }

        self.allocate_from_host(size)
    }

    /// Allocates `size` bytes and zero-fills them, from pool and fallback
    /// paths alike.
    #[must_use]
    pub fn allocate_zeroed(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        let ptr = self.allocate(size)?;

        // SAFETY: the pointer addresses at least `size` writable bytes,
        // whether it came from a pool block or the host.
        unsafe { ptr.as_ptr().write_bytes(0, size.get()) };

        Some(ptr)
    }

    /// Releases a pointer previously returned by
    /// [`allocate()`](Self::allocate) or
    /// [`allocate_zeroed()`](Self::allocate_zeroed).
    ///
    /// The first pool whose address range contains the pointer performs the
    /// release; a pointer no pool claims is released through the host
    /// fallback bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for a pointer that belongs to neither
    /// a pool nor the fallback ledger; nothing is released.
    pub fn release(&self, ptr: NonNull<u8>) -> Result<()> {
        for pool in &self.pools {
            if pool.contains(ptr) {
                return pool.release(ptr);
            }
        }

        let address = ptr.addr().get();

        let layout = self
            .fallback
            .lock()
            .expect(ERR_POISONED_LOCK)
            .remove(&address)
            .ok_or(Error::OutOfRange { address })?;

        // SAFETY: the ledger entry proves this exact pointer came from
        // `self.host.alloc` with this layout and was not yet released.
        unsafe { self.host.dealloc(ptr.as_ptr(), layout) };

        Ok(())
    }

    /// Tears down every pool and the fallback ledger.
    ///
    /// # Errors
    ///
    /// If any pool still has outstanding blocks, or any fallback allocation
    /// is still live, the arena refuses to die and hands itself back so the
    /// caller can release the stragglers and retry.
    pub fn try_destroy(self) -> Result<(), Self> {
        let pools_busy = self.pools.iter().any(|pool| !pool.is_empty());
        let fallback_busy = !self.fallback.lock().expect(ERR_POISONED_LOCK).is_empty();

        if pools_busy || fallback_busy {
            return Err(self);
        }

        Ok(())
    }

    /// One statistics snapshot per pool, in ascending class order.
    #[must_use]
    pub fn stats(&self) -> Vec<SlabStats> {
        self.pools.iter().map(Slab::stats).collect()
    }

    fn allocate_from_host(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        // A size too large to round up to the alignment is unservable -
        // report it the same way as host exhaustion.
        let layout = Layout::from_size_align(size.get(), ARENA_ALIGNMENT).ok()?;

        // SAFETY: layout has nonzero size, as GlobalAlloc requires.
        let ptr = NonNull::new(unsafe { self.host.alloc(layout) })?;

        // Exposing the provenance lets Drop reconstruct a valid pointer
        // from the bare address if the allocation is never released.
        self.fallback
            .lock()
            .expect(ERR_POISONED_LOCK)
            .insert(ptr.as_ptr().expose_provenance(), layout);

        Some(ptr)
    }
}

impl<H: GlobalAlloc> Drop for Arena<H> {
    fn drop(&mut self) {
        // Reclaim any fallback allocations still outstanding; the pools
        // reclaim their own memory. Outstanding pointers dangle either way,
        // which is already the caller's unsafe contract.
        let mut fallback = match self.fallback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (address, layout) in fallback.drain() {
            let Some(ptr) = NonNull::new(std::ptr::with_exposed_provenance_mut::<u8>(address))
            else {
                continue;
            };

            // SAFETY: the ledger entry proves this address came from
            // `self.host.alloc` with this layout and was not yet released.
            unsafe { self.host.dealloc(ptr.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    // The arena is shared across threads behind its internal locks.
    static_assertions::assert_impl_all!(Arena<System>: Send, Sync);

    fn two_class_arena() -> Arena<System> {
        Arena::new(&[
            SizeClass::new(nz!(128), nz!(4)),
            SizeClass::new(nz!(256), nz!(4)),
        ])
        .unwrap()
    }

    #[test]
    fn requests_route_to_the_smallest_adequate_class() {
        let arena = two_class_arena();

        let small = arena.allocate(nz!(100)).unwrap();
        let stats = arena.stats();
        assert_eq!(stats[0].allocated, 1);
        assert_eq!(stats[1].allocated, 0);

        let medium = arena.allocate(nz!(200)).unwrap();
        let stats = arena.stats();
        assert_eq!(stats[0].allocated, 1);
        assert_eq!(stats[1].allocated, 1);

        arena.release(small).unwrap();
        arena.release(medium).unwrap();
    }

    #[test]
    fn oversized_requests_fall_back_to_the_host() {
        let arena = two_class_arena();

        let big = arena.allocate(nz!(5000)).unwrap();

        // No pool served it...
        let stats = arena.stats();
        assert_eq!(stats[0].allocated, 0);
        assert_eq!(stats[1].allocated, 0);

        // ...and no pool claims it at release time either.
        arena.release(big).unwrap();
        let stats = arena.stats();
        assert_eq!(stats[0].released, 0);
        assert_eq!(stats[1].released, 0);
    }

    #[test]
    fn exhausted_class_falls_through_without_spilling() {
        let arena = two_class_arena();

        // Drain the 128-byte class completely.
        let blocks: Vec<_> = (0..4).map(|_| arena.allocate(nz!(100)).unwrap()).collect();

        // The next 100-byte request misses the 128 class and must NOT come
        // from the 256 class.
        let overflow = arena.allocate(nz!(100)).unwrap();

        let stats = arena.stats();
        assert_eq!(stats[0].allocated, 4);
        assert_eq!(stats[0].missed, 1);
        assert_eq!(stats[1].allocated, 0);

        arena.release(overflow).unwrap();
        for block in blocks {
            arena.release(block).unwrap();
        }
    }

    #[test]
    fn allocate_zeroed_zero_fills_both_paths() {
        let arena = two_class_arena();

        // Pool path.
        let pooled = arena.allocate_zeroed(nz!(128)).unwrap();
        // SAFETY: the block is valid for 128 readable bytes and was just
        // zero-filled.
        let pooled_bytes =
            unsafe { std::slice::from_raw_parts(pooled.as_ptr(), 128) };
        assert!(pooled_bytes.iter().all(|&byte| byte == 0));

        // Fallback path.
        let hosted = arena.allocate_zeroed(nz!(4096)).unwrap();
        // SAFETY: the allocation is valid for 4096 readable bytes and was
        // just zero-filled.
        let hosted_bytes =
            unsafe { std::slice::from_raw_parts(hosted.as_ptr(), 4096) };
        assert!(hosted_bytes.iter().all(|&byte| byte == 0));

        arena.release(pooled).unwrap();
        arena.release(hosted).unwrap();
    }

    #[test]
    fn foreign_pointer_is_rejected() {
        let arena = two_class_arena();

        let mut local = 0_u8;
        let result = arena.release(NonNull::from(&mut local));

        assert!(matches!(result, Err(Error::OutOfRange { .. })));
    }

    #[test]
    fn unsorted_class_table_names_the_offender() {
        let result = Arena::new(&[
            SizeClass::new(nz!(64), nz!(4)),
            SizeClass::new(nz!(256), nz!(4)),
            SizeClass::new(nz!(128), nz!(4)),
        ]);

        assert!(matches!(result, Err(Error::UnsortedClasses { index: 2 })));
    }

    #[test]
    fn equal_block_sizes_are_allowed() {
        // Non-decreasing, not strictly increasing: two pools of the same
        // class size just extend capacity.
        let arena = Arena::new(&[
            SizeClass::new(nz!(64), nz!(1)),
            SizeClass::new(nz!(64), nz!(1)),
        ])
        .unwrap();

        let first = arena.allocate(nz!(64)).unwrap();
        let second = arena.allocate(nz!(64)).unwrap();

        let stats = arena.stats();
        assert_eq!(stats[0].allocated, 1);
        // The first pool was exhausted, so the request fell through to the
        // host rather than spilling to the twin pool.
        assert_eq!(stats[0].missed, 1);
        assert_eq!(stats[1].allocated, 0);

        arena.release(first).unwrap();
        arena.release(second).unwrap();
    }

    #[test]
    fn empty_class_table_is_rejected() {
        assert!(matches!(Arena::new(&[]), Err(Error::NoClasses)));
    }

    #[test]
    fn busy_arena_refuses_to_die() {
        let arena = two_class_arena();

        let block = arena.allocate(nz!(64)).unwrap();
        let arena = arena.try_destroy().unwrap_err();

        arena.release(block).unwrap();

        // Outstanding fallback allocations also keep the arena alive.
        let hosted = arena.allocate(nz!(9000)).unwrap();
        let arena = arena.try_destroy().unwrap_err();

        arena.release(hosted).unwrap();
        arena.try_destroy().unwrap();
    }

    #[test]
    fn allocation_is_transparent_to_the_caller() {
        let arena = two_class_arena();

        // Fill the 128 class and push one request to the host; the caller
        // sees identical behavior for all five pointers.
        let mut blocks: Vec<_> = (0..5).map(|_| arena.allocate(nz!(128)).unwrap()).collect();

        for block in blocks.drain(..) {
            // SAFETY: every pointer addresses at least 128 writable bytes.
            unsafe { block.as_ptr().write_bytes(0xA5, 128) };
            arena.release(block).unwrap();
        }

        arena.try_destroy().unwrap();
    }
}
