use std::alloc::{Layout, alloc, dealloc};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::thread;

use crate::bitmap::Bitmap;
use crate::{DropPolicy, ERR_POISONED_LOCK, Error, Result, SlabBuilder, SlabStats};

/// A pool of fixed-size, fixed-alignment memory blocks tracked by a
/// free/used bitmap.
///
/// Backing memory is either borrowed from the caller (see
/// [`SlabBuilder::buffer()`]) or acquired from the host allocator and owned
/// by the pool. Either way the pool hands out raw blocks: uninitialized
/// byte ranges of [`block_size()`](Self::block_size) bytes that stay valid
/// until released or until the pool is dropped.
///
/// # Allocation policy
///
/// [`allocate()`](Self::allocate) always returns the lowest-indexed free
/// block, not the most recently released one. This makes allocation
/// patterns deterministic and reproducible, which the arena's statistics
/// tuning workflow depends on.
///
/// # Out of band access
///
/// The pool never creates references to block memory - it only does address
/// arithmetic - so callers are free to access blocks through raw pointers
/// from any thread, subject to their own synchronization.
///
/// # Thread safety
///
/// All bookkeeping is behind a blocking mutex; shared references can
/// allocate and release concurrently. Lock acquisition may block
/// indefinitely.
///
/// # Examples
///
/// ```rust
/// use new_zealand::nz;
/// use slab_arena::Slab;
///
/// let slab = Slab::new(nz!(128), nz!(4))?;
///
/// let block = slab.allocate().expect("fresh pool has free blocks");
///
/// // The block is `block_size` bytes of uninitialized memory.
/// // SAFETY: the block is valid for writes of block_size bytes until released.
/// unsafe { block.as_ptr().write_bytes(0, slab.block_size()) };
///
/// slab.release(block)?;
/// slab.try_destroy().expect("all blocks were released");
/// # Ok::<(), slab_arena::Error>(())
/// ```
#[derive(Debug)]
pub struct Slab<'buf> {
    /// Aligned base address blocks are carved from.
    base: NonNull<u8>,

    /// Stride between consecutive blocks: the requested block size rounded
    /// up to the pool alignment.
    block_size: usize,

    /// Number of blocks in the pool.
    block_count: usize,

    /// The backing allocation, present when the pool owns its memory and
    /// absent when it borrows a caller buffer.
    owned: Option<OwnedPool>,

    /// How to treat outstanding blocks when the pool is dropped.
    drop_policy: DropPolicy,

    /// Free/used bitmap and counters; everything the allocation paths
    /// mutate lives behind this blocking lock.
    state: Mutex<SlabState>,

    /// Ties a borrowed pool to the caller buffer it carves blocks from.
    _buffer: PhantomData<&'buf mut [MaybeUninit<u8>]>,
}

/// The host allocation backing a self-owned pool.
#[derive(Debug)]
struct OwnedPool {
    base: NonNull<u8>,
    layout: Layout,
}

/// Mutable pool state guarded by the pool lock.
#[derive(Debug)]
struct SlabState {
    /// One bit per block; set means allocated.
    bitmap: Bitmap,

    allocated: u64,
    missed: u64,
    released: u64,
}

impl Slab<'static> {
    /// Creates a pool of `block_count` blocks of `block_size` bytes backed
    /// by self-owned memory from the host allocator, with no particular
    /// alignment.
    ///
    /// Use [`builder()`](Self::builder) to configure alignment, a borrowed
    /// backing buffer, or the drop policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HostAllocationFailed`] if the host allocator cannot
    /// provide the pool memory.
    pub fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Result<Self> {
        Self::builder(block_size, block_count).build()
    }
}

impl<'buf> Slab<'buf> {
    /// Starts building a [`Slab`] with the mandatory block geometry.
    pub fn builder(block_size: NonZero<usize>, block_count: NonZero<usize>) -> SlabBuilder<'buf> {
        SlabBuilder::new(block_size, block_count)
    }

    pub(crate) fn from_builder(
        block_size: NonZero<usize>,
        block_count: NonZero<usize>,
        alignment: Option<NonZero<usize>>,
        buffer: Option<&'buf mut [MaybeUninit<u8>]>,
        drop_policy: DropPolicy,
    ) -> Result<Self> {
        if let Some(alignment) = alignment {
            if !alignment.get().is_power_of_two() {
                return Err(Error::AlignmentNotPowerOfTwo {
                    alignment: alignment.get(),
                });
            }
        }

        let align = alignment.map_or(1, NonZero::get);

        // Round the block size up so consecutive blocks stay aligned.
        let stride = block_size
            .get()
            .checked_next_multiple_of(align)
            .expect("aligned block size cannot overflow for a satisfiable geometry");

        let pool_size = stride
            .checked_mul(block_count.get())
            .expect("pool size cannot overflow for a satisfiable geometry");

        let (base, owned) = match buffer {
            Some(buffer) => {
                let start = buffer.as_mut_ptr().cast::<u8>();

                // Bytes to skip so the first block starts aligned.
                let slack = start.addr().wrapping_neg() & align.wrapping_sub(1);

                let required = pool_size
                    .checked_add(slack)
                    .expect("pool size plus alignment slack cannot overflow");

                if buffer.len() < required {
                    return Err(Error::BufferTooSmall {
                        provided: buffer.len(),
                        required,
                    });
                }

                // SAFETY: slack < required <= buffer.len(), so the offset
                // stays inside the caller's buffer.
                let base = unsafe { start.add(slack) };

                (
                    NonNull::new(base).expect("a pointer into a live buffer is never null"),
                    None,
                )
            }
            None => {
                let layout = Layout::from_size_align(pool_size, align)
                    .expect("pool layout is valid for a satisfiable geometry");

                // SAFETY: pool_size is nonzero because both the block size
                // and the block count are nonzero.
                let ptr = unsafe { alloc(layout) };

                let base =
                    NonNull::new(ptr).ok_or(Error::HostAllocationFailed { size: pool_size })?;

                (base, Some(OwnedPool { base, layout }))
            }
        };

        Ok(Self {
            base,
            block_size: stride,
            block_count: block_count.get(),
            owned,
            drop_policy,
            state: Mutex::new(SlabState {
                bitmap: Bitmap::new(block_count.get()),
                allocated: 0,
                missed: 0,
                released: 0,
            }),
            _buffer: PhantomData,
        })
    }

    /// The block stride in bytes: the requested block size rounded up to
    /// the pool alignment. Every pointer returned by
    /// [`allocate()`](Self::allocate) is valid for this many bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The number of blocks in the pool.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Allocates the lowest-indexed free block.
    ///
    /// Returns `None` when every block is allocated - exhaustion is an
    /// expected operating condition, recorded in the
    /// [`missed`](SlabStats::missed) counter, never an error.
    ///
    /// The returned pointer addresses [`block_size()`](Self::block_size)
    /// bytes of uninitialized memory, valid until the block is released or
    /// the pool is dropped. The pool keeps no reference to it.
    #[must_use]
    pub fn allocate(&self) -> Option<NonNull<u8>> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        match state.bitmap.first_clear() {
            Some(index) => {
                state.bitmap.set(index);
                // Event counts cannot meaningfully overflow a u64.
                state.allocated = state.allocated.wrapping_add(1);

                // Cannot overflow: index < block_count keeps the offset
                // inside the pool extent computed at construction.
                let offset = index.wrapping_mul(self.block_size);

                // SAFETY: offset is within the pool allocation, whose extent
                // is block_size * block_count bytes starting at base.
                Some(unsafe { self.base.add(offset) })
            }
            None => {
                state.missed = state.missed.wrapping_add(1);
                None
            }
        }
    }

    /// Releases a block previously returned by
    /// [`allocate()`](Self::allocate).
    ///
    /// An interior pointer resolves to its containing block. Releasing a
    /// block twice is not detected here - the free bit is simply cleared
    /// again; double-release detection belongs to the tracking layer above.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] when `ptr` does not lie inside the
    /// pool's block range; neither the bitmap nor any counter changes.
    pub fn release(&self, ptr: NonNull<u8>) -> Result<()> {
        let address = ptr.addr().get();

        if !self.contains(ptr) {
            return Err(Error::OutOfRange { address });
        }

        let base = self.base.addr().get();

        // Offset within the pool; division resolves interior pointers to
        // their containing block index.
        #[expect(
            clippy::integer_division,
            reason = "truncation toward the block start is exactly the lookup we want"
        )]
        let index = address.wrapping_sub(base) / self.block_size;

        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
        state.bitmap.clear(index);
        state.released = state.released.wrapping_add(1);

        Ok(())
    }

    /// Whether `ptr` lies inside this pool's block range.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        let address = ptr.addr().get();
        let base = self.base.addr().get();

        // Exclusive end of the block range. Cannot overflow: the extent was
        // validated against the allocation at construction.
        let end = base.wrapping_add(self.block_size.wrapping_mul(self.block_count));

        address >= base && address < end
    }

    /// Whether no block is currently allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().expect(ERR_POISONED_LOCK).bitmap.count_set() == 0
    }

    /// Tears the pool down, releasing owned backing memory.
    ///
    /// # Errors
    ///
    /// If any block is still allocated the pool refuses to die and hands
    /// itself back, so the caller can release the outstanding blocks and
    /// retry.
    pub fn try_destroy(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// A consistent snapshot of the pool geometry and counters, taken under
    /// the pool lock.
    #[must_use]
    pub fn stats(&self) -> SlabStats {
        let state = self.state.lock().expect(ERR_POISONED_LOCK);

        SlabStats {
            block_size: self.block_size,
            block_count: self.block_count,
            allocated: state.allocated,
            missed: state.missed,
            released: state.released,
        }
    }
}

impl Drop for Slab<'_> {
    fn drop(&mut self) {
        // A poisoned lock means we are tearing down after a panic; skip the
        // policy check and just reclaim the memory.
        let outstanding = self
            .state
            .lock()
            .map_or(0, |state| state.bitmap.count_set());

        if let Some(owned) = self.owned.take() {
            // SAFETY: allocated in from_builder() with exactly this layout
            // and not yet deallocated.
            unsafe { dealloc(owned.base.as_ptr(), owned.layout) };
        }

        // Memory is reclaimed above before any panic below, and if we are
        // already panicking a second panic would only obscure the first.
        if !thread::panicking()
            && matches!(self.drop_policy, DropPolicy::MustNotDropBlocks)
        {
            assert!(
                outstanding == 0,
                "dropped a non-empty Slab with {outstanding} blocks outstanding - this is forbidden by DropPolicy::MustNotDropBlocks"
            );
        }
    }
}

// SAFETY: The base pointer is used for address arithmetic only; all mutable
// bookkeeping lives behind the pool mutex and the pool never reads or writes
// the block bytes themselves. A borrowed backing buffer is held via an
// exclusive borrow for the pool's whole lifetime.
unsafe impl Send for Slab<'_> {}

// SAFETY: Shared access is fully serialized by the pool mutex; see above.
unsafe impl Sync for Slab<'_> {}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same rigor as production code"
)]
mod tests {
    use new_zealand::nz;

    use super::*;

    // The pool is shared across threads behind its internal mutex.
    static_assertions::assert_impl_all!(Slab<'static>: Send, Sync);

    #[test]
    fn distinct_blocks_until_exhaustion() {
        let slab = Slab::new(nz!(32), nz!(4)).unwrap();

        let mut blocks = Vec::new();
        for _ in 0..4 {
            blocks.push(slab.allocate().unwrap());
        }

        // All pointers are distinct.
        for (i, a) in blocks.iter().enumerate() {
            for b in blocks.iter().skip(i.wrapping_add(1)) {
                assert_ne!(a, b);
            }
        }

        // The fifth allocation misses.
        assert!(slab.allocate().is_none());

        let stats = slab.stats();
        assert_eq!(stats.allocated, 4);
        assert_eq!(stats.missed, 1);
        assert_eq!(stats.released, 0);

        for block in blocks {
            slab.release(block).unwrap();
        }
    }

    #[test]
    fn reallocation_returns_the_lowest_free_index() {
        let slab = Slab::new(nz!(16), nz!(4)).unwrap();

        let blocks: Vec<_> = (0..4).map(|_| slab.allocate().unwrap()).collect();

        // Free block 3 first, then block 1; the next allocation must come
        // from index 1 - lowest free, not most recently released.
        slab.release(blocks[3]).unwrap();
        slab.release(blocks[1]).unwrap();

        assert_eq!(slab.allocate().unwrap(), blocks[1]);
        assert_eq!(slab.allocate().unwrap(), blocks[3]);

        for block in blocks {
            slab.release(block).unwrap();
        }
    }

    #[test]
    fn blocks_are_stride_apart() {
        let slab = Slab::builder(nz!(24), nz!(3)).alignment(nz!(32)).build().unwrap();

        assert_eq!(slab.block_size(), 32);

        let first = slab.allocate().unwrap();
        let second = slab.allocate().unwrap();

        assert_eq!(
            second.addr().get().wrapping_sub(first.addr().get()),
            32
        );
        assert_eq!(first.addr().get() % 32, 0);

        slab.release(first).unwrap();
        slab.release(second).unwrap();
    }

    #[test]
    fn out_of_range_release_changes_nothing() {
        let slab = Slab::new(nz!(64), nz!(2)).unwrap();

        let block = slab.allocate().unwrap();

        let mut foreign = 0_u8;
        let foreign_ptr = NonNull::from(&mut foreign);
        // A stack byte cannot lie inside the pool... unless the allocator is
        // feeling extremely whimsical, in which case the assert below saves us.
        assert!(!slab.contains(foreign_ptr));

        let result = slab.release(foreign_ptr);
        assert!(matches!(result, Err(Error::OutOfRange { .. })));

        let stats = slab.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.released, 0);

        slab.release(block).unwrap();
    }

    #[test]
    fn busy_pool_refuses_to_die() {
        let slab = Slab::new(nz!(8), nz!(2)).unwrap();

        let block = slab.allocate().unwrap();

        let slab = slab.try_destroy().unwrap_err();

        slab.release(block).unwrap();
        slab.try_destroy().unwrap();
    }

    #[test]
    fn borrowed_buffer_hosts_the_blocks() {
        let mut backing = [MaybeUninit::<u8>::uninit(); 256];
        let backing_range = backing.as_ptr().addr()..backing.as_ptr().addr().wrapping_add(256);

        let slab = Slab::builder(nz!(64), nz!(4)).buffer(&mut backing).build().unwrap();

        let block = slab.allocate().unwrap();
        assert!(backing_range.contains(&block.addr().get()));

        slab.release(block).unwrap();
    }

    #[test]
    fn undersized_buffer_is_rejected() {
        let mut backing = [MaybeUninit::<u8>::uninit(); 100];

        let result = Slab::builder(nz!(64), nz!(4)).buffer(&mut backing).build();

        assert!(matches!(
            result,
            Err(Error::BufferTooSmall { provided: 100, .. })
        ));
    }

    #[test]
    fn non_power_of_two_alignment_is_rejected() {
        let result = Slab::builder(nz!(64), nz!(4)).alignment(nz!(24)).build();

        assert!(matches!(
            result,
            Err(Error::AlignmentNotPowerOfTwo { alignment: 24 })
        ));
    }

    #[test]
    fn interior_pointer_releases_its_block() {
        let slab = Slab::new(nz!(64), nz!(2)).unwrap();

        let block = slab.allocate().unwrap();

        // SAFETY: 10 < 64, so the interior pointer stays inside the block.
        let interior = unsafe { block.add(10) };
        slab.release(interior).unwrap();

        // The block is free again, so the lowest-free-index policy hands the
        // same block back.
        assert_eq!(slab.allocate().unwrap(), block);
        slab.release(block).unwrap();
    }

    #[test]
    #[should_panic]
    fn strict_drop_policy_panics_with_outstanding_blocks() {
        let slab = Slab::builder(nz!(16), nz!(2))
            .drop_policy(DropPolicy::MustNotDropBlocks)
            .build()
            .unwrap();

        let _block = slab.allocate().unwrap();

        // Dropping the slab with the block outstanding must panic.
    }

    #[test]
    fn multithreaded_via_shared_reference() {
        use std::sync::Arc;

        let slab = Arc::new(Slab::new(nz!(64), nz!(64)).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let slab = Arc::clone(&slab);
                thread::spawn(move || {
                    for _ in 0..16 {
                        let block = slab.allocate().unwrap();
                        slab.release(block).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(slab.is_empty());
        let stats = slab.stats();
        assert_eq!(stats.allocated, 64);
        assert_eq!(stats.released, 64);
    }
}
