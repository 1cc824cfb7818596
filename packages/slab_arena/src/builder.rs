use std::mem::MaybeUninit;
use std::num::NonZero;

use crate::{DropPolicy, Result, Slab};

/// Builder for creating an instance of [`Slab`].
///
/// Block size and block count are mandatory and supplied to
/// [`Slab::builder()`]; everything else is optional:
///
/// * [`alignment()`](Self::alignment) - block alignment (power of two).
///   Block size is rounded up to it, so every block starts on an aligned
///   address.
/// * [`buffer()`](Self::buffer) - caller-owned backing memory the pool
///   borrows for its whole lifetime. Without it, the pool acquires and owns
///   its memory from the host allocator.
/// * [`drop_policy()`](Self::drop_policy) - how to treat outstanding blocks
///   at drop time.
///
/// # Examples
///
/// Self-owned pool memory with 64-byte-aligned blocks:
///
/// ```
/// use new_zealand::nz;
/// use slab_arena::Slab;
///
/// let slab = Slab::builder(nz!(48), nz!(16)).alignment(nz!(64)).build()?;
///
/// // 48 rounds up to the 64-byte stride.
/// assert_eq!(slab.block_size(), 64);
/// # Ok::<(), slab_arena::Error>(())
/// ```
///
/// Borrowed backing memory:
///
/// ```
/// use std::mem::MaybeUninit;
///
/// use new_zealand::nz;
/// use slab_arena::Slab;
///
/// let mut backing = [MaybeUninit::<u8>::uninit(); 1024];
/// let slab = Slab::builder(nz!(128), nz!(8)).buffer(&mut backing).build()?;
///
/// let block = slab.allocate().expect("fresh pool has free blocks");
/// slab.release(block)?;
/// # Ok::<(), slab_arena::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct SlabBuilder<'buf> {
    block_size: NonZero<usize>,
    block_count: NonZero<usize>,
    alignment: Option<NonZero<usize>>,
    buffer: Option<&'buf mut [MaybeUninit<u8>]>,
    drop_policy: DropPolicy,
}

impl<'buf> SlabBuilder<'buf> {
    pub(crate) fn new(block_size: NonZero<usize>, block_count: NonZero<usize>) -> Self {
        Self {
            block_size,
            block_count,
            alignment: None,
            buffer: None,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Sets the block alignment. Must be a power of two, which is validated
    /// at [`build()`](Self::build) time.
    ///
    /// The block size is rounded up to a multiple of the alignment and the
    /// pool base address is aligned to it, so every block starts on an
    /// aligned address.
    #[inline]
    pub fn alignment(mut self, alignment: NonZero<usize>) -> Self {
        self.alignment = Some(alignment);
        self
    }

    /// Supplies caller-owned backing memory for the pool to borrow.
    ///
    /// Ownership stays with the caller; the pool only carves blocks out of
    /// the buffer and never frees it. The buffer must be large enough for
    /// the block geometry plus any alignment slack, which is validated at
    /// [`build()`](Self::build) time.
    #[inline]
    pub fn buffer(mut self, buffer: &'buf mut [MaybeUninit<u8>]) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to
    /// treat blocks still allocated when the pool is dropped.
    #[inline]
    pub fn drop_policy(mut self, drop_policy: DropPolicy) -> Self {
        self.drop_policy = drop_policy;
        self
    }

    /// Builds the [`Slab`].
    ///
    /// # Errors
    ///
    /// * [`Error::AlignmentNotPowerOfTwo`] - the requested alignment cannot
    ///   be satisfied by any address.
    /// * [`Error::BufferTooSmall`] - the borrowed buffer cannot hold the
    ///   block geometry.
    /// * [`Error::HostAllocationFailed`] - the host allocator declined to
    ///   provide self-owned pool memory.
    ///
    /// [`Error::AlignmentNotPowerOfTwo`]: crate::Error::AlignmentNotPowerOfTwo
    /// [`Error::BufferTooSmall`]: crate::Error::BufferTooSmall
    /// [`Error::HostAllocationFailed`]: crate::Error::HostAllocationFailed
    pub fn build(self) -> Result<Slab<'buf>> {
        Slab::from_builder(
            self.block_size,
            self.block_count,
            self.alignment,
            self.buffer,
            self.drop_policy,
        )
    }
}
