use thiserror::Error;

/// Errors reported by the slab and arena primitives.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The requested alignment is not a power of two, so no address can
    /// satisfy it.
    #[error("alignment {alignment} is not a power of two")]
    AlignmentNotPowerOfTwo {
        /// The alignment that was requested.
        alignment: usize,
    },

    /// The caller-supplied buffer cannot hold the requested block geometry
    /// once the base address is aligned.
    #[error("buffer of {provided} bytes cannot hold the {required} bytes the block geometry needs")]
    BufferTooSmall {
        /// The buffer length the caller supplied.
        provided: usize,

        /// The length the geometry requires, including alignment slack.
        required: usize,
    },

    /// The host allocator could not provide backing memory for the pool.
    #[error("host allocator failed to provide {size} bytes of pool memory")]
    HostAllocationFailed {
        /// The pool size that was requested.
        size: usize,
    },

    /// The pointer does not lie inside any block range this pool or arena
    /// manages. Nothing was released and no counter moved.
    #[error("pointer {address:#x} does not belong to this pool")]
    OutOfRange {
        /// The address of the foreign pointer.
        address: usize,
    },

    /// An arena needs at least one size class to dispatch to.
    #[error("size class table is empty")]
    NoClasses,

    /// The size class table must be ascending by block size; entry `index`
    /// is smaller than its predecessor.
    #[error("size class {index} is smaller than its predecessor - table must be ascending")]
    UnsortedClasses {
        /// Index of the first entry that breaks the ascending order.
        index: usize,
    },
}

/// A specialized `Result` type for slab and arena operations, defaulting to
/// the crate's [`Error`] type as the error value.
pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn out_of_range_displays_the_address_in_hex() {
        let error = Error::OutOfRange { address: 0xDEAD };
        assert!(error.to_string().contains("0xdead"));
    }
}
