use thiserror::Error;

/// Errors reported by the ring primitives.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The requested capacity was zero. A ring must have at least one slot.
    #[error("ring capacity must be nonzero")]
    ZeroCapacity,

    /// The requested capacity was not a power of two, so the mask-based slot
    /// arithmetic cannot represent it.
    #[error("ring capacity {capacity} is not a power of two")]
    CapacityNotPowerOfTwo {
        /// The capacity that was requested.
        capacity: usize,
    },

    /// Every slot is occupied; nothing can be put until a `get` drains one.
    #[error("ring is full")]
    Full,

    /// No slot is occupied; nothing can be read until a `put` fills one.
    #[error("ring is empty")]
    Empty,
}

/// A specialized `Result` type for ring operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn display_names_the_offending_capacity() {
        let error = Error::CapacityNotPowerOfTwo { capacity: 12 };
        assert!(error.to_string().contains("12"));
    }
}
