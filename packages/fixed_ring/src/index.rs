use crate::{Error, Result};

/// Head/tail/mask bookkeeping for a power-of-two circular sequence of slots.
///
/// The index tracks *logical* positions: `head` and `tail` increase
/// monotonically (with wrapping arithmetic) and are never reset. Only the
/// physical slot - `position & mask` - wraps around, which makes the
/// full/empty distinction unambiguous without a separate flag: the occupied
/// slot count is always exactly `tail - head`.
///
/// The index owns no storage. [`put()`](Self::put) and
/// [`get()`](Self::get) return physical slot indexes in `0..capacity` that
/// the caller applies to a backing store of their own; [`RingBuffer`]
/// packages that pattern for the common case.
///
/// # Examples
///
/// ```rust
/// use fixed_ring::RingIndex;
///
/// let mut index = RingIndex::new(4)?;
///
/// let slot = index.put()?;
/// assert_eq!(slot, 0);
/// assert_eq!(index.available(), 1);
///
/// assert_eq!(index.peek()?, 0);
/// assert_eq!(index.get()?, 0);
/// assert!(index.is_empty());
/// # Ok::<(), fixed_ring::Error>(())
/// ```
///
/// [`RingBuffer`]: crate::RingBuffer
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RingIndex {
    /// Logical position of the oldest occupied slot. Monotonic; wraps only
    /// in the integer sense, never reset.
    head: usize,

    /// Logical position one past the newest occupied slot. Monotonic.
    tail: usize,

    /// `capacity - 1`. Capacity is a power of two, so this is an all-ones
    /// bit pattern usable for slot masking.
    mask: usize,
}

impl RingIndex {
    /// Creates an index for `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero and
    /// [`Error::CapacityNotPowerOfTwo`] if it is not a power of two.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fixed_ring::{Error, RingIndex};
    ///
    /// assert!(RingIndex::new(8).is_ok());
    /// assert_eq!(RingIndex::new(0), Err(Error::ZeroCapacity));
    /// assert_eq!(
    ///     RingIndex::new(12),
    ///     Err(Error::CapacityNotPowerOfTwo { capacity: 12 })
    /// );
    /// ```
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }

        if !capacity.is_power_of_two() {
            return Err(Error::CapacityNotPowerOfTwo { capacity });
        }

        Ok(Self {
            head: 0,
            tail: 0,
            // Cannot underflow: capacity is nonzero.
            mask: capacity.wrapping_sub(1),
        })
    }

    /// The number of occupied slots.
    #[must_use]
    pub fn available(&self) -> usize {
        // Wrapping subtraction stays correct across the (theoretical) integer
        // wrap of the monotonic cursors, because at most `capacity` slots
        // separate them.
        self.tail.wrapping_sub(self.head)
    }

    /// The total number of slots.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Mutating to available() keeps many tests green.
    pub fn capacity(&self) -> usize {
        // Cannot overflow: mask is capacity - 1 for a valid capacity.
        self.mask.wrapping_add(1)
    }

    /// Whether no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tail == self.head
    }

    /// Whether every slot is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available() > self.mask
    }

    /// Claims the next slot for writing and returns its physical index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Full`] when all slots are occupied; the cursors are
    /// left untouched.
    pub fn put(&mut self) -> Result<usize> {
        if self.is_full() {
            return Err(Error::Full);
        }

        let slot = self.tail & self.mask;
        self.tail = self.tail.wrapping_add(1);

        Ok(slot)
    }

    /// Releases the oldest occupied slot and returns its physical index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] when no slot is occupied; the cursors are
    /// left untouched.
    pub fn get(&mut self) -> Result<usize> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        let slot = self.head & self.mask;
        self.head = self.head.wrapping_add(1);

        Ok(slot)
    }

    /// Returns the physical index of the oldest occupied slot without
    /// releasing it. Repeated calls return the same slot until a
    /// [`get()`](Self::get) advances past it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Empty`] when no slot is occupied.
    pub fn peek(&self) -> Result<usize> {
        if self.is_empty() {
            return Err(Error::Empty);
        }

        Ok(self.head & self.mask)
    }
}
