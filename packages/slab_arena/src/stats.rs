/// A point-in-time snapshot of one pool's geometry and counters.
///
/// Counters are cumulative event counts over the pool's lifetime, taken
/// under the pool lock so the three values are mutually consistent.
/// `allocated - released` is the number of blocks outstanding at the moment
/// of the snapshot; see [`outstanding()`](Self::outstanding).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct SlabStats {
    /// Block stride in bytes: the requested block size rounded up to the
    /// pool alignment.
    pub block_size: usize,

    /// Number of blocks in the pool.
    pub block_count: usize,

    /// Allocations served from this pool.
    pub allocated: u64,

    /// Allocations that found the pool exhausted. A rising value means the
    /// size class is undersized for its workload.
    pub missed: u64,

    /// Blocks released back to this pool.
    pub released: u64,
}

impl SlabStats {
    /// The number of blocks outstanding when the snapshot was taken.
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        // Cannot underflow: every release was preceded by an allocation.
        self.allocated.wrapping_sub(self.released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outstanding_is_allocated_minus_released() {
        let stats = SlabStats {
            block_size: 64,
            block_count: 8,
            allocated: 5,
            missed: 2,
            released: 3,
        };

        assert_eq!(stats.outstanding(), 2);
    }
}
