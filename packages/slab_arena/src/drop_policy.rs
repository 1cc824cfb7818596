/// Determines how a [`Slab`] treats outstanding blocks when it is dropped.
///
/// Dropping a pool reclaims its backing memory (when the pool owns it), so
/// any block still allocated at that moment dangles. The default tolerates
/// this - pointer validity is already the caller's unsafe contract - but a
/// strict policy turns it into a panic for callers who want the invariant
/// enforced.
///
/// Note that [`Slab::try_destroy()`] is the graceful alternative: it
/// refuses to tear down a non-empty pool and hands it back instead.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use slab_arena::{DropPolicy, Slab};
///
/// let slab = Slab::builder(nz!(64), nz!(4))
///     .drop_policy(DropPolicy::MustNotDropBlocks)
///     .build()?;
/// # Ok::<(), slab_arena::Error>(())
/// ```
///
/// [`Slab`]: crate::Slab
/// [`Slab::try_destroy()`]: crate::Slab::try_destroy
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The pool may be dropped with blocks still allocated; its memory is
    /// reclaimed regardless. This is the default.
    #[default]
    MayDropBlocks,

    /// The pool panics if any block is still allocated when it is dropped.
    ///
    /// Valuable when out-of-band pointers into the pool are known to exist
    /// and every one of them must be released before teardown.
    MustNotDropBlocks,
}
