use crate::{
    error::OOMError, key::load_key, okra_inner::OkraInner, stats::NodeStats, Allocator,
    DefaultAllocator,
};

/// An index over 64-bit tuple ids, keyed by their big-endian byte encoding.
///
/// Ids carry 63 significant bits; they are stored directly in the child
/// words of the tree, so a lookup hit costs no pointer chase at the leaf.
/// Behavior for ids with the most significant bit set is unspecified.
///
/// ```
/// use okra::Okra;
///
/// let mut tree = Okra::new();
/// for id in [1u64, 2, 3] {
///     tree.insert(id).unwrap();
/// }
/// assert_eq!(tree.get(2), Some(2));
/// assert_eq!(tree.get(4), None);
/// ```
///
/// Dense datasets are better built in one shot:
///
/// ```
/// use okra::Okra;
///
/// let ids: Vec<u64> = (0..10_000).collect();
/// let tree = Okra::bulk_load(&ids).unwrap();
/// assert_eq!(tree.value_count(), 10_000);
/// ```
pub struct Okra<A: Allocator = DefaultAllocator> {
    inner: OkraInner<A>,
}

impl Okra<DefaultAllocator> {
    pub fn new() -> Self {
        Self::new_with_allocator(DefaultAllocator {})
    }

    /// Builds a fresh tree over `values` through the learned bulk loader.
    /// Duplicates collapse to a single entry.
    pub fn bulk_load(values: &[u64]) -> Result<Self, OOMError> {
        Self::bulk_load_with_allocator(values, DefaultAllocator {})
    }
}

impl Default for Okra<DefaultAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Allocator> Okra<A> {
    pub fn new_with_allocator(allocator: A) -> Self {
        Self {
            inner: OkraInner::new(allocator),
        }
    }

    pub fn bulk_load_with_allocator(values: &[u64], allocator: A) -> Result<Self, OOMError> {
        let mut tree = Self::new_with_allocator(allocator);
        tree.inner.bulk_load(values)?;
        Ok(tree)
    }

    /// Inserts `value`, returning the previous entry under the same key if
    /// one existed.
    ///
    /// ```
    /// use okra::Okra;
    ///
    /// let mut tree = Okra::new();
    /// assert_eq!(tree.insert(7).unwrap(), None);
    /// assert_eq!(tree.insert(7).unwrap(), Some(7));
    /// ```
    pub fn insert(&mut self, value: u64) -> Result<Option<u64>, OOMError> {
        let key = load_key(value as usize);
        let old = self.inner.insert(&key, value as usize)?;
        Ok(old.map(|v| v as u64))
    }

    /// Looks `value` up along the optimistic path: compressed paths beyond
    /// the inline budget are skipped during the descent and settled with a
    /// single comparison at the leaf.
    pub fn get(&self, value: u64) -> Option<u64> {
        let key = load_key(value as usize);
        self.inner.get(&key).map(|v| v as u64)
    }

    /// Looks `value` up along the pessimistic path, verifying every prefix
    /// byte during the descent. Equivalent to [`Okra::get`], just never
    /// defers prefix checks.
    pub fn get_verified(&self, value: u64) -> Option<u64> {
        let key = load_key(value as usize);
        self.inner.get_verified(&key).map(|v| v as u64)
    }

    /// Removes `value`, returning it if it was present.
    ///
    /// ```
    /// use okra::Okra;
    ///
    /// let mut tree = Okra::new();
    /// tree.insert(7).unwrap();
    /// assert_eq!(tree.remove(7), Some(7));
    /// assert_eq!(tree.remove(7), None);
    /// ```
    pub fn remove(&mut self, value: u64) -> Option<u64> {
        let key = load_key(value as usize);
        self.inner.remove(&key).map(|v| v as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of stored entries. Walks the tree.
    pub fn value_count(&self) -> usize {
        self.inner.value_count()
    }

    /// All stored ids in ascending order.
    pub fn keys(&self) -> Vec<u64> {
        self.inner.payloads().into_iter().map(|v| v as u64).collect()
    }

    /// Per-level node statistics, mostly useful to eyeball how a workload
    /// shaped the tree.
    pub fn stats(&self) -> NodeStats {
        self.inner.stats()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &OkraInner<A> {
        &self.inner
    }
}
