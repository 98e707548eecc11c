//! Dense bit set keyed by arena index.
//!
//! Graph traversals, reachability sweeps and the linearizer's placement pass all need a
//! "have I seen block N" set over a small, dense id space. [`BitSet`] stores 64 ids per
//! word and grows on demand, so callers can size it from
//! [`GraphBase::node_bound`](crate::utils::graph::GraphBase::node_bound) and still insert
//! ids of blocks created mid-pass.
//!
//! ```rust
//! use irflow::utils::BitSet;
//!
//! let mut seen = BitSet::new(8);
//! seen.insert(3);
//! seen.insert(70);
//!
//! assert!(seen.contains(3));
//! assert!(seen.contains(70));
//! assert!(!seen.contains(4));
//! assert_eq!(seen.iter().collect::<Vec<_>>(), vec![3, 70]);
//! ```

/// A growable set of small integers.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Creates an empty set with room for `capacity` ids before it has to grow.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns `true` if no id is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds `index`. Returns `true` if it was not present before.
    pub fn insert(&mut self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Removes `index`. Returns `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        match self.words.get_mut(word) {
            Some(bits) if *bits & mask != 0 => {
                *bits &= !mask;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if `index` is in the set. Ids beyond the current capacity are
    /// simply absent.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        self.words.get(word).is_some_and(|bits| bits & mask != 0)
    }

    /// Returns the number of ids in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every id.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Iterates over the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut rest = word;
                std::iter::from_fn(move || {
                    if rest == 0 {
                        return None;
                    }
                    let bit = rest.trailing_zeros() as usize;
                    rest &= rest - 1;
                    Some(word_idx * 64 + bit)
                })
            })
    }

    fn locate(index: usize) -> (usize, u64) {
        (index / 64, 1u64 << (index % 64))
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_insert_reports_freshness() {
        let mut set = BitSet::new(16);
        assert!(set.is_empty());
        assert!(set.insert(5));
        assert!(!set.insert(5));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn test_bitset_grows_past_capacity() {
        let mut set = BitSet::new(1);
        set.insert(200);
        assert!(set.contains(200));
        assert!(!set.contains(199));
        assert!(!set.contains(10_000));
    }

    #[test]
    fn test_bitset_remove_and_clear() {
        let mut set = BitSet::new(128);
        set.insert(1);
        set.insert(64);
        assert!(set.remove(64));
        assert!(!set.remove(64));
        assert!(!set.remove(9999));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1]);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_bitset_iteration_order() {
        let mut set = BitSet::new(0);
        for idx in [130, 0, 63, 64] {
            set.insert(idx);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 63, 64, 130]);
        assert_eq!(format!("{set:?}"), "{0, 63, 64, 130}");
    }
}
