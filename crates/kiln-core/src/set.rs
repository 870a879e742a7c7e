//! [`PropertySet`]: a compact set of property ids.

use crate::id::PropertyId;

/// A set of property ids backed by a growable bitset.
///
/// Stores use it to track which properties are stateful and which were
/// restored from a checkpoint. Ids are dense, so one bit per registered
/// property keeps membership checks branch-free on the hot path.
#[derive(Clone, Debug, Default)]
pub struct PropertySet {
    words: Vec<u64>,
}

impl PropertySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn locate(id: PropertyId) -> (usize, u64) {
        (id.index() / 64, 1u64 << (id.index() % 64))
    }

    /// Add `id`. Returns `true` if it was not already present.
    pub fn insert(&mut self, id: PropertyId) -> bool {
        let (word, mask) = Self::locate(id);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Remove `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: PropertyId) -> bool {
        let (word, mask) = Self::locate(id);
        match self.words.get_mut(word) {
            Some(w) if *w & mask != 0 => {
                *w &= !mask;
                true
            }
            _ => false,
        }
    }

    /// Membership test.
    pub fn contains(&self, id: PropertyId) -> bool {
        let (word, mask) = Self::locate(id);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Add every id of `other` to `self`.
    pub fn extend_from(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    /// Ids in `self` but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0))
            .collect();
        Self { words }
    }

    /// Whether every id of `self` is also in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Returns `true` if the set holds no ids.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of ids in the set.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Remove every id.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64u32)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| PropertyId(i as u32 * 64 + bit))
        })
    }
}

impl PartialEq for PropertySet {
    fn eq(&self, other: &Self) -> bool {
        self.is_subset(other) && other.is_subset(self)
    }
}

impl Eq for PropertySet {}

impl FromIterator<PropertyId> for PropertySet {
    fn from_iter<I: IntoIterator<Item = PropertyId>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}
