//! Per-state `(element, side) → containers` tables.
//!
//! A [`PropertyTable`] holds one time state. Each `(element, side)` key
//! owns a [`PropertyEntry`]: one optional container per stateful index.
//! The element map sits behind a `RwLock` and each entry behind its own
//! `Mutex`, so workers touching different elements only share the read
//! lock. Inserting a new key takes the write lock briefly.

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use kiln_core::{ElementId, Side, StatefulIndex};

use crate::container::PropertyValues;

/// Containers of one `(element, side)` in one state, indexed by stateful index.
#[derive(Clone, Debug, Default)]
pub struct PropertyEntry {
    slots: Vec<Option<PropertyValues>>,
}

impl PropertyEntry {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Container at `index`, if populated.
    pub fn get(&self, index: StatefulIndex) -> Option<&PropertyValues> {
        self.slots.get(index.index()).and_then(Option::as_ref)
    }

    /// Mutable container at `index`, if populated.
    pub fn get_mut(&mut self, index: StatefulIndex) -> Option<&mut PropertyValues> {
        self.slots.get_mut(index.index()).and_then(Option::as_mut)
    }

    /// The slot at `index`, growing the entry if needed.
    pub fn slot_mut(&mut self, index: StatefulIndex) -> &mut Option<PropertyValues> {
        if index.index() >= self.slots.len() {
            self.slots.resize_with(index.index() + 1, || None);
        }
        &mut self.slots[index.index()]
    }

    /// Store `values` at `index`, returning the previous container.
    pub fn insert(&mut self, index: StatefulIndex, values: PropertyValues) -> Option<PropertyValues> {
        self.slot_mut(index).replace(values)
    }

    /// Remove and return the container at `index`.
    pub fn take(&mut self, index: StatefulIndex) -> Option<PropertyValues> {
        self.slots.get_mut(index.index()).and_then(Option::take)
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Populated slots in stateful-index order.
    pub fn iter(&self) -> impl Iterator<Item = (StatefulIndex, &PropertyValues)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|v| (StatefulIndex(i as u32), v)))
    }
}

/// Side entries of one element.
pub type SideEntries = IndexMap<Side, Mutex<PropertyEntry>>;

/// One time state's storage for every element.
#[derive(Debug, Default)]
pub struct PropertyTable {
    elements: RwLock<IndexMap<ElementId, SideEntries>>,
}

impl PropertyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table pre-sized for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elements: RwLock::new(IndexMap::with_capacity(capacity)),
        }
    }

    /// Run `f` on an existing entry. Returns `None` if the key is absent.
    pub fn with_entry<R>(
        &self,
        element: ElementId,
        side: Side,
        f: impl FnOnce(&mut PropertyEntry) -> R,
    ) -> Option<R> {
        let map = self.elements.read();
        let entry = map.get(&element)?.get(&side)?;
        let mut guard = entry.lock();
        Some(f(&mut *guard))
    }

    /// Run `f` on the entry for `(element, side)`, creating it if absent.
    pub fn with_entry_or_insert<R>(
        &self,
        element: ElementId,
        side: Side,
        f: impl FnOnce(&mut PropertyEntry) -> R,
    ) -> R {
        {
            let map = self.elements.read();
            if let Some(entry) = map.get(&element).and_then(|s| s.get(&side)) {
                return f(&mut *entry.lock());
            }
        }
        let mut map = self.elements.write();
        let entry = map.entry(element).or_default().entry(side).or_default();
        f(entry.get_mut())
    }

    /// Insert or replace an entry. Used when rebuilding a table.
    pub fn insert_entry(&mut self, element: ElementId, side: Side, entry: PropertyEntry) {
        self.elements
            .get_mut()
            .entry(element)
            .or_default()
            .insert(side, Mutex::new(entry));
    }

    /// Drop every side of `element`. Returns `true` if anything was removed.
    pub fn remove_element(&self, element: ElementId) -> bool {
        self.elements.write().swap_remove(&element).is_some()
    }

    /// Drop the entry for `(element, side)` if it holds no containers.
    pub fn prune(&self, element: ElementId, side: Side) -> bool {
        let mut map = self.elements.write();
        let Some(sides) = map.get_mut(&element) else {
            return false;
        };
        let empty = sides.get_mut(&side).is_some_and(|e| e.get_mut().is_empty());
        if empty {
            sides.swap_remove(&side);
            if sides.is_empty() {
                map.swap_remove(&element);
            }
        }
        empty
    }

    /// Keep only elements for which `keep` returns `true`. Returns the
    /// number of elements removed.
    pub fn retain_elements(&self, mut keep: impl FnMut(ElementId) -> bool) -> usize {
        let mut map = self.elements.write();
        let before = map.len();
        map.retain(|&element, _| keep(element));
        before - map.len()
    }

    /// Whether an entry exists for `(element, side)`.
    pub fn contains(&self, element: ElementId, side: Side) -> bool {
        self.elements
            .read()
            .get(&element)
            .is_some_and(|s| s.contains_key(&side))
    }

    /// Whether any side of `element` has an entry.
    pub fn contains_element(&self, element: ElementId) -> bool {
        self.elements.read().contains_key(&element)
    }

    /// Number of `(element, side)` entries.
    pub fn len(&self) -> usize {
        self.elements.read().values().map(IndexMap::len).sum()
    }

    /// Returns `true` if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    /// Number of distinct elements.
    pub fn element_count(&self) -> usize {
        self.elements.read().len()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.elements.get_mut().clear();
    }

    /// Shared read access for whole-table traversals (checkpointing,
    /// digests). Holds the table's read lock until dropped.
    pub fn read(&self) -> TableView<'_> {
        TableView {
            map: self.elements.read(),
        }
    }
}

/// Read-locked view of a [`PropertyTable`].
pub struct TableView<'a> {
    map: RwLockReadGuard<'a, IndexMap<ElementId, SideEntries>>,
}

impl TableView<'_> {
    /// Number of distinct elements.
    pub fn element_count(&self) -> usize {
        self.map.len()
    }

    /// Elements and their side entries, in table order.
    pub fn iter(&self) -> impl Iterator<Item = (ElementId, &SideEntries)> {
        self.map.iter().map(|(&e, s)| (e, s))
    }

    /// Entry for `(element, side)`.
    pub fn get(&self, element: ElementId, side: Side) -> Option<&Mutex<PropertyEntry>> {
        self.map.get(&element)?.get(&side)
    }
}
