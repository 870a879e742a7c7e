//! Slot+generation allocator for [`ElementId`]s.
//!
//! Meshes that add and remove elements during adaptivity hand out ids
//! from an [`ElementHandles`] table. Retiring an element bumps its slot's
//! generation, so stale ids held anywhere (including store entries that
//! were never erased) are detectable with [`ElementHandles::is_live`].

use crate::id::ElementId;

/// Allocator of generational element ids with slot reuse.
#[derive(Clone, Debug, Default)]
pub struct ElementHandles {
    /// Current generation per slot.
    generations: Vec<u32>,
    /// Whether the slot currently holds a live element.
    live: Vec<bool>,
    free_list: Vec<u32>,
}

impl ElementHandles {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id, reusing a retired slot when one is free.
    pub fn allocate(&mut self) -> ElementId {
        if let Some(slot) = self.free_list.pop() {
            self.live[slot as usize] = true;
            return ElementId::new(slot, self.generations[slot as usize]);
        }
        let slot = self.generations.len() as u32;
        self.generations.push(0);
        self.live.push(true);
        ElementId::new(slot, 0)
    }

    /// Retire a live id. Returns `false` for stale or unknown ids, so a
    /// double retire is a no-op.
    ///
    /// A slot whose generation would wrap back to zero is never reused.
    pub fn retire(&mut self, id: ElementId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        let slot = id.slot() as usize;
        self.live[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        if self.generations[slot] != 0 {
            self.free_list.push(id.slot());
        }
        true
    }

    /// Whether `id` refers to a live element.
    pub fn is_live(&self, id: ElementId) -> bool {
        let slot = id.slot() as usize;
        self.live.get(slot).copied().unwrap_or(false) && self.generations[slot] == id.generation()
    }

    /// Number of live elements.
    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|&&l| l).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retired_ids_go_stale() {
        let mut handles = ElementHandles::new();
        let a = handles.allocate();
        assert!(handles.is_live(a));
        assert!(handles.retire(a));
        assert!(!handles.is_live(a));
        assert!(!handles.retire(a));
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut handles = ElementHandles::new();
        let a = handles.allocate();
        handles.retire(a);
        let b = handles.allocate();
        assert_eq!(a.slot(), b.slot());
        assert_eq!(b.generation(), a.generation() + 1);
        assert!(handles.is_live(b));
        assert!(!handles.is_live(a));
        assert_eq!(handles.live_count(), 1);
    }

    #[test]
    fn unknown_slot_is_not_live() {
        let handles = ElementHandles::new();
        assert!(!handles.is_live(ElementId::new(12, 0)));
    }

    #[test]
    fn exhausted_generation_retires_slot() {
        let mut handles = ElementHandles::new();
        let a = handles.allocate();
        handles.generations[0] = u32::MAX;
        let stale = ElementId::new(a.slot(), u32::MAX);
        assert!(handles.retire(stale));
        let b = handles.allocate();
        assert_ne!(b.slot(), a.slot());
    }
}
