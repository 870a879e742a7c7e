//! Per-worker evaluation scratch.
//!
//! [`ScratchPropertyBuffer`] is where evaluators read and write property
//! values for the element being assembled. The store swaps persistent
//! containers in before evaluation and back out afterwards, so the buffer
//! never owns persistent data beyond one element's pass. The backing
//! containers are reused across elements to avoid repeated allocation.

use std::sync::Arc;

use kiln_core::{ElementId, PropertyId, PropertyType, Side, StatefulIndex, TimeState};

use crate::config::StoreConfig;
use crate::container::PropertyValues;

/// One container the store exchanges during a swap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapSlot {
    /// Time state of the persistent table.
    pub state: TimeState,
    /// Position in the persistent entry.
    pub index: StatefulIndex,
    /// Position in the scratch buffer.
    pub id: PropertyId,
    /// Declared type; decides the scratch representation.
    pub ty: PropertyType,
}

/// Memoized swap layout, keyed by the store's layout version.
///
/// The store bumps its version whenever a property becomes stateful or
/// deepens its history; a cache built for an older version is rebuilt on
/// next use.
#[derive(Debug, Default)]
pub struct LayoutCache {
    version: Option<u64>,
    slots: Arc<[SwapSlot]>,
}

impl LayoutCache {
    /// The cached layout for `version`, rebuilding it with `build` if stale.
    pub fn get_or_refresh(
        &mut self,
        version: u64,
        build: impl FnOnce() -> Vec<SwapSlot>,
    ) -> Arc<[SwapSlot]> {
        if self.version != Some(version) {
            self.slots = build().into();
            self.version = Some(version);
        }
        Arc::clone(&self.slots)
    }

    /// Force a rebuild on next use.
    pub fn invalidate(&mut self) {
        self.version = None;
    }

    /// Version the cached layout was built for.
    pub fn version(&self) -> Option<u64> {
        self.version
    }
}

/// Per-worker property values for one element at a time.
#[derive(Debug)]
pub struct ScratchPropertyBuffer {
    /// Containers per state, indexed by property id.
    states: [Vec<Option<PropertyValues>>; 3],
    n_qpoints: usize,
    /// The `(element, side)` whose persistent storage is swapped in.
    swapped: Option<(ElementId, Side)>,
    layout: LayoutCache,
}

impl ScratchPropertyBuffer {
    /// Create a buffer sized for `n_qpoints` quadrature points.
    pub fn new(n_qpoints: usize) -> Self {
        Self {
            states: Default::default(),
            n_qpoints,
            swapped: None,
            layout: LayoutCache::default(),
        }
    }

    /// Create a buffer using [`StoreConfig::scratch_qpoints`].
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.scratch_qpoints)
    }

    /// Current quadrature-point count.
    pub fn n_qpoints(&self) -> usize {
        self.n_qpoints
    }

    /// Set the point count for the next element, resizing held containers.
    ///
    /// Call before swapping in; resizing while swapped would resize the
    /// borrowed persistent storage too.
    pub fn resize(&mut self, n_qpoints: usize) {
        debug_assert!(self.swapped.is_none(), "resize while swapped");
        self.n_qpoints = n_qpoints;
        for values in self.states.iter_mut().flatten().flatten() {
            values.resize(n_qpoints);
        }
    }

    /// Whether persistent storage is currently swapped in.
    pub fn is_swapped(&self) -> bool {
        self.swapped.is_some()
    }

    /// The `(element, side)` currently swapped in, if any.
    pub fn swapped_with(&self) -> Option<(ElementId, Side)> {
        self.swapped
    }

    pub(crate) fn set_swapped(&mut self, key: Option<(ElementId, Side)>) {
        self.swapped = key;
    }

    /// Values of property `id` in `state`.
    pub fn get(&self, state: TimeState, id: PropertyId) -> Option<&PropertyValues> {
        self.states[state.index()]
            .get(id.index())
            .and_then(Option::as_ref)
    }

    /// Mutable values of property `id` in `state`.
    pub fn get_mut(&mut self, state: TimeState, id: PropertyId) -> Option<&mut PropertyValues> {
        self.states[state.index()]
            .get_mut(id.index())
            .and_then(Option::as_mut)
    }

    /// Slot for property `id` in `state`, growing the buffer as needed.
    pub(crate) fn slot_mut(&mut self, state: TimeState, id: PropertyId) -> &mut Option<PropertyValues> {
        let slots = &mut self.states[state.index()];
        if id.index() >= slots.len() {
            slots.resize_with(id.index() + 1, || None);
        }
        &mut slots[id.index()]
    }

    /// Slot for `id` in `state`, created value-initialised as `ty` if empty.
    pub(crate) fn ensure(
        &mut self,
        state: TimeState,
        id: PropertyId,
        ty: PropertyType,
    ) -> &mut PropertyValues {
        let n = self.n_qpoints;
        self.slot_mut(state, id)
            .get_or_insert_with(|| PropertyValues::new(id, ty, n))
    }

    pub(crate) fn layout_mut(&mut self) -> &mut LayoutCache {
        &mut self.layout
    }

    /// Drop every held container.
    pub fn clear(&mut self) {
        debug_assert!(self.swapped.is_none(), "clear while swapped");
        for slots in &mut self.states {
            slots.clear();
        }
        self.layout.invalidate();
    }
}

impl Default for ScratchPropertyBuffer {
    fn default() -> Self {
        Self::new(StoreConfig::DEFAULT_SCRATCH_QPOINTS)
    }
}
