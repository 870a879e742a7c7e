//! The stateful property store.
//!
//! [`StatefulPropertyStore`] owns one [`PropertyTable`] per time state and
//! the registry of declared properties. Evaluation threads share the store
//! by reference: per-element operations (`swap`, `copy`, `prolong`, ...)
//! take `&self` and lock only the entries they touch. Whole-store
//! mutations (`shift`, `release_properties`, checkpoint restore) take
//! `&mut self`, so the borrow checker rules out running them while an
//! element loop is active.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use kiln_core::{
    Declarer, ElementHandles, ElementId, PropertyError, PropertyId, PropertyRegistry,
    PropertySet, PropertyType, Side, StatefulIndex, TimeState,
};

use crate::adaptivity::{CoarseningMap, RefinementMap};
use crate::config::StoreConfig;
use crate::container::PropertyValues;
use crate::context::{EvaluationContext, StatefulDeclarations};
use crate::error::StorageError;
use crate::evaluator::PropertyEvaluator;
use crate::scratch::{ScratchPropertyBuffer, SwapSlot};
use crate::table::{PropertyEntry, PropertyTable};

// ── Records ─────────────────────────────────────────────────────

/// Everything the store knows about one declared property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyRecord {
    /// Shape and representation, fixed at first declaration.
    pub ty: PropertyType,
    /// Deepest history state requested so far.
    pub max_state: TimeState,
    /// First evaluator that declared the property, if any.
    pub declarer: Option<Declarer>,
    /// Position among stateful properties, once the property keeps history.
    pub stateful_index: Option<StatefulIndex>,
    /// Whether values were loaded from a checkpoint.
    pub restored: bool,
}

impl PropertyRecord {
    fn new(ty: PropertyType) -> Self {
        Self {
            ty,
            max_state: TimeState::Current,
            declarer: None,
            stateful_index: None,
            restored: false,
        }
    }
}

#[derive(Debug)]
struct StoreMeta {
    /// Indexed by property id.
    records: Vec<Option<PropertyRecord>>,
    /// Indexed by stateful index.
    stateful: Vec<PropertyId>,
    max_state: TimeState,
    restored: PropertySet,
    restored_declarers: BTreeSet<Declarer>,
    /// Bumped whenever the swap layout changes.
    layout_version: u64,
}

impl StoreMeta {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            stateful: Vec::new(),
            max_state: TimeState::Current,
            restored: PropertySet::new(),
            restored_declarers: BTreeSet::new(),
            layout_version: 0,
        }
    }

    fn record(&self, id: PropertyId) -> Option<&PropertyRecord> {
        self.records.get(id.index()).and_then(Option::as_ref)
    }

    /// Every `(state, stateful property)` pair that has storage, grouped by state.
    fn swap_layout(&self) -> Vec<SwapSlot> {
        let mut slots = Vec::new();
        for state in TimeState::ALL {
            for (i, &id) in self.stateful.iter().enumerate() {
                let Some(record) = self.record(id) else {
                    continue;
                };
                if record.max_state >= state {
                    slots.push(SwapSlot {
                        state,
                        index: StatefulIndex(i as u32),
                        id,
                        ty: record.ty,
                    });
                }
            }
        }
        slots
    }
}

/// Slots of `layout` belonging to `state`.
fn slots_in(layout: &[SwapSlot], state: TimeState) -> impl Iterator<Item = &SwapSlot> {
    layout.iter().filter(move |slot| slot.state == state)
}

/// Representation the scratch buffer uses for `slot`.
fn scratch_type(slot: &SwapSlot) -> PropertyType {
    match slot.state {
        TimeState::Current => slot.ty,
        _ => PropertyType::plain(slot.ty.kind),
    }
}

fn check_point(element: ElementId, point: usize, len: usize) -> Result<(), StorageError> {
    if point < len {
        Ok(())
    } else {
        Err(StorageError::PointOutOfRange {
            element,
            point,
            len,
        })
    }
}

// ── Store ───────────────────────────────────────────────────────

/// Per-element property values across up to three time states.
#[derive(Debug)]
pub struct StatefulPropertyStore {
    registry: Arc<PropertyRegistry>,
    meta: RwLock<StoreMeta>,
    tables: [PropertyTable; 3],
    config: StoreConfig,
}

impl StatefulPropertyStore {
    /// Create an empty store over a shared registry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if `config` fails validation.
    pub fn new(registry: Arc<PropertyRegistry>, config: StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let capacity = config.element_capacity;
        Ok(Self {
            registry,
            meta: RwLock::new(StoreMeta::new()),
            tables: std::array::from_fn(|_| PropertyTable::with_capacity(capacity)),
            config,
        })
    }

    /// Create a store with its own registry and default config.
    pub fn standalone() -> Self {
        let config = StoreConfig::default();
        Self {
            registry: Arc::new(PropertyRegistry::new()),
            meta: RwLock::new(StoreMeta::new()),
            tables: Default::default(),
            config,
        }
    }

    /// The name registry this store resolves ids against.
    pub fn registry(&self) -> &Arc<PropertyRegistry> {
        &self.registry
    }

    /// The configuration the store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The table backing `state`.
    pub fn table(&self, state: TimeState) -> &PropertyTable {
        &self.tables[state.index()]
    }

    // ── Declarations ────────────────────────────────────────────

    /// Declare `name` with type `ty`, keeping `state` levels of history.
    ///
    /// Re-declaring is idempotent. A deeper `state` raises the property's
    /// history depth; the first time a property goes past the current
    /// state it receives the next stateful index. `declarer`, when given,
    /// is recorded unless another declarer was recorded first.
    ///
    /// # Errors
    ///
    /// - [`PropertyError::UnsupportedStateDepth`] if `state` exceeds
    ///   [`MAX_STATE`](kiln_core::MAX_STATE).
    /// - [`PropertyError::TypeMismatch`] if `name` was declared with a
    ///   different type.
    /// - [`PropertyError::EmptyShape`] for a vector or tensor with no
    ///   components.
    pub fn add_property(
        &self,
        name: &str,
        ty: PropertyType,
        state: u32,
        declarer: Option<&Declarer>,
    ) -> Result<PropertyId, StorageError> {
        let state = TimeState::from_depth(state, name)?;
        if ty.kind.components() == Some(0) {
            return Err(PropertyError::EmptyShape {
                property: name.to_string(),
                ty: ty.to_string(),
            }
            .into());
        }
        let id = self.registry.add_or_get_id(name);

        let mut guard = self.meta.write();
        let meta = &mut *guard;
        if id.index() >= meta.records.len() {
            meta.records.resize_with(id.index() + 1, || None);
        }
        let record = meta.records[id.index()].get_or_insert_with(|| PropertyRecord::new(ty));
        if record.ty != ty {
            return Err(PropertyError::TypeMismatch {
                property: name.to_string(),
                declared: record.ty.to_string(),
                requested: ty.to_string(),
            }
            .into());
        }
        if record.declarer.is_none() {
            record.declarer = declarer.cloned();
        }
        if state > record.max_state {
            record.max_state = state;
            if record.stateful_index.is_none() {
                record.stateful_index = Some(StatefulIndex(meta.stateful.len() as u32));
                meta.stateful.push(id);
            }
            meta.max_state = meta.max_state.max(state);
            meta.layout_version += 1;
            debug!(property = name, %state, %id, "raised property history depth");
        }
        Ok(id)
    }

    /// Whether any property keeps history.
    pub fn has_stateful_properties(&self) -> bool {
        !self.meta.read().stateful.is_empty()
    }

    /// Whether any property keeps two levels of history.
    pub fn has_older_properties(&self) -> bool {
        self.meta.read().max_state == TimeState::Older
    }

    /// Deepest state any property keeps.
    pub fn max_state(&self) -> TimeState {
        self.meta.read().max_state
    }

    /// Number of live time states, including the current one.
    pub fn num_states(&self) -> usize {
        self.max_state().index() + 1
    }

    /// Stateful properties in stateful-index order.
    pub fn stateful_prop_ids(&self) -> Vec<PropertyId> {
        self.meta.read().stateful.clone()
    }

    /// Stateful index of property `id`, if it keeps history.
    pub fn stateful_index_of(&self, id: PropertyId) -> Option<StatefulIndex> {
        self.meta.read().record(id)?.stateful_index
    }

    /// Whether `name` is a declared property that keeps history.
    pub fn is_stateful_prop(&self, name: &str) -> bool {
        self.registry
            .query_id(name)
            .is_some_and(|id| self.stateful_index_of(id).is_some())
    }

    /// Name of the property at stateful index `index`.
    pub fn query_stateful_prop_name(&self, index: StatefulIndex) -> Option<Arc<str>> {
        let id = *self.meta.read().stateful.get(index.index())?;
        self.registry.get_name(id).ok()
    }

    /// A snapshot of what the store knows about property `id`.
    pub fn prop_record(&self, id: PropertyId) -> Option<PropertyRecord> {
        self.meta.read().record(id).cloned()
    }

    /// Version of the swap layout; changes whenever stateful storage does.
    pub fn layout_version(&self) -> u64 {
        self.meta.read().layout_version
    }

    // ── Restart state ───────────────────────────────────────────

    /// Whether any property was restored from a checkpoint.
    pub fn has_restored_properties(&self) -> bool {
        !self.meta.read().restored.is_empty()
    }

    /// Whether `name` was restored from a checkpoint.
    pub fn is_restored_property(&self, name: &str) -> bool {
        self.registry
            .query_id(name)
            .is_some_and(|id| self.meta.read().restored.contains(id))
    }

    /// Declarers with at least one restored property, in sorted order.
    /// Their initializers are skipped by [`init_stateful_props`](Self::init_stateful_props).
    pub fn restored_declarers(&self) -> Vec<Declarer> {
        self.meta.read().restored_declarers.iter().cloned().collect()
    }

    fn is_restored_declarer(&self, declarer: &Declarer) -> bool {
        self.meta.read().restored_declarers.contains(declarer)
    }

    /// Mark `id` as restored. Its declarer, if known, skips stateful init.
    pub fn mark_restored(&mut self, id: PropertyId) {
        let meta = self.meta.get_mut();
        let Some(record) = meta.records.get_mut(id.index()).and_then(Option::as_mut) else {
            return;
        };
        record.restored = true;
        if let Some(declarer) = &record.declarer {
            meta.restored_declarers.insert(declarer.clone());
        }
        meta.restored.insert(id);
    }

    /// Replace the entry for `(element, side)` in `state`.
    pub fn restore_entry(
        &mut self,
        state: TimeState,
        element: ElementId,
        side: Side,
        entry: PropertyEntry,
    ) {
        self.tables[state.index()].insert_entry(element, side, entry);
    }

    // ── Layout ──────────────────────────────────────────────────

    fn layout(&self, scratch: &mut ScratchPropertyBuffer) -> Arc<[SwapSlot]> {
        let meta = self.meta.read();
        scratch
            .layout_mut()
            .get_or_refresh(meta.layout_version, || meta.swap_layout())
    }

    fn current_layout(&self) -> Vec<SwapSlot> {
        self.meta.read().swap_layout()
    }

    /// Make sure `(element, side)` has a container of `n` points for every
    /// slot of `layout`.
    fn ensure_entries(&self, element: ElementId, side: Side, n: usize, layout: &[SwapSlot]) {
        for state in TimeState::ALL {
            let mut slots = slots_in(layout, state).peekable();
            if slots.peek().is_none() {
                continue;
            }
            self.tables[state.index()].with_entry_or_insert(element, side, |entry| {
                for slot in slots {
                    match entry.slot_mut(slot.index) {
                        Some(values) => values.resize(n),
                        empty => {
                            *empty = Some(PropertyValues::new(
                                slot.id,
                                PropertyType::plain(slot.ty.kind),
                                n,
                            ))
                        }
                    }
                }
            });
        }
    }

    // ── Swapping ────────────────────────────────────────────────

    /// Move the persistent values of `(element, side)` into `scratch`.
    ///
    /// Plain containers are exchanged in O(1). Dual current-state
    /// containers receive a copy of the plain values instead. Only
    /// containers the store already holds are exchanged; entries are
    /// created by [`init_stateful_props`](Self::init_stateful_props), never
    /// here. No-op if `scratch` is already swapped or nothing is stateful.
    pub fn swap(&self, scratch: &mut ScratchPropertyBuffer, element: ElementId, side: Side) {
        self.swap_states(scratch, element, side, TimeState::Older);
    }

    /// Return the values swapped in by [`swap`](Self::swap) to persistent
    /// storage. Dual values are stored as their primal parts. No-op if
    /// `scratch` is not swapped.
    pub fn swap_back(&self, scratch: &mut ScratchPropertyBuffer, element: ElementId, side: Side) {
        self.swap_back_states(scratch, element, side, TimeState::Older);
    }

    fn swap_states(
        &self,
        scratch: &mut ScratchPropertyBuffer,
        element: ElementId,
        side: Side,
        upto: TimeState,
    ) {
        if scratch.is_swapped() {
            return;
        }
        let layout = self.layout(scratch);
        if layout.is_empty() {
            return;
        }
        for &state in upto.up_to() {
            let mut slots = slots_in(&layout, state).peekable();
            if slots.peek().is_none() {
                continue;
            }
            self.tables[state.index()].with_entry(element, side, |entry| {
                for slot in slots {
                    let Some(persistent) = entry.slot_mut(slot.index).as_mut() else {
                        continue;
                    };
                    let held = scratch.slot_mut(state, slot.id);
                    // An empty scratch slot takes the persistent storage itself.
                    held.get_or_insert_with(|| PropertyValues::new(slot.id, scratch_type(slot), 0))
                        .swap(persistent);
                }
            });
        }
        scratch.set_swapped(Some((element, side)));
        trace!(%element, %side, states = upto.index() + 1, "swapped in");
    }

    fn swap_back_states(
        &self,
        scratch: &mut ScratchPropertyBuffer,
        element: ElementId,
        side: Side,
        upto: TimeState,
    ) {
        let Some(swapped) = scratch.swapped_with() else {
            return;
        };
        debug_assert_eq!(swapped, (element, side), "swap_back for a different element");
        let layout = self.layout(scratch);
        for &state in upto.up_to() {
            let mut slots = slots_in(&layout, state).peekable();
            if slots.peek().is_none() {
                continue;
            }
            let table = &self.tables[state.index()];
            let emptied = table.with_entry(element, side, |entry| {
                for slot in slots {
                    let (Some(persistent), Some(held)) = (
                        entry.slot_mut(slot.index).as_mut(),
                        scratch.slot_mut(state, slot.id).as_mut(),
                    ) else {
                        continue;
                    };
                    persistent.swap(held);
                }
                entry.is_empty()
            });
            if emptied == Some(true) {
                table.prune(element, side);
            }
        }
        scratch.set_swapped(None);
        trace!(%element, %side, "swapped back");
    }

    // ── Initialization ──────────────────────────────────────────

    /// Seed stateful values for a fresh `(element, side)`.
    ///
    /// Resizes `scratch` to `n_qpoints`, runs every evaluator that owns
    /// stateful properties (or forces init) and whose declarer was not
    /// restored from a checkpoint, then copies the seeded current values
    /// into each deeper state the property keeps. Restored properties keep
    /// their restored history.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EvaluatorFailed`] wrapping the first
    /// initializer error. Scratch is swapped back before returning.
    pub fn init_stateful_props(
        &self,
        scratch: &mut ScratchPropertyBuffer,
        evaluators: &[&dyn PropertyEvaluator],
        n_qpoints: usize,
        element: ElementId,
        side: Side,
    ) -> Result<(), StorageError> {
        scratch.resize(n_qpoints);
        let layout = self.layout(scratch);
        self.ensure_entries(element, side, n_qpoints, &layout);

        self.swap_states(scratch, element, side, TimeState::Current);
        // Initializers may declare the first stateful property; mark the
        // buffer so their values are swapped back below.
        if !scratch.is_swapped() {
            scratch.set_swapped(Some((element, side)));
        }
        let result = self.run_initializers(scratch, evaluators, element, side);
        // Properties made stateful by an initializer need a persistent
        // container to receive their seeded values.
        let lazy: Vec<SwapSlot> = self
            .layout(scratch)
            .iter()
            .filter(|slot| !layout.iter().any(|s| s.state == slot.state && s.index == slot.index))
            .cloned()
            .collect();
        if result.is_ok() && !lazy.is_empty() {
            self.ensure_entries(element, side, n_qpoints, &lazy);
        }
        self.swap_back_states(scratch, element, side, TimeState::Current);
        result?;

        // Initializers may have made new properties stateful.
        let layout = self.layout(scratch);
        self.ensure_entries(element, side, n_qpoints, &layout);
        self.propagate_current(element, side, &layout);
        trace!(%element, %side, n_qpoints, "initialized stateful properties");
        Ok(())
    }

    fn run_initializers(
        &self,
        scratch: &mut ScratchPropertyBuffer,
        evaluators: &[&dyn PropertyEvaluator],
        element: ElementId,
        side: Side,
    ) -> Result<(), StorageError> {
        for evaluator in evaluators {
            let declarer = evaluator.declarer();
            if self.is_restored_declarer(declarer) {
                continue;
            }
            if !evaluator.has_stateful_properties() && !evaluator.force_stateful_init() {
                continue;
            }
            let mut ctx = EvaluationContext::new(self, scratch, declarer, element, side);
            evaluator
                .init_stateful_properties(&mut ctx)
                .map_err(|e| StorageError::EvaluatorFailed {
                    declarer: declarer.to_string(),
                    reason: Box::new(e),
                })?;
        }
        Ok(())
    }

    /// Copy current values into every deeper state, skipping restored properties.
    fn propagate_current(&self, element: ElementId, side: Side, layout: &[SwapSlot]) {
        let Some(current) = self.tables[0].with_entry(element, side, |entry| entry.clone()) else {
            return;
        };
        let restored = self.meta.read().restored.clone();
        for state in [TimeState::Old, TimeState::Older] {
            let mut slots = slots_in(layout, state)
                .filter(|slot| !restored.contains(slot.id))
                .peekable();
            if slots.peek().is_none() {
                continue;
            }
            self.tables[state.index()].with_entry_or_insert(element, side, |entry| {
                for slot in slots {
                    let Some(source) = current.get(slot.index) else {
                        continue;
                    };
                    let target = entry
                        .slot_mut(slot.index)
                        .get_or_insert_with(|| source.clone_plain(source.len()));
                    target.resize(source.len());
                    for qp in 0..source.len() {
                        target.copy_point(qp, source, qp);
                    }
                }
            });
        }
    }

    // ── Time stepping ───────────────────────────────────────────

    /// Advance one time step: older ← old ← current.
    ///
    /// Tables are rotated, not copied, so the current table afterwards
    /// holds what was the deepest state. Callers recompute current values
    /// before reading them.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NoStatefulProperties`] if nothing keeps history.
    pub fn shift(&mut self) -> Result<(), StorageError> {
        let meta = self.meta.get_mut();
        if meta.stateful.is_empty() {
            return Err(StorageError::NoStatefulProperties);
        }
        let deepest = meta.max_state.index();
        for state in (1..=deepest).rev() {
            self.tables.swap(state, state - 1);
        }
        debug!(states = deepest + 1, "shifted property history");
        Ok(())
    }

    // ── Element operations ──────────────────────────────────────

    /// Copy every state of `(from, side)` into `(to, side)` for `n_qpoints` points.
    ///
    /// No-op if `to == from`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::MissingEntry`] if `from` has no entry in a live state.
    /// - [`StorageError::PointOutOfRange`] if `from` holds fewer than
    ///   `n_qpoints` points.
    pub fn copy(
        &self,
        to: ElementId,
        from: ElementId,
        side: Side,
        n_qpoints: usize,
    ) -> Result<(), StorageError> {
        if to == from {
            return Ok(());
        }
        let layout = self.current_layout();
        for state in self.max_state().up_to() {
            let table = &self.tables[state.index()];
            let source = table
                .with_entry(from, side, |entry| entry.clone())
                .ok_or(StorageError::MissingEntry {
                    element: from,
                    side,
                })?;
            table.with_entry_or_insert(to, side, |entry| -> Result<(), StorageError> {
                for slot in slots_in(&layout, *state) {
                    let Some(values) = source.get(slot.index) else {
                        continue;
                    };
                    if n_qpoints > 0 {
                        check_point(from, n_qpoints - 1, values.len())?;
                    }
                    let target = entry
                        .slot_mut(slot.index)
                        .get_or_insert_with(|| values.clone_plain(n_qpoints));
                    target.resize(n_qpoints);
                    for qp in 0..n_qpoints {
                        target.copy_point(qp, values, qp);
                    }
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Drop every side of `element` in every state.
    pub fn erase_property(&self, element: ElementId) {
        let removed = self
            .tables
            .iter()
            .filter(|table| table.remove_element(element))
            .count();
        trace!(%element, states = removed, "erased element properties");
    }

    /// Drop entries for elements `handles` no longer considers live.
    ///
    /// Returns the number of element entries removed across all states.
    pub fn purge_stale(&self, handles: &ElementHandles) -> usize {
        let removed: usize = self
            .tables
            .iter()
            .map(|table| table.retain_elements(|element| handles.is_live(element)))
            .sum();
        if removed > 0 {
            debug!(removed, "purged stale element properties");
        }
        removed
    }

    /// Drop every stored value. Declarations are kept.
    pub fn release_properties(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
        debug!("released all property values");
    }

    /// A copy of `name`'s values for `(element, side)` in `state`.
    ///
    /// Returns `Ok(None)` if the property keeps no history or the element
    /// has no values for it.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::NotFound`] if `name` was never declared.
    pub fn property_values(
        &self,
        name: &str,
        state: TimeState,
        element: ElementId,
        side: Side,
    ) -> Result<Option<PropertyValues>, StorageError> {
        let id = self.registry.get_id(name)?;
        let Some(index) = self.stateful_index_of(id) else {
            return Ok(None);
        };
        Ok(self.tables[state.index()]
            .with_entry(element, side, |entry| entry.get(index).cloned())
            .flatten())
    }

    // ── Adaptivity ──────────────────────────────────────────────

    /// Copy parent values onto refined children in every live state.
    ///
    /// `child` selects one child of `refinement`; `None` processes all of
    /// them. Children not owned by this process are skipped. Properties
    /// are matched between the stores by id, so `parent_store` may be
    /// `self` or another store sharing the registry.
    ///
    /// # Errors
    ///
    /// - [`StorageError::MissingEntry`] if the parent has no entry.
    /// - [`StorageError::UnknownChild`] if `child` is past the end of the map.
    /// - [`StorageError::PointOutOfRange`] if a point pair falls outside
    ///   the parent values or `n_qpoints`.
    #[allow(clippy::too_many_arguments)]
    pub fn prolong_stateful_props(
        &self,
        refinement: &RefinementMap,
        parent_store: &StatefulPropertyStore,
        parent: ElementId,
        parent_side: Side,
        child: Option<usize>,
        child_side: Side,
        n_qpoints: usize,
    ) -> Result<(), StorageError> {
        let children = match child {
            Some(c) => {
                let map = refinement
                    .children
                    .get(c)
                    .ok_or(StorageError::UnknownChild {
                        child: c,
                        count: refinement.children.len(),
                    })?;
                std::slice::from_ref(map)
            }
            None => refinement.children.as_slice(),
        };
        let layout = self.current_layout();
        let parent_indices: Vec<Option<StatefulIndex>> = layout
            .iter()
            .map(|slot| parent_store.stateful_index_of(slot.id))
            .collect();

        for state in self.max_state().up_to() {
            let parent_entry = parent_store.tables[state.index()]
                .with_entry(parent, parent_side, |entry| entry.clone())
                .ok_or(StorageError::MissingEntry {
                    element: parent,
                    side: parent_side,
                })?;
            for child_map in children.iter().filter(|c| c.locally_owned) {
                let table = &self.tables[state.index()];
                table.with_entry_or_insert(child_map.element, child_side, |entry| -> Result<(), StorageError> {
                    for (slot, parent_index) in layout.iter().zip(&parent_indices) {
                        if slot.state != *state {
                            continue;
                        }
                        let Some(source) = (*parent_index).and_then(|i| parent_entry.get(i)) else {
                            continue;
                        };
                        let target = entry
                            .slot_mut(slot.index)
                            .get_or_insert_with(|| source.clone_plain(n_qpoints));
                        target.resize(n_qpoints);
                        for pair in &child_map.points {
                            check_point(child_map.element, pair.destination, n_qpoints)?;
                            check_point(parent, pair.source, source.len())?;
                            target.copy_point(pair.destination, source, pair.source);
                        }
                    }
                    Ok(())
                })?;
            }
        }
        trace!(%parent, children = children.len(), "prolonged stateful properties");
        Ok(())
    }

    /// Rebuild parent values from its children in every live state.
    ///
    /// Parent point `i` takes the value of point
    /// `coarsening.points[i].source` on child `children[coarsening.points[i].child]`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::MissingEntry`] if a child has no entry.
    /// - [`StorageError::UnknownChild`] if the map names a child past
    ///   the end of `children`.
    /// - [`StorageError::PointOutOfRange`] if a source point falls outside
    ///   the child values.
    pub fn restrict_stateful_props(
        &self,
        coarsening: &CoarseningMap,
        children: &[ElementId],
        parent: ElementId,
        side: Side,
    ) -> Result<(), StorageError> {
        let layout = self.current_layout();
        let n = coarsening.len();
        for state in self.max_state().up_to() {
            let table = &self.tables[state.index()];
            let snapshots = children
                .iter()
                .map(|&c| {
                    table
                        .with_entry(c, side, |entry| entry.clone())
                        .ok_or(StorageError::MissingEntry { element: c, side })
                })
                .collect::<Result<Vec<PropertyEntry>, _>>()?;
            table.with_entry_or_insert(parent, side, |entry| -> Result<(), StorageError> {
                for slot in slots_in(&layout, *state) {
                    let target = entry.slot_mut(slot.index).get_or_insert_with(|| {
                        PropertyValues::new(slot.id, PropertyType::plain(slot.ty.kind), n)
                    });
                    target.resize(n);
                    for (qp, point) in coarsening.points.iter().enumerate() {
                        let snapshot =
                            snapshots
                                .get(point.child)
                                .ok_or(StorageError::UnknownChild {
                                    child: point.child,
                                    count: children.len(),
                                })?;
                        let Some(source) = snapshot.get(slot.index) else {
                            continue;
                        };
                        check_point(children[point.child], point.source, source.len())?;
                        target.copy_point(qp, source, point.source);
                    }
                }
                Ok(())
            })?;
        }
        trace!(%parent, children = children.len(), "restricted stateful properties");
        Ok(())
    }

    /// Remap values of `(element, side)` after a polynomial-order change.
    ///
    /// New point `i` takes old point `map[i]`; containers are resized to
    /// `n_qpoints`. An element without stored values is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PointOutOfRange`] if `map` is shorter than
    /// `n_qpoints` or names a point past the old container.
    pub fn update_stateful_props_for_p_refinement(
        &self,
        element: ElementId,
        side: Side,
        map: &[usize],
        n_qpoints: usize,
    ) -> Result<(), StorageError> {
        if n_qpoints > 0 {
            check_point(element, n_qpoints - 1, map.len())?;
        }
        let layout = self.current_layout();
        for state in self.max_state().up_to() {
            let remapped = self.tables[state.index()].with_entry(element, side, |entry| -> Result<(), StorageError> {
                for slot in slots_in(&layout, *state) {
                    let Some(values) = entry.get_mut(slot.index) else {
                        continue;
                    };
                    let snapshot = values.clone();
                    values.resize(n_qpoints);
                    for (qp, &from) in map.iter().take(n_qpoints).enumerate() {
                        check_point(element, from, snapshot.len())?;
                        values.copy_point(qp, &snapshot, from);
                    }
                }
                Ok(())
            });
            remapped.unwrap_or(Ok(()))?;
        }
        Ok(())
    }
}

impl StatefulDeclarations for StatefulPropertyStore {
    fn declare(
        &self,
        name: &str,
        ty: PropertyType,
        state: TimeState,
        declarer: Option<&Declarer>,
    ) -> Result<PropertyId, StorageError> {
        self.add_property(name, ty, state.depth(), declarer)
    }

    fn declared(&self, name: &str) -> Option<(PropertyId, PropertyType)> {
        let id = self.registry.query_id(name)?;
        let ty = self.meta.read().record(id)?.ty;
        Some((id, ty))
    }
}
