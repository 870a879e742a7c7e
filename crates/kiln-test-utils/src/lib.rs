//! Test utilities and mock types for Kiln development.
//!
//! Provides mock implementations of [`PropertyEvaluator`] (see
//! [`fixtures`]) and helpers for building stores, seeding elements and
//! writing values without going through an evaluator.
//!
//! [`PropertyEvaluator`]: kiln_storage::PropertyEvaluator

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::Arc;

use kiln_core::{
    Dual, ElementId, Numeric, PropertyError, PropertyRegistry, PropertyType, Points, Repr, Side,
    TimeState,
};
use kiln_storage::{
    PropertyValues, ScratchPropertyBuffer, StatefulPropertyStore, StoreConfig,
};

/// A property declaration: name, type and history depth.
#[derive(Clone, Debug)]
pub struct PropertySpec {
    pub name: String,
    pub ty: PropertyType,
    pub state: u32,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, ty: PropertyType, state: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            state,
        }
    }
}

/// Build a store on a fresh registry with `specs` declared in order.
pub fn store_with(specs: &[PropertySpec]) -> StatefulPropertyStore {
    store_on(Arc::new(PropertyRegistry::new()), specs)
}

/// Build a store on a shared registry with `specs` declared in order.
pub fn store_on(registry: Arc<PropertyRegistry>, specs: &[PropertySpec]) -> StatefulPropertyStore {
    let store = StatefulPropertyStore::new(registry, StoreConfig::new(64))
        .expect("default test config is valid");
    for spec in specs {
        store
            .add_property(&spec.name, spec.ty, spec.state, None)
            .expect("test property declaration");
    }
    store
}

/// Initialize `elements` (volume side) with `n_qpoints` points and no evaluators.
pub fn seed_elements(store: &StatefulPropertyStore, elements: &[ElementId], n_qpoints: usize) {
    let mut scratch = ScratchPropertyBuffer::new(n_qpoints);
    for &element in elements {
        store
            .init_stateful_props(&mut scratch, &[], n_qpoints, element, Side::Volume)
            .expect("seeding without evaluators cannot fail");
    }
}

/// Overwrite every number of `values` with `value`.
///
/// Sequence points are replaced by a single entry.
pub fn fill(values: &mut PropertyValues, value: f64) -> Result<(), PropertyError> {
    match values.repr() {
        Repr::Plain => fill_points(values.points_mut::<f64>()?, value),
        Repr::Dual => fill_points(values.points_mut::<Dual>()?, value),
    }
    Ok(())
}

fn fill_points<N: Numeric>(points: &mut Points<N>, value: f64) {
    if let Some(flat) = points.as_flat_mut() {
        flat.fill(N::from_primal(value));
        return;
    }
    for qp in 0..points.len() {
        if let Some(seq) = points.sequence_mut(qp) {
            seq.clear();
            seq.push(N::from_primal(value));
        }
    }
}

/// Write `value` into every point of `name` for `(element, Volume)` in
/// `state`, going through a swap so the store sees a normal update.
pub fn write_scalar(
    store: &StatefulPropertyStore,
    name: &str,
    state: TimeState,
    element: ElementId,
    n_qpoints: usize,
    value: f64,
) {
    let id = store.registry().get_id(name).expect("property declared");
    let mut scratch = ScratchPropertyBuffer::new(n_qpoints);
    store.swap(&mut scratch, element, Side::Volume);
    let values = scratch.get_mut(state, id).expect("property is stateful");
    fill(values, value).expect("fillable property");
    store.swap_back(&mut scratch, element, Side::Volume);
}

/// Primal scalar values of `name` at `(element, Volume)` in `state`.
pub fn read_scalars(
    store: &StatefulPropertyStore,
    name: &str,
    state: TimeState,
    element: ElementId,
) -> Option<Vec<f64>> {
    let values = store
        .property_values(name, state, element, Side::Volume)
        .ok()??;
    values.scalars::<f64>().ok().map(<[f64]>::to_vec)
}
