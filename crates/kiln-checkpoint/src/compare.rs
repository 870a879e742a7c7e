//! Store comparison for restart verification.
//!
//! Digest-first comparison (fast path) with a per-point fallback on
//! mismatch that names exactly which values differ.

use std::collections::BTreeSet;

use kiln_core::{ElementId, Points, Side, TimeState};
use kiln_storage::{PropertyValues, StatefulPropertyStore};

use crate::hash::store_digest;

/// How one property's values differ between two stores.
#[derive(Clone, Debug, PartialEq)]
pub enum DivergenceKind {
    /// Only the expected store has values.
    MissingActual,
    /// Only the actual store has values.
    MissingExpected,
    /// Both have values but a different number of points or components.
    LengthMismatch {
        /// Flattened length in the expected store.
        expected: usize,
        /// Flattened length in the actual store.
        actual: usize,
    },
    /// A stored number differs.
    Value {
        /// Position in the flattened values.
        offset: usize,
        /// Value in the expected store.
        expected: f64,
        /// Value in the actual store.
        actual: f64,
    },
}

/// One divergence between two stores.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDivergence {
    /// Time state where the values differ.
    pub state: TimeState,
    /// Element holding the values.
    pub element: ElementId,
    /// Side holding the values.
    pub side: Side,
    /// Property name.
    pub property: String,
    /// What differs.
    pub kind: DivergenceKind,
}

/// All divergences found between two stores.
#[derive(Clone, Debug, Default)]
pub struct DivergenceReport {
    /// Digest of the expected store.
    pub expected_digest: u64,
    /// Digest of the actual store.
    pub actual_digest: u64,
    /// Per-value differences, in state, element, side, name order.
    pub divergences: Vec<PropertyDivergence>,
}

/// Compare two stores value by value.
///
/// Fast path: compute both digests. If they match, returns `None`. On
/// mismatch every `(state, element, side, property)` present in either
/// store is compared; for each differing value only the first differing
/// number is reported. Properties are matched by name, so stores with
/// different stateful numbering compare cleanly.
pub fn compare_stores(
    expected: &StatefulPropertyStore,
    actual: &StatefulPropertyStore,
) -> Option<DivergenceReport> {
    let expected_digest = store_digest(expected);
    let actual_digest = store_digest(actual);
    if expected_digest == actual_digest {
        return None;
    }

    let names: BTreeSet<String> = [expected, actual]
        .into_iter()
        .flat_map(|store| {
            store
                .stateful_prop_ids()
                .into_iter()
                .filter_map(move |id| store.registry().get_name(id).ok())
                .map(|name| name.to_string())
        })
        .collect();

    let mut divergences = Vec::new();
    let deepest = expected.max_state().max(actual.max_state());
    for &state in deepest.up_to() {
        let mut keys = BTreeSet::new();
        for store in [expected, actual] {
            let view = store.table(state).read();
            for (element, sides) in view.iter() {
                keys.extend(sides.keys().map(|&side| (element, side)));
            }
        }
        for &(element, side) in &keys {
            for name in &names {
                let lookup = |store: &StatefulPropertyStore| {
                    store
                        .property_values(name, state, element, side)
                        .ok()
                        .flatten()
                };
                let kind = match (lookup(expected), lookup(actual)) {
                    (None, None) => None,
                    (Some(_), None) => Some(DivergenceKind::MissingActual),
                    (None, Some(_)) => Some(DivergenceKind::MissingExpected),
                    (Some(e), Some(a)) => first_difference(&e, &a),
                };
                if let Some(kind) = kind {
                    divergences.push(PropertyDivergence {
                        state,
                        element,
                        side,
                        property: name.clone(),
                        kind,
                    });
                }
            }
        }
    }

    Some(DivergenceReport {
        expected_digest,
        actual_digest,
        divergences,
    })
}

fn flatten(values: &PropertyValues) -> Vec<f64> {
    match values.data().to_plain() {
        Points::Sequence(per_point) => per_point.into_iter().flatten().collect(),
        Points::Scalar(data) | Points::Vector { data, .. } | Points::Tensor { data, .. } => data,
    }
}

fn first_difference(expected: &PropertyValues, actual: &PropertyValues) -> Option<DivergenceKind> {
    let (e, a) = (flatten(expected), flatten(actual));
    if e.len() != a.len() || expected.len() != actual.len() {
        return Some(DivergenceKind::LengthMismatch {
            expected: e.len(),
            actual: a.len(),
        });
    }
    e.iter()
        .zip(&a)
        .position(|(x, y)| x.to_bits() != y.to_bits())
        .map(|offset| DivergenceKind::Value {
            offset,
            expected: e[offset],
            actual: a[offset],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::PropertyType;
    use kiln_storage::ScratchPropertyBuffer;

    fn seeded(values: &[f64]) -> StatefulPropertyStore {
        let store = StatefulPropertyStore::standalone();
        let id = store
            .add_property("strain", PropertyType::scalar(), 1, None)
            .unwrap();
        let e = ElementId::new(0, 0);
        let mut scratch = ScratchPropertyBuffer::new(values.len());
        store
            .init_stateful_props(&mut scratch, &[], values.len(), e, Side::Volume)
            .unwrap();
        store.swap(&mut scratch, e, Side::Volume);
        scratch
            .get_mut(TimeState::Current, id)
            .unwrap()
            .scalars_mut::<f64>()
            .unwrap()
            .copy_from_slice(values);
        store.swap_back(&mut scratch, e, Side::Volume);
        store
    }

    #[test]
    fn equal_stores_have_no_report() {
        assert!(compare_stores(&seeded(&[1.0, 2.0]), &seeded(&[1.0, 2.0])).is_none());
    }

    #[test]
    fn differing_value_is_located() {
        let report = compare_stores(&seeded(&[1.0, 2.0]), &seeded(&[1.0, 9.0])).unwrap();
        assert_ne!(report.expected_digest, report.actual_digest);
        assert_eq!(report.divergences.len(), 1);
        let d = &report.divergences[0];
        assert_eq!(d.state, TimeState::Current);
        assert_eq!(d.property, "strain");
        assert_eq!(
            d.kind,
            DivergenceKind::Value {
                offset: 1,
                expected: 2.0,
                actual: 9.0
            }
        );
    }

    #[test]
    fn missing_entry_is_reported() {
        let expected = seeded(&[1.0]);
        let actual = seeded(&[1.0]);
        actual.erase_property(ElementId::new(0, 0));
        let report = compare_stores(&expected, &actual).unwrap();
        assert!(report
            .divergences
            .iter()
            .all(|d| d.kind == DivergenceKind::MissingActual));
        assert_eq!(report.divergences.len(), 2);
    }
}
