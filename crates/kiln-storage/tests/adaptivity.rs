//! Mesh adaptivity: prolongation, restriction, p-refinement and element retirement.

use std::sync::Arc;

use kiln_core::{ElementHandles, ElementId, PropertyRegistry, PropertyType, Side, TimeState};
use kiln_storage::{ChildMap, CoarseningMap, RefinementMap, ScratchPropertyBuffer, StorageError};
use kiln_test_utils::{read_scalars, seed_elements, store_on, store_with, PropertySpec};
use proptest::prelude::*;

fn specs() -> Vec<PropertySpec> {
    vec![
        PropertySpec::new("strain", PropertyType::scalar(), 1),
        PropertySpec::new("modulus", PropertyType::scalar(), 0),
    ]
}

fn write_points(store: &kiln_storage::StatefulPropertyStore, state: TimeState, e: ElementId, values: &[f64]) {
    let id = store.registry().get_id("strain").unwrap();
    let mut scratch = ScratchPropertyBuffer::new(values.len());
    store.swap(&mut scratch, e, Side::Volume);
    scratch
        .get_mut(state, id)
        .unwrap()
        .scalars_mut::<f64>()
        .unwrap()
        .copy_from_slice(values);
    store.swap_back(&mut scratch, e, Side::Volume);
}

#[test]
fn prolong_then_restrict_round_trips_parent() {
    let store = store_with(&specs());
    let parent = ElementId::new(0, 0);
    let (c0, c1) = (ElementId::new(1, 0), ElementId::new(2, 0));
    seed_elements(&store, &[parent], 4);
    write_points(&store, TimeState::Current, parent, &[1.0, 2.0, 3.0, 4.0]);
    write_points(&store, TimeState::Old, parent, &[-1.0, -2.0, -3.0, -4.0]);

    // Each child takes one half of the parent's points, twice over.
    let refinement = RefinementMap::new(vec![
        ChildMap::new(c0, [0, 1, 0, 1]),
        ChildMap::new(c1, [2, 3, 2, 3]),
    ]);
    store
        .prolong_stateful_props(&refinement, &store, parent, Side::Volume, None, Side::Volume, 4)
        .unwrap();
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Current, c1),
        Some(vec![3.0, 4.0, 3.0, 4.0])
    );
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Old, c0),
        Some(vec![-1.0, -2.0, -1.0, -2.0])
    );

    store.erase_property(parent);
    assert!(!store.table(TimeState::Current).contains_element(parent));

    let coarsening = CoarseningMap::from_pairs([(0, 0), (0, 1), (1, 0), (1, 1)]);
    store
        .restrict_stateful_props(&coarsening, &[c0, c1], parent, Side::Volume)
        .unwrap();
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Current, parent),
        Some(vec![1.0, 2.0, 3.0, 4.0])
    );
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Old, parent),
        Some(vec![-1.0, -2.0, -3.0, -4.0])
    );
}

#[test]
fn prolong_single_child_skips_remote_and_others() {
    let store = store_with(&specs());
    let parent = ElementId::new(0, 0);
    let (c0, c1, c2) = (ElementId::new(1, 0), ElementId::new(2, 0), ElementId::new(3, 0));
    seed_elements(&store, &[parent], 2);
    write_points(&store, TimeState::Current, parent, &[5.0, 6.0]);

    let refinement = RefinementMap::new(vec![
        ChildMap::new(c0, [0, 0]),
        ChildMap::new(c1, [1, 1]),
        ChildMap::new(c2, [1, 0]).remote(),
    ]);
    store
        .prolong_stateful_props(&refinement, &store, parent, Side::Volume, Some(1), Side::Volume, 2)
        .unwrap();
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Current, c1),
        Some(vec![6.0, 6.0])
    );
    assert!(!store.table(TimeState::Current).contains_element(c0));

    store
        .prolong_stateful_props(&refinement, &store, parent, Side::Volume, Some(2), Side::Volume, 2)
        .unwrap();
    assert!(!store.table(TimeState::Current).contains_element(c2));

    assert_eq!(
        store.prolong_stateful_props(&refinement, &store, parent, Side::Volume, Some(3), Side::Volume, 2),
        Err(StorageError::UnknownChild { child: 3, count: 3 })
    );
}

#[test]
fn prolong_from_another_store_matches_by_property() {
    let registry = Arc::new(PropertyRegistry::new());
    let parent_store = store_on(Arc::clone(&registry), &specs());
    // Child store declares an extra stateful property first, so indices differ.
    let mut child_specs = vec![PropertySpec::new("damage", PropertyType::scalar(), 1)];
    child_specs.extend(specs());
    let child_store = store_on(registry, &child_specs);

    let parent = ElementId::new(0, 0);
    let child = ElementId::new(9, 0);
    seed_elements(&parent_store, &[parent], 2);
    write_points(&parent_store, TimeState::Current, parent, &[8.0, 9.0]);

    let refinement = RefinementMap::new(vec![ChildMap::new(child, [1, 0])]);
    child_store
        .prolong_stateful_props(&refinement, &parent_store, parent, Side::Volume, None, Side::Volume, 2)
        .unwrap();
    assert_eq!(
        read_scalars(&child_store, "strain", TimeState::Current, child),
        Some(vec![9.0, 8.0])
    );
    assert_eq!(read_scalars(&child_store, "damage", TimeState::Current, child), None);
}

#[test]
fn missing_parent_is_an_error() {
    let store = store_with(&specs());
    let parent = ElementId::new(0, 0);
    let refinement = RefinementMap::new(vec![ChildMap::new(ElementId::new(1, 0), [0])]);
    assert_eq!(
        store.prolong_stateful_props(&refinement, &store, parent, Side::Volume, None, Side::Volume, 1),
        Err(StorageError::MissingEntry {
            element: parent,
            side: Side::Volume
        })
    );
}

#[test]
fn restrict_rejects_bad_child_index() {
    let store = store_with(&specs());
    let child = ElementId::new(1, 0);
    seed_elements(&store, &[child], 2);
    let coarsening = CoarseningMap::from_pairs([(0, 0), (4, 1)]);
    assert_eq!(
        store.restrict_stateful_props(&coarsening, &[child], ElementId::new(0, 0), Side::Volume),
        Err(StorageError::UnknownChild { child: 4, count: 1 })
    );
}

#[test]
fn p_refinement_remaps_points() {
    let store = store_with(&specs());
    let e = ElementId::new(0, 0);
    seed_elements(&store, &[e], 2);
    write_points(&store, TimeState::Current, e, &[1.0, 2.0]);

    store
        .update_stateful_props_for_p_refinement(e, Side::Volume, &[0, 0, 1, 1], 4)
        .unwrap();
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Current, e),
        Some(vec![1.0, 1.0, 2.0, 2.0])
    );
    assert_eq!(
        read_scalars(&store, "strain", TimeState::Old, e).map(|v| v.len()),
        Some(4)
    );

    // Elements with nothing stored are left alone.
    store
        .update_stateful_props_for_p_refinement(ElementId::new(5, 0), Side::Volume, &[0], 1)
        .unwrap();
    assert!(matches!(
        store.update_stateful_props_for_p_refinement(e, Side::Volume, &[0], 3),
        Err(StorageError::PointOutOfRange { .. })
    ));
}

#[test]
fn retired_elements_are_purged() {
    let store = store_with(&specs());
    let mut handles = ElementHandles::new();
    let elements: Vec<ElementId> = (0..4).map(|_| handles.allocate()).collect();
    seed_elements(&store, &elements, 2);

    assert!(handles.retire(elements[1]));
    assert!(handles.retire(elements[3]));
    // Current and old tables each drop two elements.
    assert_eq!(store.purge_stale(&handles), 4);
    assert!(store.table(TimeState::Old).contains_element(elements[0]));
    assert!(!store.table(TimeState::Old).contains_element(elements[1]));

    // A reused slot gets a new generation and starts empty.
    let reused = handles.allocate();
    assert_eq!(reused.slot(), elements[3].slot());
    assert_ne!(reused, elements[3]);
    assert!(!store.table(TimeState::Current).contains_element(reused));
}

proptest! {
    #[test]
    fn p_refinement_follows_any_point_map(
        old in prop::collection::vec(-1e6f64..1e6, 1..12),
        picks in prop::collection::vec(any::<prop::sample::Index>(), 0..24),
    ) {
        let store = store_with(&specs());
        let e = ElementId::new(0, 0);
        seed_elements(&store, &[e], old.len());
        write_points(&store, TimeState::Current, e, &old);

        let map: Vec<usize> = picks.iter().map(|i| i.index(old.len())).collect();
        store
            .update_stateful_props_for_p_refinement(e, Side::Volume, &map, map.len())
            .unwrap();
        let expected: Vec<f64> = map.iter().map(|&i| old[i]).collect();
        prop_assert_eq!(read_scalars(&store, "strain", TimeState::Current, e), Some(expected));
    }
}
