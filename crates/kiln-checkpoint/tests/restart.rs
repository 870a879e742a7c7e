//! Checkpoint/restart integration tests.
//!
//! Each test builds a store the way a solver would (evaluators declare
//! and seed properties), checkpoints it, and restores into a freshly
//! declared store.

use kiln_checkpoint::{compare_stores, load_store, save_store, CheckpointError};
use kiln_core::{ElementId, PropertyType, Side, StatefulIndex, TimeState};
use kiln_storage::{PropertyEvaluator, ScratchPropertyBuffer, StatefulPropertyStore};
use kiln_test_utils::fixtures::ConstantInit;
use kiln_test_utils::{read_scalars, store_with, write_scalar, PropertySpec};
use proptest::prelude::*;

const QP: usize = 4;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn plasticity() -> ConstantInit {
    ConstantInit::new("Material", "plasticity")
        .with_property("plastic_strain", PropertyType::scalar(), TimeState::Old, 0.5)
        .with_property("hardening", PropertyType::scalar().dual(), TimeState::Older, 2.0)
        .with_property("back_stress", PropertyType::vector(3), TimeState::Old, 0.0)
}

fn elements() -> Vec<ElementId> {
    (0..3).map(|slot| ElementId::new(slot, 0)).collect()
}

/// Declare, seed and advance one step.
fn solved_store(evaluator: &ConstantInit) -> StatefulPropertyStore {
    let mut store = StatefulPropertyStore::standalone();
    evaluator.register(&store).unwrap();
    let mut scratch = ScratchPropertyBuffer::new(QP);
    let evaluators: [&dyn PropertyEvaluator; 1] = [evaluator];
    for element in elements() {
        store
            .init_stateful_props(&mut scratch, &evaluators, QP, element, Side::Volume)
            .unwrap();
    }
    store.shift().unwrap();
    for (i, element) in elements().into_iter().enumerate() {
        write_scalar(&store, "plastic_strain", TimeState::Current, element, QP, i as f64 + 1.0);
        write_scalar(&store, "hardening", TimeState::Current, element, QP, 10.0 * i as f64);
    }
    store
}

fn checkpoint(store: &StatefulPropertyStore) -> Vec<u8> {
    let mut bytes = Vec::new();
    save_store(&mut bytes, store).unwrap();
    bytes
}

#[test]
fn restore_reproduces_every_state() {
    let evaluator = plasticity();
    let saved = solved_store(&evaluator);
    let bytes = checkpoint(&saved);

    let mut restored = StatefulPropertyStore::standalone();
    evaluator.register(&restored).unwrap();
    let summary = load_store(bytes.as_slice(), &mut restored).unwrap();

    assert_eq!(summary.num_states, 3);
    assert_eq!(
        summary.restored,
        vec!["back_stress", "hardening", "plastic_strain"]
    );
    assert!(summary.discarded.is_empty());
    assert!(compare_stores(&saved, &restored).is_none());

    let e1 = ElementId::new(1, 0);
    assert_eq!(
        read_scalars(&restored, "plastic_strain", TimeState::Current, e1),
        Some(vec![2.0; QP])
    );
    assert_eq!(
        read_scalars(&restored, "plastic_strain", TimeState::Old, e1),
        Some(vec![0.5; QP])
    );
    // Dual values were saved as their primal parts.
    assert_eq!(
        read_scalars(&restored, "hardening", TimeState::Current, e1),
        Some(vec![10.0; QP])
    );
}

#[test]
fn restore_remaps_stateful_numbering() {
    let evaluator = plasticity();
    let saved = solved_store(&evaluator);
    let bytes = checkpoint(&saved);

    // Same properties, declared in reverse order.
    let mut restored = StatefulPropertyStore::standalone();
    for p in evaluator.properties.iter().rev() {
        restored
            .add_property(&p.name, p.ty, p.state.depth(), Some(&evaluator.declarer))
            .unwrap();
    }
    load_store(bytes.as_slice(), &mut restored).unwrap();

    assert_eq!(
        restored.query_stateful_prop_name(StatefulIndex(0)).as_deref(),
        Some("back_stress")
    );
    assert_eq!(
        saved.query_stateful_prop_name(StatefulIndex(0)).as_deref(),
        Some("plastic_strain")
    );
    assert!(compare_stores(&saved, &restored).is_none());
}

#[test]
fn restored_declarers_skip_initialization() {
    let evaluator = plasticity();
    let bytes = checkpoint(&solved_store(&evaluator));

    let fresh = plasticity();
    let mut restored = StatefulPropertyStore::standalone();
    fresh.register(&restored).unwrap();
    load_store(bytes.as_slice(), &mut restored).unwrap();
    assert!(restored.has_restored_properties());
    assert!(restored.is_restored_property("plastic_strain"));
    assert_eq!(restored.restored_declarers(), vec![fresh.declarer.clone()]);

    let evaluators: [&dyn PropertyEvaluator; 1] = [&fresh];
    let mut scratch = ScratchPropertyBuffer::new(QP);
    let e0 = ElementId::new(0, 0);
    restored
        .init_stateful_props(&mut scratch, &evaluators, QP, e0, Side::Volume)
        .unwrap();
    assert_eq!(fresh.calls(), 0);
    assert_eq!(
        read_scalars(&restored, "plastic_strain", TimeState::Current, e0),
        Some(vec![1.0; QP])
    );
}

#[test]
fn incompatible_checkpoint_leaves_store_untouched() {
    let saved = store_with(&[PropertySpec::new("damage", PropertyType::scalar(), 2)]);
    let bytes = checkpoint(&saved);

    let mut current = store_with(&[PropertySpec::new("damage", PropertyType::scalar(), 1)]);
    let e = ElementId::new(0, 0);
    kiln_test_utils::seed_elements(&current, &[e], QP);
    write_scalar(&current, "damage", TimeState::Old, e, QP, 7.0);

    let err = load_store(bytes.as_slice(), &mut current).unwrap_err();
    assert!(matches!(
        err,
        CheckpointError::StateDepthMismatch {
            checkpoint: 3,
            current: 2
        }
    ));
    assert!(!current.has_restored_properties());
    assert_eq!(
        read_scalars(&current, "damage", TimeState::Old, e),
        Some(vec![7.0; QP])
    );
}

#[test]
fn changed_shape_is_rejected() {
    let saved = store_with(&[PropertySpec::new("stress", PropertyType::scalar(), 1)]);
    let bytes = checkpoint(&saved);
    let mut current = store_with(&[PropertySpec::new("stress", PropertyType::tensor(3, 3), 1)]);
    match load_store(bytes.as_slice(), &mut current).unwrap_err() {
        CheckpointError::ValueTypeMismatch {
            property,
            checkpoint,
            current,
        } => {
            assert_eq!(property, "stress");
            assert_eq!(checkpoint, "scalar");
            assert_eq!(current, "tensor<3x3>");
        }
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn properties_no_longer_stateful_are_discarded() {
    init_tracing();
    let saved = store_with(&[
        PropertySpec::new("kept", PropertyType::scalar(), 1),
        PropertySpec::new("dropped", PropertyType::scalar(), 1),
    ]);
    kiln_test_utils::seed_elements(&saved, &elements(), QP);
    let bytes = checkpoint(&saved);

    let mut current = store_with(&[
        PropertySpec::new("kept", PropertyType::scalar(), 1),
        PropertySpec::new("dropped", PropertyType::scalar(), 0),
    ]);
    let summary = load_store(bytes.as_slice(), &mut current).unwrap();
    assert_eq!(summary.restored, vec!["kept"]);
    assert_eq!(summary.discarded, vec!["dropped"]);
    assert!(current.is_restored_property("kept"));
    assert!(!current.is_restored_property("dropped"));
    assert_eq!(summary.entries, 2 * elements().len());
}

proptest! {
    #[test]
    fn arbitrary_values_survive_restart(values in prop::collection::vec(-1e12f64..1e12, 1..16)) {
        let store = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 1)]);
        let e = ElementId::new(7, 2);
        let n = values.len();
        kiln_test_utils::seed_elements(&store, &[e], n);
        let id = store.registry().get_id("strain").unwrap();
        let mut scratch = ScratchPropertyBuffer::new(n);
        store.swap(&mut scratch, e, Side::Volume);
        scratch
            .get_mut(TimeState::Old, id)
            .unwrap()
            .scalars_mut::<f64>()
            .unwrap()
            .copy_from_slice(&values);
        store.swap_back(&mut scratch, e, Side::Volume);

        let bytes = checkpoint(&store);
        let mut restored = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 1)]);
        load_store(bytes.as_slice(), &mut restored).unwrap();
        prop_assert!(compare_stores(&store, &restored).is_none());
        prop_assert_eq!(read_scalars(&restored, "strain", TimeState::Old, e), Some(values));
    }
}
