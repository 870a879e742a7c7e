//! End-to-end store lifecycle: declare, seed in parallel, evaluate, shift.

use kiln_core::{ElementId, PropertyType, Side, TimeState};
use kiln_storage::{
    ElementLoop, PropertyEvaluator, ScratchPropertyBuffer, StatefulPropertyStore, StorageError,
    StoreConfig,
};
use kiln_test_utils::fixtures::{ConstantInit, FailingInit, ForcedInit, LazyHistoryInit};
use kiln_test_utils::{fill, read_scalars, store_with, write_scalar, PropertySpec};

const QP: usize = 4;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn volumes(n: u32) -> Vec<(ElementId, Side)> {
    (0..n).map(|slot| (ElementId::new(slot, 0), Side::Volume)).collect()
}

fn pool(workers: usize) -> ElementLoop {
    let mut config = StoreConfig::new(0);
    config.worker_count = Some(workers);
    ElementLoop::new(&config).with_chunk_size(8)
}

fn plasticity() -> ConstantInit {
    ConstantInit::new("Material", "plasticity")
        .with_property("strain", PropertyType::scalar(), TimeState::Old, 0.25)
        .with_property("hardening", PropertyType::scalar().dual(), TimeState::Older, 3.0)
}

#[test]
fn parallel_init_seeds_every_state() {
    init_tracing();
    let evaluator = plasticity();
    let store = StatefulPropertyStore::standalone();
    evaluator.register(&store).unwrap();
    let evaluators: [&dyn PropertyEvaluator; 1] = [&evaluator];

    let elements = volumes(100);
    pool(4)
        .run(&store, &elements, |store, scratch, element, side| {
            store.init_stateful_props(scratch, &evaluators, QP, element, side)
        })
        .unwrap();

    assert_eq!(evaluator.calls(), elements.len());
    for &(element, _) in &elements {
        for state in [TimeState::Current, TimeState::Old] {
            assert_eq!(
                read_scalars(&store, "strain", state, element),
                Some(vec![0.25; QP])
            );
        }
        assert_eq!(
            read_scalars(&store, "hardening", TimeState::Older, element),
            Some(vec![3.0; QP])
        );
    }
}

#[test]
fn shift_moves_converged_values_into_history() {
    let mut store = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 2)]);
    let e = ElementId::new(0, 0);
    kiln_test_utils::seed_elements(&store, &[e], QP);

    for step in 1..=3 {
        write_scalar(&store, "strain", TimeState::Current, e, QP, step as f64);
        store.shift().unwrap();
    }
    assert_eq!(read_scalars(&store, "strain", TimeState::Old, e), Some(vec![3.0; QP]));
    assert_eq!(read_scalars(&store, "strain", TimeState::Older, e), Some(vec![2.0; QP]));
}

#[test]
fn assembly_pass_updates_current_only() {
    let store = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 1)]);
    let elements = volumes(32);
    let ids: Vec<ElementId> = elements.iter().map(|&(e, _)| e).collect();
    kiln_test_utils::seed_elements(&store, &ids, QP);
    let id = store.registry().get_id("strain").unwrap();

    pool(3)
        .run(&store, &elements, |store, scratch, element, side| {
            scratch.resize(QP);
            store.swap(scratch, element, side);
            let old: Vec<f64> = scratch
                .get(TimeState::Old, id)
                .map(|v| v.scalars::<f64>().map(<[f64]>::to_vec))
                .transpose()?
                .unwrap_or_default();
            let current = scratch
                .get_mut(TimeState::Current, id)
                .ok_or_else(|| StorageError::Evaluation {
                    reason: "strain not swapped in".into(),
                })?;
            for (c, o) in current.scalars_mut::<f64>()?.iter_mut().zip(&old) {
                *c = o + f64::from(element.slot());
            }
            store.swap_back(scratch, element, side);
            Ok(())
        })
        .unwrap();

    for e in ids {
        let expected = f64::from(e.slot());
        assert_eq!(
            read_scalars(&store, "strain", TimeState::Current, e),
            Some(vec![expected; QP])
        );
        assert_eq!(read_scalars(&store, "strain", TimeState::Old, e), Some(vec![0.0; QP]));
    }
}

#[test]
fn lazily_requested_history_is_seeded() {
    let store = StatefulPropertyStore::standalone();
    let evaluator = LazyHistoryInit::new("temperature", 300.0);
    let evaluators: [&dyn PropertyEvaluator; 1] = [&evaluator];
    let e = ElementId::new(3, 0);
    let mut scratch = ScratchPropertyBuffer::new(QP);

    assert!(!store.has_stateful_properties());
    store
        .init_stateful_props(&mut scratch, &evaluators, QP, e, Side::Volume)
        .unwrap();
    assert!(store.is_stateful_prop("temperature"));
    assert!(!scratch.is_swapped());
    for state in [TimeState::Current, TimeState::Old] {
        assert_eq!(
            read_scalars(&store, "temperature", state, e),
            Some(vec![300.0; QP])
        );
    }
}

#[test]
fn forced_init_runs_without_history() {
    let store = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 1)]);
    let forced = ForcedInit::new("density", 7.8);
    let idle = ConstantInit::new("Material", "idle").with_property(
        "modulus",
        PropertyType::scalar(),
        TimeState::Current,
        1.0,
    );
    let evaluators: [&dyn PropertyEvaluator; 2] = [&forced, &idle];
    let mut scratch = ScratchPropertyBuffer::new(QP);
    store
        .init_stateful_props(&mut scratch, &evaluators, QP, ElementId::new(0, 0), Side::Volume)
        .unwrap();

    assert_eq!(forced.calls(), 1);
    assert_eq!(idle.calls(), 0);
    assert!(!store.is_stateful_prop("density"));
    let id = store.registry().get_id("density").unwrap();
    let density = scratch.get(TimeState::Current, id).unwrap();
    assert_eq!(density.scalars::<f64>().unwrap(), &[7.8; QP]);
}

#[test]
fn failing_initializer_is_reported_and_scratch_released() {
    let store = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 1)]);
    let failing = FailingInit::new(2);
    let evaluators: [&dyn PropertyEvaluator; 1] = [&failing];
    let mut scratch = ScratchPropertyBuffer::new(QP);

    for slot in 0..2 {
        store
            .init_stateful_props(&mut scratch, &evaluators, QP, ElementId::new(slot, 0), Side::Volume)
            .unwrap();
    }
    let err = store
        .init_stateful_props(&mut scratch, &evaluators, QP, ElementId::new(2, 0), Side::Volume)
        .unwrap_err();
    match err {
        StorageError::EvaluatorFailed { declarer, reason } => {
            assert_eq!(declarer, "Material 'failing'");
            assert!(matches!(*reason, StorageError::Evaluation { .. }));
        }
        other => panic!("unexpected {other}"),
    }
    assert!(!scratch.is_swapped());
}

#[test]
fn parallel_failure_stops_the_loop() {
    init_tracing();
    let store = store_with(&[PropertySpec::new("strain", PropertyType::scalar(), 1)]);
    let failing = FailingInit::new(10);
    let evaluators: [&dyn PropertyEvaluator; 1] = [&failing];
    let err = pool(4)
        .run(&store, &volumes(200), |store, scratch, element, side| {
            store.init_stateful_props(scratch, &evaluators, QP, element, side)
        })
        .unwrap_err();
    assert!(matches!(err, StorageError::EvaluatorFailed { .. }));
}

#[test]
fn dual_current_values_are_stored_plain() {
    let store = store_with(&[PropertySpec::new(
        "stress",
        PropertyType::vector(2).dual(),
        1,
    )]);
    let e = ElementId::new(0, 0);
    kiln_test_utils::seed_elements(&store, &[e], QP);
    let id = store.registry().get_id("stress").unwrap();

    let mut scratch = ScratchPropertyBuffer::new(QP);
    store.swap(&mut scratch, e, Side::Volume);
    let held = scratch.get_mut(TimeState::Current, id).unwrap();
    assert!(held.property_type().is_dual());
    fill(held, 5.0).unwrap();
    assert!(!scratch
        .get(TimeState::Old, id)
        .unwrap()
        .property_type()
        .is_dual());
    store.swap_back(&mut scratch, e, Side::Volume);

    let stored = store
        .property_values("stress", TimeState::Current, e, Side::Volume)
        .unwrap()
        .unwrap();
    assert!(!stored.property_type().is_dual());
    assert_eq!(stored.vector::<f64>(QP - 1).unwrap(), &[5.0, 5.0]);
}
