//! Benchmark profiles for the Kiln property store.
//!
//! Provides pre-built store profiles for benchmarking:
//!
//! - [`reference_profile`]: 10K hex elements, 8 points each, a typical
//!   plasticity property set
//! - [`stress_profile`]: 100K elements with the same properties
//! - [`build_store`]: declare and seed a store for a profile

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use kiln_core::{ElementId, PropertyType, Side};
use kiln_storage::{ScratchPropertyBuffer, StatefulPropertyStore, StorageError};

/// Shape of a benchmark store.
#[derive(Clone, Debug)]
pub struct BenchProfile {
    /// Number of volume elements.
    pub elements: u32,
    /// Quadrature points per element.
    pub qpoints: usize,
    /// `(name, type, history depth)` per declared property.
    pub properties: Vec<(&'static str, PropertyType, u32)>,
}

impl BenchProfile {
    /// Every `(element, Volume)` pair of the profile.
    pub fn volumes(&self) -> Vec<(ElementId, Side)> {
        (0..self.elements)
            .map(|slot| (ElementId::new(slot, 0), Side::Volume))
            .collect()
    }
}

fn plasticity_properties() -> Vec<(&'static str, PropertyType, u32)> {
    vec![
        ("stress", PropertyType::tensor(3, 3), 1),
        ("plastic_strain", PropertyType::tensor(3, 3), 1),
        ("hardening", PropertyType::scalar().dual(), 2),
        ("back_stress", PropertyType::vector(6), 1),
        ("elasticity", PropertyType::tensor(6, 6), 0),
    ]
}

/// Build a reference benchmark profile: 10K elements × 8 points.
pub fn reference_profile() -> BenchProfile {
    BenchProfile {
        elements: 10_000,
        qpoints: 8,
        properties: plasticity_properties(),
    }
}

/// Build a stress benchmark profile: 100K elements × 8 points.
///
/// Same properties as [`reference_profile`] at 10x the element count.
pub fn stress_profile() -> BenchProfile {
    BenchProfile {
        elements: 100_000,
        ..reference_profile()
    }
}

/// Declare every profile property and seed every element.
pub fn build_store(profile: &BenchProfile) -> Result<StatefulPropertyStore, StorageError> {
    let store = StatefulPropertyStore::standalone();
    for &(name, ty, state) in &profile.properties {
        store.add_property(name, ty, state, None)?;
    }
    let mut scratch = ScratchPropertyBuffer::new(profile.qpoints);
    for (element, side) in profile.volumes() {
        store.init_stateful_props(&mut scratch, &[], profile.qpoints, element, side)?;
    }
    Ok(store)
}
