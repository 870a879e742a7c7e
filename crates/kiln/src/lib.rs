//! Kiln: stateful material-property storage for finite-element solvers.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! Kiln sub-crates. For most users, adding `kiln` as a single dependency is
//! sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use kiln::prelude::*;
//!
//! // A material that seeds its plastic strain with zero.
//! struct Plasticity(Declarer);
//! impl PropertyEvaluator for Plasticity {
//!     fn declarer(&self) -> &Declarer { &self.0 }
//!     fn has_stateful_properties(&self) -> bool { true }
//!     fn init_stateful_properties(
//!         &self,
//!         ctx: &mut EvaluationContext<'_>,
//!     ) -> Result<(), StorageError> {
//!         ctx.declare_property("plastic_strain", PropertyType::scalar())?
//!             .scalars_mut::<f64>()?
//!             .fill(0.0);
//!         Ok(())
//!     }
//! }
//!
//! let material = Plasticity(Declarer::new("Material", "steel"));
//! let mut store = StatefulPropertyStore::standalone();
//! store
//!     .add_property("plastic_strain", PropertyType::scalar(), 1, Some(material.declarer()))
//!     .unwrap();
//!
//! // Seed one element with four quadrature points.
//! let element = ElementId::new(0, 0);
//! let mut scratch = ScratchPropertyBuffer::new(4);
//! store
//!     .init_stateful_props(&mut scratch, &[&material], 4, element, Side::Volume)
//!     .unwrap();
//!
//! // One assembly pass: read old values, write current ones.
//! let id = store.registry().get_id("plastic_strain").unwrap();
//! store.swap(&mut scratch, element, Side::Volume);
//! scratch
//!     .get_mut(TimeState::Current, id)
//!     .unwrap()
//!     .scalars_mut::<f64>()
//!     .unwrap()
//!     .fill(0.01);
//! store.swap_back(&mut scratch, element, Side::Volume);
//!
//! // Converged: current becomes old.
//! store.shift().unwrap();
//! let old = store
//!     .property_values("plastic_strain", TimeState::Old, element, Side::Volume)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(old.scalars::<f64>().unwrap(), &[0.01; 4]);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `kiln-core` | IDs, value shapes, registry, core errors |
//! | [`storage`] | `kiln-storage` | Property store, scratch buffers, element loops |
//! | [`checkpoint`] | `kiln-checkpoint` | Checkpoint/restart and store comparison |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, IDs and the property registry (`kiln-core`).
///
/// Contains [`types::PropertyType`], [`types::ElementId`], [`types::Side`],
/// [`types::TimeState`] and the shared [`types::PropertyRegistry`].
pub use kiln_core as types;

/// The stateful property store (`kiln-storage`).
///
/// [`storage::StatefulPropertyStore`] holds per-element history;
/// [`storage::ScratchPropertyBuffer`] is the per-worker evaluation buffer;
/// [`storage::ElementLoop`] runs element callbacks on a worker pool.
pub use kiln_storage as storage;

/// Checkpoint and restart (`kiln-checkpoint`).
///
/// Save a store with [`checkpoint::save_store`], restore it with
/// [`checkpoint::load_store`], and verify with [`checkpoint::compare_stores`].
pub use kiln_checkpoint as checkpoint;

/// Common imports for typical Kiln usage.
///
/// ```rust
/// use kiln::prelude::*;
/// ```
///
/// This imports the most frequently used types: identifiers, value shapes,
/// the store and its scratch buffer, the evaluator trait, and checkpointing.
pub mod prelude {
    // Core types
    pub use kiln_core::{
        Declarer, Dual, ElementId, PropertyId, PropertyRegistry, PropertyType, Side,
        StatefulIndex, TimeState, ValueKind,
    };

    // Errors
    pub use kiln_checkpoint::CheckpointError;
    pub use kiln_core::PropertyError;
    pub use kiln_storage::StorageError;

    // Store
    pub use kiln_storage::{
        ElementLoop, EvaluationContext, PropertyEvaluator, PropertyValues,
        ScratchPropertyBuffer, StatefulPropertyStore, StoreConfig,
    };

    // Adaptivity
    pub use kiln_storage::{ChildMap, CoarseningMap, RefinementMap};

    // Checkpointing
    pub use kiln_checkpoint::{compare_stores, load_store, save_store};
}
