//! Stateful per-element material-property storage for Kiln.
//!
//! Finite-element assembly evaluates material properties at the
//! quadrature points of every element. Some properties carry history:
//! their values from the previous one or two converged time steps. This
//! crate stores those values per `(element, side)` and moves them in and
//! out of per-worker scratch buffers during evaluation.
//!
//! # Architecture
//!
//! ```text
//! StatefulPropertyStore
//! ├── Arc<PropertyRegistry> (name ↔ PropertyId, shared across stores)
//! ├── StoreMeta (records, stateful order, restart flags, layout version)
//! └── PropertyTable × 3 (current / old / older)
//!     └── (ElementId, Side) → Mutex<PropertyEntry>
//!         └── PropertyValues per StatefulIndex (always plain)
//!
//! ScratchPropertyBuffer (one per worker)
//! ├── PropertyValues per (TimeState, PropertyId)
//! └── LayoutCache (swap slots for the store's layout version)
//! ```
//!
//! # Lifecycle
//!
//! 1. Evaluators declare properties through [`StatefulPropertyStore::add_property`]
//!    or lazily via [`EvaluationContext`].
//! 2. [`StatefulPropertyStore::init_stateful_props`] seeds each element.
//! 3. Each assembly pass calls [`swap`](StatefulPropertyStore::swap),
//!    evaluates, then [`swap_back`](StatefulPropertyStore::swap_back).
//! 4. After a converged step, [`shift`](StatefulPropertyStore::shift)
//!    rotates current → old → older.
//! 5. Mesh adaptivity uses `copy`, `prolong_stateful_props`,
//!    `restrict_stateful_props` and `erase_property`.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod adaptivity;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod scratch;
pub mod store;
pub mod table;
pub mod threaded;

pub use adaptivity::{ChildMap, CoarseningMap, CoarseningPoint, PointMap, RefinementMap};
pub use config::StoreConfig;
pub use container::PropertyValues;
pub use context::{EvaluationContext, StatefulDeclarations};
pub use error::StorageError;
pub use evaluator::PropertyEvaluator;
pub use scratch::{LayoutCache, ScratchPropertyBuffer, SwapSlot};
pub use store::{PropertyRecord, StatefulPropertyStore};
pub use table::{PropertyEntry, PropertyTable, SideEntries, TableView};
pub use threaded::ElementLoop;
