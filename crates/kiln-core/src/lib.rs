//! Core types for the Kiln material-property store.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Kiln workspace:
//! property and element identifiers, value shapes and their numeric
//! representations, the process-wide [`PropertyRegistry`], and the
//! shared error taxonomy.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod element;
pub mod error;
pub mod id;
pub mod registry;
pub mod set;
pub mod value;

pub use element::ElementHandles;
pub use error::PropertyError;
pub use id::{Declarer, ElementId, PropertyId, Side, StatefulIndex, TimeState, MAX_STATE};
pub use registry::PropertyRegistry;
pub use set::PropertySet;
pub use value::{Dual, Numeric, PointData, Points, PropertyType, Repr, ValueKind};
