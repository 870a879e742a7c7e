//! Storage-specific error types.

use std::error::Error;
use std::fmt;

use kiln_core::{ElementId, PropertyError, Side};

/// Errors that can occur during store operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// A naming, typing or state-depth error from the property layer.
    Property(PropertyError),
    /// `shift()` was called on a store with no stateful properties.
    NoStatefulProperties,
    /// Configuration rejected by [`StoreConfig::validate`](crate::StoreConfig::validate).
    InvalidConfig {
        /// Why the configuration is invalid.
        reason: String,
    },
    /// An operation needed an `(element, side)` entry that does not exist.
    MissingEntry {
        /// Element that was looked up.
        element: ElementId,
        /// Side that was looked up.
        side: Side,
    },
    /// A point map referenced a quadrature point past the end of a container.
    PointOutOfRange {
        /// Element whose container was indexed.
        element: ElementId,
        /// Offending point index.
        point: usize,
        /// Number of points actually stored.
        len: usize,
    },
    /// A coarsening map named a child outside the supplied children.
    UnknownChild {
        /// Child index from the map.
        child: usize,
        /// Number of children supplied.
        count: usize,
    },
    /// An evaluator's stateful initializer failed.
    EvaluatorFailed {
        /// Display form of the evaluator's declarer.
        declarer: String,
        /// The error it returned.
        reason: Box<StorageError>,
    },
    /// Failure reported by evaluator code itself.
    Evaluation {
        /// Human-readable description.
        reason: String,
    },
    /// An element-loop worker could not be started.
    WorkerSpawn {
        /// The OS error message.
        reason: String,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(e) => write!(f, "{e}"),
            Self::NoStatefulProperties => {
                write!(f, "no stateful properties to shift")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid store config: {reason}"),
            Self::MissingEntry { element, side } => {
                write!(f, "no property entry for element {element} ({side})")
            }
            Self::PointOutOfRange {
                element,
                point,
                len,
            } => {
                write!(
                    f,
                    "point {point} out of range for element {element} with {len} points"
                )
            }
            Self::UnknownChild { child, count } => {
                write!(f, "coarsening map names child {child} of {count}")
            }
            Self::EvaluatorFailed { declarer, reason } => {
                write!(f, "stateful init of {declarer} failed: {reason}")
            }
            Self::Evaluation { reason } => write!(f, "evaluation failed: {reason}"),
            Self::WorkerSpawn { reason } => {
                write!(f, "failed to spawn element worker: {reason}")
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Property(e) => Some(e),
            Self::EvaluatorFailed { reason, .. } => Some(reason.as_ref()),
            _ => None,
        }
    }
}

impl From<PropertyError> for StorageError {
    fn from(e: PropertyError) -> Self {
        Self::Property(e)
    }
}
