//! Error types shared by every Kiln crate.
//!
//! [`PropertyError`] covers naming, typing and state-depth failures.
//! Storage and checkpoint crates wrap it in their own error enums.

use std::error::Error;
use std::fmt;

use crate::id::PropertyId;

/// Errors raised when registering, declaring or accessing a property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyError {
    /// No property with this name has been registered.
    NotFound {
        /// The name that was looked up.
        name: String,
    },
    /// An id outside the registry's range.
    UnknownId {
        /// The id that was looked up.
        id: PropertyId,
    },
    /// A property was declared or requested with a type that differs
    /// from its first declaration.
    TypeMismatch {
        /// Property name.
        property: String,
        /// Type fixed by the first declaration.
        declared: String,
        /// Type of the conflicting request.
        requested: String,
    },
    /// A container was accessed through a view of the wrong shape or
    /// representation.
    ShapeMismatch {
        /// Id of the accessed container.
        property: PropertyId,
        /// Shape actually stored.
        stored: String,
        /// Shape the caller asked for.
        requested: String,
    },
    /// A history deeper than older was requested.
    UnsupportedStateDepth {
        /// Property name.
        property: String,
        /// Depth that was asked for.
        requested: u32,
        /// Deepest supported depth.
        max: u32,
    },
    /// A vector or tensor shape with no components.
    EmptyShape {
        /// Property name.
        property: String,
        /// The rejected type.
        ty: String,
    },
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "no property named '{name}'"),
            Self::UnknownId { id } => write!(f, "unknown property id {id}"),
            Self::TypeMismatch {
                property,
                declared,
                requested,
            } => {
                write!(
                    f,
                    "property '{property}' declared as {declared} but requested as {requested}"
                )
            }
            Self::ShapeMismatch {
                property,
                stored,
                requested,
            } => {
                write!(
                    f,
                    "property {property} holds {stored} values, not {requested}"
                )
            }
            Self::UnsupportedStateDepth {
                property,
                requested,
                max,
            } => {
                write!(
                    f,
                    "property '{property}' requested state {requested}, deepest supported is {max}"
                )
            }
            Self::EmptyShape { property, ty } => {
                write!(f, "property '{property}' declared with empty shape {ty}")
            }
        }
    }
}

impl Error for PropertyError {}
