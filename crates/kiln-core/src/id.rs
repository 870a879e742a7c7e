//! Strongly-typed identifiers, time states and element sides.

use std::fmt;

use crate::error::PropertyError;

/// Identifies a property registered in a [`PropertyRegistry`](crate::PropertyRegistry).
///
/// Ids are assigned sequentially on first registration and never change
/// or get reused for the lifetime of the registry. `PropertyId(n)` is the
/// n-th name the registry has seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

impl PropertyId {
    /// The id as a vector index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PropertyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Position of a stateful property in a store's stateful layout.
///
/// Only properties that requested an old or older value get a stateful
/// index. Indices are handed out in request order and are stable for the
/// lifetime of the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatefulIndex(pub u32);

impl StatefulIndex {
    /// The index as a vector index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StatefulIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StatefulIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Stable identity of a mesh element.
///
/// Encodes a slot index in the upper 32 bits and a generation counter in
/// the lower 32 bits, as handed out by
/// [`ElementHandles`](crate::ElementHandles). Two handles for the same slot
/// but different generations never compare equal, so an element id that
/// outlives its element cannot alias a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Build an id from a slot and a generation.
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self(((slot as u64) << 32) | generation as u64)
    }

    /// Reconstruct an id from its raw 64-bit encoding.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit encoding, as written to checkpoints.
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Slot index component.
    pub const fn slot(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Generation component.
    pub const fn generation(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.slot(), self.generation())
    }
}

/// Which part of an element a set of quadrature points lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    /// Interior (volumetric) quadrature.
    Volume,
    /// Quadrature on the n-th face of the element.
    Face(u16),
}

impl Side {
    /// Raw encoding used in checkpoints. `u32::MAX` marks the volume.
    pub const VOLUME_RAW: u32 = u32::MAX;

    /// Encode as a `u32` side index.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Volume => Self::VOLUME_RAW,
            Self::Face(n) => n as u32,
        }
    }

    /// Decode a raw side index. Returns `None` for indices that are
    /// neither the volume marker nor a valid face number.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw == Self::VOLUME_RAW {
            return Some(Self::Volume);
        }
        u16::try_from(raw).ok().map(Self::Face)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::Face(n) => write!(f, "face {n}"),
        }
    }
}

/// Deepest supported history: current, old and older.
pub const MAX_STATE: u32 = 2;

/// A point in a property's time history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeState {
    /// Value at the time step being solved.
    Current,
    /// Value at the previous converged step.
    Old,
    /// Value two converged steps back.
    Older,
}

impl TimeState {
    /// All states, shallowest first.
    pub const ALL: [TimeState; 3] = [Self::Current, Self::Old, Self::Older];

    /// Numeric depth of this state (0, 1 or 2).
    pub const fn depth(self) -> u32 {
        match self {
            Self::Current => 0,
            Self::Old => 1,
            Self::Older => 2,
        }
    }

    /// Depth as a vector index.
    pub const fn index(self) -> usize {
        self.depth() as usize
    }

    /// Convert a numeric depth, rejecting anything deeper than [`MAX_STATE`].
    ///
    /// `property` is only used to label the error.
    pub fn from_depth(depth: u32, property: &str) -> Result<Self, PropertyError> {
        match depth {
            0 => Ok(Self::Current),
            1 => Ok(Self::Old),
            2 => Ok(Self::Older),
            _ => Err(PropertyError::UnsupportedStateDepth {
                property: property.to_string(),
                requested: depth,
                max: MAX_STATE,
            }),
        }
    }

    /// States from `Current` up to and including `self`.
    pub fn up_to(self) -> &'static [TimeState] {
        &Self::ALL[..=self.index()]
    }
}

impl fmt::Display for TimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Old => write!(f, "old"),
            Self::Older => write!(f, "older"),
        }
    }
}

/// The object that declared a property: its type and instance name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Declarer {
    /// Object type, e.g. `"PlasticityEvaluator"`.
    pub kind: String,
    /// Instance name as given in the input.
    pub name: String,
}

impl Declarer {
    /// Create a declarer from its type and instance name.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Declarer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_id_packs_slot_and_generation() {
        let id = ElementId::new(7, 3);
        assert_eq!(id.slot(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(ElementId::from_raw(id.to_raw()), id);
        assert_ne!(ElementId::new(7, 4), id);
    }

    #[test]
    fn side_raw_encoding() {
        assert_eq!(Side::Volume.to_raw(), u32::MAX);
        assert_eq!(Side::from_raw(u32::MAX), Some(Side::Volume));
        assert_eq!(Side::from_raw(3), Some(Side::Face(3)));
        assert_eq!(Side::from_raw(1 << 20), None);
    }

    #[test]
    fn time_state_depth_limit() {
        assert_eq!(TimeState::from_depth(2, "p").unwrap(), TimeState::Older);
        let err = TimeState::from_depth(3, "stress").unwrap_err();
        assert_eq!(
            err,
            PropertyError::UnsupportedStateDepth {
                property: "stress".into(),
                requested: 3,
                max: 2,
            }
        );
    }

    #[test]
    fn up_to_includes_self() {
        assert_eq!(TimeState::Current.up_to(), &[TimeState::Current]);
        assert_eq!(TimeState::Older.up_to().len(), 3);
    }
}
