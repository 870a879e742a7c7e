//! Quadrature-point correspondence tables for mesh adaptivity.
//!
//! The mesh layer computes these maps; the store only follows them when
//! prolonging parent values onto children or restricting child values
//! back onto a parent.

use kiln_core::ElementId;

/// Copy source point `source` into destination point `destination`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointMap {
    /// Point index on the receiving element.
    pub destination: usize,
    /// Point index on the providing element.
    pub source: usize,
}

/// How one child of a refined element maps onto its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildMap {
    /// The child element.
    pub element: ElementId,
    /// Whether this process owns the child. Non-local children are skipped.
    pub locally_owned: bool,
    /// Child point ← parent point pairs.
    pub points: Vec<PointMap>,
}

impl ChildMap {
    /// A locally owned child where child point `i` takes parent point `sources[i]`.
    pub fn new(element: ElementId, sources: impl IntoIterator<Item = usize>) -> Self {
        Self {
            element,
            locally_owned: true,
            points: sources
                .into_iter()
                .enumerate()
                .map(|(destination, source)| PointMap {
                    destination,
                    source,
                })
                .collect(),
        }
    }

    /// Mark the child as owned by another process.
    pub fn remote(mut self) -> Self {
        self.locally_owned = false;
        self
    }
}

/// Parent → children point maps for one refinement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefinementMap {
    /// One map per child, in the mesh's child order.
    pub children: Vec<ChildMap>,
}

impl RefinementMap {
    /// Build from per-child maps.
    pub fn new(children: Vec<ChildMap>) -> Self {
        Self { children }
    }
}

/// Where one parent point takes its value from after coarsening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoarseningPoint {
    /// Index into the children slice passed to the restriction.
    pub child: usize,
    /// Point index on that child.
    pub source: usize,
}

/// Children → parent point map; entry `i` fills parent point `i`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoarseningMap {
    /// One entry per parent point.
    pub points: Vec<CoarseningPoint>,
}

impl CoarseningMap {
    /// Build from `(child, source)` pairs, one per parent point.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        Self {
            points: pairs
                .into_iter()
                .map(|(child, source)| CoarseningPoint { child, source })
                .collect(),
        }
    }

    /// Number of parent points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the map covers no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
