//! Type-erased per-element value containers.
//!
//! A [`PropertyValues`] holds one property's values at every quadrature
//! point of one element side. The representation (plain or dual) is
//! erased behind [`PointData`]; typed views check shape and
//! representation on every access and fail with
//! [`PropertyError::ShapeMismatch`] rather than reinterpreting storage.

use kiln_core::{Numeric, PointData, Points, PropertyError, PropertyId, PropertyType, Repr, ValueKind};

/// One property's values for every quadrature point of one element side.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyValues {
    id: PropertyId,
    data: PointData,
}

impl PropertyValues {
    /// Value-initialised container for `n` points.
    pub fn new(id: PropertyId, ty: PropertyType, n: usize) -> Self {
        Self {
            id,
            data: PointData::new(ty, n),
        }
    }

    /// Wrap existing point data.
    pub fn from_data(id: PropertyId, data: PointData) -> Self {
        Self { id, data }
    }

    /// Property this container belongs to.
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// Per-point shape.
    pub fn kind(&self) -> ValueKind {
        self.data.kind()
    }

    /// Numeric representation.
    pub fn repr(&self) -> Repr {
        self.data.repr()
    }

    /// Shape and representation together.
    pub fn property_type(&self) -> PropertyType {
        PropertyType {
            kind: self.kind(),
            repr: self.repr(),
        }
    }

    /// Number of quadrature points.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the container holds no points.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw point data.
    pub fn data(&self) -> &PointData {
        &self.data
    }

    /// Grow or shrink to `n` points; new points are value-initialised.
    /// Resizing to the current size is a no-op.
    pub fn resize(&mut self, n: usize) {
        self.data.resize(n);
    }

    /// Copy point `from` of `source` into point `to`.
    ///
    /// `source` must hold the same property with the same shape. Copying
    /// a dual container into a plain one keeps only primal values.
    pub fn copy_point(&mut self, to: usize, source: &PropertyValues, from: usize) {
        debug_assert_eq!(self.id, source.id, "copy_point across properties");
        self.data.copy_point(to, &source.data, from);
    }

    /// Exchange contents with `other`.
    ///
    /// Both containers must belong to the same property and shape. With
    /// equal representations the storage is exchanged in O(1). Otherwise
    /// `other` is copied point by point into `self` (converting as in
    /// [`copy_point`](Self::copy_point)) and `other` is left untouched.
    pub fn swap(&mut self, other: &mut PropertyValues) {
        debug_assert_eq!(self.id, other.id, "swap across properties");
        debug_assert_eq!(self.kind(), other.kind(), "swap across shapes");
        if self.repr() == other.repr() {
            std::mem::swap(&mut self.data, &mut other.data);
            return;
        }
        self.data.resize(other.len());
        for qp in 0..other.len() {
            self.data.copy_point(qp, &other.data, qp);
        }
    }

    /// An empty-valued plain container of the same property and shape.
    pub fn clone_plain(&self, n: usize) -> PropertyValues {
        Self::new(self.id, PropertyType::plain(self.kind()), n)
    }

    /// A plain copy of every point.
    pub fn to_plain(&self) -> PropertyValues {
        Self::from_data(self.id, PointData::Plain(self.data.to_plain()))
    }

    /// Consume into plain form, reusing storage if already plain.
    pub fn into_plain(self) -> PropertyValues {
        if self.repr() == Repr::Plain {
            return self;
        }
        self.to_plain()
    }

    // ── Typed views ─────────────────────────────────────────────

    /// All points in representation `N`.
    pub fn points<N: Numeric>(&self) -> Result<&Points<N>, PropertyError> {
        let requested = requested::<N>(self.kind());
        N::points(&self.data).ok_or_else(|| shape_mismatch(self.id, self.property_type(), requested))
    }

    /// Mutable variant of [`points`](Self::points).
    pub fn points_mut<N: Numeric>(&mut self) -> Result<&mut Points<N>, PropertyError> {
        let (id, stored) = (self.id, self.property_type());
        N::points_mut(&mut self.data)
            .ok_or_else(|| shape_mismatch(id, stored, requested::<N>(stored.kind)))
    }

    fn checked<N: Numeric>(&self, want: ValueKind) -> Result<&Points<N>, PropertyError> {
        match N::points(&self.data) {
            Some(p) if same_shape(p.kind(), want) => Ok(p),
            _ => Err(shape_mismatch(self.id, self.property_type(), requested::<N>(want))),
        }
    }

    fn checked_mut<N: Numeric>(&mut self, want: ValueKind) -> Result<&mut Points<N>, PropertyError> {
        let (id, stored) = (self.id, self.property_type());
        match N::points_mut(&mut self.data) {
            Some(p) if same_shape(p.kind(), want) => Ok(p),
            _ => Err(shape_mismatch(id, stored, requested::<N>(want))),
        }
    }

    /// Scalar values, one per point.
    pub fn scalars<N: Numeric>(&self) -> Result<&[N], PropertyError> {
        self.checked::<N>(ValueKind::Scalar)
            .map(|p| p.as_flat().unwrap_or_default())
    }

    /// Mutable scalar values.
    pub fn scalars_mut<N: Numeric>(&mut self) -> Result<&mut [N], PropertyError> {
        self.checked_mut::<N>(ValueKind::Scalar)
            .map(|p| p.as_flat_mut().unwrap_or_default())
    }

    /// Components of the vector at point `qp`.
    ///
    /// # Panics
    ///
    /// Panics if `qp` is out of range.
    pub fn vector<N: Numeric>(&self, qp: usize) -> Result<&[N], PropertyError> {
        Ok(self.checked::<N>(ValueKind::Vector { dims: 0 })?.point(qp))
    }

    /// Mutable components of the vector at point `qp`.
    pub fn vector_mut<N: Numeric>(&mut self, qp: usize) -> Result<&mut [N], PropertyError> {
        Ok(self.checked_mut::<N>(ValueKind::Vector { dims: 0 })?.point_mut(qp))
    }

    /// Row-major entries of the tensor at point `qp`.
    pub fn tensor<N: Numeric>(&self, qp: usize) -> Result<&[N], PropertyError> {
        Ok(self
            .checked::<N>(ValueKind::Tensor { rows: 0, cols: 0 })?
            .point(qp))
    }

    /// Mutable row-major entries of the tensor at point `qp`.
    pub fn tensor_mut<N: Numeric>(&mut self, qp: usize) -> Result<&mut [N], PropertyError> {
        Ok(self
            .checked_mut::<N>(ValueKind::Tensor { rows: 0, cols: 0 })?
            .point_mut(qp))
    }

    /// The list stored at point `qp`.
    pub fn sequence<N: Numeric>(&self, qp: usize) -> Result<&[N], PropertyError> {
        Ok(self.checked::<N>(ValueKind::Sequence)?.point(qp))
    }

    /// The growable list stored at point `qp`.
    ///
    /// # Panics
    ///
    /// Panics if `qp` is out of range.
    pub fn sequence_mut<N: Numeric>(&mut self, qp: usize) -> Result<&mut Vec<N>, PropertyError> {
        let (id, stored) = (self.id, self.property_type());
        match self.checked_mut::<N>(ValueKind::Sequence)? {
            Points::Sequence(v) => Ok(&mut v[qp]),
            _ => Err(shape_mismatch(id, stored, requested::<N>(ValueKind::Sequence))),
        }
    }
}

fn requested<N: Numeric>(kind: ValueKind) -> PropertyType {
    PropertyType {
        kind,
        repr: N::REPR,
    }
}

/// Shapes match by variant; dimensions are the container's business.
fn same_shape(a: ValueKind, b: ValueKind) -> bool {
    std::mem::discriminant(&a) == std::mem::discriminant(&b)
}

fn shape_mismatch(id: PropertyId, stored: PropertyType, requested: PropertyType) -> PropertyError {
    PropertyError::ShapeMismatch {
        property: id,
        stored: stored.to_string(),
        requested: requested.to_string(),
    }
}
