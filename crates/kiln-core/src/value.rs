//! Value shapes, numeric representations and per-point storage.
//!
//! A property's type is a [`ValueKind`] (the shape of one quadrature-point
//! value) plus a [`Repr`] (plain `f64` or forward-mode [`Dual`]). Values for
//! all points of one element live in a [`Points`] array, and [`PointData`]
//! erases the representation so containers can be stored side by side.

use std::fmt;

use smallvec::SmallVec;

/// Shape of a single quadrature-point value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// One number per point.
    Scalar,
    /// A fixed-length vector per point.
    Vector {
        /// Number of components (e.g. 3 for a displacement).
        dims: u32,
    },
    /// A fixed-size dense matrix per point, stored row-major.
    Tensor {
        /// Number of rows.
        rows: u32,
        /// Number of columns.
        cols: u32,
    },
    /// A variable-length list of numbers per point.
    Sequence,
}

impl ValueKind {
    /// Number of stored numbers per point, or `None` for sequences.
    pub fn components(&self) -> Option<usize> {
        match self {
            Self::Scalar => Some(1),
            Self::Vector { dims } => Some(*dims as usize),
            Self::Tensor { rows, cols } => Some(*rows as usize * *cols as usize),
            Self::Sequence => None,
        }
    }

    /// Wire tag identifying the shape in checkpoint value blocks.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Scalar => 0,
            Self::Vector { .. } => 1,
            Self::Tensor { .. } => 2,
            Self::Sequence => 3,
        }
    }

    /// Canonical type string, e.g. `"vector<3>"` or `"tensor<3x3>"`.
    pub fn type_name(&self) -> String {
        match self {
            Self::Scalar => "scalar".to_string(),
            Self::Vector { dims } => format!("vector<{dims}>"),
            Self::Tensor { rows, cols } => format!("tensor<{rows}x{cols}>"),
            Self::Sequence => "sequence".to_string(),
        }
    }

    /// Parse a string produced by [`type_name`](Self::type_name).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "scalar" => return Some(Self::Scalar),
            "sequence" => return Some(Self::Sequence),
            _ => {}
        }
        if let Some(inner) = name.strip_prefix("vector<").and_then(|s| s.strip_suffix('>')) {
            return inner.parse().ok().map(|dims| Self::Vector { dims });
        }
        let inner = name.strip_prefix("tensor<")?.strip_suffix('>')?;
        let (rows, cols) = inner.split_once('x')?;
        Some(Self::Tensor {
            rows: rows.parse().ok()?,
            cols: cols.parse().ok()?,
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

/// Numeric representation of stored values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Repr {
    /// Plain `f64` values.
    Plain,
    /// Values carrying derivative information ([`Dual`]).
    Dual,
}

/// Full type of a property: shape plus representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyType {
    /// Per-point shape.
    pub kind: ValueKind,
    /// Representation the current state is evaluated in.
    pub repr: Repr,
}

impl PropertyType {
    /// Plain scalar.
    pub const fn scalar() -> Self {
        Self::plain(ValueKind::Scalar)
    }

    /// Plain fixed-length vector.
    pub const fn vector(dims: u32) -> Self {
        Self::plain(ValueKind::Vector { dims })
    }

    /// Plain fixed-size tensor.
    pub const fn tensor(rows: u32, cols: u32) -> Self {
        Self::plain(ValueKind::Tensor { rows, cols })
    }

    /// Plain variable-length sequence.
    pub const fn sequence() -> Self {
        Self::plain(ValueKind::Sequence)
    }

    /// Plain representation of `kind`.
    pub const fn plain(kind: ValueKind) -> Self {
        Self {
            kind,
            repr: Repr::Plain,
        }
    }

    /// The same shape in the differentiable representation.
    pub const fn dual(self) -> Self {
        Self {
            kind: self.kind,
            repr: Repr::Dual,
        }
    }

    /// Whether the differentiable representation was requested.
    pub fn is_dual(&self) -> bool {
        self.repr == Repr::Dual
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            Repr::Plain => write!(f, "{}", self.kind),
            Repr::Dual => write!(f, "dual {}", self.kind),
        }
    }
}

// ── Numeric types ───────────────────────────────────────────────

/// A forward-mode dual number: a value and its partial derivatives.
///
/// Up to four derivative slots are stored inline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dual {
    /// Primal value.
    pub value: f64,
    /// Partial derivatives with respect to the active unknowns.
    pub derivs: SmallVec<[f64; 4]>,
}

impl Dual {
    /// A dual number with the given derivatives.
    pub fn new(value: f64, derivs: impl IntoIterator<Item = f64>) -> Self {
        Self {
            value,
            derivs: derivs.into_iter().collect(),
        }
    }

    /// A dual number with no derivative information.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            derivs: SmallVec::new(),
        }
    }

    /// Partial derivatives.
    pub fn derivatives(&self) -> &[f64] {
        &self.derivs
    }
}

/// Numbers that can be stored in a [`Points`] array.
pub trait Numeric: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Representation tag for this type.
    const REPR: Repr;

    /// The plain value, dropping any derivative information.
    fn primal(&self) -> f64;

    /// Lift a plain value (derivatives start at zero).
    fn from_primal(value: f64) -> Self;

    /// Borrow `data` as points of this type, if the representation matches.
    fn points(data: &PointData) -> Option<&Points<Self>>;

    /// Mutable variant of [`points`](Self::points).
    fn points_mut(data: &mut PointData) -> Option<&mut Points<Self>>;
}

impl Numeric for f64 {
    const REPR: Repr = Repr::Plain;

    fn primal(&self) -> f64 {
        *self
    }

    fn from_primal(value: f64) -> Self {
        value
    }

    fn points(data: &PointData) -> Option<&Points<Self>> {
        match data {
            PointData::Plain(p) => Some(p),
            PointData::Dual(_) => None,
        }
    }

    fn points_mut(data: &mut PointData) -> Option<&mut Points<Self>> {
        match data {
            PointData::Plain(p) => Some(p),
            PointData::Dual(_) => None,
        }
    }
}

impl Numeric for Dual {
    const REPR: Repr = Repr::Dual;

    fn primal(&self) -> f64 {
        self.value
    }

    fn from_primal(value: f64) -> Self {
        Self::constant(value)
    }

    fn points(data: &PointData) -> Option<&Points<Self>> {
        match data {
            PointData::Dual(p) => Some(p),
            PointData::Plain(_) => None,
        }
    }

    fn points_mut(data: &mut PointData) -> Option<&mut Points<Self>> {
        match data {
            PointData::Dual(p) => Some(p),
            PointData::Plain(_) => None,
        }
    }
}

// ── Points ──────────────────────────────────────────────────────

/// Values for every quadrature point of one element, for one property.
///
/// Fixed shapes are stored flat (`n_points * components` numbers);
/// sequences keep one `Vec` per point.
#[derive(Clone, Debug, PartialEq)]
pub enum Points<N> {
    /// One number per point.
    Scalar(Vec<N>),
    /// `dims` numbers per point.
    Vector {
        /// Components per point.
        dims: u32,
        /// Flat storage.
        data: Vec<N>,
    },
    /// `rows * cols` numbers per point, row-major.
    Tensor {
        /// Rows per point.
        rows: u32,
        /// Columns per point.
        cols: u32,
        /// Flat storage.
        data: Vec<N>,
    },
    /// A list per point.
    Sequence(Vec<Vec<N>>),
}

impl<N: Numeric> Points<N> {
    /// Value-initialised storage for `n` points of shape `kind`.
    pub fn new(kind: ValueKind, n: usize) -> Self {
        match kind {
            ValueKind::Scalar => Self::Scalar(vec![N::default(); n]),
            ValueKind::Vector { dims } => Self::Vector {
                dims,
                data: vec![N::default(); n * dims as usize],
            },
            ValueKind::Tensor { rows, cols } => Self::Tensor {
                rows,
                cols,
                data: vec![N::default(); n * rows as usize * cols as usize],
            },
            ValueKind::Sequence => Self::Sequence(vec![Vec::new(); n]),
        }
    }

    /// Shape of each point.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Vector { dims, .. } => ValueKind::Vector { dims: *dims },
            Self::Tensor { rows, cols, .. } => ValueKind::Tensor {
                rows: *rows,
                cols: *cols,
            },
            Self::Sequence(_) => ValueKind::Sequence,
        }
    }

    fn stride(&self) -> usize {
        self.kind().components().unwrap_or(1).max(1)
    }

    /// Number of quadrature points.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalar(v) => v.len(),
            Self::Vector { data, .. } | Self::Tensor { data, .. } => data.len() / self.stride(),
            Self::Sequence(v) => v.len(),
        }
    }

    /// Returns `true` if there are no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to `n` points. New points are value-initialised.
    pub fn resize(&mut self, n: usize) {
        let stride = self.stride();
        match self {
            Self::Scalar(v) => v.resize(n, N::default()),
            Self::Vector { data, .. } | Self::Tensor { data, .. } => {
                data.resize(n * stride, N::default())
            }
            Self::Sequence(v) => v.resize(n, Vec::new()),
        }
    }

    /// The numbers making up point `qp`.
    ///
    /// # Panics
    ///
    /// Panics if `qp >= self.len()`.
    pub fn point(&self, qp: usize) -> &[N] {
        let stride = self.stride();
        match self {
            Self::Scalar(v) => std::slice::from_ref(&v[qp]),
            Self::Vector { data, .. } | Self::Tensor { data, .. } => {
                &data[qp * stride..(qp + 1) * stride]
            }
            Self::Sequence(v) => &v[qp],
        }
    }

    /// Mutable variant of [`point`](Self::point).
    ///
    /// # Panics
    ///
    /// Panics if `qp >= self.len()`.
    pub fn point_mut(&mut self, qp: usize) -> &mut [N] {
        let stride = self.stride();
        match self {
            Self::Scalar(v) => std::slice::from_mut(&mut v[qp]),
            Self::Vector { data, .. } | Self::Tensor { data, .. } => {
                &mut data[qp * stride..(qp + 1) * stride]
            }
            Self::Sequence(v) => &mut v[qp],
        }
    }

    /// The per-point list of a sequence, for pushes and truncation.
    pub fn sequence_mut(&mut self, qp: usize) -> Option<&mut Vec<N>> {
        match self {
            Self::Sequence(v) => v.get_mut(qp),
            _ => None,
        }
    }

    /// Flat storage of a fixed shape (`None` for sequences).
    pub fn as_flat(&self) -> Option<&[N]> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Vector { data, .. } | Self::Tensor { data, .. } => Some(data),
            Self::Sequence(_) => None,
        }
    }

    /// Mutable flat storage of a fixed shape.
    pub fn as_flat_mut(&mut self) -> Option<&mut [N]> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Vector { data, .. } | Self::Tensor { data, .. } => Some(data),
            Self::Sequence(_) => None,
        }
    }

    /// Copy point `from` of `src` into point `to` of `self`, converting
    /// every number with `convert`.
    ///
    /// Both arrays must have the same shape.
    pub fn copy_point_with<M: Numeric>(
        &mut self,
        to: usize,
        src: &Points<M>,
        from: usize,
        convert: impl Fn(&M) -> N,
    ) {
        debug_assert_eq!(self.kind(), src.kind(), "copy between different shapes");
        if let (Self::Sequence(dst), Points::Sequence(s)) = (&mut *self, src) {
            dst[to] = s[from].iter().map(&convert).collect();
            return;
        }
        for (d, s) in self.point_mut(to).iter_mut().zip(src.point(from)) {
            *d = convert(s);
        }
    }

    /// Convert every number, keeping the shape.
    pub fn map<M: Numeric>(&self, convert: impl Fn(&N) -> M) -> Points<M> {
        match self {
            Self::Scalar(v) => Points::Scalar(v.iter().map(convert).collect()),
            Self::Vector { dims, data } => Points::Vector {
                dims: *dims,
                data: data.iter().map(convert).collect(),
            },
            Self::Tensor { rows, cols, data } => Points::Tensor {
                rows: *rows,
                cols: *cols,
                data: data.iter().map(convert).collect(),
            },
            Self::Sequence(v) => {
                Points::Sequence(v.iter().map(|p| p.iter().map(&convert).collect()).collect())
            }
        }
    }
}

/// Per-point storage with the representation erased.
#[derive(Clone, Debug, PartialEq)]
pub enum PointData {
    /// Plain values.
    Plain(Points<f64>),
    /// Differentiable values.
    Dual(Points<Dual>),
}

impl PointData {
    /// Value-initialised storage for `n` points of type `ty`.
    pub fn new(ty: PropertyType, n: usize) -> Self {
        match ty.repr {
            Repr::Plain => Self::Plain(Points::new(ty.kind, n)),
            Repr::Dual => Self::Dual(Points::new(ty.kind, n)),
        }
    }

    /// Representation of the stored numbers.
    pub fn repr(&self) -> Repr {
        match self {
            Self::Plain(_) => Repr::Plain,
            Self::Dual(_) => Repr::Dual,
        }
    }

    /// Shape of each point.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Plain(p) => p.kind(),
            Self::Dual(p) => p.kind(),
        }
    }

    /// Number of quadrature points.
    pub fn len(&self) -> usize {
        match self {
            Self::Plain(p) => p.len(),
            Self::Dual(p) => p.len(),
        }
    }

    /// Returns `true` if there are no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to `n` points.
    pub fn resize(&mut self, n: usize) {
        match self {
            Self::Plain(p) => p.resize(n),
            Self::Dual(p) => p.resize(n),
        }
    }

    /// Copy one point across representations. Dual to plain keeps only
    /// the primal value; plain to dual starts with no derivatives.
    pub fn copy_point(&mut self, to: usize, src: &PointData, from: usize) {
        match (self, src) {
            (Self::Plain(d), Self::Plain(s)) => d.copy_point_with(to, s, from, |v| *v),
            (Self::Dual(d), Self::Dual(s)) => d.copy_point_with(to, s, from, Dual::clone),
            (Self::Plain(d), Self::Dual(s)) => d.copy_point_with(to, s, from, Dual::primal),
            (Self::Dual(d), Self::Plain(s)) => d.copy_point_with(to, s, from, |v| Dual::constant(*v)),
        }
    }

    /// A plain snapshot of all points.
    pub fn to_plain(&self) -> Points<f64> {
        match self {
            Self::Plain(p) => p.clone(),
            Self::Dual(p) => p.map(Dual::primal),
        }
    }
}
