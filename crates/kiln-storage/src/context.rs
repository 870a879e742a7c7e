//! Evaluator-facing access to scratch values.
//!
//! Evaluators never touch the store directly. They get an
//! [`EvaluationContext`] wrapping the worker's scratch buffer and a
//! narrow [`StatefulDeclarations`] capability: enough to declare and
//! request properties, nothing that swaps, shifts or erases storage.

use kiln_core::{Declarer, ElementId, PropertyError, PropertyId, PropertyType, Side, TimeState};

use crate::container::PropertyValues;
use crate::error::StorageError;
use crate::scratch::ScratchPropertyBuffer;

/// Registration capability handed to evaluators.
pub trait StatefulDeclarations: Send + Sync {
    /// Register `name` with `ty`, raising its history depth to `state`.
    fn declare(
        &self,
        name: &str,
        ty: PropertyType,
        state: TimeState,
        declarer: Option<&Declarer>,
    ) -> Result<PropertyId, StorageError>;

    /// Id and declared type of a property, if it has been declared.
    fn declared(&self, name: &str) -> Option<(PropertyId, PropertyType)>;
}

/// Per-element view evaluators read and write values through.
pub struct EvaluationContext<'a> {
    store: &'a dyn StatefulDeclarations,
    scratch: &'a mut ScratchPropertyBuffer,
    declarer: &'a Declarer,
    element: ElementId,
    side: Side,
}

impl<'a> EvaluationContext<'a> {
    /// Create a context for `declarer` evaluating `(element, side)`.
    pub fn new(
        store: &'a dyn StatefulDeclarations,
        scratch: &'a mut ScratchPropertyBuffer,
        declarer: &'a Declarer,
        element: ElementId,
        side: Side,
    ) -> Self {
        Self {
            store,
            scratch,
            declarer,
            element,
            side,
        }
    }

    /// Element being evaluated.
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Side being evaluated.
    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of quadrature points.
    pub fn n_qpoints(&self) -> usize {
        self.scratch.n_qpoints()
    }

    /// The evaluator this context was made for.
    pub fn declarer(&self) -> &Declarer {
        self.declarer
    }

    /// Declare `name` as produced by this evaluator and return its
    /// current-state values for writing.
    pub fn declare_property(
        &mut self,
        name: &str,
        ty: PropertyType,
    ) -> Result<&mut PropertyValues, StorageError> {
        let id = self
            .store
            .declare(name, ty, TimeState::Current, Some(self.declarer))?;
        Ok(self.scratch.ensure(TimeState::Current, id, ty))
    }

    /// Values of `name` in `state`, registering the property and raising
    /// its history depth if needed.
    ///
    /// Old and older values are always plain, whatever `ty.repr` says.
    pub fn get_property(
        &mut self,
        name: &str,
        ty: PropertyType,
        state: TimeState,
    ) -> Result<&mut PropertyValues, StorageError> {
        let id = self.store.declare(name, ty, state, None)?;
        let scratch_ty = match state {
            TimeState::Current => ty,
            _ => PropertyType::plain(ty.kind),
        };
        Ok(self.scratch.ensure(state, id, scratch_ty))
    }

    /// Shorthand for [`get_property`](Self::get_property) at [`TimeState::Old`].
    pub fn get_property_old(
        &mut self,
        name: &str,
        ty: PropertyType,
    ) -> Result<&mut PropertyValues, StorageError> {
        self.get_property(name, ty, TimeState::Old)
    }

    /// Shorthand for [`get_property`](Self::get_property) at [`TimeState::Older`].
    pub fn get_property_older(
        &mut self,
        name: &str,
        ty: PropertyType,
    ) -> Result<&mut PropertyValues, StorageError> {
        self.get_property(name, ty, TimeState::Older)
    }

    /// Whether `name` has been declared in the store.
    pub fn has_property(&self, name: &str) -> bool {
        self.store.declared(name).is_some()
    }

    /// Read-only values of an already declared property.
    pub fn values(&self, name: &str, state: TimeState) -> Result<&PropertyValues, StorageError> {
        let not_found = || PropertyError::NotFound {
            name: name.to_string(),
        };
        let (id, _) = self.store.declared(name).ok_or_else(not_found)?;
        Ok(self.scratch.get(state, id).ok_or_else(not_found)?)
    }
}
