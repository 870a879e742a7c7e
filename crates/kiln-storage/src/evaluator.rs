//! The interface physics objects implement to take part in stateful init.

use kiln_core::Declarer;

use crate::context::EvaluationContext;
use crate::error::StorageError;

/// A physics object that computes property values.
///
/// The store only needs to know who the evaluator is, whether it owns
/// history-carrying properties, and how to seed them on a fresh element.
/// How values are computed is up to the implementation.
///
/// Implementations must be `Send + Sync`: element loops call
/// [`init_stateful_properties`](Self::init_stateful_properties) from
/// several workers at once, each with its own scratch buffer.
pub trait PropertyEvaluator: Send + Sync {
    /// Type and instance name recorded on every property this object declares.
    fn declarer(&self) -> &Declarer;

    /// Whether any property this object declares keeps old or older values.
    fn has_stateful_properties(&self) -> bool;

    /// Run the stateful initializer even without stateful properties.
    ///
    /// Objects that seed non-stateful values other objects read during
    /// their own initialization return `true` here.
    fn force_stateful_init(&self) -> bool {
        false
    }

    /// Seed current-state values for every quadrature point of
    /// [`ctx.element()`](EvaluationContext::element).
    ///
    /// The store copies the seeded current values into the old and older
    /// states afterwards. Initializers may request old values of
    /// properties that were not stateful before; the store picks up the
    /// new layout before copying.
    fn init_stateful_properties(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), StorageError>;
}
