//! Reusable evaluator test fixtures.
//!
//! Four standard evaluators for store and restart testing:
//!
//! - [`ConstantInit`]: seeds each declared property with a constant.
//! - [`LazyHistoryInit`]: asks for old values of a property nobody declared stateful.
//! - [`ForcedInit`]: owns no history but still wants its initializer run.
//! - [`FailingInit`]: fails deterministically after N calls.

use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_core::{Declarer, PropertyType, TimeState};
use kiln_storage::{EvaluationContext, PropertyEvaluator, StatefulPropertyStore, StorageError};

use crate::fill;

/// One property seeded by [`ConstantInit`].
#[derive(Clone, Debug)]
pub struct SeededProperty {
    pub name: String,
    pub ty: PropertyType,
    pub state: TimeState,
    pub value: f64,
}

/// Declares properties and seeds each with a constant value.
///
/// Useful for checking that seeded current values reach the old and
/// older states, and that restored declarers are skipped.
pub struct ConstantInit {
    pub declarer: Declarer,
    pub properties: Vec<SeededProperty>,
    calls: AtomicUsize,
}

impl ConstantInit {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            declarer: Declarer::new(kind, name),
            properties: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add a property with history depth `state`, seeded with `value`.
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        ty: PropertyType,
        state: TimeState,
        value: f64,
    ) -> Self {
        self.properties.push(SeededProperty {
            name: name.into(),
            ty,
            state,
            value,
        });
        self
    }

    /// Declare every property in `store` up front, as a solver does at setup.
    pub fn register(&self, store: &StatefulPropertyStore) -> Result<(), StorageError> {
        for p in &self.properties {
            store.add_property(&p.name, p.ty, p.state.depth(), Some(&self.declarer))?;
        }
        Ok(())
    }

    /// Number of times the initializer ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl PropertyEvaluator for ConstantInit {
    fn declarer(&self) -> &Declarer {
        &self.declarer
    }

    fn has_stateful_properties(&self) -> bool {
        self.properties.iter().any(|p| p.state > TimeState::Current)
    }

    fn init_stateful_properties(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        for p in &self.properties {
            fill(ctx.declare_property(&p.name, p.ty)?, p.value)?;
            if p.state > TimeState::Current {
                ctx.get_property(&p.name, p.ty, p.state)?;
            }
        }
        Ok(())
    }
}

/// Seeds `source` and requests its old values, making it stateful
/// during initialization rather than at setup.
pub struct LazyHistoryInit {
    pub declarer: Declarer,
    pub source: String,
    pub value: f64,
}

impl LazyHistoryInit {
    pub fn new(source: impl Into<String>, value: f64) -> Self {
        Self {
            declarer: Declarer::new("Kernel", "lazy"),
            source: source.into(),
            value,
        }
    }
}

impl PropertyEvaluator for LazyHistoryInit {
    fn declarer(&self) -> &Declarer {
        &self.declarer
    }

    fn has_stateful_properties(&self) -> bool {
        false
    }

    fn force_stateful_init(&self) -> bool {
        true
    }

    fn init_stateful_properties(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), StorageError> {
        fill(ctx.declare_property(&self.source, PropertyType::scalar())?, self.value)?;
        ctx.get_property_old(&self.source, PropertyType::scalar())?;
        Ok(())
    }
}

/// Writes a non-stateful property other initializers read.
pub struct ForcedInit {
    pub declarer: Declarer,
    pub name: String,
    pub value: f64,
    calls: AtomicUsize,
}

impl ForcedInit {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            declarer: Declarer::new("Material", "forced"),
            name: name.into(),
            value,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the initializer ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl PropertyEvaluator for ForcedInit {
    fn declarer(&self) -> &Declarer {
        &self.declarer
    }

    fn has_stateful_properties(&self) -> bool {
        false
    }

    fn force_stateful_init(&self) -> bool {
        true
    }

    fn init_stateful_properties(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        fill(ctx.declare_property(&self.name, PropertyType::scalar())?, self.value)?;
        Ok(())
    }
}

/// Fails after a configurable number of successful calls.
///
/// Useful for testing error propagation out of initialization and
/// element loops.
pub struct FailingInit {
    pub declarer: Declarer,
    call_count: AtomicUsize,
    fail_after: usize,
}

impl FailingInit {
    pub fn new(fail_after: usize) -> Self {
        Self {
            declarer: Declarer::new("Material", "failing"),
            call_count: AtomicUsize::new(0),
            fail_after,
        }
    }
}

impl PropertyEvaluator for FailingInit {
    fn declarer(&self) -> &Declarer {
        &self.declarer
    }

    fn has_stateful_properties(&self) -> bool {
        true
    }

    fn init_stateful_properties(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), StorageError> {
        let count = self.call_count.fetch_add(1, Ordering::Relaxed);
        if count >= self.fail_after {
            return Err(StorageError::Evaluation {
                reason: format!("failed at element {} (call {count})", ctx.element()),
            });
        }
        Ok(())
    }
}
