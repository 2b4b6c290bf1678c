//! # hysim-engine::model
//!
//! The behavioral contract every leaf component provides, and the tagged
//! [`Component`] variant the graph stores. Engines dispatch on the variant
//! by match; the only downcast in the system is the `Any`-based
//! [`Component::downcast_ref`] used to read a concrete model back out of
//! a graph after a run.

use std::any::Any;

use hysim_types::pin::PinValue;
use hysim_types::time::Time;

/// A leaf DEVS component: mutable state plus the five classical
/// callbacks. The engine owns all bookkeeping (last and next event times,
/// input and output bags, schedule position); implementations hold only
/// their model state.
///
/// `ta()` must be non-negative; a negative value aborts the simulation
/// with [`SimError::NegativeTimeAdvance`](hysim_types::errors::SimError).
/// `Time::inf()` means "only input will wake me".
pub trait Atomic<X, T: Time>: Any + Send {
    /// Time to the next internal event, measured from the last event.
    fn ta(&mut self) -> T;

    /// Internal transition: the model's next-event time arrived with no
    /// input present.
    fn delta_int(&mut self);

    /// External transition: input arrived `e` time units after the last
    /// event, strictly before the next internal event.
    fn delta_ext(&mut self, e: T, xb: &[PinValue<X>]);

    /// Confluent transition: input arrived exactly at the next internal
    /// event time.
    fn delta_conf(&mut self, xb: &[PinValue<X>]);

    /// Emit output by appending pin-value pairs to `yb`. Invoked
    /// immediately before `delta_int` or `delta_conf`.
    fn output_func(&mut self, yb: &mut Vec<PinValue<X>>);

    /// Save the model state for speculative execution. `None` (the
    /// default) marks the component as unable to save state; the parallel
    /// simulator then runs its logical process without speculation.
    fn make_checkpoint(&mut self) -> Option<Box<dyn Any + Send>> {
        None
    }

    /// Restore a state previously produced by `make_checkpoint`. Must be
    /// implemented whenever `make_checkpoint` returns `Some`. Restoring
    /// must leave the externally observable event times unchanged from
    /// the engine's point of view.
    fn restore_checkpoint(&mut self, _saved: &(dyn Any + Send)) {}
}

/// A Mealy-style atomic component whose output may depend on the input
/// that triggers the transition. Mealy components may not be directly
/// coupled to other Mealy components; the simulator rejects such a
/// coupling when a value is routed between them.
///
/// Output preceding an internal event still comes from
/// [`Atomic::output_func`].
pub trait MealyAtomic<X, T: Time>: Atomic<X, T> {
    /// Produce output at `e < ta()` in response to `xb`; this is the
    /// output preceding an external event.
    fn external_output(&mut self, e: T, xb: &[PinValue<X>], yb: &mut Vec<PinValue<X>>);

    /// Produce output at `e = ta()` in response to `xb`; this is the
    /// output preceding a confluent event.
    fn confluent_output(&mut self, xb: &[PinValue<X>], yb: &mut Vec<PinValue<X>>);
}

/// The component variant stored by the graph.
pub enum Component<X, T: Time> {
    Atomic(Box<dyn Atomic<X, T>>),
    Mealy(Box<dyn MealyAtomic<X, T>>),
}

impl<X: 'static, T: Time> Component<X, T> {
    /// The behavioral surface shared by both variants.
    pub fn atomic(&self) -> &dyn Atomic<X, T> {
        match self {
            Component::Atomic(m) => m.as_ref(),
            Component::Mealy(m) => m.as_ref(),
        }
    }

    pub fn atomic_mut(&mut self) -> &mut dyn Atomic<X, T> {
        match self {
            Component::Atomic(m) => m.as_mut(),
            Component::Mealy(m) => m.as_mut(),
        }
    }

    pub fn is_mealy(&self) -> bool {
        matches!(self, Component::Mealy(_))
    }

    pub fn mealy_mut(&mut self) -> Option<&mut dyn MealyAtomic<X, T>> {
        match self {
            Component::Atomic(_) => None,
            Component::Mealy(m) => Some(m.as_mut()),
        }
    }

    /// Borrow the concrete model type back out of the variant. Used to
    /// inspect model state once a simulation has finished.
    pub fn downcast_ref<M: 'static>(&self) -> Option<&M> {
        let any: &dyn Any = match self {
            Component::Atomic(m) => m.as_ref(),
            Component::Mealy(m) => m.as_ref(),
        };
        any.downcast_ref::<M>()
    }

    pub fn downcast_mut<M: 'static>(&mut self) -> Option<&mut M> {
        let any: &mut dyn Any = match self {
            Component::Atomic(m) => m.as_mut(),
            Component::Mealy(m) => m.as_mut(),
        };
        any.downcast_mut::<M>()
    }
}
