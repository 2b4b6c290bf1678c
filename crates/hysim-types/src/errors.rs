//! # hysim-types::errors
//!
//! The error taxonomy of the simulation kernel. Every violation of the
//! model contract detected by an engine carries the id of the offending
//! component so callers can map the failure back to their model.

use crate::id::ComponentId;
use thiserror::Error;

/// Errors raised by the simulation engines. After a driver call returns
/// an error the simulator's state is unspecified; partial transitions are
/// not rolled back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    /// A model's `ta()` produced a value less than zero.
    #[error("negative time advance from component {component}")]
    NegativeTimeAdvance { component: ComponentId },

    /// A model's output was routed back to the model itself.
    #[error("component {component} sent an input to itself")]
    SelfCoupling { component: ComponentId },

    /// Two Mealy components are directly coupled; the output of one would
    /// be the input of the other within a single instant.
    #[error("Mealy component {src} is coupled to Mealy component {dst}")]
    MealyCoupling { src: ComponentId, dst: ComponentId },

    /// The parallel engine does not support Mealy components.
    #[error("Mealy component {component} cannot run under the parallel simulator")]
    MealyUnsupported { component: ComponentId },

    /// A speculating logical process stopped producing checkpoints
    /// mid-run. Components must either always or never save state.
    #[error("component {component} stopped producing checkpoints")]
    CheckpointLost { component: ComponentId },
}
