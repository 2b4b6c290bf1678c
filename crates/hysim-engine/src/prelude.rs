//! # hysim-engine::prelude
//!
//! A convenience module that re-exports the types most user models need.

pub use crate::{
    coupled::{Coupled, Network},
    graph::Graph,
    hybrid::{
        CorrectedEuler, EventLocator, FastEventLocator, Hybrid, NullEventLocator, OdeSolver,
        OdeSystem, Rk45, ZeroCrossingLocator,
    },
    listener::{ChannelListener, EventListener, ListenerEvent},
    model::{Atomic, Component, MealyAtomic},
    par::ParallelSimulator,
    sim::Simulator,
    wrapper::{ModelWrapper, Translator},
};

pub use hysim_types::{
    errors::SimError,
    id::ComponentId,
    pin::{Pin, PinValue},
    time::{FcDouble, SdTime, Time},
};
