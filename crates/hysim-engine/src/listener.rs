//! # hysim-engine::listener
//!
//! Callbacks fired by the sequential simulator as a tick unfolds: output
//! events during the output phase, input events as bags are assembled,
//! and state changes after transitions. [`ChannelListener`] forwards
//! everything over a crossbeam channel for consumers that live outside
//! the simulation loop.

use crossbeam_channel::{Receiver, Sender};

use hysim_types::id::ComponentId;
use hysim_types::pin::PinValue;
use hysim_types::time::Time;

/// Observer of a running simulation. All methods default to no-ops so a
/// listener implements only what it cares about.
pub trait EventListener<X, T: Time> {
    /// `model` produced `value` at time `t`.
    fn output_event(&mut self, model: ComponentId, value: &PinValue<X>, t: T) {
        let _ = (model, value, t);
    }

    /// `value` was delivered to `model` as input at time `t`.
    fn input_event(&mut self, model: ComponentId, value: &PinValue<X>, t: T) {
        let _ = (model, value, t);
    }

    /// `model` completed a transition at time `t`.
    fn state_change(&mut self, model: ComponentId, t: T) {
        let _ = (model, t);
    }
}

/// An event drained from a [`ChannelListener`].
#[derive(Debug, Clone)]
pub enum ListenerEvent<X, T> {
    Output {
        model: ComponentId,
        value: PinValue<X>,
        t: T,
    },
    Input {
        model: ComponentId,
        value: PinValue<X>,
        t: T,
    },
    StateChange {
        model: ComponentId,
        t: T,
    },
}

/// A listener that clones every event onto an unbounded channel. Dropping
/// the receiver silently discards further events.
pub struct ChannelListener<X, T> {
    tx: Sender<ListenerEvent<X, T>>,
}

impl<X, T> ChannelListener<X, T> {
    pub fn unbounded() -> (Self, Receiver<ListenerEvent<X, T>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl<X: Clone, T: Time> EventListener<X, T> for ChannelListener<X, T> {
    fn output_event(&mut self, model: ComponentId, value: &PinValue<X>, t: T) {
        let _ = self.tx.send(ListenerEvent::Output {
            model,
            value: value.clone(),
            t,
        });
    }

    fn input_event(&mut self, model: ComponentId, value: &PinValue<X>, t: T) {
        let _ = self.tx.send(ListenerEvent::Input {
            model,
            value: value.clone(),
            t,
        });
    }

    fn state_change(&mut self, model: ComponentId, t: T) {
        let _ = self.tx.send(ListenerEvent::StateChange { model, t });
    }
}
