//! # hysim-engine::wrapper
//!
//! Presents an entire inner simulation as a single atomic component with
//! a different interface type. Input to the wrapper passes through a
//! [`Translator`] before it is injected into the inner simulator; output
//! produced inside is captured over a channel listener and translated on
//! the way out. Used to embed a model built against one value type inside
//! a network speaking another.

use crossbeam_channel::Receiver;

use hysim_types::errors::SimError;
use hysim_types::pin::PinValue;
use hysim_types::time::Time;

use crate::graph::Graph;
use crate::listener::{ChannelListener, ListenerEvent};
use crate::model::Atomic;
use crate::sim::Simulator;

/// Value translation at the wrapper boundary.
pub trait Translator<Ext, Int> {
    /// Convert the wrapper's incoming input bag into inputs for the inner
    /// model, appending to `internal`.
    fn translate_input(&mut self, external: &[PinValue<Ext>], internal: &mut Vec<PinValue<Int>>);

    /// Convert output produced by the inner model into the wrapper's
    /// output, appending to `external`.
    fn translate_output(&mut self, internal: &[PinValue<Int>], external: &mut Vec<PinValue<Ext>>);
}

/// An inner simulation wrapped as one atomic component. It implements
/// `Atomic<Ext, T>` for every external type its translator supports.
///
/// The inner engine's contract violations cannot surface through the
/// atomic callback signatures, so they abort with a panic naming this
/// wrapper; validate inner models before wrapping.
pub struct ModelWrapper<Int: Clone + 'static, T: Time, Tr> {
    translator: Tr,
    sim: Simulator<Int, T>,
    events: Receiver<ListenerEvent<Int, T>>,
    tl: T,
    inner_input: Vec<PinValue<Int>>,
    inner_output: Vec<PinValue<Int>>,
}

impl<Int, T, Tr> ModelWrapper<Int, T, Tr>
where
    Int: Clone + Send + 'static,
    T: Time,
{
    /// Wrap the model described by `graph`. Fails like
    /// [`Simulator::new`] on an invalid initial time advance.
    pub fn new(graph: Graph<Int, T>, translator: Tr) -> Result<Self, SimError> {
        let mut sim = Simulator::new(graph)?;
        let (listener, events) = ChannelListener::unbounded();
        sim.add_event_listener(listener);
        Ok(Self {
            translator,
            sim,
            events,
            tl: T::zero(),
            inner_input: Vec::new(),
            inner_output: Vec::new(),
        })
    }

    /// The wrapped simulator, for inspecting inner model state.
    pub fn inner(&self) -> &Simulator<Int, T> {
        &self.sim
    }

    fn drain_output(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let ListenerEvent::Output { value, .. } = event {
                self.inner_output.push(value);
            }
        }
    }
}

impl<Ext, Int, T, Tr> Atomic<Ext, T> for ModelWrapper<Int, T, Tr>
where
    Ext: 'static,
    Int: Clone + Send + 'static,
    T: Time,
    Tr: Translator<Ext, Int> + Send + 'static,
{
    fn ta(&mut self) -> T {
        let t_next = self.sim.next_event_time();
        if t_next < T::inf() {
            t_next - self.tl
        } else {
            T::inf()
        }
    }

    fn delta_int(&mut self) {
        self.tl = self.sim.next_event_time();
        self.sim
            .exec_next_event()
            .expect("wrapped simulator failed during an internal event");
    }

    fn delta_ext(&mut self, e: T, xb: &[PinValue<Ext>]) {
        self.tl = self.tl + e;
        self.translator.translate_input(xb, &mut self.inner_input);
        for x in self.inner_input.drain(..) {
            self.sim.inject_input(x);
        }
        self.sim.set_next_time(self.tl);
        self.sim
            .compute_next_state()
            .expect("wrapped simulator failed during an external event");
    }

    fn delta_conf(&mut self, xb: &[PinValue<Ext>]) {
        // The outer engine already ran our output_func, so the inner
        // output phase is complete; injected inputs join the imminent
        // outputs in the inner state phase.
        self.tl = self.sim.next_event_time();
        self.translator.translate_input(xb, &mut self.inner_input);
        for x in self.inner_input.drain(..) {
            self.sim.inject_input(x);
        }
        self.sim
            .compute_next_state()
            .expect("wrapped simulator failed during a confluent event");
    }

    fn output_func(&mut self, yb: &mut Vec<PinValue<Ext>>) {
        self.sim.compute_next_output();
        self.drain_output();
        let inner_output = std::mem::take(&mut self.inner_output);
        self.translator.translate_output(&inner_output, yb);
        let mut inner_output = inner_output;
        inner_output.clear();
        self.inner_output = inner_output;
    }
}
