//! # hysim-engine::sim
//!
//! The sequential DEVS simulator. One tick is a two-phase operation: the
//! output phase asks every imminent component for output and notifies
//! listeners, and the state phase routes those outputs (plus any injected
//! input) into input bags, resolves each active component's internal,
//! external, or confluent transition, and reschedules it. Mealy
//! components, whose output depends on input, produce their output inside
//! the state phase once bags are assembled.

use hysim_types::errors::SimError;
use hysim_types::id::ComponentId;
use hysim_types::pin::{Pin, PinValue};
use hysim_types::time::Time;

use crate::coupled::Network;
use crate::graph::Graph;
use crate::listener::EventListener;
use crate::model::{Atomic, Component};
use crate::sched::Schedule;

/// Engine-owned bookkeeping for one component: event times and the
/// scratch input/output bags reused across ticks.
struct Book<X, T: Time> {
    tl: T,
    tn: T,
    inputs: Vec<PinValue<X>>,
    outputs: Vec<PinValue<X>>,
    active: bool,
}

impl<X, T: Time> Book<X, T> {
    fn new() -> Self {
        Self {
            tl: T::zero(),
            tn: T::zero(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            active: false,
        }
    }
}

/// The sequential simulation engine over a [`Graph`] of components.
///
/// Driver calls return [`SimError`] when the model violates the DEVS
/// contract (negative time advance, self-coupling, Mealy-to-Mealy
/// coupling). After an error the simulator is unusable; partial
/// transitions are not rolled back.
pub struct Simulator<X, T: Time> {
    graph: Graph<X, T>,
    sched: Schedule<T>,
    books: Vec<Book<X, T>>,
    imm: Vec<ComponentId>,
    listeners: Vec<Box<dyn EventListener<X, T> + Send>>,
    external_input: Vec<PinValue<X>>,
    output_ready: bool,
    t_next: T,
    route_buf: Vec<(Pin, ComponentId)>,
}

impl<X: Clone + 'static, T: Time> Simulator<X, T> {
    /// Build a simulator over a graph of components. Every component's
    /// initial time advance is evaluated at time zero.
    pub fn new(graph: Graph<X, T>) -> Result<Self, SimError> {
        let books = (0..graph.slot_count()).map(|_| Book::new()).collect();
        let mut sim = Self {
            graph,
            sched: Schedule::new(),
            books,
            imm: Vec::new(),
            listeners: Vec::new(),
            external_input: Vec::new(),
            output_ready: false,
            t_next: T::inf(),
            route_buf: Vec::new(),
        };
        let ids: Vec<ComponentId> = sim.graph.ids().collect();
        for id in ids {
            sim.reschedule(id, T::zero())?;
        }
        sim.t_next = sim.sched.min_priority();
        Ok(sim)
    }

    /// Build a simulator over a single atomic component. Returns the
    /// component's id alongside the engine so callers can read the model
    /// back after the run.
    pub fn from_atomic<M: Atomic<X, T>>(model: M) -> Result<(Self, ComponentId), SimError> {
        let mut graph = Graph::new();
        let id = graph.add_atomic(model);
        Ok((Self::new(graph)?, id))
    }

    /// Build a simulator over a hierarchical [`Network`] model by
    /// flattening it onto a fresh graph.
    pub fn from_network<N: Network<X, T>>(network: N) -> Result<Self, SimError> {
        let mut graph = Graph::new();
        network.assemble(&mut graph);
        Self::new(graph)
    }

    /// The absolute time of the next pending event, `inf` if none.
    pub fn next_event_time(&self) -> T {
        self.sched.min_priority()
    }

    /// Execute the simulation cycle at `next_event_time()` and return the
    /// new current time.
    pub fn exec_next_event(&mut self) -> Result<T, SimError> {
        self.compute_next_state()
    }

    /// Run ticks until `next_event_time()` exceeds `t_end`.
    pub fn exec_until(&mut self, t_end: T) -> Result<(), SimError> {
        while self.next_event_time() <= t_end {
            self.exec_next_event()?;
        }
        Ok(())
    }

    /// Stage an input to be applied at the next tick. To apply it before
    /// the next scheduled event, also call [`Simulator::set_next_time`].
    pub fn inject_input(&mut self, x: PinValue<X>) {
        self.external_input.push(x);
    }

    /// Discard any staged inputs.
    pub fn clear_injected_input(&mut self) {
        self.external_input.clear();
    }

    /// Force the next tick to happen at `t`, which must not be later than
    /// `next_event_time()`. Used to apply injected inputs at `t`.
    pub fn set_next_time(&mut self, t: T) {
        self.t_next = t;
        self.output_ready = false;
    }

    pub fn add_event_listener<L: EventListener<X, T> + Send + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    pub fn graph(&self) -> &Graph<X, T> {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph<X, T> {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph<X, T> {
        self.graph
    }

    /// Phase A: compute the output of every imminent component and notify
    /// listeners. Idempotent until the next state change. Output of an
    /// imminent Mealy component is not included here; it depends on input
    /// known only to the state phase.
    pub fn compute_next_output(&mut self) {
        self.output_ready = true;
        for &m in &self.imm {
            self.books[m].outputs.clear();
        }
        self.imm.clear();
        if self.sched.min_priority() > self.t_next {
            return;
        }
        self.sched.visit_imminent(&mut self.imm);
        let t = self.t_next;
        let imm = std::mem::take(&mut self.imm);
        tracing::trace!(target: "sim", imminent = imm.len(), t = ?t, "output phase");
        for &m in &imm {
            let Some(component) = self.graph.component_mut(m) else {
                continue;
            };
            if component.is_mealy() {
                continue;
            }
            let mut outputs = std::mem::take(&mut self.books[m].outputs);
            component.atomic_mut().output_func(&mut outputs);
            for y in &outputs {
                self.notify_output(m, y, t);
            }
            self.books[m].outputs = outputs;
        }
        self.imm = imm;
    }

    /// Phase B: route outputs and injected inputs, run transitions, and
    /// reschedule. Returns the new current time.
    pub fn compute_next_state(&mut self) -> Result<T, SimError> {
        let t = self.t_next;
        if !self.output_ready {
            self.compute_next_output();
        }
        self.output_ready = false;

        let mut active: Vec<ComponentId> = Vec::new();

        // Route the imminent outputs into the recipients' input bags.
        let imm = std::mem::take(&mut self.imm);
        for &producer in &imm {
            self.activate(&mut active, producer);
            let outputs = std::mem::take(&mut self.books[producer].outputs);
            for y in &outputs {
                self.deliver(&mut active, Some(producer), y, t)?;
            }
            let mut outputs = outputs;
            outputs.clear();
            self.books[producer].outputs = outputs;
        }

        // Fold in injected inputs.
        let injected = std::mem::take(&mut self.external_input);
        for x in &injected {
            self.deliver(&mut active, None, x, t)?;
        }

        // Mealy wave: output of active Mealy components is a function of
        // their assembled input bag. Recipients may not be Mealy, so the
        // wave cannot cascade.
        let mealy: Vec<ComponentId> = active
            .iter()
            .copied()
            .filter(|&m| self.graph.component(m).is_some_and(Component::is_mealy))
            .collect();
        for m in mealy {
            let inputs = std::mem::take(&mut self.books[m].inputs);
            let imminent = self.books[m].tn == t;
            let e = t - self.books[m].tl;
            let mut yb = Vec::new();
            if let Some(model) = self.graph.component_mut(m).and_then(Component::mealy_mut) {
                if inputs.is_empty() {
                    model.output_func(&mut yb);
                } else if imminent {
                    model.confluent_output(&inputs, &mut yb);
                } else {
                    model.external_output(e, &inputs, &mut yb);
                }
            }
            self.books[m].inputs = inputs;
            for y in &yb {
                self.notify_output(m, y, t);
                self.deliver(&mut active, Some(m), y, t)?;
            }
        }

        // Transitions.
        tracing::debug!(target: "sim", t = ?t, active = active.len(), "state phase");
        for &m in &active {
            let inputs = std::mem::take(&mut self.books[m].inputs);
            let confluent = self.books[m].tn == t;
            let e = t - self.books[m].tl;
            if let Some(component) = self.graph.component_mut(m) {
                let model = component.atomic_mut();
                if inputs.is_empty() {
                    model.delta_int();
                } else if confluent {
                    model.delta_conf(&inputs);
                } else {
                    model.delta_ext(e, &inputs);
                }
            }
            let mut inputs = inputs;
            inputs.clear();
            self.books[m].inputs = inputs;
            self.books[m].active = false;
            self.notify_state(m, t);
            self.reschedule(m, t)?;
        }

        self.t_next = self.sched.min_priority();
        if t < T::inf() {
            Ok(t + T::epsilon())
        } else {
            Ok(t)
        }
    }

    /// Route one value to every reachable component, appending to input
    /// bags and activating recipients. `producer` is `None` for injected
    /// input.
    fn deliver(
        &mut self,
        active: &mut Vec<ComponentId>,
        producer: Option<ComponentId>,
        y: &PinValue<X>,
        t: T,
    ) -> Result<(), SimError> {
        let mut targets = std::mem::take(&mut self.route_buf);
        self.graph.route(y.pin, &mut targets);
        let producer_mealy = producer
            .and_then(|p| self.graph.component(p))
            .is_some_and(Component::is_mealy);
        for &(pin, consumer) in &targets {
            if producer == Some(consumer) {
                return Err(SimError::SelfCoupling {
                    component: consumer,
                });
            }
            if producer_mealy
                && self
                    .graph
                    .component(consumer)
                    .is_some_and(Component::is_mealy)
            {
                return Err(SimError::MealyCoupling {
                    src: producer.unwrap_or(consumer),
                    dst: consumer,
                });
            }
            let pv = PinValue::new(pin, y.value.clone());
            self.notify_input(consumer, &pv, t);
            self.books[consumer].inputs.push(pv);
            self.activate(active, consumer);
        }
        targets.clear();
        self.route_buf = targets;
        Ok(())
    }

    fn activate(&mut self, active: &mut Vec<ComponentId>, id: ComponentId) {
        if !self.books[id].active {
            self.books[id].active = true;
            active.push(id);
        }
    }

    /// Evaluate `ta()` and move the component to its new schedule slot;
    /// `t` becomes its last event time.
    fn reschedule(&mut self, id: ComponentId, t: T) -> Result<(), SimError> {
        let dt = match self.graph.component_mut(id) {
            Some(component) => component.atomic_mut().ta(),
            None => return Ok(()),
        };
        let book = &mut self.books[id];
        book.tl = t;
        if dt == T::inf() {
            book.tn = T::inf();
            self.sched.schedule(id, T::inf());
        } else {
            book.tn = book.tl + dt;
            if book.tn < book.tl {
                return Err(SimError::NegativeTimeAdvance { component: id });
            }
            self.sched.schedule(id, book.tn);
        }
        Ok(())
    }

    fn notify_output(&mut self, model: ComponentId, y: &PinValue<X>, t: T) {
        for listener in &mut self.listeners {
            listener.output_event(model, y, t);
        }
    }

    fn notify_input(&mut self, model: ComponentId, x: &PinValue<X>, t: T) {
        for listener in &mut self.listeners {
            listener.input_event(model, x, t);
        }
    }

    fn notify_state(&mut self, model: ComponentId, t: T) {
        for listener in &mut self.listeners {
            listener.state_change(model, t);
        }
    }
}
