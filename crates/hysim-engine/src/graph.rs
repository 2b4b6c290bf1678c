//! # hysim-engine::graph
//!
//! The routing graph: pins connect to pins and to atomic components, and
//! a value placed on a pin is delivered to every component reachable
//! through the pin-to-pin closure, tagged with the last pin on the path.
//! The graph owns its components; registration hands back a stable
//! [`ComponentId`].

use fxhash::FxHashMap;

use hysim_types::id::ComponentId;
use hysim_types::pin::Pin;
use hysim_types::time::Time;

use crate::model::{Atomic, Component, MealyAtomic};

/// The pin wiring, separated from component storage so the engines can
/// walk the topology while mutating components.
#[derive(Default)]
pub(crate) struct Topology {
    pin_to_atomic: FxHashMap<Pin, Vec<ComponentId>>,
    pin_to_pin: FxHashMap<Pin, Vec<Pin>>,
}

impl Topology {
    /// Fill `out` with the routing closure of `pin`: every component
    /// reachable through pin-to-pin edges, paired with the last pin on
    /// its path. The walk is depth-first and deterministic for a fixed
    /// graph; cycles among pins are a model error and are not checked.
    pub(crate) fn route(&self, pin: Pin, out: &mut Vec<(Pin, ComponentId)>) {
        if let Some(models) = self.pin_to_atomic.get(&pin) {
            for &model in models {
                out.push((pin, model));
            }
        }
        if let Some(pins) = self.pin_to_pin.get(&pin) {
            for &next in pins {
                self.route(next, out);
            }
        }
    }

    fn remove_pin(&mut self, pin: Pin) {
        self.pin_to_atomic.remove(&pin);
        self.pin_to_pin.remove(&pin);
        for targets in self.pin_to_pin.values_mut() {
            targets.retain(|&p| p != pin);
        }
    }
}

/// A container of atomic components and the pin wiring between them.
/// Building a model is: register components, mint pins, connect.
pub struct Graph<X, T: Time> {
    topology: Topology,
    components: Vec<Option<Component<X, T>>>,
}

impl<X: 'static, T: Time> Graph<X, T> {
    pub fn new() -> Self {
        Self {
            topology: Topology::default(),
            components: Vec::new(),
        }
    }

    /// Mint a fresh pin. Equivalent to [`Pin::new`]; provided so model
    /// construction can stay in graph vocabulary.
    pub fn add_pin(&mut self) -> Pin {
        Pin::new()
    }

    /// Remove a pin: its outgoing edges and every pin-to-pin edge
    /// pointing at it.
    pub fn remove_pin(&mut self, pin: Pin) {
        self.topology.remove_pin(pin);
    }

    /// Register an atomic component and return its handle.
    pub fn add_atomic<M: Atomic<X, T>>(&mut self, model: M) -> ComponentId {
        self.add_component(Component::Atomic(Box::new(model)))
    }

    /// Register a Mealy-style component and return its handle.
    pub fn add_mealy<M: MealyAtomic<X, T>>(&mut self, model: M) -> ComponentId {
        self.add_component(Component::Mealy(Box::new(model)))
    }

    pub fn add_component(&mut self, component: Component<X, T>) -> ComponentId {
        self.components.push(Some(component));
        self.components.len() - 1
    }

    /// Remove a component, severing every pin edge pointing at it. Its id
    /// is not reused.
    pub fn remove_atomic(&mut self, id: ComponentId) -> Option<Component<X, T>> {
        for targets in self.topology.pin_to_atomic.values_mut() {
            targets.retain(|&m| m != id);
        }
        self.components.get_mut(id).and_then(Option::take)
    }

    /// Connect two pins: values appearing on `src` are forwarded to `dst`.
    pub fn connect(&mut self, src: Pin, dst: Pin) {
        self.topology.pin_to_pin.entry(src).or_default().push(dst);
    }

    pub fn disconnect(&mut self, src: Pin, dst: Pin) {
        if let Some(targets) = self.topology.pin_to_pin.get_mut(&src) {
            if let Some(at) = targets.iter().position(|&p| p == dst) {
                targets.remove(at);
            }
        }
    }

    /// Connect a pin to a component: values appearing on the pin become
    /// input for the component.
    pub fn connect_component(&mut self, pin: Pin, id: ComponentId) {
        self.topology.pin_to_atomic.entry(pin).or_default().push(id);
    }

    pub fn disconnect_component(&mut self, pin: Pin, id: ComponentId) {
        if let Some(targets) = self.topology.pin_to_atomic.get_mut(&pin) {
            if let Some(at) = targets.iter().position(|&m| m == id) {
                targets.remove(at);
            }
        }
    }

    /// See [`Topology::route`]. A pin with no reachable components drops
    /// its values silently.
    pub fn route(&self, pin: Pin, out: &mut Vec<(Pin, ComponentId)>) {
        self.topology.route(pin, out);
    }

    /// Ids of every registered component, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
    }

    pub fn len(&self) -> usize {
        self.components.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of id slots ever allocated, including removed components.
    pub(crate) fn slot_count(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component<X, T>> {
        self.components.get(id).and_then(Option::as_ref)
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component<X, T>> {
        self.components.get_mut(id).and_then(Option::as_mut)
    }

    /// Borrow the concrete model registered under `id`.
    pub fn get<M: 'static>(&self, id: ComponentId) -> Option<&M> {
        self.component(id).and_then(Component::downcast_ref)
    }

    pub fn get_mut<M: 'static>(&mut self, id: ComponentId) -> Option<&mut M> {
        self.component_mut(id).and_then(Component::downcast_mut)
    }

    /// Tear the graph apart for the parallel engine, which moves each
    /// component into its own logical process.
    pub(crate) fn into_parts(self) -> (Topology, Vec<Option<Component<X, T>>>) {
        (self.topology, self.components)
    }

    pub(crate) fn from_parts(
        topology: Topology,
        components: Vec<Option<Component<X, T>>>,
    ) -> Self {
        Self {
            topology,
            components,
        }
    }
}

impl<X: 'static, T: Time> Default for Graph<X, T> {
    fn default() -> Self {
        Self::new()
    }
}
