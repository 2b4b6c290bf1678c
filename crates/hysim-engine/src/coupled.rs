//! # hysim-engine::coupled
//!
//! Hierarchical model composition. A [`Network`] is any model that
//! aggregates components and couplings and can lower itself onto a
//! [`Graph`]; [`Coupled`] is the concrete container. Because pins are
//! process-unique, a hierarchy flattens into a single graph with no
//! parent back-pointers: couplings created anywhere in the tree simply
//! become pin edges.

use hysim_types::id::ComponentId;
use hysim_types::pin::Pin;
use hysim_types::time::Time;

use crate::graph::Graph;
use crate::model::{Atomic, Component, MealyAtomic};

/// A model that aggregates components and routing and can be lowered onto
/// a graph for simulation.
pub trait Network<X, T: Time> {
    /// Register this model's components and wiring on `graph`, returning
    /// the ids assigned to the components in this model's subtree.
    fn assemble(self, graph: &mut Graph<X, T>) -> Vec<ComponentId>;
}

/// A container of components, couplings, and child networks.
pub struct Coupled<X, T: Time> {
    components: Vec<Component<X, T>>,
    children: Vec<Coupled<X, T>>,
    pin_links: Vec<(Pin, Pin)>,
    component_links: Vec<(Pin, usize)>,
}

impl<X: 'static, T: Time> Coupled<X, T> {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            children: Vec::new(),
            pin_links: Vec::new(),
            component_links: Vec::new(),
        }
    }

    /// Add an atomic component; the returned index is local to this
    /// container and valid for [`Coupled::couple_to_component`].
    pub fn add_component<M: Atomic<X, T>>(&mut self, model: M) -> usize {
        self.components.push(Component::Atomic(Box::new(model)));
        self.components.len() - 1
    }

    pub fn add_mealy<M: MealyAtomic<X, T>>(&mut self, model: M) -> usize {
        self.components.push(Component::Mealy(Box::new(model)));
        self.components.len() - 1
    }

    /// Add a child network. Its couplings travel with it.
    pub fn add_network(&mut self, child: Coupled<X, T>) {
        self.children.push(child);
    }

    /// Forward values appearing on `src` to `dst`.
    pub fn create_coupling(&mut self, src: Pin, dst: Pin) {
        self.pin_links.push((src, dst));
    }

    /// Deliver values appearing on `pin` to a local component.
    pub fn couple_to_component(&mut self, pin: Pin, component: usize) {
        self.component_links.push((pin, component));
    }
}

impl<X: 'static, T: Time> Default for Coupled<X, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: 'static, T: Time> Network<X, T> for Coupled<X, T> {
    fn assemble(self, graph: &mut Graph<X, T>) -> Vec<ComponentId> {
        let mut ids: Vec<ComponentId> = Vec::with_capacity(self.components.len());
        for component in self.components {
            ids.push(graph.add_component(component));
        }
        for (src, dst) in self.pin_links {
            graph.connect(src, dst);
        }
        for (pin, local) in self.component_links {
            graph.connect_component(pin, ids[local]);
        }
        for child in self.children {
            ids.extend(child.assemble(graph));
        }
        ids
    }
}
