//! # hysim-types::id
//!
//! Identifier types shared by the engine and user code.

/// The handle a graph returns when a component is registered. Ids are
/// stable for the life of the graph; removing a component leaves its slot
/// unused.
pub type ComponentId = usize;
