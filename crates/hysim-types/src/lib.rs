//! # hysim-types
//!
//! This crate provides the foundational, shared data types used across the
//! HYSIM workspace: the simulation time domain, pin identifiers and
//! pin-value pairs, component ids, and the error taxonomy. Its purpose is
//! to give `hysim-engine` and user model crates one stable set of types to
//! agree upon.

#![forbid(unsafe_code)]

pub mod errors;
pub mod id;
pub mod pin;
pub mod time;
