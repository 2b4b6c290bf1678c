//! # hysim-types::pin
//!
//! Pins are the routing endpoints of the simulation graph. A pin is an
//! opaque, process-unique integer with no owner and no type; two pins are
//! equal iff their integers match. Values travel between components as
//! [`PinValue`] pairs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_PIN: AtomicU64 = AtomicU64::new(1);

/// An opaque routing endpoint. Minted from a process-global monotonic
/// counter, so a pin created as a struct field is unique without any
/// graph's involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pin(u64);

impl Pin {
    /// Mint a fresh, process-unique pin.
    pub fn new() -> Self {
        Self(NEXT_PIN.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Pin {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin#{}", self.0)
    }
}

/// A value tagged with the pin it appeared on. The fundamental unit of
/// input and output in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinValue<X> {
    pub pin: Pin,
    pub value: X,
}

impl<X> PinValue<X> {
    pub fn new(pin: Pin, value: X) -> Self {
        Self { pin, value }
    }
}
