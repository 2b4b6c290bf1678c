//! # hysim-types::time
//!
//! The simulation time domain. Time is any totally ordered type with a
//! zero, a positive infinity, a pre-zero sentinel (used only by the
//! scheduler's heap), and an epsilon tick whose sole property is that
//! `t + epsilon > t` whenever the type can express a next instant.
//!
//! Two families are provided: plain clocks (`f64`, `i64`) where epsilon is
//! zero and ties are broken by event ordering, and the superdense clock
//! [`SdTime`] `(r, k)` where the counter `k` orders events at equal real
//! time `r`. [`FcDouble`] is an `f64` wrapper whose comparisons use an
//! exponent-scaled epsilon neighborhood instead of exact equality.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

/// The time domain contract required by the schedulers and simulators.
pub trait Time:
    Copy
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
    /// The bottom of the time line; the instant simulations start at.
    fn zero() -> Self;
    /// The top of the time line; "no event is pending".
    fn inf() -> Self;
    /// A value strictly less than `zero()`. Only the scheduler's sentinel
    /// slot holds this value.
    fn sentinel() -> Self;
    /// The interval to the next instant. Zero for clocks whose ordering
    /// already breaks ties; `(0, 1)` for superdense time.
    fn epsilon() -> Self;
}

impl Time for f64 {
    fn zero() -> Self {
        0.0
    }
    fn inf() -> Self {
        f64::INFINITY
    }
    fn sentinel() -> Self {
        -1.0
    }
    fn epsilon() -> Self {
        0.0
    }
}

impl Time for i64 {
    fn zero() -> Self {
        0
    }
    fn inf() -> Self {
        i64::MAX
    }
    fn sentinel() -> Self {
        -1
    }
    fn epsilon() -> Self {
        0
    }
}

/// Superdense time `(r, k)`: a real instant `r` plus a counter `k` that
/// orders events occurring at the same `r`.
///
/// Adding a delta with a zero real part advances only the counter; adding
/// a delta with a non-zero real part advances `r` and resets the counter
/// to the delta's counter. Subtraction is the interval between two
/// instants under the same convention.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct SdTime<R = f64> {
    /// The real part of the instant.
    pub real: R,
    /// The discrete tie-breaking counter.
    pub discrete: i32,
}

impl<R> SdTime<R> {
    pub fn new(real: R, discrete: i32) -> Self {
        Self { real, discrete }
    }
}

impl<R: Time> Add for SdTime<R> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl<R: Time> AddAssign for SdTime<R> {
    fn add_assign(&mut self, rhs: Self) {
        if rhs.real == R::zero() {
            self.discrete += rhs.discrete;
        } else {
            self.real = self.real + rhs.real;
            self.discrete = rhs.discrete;
        }
    }
}

impl<R: Time> Sub for SdTime<R> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl<R: Time> SubAssign for SdTime<R> {
    fn sub_assign(&mut self, rhs: Self) {
        if self.real == rhs.real {
            self.real = R::zero();
            self.discrete -= rhs.discrete;
        } else {
            self.real = self.real - rhs.real;
        }
    }
}

impl<R: Time> Time for SdTime<R> {
    fn zero() -> Self {
        Self::new(R::zero(), 0)
    }
    fn inf() -> Self {
        Self::new(R::inf(), i32::MAX)
    }
    fn sentinel() -> Self {
        Self::new(R::sentinel(), 0)
    }
    fn epsilon() -> Self {
        Self::new(R::zero(), 1)
    }
}

impl<R: fmt::Display> fmt::Display for SdTime<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.real, self.discrete)
    }
}

/// Compare two doubles within a neighborhood of `epsilon` scaled by the
/// binary exponent of the larger magnitude operand. Returns `Less`,
/// `Equal`, or `Greater` in the usual sense, where `Equal` means "within
/// the neighborhood".
pub fn fcmp(x1: f64, x2: f64, epsilon: f64) -> Ordering {
    // Exponent of max(|x1|, |x2|) in the frexp convention, where the
    // mantissa lies in [0.5, 1). Zero maps to exponent 0.
    let largest = if x1.abs() > x2.abs() { x1 } else { x2 };
    let exponent = if largest == 0.0 {
        0
    } else {
        largest.abs().log2().floor() as i32 + 1
    };
    let delta = epsilon * 2.0f64.powi(exponent);
    let difference = x1 - x2;
    if difference > delta {
        Ordering::Greater
    } else if difference < -delta {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

static FC_EPSILON_BITS: AtomicU64 = AtomicU64::new(0);

fn fc_epsilon() -> f64 {
    let bits = FC_EPSILON_BITS.load(AtomicOrdering::Relaxed);
    if bits == 0 {
        f64::EPSILON
    } else {
        f64::from_bits(bits)
    }
}

/// An alternative to `f64` for the simulation clock that uses [`fcmp`]
/// for comparisons instead of exact equality, so that events separated by
/// accumulated rounding noise land on the same instant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FcDouble(pub f64);

impl FcDouble {
    /// Set the process-global comparison epsilon used by every `FcDouble`.
    /// The default is `f64::EPSILON`.
    pub fn set_epsilon(epsilon: f64) {
        FC_EPSILON_BITS.store(epsilon.to_bits(), AtomicOrdering::Relaxed);
    }
}

impl From<f64> for FcDouble {
    fn from(d: f64) -> Self {
        Self(d)
    }
}

impl PartialEq for FcDouble {
    fn eq(&self, other: &Self) -> bool {
        fcmp(self.0, other.0, fc_epsilon()) == Ordering::Equal
    }
}

impl PartialOrd for FcDouble {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(fcmp(self.0, other.0, fc_epsilon()))
    }
}

impl Add for FcDouble {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for FcDouble {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Time for FcDouble {
    fn zero() -> Self {
        Self(0.0)
    }
    // MAX rather than INFINITY keeps the comparison exponent finite.
    fn inf() -> Self {
        Self(f64::MAX)
    }
    fn sentinel() -> Self {
        Self(-1.0)
    }
    fn epsilon() -> Self {
        Self(0.0)
    }
}

impl fmt::Display for FcDouble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
