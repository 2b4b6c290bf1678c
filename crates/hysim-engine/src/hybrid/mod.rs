//! # hysim-engine::hybrid
//!
//! Simulation of piecewise-continuous components on the discrete event
//! timeline. An [`OdeSystem`] describes the continuous dynamics and the
//! discrete events riding on them; an [`OdeSolver`] advances the state
//! numerically with per-step error control; an [`EventLocator`] pins down
//! the first state event inside a proposed step. [`Hybrid`] ties the
//! three together and presents the whole thing as an ordinary atomic
//! component, so hybrid and purely discrete models compose freely in one
//! graph.

mod corrected_euler;
mod locators;
mod rk45;
mod spline;

pub use corrected_euler::CorrectedEuler;
pub use locators::{FastEventLocator, NullEventLocator, ZeroCrossingLocator};
pub use rk45::Rk45;
pub use spline::Spline;

use hysim_types::pin::PinValue;

use crate::model::Atomic;

/// A piecewise-continuous system of `num_vars` state variables and
/// `num_events` state event functions. An internal event fires when any
/// state event function crosses zero, or when the time returned by
/// [`OdeSystem::time_event_func`] expires; the `events` array passed to
/// the transition callbacks marks the cause, with index `num_events`
/// reserved for the time event.
pub trait OdeSystem<X>: Send {
    fn num_vars(&self) -> usize;

    fn num_events(&self) -> usize;

    /// Write the initial state into `q`.
    fn init(&mut self, q: &mut [f64]);

    /// Compute `dq/dt` at `q`.
    fn der_func(&self, q: &[f64], dq: &mut [f64]);

    /// Evaluate the state event functions at `q` into `z`. An internal
    /// event occurs at the first instant where some `z[i]` reaches zero.
    fn state_event_func(&self, q: &[f64], z: &mut [f64]);

    /// Time remaining to the next scheduled event, measured from the
    /// instant the state entered `q`. `f64::INFINITY` for none.
    fn time_event_func(&self, q: &[f64]) -> f64;

    /// Invoked when a committed state is selected. Use to restore
    /// algebraic constraints on the state variables.
    fn post_step(&mut self, _q: &mut [f64]) {}

    /// Invoked after every tentative integration step.
    fn post_trial_step(&mut self, _q: &mut [f64]) {}

    /// Internal transition at a state or time event. `events[i]` marks
    /// which state event functions triggered; `events[num_events]` marks
    /// a time event.
    fn internal_event(&mut self, q: &mut [f64], events: &[bool]);

    /// External transition: input arrived `e` after the last event and
    /// before any internal event.
    fn external_event(&mut self, q: &mut [f64], e: f64, xb: &[PinValue<X>]);

    /// Confluent transition: input arrived at the instant of an internal
    /// event.
    fn confluent_event(&mut self, q: &mut [f64], events: &[bool], xb: &[PinValue<X>]);

    /// Output preceding an internal or confluent event.
    fn output_func(&mut self, q: &[f64], events: &[bool], yb: &mut Vec<PinValue<X>>);

    /// Fill `jac` with the Jacobian in column-major order and return
    /// true, or return false if unsupported. Reserved for implicit
    /// solvers; nothing in the kernel calls it today.
    fn jacobian(&self, _q: &[f64], _jac: &mut [f64]) -> bool {
        false
    }
}

/// A numerical integrator for [`OdeSystem`] derivative functions.
pub trait OdeSolver<X>: Send {
    /// Take one error-controlled step of at most `h_lim` from `q`,
    /// overwrite `q` with the new state, and return the step actually
    /// taken.
    fn integrate(&mut self, sys: &dyn OdeSystem<X>, q: &mut [f64], h_lim: f64) -> f64;

    /// Advance `q` by exactly `h`.
    fn advance(&mut self, sys: &dyn OdeSystem<X>, q: &mut [f64], mut h: f64) {
        loop {
            let dt = self.integrate(sys, q, h);
            if dt < h {
                h -= dt;
            } else {
                break;
            }
        }
    }
}

/// Finds the first state event inside a proposed integration step.
pub trait EventLocator<X>: Send {
    /// Search `[0, h]` from `q_start`, where `q_end` holds the solver
    /// state at `h`. On success return true, shrink `h` to the event
    /// time, rewrite `q_end` with the state at that time, and set
    /// `events[i]` for each triggered function. The locator may shrink
    /// `h` and rewrite `q_end` even when it reports no event.
    fn find_events(
        &mut self,
        sys: &dyn OdeSystem<X>,
        events: &mut [bool],
        q_start: &[f64],
        q_end: &mut [f64],
        solver: &mut dyn OdeSolver<X>,
        h: &mut f64,
    ) -> bool;
}

/// An [`OdeSystem`] wrapped as an atomic component on a continuous
/// (`f64`) clock. Internal events of the atomic coincide with state and
/// time events of the system; between them the wrapper silently advances
/// the numerical solution one tentative step at a time.
pub struct Hybrid<X> {
    sys: Box<dyn OdeSystem<X>>,
    solver: Box<dyn OdeSolver<X>>,
    locator: Box<dyn EventLocator<X>>,
    /// Time remaining to the next internal event.
    sigma: f64,
    /// Committed continuous state.
    q: Vec<f64>,
    /// State at the end of the tentative step.
    q_trial: Vec<f64>,
    /// Which event surfaces triggered; the last entry is the time event.
    event: Vec<bool>,
    event_exists: bool,
    event_happened: bool,
    /// Elapsed time since the last discrete event, accumulated across
    /// integration steps.
    e_accum: f64,
    /// Output recovered when an external input arrived inside a step
    /// that actually contained a state event.
    missed_output: Vec<PinValue<X>>,
}

impl<X: Clone + Send + 'static> Hybrid<X> {
    /// Wrap `sys`, advancing it with `solver` and locating its state
    /// events with `locator`. The first tentative step is taken here.
    pub fn new(
        mut sys: Box<dyn OdeSystem<X>>,
        solver: Box<dyn OdeSolver<X>>,
        locator: Box<dyn EventLocator<X>>,
    ) -> Self {
        let n = sys.num_vars();
        let m = sys.num_events();
        let mut q_trial = vec![0.0; n];
        sys.init(&mut q_trial);
        let mut hybrid = Self {
            sys,
            solver,
            locator,
            sigma: 0.0,
            q: q_trial.clone(),
            q_trial,
            event: vec![false; m + 1],
            event_exists: false,
            event_happened: false,
            e_accum: 0.0,
            missed_output: Vec::new(),
        };
        hybrid.tentative_step();
        hybrid
    }

    /// The committed continuous state.
    pub fn state(&self) -> &[f64] {
        &self.q
    }

    /// The `k`th committed state variable.
    pub fn state_k(&self, k: usize) -> f64 {
        self.q[k]
    }

    /// Whether the previous transition was caused by a state or time
    /// event in the system, as opposed to a bare numerical step.
    pub fn event_happened(&self) -> bool {
        self.event_happened
    }

    pub fn system(&self) -> &dyn OdeSystem<X> {
        self.sys.as_ref()
    }

    pub fn system_mut(&mut self) -> &mut dyn OdeSystem<X> {
        self.sys.as_mut()
    }

    /// Take a tentative step from `q` (callers keep `q_trial == q` on
    /// entry): integrate at most to the next time event, search the step
    /// for state events, and derive `sigma` and the event flags.
    fn tentative_step(&mut self) {
        let m = self.sys.num_events();
        let time_event = self.sys.time_event_func(&self.q);
        let mut step_size = self
            .solver
            .integrate(self.sys.as_ref(), &mut self.q_trial, time_event);
        let (state_events, _) = self.event.split_at_mut(m);
        let state_event_exists = self.locator.find_events(
            self.sys.as_ref(),
            state_events,
            &self.q,
            &mut self.q_trial,
            self.solver.as_mut(),
            &mut step_size,
        );
        self.sigma = step_size.min(time_event);
        self.event[m] = time_event <= self.sigma;
        self.event_exists = self.event[m] || state_event_exists;
        self.sys.post_trial_step(&mut self.q);
    }
}

impl<X: Clone + Send + 'static> Atomic<X, f64> for Hybrid<X> {
    fn ta(&mut self) -> f64 {
        if self.missed_output.is_empty() {
            self.sigma
        } else {
            0.0
        }
    }

    fn delta_int(&mut self) {
        // A zero-time event that only flushed recovered output.
        if !self.missed_output.is_empty() {
            self.missed_output.clear();
            return;
        }
        self.e_accum += self.sigma;
        self.event_happened = self.event_exists;
        if self.event_exists {
            self.sys.internal_event(&mut self.q_trial, &self.event);
            self.e_accum = 0.0;
        }
        self.q.copy_from_slice(&self.q_trial);
        self.tentative_step();
    }

    fn delta_ext(&mut self, e: f64, xb: &[PinValue<X>]) {
        let mut state_event_exists = false;
        self.event_happened = true;
        // The pending step may hide a state event inside [0, e]; replay
        // the integration up to e and search again.
        if self.event_exists {
            let m = self.sys.num_events();
            self.q_trial.copy_from_slice(&self.q);
            self.solver
                .advance(self.sys.as_ref(), &mut self.q_trial, e);
            let mut h = e;
            let (state_events, _) = self.event.split_at_mut(m);
            state_event_exists = self.locator.find_events(
                self.sys.as_ref(),
                state_events,
                &self.q,
                &mut self.q_trial,
                self.solver.as_mut(),
                &mut h,
            );
            if state_event_exists {
                // Recover the output the event would have produced, then
                // treat the input as confluent with it.
                self.sys.post_step(&mut self.q_trial);
                let mut missed = std::mem::take(&mut self.missed_output);
                self.sys.output_func(&self.q_trial, &self.event, &mut missed);
                self.missed_output = missed;
                self.sys.confluent_event(&mut self.q_trial, &self.event, xb);
                self.q.copy_from_slice(&self.q_trial);
            }
        }
        if !state_event_exists {
            self.solver.advance(self.sys.as_ref(), &mut self.q, e);
            self.sys.post_step(&mut self.q);
            self.sys.external_event(&mut self.q, e + self.e_accum, xb);
        }
        self.e_accum = 0.0;
        self.q_trial.copy_from_slice(&self.q);
        self.tentative_step();
    }

    fn delta_conf(&mut self, xb: &[PinValue<X>]) {
        if !self.missed_output.is_empty() {
            self.missed_output.clear();
            if self.sigma > 0.0 {
                self.event_exists = false;
            }
        }
        self.event_happened = true;
        if self.event_exists {
            self.sys.confluent_event(&mut self.q_trial, &self.event, xb);
        } else {
            let e = self.e_accum + self.sigma;
            self.sys.external_event(&mut self.q_trial, e, xb);
        }
        self.e_accum = 0.0;
        self.q.copy_from_slice(&self.q_trial);
        self.tentative_step();
    }

    fn output_func(&mut self, yb: &mut Vec<PinValue<X>>) {
        if !self.missed_output.is_empty() {
            yb.extend(self.missed_output.iter().cloned());
            // Fresh output too when the missed event is confluent with
            // the input that exposed it.
            if self.sigma == 0.0 {
                self.sys.output_func(&self.q_trial, &self.event, yb);
            }
        } else {
            self.sys.post_step(&mut self.q_trial);
            if self.event_exists {
                self.sys.output_func(&self.q_trial, &self.event, yb);
            }
        }
    }
}
