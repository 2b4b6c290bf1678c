//! # hysim-engine::hybrid::locators
//!
//! State event location: given a proposed integration step, find the
//! first instant where a state event function changes sign and shrink the
//! step onto it. [`ZeroCrossingLocator`] searches the whole interval by
//! interpolation or bisection; [`FastEventLocator`] maintains a time
//! bracket around the event so it cannot creep up on it across many
//! steps; [`NullEventLocator`] is for systems with no state events.

use super::{EventLocator, OdeSolver, OdeSystem, Spline};

fn sign(x: f64) -> i32 {
    if x < 0.0 {
        -1
    } else if x > 0.0 {
        1
    } else {
        0
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Interpolate,
    Bisection,
    Discontinuous,
}

/// Locates events where a state event function crosses zero inside
/// `[0, h]`. In the continuous modes an event is reported at the first
/// instant where `z` has changed sign and `|z| <= err_tol`; the
/// discontinuous mode instead stops once the interval itself is smaller
/// than `err_tol`, since `z` may jump.
pub struct ZeroCrossingLocator {
    err_tol: f64,
    mode: Mode,
    z0: Vec<f64>,
    z1: Vec<f64>,
}

impl ZeroCrossingLocator {
    /// Bisection search. The event functions must be continuous.
    pub fn bisection(num_events: usize, err_tol: f64) -> Self {
        Self::with_mode(num_events, err_tol, Mode::Bisection)
    }

    /// Linear interpolation search: faster convergence than bisection,
    /// still requires continuous event functions.
    pub fn linear(num_events: usize, err_tol: f64) -> Self {
        Self::with_mode(num_events, err_tol, Mode::Interpolate)
    }

    /// Bisection that tolerates discontinuous event functions.
    pub fn discontinuous(num_events: usize, err_tol: f64) -> Self {
        Self::with_mode(num_events, err_tol, Mode::Discontinuous)
    }

    fn with_mode(num_events: usize, err_tol: f64, mode: Mode) -> Self {
        Self {
            err_tol,
            mode,
            z0: vec![0.0; num_events],
            z1: vec![0.0; num_events],
        }
    }
}

impl<X> EventLocator<X> for ZeroCrossingLocator {
    fn find_events(
        &mut self,
        sys: &dyn OdeSystem<X>,
        events: &mut [bool],
        q_start: &[f64],
        q_end: &mut [f64],
        solver: &mut dyn OdeSolver<X>,
        h: &mut f64,
    ) -> bool {
        let m = sys.num_events();
        if m == 0 {
            return false;
        }
        sys.state_event_func(q_start, &mut self.z0);
        loop {
            let mut t_guess = *h;
            let mut event_in_interval = false;
            let mut found = false;
            sys.state_event_func(q_end, &mut self.z1);
            for i in 0..m {
                events[i] = false;
                if sign(self.z1[i]) != sign(self.z0[i]) {
                    let terminal = if self.mode == Mode::Discontinuous {
                        *h <= self.err_tol
                    } else {
                        self.z1[i].abs() <= self.err_tol
                    };
                    if terminal {
                        events[i] = true;
                        found = true;
                    } else {
                        // An event lies strictly inside (0, h).
                        if self.mode == Mode::Interpolate {
                            let mut candidate = self.z0[i] * *h / (self.z0[i] - self.z1[i]);
                            // Don't let the step collapse to zero.
                            if candidate < *h / 4.0 {
                                candidate = *h / 4.0;
                            }
                            if candidate < t_guess {
                                t_guess = candidate;
                            }
                        }
                        event_in_interval = true;
                    }
                }
            }
            if !event_in_interval {
                return found;
            }
            // Guess a new h and recompute the state there.
            if self.mode == Mode::Interpolate {
                *h = t_guess;
            } else {
                *h /= 2.0;
            }
            q_end.copy_from_slice(q_start);
            solver.advance(sys, q_end, *h);
        }
    }
}

/// A bisection search over a shrinking time bracket `[h_low, h_high]`
/// around the event. Unlike [`ZeroCrossingLocator`], it always closes in
/// on the event within a single call, so the simulation cannot spend many
/// steps creeping toward it. Optionally samples a cubic spline fitted to
/// the step endpoints instead of re-running the solver; interpolation is
/// faster but the state reported at the event is interpolated rather than
/// solver-computed.
pub struct FastEventLocator {
    err_tol: f64,
    z0: Vec<f64>,
    zf: Vec<f64>,
    interp: Option<FastInterp>,
}

struct FastInterp {
    spline: Spline,
    dq0: Vec<f64>,
    dqh: Vec<f64>,
}

impl FastEventLocator {
    /// A locator that reports success once the bracket around the event
    /// is narrower than `err_tol`, computing candidate states with the
    /// solver.
    pub fn new(num_events: usize, err_tol: f64) -> Self {
        Self {
            err_tol,
            z0: vec![0.0; num_events],
            zf: vec![0.0; num_events],
            interp: None,
        }
    }

    /// As [`FastEventLocator::new`], but sampling a cubic spline during
    /// the search instead of calling the solver.
    pub fn with_interpolation(num_vars: usize, num_events: usize, err_tol: f64) -> Self {
        Self {
            err_tol,
            z0: vec![0.0; num_events],
            zf: vec![0.0; num_events],
            interp: Some(FastInterp {
                spline: Spline::new(num_vars),
                dq0: vec![0.0; num_vars],
                dqh: vec![0.0; num_vars],
            }),
        }
    }

    fn any_sign_change(&self) -> bool {
        self.z0
            .iter()
            .zip(&self.zf)
            .any(|(&z0, &zf)| z0 * zf <= 0.0)
    }
}

impl<X> EventLocator<X> for FastEventLocator {
    fn find_events(
        &mut self,
        sys: &dyn OdeSystem<X>,
        events: &mut [bool],
        q_start: &[f64],
        q_end: &mut [f64],
        solver: &mut dyn OdeSolver<X>,
        h: &mut f64,
    ) -> bool {
        let m = sys.num_events();
        if m == 0 {
            return false;
        }
        sys.state_event_func(q_start, &mut self.z0);
        sys.state_event_func(q_end, &mut self.zf);
        let mut sign_change = self.any_sign_change();
        if !sign_change {
            events.fill(false);
            return false;
        }
        if let Some(interp) = &mut self.interp {
            sys.der_func(q_start, &mut interp.dq0);
            sys.der_func(q_end, &mut interp.dqh);
            interp
                .spline
                .init(q_start, &interp.dq0, q_end, &interp.dqh, *h);
        }
        let mut h_low = 0.0;
        let mut h_high = *h;
        let mut h_guess = h_high;
        loop {
            if sign_change {
                // On the right side of the event; done once the bracket
                // is tight enough.
                if h_high - h_low < self.err_tol {
                    break;
                }
                h_high = h_guess;
            } else {
                h_low = h_guess;
            }
            h_guess = (h_high + h_low) / 2.0;
            match &self.interp {
                Some(interp) => interp.spline.interpolate(q_end, h_guess),
                None => {
                    q_end.copy_from_slice(q_start);
                    solver.advance(sys, q_end, h_guess);
                }
            }
            sys.state_event_func(q_end, &mut self.zf);
            sign_change = self.any_sign_change();
        }
        *h = h_guess;
        for i in 0..m {
            events[i] = self.z0[i] * self.zf[i] <= 0.0;
        }
        true
    }
}

/// For systems with no state events; never finds anything.
pub struct NullEventLocator;

impl<X> EventLocator<X> for NullEventLocator {
    fn find_events(
        &mut self,
        _sys: &dyn OdeSystem<X>,
        _events: &mut [bool],
        _q_start: &[f64],
        _q_end: &mut [f64],
        _solver: &mut dyn OdeSolver<X>,
        _h: &mut f64,
    ) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::super::CorrectedEuler;
    use super::*;
    use hysim_types::pin::PinValue;

    /// q(t) = t, event function z(t) = t - 1.7.
    struct Ramp;

    impl OdeSystem<()> for Ramp {
        fn num_vars(&self) -> usize {
            1
        }
        fn num_events(&self) -> usize {
            1
        }
        fn init(&mut self, q: &mut [f64]) {
            q[0] = 0.0;
        }
        fn der_func(&self, _q: &[f64], dq: &mut [f64]) {
            dq[0] = 1.0;
        }
        fn state_event_func(&self, q: &[f64], z: &mut [f64]) {
            z[0] = q[0] - 1.7;
        }
        fn time_event_func(&self, _q: &[f64]) -> f64 {
            f64::INFINITY
        }
        fn internal_event(&mut self, _q: &mut [f64], _events: &[bool]) {}
        fn external_event(&mut self, _q: &mut [f64], _e: f64, _xb: &[PinValue<()>]) {}
        fn confluent_event(&mut self, _q: &mut [f64], _events: &[bool], _xb: &[PinValue<()>]) {}
        fn output_func(&mut self, _q: &[f64], _events: &[bool], _yb: &mut Vec<PinValue<()>>) {}
    }

    /// As `Ramp` but the event function jumps across the threshold.
    struct Step;

    impl OdeSystem<()> for Step {
        fn num_vars(&self) -> usize {
            1
        }
        fn num_events(&self) -> usize {
            1
        }
        fn init(&mut self, q: &mut [f64]) {
            q[0] = 0.0;
        }
        fn der_func(&self, _q: &[f64], dq: &mut [f64]) {
            dq[0] = 1.0;
        }
        fn state_event_func(&self, q: &[f64], z: &mut [f64]) {
            z[0] = if q[0] < 1.7 { -1.0 } else { 1.0 };
        }
        fn time_event_func(&self, _q: &[f64]) -> f64 {
            f64::INFINITY
        }
        fn internal_event(&mut self, _q: &mut [f64], _events: &[bool]) {}
        fn external_event(&mut self, _q: &mut [f64], _e: f64, _xb: &[PinValue<()>]) {}
        fn confluent_event(&mut self, _q: &mut [f64], _events: &[bool], _xb: &[PinValue<()>]) {}
        fn output_func(&mut self, _q: &[f64], _events: &[bool], _yb: &mut Vec<PinValue<()>>) {}
    }

    const TOL: f64 = 1e-6;

    /// Run the locate/advance loop the way the hybrid wrapper does until
    /// an event is reported; returns (event time, iterations).
    fn locate(
        sys: &dyn OdeSystem<()>,
        locator: &mut dyn EventLocator<()>,
        start_step: f64,
        max_iters: usize,
    ) -> (f64, usize) {
        let mut solver = CorrectedEuler::new(sys.num_vars(), 1e-9, start_step);
        let mut t_base = 0.0;
        let mut q_start = vec![0.0; sys.num_vars()];
        for iter in 0..max_iters {
            let mut events = vec![false; sys.num_events()];
            let mut q_end = q_start.clone();
            let mut h = solver.integrate(sys, &mut q_end, start_step);
            let found = locator.find_events(sys, &mut events, &q_start, &mut q_end, &mut solver, &mut h);
            if found {
                assert!(events[0]);
                return (t_base + h, iter + 1);
            }
            t_base += h;
            q_start.copy_from_slice(&q_end);
        }
        panic!("no event located in {max_iters} iterations");
    }

    #[test]
    fn linear_locates_in_one_pass() {
        let mut locator = ZeroCrossingLocator::linear(1, TOL);
        let (t, iters) = locate(&Ramp, &mut locator, 5.0, 4);
        assert!((t - 1.7).abs() <= 1e-3, "t = {t}");
        assert_eq!(iters, 1);
    }

    #[test]
    fn bisection_locates_with_more_iterations() {
        let mut locator = ZeroCrossingLocator::bisection(1, 1e-4);
        let (t, iters) = locate(&Ramp, &mut locator, 5.0, 64);
        assert!((t - 1.7).abs() <= 1e-3, "t = {t}");
        assert!(iters >= 1);
    }

    #[test]
    fn discontinuous_terminates_on_interval_width() {
        let mut locator = ZeroCrossingLocator::discontinuous(1, 1e-4);
        let (t, _) = locate(&Step, &mut locator, 5.0, 128);
        assert!((t - 1.7).abs() <= 1e-3, "t = {t}");
    }

    #[test]
    fn fast_locator_brackets_in_one_call() {
        let mut locator = FastEventLocator::new(1, TOL);
        let (t, iters) = locate(&Ramp, &mut locator, 5.0, 2);
        assert!((t - 1.7).abs() <= TOL, "t = {t}");
        assert_eq!(iters, 1);
    }

    #[test]
    fn fast_locator_with_spline_interpolation() {
        let mut locator = FastEventLocator::with_interpolation(1, 1, TOL);
        let (t, iters) = locate(&Ramp, &mut locator, 5.0, 2);
        assert!((t - 1.7).abs() <= 1e-3, "t = {t}");
        assert_eq!(iters, 1);
    }

    #[test]
    fn no_event_leaves_step_alone() {
        let mut locator = ZeroCrossingLocator::linear(1, TOL);
        let mut solver = CorrectedEuler::new(1, 1e-9, 1.0);
        let q_start = [0.0];
        let mut q_end = [0.0];
        let mut h = solver.integrate(&Ramp, &mut q_end, 1.0);
        let h_before = h;
        let mut events = [false];
        let found =
            locator.find_events(&Ramp, &mut events, &q_start, &mut q_end, &mut solver, &mut h);
        assert!(!found);
        assert_eq!(h, h_before);
        assert!(!events[0]);
    }

    #[test]
    fn null_locator_never_fires() {
        let mut locator = NullEventLocator;
        let mut solver = CorrectedEuler::new(1, 1e-9, 1.0);
        let mut events = [false];
        let mut h = 1.0;
        let mut q_end = [1.0];
        assert!(!locator.find_events(&Ramp, &mut events, &[0.0], &mut q_end, &mut solver, &mut h));
    }
}
