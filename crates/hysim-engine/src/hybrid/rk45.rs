//! # hysim-engine::hybrid::rk45
//!
//! A 4th/5th order Runge-Kutta-Fehlberg integrator that adjusts its step
//! size to control per-step error. The fifth order solution is
//! propagated; the embedded fourth order solution supplies the error
//! estimate.

use super::{OdeSolver, OdeSystem};

/// Six-stage explicit integrator with adaptive step sizing.
pub struct Rk45 {
    err_tol: f64,
    h_max: f64,
    /// Previous successful step size.
    h_cur: f64,
    dq: Vec<f64>,
    qq: Vec<f64>,
    tmp: Vec<f64>,
    k: [Vec<f64>; 6],
}

impl Rk45 {
    /// An integrator for a system of `num_vars` equations that keeps the
    /// per-step error under `err_tol` with steps no larger than `h_max`.
    pub fn new(num_vars: usize, err_tol: f64, h_max: f64) -> Self {
        Self {
            err_tol,
            h_max,
            h_cur: h_max,
            dq: vec![0.0; num_vars],
            qq: vec![0.0; num_vars],
            tmp: vec![0.0; num_vars],
            k: std::array::from_fn(|_| vec![0.0; num_vars]),
        }
    }

    /// Take a trial step of size `step` from `qq` in place; returns the
    /// error estimate.
    fn trial_step<X>(&mut self, sys: &dyn OdeSystem<X>, step: f64) -> f64 {
        let n = self.qq.len();
        // k1
        sys.der_func(&self.qq, &mut self.dq);
        for j in 0..n {
            self.k[0][j] = step * self.dq[j];
        }
        // k2
        for j in 0..n {
            self.tmp[j] = self.qq[j] + 0.5 * self.k[0][j];
        }
        sys.der_func(&self.tmp, &mut self.dq);
        for j in 0..n {
            self.k[1][j] = step * self.dq[j];
        }
        // k3
        for j in 0..n {
            self.tmp[j] = self.qq[j] + 0.25 * (self.k[0][j] + self.k[1][j]);
        }
        sys.der_func(&self.tmp, &mut self.dq);
        for j in 0..n {
            self.k[2][j] = step * self.dq[j];
        }
        // k4
        for j in 0..n {
            self.tmp[j] = self.qq[j] - self.k[1][j] + 2.0 * self.k[2][j];
        }
        sys.der_func(&self.tmp, &mut self.dq);
        for j in 0..n {
            self.k[3][j] = step * self.dq[j];
        }
        // k5
        for j in 0..n {
            self.tmp[j] = self.qq[j]
                + (7.0 / 27.0) * self.k[0][j]
                + (10.0 / 27.0) * self.k[1][j]
                + (1.0 / 27.0) * self.k[3][j];
        }
        sys.der_func(&self.tmp, &mut self.dq);
        for j in 0..n {
            self.k[4][j] = step * self.dq[j];
        }
        // k6
        for j in 0..n {
            self.tmp[j] = self.qq[j] + (28.0 / 625.0) * self.k[0][j] - 0.2 * self.k[1][j]
                + (546.0 / 625.0) * self.k[2][j]
                + (54.0 / 625.0) * self.k[3][j]
                - (378.0 / 625.0) * self.k[4][j];
        }
        sys.der_func(&self.tmp, &mut self.dq);
        for j in 0..n {
            self.k[5][j] = step * self.dq[j];
        }
        // Fifth order state update, fourth order error estimate.
        let mut err = 0.0f64;
        for j in 0..n {
            self.qq[j] += (1.0 / 24.0) * self.k[0][j]
                + (5.0 / 48.0) * self.k[3][j]
                + (27.0 / 56.0) * self.k[4][j]
                + (125.0 / 336.0) * self.k[5][j];
            err = err.max(
                (self.k[0][j] / 8.0 + 2.0 * self.k[2][j] / 3.0 + self.k[3][j] / 16.0
                    - 27.0 * self.k[4][j] / 56.0
                    - 125.0 * self.k[5][j] / 336.0)
                    .abs(),
            );
        }
        err
    }
}

impl<X> OdeSolver<X> for Rk45 {
    fn integrate(&mut self, sys: &dyn OdeSystem<X>, q: &mut [f64], h_lim: f64) -> f64 {
        let mut h = (self.h_cur * 1.1).min(self.h_max).min(h_lim);
        loop {
            self.qq.copy_from_slice(q);
            let err = self.trial_step(sys, h);
            if err <= self.err_tol {
                if self.h_cur <= h_lim {
                    self.h_cur = h;
                }
                break;
            }
            let h_guess = 0.8 * (self.err_tol * h.powi(4) / err.abs()).powf(0.25);
            if h < h_guess {
                h *= 0.8;
            } else {
                h = h_guess;
            }
        }
        q.copy_from_slice(&self.qq);
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hysim_types::pin::PinValue;

    /// Harmonic oscillator: q = (cos t, -sin t) from (1, 0).
    struct Oscillator;

    impl OdeSystem<()> for Oscillator {
        fn num_vars(&self) -> usize {
            2
        }
        fn num_events(&self) -> usize {
            0
        }
        fn init(&mut self, q: &mut [f64]) {
            q[0] = 1.0;
            q[1] = 0.0;
        }
        fn der_func(&self, q: &[f64], dq: &mut [f64]) {
            dq[0] = q[1];
            dq[1] = -q[0];
        }
        fn state_event_func(&self, _q: &[f64], _z: &mut [f64]) {}
        fn time_event_func(&self, _q: &[f64]) -> f64 {
            f64::INFINITY
        }
        fn internal_event(&mut self, _q: &mut [f64], _events: &[bool]) {}
        fn external_event(&mut self, _q: &mut [f64], _e: f64, _xb: &[PinValue<()>]) {}
        fn confluent_event(&mut self, _q: &mut [f64], _events: &[bool], _xb: &[PinValue<()>]) {}
        fn output_func(&mut self, _q: &[f64], _events: &[bool], _yb: &mut Vec<PinValue<()>>) {}
    }

    #[test]
    fn oscillator_tracks_closed_form() {
        let sys = Oscillator;
        let mut solver = Rk45::new(2, 1e-10, 0.1);
        let mut q = [1.0, 0.0];
        let t_end = 2.0 * std::f64::consts::PI;
        OdeSolver::<()>::advance(&mut solver, &sys, &mut q, t_end);
        assert!((q[0] - 1.0).abs() < 1e-6, "q0 = {}", q[0]);
        assert!(q[1].abs() < 1e-6, "q1 = {}", q[1]);
    }

    #[test]
    fn error_control_shrinks_large_steps() {
        let sys = Oscillator;
        let mut solver = Rk45::new(2, 1e-12, 10.0);
        let mut q = [1.0, 0.0];
        let h = OdeSolver::<()>::integrate(&mut solver, &sys, &mut q, 10.0);
        assert!(h < 10.0);
        assert!(h > 0.0);
    }
}
