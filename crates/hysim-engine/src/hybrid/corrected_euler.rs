//! # hysim-engine::hybrid::corrected_euler
//!
//! Second order accurate RK2 (corrected Euler) with adaptive step sizing
//! for per-step error control.

use super::{OdeSolver, OdeSystem};

/// Two-stage explicit integrator. The per-step error estimate is the
/// componentwise maximum of `|k1 - k2|`.
pub struct CorrectedEuler {
    err_tol: f64,
    h_max: f64,
    /// Previous step size that satisfied the error constraint.
    h_cur: f64,
    dq: Vec<f64>,
    qq: Vec<f64>,
    tmp: Vec<f64>,
    k: [Vec<f64>; 2],
}

impl CorrectedEuler {
    /// An integrator for a system of `num_vars` equations with the given
    /// per-step error tolerance and maximum step size.
    pub fn new(num_vars: usize, err_tol: f64, h_max: f64) -> Self {
        Self {
            err_tol,
            h_max,
            h_cur: h_max,
            dq: vec![0.0; num_vars],
            qq: vec![0.0; num_vars],
            tmp: vec![0.0; num_vars],
            k: [vec![0.0; num_vars], vec![0.0; num_vars]],
        }
    }

    /// Take a trial step of size `step` from `qq` in place; returns the
    /// error estimate.
    fn trial_step<X>(&mut self, sys: &dyn OdeSystem<X>, step: f64) -> f64 {
        let n = self.qq.len();
        // k1 at q
        sys.der_func(&self.qq, &mut self.dq);
        for j in 0..n {
            self.k[0][j] = step * self.dq[j];
        }
        // k2 at q + k1/2
        for j in 0..n {
            self.tmp[j] = self.qq[j] + 0.5 * self.k[0][j];
        }
        sys.der_func(&self.tmp, &mut self.dq);
        for j in 0..n {
            self.k[1][j] = step * self.dq[j];
        }
        // Next state and error estimate.
        let mut err = 0.0f64;
        for j in 0..n {
            self.qq[j] += self.k[1][j];
            err = err.max((self.k[0][j] - self.k[1][j]).abs());
        }
        err
    }
}

impl<X> OdeSolver<X> for CorrectedEuler {
    fn integrate(&mut self, sys: &dyn OdeSystem<X>, q: &mut [f64], h_lim: f64) -> f64 {
        let mut h = (self.h_cur * 1.1).min(self.h_max).min(h_lim);
        loop {
            self.qq.copy_from_slice(q);
            let err = self.trial_step(sys, h);
            if err <= self.err_tol {
                // Keep h if it shrank only to respect h_lim.
                if h_lim >= self.h_cur {
                    self.h_cur = h;
                }
                break;
            }
            let h_guess = 0.8 * self.err_tol * h / err.abs();
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
