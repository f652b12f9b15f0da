//! Bounded quasi-Newton optimizer
//!
//! A small L-BFGS with a backtracking Armijo line search, sized for the
//! handful of scalars a calibration wrapper carries. The iteration cap is the
//! only hard bound; the optimizer otherwise stops on its own gradient and
//! function-change tolerances and returns whatever parameters result.
use crate::constants::{
    CHANGE_TOLERANCE, GRADIENT_TOLERANCE, LBFGS_HISTORY, LEARNING_RATE, MAX_ITERATIONS, MAX_LINE_SEARCH_STEPS,
};
use crate::utils::{dot, inf_norm};
use serde::{Deserialize, Serialize};

const ARMIJO_C1: f64 = 1e-4;
const CURVATURE_EPS: f64 = 1e-10;

/// Outcome of one fitting run.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct FitSummary {
    /// Optimizer steps taken, at most the iteration cap.
    pub iterations: usize,
    /// Loss at the initial parameters.
    pub initial_loss: f64,
    /// Loss at the returned parameters.
    pub final_loss: f64,
    /// Whether the optimizer's own stopping rule fired before the cap.
    pub converged: bool,
}

/// Limited-memory BFGS minimizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lbfgs {
    /// Scales the very first step, before any curvature history exists.
    pub learning_rate: f64,
    /// Hard cap on optimizer steps.
    pub max_iterations: usize,
    /// Number of curvature pairs kept for the two-loop recursion.
    pub history: usize,
    /// Stop when the gradient infinity norm falls below this.
    pub gradient_tolerance: f64,
    /// Stop when the relative loss change falls below this.
    pub change_tolerance: f64,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Lbfgs {
            learning_rate: LEARNING_RATE,
            max_iterations: MAX_ITERATIONS,
            history: LBFGS_HISTORY,
            gradient_tolerance: GRADIENT_TOLERANCE,
            change_tolerance: CHANGE_TOLERANCE,
        }
    }
}

impl Lbfgs {
    /// Minimize `f`, a loss returning its value and gradient, starting from
    /// `x0`. Returns the best parameters found and a [`FitSummary`].
    pub fn minimize<F>(&self, f: F, x0: Vec<f64>) -> (Vec<f64>, FitSummary)
    where
        F: Fn(&[f64]) -> (f64, Vec<f64>),
    {
        let mut x = x0;
        let (mut fx, mut grad) = f(&x);
        let initial_loss = fx;

        let mut s_hist: Vec<Vec<f64>> = Vec::new();
        let mut y_hist: Vec<Vec<f64>> = Vec::new();
        let mut rho: Vec<f64> = Vec::new();

        let mut iterations = 0;
        let mut converged = inf_norm(&grad) <= self.gradient_tolerance;

        while !converged && iterations < self.max_iterations {
            let mut direction = two_loop_direction(&grad, &s_hist, &y_hist, &rho);
            let mut dg = dot(&direction, &grad);
            if dg >= 0.0 {
                // History produced a non-descent direction, fall back to
                // steepest descent.
                direction = grad.iter().map(|g| -g).collect();
                dg = -dot(&grad, &grad);
            }

            // Before any curvature history exists the unit step is
            // uninformed, scale it by the learning rate.
            let first_step = if s_hist.is_empty() {
                let grad_l1: f64 = grad.iter().map(|g| g.abs()).sum();
                f64::min(1.0, 1.0 / grad_l1) * self.learning_rate
            } else {
                1.0
            };

            let mut step = first_step;
            let mut accepted = None;
            for _ in 0..MAX_LINE_SEARCH_STEPS {
                let x_new: Vec<f64> = x.iter().zip(&direction).map(|(xi, di)| xi + step * di).collect();
                let (fx_new, grad_new) = f(&x_new);
                if fx_new <= fx + ARMIJO_C1 * step * dg {
                    accepted = Some((x_new, fx_new, grad_new));
                    break;
                }
                step *= 0.5;
            }

            let (x_new, fx_new, grad_new) = match accepted {
                Some(t) => t,
                // The line search cannot make progress, stop here and keep
                // the current parameters.
                None => break,
            };
            iterations += 1;

            let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
            let y: Vec<f64> = grad_new.iter().zip(&grad).map(|(a, b)| a - b).collect();
            let sy = dot(&s, &y);
            if sy > CURVATURE_EPS {
                if s_hist.len() == self.history {
                    s_hist.remove(0);
                    y_hist.remove(0);
                    rho.remove(0);
                }
                s_hist.push(s);
                y_hist.push(y);
                rho.push(1.0 / sy);
            }

            let change = (fx - fx_new).abs();
            x = x_new;
            fx = fx_new;
            grad = grad_new;

            if inf_norm(&grad) <= self.gradient_tolerance || change <= self.change_tolerance * (1.0 + fx.abs()) {
                converged = true;
            }
        }

        let summary = FitSummary {
            iterations,
            initial_loss,
            final_loss: fx,
            converged,
        };
        (x, summary)
    }
}

/// Two-loop recursion producing the (negated) L-BFGS search direction.
fn two_loop_direction(grad: &[f64], s_hist: &[Vec<f64>], y_hist: &[Vec<f64>], rho: &[f64]) -> Vec<f64> {
    let mut q = grad.to_vec();
    let k = s_hist.len();
    let mut alpha = vec![0.0; k];

    for i in (0..k).rev() {
        alpha[i] = rho[i] * dot(&s_hist[i], &q);
        for (qj, yj) in q.iter_mut().zip(&y_hist[i]) {
            *qj -= alpha[i] * yj;
        }
    }

    if k > 0 {
        let gamma = dot(&s_hist[k - 1], &y_hist[k - 1]) / dot(&y_hist[k - 1], &y_hist[k - 1]);
        for qj in q.iter_mut() {
            *qj *= gamma;
        }
    }

    for i in 0..k {
        let beta = rho[i] * dot(&y_hist[i], &q);
        for (qj, sj) in q.iter_mut().zip(&s_hist[i]) {
            *qj += (alpha[i] - beta) * sj;
        }
    }

    for qj in q.iter_mut() {
        *qj = -*qj;
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimize_quadratic() {
        // f(x) = sum (x_i - c_i)^2
        let c = [3.0, -1.5, 0.25];
        let f = |x: &[f64]| {
            let loss: f64 = x.iter().zip(&c).map(|(xi, ci)| (xi - ci) * (xi - ci)).sum();
            let grad: Vec<f64> = x.iter().zip(&c).map(|(xi, ci)| 2.0 * (xi - ci)).collect();
            (loss, grad)
        };
        let (x, summary) = Lbfgs::default().minimize(f, vec![0.0; 3]);
        assert!(summary.converged);
        assert!(summary.final_loss < 1e-8);
        for (xi, ci) in x.iter().zip(&c) {
            assert!((xi - ci).abs() < 1e-4, "{} vs {}", xi, ci);
        }
    }

    #[test]
    fn test_loss_never_increases() {
        let f = |x: &[f64]| {
            let loss = (x[0] - 2.0).powi(4) + 0.5 * x[1] * x[1];
            let grad = vec![4.0 * (x[0] - 2.0).powi(3), x[1]];
            (loss, grad)
        };
        let (_, summary) = Lbfgs::default().minimize(f, vec![-1.0, 3.0]);
        assert!(summary.final_loss <= summary.initial_loss);
        assert!(summary.iterations <= MAX_ITERATIONS);
    }

    #[test]
    fn test_already_optimal_takes_no_steps() {
        let f = |x: &[f64]| {
            let loss = x[0] * x[0];
            let grad = vec![2.0 * x[0]];
            (loss, grad)
        };
        let (x, summary) = Lbfgs::default().minimize(f, vec![0.0]);
        assert_eq!(summary.iterations, 0);
        assert!(summary.converged);
        assert_eq!(x, vec![0.0]);
    }

    #[test]
    fn test_iteration_cap_respected() {
        let optimizer = Lbfgs {
            max_iterations: 3,
            gradient_tolerance: 0.0,
            change_tolerance: 0.0,
            ..Lbfgs::default()
        };
        let f = |x: &[f64]| {
            let loss = (x[0] - 100.0) * (x[0] - 100.0);
            let grad = vec![2.0 * (x[0] - 100.0)];
            (loss, grad)
        };
        let (_, summary) = optimizer.minimize(f, vec![0.0]);
        assert!(summary.iterations <= 3);
    }

    #[test]
    fn test_deterministic_runs() {
        let f = |x: &[f64]| {
            let loss = (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2) + x[0] * x[1] * 0.1;
            let grad = vec![2.0 * (x[0] - 1.0) + 0.1 * x[1], 2.0 * (x[1] + 2.0) + 0.1 * x[0]];
            (loss, grad)
        };
        let (x1, s1) = Lbfgs::default().minimize(f, vec![5.0, 5.0]);
        let (x2, s2) = Lbfgs::default().minimize(f, vec![5.0, 5.0]);
        assert_eq!(x1, x2);
        assert_eq!(s1, s2);
    }
}
