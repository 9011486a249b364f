// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! L2-regularized logistic regression over sparse features
//!
//! Minimizes `mean(log_loss) + ||W||^2 / (2 * C * n)` with L-BFGS. Two classes
//! use a single weight row (sigmoid), more classes use one row per class
//! (softmax). Intercepts are not penalized.

use crate::error::{ClassifierError, Result};
use crate::vectorizer::SparseVector;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const HISTORY: usize = 10;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

/// Solver hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    /// Stop once the largest gradient component falls below this
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 200,
            tol: 1e-4,
        }
    }
}

/// Fitted weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    /// One row for binary problems, one per class otherwise
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    pub n_classes: usize,
    pub n_iter: usize,
    pub converged: bool,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c,
            max_iter,
            ..Self::default()
        }
    }

    /// Fit on `features` with class indices `targets` in `0..n_classes`.
    pub fn fit(
        &self,
        features: &[SparseVector],
        n_features: usize,
        targets: &[usize],
        n_classes: usize,
    ) -> Result<LogisticModel> {
        if features.len() != targets.len() {
            return Err(ClassifierError::InvalidInput(format!(
                "{} feature rows but {} targets",
                features.len(),
                targets.len()
            )));
        }
        if features.is_empty() {
            return Err(ClassifierError::NotEnoughData("no training rows".to_string()));
        }
        if n_classes < 2 {
            return Err(ClassifierError::NotEnoughData(format!(
                "logistic regression needs at least 2 classes, got {}",
                n_classes
            )));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= n_classes) {
            return Err(ClassifierError::InvalidInput(format!(
                "target {} out of range for {} classes",
                bad, n_classes
            )));
        }

        let objective = Objective {
            features,
            targets,
            n_features,
            rows: if n_classes == 2 { 1 } else { n_classes },
            penalty: 1.0 / (2.0 * self.c * features.len() as f64),
        };

        let x0 = vec![0.0; objective.rows * (n_features + 1)];
        let outcome = lbfgs(|x| objective.evaluate(x), x0, self.max_iter, self.tol);

        if outcome.converged {
            tracing::debug!("L-BFGS converged after {} iterations", outcome.n_iter);
        } else {
            tracing::warn!(
                "L-BFGS stopped after {} iterations without converging; increase max_iter",
                outcome.n_iter
            );
        }

        let (coef, intercept) = objective.unpack(&outcome.x);
        Ok(LogisticModel {
            coef,
            intercept,
            n_classes,
            n_iter: outcome.n_iter,
            converged: outcome.converged,
        })
    }
}

impl LogisticModel {
    pub fn n_features(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    /// Class probabilities for one row, summing to 1
    pub fn predict_proba_one(&self, x: &SparseVector) -> Vec<f64> {
        let scores: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| sparse_dot(w, x) + b)
            .collect();

        if self.n_classes == 2 {
            let p = sigmoid(scores[0]);
            vec![1.0 - p, p]
        } else {
            softmax(&scores)
        }
    }

    pub fn predict_proba(&self, rows: &[SparseVector]) -> Vec<Vec<f64>> {
        rows.iter().map(|x| self.predict_proba_one(x)).collect()
    }
}

/// Penalized mean log-loss with parameters laid out as all weight rows
/// followed by the intercepts.
struct Objective<'a> {
    features: &'a [SparseVector],
    targets: &'a [usize],
    n_features: usize,
    rows: usize,
    penalty: f64,
}

impl Objective<'_> {
    fn unpack(&self, x: &[f64]) -> (Vec<Vec<f64>>, Vec<f64>) {
        let d = self.n_features;
        let coef = (0..self.rows).map(|r| x[r * d..(r + 1) * d].to_vec()).collect();
        let intercept = x[self.rows * d..].to_vec();
        (coef, intercept)
    }

    fn evaluate(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let d = self.n_features;
        let n = self.features.len() as f64;
        let bias_offset = self.rows * d;
        let mut grad = vec![0.0; x.len()];
        let mut loss = 0.0;
        let mut scores = vec![0.0; self.rows];

        for (row, &target) in self.features.iter().zip(self.targets) {
            for (r, score) in scores.iter_mut().enumerate() {
                *score = sparse_dot(&x[r * d..(r + 1) * d], row) + x[bias_offset + r];
            }

            // Per-row derivative of the loss with respect to each score
            let residuals: Vec<f64> = if self.rows == 1 {
                let z = scores[0];
                let y = target as f64;
                loss += softplus(z) - y * z;
                vec![sigmoid(z) - y]
            } else {
                let lse = log_sum_exp(&scores);
                loss += lse - scores[target];
                scores
                    .iter()
                    .enumerate()
                    .map(|(k, s)| (s - lse).exp() - if k == target { 1.0 } else { 0.0 })
                    .collect()
            };

            for (r, residual) in residuals.into_iter().enumerate() {
                for &(j, v) in row {
                    grad[r * d + j] += residual * v;
                }
                grad[bias_offset + r] += residual;
            }
        }

        loss /= n;
        for g in &mut grad {
            *g /= n;
        }

        let mut reg = 0.0;
        for (w, g) in x[..bias_offset].iter().zip(&mut grad[..bias_offset]) {
            reg += w * w;
            *g += 2.0 * self.penalty * w;
        }
        loss += self.penalty * reg;

        (loss, grad)
    }
}

struct Outcome {
    x: Vec<f64>,
    n_iter: usize,
    converged: bool,
}

struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Limited-memory BFGS with Armijo backtracking.
fn lbfgs<F>(f: F, mut x: Vec<f64>, max_iter: usize, tol: f64) -> Outcome
where
    F: Fn(&[f64]) -> (f64, Vec<f64>),
{
    let (mut fx, mut g) = f(&x);
    let mut history: VecDeque<Correction> = VecDeque::with_capacity(HISTORY);
    let mut n_iter = 0;

    while n_iter < max_iter {
        if inf_norm(&g) <= tol {
            return Outcome { x, n_iter, converged: true };
        }

        let mut direction = two_loop(&g, &history);
        let mut slope = dot(&direction, &g);
        if slope >= 0.0 {
            history.clear();
            direction = two_loop(&g, &history);
            slope = dot(&direction, &g);
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let candidate: Vec<f64> = x.iter().zip(&direction).map(|(xi, di)| xi + step * di).collect();
            let (f_new, g_new) = f(&candidate);
            if f_new <= fx + ARMIJO * step * slope {
                accepted = Some((candidate, f_new, g_new));
                break;
            }
            step *= 0.5;
        }

        n_iter += 1;
        let Some((x_new, f_new, g_new)) = accepted else {
            if history.is_empty() {
                // Steepest descent cannot make progress either
                return Outcome { x, n_iter, converged: false };
            }
            history.clear();
            continue;
        };

        let s: Vec<f64> = x_new.iter().zip(&x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back(Correction { s, y, rho: 1.0 / sy });
        }

        let decrease = (fx - f_new) / fx.abs().max(f_new.abs()).max(1.0);
        x = x_new;
        fx = f_new;
        g = g_new;

        if decrease <= 64.0 * f64::EPSILON {
            return Outcome { x, n_iter, converged: true };
        }
    }

    let converged = inf_norm(&g) <= tol;
    Outcome { x, n_iter, converged }
}

/// Approximate `-H * g` from the stored corrections.
fn two_loop(g: &[f64], history: &VecDeque<Correction>) -> Vec<f64> {
    let mut q = g.to_vec();

    let Some(latest) = history.back() else {
        let scale = 1.0 / l2_norm(g).max(1.0);
        return q.iter().map(|v| -v * scale).collect();
    };

    let mut alphas = Vec::with_capacity(history.len());
    for c in history.iter().rev() {
        let alpha = c.rho * dot(&c.s, &q);
        axpy(-alpha, &c.y, &mut q);
        alphas.push(alpha);
    }

    let gamma = dot(&latest.s, &latest.y) / dot(&latest.y, &latest.y);
    for v in &mut q {
        *v *= gamma;
    }

    for (c, alpha) in history.iter().zip(alphas.into_iter().rev()) {
        let beta = c.rho * dot(&c.y, &q);
        axpy(alpha - beta, &c.s, &mut q);
    }

    q.iter().map(|v| -v).collect()
}

fn sparse_dot(dense: &[f64], sparse: &SparseVector) -> f64 {
    sparse.iter().map(|&(j, v)| dense[j] * v).sum()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

fn l2_norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}

fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    z.max(0.0) + (-z.abs()).exp().ln_1p()
}

fn log_sum_exp(scores: &[f64]) -> f64 {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln()
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(scores);
    scores.iter().map(|s| (s - lse).exp()).collect()
}
