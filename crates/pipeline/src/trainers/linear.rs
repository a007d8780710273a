//! Linear learners
//!
//! Regression uses stochastic dual coordinate ascent on a ridge objective.
//! Binary classification uses full-batch gradient descent on the regularized
//! log-loss. Both work on standardized features.

use tracing::debug;

use crate::config::{LogisticConfig, SdcaConfig};
use crate::deterministic::LcgRng;

/// Per-feature centering and scaling learned from training rows
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    /// Constant columns keep a scale of 1 and collapse to zero.
    pub fn fit(rows: &[&[f32]]) -> Self {
        let width = rows.first().map_or(0, |r| r.len());
        let n = rows.len().max(1) as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row.iter()) {
                *m += *v as f64;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, m), v) in scales.iter_mut().zip(&means).zip(row.iter()) {
                let d = *v as f64 - m;
                *s += d * d;
            }
        }
        for s in &mut scales {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Self { means, scales }
    }

    pub fn transform(&self, row: &[f32]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (*v as f64 - m) / s)
            .collect()
    }

    pub fn width(&self) -> usize {
        self.means.len()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Ridge regression fitted with SDCA
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    standardizer: Standardizer,
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearRegressor {
    /// Fit on rows `x` with targets `y`. Rows are visited in a fresh seeded
    /// order every epoch.
    pub fn fit(x: &[&[f32]], y: &[f64], config: &SdcaConfig, rng: &mut LcgRng) -> Self {
        let standardizer = Standardizer::fit(x);
        let z: Vec<Vec<f64>> = x.iter().map(|row| standardizer.transform(row)).collect();
        let n = z.len();

        let intercept = y.iter().sum::<f64>() / n.max(1) as f64;
        let residual_targets: Vec<f64> = y.iter().map(|v| v - intercept).collect();
        let norms: Vec<f64> = z.iter().map(|row| dot(row, row)).collect();

        let lambda_n = config.l2 * n as f64;
        let mut weights = vec![0.0; standardizer.width()];
        let mut duals = vec![0.0; n];
        let mut order: Vec<usize> = (0..n).collect();

        for epoch in 0..config.max_epochs {
            rng.shuffle(&mut order);
            let mut max_step: f64 = 0.0;

            for &i in &order {
                let margin = dot(&weights, &z[i]);
                let delta =
                    (residual_targets[i] - margin - duals[i]) / (1.0 + norms[i] / lambda_n);
                duals[i] += delta;

                let scale = delta / lambda_n;
                for (w, v) in weights.iter_mut().zip(&z[i]) {
                    let step = scale * v;
                    *w += step;
                    max_step = max_step.max(step.abs());
                }
            }

            let largest = weights.iter().fold(1.0_f64, |acc, w| acc.max(w.abs()));
            if max_step <= config.tolerance * largest {
                debug!(epoch, "sdca converged");
                break;
            }
        }

        Self {
            standardizer,
            weights,
            intercept,
        }
    }

    pub fn predict(&self, row: &[f32]) -> f64 {
        self.intercept + dot(&self.weights, &self.standardizer.transform(row))
    }

    pub fn is_finite(&self) -> bool {
        self.intercept.is_finite() && self.weights.iter().all(|w| w.is_finite())
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// L2-regularized logistic regression
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    standardizer: Standardizer,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticRegression {
    pub fn fit(x: &[&[f32]], y: &[bool], config: &LogisticConfig) -> Self {
        let standardizer = Standardizer::fit(x);
        let z: Vec<Vec<f64>> = x.iter().map(|row| standardizer.transform(row)).collect();
        let n = z.len().max(1) as f64;

        let mut weights = vec![0.0; standardizer.width()];
        let mut bias = 0.0;
        let mut grad = vec![0.0; weights.len()];

        for iteration in 0..config.max_iterations {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;

            for (row, label) in z.iter().zip(y) {
                let err = sigmoid(bias + dot(&weights, row)) - if *label { 1.0 } else { 0.0 };
                for (g, v) in grad.iter_mut().zip(row) {
                    *g += err * v;
                }
                grad_bias += err;
            }

            let mut largest = (grad_bias / n).abs();
            for (g, w) in grad.iter_mut().zip(&weights) {
                *g = *g / n + config.l2 * w;
                largest = largest.max(g.abs());
            }

            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= config.learning_rate * g;
            }
            bias -= config.learning_rate * grad_bias / n;

            if largest < config.tolerance {
                debug!(iteration, "logistic regression converged");
                break;
            }
        }

        Self {
            standardizer,
            weights,
            bias,
        }
    }

    /// Probability of the positive class
    pub fn probability(&self, row: &[f32]) -> f64 {
        sigmoid(self.bias + dot(&self.weights, &self.standardizer.transform(row)))
    }

    pub fn is_finite(&self) -> bool {
        self.bias.is_finite() && self.weights.iter().all(|w| w.is_finite())
    }
}
