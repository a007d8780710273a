//! Gradient boosted decision trees for binary classification
//!
//! Boosts histogram CART trees on the logistic loss, starting from the
//! log-odds of the training positive rate.

use tracing::debug;

use super::cart::{BinnedFeatures, CartBuilder, CartConfig, Tree};
use crate::config::TreeConfig;

const MIN_HESSIAN: f64 = 1e-12;
const RATE_CLAMP: f64 = 1e-6;

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Boosted tree ensemble producing a positive-class probability
#[derive(Debug, Clone)]
pub struct GbdtClassifier {
    trees: Vec<Tree>,
    bias: f64,
    learning_rate: f64,
}

impl GbdtClassifier {
    pub fn fit(x: &[&[f32]], y: &[bool], config: &TreeConfig) -> Self {
        let bias = Self::calculate_bias(y);
        let binned = BinnedFeatures::fit(x, config.max_bins);
        let targets: Vec<f64> = y.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect();

        let mut margins = vec![bias; x.len()];
        let mut gradients = vec![0.0; x.len()];
        let mut hessians = vec![0.0; x.len()];
        let mut trees = Vec::with_capacity(config.num_trees);

        for tree_idx in 0..config.num_trees {
            for i in 0..margins.len() {
                let p = sigmoid(margins[i]);
                gradients[i] = p - targets[i];
                hessians[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let tree = CartBuilder::new(
                &binned,
                &gradients,
                &hessians,
                CartConfig {
                    max_depth: config.max_depth,
                    min_samples_leaf: config.min_samples_leaf,
                },
            )
            .build();

            for (margin, row) in margins.iter_mut().zip(x) {
                *margin += config.learning_rate * tree.predict(row);
            }

            debug!(tree = tree_idx + 1, nodes = tree.nodes.len(), "boosted tree");
            trees.push(tree);
        }

        Self {
            trees,
            bias,
            learning_rate: config.learning_rate,
        }
    }

    /// Log-odds of the positive rate, clamped away from 0 and 1
    fn calculate_bias(y: &[bool]) -> f64 {
        if y.is_empty() {
            return 0.0;
        }
        let rate = y.iter().filter(|&&v| v).count() as f64 / y.len() as f64;
        let rate = rate.clamp(RATE_CLAMP, 1.0 - RATE_CLAMP);
        (rate / (1.0 - rate)).ln()
    }

    pub fn margin(&self, row: &[f32]) -> f64 {
        self.bias
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn probability(&self, row: &[f32]) -> f64 {
        sigmoid(self.margin(row))
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn is_finite(&self) -> bool {
        self.bias.is_finite() && self.trees.iter().all(Tree::is_finite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views(rows: &[Vec<f32>]) -> Vec<&[f32]> {
        rows.iter().map(|r| r.as_slice()).collect()
    }

    fn small_config() -> TreeConfig {
        TreeConfig {
            num_trees: 10,
            max_depth: 2,
            min_samples_leaf: 2,
            ..TreeConfig::default()
        }
    }

    #[test]
    fn test_bias_calculation() {
        assert_eq!(GbdtClassifier::calculate_bias(&[true, false]), 0.0);
        assert!(GbdtClassifier::calculate_bias(&[true, true, true, false]) > 0.0);
        assert!(GbdtClassifier::calculate_bias(&[false; 3]).is_finite());
    }

    #[test]
    fn test_learns_threshold() {
        let rows: Vec<Vec<f32>> = (0..40).map(|i| vec![i as f32, (i % 5) as f32]).collect();
        let y: Vec<bool> = (0..40).map(|i| i >= 20).collect();

        let model = GbdtClassifier::fit(&views(&rows), &y, &small_config());

        assert_eq!(model.tree_count(), 10);
        assert!(model.probability(&[3.0, 1.0]) < 0.5);
        assert!(model.probability(&[35.0, 1.0]) > 0.5);
    }

    #[test]
    fn test_determinism() {
        let rows: Vec<Vec<f32>> = (0..30).map(|i| vec![(i * 7 % 11) as f32]).collect();
        let y: Vec<bool> = (0..30).map(|i| i % 3 == 0).collect();

        let first = GbdtClassifier::fit(&views(&rows), &y, &small_config());
        let second = GbdtClassifier::fit(&views(&rows), &y, &small_config());

        assert_eq!(first.trees, second.trees);
        assert_eq!(first.bias, second.bias);
    }
}
