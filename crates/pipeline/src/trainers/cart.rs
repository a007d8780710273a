//! Histogram CART builder
//!
//! Features are pre-binned once per boosting run; each node accumulates
//! gradient/hessian histograms and picks the split with the best
//! second-order gain, breaking ties deterministically.

use crate::deterministic::SplitTieBreaker;

/// L2 penalty on leaf weights
pub const LEAF_L2: f64 = 1.0;

const MIN_GAIN: f64 = 1e-12;

/// Tree node; leaves carry a value, internal nodes a split
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub feature_index: usize,
    pub threshold: f32,
    pub left: usize,
    pub right: usize,
    pub value: Option<f64>,
}

impl Node {
    fn leaf(value: f64) -> Self {
        Self {
            feature_index: 0,
            threshold: 0.0,
            left: 0,
            right: 0,
            value: Some(value),
        }
    }
}

/// A regression tree stored as a flat node array rooted at index 0
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk the tree; values `<= threshold` go left, NaN goes right.
    pub fn predict(&self, row: &[f32]) -> f64 {
        let mut idx = 0usize;
        loop {
            let Some(node) = self.nodes.get(idx) else {
                return 0.0;
            };
            if let Some(value) = node.value {
                return value;
            }
            let v = row.get(node.feature_index).copied().unwrap_or(f32::NAN);
            idx = if v <= node.threshold { node.left } else { node.right };
        }
    }

    pub fn is_finite(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.threshold.is_finite() && n.value.map_or(true, f64::is_finite))
    }
}

/// Quantized view of the training matrix
#[derive(Debug, Clone)]
pub struct BinnedFeatures {
    /// Upper bin edges per feature; bin `b` holds values `<= thresholds[b]`
    thresholds: Vec<Vec<f32>>,
    /// Column-major bin index per feature and row
    bins: Vec<Vec<u16>>,
    rows: usize,
}

impl BinnedFeatures {
    pub fn fit(x: &[&[f32]], max_bins: usize) -> Self {
        let width = x.first().map_or(0, |r| r.len());
        let mut thresholds = Vec::with_capacity(width);
        let mut bins = Vec::with_capacity(width);

        for feature in 0..width {
            let mut distinct: Vec<f32> = x.iter().map(|r| r[feature]).collect();
            distinct.sort_by(f32::total_cmp);
            distinct.dedup();

            let edges = bin_edges(&distinct, max_bins.clamp(2, u16::MAX as usize));
            bins.push(
                x.iter()
                    .map(|r| edges.partition_point(|t| *t < r[feature]) as u16)
                    .collect(),
            );
            thresholds.push(edges);
        }

        Self {
            thresholds,
            bins,
            rows: x.len(),
        }
    }

    pub fn feature_count(&self) -> usize {
        self.thresholds.len()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn bin_count(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }
}

/// Midpoints between distinct values, thinned to quantiles past `max_bins`
fn bin_edges(distinct: &[f32], max_bins: usize) -> Vec<f32> {
    let midpoint = |i: usize| ((distinct[i - 1] as f64 + distinct[i] as f64) / 2.0) as f32;

    if distinct.len() <= max_bins {
        return (1..distinct.len()).map(midpoint).collect();
    }

    let mut edges: Vec<f32> = (1..max_bins)
        .map(|k| midpoint((k * distinct.len() / max_bins).max(1)))
        .collect();
    edges.dedup();
    edges
}

/// Parameters for a single tree
#[derive(Clone, Debug)]
pub struct CartConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    bin: usize,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, bin: usize, gain: f64, node_id: usize) -> Self {
        Self {
            feature_idx,
            bin,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, bin, node_id),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    gradient: f64,
    hessian: f64,
    count: usize,
}

impl Bucket {
    fn add(&mut self, other: &Bucket) {
        self.gradient += other.gradient;
        self.hessian += other.hessian;
        self.count += other.count;
    }

    fn score(&self) -> f64 {
        self.gradient * self.gradient / (self.hessian + LEAF_L2)
    }

    fn leaf_value(&self) -> f64 {
        -self.gradient / (self.hessian + LEAF_L2)
    }
}

/// Build one regression tree on gradient statistics
pub struct CartBuilder<'a> {
    binned: &'a BinnedFeatures,
    gradients: &'a [f64],
    hessians: &'a [f64],
    config: CartConfig,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        binned: &'a BinnedFeatures,
        gradients: &'a [f64],
        hessians: &'a [f64],
        config: CartConfig,
    ) -> Self {
        debug_assert_eq!(binned.rows(), gradients.len());
        debug_assert_eq!(gradients.len(), hessians.len());
        Self {
            binned,
            gradients,
            hessians,
            config,
        }
    }

    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.gradients.len()).collect();
        self.build_node(&indices, 0, &mut nodes, 0);
        Tree { nodes }
    }

    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>, node_id: usize) -> usize {
        let current_idx = nodes.len();
        let total = self.totals(indices);

        if depth >= self.config.max_depth || indices.len() < 2 * self.config.min_samples_leaf {
            nodes.push(Node::leaf(total.leaf_value()));
            return current_idx;
        }

        let Some(split) = self.find_best_split(indices, &total, node_id) else {
            nodes.push(Node::leaf(total.leaf_value()));
            return current_idx;
        };

        let bins = &self.binned.bins[split.feature_idx];
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| bins[i] as usize <= split.bin);

        nodes.push(Node {
            feature_index: split.feature_idx,
            threshold: self.binned.thresholds[split.feature_idx][split.bin],
            left: 0,
            right: 0,
            value: None,
        });

        let left_idx = self.build_node(&left, depth + 1, nodes, node_id * 2 + 1);
        let right_idx = self.build_node(&right, depth + 1, nodes, node_id * 2 + 2);
        nodes[current_idx].left = left_idx;
        nodes[current_idx].right = right_idx;

        current_idx
    }

    fn totals(&self, indices: &[usize]) -> Bucket {
        let mut total = Bucket::default();
        for &i in indices {
            total.gradient += self.gradients[i];
            total.hessian += self.hessians[i];
            total.count += 1;
        }
        total
    }

    fn find_best_split(&self, indices: &[usize], total: &Bucket, node_id: usize) -> Option<SplitCandidate> {
        let parent_score = total.score();
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.binned.feature_count() {
            let bin_count = self.binned.bin_count(feature_idx);
            if bin_count < 2 {
                continue;
            }

            let bins = &self.binned.bins[feature_idx];
            let mut histogram = vec![Bucket::default(); bin_count];
            for &i in indices {
                let bucket = &mut histogram[bins[i] as usize];
                bucket.gradient += self.gradients[i];
                bucket.hessian += self.hessians[i];
                bucket.count += 1;
            }

            let mut left = Bucket::default();
            for (bin, bucket) in histogram.iter().enumerate().take(bin_count - 1) {
                left.add(bucket);
                let right = Bucket {
                    gradient: total.gradient - left.gradient,
                    hessian: total.hessian - left.hessian,
                    count: total.count - left.count,
                };
                if left.count < min_leaf || right.count < min_leaf {
                    continue;
                }

                let gain = left.score() + right.score() - parent_score;
                if gain <= MIN_GAIN {
                    continue;
                }

                let candidate = SplitCandidate::new(feature_idx, bin, gain, node_id);
                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views(rows: &[Vec<f32>]) -> Vec<&[f32]> {
        rows.iter().map(|r| r.as_slice()).collect()
    }

    #[test]
    fn test_bin_edges_are_midpoints() {
        assert_eq!(bin_edges(&[1.0, 2.0, 4.0], 255), vec![1.5, 3.0]);
        assert!(bin_edges(&[5.0], 255).is_empty());

        let many: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let edges = bin_edges(&many, 4);
        assert_eq!(edges.len(), 3);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_simple_split() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let binned = BinnedFeatures::fit(&views(&rows), 255);
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        let hessians = vec![1.0; 4];

        let config = CartConfig {
            max_depth: 2,
            min_samples_leaf: 1,
        };
        let tree = CartBuilder::new(&binned, &gradients, &hessians, config).build();

        assert_eq!(tree.nodes[0].threshold, 2.5);
        assert!(tree.predict(&[1.5]) > 0.0);
        assert!(tree.predict(&[3.5]) < 0.0);
        assert!(tree.predict(&[f32::NAN]) < 0.0);
    }

    #[test]
    fn test_leaf_only_tree() {
        let rows = vec![vec![1.0]];
        let binned = BinnedFeatures::fit(&views(&rows), 255);
        let config = CartConfig {
            max_depth: 4,
            min_samples_leaf: 10,
        };
        let tree = CartBuilder::new(&binned, &[-1.0], &[1.0], config).build();

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].value, Some(0.5));
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let rows: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32]).collect();
        let binned = BinnedFeatures::fit(&views(&rows), 255);
        let gradients: Vec<f64> = (0..10).map(|i| if i == 0 { -5.0 } else { 1.0 }).collect();
        let hessians = vec![1.0; 10];
        let config = CartConfig {
            max_depth: 3,
            min_samples_leaf: 3,
        };
        let tree = CartBuilder::new(&binned, &gradients, &hessians, config).build();

        for node in tree.nodes.iter().filter(|n| n.value.is_none()) {
            assert!(node.threshold >= 2.5 && node.threshold <= 6.5);
        }
    }
}
