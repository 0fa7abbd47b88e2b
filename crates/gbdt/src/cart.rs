//! CART (Classification and Regression Tree) builder
//!
//! Deterministic exact-greedy tree construction over quantised value bins,
//! using second-order gradient statistics and fixed-point arithmetic only.

use std::collections::BTreeMap;

use crate::deterministic::SplitTieBreaker;
use crate::model::SCALE;
use crate::tree::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Width of a value bin in fixed-point units; candidate thresholds are bin maxima
    pub quant_step: i64,
    /// L2 regularisation added to every hessian sum (fixed-point)
    pub l2_regularization: i64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 7,
            min_samples_leaf: 1,
            quant_step: 1,
            l2_regularization: SCALE,
        }
    }
}

#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: i64,
    gain: i128,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: i64, gain: i128, node_id: usize) -> Self {
        Self {
            feature_idx,
            threshold,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold, node_id),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain || (self.gain == other.gain && self.tie_breaker < other.tie_breaker)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct BinStats {
    gradient: i128,
    hessian: i128,
    count: usize,
    max_value: i64,
}

/// Builds one regression tree fitted to the supplied gradients and hessians
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<i64>],
    gradients: &'a [i64],
    hessians: &'a [i64],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    /// Callers guarantee equal lengths for `features`, `gradients` and `hessians`.
    pub fn new(
        features: &'a [Vec<i64>],
        gradients: &'a [i64],
        hessians: &'a [i64],
        config: TreeConfig,
    ) -> Self {
        debug_assert_eq!(features.len(), gradients.len());
        debug_assert_eq!(features.len(), hessians.len());

        let feature_count = features.first().map_or(0, Vec::len);

        Self {
            config,
            features,
            gradients,
            hessians,
            feature_count,
        }
    }

    /// Build tree and return nodes
    pub fn build(&self) -> Tree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.features.len()).collect();

        self.build_node(&indices, 0, &mut nodes, 0);

        Tree { nodes }
    }

    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>, node_id: usize) -> i32 {
        let current_idx = nodes.len() as i32;

        let split = if depth >= self.config.max_depth
            || indices.len() < 2 * self.config.min_samples_leaf.max(1)
        {
            None
        } else {
            self.find_best_split(indices, node_id)
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(current_idx, self.leaf_value(indices)));
            return current_idx;
        };

        let (left_indices, right_indices) =
            self.split_samples(indices, split.feature_idx, split.threshold);

        // Reserve the slot; children are patched in once built
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, node_id * 2 + 1);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, node_id * 2 + 2);

        nodes[current_idx as usize].left = left_idx;
        nodes[current_idx as usize].right = right_idx;

        current_idx
    }

    fn find_best_split(&self, indices: &[usize], node_id: usize) -> Option<SplitCandidate> {
        let (g_total, h_total) = self.sum_gradients_hessians(indices);
        let parent_score = self.score(g_total, h_total);
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.feature_count {
            let bins = self.bin_feature(indices, feature_idx);
            if bins.len() < 2 {
                continue;
            }

            let mut g_left = 0i128;
            let mut h_left = 0i128;
            let mut n_left = 0usize;

            // The last bin can never be a left side
            for stats in bins.values().take(bins.len() - 1) {
                g_left += stats.gradient;
                h_left += stats.hessian;
                n_left += stats.count;

                let n_right = indices.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let gain = self.score(g_left, h_left) + self.score(g_total - g_left, h_total - h_left)
                    - parent_score;
                if gain <= 0 {
                    continue;
                }

                let candidate = SplitCandidate::new(feature_idx, stats.max_value, gain, node_id);
                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Aggregate gradient statistics per quantised value bin, in ascending bin order
    fn bin_feature(&self, indices: &[usize], feature_idx: usize) -> BTreeMap<i64, BinStats> {
        let step = self.config.quant_step.max(1);
        let mut bins: BTreeMap<i64, BinStats> = BTreeMap::new();

        for &idx in indices {
            let value = self.features[idx][feature_idx];
            let entry = bins.entry(value.div_euclid(step)).or_insert(BinStats {
                max_value: value,
                ..BinStats::default()
            });
            entry.gradient += self.gradients[idx] as i128;
            entry.hessian += self.hessians[idx] as i128;
            entry.count += 1;
            entry.max_value = entry.max_value.max(value);
        }

        bins
    }

    fn split_samples(&self, indices: &[usize], feature_idx: usize, threshold: i64) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .copied()
            .partition(|&idx| self.features[idx][feature_idx] <= threshold)
    }

    /// Structure score G^2 / (H + lambda)
    fn score(&self, g: i128, h: i128) -> i128 {
        let denom = h + self.config.l2_regularization as i128;
        if denom <= 0 {
            return 0;
        }
        (g * g) / denom
    }

    fn sum_gradients_hessians(&self, indices: &[usize]) -> (i128, i128) {
        indices.iter().fold((0i128, 0i128), |(g, h), &idx| {
            (g + self.gradients[idx] as i128, h + self.hessians[idx] as i128)
        })
    }

    /// Optimal leaf value -G / (H + lambda), fixed-point
    fn leaf_value(&self, indices: &[usize]) -> i64 {
        let (sum_g, sum_h) = self.sum_gradients_hessians(indices);
        let denom = sum_h + self.config.l2_regularization as i128;

        if denom <= 0 {
            return 0;
        }

        let value = -(sum_g * SCALE as i128) / denom;
        value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}
