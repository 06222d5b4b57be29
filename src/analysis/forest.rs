//! Bagged regression trees used as nuisance models.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::error::{PipelineError, Result};

/// A learner that can be fitted on one sample and scored on another.
pub trait Regressor: Send + Sync {
    fn fit_predict(
        &self,
        train_x: &[Vec<f64>],
        train_y: &[f64],
        test_x: &[Vec<f64>],
        seed: u64,
    ) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One CART regression tree stored as a node arena; index 0 is the root.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    max_depth: Option<usize>,
    min_samples_leaf: usize,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: &mut [usize], depth: usize) -> usize {
        let n = indices.len();
        let mean = indices.iter().map(|&i| self.y[i]).sum::<f64>() / n as f64;

        let at_depth_limit = self.max_depth.is_some_and(|max| depth >= max);
        let pure = indices.iter().all(|&i| (self.y[i] - mean).abs() <= f64::EPSILON * mean.abs().max(1.0));
        if at_depth_limit || pure || n < 2 * self.min_samples_leaf {
            return self.push(Node::Leaf(mean));
        }

        let Some((feature, threshold)) = self.best_split(indices) else {
            return self.push(Node::Leaf(mean));
        };

        // Partition in place: rows going left first.
        let mut boundary = 0;
        for position in 0..n {
            if self.x[indices[position]][feature] <= threshold {
                indices.swap(boundary, position);
                boundary += 1;
            }
        }

        let slot = self.push(Node::Leaf(mean));
        let (left_rows, right_rows) = indices.split_at_mut(boundary);
        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[slot] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        slot
    }

    fn push(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Feature and threshold with the largest squared-error reduction.
    fn best_split(&self, indices: &[usize]) -> Option<(usize, f64)> {
        let n = indices.len();
        let total: f64 = indices.iter().map(|&i| self.y[i]).sum();
        let parent_score = total * total / n as f64;
        let features = self.x.first().map(Vec::len).unwrap_or(0);

        let mut best: Option<(f64, usize, f64)> = None;
        let mut order = indices.to_vec();

        for feature in 0..features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            for split in 1..n {
                left_sum += self.y[order[split - 1]];
                let left_value = self.x[order[split - 1]][feature];
                let right_value = self.x[order[split]][feature];
                if left_value == right_value
                    || split < self.min_samples_leaf
                    || n - split < self.min_samples_leaf
                {
                    continue;
                }

                let right_sum = total - left_sum;
                let score = left_sum * left_sum / split as f64
                    + right_sum * right_sum / (n - split) as f64;
                let gain = score - parent_score;
                if gain > 0.0 && best.map_or(true, |(g, _, _)| gain > g) {
                    best = Some((gain, feature, (left_value + right_value) / 2.0));
                }
            }
        }

        best.map(|(_, feature, threshold)| (feature, threshold))
    }
}

/// Random forest of bootstrapped CART trees, averaging their predictions.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
}

impl Default for RandomForestRegressor {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
        }
    }
}

/// Trees produced by [`RandomForestRegressor::fit`]
#[derive(Debug, Clone)]
pub struct FittedForest {
    trees: Vec<RegressionTree>,
}

impl FittedForest {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize, max_depth: Option<usize>) -> Self {
        Self {
            n_estimators,
            max_depth,
            ..Self::default()
        }
    }

    pub fn fit(&self, x: &[Vec<f64>], y: &[f64], seed: u64) -> Result<FittedForest> {
        if x.is_empty() || x.len() != y.len() {
            return Err(PipelineError::Estimation(format!(
                "random forest needs matching non-empty inputs, got {} rows and {} targets",
                x.len(),
                y.len()
            )));
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::Estimation("n_estimators must be at least 1".to_string()));
        }

        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        let n = x.len();
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let mut sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut builder = TreeBuilder {
                x,
                y,
                max_depth: self.max_depth,
                min_samples_leaf: self.min_samples_leaf.max(1),
                nodes: Vec::new(),
            };
            builder.build(&mut sample, 0);
            trees.push(RegressionTree { nodes: builder.nodes });
        }

        Ok(FittedForest { trees })
    }
}

impl Regressor for RandomForestRegressor {
    fn fit_predict(
        &self,
        train_x: &[Vec<f64>],
        train_y: &[f64],
        test_x: &[Vec<f64>],
        seed: u64,
    ) -> Result<Vec<f64>> {
        Ok(self.fit(train_x, train_y, seed)?.predict(test_x))
    }
}
