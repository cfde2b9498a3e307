use super::{binary_proba, check_features, check_training_set, Classifier, Estimator, ModelError};
use linfa::prelude::*;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows every tree until its leaves are pure.
    pub max_depth: Option<usize>,
    pub seed: u64,
}

/// Ensemble of CART trees voting on the class. Every tree is grown on a
/// bootstrap sample of the rows and a random subset of the columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    trees: Vec<ForestTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestTree {
    /// Sorted column indices the tree was fitted on.
    features: Vec<usize>,
    tree: DecisionTree<f64, usize>,
}

/// Columns drawn per tree: `round(sqrt(n_features))`, at least one.
pub fn features_per_tree(n_features: usize) -> usize {
    ((n_features as f64).sqrt().round() as usize).clamp(1, n_features.max(1))
}

impl Estimator for ForestParams {
    type Model = RandomForest;

    fn fit(&self, records: &Array2<f64>, targets: &Array1<usize>) -> Result<RandomForest, ModelError> {
        check_training_set("RandomForest", records, targets)?;
        if self.n_estimators == 0 {
            return Err(ModelError::Fit {
                model: "RandomForest",
                reason: "n_estimators must be at least 1".to_string(),
            });
        }

        let rows = records.nrows();
        let n_features = records.ncols();
        let subset = features_per_tree(n_features);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let sample: Vec<usize> = (0..rows).map(|_| rng.random_range(0..rows)).collect();
            let mut features = index::sample(&mut rng, n_features, subset).into_vec();
            features.sort_unstable();
            let bootstrap = Dataset::new(
                records.select(Axis(0), &sample).select(Axis(1), &features),
                targets.select(Axis(0), &sample),
            );
            let tree = DecisionTree::params()
                .max_depth(self.max_depth)
                .fit(&bootstrap)
                .map_err(|e| ModelError::Fit {
                    model: "RandomForest",
                    reason: e.to_string(),
                })?;
            trees.push(ForestTree { features, tree });
        }

        Ok(RandomForest { n_features, trees })
    }
}

impl RandomForest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        check_features(self.n_features, records)?;
        let mut votes = Array1::<f64>::zeros(records.nrows());
        for member in &self.trees {
            let columns = records.select(Axis(1), &member.features);
            let labels: Array1<usize> = member.tree.predict(&columns);
            votes.zip_mut_with(&labels, |v, &label| *v += label as f64);
        }
        let n_trees = self.trees.len().max(1) as f64;
        Ok(binary_proba(votes.iter().map(|v| v / n_trees)))
    }
}
