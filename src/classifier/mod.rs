//! Binary classifiers shared by the training pipeline and the inference
//! service.
//!
//! Each family has a parameter type implementing [`Estimator`] and a fitted
//! type implementing [`Classifier`]. Fitted models are wrapped in
//! [`TrainedModel`] and persisted as a [`ModelArtifact`] JSON document.

mod forest;
mod logistic;
mod scaling;
mod svm;

pub use forest::{ForestParams, RandomForest};
pub use logistic::{LogisticModel, LogisticParams};
pub use scaling::Standardizer;
pub use svm::{Kernel, SvmModel, SvmParams};

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Number of target classes every model in this crate distinguishes.
pub const N_CLASSES: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to fit {model}: {reason}")]
    Fit { model: &'static str, reason: String },
    #[error("model expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },
    #[error("cannot fit {0} on an empty training set")]
    EmptyTrainingSet(&'static str),
    #[error("label {0} is outside the binary range 0..=1")]
    InvalidLabel(usize),
    #[error("failed to access model file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid model file {path}: {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("model produced malformed output: {0}")]
    Output(String),
}

/// A fitted binary classifier.
pub trait Classifier {
    /// Number of input columns the model was fitted on.
    fn n_features(&self) -> usize;

    /// Per-row class probabilities, shape `(rows, N_CLASSES)`.
    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError>;

    /// Per-row class label; the most probable class, ties going to class 0.
    fn predict(&self, records: &Array2<f64>) -> Result<Array1<usize>, ModelError> {
        let proba = self.predict_proba(records)?;
        Ok(proba.map_axis(Axis(1), |row| argmax(row.iter().copied())))
    }
}

/// Hyperparameters of one classifier family that can be fitted on data.
pub trait Estimator {
    type Model: Classifier;

    fn fit(&self, records: &Array2<f64>, targets: &Array1<usize>)
        -> Result<Self::Model, ModelError>;
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (idx, value) in values.enumerate() {
        if value > best.1 {
            best = (idx, value);
        }
    }
    best.0
}

pub(crate) fn check_features(expected: usize, records: &Array2<f64>) -> Result<(), ModelError> {
    if records.ncols() != expected {
        return Err(ModelError::FeatureCount {
            expected,
            actual: records.ncols(),
        });
    }
    Ok(())
}

pub(crate) fn check_training_set(
    model: &'static str,
    records: &Array2<f64>,
    targets: &Array1<usize>,
) -> Result<(), ModelError> {
    if records.nrows() == 0 || records.nrows() != targets.len() {
        return Err(ModelError::EmptyTrainingSet(model));
    }
    if let Some(&label) = targets.iter().find(|&&label| label >= N_CLASSES) {
        return Err(ModelError::InvalidLabel(label));
    }
    Ok(())
}

/// Stacks `P(class 1)` into a two-column probability matrix.
pub(crate) fn binary_proba(positive: impl Iterator<Item = f64>) -> Array2<f64> {
    let positive: Vec<f64> = positive.collect();
    let mut proba = Array2::zeros((positive.len(), N_CLASSES));
    for (mut row, p) in proba.rows_mut().into_iter().zip(positive) {
        let p = p.clamp(0.0, 1.0);
        row[0] = 1.0 - p;
        row[1] = p;
    }
    proba
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainedModel {
    RandomForest(RandomForest),
    Svm(SvmModel),
    LogisticRegression(LogisticModel),
}

impl TrainedModel {
    pub fn family(&self) -> &'static str {
        match self {
            TrainedModel::RandomForest(_) => "RandomForest",
            TrainedModel::Svm(_) => "SVM",
            TrainedModel::LogisticRegression(_) => "LogisticRegression",
        }
    }
}

impl Classifier for TrainedModel {
    fn n_features(&self) -> usize {
        match self {
            TrainedModel::RandomForest(model) => model.n_features(),
            TrainedModel::Svm(model) => model.n_features(),
            TrainedModel::LogisticRegression(model) => model.n_features(),
        }
    }

    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        match self {
            TrainedModel::RandomForest(model) => model.predict_proba(records),
            TrainedModel::Svm(model) => model.predict_proba(records),
            TrainedModel::LogisticRegression(model) => model.predict_proba(records),
        }
    }
}

impl From<RandomForest> for TrainedModel {
    fn from(model: RandomForest) -> Self {
        TrainedModel::RandomForest(model)
    }
}

impl From<SvmModel> for TrainedModel {
    fn from(model: SvmModel) -> Self {
        TrainedModel::Svm(model)
    }
}

impl From<LogisticModel> for TrainedModel {
    fn from(model: LogisticModel) -> Self {
        TrainedModel::LogisticRegression(model)
    }
}

/// Serialized form of a fitted model, as written by the training pipeline
/// and read by the inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn new(name: impl Into<String>, feature_names: Vec<String>, model: TrainedModel) -> Self {
        Self {
            name: name.into(),
            n_features: model.n_features(),
            feature_names,
            model,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let io_err = |source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(path).map_err(io_err)?;
        serde_json::to_writer(BufWriter::new(file), self).map_err(|source| ModelError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let artifact: ModelArtifact =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ModelError::Format {
                path: path.to_path_buf(),
                source,
            })?;
        if artifact.model.n_features() != artifact.n_features {
            return Err(ModelError::FeatureCount {
                expected: artifact.n_features,
                actual: artifact.model.n_features(),
            });
        }
        Ok(artifact)
    }
}

#[cfg(test)]
pub(crate) mod test_data {
    use ndarray::{Array1, Array2};

    /// Two well separated classes over `n_features` columns.
    pub fn separable(rows: usize, n_features: usize) -> (Array2<f64>, Array1<usize>) {
        let targets = Array1::from_iter((0..rows).map(|i| i % 2));
        let records = Array2::from_shape_fn((rows, n_features), |(i, j)| {
            let jitter = ((i * 7 + j * 13) % 17) as f64 / 17.0;
            jitter + 3.0 * targets[i] as f64
        });
        (records, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn argmax_prefers_first_on_tie() {
        assert_eq!(argmax([0.5, 0.5].into_iter()), 0);
        assert_eq!(argmax([0.2, 0.8].into_iter()), 1);
    }

    #[test]
    fn binary_proba_rows_sum_to_one() {
        let proba = binary_proba([0.25, 1.2, -0.1].into_iter());
        assert_eq!(proba, array![[0.75, 0.25], [0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn artifact_survives_save_and_load() {
        let (x, y) = test_data::separable(40, 4);
        let forest = ForestParams {
            n_estimators: 5,
            max_depth: Some(3),
            seed: 7,
        }
        .fit(&x, &y)
        .unwrap();
        let artifact = ModelArtifact::new("random_forest_model", vec![], forest.into());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        artifact.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();

        assert_eq!(loaded.n_features, 4);
        assert_eq!(loaded.model.family(), "RandomForest");
        assert_eq!(
            loaded.model.predict_proba(&x).unwrap(),
            artifact.model.predict_proba(&x).unwrap()
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, ModelError::Io { .. }));
    }
}
