use crate::classifier::{Classifier, ModelArtifact, ModelError};
use ndarray::Array2;
use std::path::Path;
use std::time::{Duration, Instant};

/// A model loaded once at startup and shared read-only by every worker.
#[derive(Debug)]
pub struct LoadedModel {
    artifact: ModelArtifact,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: usize,
    /// Highest class probability.
    pub confidence: f64,
    /// Wall-clock time of the model call.
    pub elapsed: Duration,
}

impl LoadedModel {
    /// Reads the artifact and checks it accepts `expected_features` inputs.
    pub fn load<P: AsRef<Path>>(path: P, expected_features: usize) -> Result<Self, ModelError> {
        Self::from_artifact(ModelArtifact::load(path.as_ref())?, expected_features)
    }

    pub fn from_artifact(
        artifact: ModelArtifact,
        expected_features: usize,
    ) -> Result<Self, ModelError> {
        if artifact.n_features != expected_features {
            return Err(ModelError::FeatureCount {
                expected: expected_features,
                actual: artifact.n_features,
            });
        }
        Ok(Self { artifact })
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn family(&self) -> &'static str {
        self.artifact.model.family()
    }

    pub fn n_features(&self) -> usize {
        self.artifact.n_features
    }

    pub fn predict(&self, features: &[f64]) -> Result<Prediction, ModelError> {
        let input = Array2::from_shape_vec((1, features.len()), features.to_vec())
            .map_err(|e| ModelError::Output(e.to_string()))?;

        let started = Instant::now();
        let proba = self.artifact.model.predict_proba(&input)?;
        let elapsed = started.elapsed();

        let row = proba.row(0);
        let (label, confidence) = row
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (idx, p)| {
                if p > best.1 {
                    (idx, p)
                } else {
                    best
                }
            });
        if !confidence.is_finite() {
            return Err(ModelError::Output(format!(
                "non-finite class probabilities {:?}",
                row.to_vec()
            )));
        }
        Ok(Prediction {
            label,
            confidence,
            elapsed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classifier::{Estimator, ForestParams};
    use ndarray::{Array1, Array2};

    /// Forest over 30 columns where class 1 rows are shifted up by 3.
    pub fn forest_artifact() -> ModelArtifact {
        let targets = Array1::from_iter((0..60).map(|i| i % 2));
        let records = Array2::from_shape_fn((60, 30), |(i, j)| {
            ((i * 5 + j * 11) % 13) as f64 / 13.0 + 3.0 * targets[i] as f64
        });
        let forest = ForestParams {
            n_estimators: 15,
            max_depth: Some(4),
            seed: 42,
        }
        .fit(&records, &targets)
        .unwrap();
        ModelArtifact::new("random_forest_model", vec![], forest.into())
    }

    #[test]
    fn predicts_label_and_confidence() {
        let model = LoadedModel::from_artifact(forest_artifact(), 30).unwrap();
        let high = model.predict(&[3.5; 30]).unwrap();
        let low = model.predict(&[0.2; 30]).unwrap();
        assert_eq!(high.label, 1);
        assert_eq!(low.label, 0);
        assert!((0.5..=1.0).contains(&high.confidence));
    }

    #[test]
    fn rejects_artifact_of_wrong_width() {
        let err = LoadedModel::from_artifact(forest_artifact(), 7).unwrap_err();
        assert!(matches!(err, ModelError::FeatureCount { expected: 7, actual: 30 }));
    }

    #[test]
    fn wrong_input_width_is_a_model_error() {
        let model = LoadedModel::from_artifact(forest_artifact(), 30).unwrap();
        assert!(model.predict(&[1.0; 3]).is_err());
    }
}
