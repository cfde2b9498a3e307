use super::{
    binary_proba, check_features, check_training_set, Classifier, Estimator, ModelError,
    Standardizer,
};
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

const MAX_ITERATIONS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse L2 regularization strength.
    #[serde(rename = "C")]
    pub c: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    scaler: Standardizer,
    model: FittedLogisticRegression<f64, usize>,
}

impl Estimator for LogisticParams {
    type Model = LogisticModel;

    fn fit(
        &self,
        records: &Array2<f64>,
        targets: &Array1<usize>,
    ) -> Result<LogisticModel, ModelError> {
        check_training_set("LogisticRegression", records, targets)?;
        if !(self.c > 0.0) {
            return Err(ModelError::Fit {
                model: "LogisticRegression",
                reason: format!("C must be positive, got {}", self.c),
            });
        }
        let scaler =
            Standardizer::fit(records).ok_or(ModelError::EmptyTrainingSet("LogisticRegression"))?;
        let dataset = Dataset::new(scaler.transform(records)?, targets.clone());

        let model = LogisticRegression::<f64>::default()
            .alpha(1.0 / self.c)
            .max_iterations(MAX_ITERATIONS)
            .fit(&dataset)
            .map_err(|e| ModelError::Fit {
                model: "LogisticRegression",
                reason: e.to_string(),
            })?;

        Ok(LogisticModel { scaler, model })
    }
}

impl Classifier for LogisticModel {
    fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        check_features(self.n_features(), records)?;
        let scaled = self.scaler.transform(records)?;
        // Probability of the larger label, i.e. class 1.
        let positive = self.model.predict_probabilities(&scaled);
        Ok(binary_proba(positive.iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::test_data::separable;

    #[test]
    fn separates_well_split_classes() {
        let (x, y) = separable(60, 8);
        let model = LogisticParams { c: 1.0 }.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn positive_rows_get_high_class_one_probability() {
        let (x, y) = separable(40, 4);
        let model = LogisticParams { c: 10.0 }.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        for (row, label) in proba.rows().into_iter().zip(y.iter()) {
            assert!(row[*label] > 0.5);
        }
    }

    #[test]
    fn single_class_fails_to_fit() {
        let x = Array2::from_shape_fn((10, 3), |(i, j)| (i + j) as f64);
        let y = Array1::zeros(10);
        assert!(matches!(
            LogisticParams { c: 1.0 }.fit(&x, &y),
            Err(ModelError::Fit { .. })
        ));
    }
}
