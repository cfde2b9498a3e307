use super::{check_features, ModelError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Per-column zero-mean / unit-variance transform fitted on training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(records: &Array2<f64>) -> Option<Self> {
        let mean = records.mean_axis(Axis(0))?;
        // Constant columns keep their values centered but unscaled.
        let scale = records
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Some(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        check_features(self.n_features(), records)?;
        Ok((records - &self.mean) / &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn centers_and_scales_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = Standardizer::fit(&x).unwrap();
        let z = scaler.transform(&x).unwrap();
        assert_eq!(z, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn empty_input_has_no_scaler() {
        assert!(Standardizer::fit(&Array2::zeros((0, 3))).is_none());
    }
}
