use super::{
    binary_proba, check_features, check_training_set, Classifier, Estimator, ModelError,
    Standardizer,
};
use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Rbf,
    Linear,
    Poly,
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kernel::Rbf => "rbf",
            Kernel::Linear => "linear",
            Kernel::Poly => "poly",
        };
        f.write_str(name)
    }
}

const POLY_DEGREE: f64 = 3.0;
const POLY_CONSTANT: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvmParams {
    #[serde(rename = "C")]
    pub c: f64,
    pub kernel: Kernel,
}

/// Support vector classifier on standardized inputs with Platt-scaled
/// probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmModel {
    scaler: Standardizer,
    kernel: Kernel,
    svm: Svm<f64, Pr>,
}

impl Estimator for SvmParams {
    type Model = SvmModel;

    fn fit(&self, records: &Array2<f64>, targets: &Array1<usize>) -> Result<SvmModel, ModelError> {
        check_training_set("SVM", records, targets)?;
        if !(self.c > 0.0) {
            return Err(ModelError::Fit {
                model: "SVM",
                reason: format!("C must be positive, got {}", self.c),
            });
        }
        let scaler = Standardizer::fit(records).ok_or(ModelError::EmptyTrainingSet("SVM"))?;
        let dataset = Dataset::new(scaler.transform(records)?, targets.mapv(|label| label == 1));

        let params = Svm::<f64, Pr>::params().pos_neg_weights(self.c, self.c);
        let params = match self.kernel {
            // Unit-variance inputs make the "scale" width equal to the column count.
            Kernel::Rbf => params.gaussian_kernel(records.ncols() as f64),
            Kernel::Linear => params.linear_kernel(),
            Kernel::Poly => params.polynomial_kernel(POLY_CONSTANT, POLY_DEGREE),
        };
        let svm = params.fit(&dataset).map_err(|e| ModelError::Fit {
            model: "SVM",
            reason: e.to_string(),
        })?;

        Ok(SvmModel {
            scaler,
            kernel: self.kernel,
            svm,
        })
    }
}

impl SvmModel {
    pub fn kernel(&self) -> Kernel {
        self.kernel
    }
}

impl Classifier for SvmModel {
    fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    fn predict_proba(&self, records: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        check_features(self.n_features(), records)?;
        let scaled = self.scaler.transform(records)?;
        let positive: Array1<Pr> = self.svm.predict(&scaled);
        Ok(binary_proba(positive.iter().map(|p| f64::from(**p))))
    }
}
