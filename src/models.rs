use crate::error::ApiError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputData {
    pub data: Vec<f64>,
}

impl InputData {
    pub fn validate(&self, expected: usize) -> Result<(), ApiError> {
        if self.data.len() != expected {
            return Err(ApiError::FeatureCount {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionResponse {
    pub prediction: usize,
    pub confidence: f64,
    pub inference_time: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_checks_length() {
        let input = InputData {
            data: vec![0.0; 29],
        };
        let err = input.validate(30).unwrap_err();
        assert_eq!(err.to_string(), "Expected 30 features, but got 29");
        assert!(InputData { data: vec![1.5; 30] }.validate(30).is_ok());
    }

    #[test]
    fn validate_rejects_empty_and_overlong_input() {
        for (len, detail) in [
            (0, "Expected 30 features, but got 0"),
            (31, "Expected 30 features, but got 31"),
        ] {
            let err = InputData {
                data: vec![0.5; len],
            }
            .validate(30)
            .unwrap_err();
            assert_eq!(err.to_string(), detail);
        }
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.876, 2), 0.88);
        assert_eq!(round_to(0.000_123_49, 4), 0.0001);
    }
}
