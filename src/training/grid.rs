//! Exhaustive hyperparameter search scored by cross-validated accuracy.

use super::evaluation::accuracy;
use super::split::{stratified_folds, take, SplitError};
use crate::classifier::{Classifier, Estimator, ModelError};
use ndarray::{Array1, Array2};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum GridSearchError {
    #[error("parameter grid is empty")]
    EmptyGrid,
    #[error(transparent)]
    Folds(#[from] SplitError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore<P> {
    pub params: P,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct GridSearchResult<P, M> {
    pub best_params: P,
    pub best_score: f64,
    /// The best candidate refitted on all rows.
    pub best_model: M,
    pub candidates: Vec<CandidateScore<P>>,
}

/// Scores every candidate with stratified `folds`-fold cross-validation and
/// refits the best one on the full data. Ties keep the earliest candidate.
pub fn grid_search<E>(
    candidates: Vec<E>,
    folds: usize,
    records: &Array2<f64>,
    targets: &Array1<usize>,
) -> Result<GridSearchResult<E, E::Model>, GridSearchError>
where
    E: Estimator + Clone + std::fmt::Debug,
{
    if candidates.is_empty() {
        return Err(GridSearchError::EmptyGrid);
    }
    let splits = stratified_folds(targets, folds)?;

    let mut scored = Vec::with_capacity(candidates.len());
    for params in candidates {
        let mut fold_scores = Vec::with_capacity(splits.len());
        for fold in &splits {
            let (train_x, train_y) = take(records, targets, &fold.train);
            let (val_x, val_y) = take(records, targets, &fold.validation);
            let model = params.fit(&train_x, &train_y)?;
            fold_scores.push(accuracy(&val_y, &model.predict(&val_x)?));
        }
        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        debug!("candidate {:?}: mean cv accuracy {:.4}", params, mean_score);
        scored.push(CandidateScore {
            params,
            mean_score,
            fold_scores,
        });
    }

    let best = scored
        .iter()
        .enumerate()
        .fold(0, |best, (idx, c)| {
            if c.mean_score > scored[best].mean_score {
                idx
            } else {
                best
            }
        });
    let best_params = scored[best].params.clone();
    let best_score = scored[best].mean_score;
    let best_model = best_params.fit(records, targets)?;

    Ok(GridSearchResult {
        best_params,
        best_score,
        best_model,
        candidates: scored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ForestParams, LogisticParams};
    use crate::classifier::test_data::separable;

    #[test]
    fn scores_every_candidate_and_refits_best() {
        let (x, y) = separable(50, 4);
        let grid = vec![
            ForestParams {
                n_estimators: 3,
                max_depth: Some(1),
                seed: 1,
            },
            ForestParams {
                n_estimators: 5,
                max_depth: None,
                seed: 1,
            },
        ];
        let result = grid_search(grid, 5, &x, &y).unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert!(result.candidates.iter().all(|c| c.fold_scores.len() == 5));
        assert_eq!(result.best_score, 1.0);
        assert_eq!(result.best_model.predict(&x).unwrap(), y);
    }

    #[test]
    fn ties_keep_first_candidate() {
        let (x, y) = separable(40, 3);
        let grid = vec![LogisticParams { c: 1.0 }, LogisticParams { c: 10.0 }];
        let result = grid_search(grid, 4, &x, &y).unwrap();
        assert_eq!(result.best_params, LogisticParams { c: 1.0 });
    }

    #[test]
    fn empty_grid_is_an_error() {
        let (x, y) = separable(10, 2);
        let grid: Vec<LogisticParams> = Vec::new();
        assert!(matches!(
            grid_search(grid, 2, &x, &y),
            Err(GridSearchError::EmptyGrid)
        ));
    }
}
