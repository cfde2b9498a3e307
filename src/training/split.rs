//! Train/test splitting and cross-validation folds.

use super::dataset::Samples;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SplitError {
    #[error("test_size must be within (0, 1), got {0}")]
    TestSize(f64),
    #[error("split of {rows} rows leaves an empty train or test set")]
    TooFewRows { rows: usize },
    #[error("cannot build {folds} folds: need at least 2 folds and {folds} rows per class")]
    Folds { folds: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    pub train: Samples,
    pub test: Samples,
}

/// Shuffles rows with a seeded generator and moves `ceil(test_size * n)` of
/// them into the test set.
pub fn train_test_split(
    samples: &Samples,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(SplitError::TestSize(test_size));
    }
    let rows = samples.len();
    let n_test = (test_size * rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= rows {
        return Err(SplitError::TooFewRows { rows });
    }

    let mut order: Vec<usize> = (0..rows).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test_idx, train_idx) = order.split_at(n_test);
    Ok(TrainTestSplit {
        train: select_rows(samples, train_idx),
        test: select_rows(samples, test_idx),
    })
}

pub fn select_rows(samples: &Samples, rows: &[usize]) -> Samples {
    Samples {
        feature_names: samples.feature_names.clone(),
        records: samples.records.select(Axis(0), rows),
        targets: samples.targets.select(Axis(0), rows),
    }
}

/// One cross-validation round: row indices to fit on and to score on.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Stratified k-fold: rows of each class are dealt round-robin across the
/// folds in their original order, so every fold keeps the class ratio.
pub fn stratified_folds(targets: &Array1<usize>, k: usize) -> Result<Vec<Fold>, SplitError> {
    let n_classes = targets.iter().max().map_or(0, |&m| m + 1);
    let mut per_class = vec![Vec::new(); n_classes];
    for (row, &label) in targets.iter().enumerate() {
        per_class[label].push(row);
    }
    if k < 2 || per_class.iter().any(|rows| !rows.is_empty() && rows.len() < k) {
        return Err(SplitError::Folds { folds: k });
    }

    let mut assignment = vec![0; targets.len()];
    for rows in &per_class {
        for (pos, &row) in rows.iter().enumerate() {
            assignment[row] = pos % k;
        }
    }
    Ok((0..k)
        .map(|fold| {
            let (validation, train): (Vec<usize>, Vec<usize>) =
                (0..targets.len()).partition(|&row| assignment[row] == fold);
            Fold { train, validation }
        })
        .collect())
}

/// Rows of `records`/`targets` selected by index.
pub fn take(
    records: &Array2<f64>,
    targets: &Array1<usize>,
    rows: &[usize],
) -> (Array2<f64>, Array1<usize>) {
    (records.select(Axis(0), rows), targets.select(Axis(0), rows))
}
